//! Outbound peer RPC client.
//!
//! One `PeerClient` per remote server. Calls are serialized on the
//! connection (the scheduler issues at most a handful per tick), so the
//! response to a request is the next matching frame on the stream. A call
//! that fails or times out drops the connection; the next call dials
//! again, which gives the no-retry discipline its implicit redelivery
//! point at the following scheduler tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;

use tomchain_messages::{PeerEnvelope, PeerFrame, PeerRequest, PeerResponse};

use crate::codec::{read_frame, write_frame};
use crate::NetworkError;

pub struct PeerClient {
    server_id: u64,
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<TcpStream>>,
    next_request_id: AtomicU64,
}

impl PeerClient {
    pub fn new(server_id: u64, addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server_id,
            addr: addr.into(),
            timeout,
            conn: Mutex::new(None),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Remote server id this client dials.
    pub fn server_id(&self) -> u64 {
        self.server_id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Issue one request and await its response.
    pub async fn call(&self, request: PeerRequest) -> Result<PeerResponse, NetworkError> {
        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| NetworkError::Timeout)??;
            *conn = Some(stream);
        }
        let Some(stream) = conn.as_mut() else {
            return Err(NetworkError::NotConnected);
        };

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let envelope = PeerEnvelope {
            request_id,
            frame: PeerFrame::Request(request),
        };
        let bytes = bincode::serialize(&envelope)?;

        let result = self.exchange(stream, request_id, &bytes).await;
        if result.is_err() {
            // Drop the broken connection; the next call reconnects.
            *conn = None;
        }
        result
    }

    async fn exchange(
        &self,
        stream: &mut TcpStream,
        request_id: u64,
        bytes: &[u8],
    ) -> Result<PeerResponse, NetworkError> {
        let fut = async {
            write_frame(stream, bytes).await?;
            loop {
                let body = read_frame(stream).await?;
                let envelope: PeerEnvelope = bincode::deserialize(&body)?;
                match envelope.frame {
                    PeerFrame::Response(response) if envelope.request_id == request_id => {
                        return Ok(response);
                    }
                    // A response left over from an earlier timed-out call;
                    // keep reading until ours arrives.
                    PeerFrame::Response(_) => continue,
                    PeerFrame::Request(_) => {
                        tracing::warn!(
                            peer = self.server_id,
                            "unexpected request frame on client connection"
                        );
                        continue;
                    }
                }
            }
        };
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| NetworkError::Timeout)?
    }
}
