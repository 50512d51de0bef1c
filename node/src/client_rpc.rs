//! Client-to-server RPC handlers.

use std::collections::HashMap;
use std::sync::Arc;

use blsttc::serde_impl::SerdeSecret;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};

use tomchain_messages::{ClientEnvelope, ClientFrame, ClientRequest, ClientResponse, RpcStatus};
use tomchain_network::{read_frame, write_frame};
use tomchain_types::{Block, BlockHeader, ClientProfile};

use crate::pools::BlockPools;
use crate::votes::{VoteEngine, VoteSource};

/// Handlers for the five client-service operations.
pub struct ClientService {
    pools: Arc<BlockPools>,
    engine: Arc<VoteEngine>,
    clients: Arc<RwLock<HashMap<u64, ClientProfile>>>,
}

impl ClientService {
    pub fn new(
        pools: Arc<BlockPools>,
        engine: Arc<VoteEngine>,
        clients: Arc<RwLock<HashMap<u64, ClientProfile>>>,
    ) -> Self {
        Self {
            pools,
            engine,
            clients,
        }
    }

    pub async fn handle(&self, request: ClientRequest) -> ClientResponse {
        match request {
            ClientRequest::Register {
                client_id,
                ecc_pubkey,
            } => self.handle_register(client_id, &ecc_pubkey).await,
            ClientRequest::Heartbeat { client_id } => {
                tracing::trace!(client = client_id, "client heartbeat");
                ClientResponse::Heartbeat {
                    status: RpcStatus::Ok,
                }
            }
            ClientRequest::PullPendingBlocks { client_id } => {
                self.handle_pull_pending(client_id).await
            }
            ClientRequest::GetBlocks { client_id, headers } => {
                self.handle_get_blocks(client_id, headers).await
            }
            ClientRequest::VoteBlocks {
                client_id,
                voted_blocks,
            } => self.handle_vote_blocks(client_id, voted_blocks).await,
        }
    }

    /// Store the client's identity key and hand back its pre-generated
    /// threshold secret share.
    async fn handle_register(&self, client_id: u64, ecc_pubkey: &[u8]) -> ClientResponse {
        let reject = ClientResponse::Register {
            status: RpcStatus::Error,
            client_id,
            tss_secret_share: Vec::new(),
        };

        let pubkey = match tomchain_crypto::parse_public_key(ecc_pubkey) {
            Ok(pubkey) => pubkey,
            Err(e) => {
                tracing::error!(client = client_id, error = %e, "register with bad public key");
                return reject;
            }
        };

        let mut clients = self.clients.write().await;
        let Some(profile) = clients.get_mut(&client_id) else {
            tracing::error!(client = client_id, "register from unknown client");
            return reject;
        };
        profile.ecc_pubkey = Some(pubkey);

        let share_bytes = match bincode::serialize(&SerdeSecret(profile.tss_secret_share.clone())) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(client = client_id, error = %e, "cannot serialize secret share");
                return reject;
            }
        };

        tracing::info!(client = client_id, "client registered");
        ClientResponse::Register {
            status: RpcStatus::Ok,
            client_id,
            tss_secret_share: share_bytes,
        }
    }

    /// Stream back the header of every pending block. Best effort: the
    /// snapshot is not atomic and entries that vanish mid-iteration are
    /// skipped.
    async fn handle_pull_pending(&self, client_id: u64) -> ClientResponse {
        let mut headers = Vec::new();
        for block_id in self.pools.pending_ids().await {
            let Some(block) = self.pools.get_pending(block_id).await else {
                continue;
            };
            let header = block.lock().await.header;
            match bincode::serialize(&header) {
                Ok(bytes) => headers.push(bytes),
                Err(e) => tracing::error!(block = block_id, error = %e, "cannot serialize header"),
            }
        }
        tracing::debug!(client = client_id, count = headers.len(), "pending headers pulled");
        ClientResponse::PullPendingBlocks {
            status: RpcStatus::Ok,
            headers,
        }
    }

    /// Return the full block for each requested header; blocks that are
    /// no longer pending are omitted.
    async fn handle_get_blocks(&self, client_id: u64, headers: Vec<Vec<u8>>) -> ClientResponse {
        let mut blocks = Vec::new();
        for bytes in headers {
            let header: BlockHeader = match bincode::deserialize(&bytes) {
                Ok(header) => header,
                Err(e) => {
                    tracing::error!(client = client_id, error = %e, "malformed header dropped");
                    continue;
                }
            };
            let Some(block) = self.pools.get_pending(header.id).await else {
                continue;
            };
            let guard = block.lock().await;
            match bincode::serialize(&*guard) {
                Ok(bytes) => blocks.push(bytes),
                Err(e) => tracing::error!(block = header.id, error = %e, "cannot serialize block"),
            }
        }
        ClientResponse::GetBlocks {
            status: RpcStatus::Ok,
            blocks,
        }
    }

    /// Extract this client's vote from each submitted block and run it
    /// through the intake pipeline.
    async fn handle_vote_blocks(&self, client_id: u64, voted_blocks: Vec<Vec<u8>>) -> ClientResponse {
        tracing::debug!(client = client_id, count = voted_blocks.len(), "vote blocks");
        for bytes in voted_blocks {
            let block: Block = match bincode::deserialize(&bytes) {
                Ok(block) => block,
                Err(e) => {
                    tracing::error!(client = client_id, error = %e, "malformed voted block dropped");
                    continue;
                }
            };
            let Some(vote) = block.votes.get(&client_id).cloned() else {
                tracing::error!(
                    client = client_id,
                    block = block.id(),
                    "submitted block carries no vote from this client"
                );
                continue;
            };
            self.engine.ingest_vote(vote, VoteSource::Client).await;
        }
        ClientResponse::VoteBlocks {
            status: RpcStatus::Ok,
        }
    }
}

/// Accept client connections until shutdown; one task per connection.
pub async fn run_client_listener(
    listener: TcpListener,
    service: Arc<ClientService>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "client accept failed");
                        continue;
                    }
                };
                tracing::debug!(client_addr = %addr, "client connected");
                let service = Arc::clone(&service);
                tokio::spawn(serve_client_conn(stream, service));
            }
        }
    }
}

async fn serve_client_conn(mut stream: TcpStream, service: Arc<ClientService>) {
    loop {
        let body = match read_frame(&mut stream).await {
            Ok(body) => body,
            Err(_) => return,
        };
        let envelope: ClientEnvelope = match bincode::deserialize(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, "malformed client frame dropped");
                continue;
            }
        };
        let ClientFrame::Request(request) = envelope.frame else {
            continue;
        };
        let response = service.handle(request).await;
        let reply = ClientEnvelope {
            request_id: envelope.request_id,
            frame: ClientFrame::Response(response),
        };
        let bytes = match bincode::serialize(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "cannot serialize client response");
                continue;
            }
        };
        if write_frame(&mut stream, &bytes).await.is_err() {
            return;
        }
    }
}
