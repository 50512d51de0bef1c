//! Wire schemas for TomChain RPC.
//!
//! Two services share the same transport (length-prefixed bincode frames
//! over TCP): the peer service between servers and the client service
//! between clients and their server. Entities (blocks, votes, headers)
//! travel as byte-opaque `Vec<u8>` payloads so both sides agree only on
//! the entity serialization, not on the envelope internals.

pub mod client;
pub mod peer;

use serde::{Deserialize, Serialize};

pub use client::{ClientEnvelope, ClientFrame, ClientRequest, ClientResponse};
pub use peer::{PeerEnvelope, PeerFrame, PeerRequest, PeerResponse};

/// Correlates a response frame with its request frame on one connection.
pub type RequestId = u64;

/// Status reply carried by every response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcStatus {
    Ok,
    Error,
}

impl RpcStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, RpcStatus::Ok)
    }
}
