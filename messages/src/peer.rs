//! Server-to-server request/response schemas.

use serde::{Deserialize, Serialize};

use crate::{RequestId, RpcStatus};

/// Envelope for every peer-service frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerEnvelope {
    pub request_id: RequestId,
    pub frame: PeerFrame,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerFrame {
    Request(PeerRequest),
    Response(PeerResponse),
}

/// The five peer-service operations. `server_id` identifies the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerRequest {
    /// `SPHeartbeat` — liveness probe; the caller derives peer status from
    /// the reply outcome.
    Heartbeat { server_id: u64 },
    /// `RelayVote` — forward serialized votes received from clients.
    RelayVote { server_id: u64, votes: Vec<Vec<u8>> },
    /// `RelayBlock` — forward freshly packed serialized blocks.
    RelayBlock { server_id: u64, blocks: Vec<Vec<u8>> },
    /// `SPBcastCommit` — propagate committed blocks carrying their
    /// aggregated signatures.
    BcastCommit {
        server_id: u64,
        timestamp: u64,
        blocks: Vec<Vec<u8>>,
    },
    /// `RelayBlockSync` — label a block as known-relayed.
    BlockSync { server_id: u64, block_id: u64 },
}

/// Status reply to any peer request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerResponse {
    pub status: RpcStatus,
}

impl PeerResponse {
    pub fn ok() -> Self {
        Self {
            status: RpcStatus::Ok,
        }
    }
}
