//! Client-to-server request/response schemas.

use serde::{Deserialize, Serialize};

use crate::{RequestId, RpcStatus};

/// Envelope for every client-service frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientEnvelope {
    pub request_id: RequestId,
    pub frame: ClientFrame,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClientFrame {
    Request(ClientRequest),
    Response(ClientResponse),
}

/// The five client-service operations. `client_id` identifies the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Present the client's Ed25519 public key; the reply carries the
    /// pre-generated threshold secret share.
    Register { client_id: u64, ecc_pubkey: Vec<u8> },
    Heartbeat { client_id: u64 },
    /// Ask for the headers of every pending block.
    PullPendingBlocks { client_id: u64 },
    /// Fetch full blocks for previously pulled headers.
    GetBlocks {
        client_id: u64,
        headers: Vec<Vec<u8>>,
    },
    /// Submit blocks carrying this client's vote.
    VoteBlocks {
        client_id: u64,
        voted_blocks: Vec<Vec<u8>>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClientResponse {
    Register {
        status: RpcStatus,
        client_id: u64,
        /// Serialized threshold secret share (empty on error).
        tss_secret_share: Vec<u8>,
    },
    Heartbeat {
        status: RpcStatus,
    },
    PullPendingBlocks {
        status: RpcStatus,
        headers: Vec<Vec<u8>>,
    },
    GetBlocks {
        status: RpcStatus,
        blocks: Vec<Vec<u8>>,
    },
    VoteBlocks {
        status: RpcStatus,
    },
}
