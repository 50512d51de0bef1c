//! Transport layer for TomChain RPC.
//!
//! Frames are 4-byte big-endian length prefixes followed by a bincode
//! payload. The [`PeerClient`] issues request/response calls over a
//! persistent TCP connection with a per-call timeout; a failed call drops
//! the connection and the next call reconnects.

pub mod client;
pub mod codec;
pub mod error;

pub use client::PeerClient;
pub use codec::{read_frame, write_frame, MAX_FRAME_SIZE};
pub use error::NetworkError;
