//! TomChain consensus server — the server-side consensus core.
//!
//! The server coordinates:
//! - the pending/committed/dead block pools and per-peer outbound queues,
//! - the vote aggregation engine (intake pipeline, merge drain, commit
//!   broadcast application, dead-block eviction),
//! - the packer that batches generated transactions into blocks on the
//!   designated server,
//! - the peer and client RPC services,
//! - the scheduler driving heartbeats, relays, broadcasts, and merges.

pub mod client_rpc;
pub mod config;
pub mod error;
pub mod metrics;
pub mod packer;
pub mod peer_rpc;
pub mod peers;
pub mod pools;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod votes;

pub use config::ServerConfig;
pub use error::NodeError;
pub use server::TomchainServer;
