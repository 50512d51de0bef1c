//! Fundamental types for the TomChain protocol.
//!
//! This crate defines the entity model shared across every other crate in
//! the workspace: transactions, blocks and their headers, block votes, the
//! client profiles provisioned at server startup, and the millisecond
//! timestamp used throughout the block lifecycle.

pub mod block;
pub mod client;
pub mod time;
pub mod transaction;
pub mod vote;

pub use block::{Block, BlockHeader};
pub use client::ClientProfile;
pub use time::Timestamp;
pub use transaction::Transaction;
pub use vote::BlockVote;
