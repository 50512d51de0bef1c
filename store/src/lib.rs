//! Committed-block persistence for TomChain.
//!
//! The rest of the workspace depends only on the [`BlockStore`] trait;
//! backends are LMDB (durable) and in-memory (tests, `use-rocksdb: false`
//! deployments).

pub mod block;
pub mod error;
pub mod lmdb;
pub mod memory;

pub use block::{block_key, BlockStore};
pub use error::StoreError;
pub use lmdb::LmdbBlockStore;
pub use memory::MemoryBlockStore;
