//! In-memory block store for tests and volatile deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::block::{block_key, BlockStore};
use crate::StoreError;

/// HashMap-backed store keyed by the same `block-<id>` layout as the
/// durable backend.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put_block(&self, block_id: u64, bytes: &[u8]) -> Result<(), StoreError> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))?;
        blocks.insert(block_key(block_id), bytes.to_vec());
        Ok(())
    }

    fn get_block(&self, block_id: u64) -> Result<Option<Vec<u8>>, StoreError> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))?;
        Ok(blocks.get(&block_key(block_id)).cloned())
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))?;
        Ok(blocks.len() as u64)
    }
}
