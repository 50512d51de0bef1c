//! LMDB-backed block store.

use std::path::Path;
use std::sync::Arc;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use crate::block::{block_key, BlockStore};
use crate::StoreError;

/// LMDB map size: 1 GiB.
const MAP_SIZE: usize = 1 << 30;
/// Number of named LMDB databases.
const MAX_DBS: u32 = 1;

/// Durable block store backed by an LMDB environment.
///
/// Every put commits its own write transaction, so a put that returns
/// `Ok` has reached the memory map.
pub struct LmdbBlockStore {
    env: Arc<Env>,
    blocks_db: Database<Str, Bytes>,
}

impl LmdbBlockStore {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)
            .map_err(|e| StoreError::Backend(format!("failed to create {}: {e}", path.display())))?;

        let env = unsafe { EnvOpenOptions::new().max_dbs(MAX_DBS).map_size(MAP_SIZE).open(path)? };

        let mut wtxn = env.write_txn()?;
        let blocks_db = env.create_database(&mut wtxn, Some("blocks"))?;
        wtxn.commit()?;

        Ok(Self {
            env: Arc::new(env),
            blocks_db,
        })
    }
}

impl BlockStore for LmdbBlockStore {
    fn put_block(&self, block_id: u64, bytes: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn()?;
        self.blocks_db.put(&mut wtxn, &block_key(block_id), bytes)?;
        wtxn.commit()?;
        Ok(())
    }

    fn get_block(&self, block_id: u64) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn()?;
        Ok(self
            .blocks_db
            .get(&rtxn, &block_key(block_id))?
            .map(|bytes| bytes.to_vec()))
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.blocks_db.len(&rtxn)?)
    }
}
