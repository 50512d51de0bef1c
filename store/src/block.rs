//! Block storage trait.

use crate::StoreError;

/// Key under which a committed block is persisted: `block-<decimal id>`.
pub fn block_key(block_id: u64) -> String {
    format!("block-{block_id}")
}

/// Storage for committed blocks: serialized bytes keyed by block id.
///
/// `put_block` is insert-or-replace; re-putting the same bytes under the
/// same key leaves the store unchanged.
pub trait BlockStore: Send + Sync {
    /// Durably store a serialized block.
    fn put_block(&self, block_id: u64, bytes: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a serialized block, `None` if absent.
    fn get_block(&self, block_id: u64) -> Result<Option<Vec<u8>>, StoreError>;

    /// Whether a block is present.
    fn exists(&self, block_id: u64) -> Result<bool, StoreError> {
        Ok(self.get_block(block_id)?.is_some())
    }

    /// Total number of stored blocks.
    fn block_count(&self) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_block_dash_decimal_id() {
        assert_eq!(block_key(0), "block-0");
        assert_eq!(block_key(2_000_017), "block-2000017");
    }
}
