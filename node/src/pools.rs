//! Concurrent block pools and outbound peer queues.
//!
//! A block lives in exactly one of {pending, committed, dead}. The outer
//! `RwLock` on each map guards pool structure (insert, erase, snapshot);
//! the `Mutex` inside a [`SharedBlock`] is the per-entry accessor that
//! serializes vote insertion, signature writes, and timestamp updates.
//! Iteration over a pool is always snapshot-then-relookup: copy the ids
//! under the lock, then fetch entries one by one and tolerate the ones
//! that vanished in between.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};

use tomchain_types::{Block, BlockVote, Transaction};

/// Shared handle to one block.
pub type SharedBlock = Arc<Mutex<Block>>;

/// Wrap a block for pool insertion.
pub fn shared(block: Block) -> SharedBlock {
    Arc::new(Mutex::new(block))
}

// ── FIFO queue ─────────────────────────────────────────────────────────

/// Unbounded multi-producer FIFO drained with non-blocking pops.
pub struct FifoQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T> FifoQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn push(&self, item: T) {
        // The receiver lives as long as self, so the send cannot fail.
        let _ = self.tx.send(item);
    }

    /// Pop one item if available.
    pub async fn try_pop(&self) -> Option<T> {
        self.rx.lock().await.try_recv().ok()
    }

    /// Drain everything currently queued, preserving FIFO order.
    pub async fn try_drain(&self) -> Vec<T> {
        let mut rx = self.rx.lock().await;
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Block pools ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct BlockPools {
    pending: RwLock<HashMap<u64, SharedBlock>>,
    committed: RwLock<HashMap<u64, SharedBlock>>,
    /// Blocks evicted for exceeding the age threshold; suppresses late votes.
    dead: RwLock<HashSet<u64>>,
    /// Blocks known to have been relayed to all peers.
    sync_labels: RwLock<HashSet<u64>>,
    /// Pending transactions awaiting packing (populated on the packer only).
    pending_txs: RwLock<HashMap<u64, Transaction>>,
}

impl BlockPools {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Pending ────────────────────────────────────────────────────────

    /// Insert-or-replace a pending block.
    pub async fn insert_pending(&self, block_id: u64, block: SharedBlock) {
        self.pending.write().await.insert(block_id, block);
    }

    pub async fn get_pending(&self, block_id: u64) -> Option<SharedBlock> {
        self.pending.read().await.get(&block_id).cloned()
    }

    pub async fn remove_pending(&self, block_id: u64) -> Option<SharedBlock> {
        self.pending.write().await.remove(&block_id)
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Snapshot of the pending ids for snapshot-then-relookup iteration.
    pub async fn pending_ids(&self) -> Vec<u64> {
        self.pending.read().await.keys().copied().collect()
    }

    // ── Committed ──────────────────────────────────────────────────────

    /// Insert-or-replace a committed block.
    pub async fn insert_committed(&self, block_id: u64, block: SharedBlock) {
        self.committed.write().await.insert(block_id, block);
    }

    pub async fn get_committed(&self, block_id: u64) -> Option<SharedBlock> {
        self.committed.read().await.get(&block_id).cloned()
    }

    pub async fn committed_len(&self) -> usize {
        self.committed.read().await.len()
    }

    pub async fn committed_ids(&self) -> Vec<u64> {
        self.committed.read().await.keys().copied().collect()
    }

    // ── Dead set ───────────────────────────────────────────────────────

    pub async fn mark_dead(&self, block_id: u64) {
        self.dead.write().await.insert(block_id);
    }

    pub async fn is_dead(&self, block_id: u64) -> bool {
        self.dead.read().await.contains(&block_id)
    }

    pub async fn dead_len(&self) -> usize {
        self.dead.read().await.len()
    }

    // ── Sync labels ────────────────────────────────────────────────────

    pub async fn add_sync_label(&self, block_id: u64) {
        self.sync_labels.write().await.insert(block_id);
    }

    pub async fn has_sync_label(&self, block_id: u64) -> bool {
        self.sync_labels.read().await.contains(&block_id)
    }

    // ── Pending transactions ───────────────────────────────────────────

    /// Insert a transaction keyed by its id (replacing an id collision).
    pub async fn insert_tx(&self, tx: Transaction) {
        self.pending_txs.write().await.insert(tx.id, tx);
    }

    pub async fn tx_len(&self) -> usize {
        self.pending_txs.read().await.len()
    }

    /// Remove and return exactly `count` transactions, or `None` if fewer
    /// are available.
    pub async fn drain_txs(&self, count: usize) -> Option<Vec<Transaction>> {
        let mut txs = self.pending_txs.write().await;
        if txs.len() < count {
            return None;
        }
        let ids: Vec<u64> = txs.keys().take(count).copied().collect();
        Some(ids.iter().filter_map(|id| txs.remove(id)).collect())
    }
}

// ── Outbound peer queues ───────────────────────────────────────────────

/// Per-peer outbound FIFOs.
///
/// Each queue has one producer subsystem (packer for blocks, vote intake
/// for votes, merge drain for commits) and one consumer: the RPC sender
/// for that peer. Queues exist only for remote peers; a single-server
/// deployment has none.
pub struct OutboundQueues {
    relay_votes: HashMap<u64, FifoQueue<BlockVote>>,
    relay_blocks: HashMap<u64, FifoQueue<SharedBlock>>,
    bcast_commits: HashMap<u64, FifoQueue<SharedBlock>>,
    /// Block ids awaiting a `RelayBlockSync` fan-out.
    sync_queue: FifoQueue<u64>,
}

impl OutboundQueues {
    pub fn new(peer_ids: &[u64]) -> Self {
        let mut relay_votes = HashMap::new();
        let mut relay_blocks = HashMap::new();
        let mut bcast_commits = HashMap::new();
        for id in peer_ids {
            relay_votes.insert(*id, FifoQueue::new());
            relay_blocks.insert(*id, FifoQueue::new());
            bcast_commits.insert(*id, FifoQueue::new());
        }
        Self {
            relay_votes,
            relay_blocks,
            bcast_commits,
            sync_queue: FifoQueue::new(),
        }
    }

    /// Queue a vote for relay to every peer.
    pub fn push_vote_all(&self, vote: &BlockVote) {
        for queue in self.relay_votes.values() {
            queue.push(vote.clone());
        }
    }

    /// Queue a freshly packed block for relay to every peer.
    pub fn push_block_all(&self, block: &SharedBlock) {
        for queue in self.relay_blocks.values() {
            queue.push(Arc::clone(block));
        }
    }

    /// Queue a committed block for broadcast to every peer.
    pub fn push_commit_all(&self, block: &SharedBlock) {
        for queue in self.bcast_commits.values() {
            queue.push(Arc::clone(block));
        }
    }

    pub async fn drain_votes(&self, peer_id: u64) -> Vec<BlockVote> {
        match self.relay_votes.get(&peer_id) {
            Some(queue) => queue.try_drain().await,
            None => Vec::new(),
        }
    }

    pub async fn drain_blocks(&self, peer_id: u64) -> Vec<SharedBlock> {
        match self.relay_blocks.get(&peer_id) {
            Some(queue) => queue.try_drain().await,
            None => Vec::new(),
        }
    }

    pub async fn drain_commits(&self, peer_id: u64) -> Vec<SharedBlock> {
        match self.bcast_commits.get(&peer_id) {
            Some(queue) => queue.try_drain().await,
            None => Vec::new(),
        }
    }

    pub fn push_sync(&self, block_id: u64) {
        self.sync_queue.push(block_id);
    }

    pub async fn drain_sync(&self) -> Vec<u64> {
        self.sync_queue.try_drain().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tomchain_types::Timestamp;

    fn block(id: u64) -> SharedBlock {
        shared(Block::new(id, Timestamp::new(1)))
    }

    #[tokio::test]
    async fn pending_insert_get_remove() {
        let pools = BlockPools::new();
        pools.insert_pending(1, block(1)).await;
        assert_eq!(pools.pending_len().await, 1);
        assert!(pools.get_pending(1).await.is_some());
        assert!(pools.remove_pending(1).await.is_some());
        assert!(pools.get_pending(1).await.is_none());
        assert!(pools.remove_pending(1).await.is_none());
    }

    #[tokio::test]
    async fn committed_insert_is_replace() {
        let pools = BlockPools::new();
        pools.insert_committed(1, block(1)).await;
        pools.insert_committed(1, block(1)).await;
        assert_eq!(pools.committed_len().await, 1);
    }

    #[tokio::test]
    async fn dead_set_membership() {
        let pools = BlockPools::new();
        assert!(!pools.is_dead(9).await);
        pools.mark_dead(9).await;
        assert!(pools.is_dead(9).await);
        assert_eq!(pools.dead_len().await, 1);
    }

    #[tokio::test]
    async fn tx_drain_requires_full_batch() {
        let pools = BlockPools::new();
        pools.insert_tx(Transaction::new(1, 1, 2, 0, 5)).await;
        assert!(pools.drain_txs(2).await.is_none());
        pools.insert_tx(Transaction::new(2, 1, 2, 0, 5)).await;
        let drained = pools.drain_txs(2).await.unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(pools.tx_len().await, 0);
    }

    #[tokio::test]
    async fn tx_insert_dedups_by_id() {
        let pools = BlockPools::new();
        pools.insert_tx(Transaction::new(7, 1, 2, 0, 5)).await;
        pools.insert_tx(Transaction::new(7, 3, 4, 0, 9)).await;
        assert_eq!(pools.tx_len().await, 1);
    }

    #[tokio::test]
    async fn fifo_queue_preserves_order() {
        let queue = FifoQueue::new();
        queue.push(1u64);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.try_drain().await, vec![1, 2, 3]);
        assert!(queue.try_pop().await.is_none());
    }

    #[tokio::test]
    async fn outbound_queues_fan_out_to_all_peers() {
        let queues = OutboundQueues::new(&[2, 3]);
        let b = block(10);
        queues.push_block_all(&b);
        assert_eq!(queues.drain_blocks(2).await.len(), 1);
        assert_eq!(queues.drain_blocks(3).await.len(), 1);
        // Unknown peer drains empty.
        assert!(queues.drain_blocks(9).await.is_empty());
        // Second drain is empty.
        assert!(queues.drain_blocks(2).await.is_empty());
    }
}
