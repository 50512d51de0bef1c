//! Vote aggregation engine.
//!
//! Every vote, whether it arrives from a client RPC, a peer relay, or the
//! packer itself, goes through the same intake pipeline: dead-set check,
//! pending lookup, at-most-once insert, quorum check. Reaching quorum
//! hands the block to the merge queue; a single drain owns all
//! commit-side effects (aggregate, verify, persist, broadcast), so RPC
//! handlers never fan out work themselves.

use std::sync::Arc;

use tokio::sync::Mutex;

use blsttc::PublicKeySet;
use tomchain_crypto::SigShareSet;
use tomchain_store::BlockStore;
use tomchain_types::{Block, BlockVote, Timestamp};

use crate::metrics::NodeMetrics;
use crate::pools::{shared, BlockPools, FifoQueue, OutboundQueues, SharedBlock};
use crate::{NodeError, ServerConfig};

/// Clock-skew cutoff: a pending block "older" than this is assumed to
/// carry a skewed proposal timestamp and is left alone.
const MAX_EVICTABLE_AGE_MS: u64 = 100_000;

/// Where a vote entered this server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteSource {
    /// Straight from a client (`VoteBlocks`) or the packer's own vote.
    Client,
    /// Forwarded by a peer (`RelayVote`); never re-relayed.
    Peer,
}

pub struct VoteEngine {
    config: Arc<ServerConfig>,
    pools: Arc<BlockPools>,
    outbound: Arc<OutboundQueues>,
    merge_queue: FifoQueue<SharedBlock>,
    pk_set: PublicKeySet,
    store: Arc<Mutex<Box<dyn BlockStore>>>,
    metrics: Arc<NodeMetrics>,
}

impl VoteEngine {
    pub fn new(
        config: Arc<ServerConfig>,
        pools: Arc<BlockPools>,
        outbound: Arc<OutboundQueues>,
        pk_set: PublicKeySet,
        store: Arc<Mutex<Box<dyn BlockStore>>>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            config,
            pools,
            outbound,
            merge_queue: FifoQueue::new(),
            pk_set,
            store,
            metrics,
        }
    }

    /// The vote intake pipeline.
    pub async fn ingest_vote(&self, vote: BlockVote, source: VoteSource) {
        let block_id = vote.block_id;

        // Keeps the votes map bounded by the configured client count.
        if vote.voter_id == 0 || vote.voter_id > self.config.client_count {
            tracing::error!(
                block = block_id,
                voter = vote.voter_id,
                "vote with out-of-range voter id dropped"
            );
            return;
        }

        if self.pools.is_dead(block_id).await {
            tracing::trace!(block = block_id, voter = vote.voter_id, "vote for dead block dropped");
            return;
        }

        // Client votes fan out to the peer relay queues even when the
        // local mirror has not arrived yet; the peers may already hold
        // the block. Peer votes are one-hop and never re-relayed.
        if source == VoteSource::Client {
            self.outbound.push_vote_all(&vote);
        }

        let Some(block) = self.pools.get_pending(block_id).await else {
            tracing::trace!(
                block = block_id,
                voter = vote.voter_id,
                "vote for unknown block dropped"
            );
            return;
        };

        let reached_quorum = {
            let mut guard = block.lock().await;
            let inserted = guard.insert_vote(vote);
            if inserted {
                self.metrics.votes_received.inc();
            }
            // Fire exactly once, on the insert that crosses the threshold.
            inserted && guard.vote_count() == self.config.quorum_threshold()
        };

        if reached_quorum {
            tracing::debug!(block = block_id, "quorum reached");
            self.merge_queue.push(Arc::clone(&block));
            self.pools.remove_pending(block_id).await;
        }
    }

    /// Drain the merge queue, committing each quorumed block.
    pub async fn drain_merge_queue(&self) {
        while let Some(block) = self.merge_queue.try_pop().await {
            if let Err(e) = self.merge_and_commit(&block).await {
                let block_id = block.lock().await.id();
                tracing::error!(block = block_id, error = %e, "vote merge failed, block dropped");
            }
        }
    }

    /// Aggregate the block's shares, stamp timestamps, move it to
    /// committed, persist it, and queue the commit broadcast.
    async fn merge_and_commit(&self, block: &SharedBlock) -> Result<(), NodeError> {
        let (block_id, bytes, latency_ms) = {
            let mut guard = block.lock().await;

            let mut share_set = SigShareSet::new(self.config.quorum_threshold());
            for vote in guard.votes.values() {
                share_set.add_share(vote.voter_id, vote.sig_share.clone());
            }
            let signature = share_set.combine(&self.pk_set)?;

            let message = Block::vote_message(guard.id());
            if !self.pk_set.public_key().verify(&signature, message) {
                return Err(tomchain_crypto::CryptoError::InvalidAggregate.into());
            }

            let now = Timestamp::now();
            guard.tss_sig = Some(signature);
            guard.header.commit_ts = now;
            guard.header.recv_ts = now;

            let latency_ms = guard.header.proposal_ts.elapsed_since(now);
            let bytes = bincode::serialize(&*guard)?;
            (guard.id(), bytes, latency_ms)
        };

        tracing::info!(block = block_id, latency_ms, "local commit");
        self.metrics.blocks_committed.inc();
        self.metrics.commit_latency_ms.observe(latency_ms as f64);

        self.pools.insert_committed(block_id, Arc::clone(block)).await;
        self.persist(block_id, &bytes).await;
        self.outbound.push_commit_all(block);
        Ok(())
    }

    /// Apply a committed block received via a peer commit broadcast.
    ///
    /// Idempotent: the incoming block already carries its aggregated
    /// signature, the committed insert is a replace, and the KV put
    /// rewrites the same bytes. A concurrent local merge of the same
    /// block converges to the identical signature.
    pub async fn apply_committed(&self, block: Block) {
        let block_id = block.id();
        if block.tss_sig.is_none() {
            tracing::error!(block = block_id, "commit broadcast without aggregated signature");
            return;
        }

        // A local copy may still sit in pending; drop it.
        self.pools.remove_pending(block_id).await;

        let bytes = match bincode::serialize(&block) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(block = block_id, error = %e, "cannot serialize broadcast block");
                return;
            }
        };

        tracing::info!(block = block_id, "commit applied from peer broadcast");
        self.metrics.commits_applied.inc();
        self.pools.insert_committed(block_id, shared(block)).await;
        self.persist(block_id, &bytes).await;
    }

    /// Evict pending blocks whose age exceeds the die threshold.
    pub async fn remove_dead_blocks(&self) {
        let now = Timestamp::now();
        for block_id in self.pools.pending_ids().await {
            let Some(block) = self.pools.get_pending(block_id).await else {
                continue;
            };
            let proposal_ts = block.lock().await.header.proposal_ts;
            let age = proposal_ts.elapsed_since(now);
            if age > MAX_EVICTABLE_AGE_MS {
                continue;
            }
            if age > self.config.block_die_threshold {
                tracing::debug!(block = block_id, age_ms = age, "evicting dead block");
                self.pools.mark_dead(block_id).await;
                self.pools.remove_pending(block_id).await;
            }
        }
    }

    /// Write a committed block to the KV store. The dedicated mutex keeps
    /// the store handle single-threaded; a failed put is logged and the
    /// block stays committed in memory.
    async fn persist(&self, block_id: u64, bytes: &[u8]) {
        let store = self.store.lock().await;
        if let Err(e) = store.put_block(block_id, bytes) {
            tracing::warn!(block = block_id, error = %e, "block persistence failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tomchain_crypto::{generate_shares, sign_share, KeyShare};
    use tomchain_store::MemoryBlockStore;

    struct Fixture {
        engine: VoteEngine,
        pools: Arc<BlockPools>,
        outbound: Arc<OutboundQueues>,
        shares: Vec<KeyShare>,
    }

    fn fixture(client_count: u64, peer_ids: &[u64]) -> Fixture {
        let mut config = ServerConfig::from_json_str("{}").unwrap();
        config.client_count = client_count;
        config.block_die_threshold = 50;
        let config = Arc::new(config);

        let (pk_set, shares) =
            generate_shares(client_count as usize, client_count as usize, &mut rand::thread_rng())
                .unwrap();
        let pools = Arc::new(BlockPools::new());
        let outbound = Arc::new(OutboundQueues::new(peer_ids));
        let store: Arc<Mutex<Box<dyn BlockStore>>> =
            Arc::new(Mutex::new(Box::new(MemoryBlockStore::new())));
        let engine = VoteEngine::new(
            Arc::clone(&config),
            Arc::clone(&pools),
            Arc::clone(&outbound),
            pk_set,
            store,
            Arc::new(NodeMetrics::new()),
        );
        Fixture {
            engine,
            pools,
            outbound,
            shares,
        }
    }

    fn vote_for(shares: &[KeyShare], voter_id: u64, block_id: u64) -> BlockVote {
        let share = &shares[(voter_id - 1) as usize];
        BlockVote::new(
            block_id,
            voter_id,
            sign_share(&share.secret, &Block::vote_message(block_id)),
        )
    }

    async fn insert_block(pools: &BlockPools, block_id: u64) -> SharedBlock {
        let block = shared(Block::new(block_id, Timestamp::now()));
        pools.insert_pending(block_id, Arc::clone(&block)).await;
        block
    }

    #[tokio::test]
    async fn quorum_moves_block_to_merge_queue() {
        let f = fixture(2, &[]);
        insert_block(&f.pools, 10).await;

        f.engine
            .ingest_vote(vote_for(&f.shares, 1, 10), VoteSource::Client)
            .await;
        assert_eq!(f.pools.pending_len().await, 1);

        f.engine
            .ingest_vote(vote_for(&f.shares, 2, 10), VoteSource::Client)
            .await;
        // Quorum erases the block from pending; the merge drain commits it.
        assert_eq!(f.pools.pending_len().await, 0);
        assert_eq!(f.pools.committed_len().await, 0);

        f.engine.drain_merge_queue().await;
        assert_eq!(f.pools.committed_len().await, 1);
        let committed = f.pools.get_committed(10).await.unwrap();
        assert!(committed.lock().await.tss_sig.is_some());
    }

    #[tokio::test]
    async fn duplicate_votes_do_not_reach_quorum() {
        let f = fixture(2, &[]);
        insert_block(&f.pools, 10).await;

        for _ in 0..3 {
            f.engine
                .ingest_vote(vote_for(&f.shares, 1, 10), VoteSource::Peer)
                .await;
        }
        assert_eq!(f.pools.pending_len().await, 1);
        let block = f.pools.get_pending(10).await.unwrap();
        assert_eq!(block.lock().await.vote_count(), 1);
    }

    #[tokio::test]
    async fn dead_block_votes_are_dropped() {
        let f = fixture(1, &[2]);
        f.pools.mark_dead(10).await;
        f.engine
            .ingest_vote(vote_for(&f.shares, 1, 10), VoteSource::Client)
            .await;
        // Dropped before the relay fan-out.
        assert!(f.outbound.drain_votes(2).await.is_empty());
        f.engine.drain_merge_queue().await;
        assert_eq!(f.pools.committed_len().await, 0);
    }

    #[tokio::test]
    async fn unknown_block_vote_is_dropped_but_still_relayed() {
        let f = fixture(1, &[2]);
        f.engine
            .ingest_vote(vote_for(&f.shares, 1, 99), VoteSource::Client)
            .await;
        assert_eq!(f.outbound.drain_votes(2).await.len(), 1);
        f.engine.drain_merge_queue().await;
        assert_eq!(f.pools.committed_len().await, 0);
    }

    #[tokio::test]
    async fn out_of_range_voter_ids_are_rejected() {
        let f = fixture(2, &[2]);
        insert_block(&f.pools, 10).await;
        let mut vote = vote_for(&f.shares, 1, 10);
        vote.voter_id = 99;
        f.engine.ingest_vote(vote, VoteSource::Client).await;

        assert!(f.outbound.drain_votes(2).await.is_empty());
        let block = f.pools.get_pending(10).await.unwrap();
        assert_eq!(block.lock().await.vote_count(), 0);
    }

    #[tokio::test]
    async fn peer_votes_are_not_re_relayed() {
        let f = fixture(2, &[2]);
        insert_block(&f.pools, 10).await;
        f.engine
            .ingest_vote(vote_for(&f.shares, 1, 10), VoteSource::Peer)
            .await;
        assert!(f.outbound.drain_votes(2).await.is_empty());
    }

    #[tokio::test]
    async fn commit_persists_block_bytes() {
        let f = fixture(1, &[]);
        insert_block(&f.pools, 10).await;
        f.engine
            .ingest_vote(vote_for(&f.shares, 1, 10), VoteSource::Client)
            .await;
        f.engine.drain_merge_queue().await;

        let store = f.engine.store.lock().await;
        let bytes = store.get_block(10).unwrap().expect("block persisted");
        let decoded: Block = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.id(), 10);
        assert!(decoded.tss_sig.is_some());
    }

    #[tokio::test]
    async fn apply_committed_is_idempotent() {
        let f = fixture(1, &[]);
        insert_block(&f.pools, 10).await;
        f.engine
            .ingest_vote(vote_for(&f.shares, 1, 10), VoteSource::Client)
            .await;
        f.engine.drain_merge_queue().await;

        let committed = {
            let block = f.pools.get_committed(10).await.unwrap();
            let guard = block.lock().await;
            guard.clone()
        };
        let first_bytes = {
            let store = f.engine.store.lock().await;
            store.get_block(10).unwrap().unwrap()
        };

        f.engine.apply_committed(committed.clone()).await;
        f.engine.apply_committed(committed).await;

        assert_eq!(f.pools.committed_len().await, 1);
        assert_eq!(f.pools.pending_len().await, 0);
        let second_bytes = {
            let store = f.engine.store.lock().await;
            store.get_block(10).unwrap().unwrap()
        };
        assert_eq!(first_bytes, second_bytes);
    }

    #[tokio::test]
    async fn apply_committed_without_signature_is_rejected() {
        let f = fixture(1, &[]);
        f.engine.apply_committed(Block::new(5, Timestamp::now())).await;
        assert_eq!(f.pools.committed_len().await, 0);
    }

    #[tokio::test]
    async fn dead_eviction_respects_thresholds() {
        let f = fixture(1, &[]);
        // Old enough to evict.
        let stale = Block::new(1, Timestamp::new(Timestamp::now().as_millis() - 1_000));
        f.pools.insert_pending(1, shared(stale)).await;
        // Fresh block stays.
        insert_block(&f.pools, 2).await;
        // Ancient proposal timestamp: treated as clock skew, stays pending.
        let skewed = Block::new(3, Timestamp::new(1));
        f.pools.insert_pending(3, shared(skewed)).await;

        f.engine.remove_dead_blocks().await;

        assert!(f.pools.is_dead(1).await);
        assert!(f.pools.get_pending(1).await.is_none());
        assert!(f.pools.get_pending(2).await.is_some());
        assert!(f.pools.get_pending(3).await.is_some());
        assert!(!f.pools.is_dead(3).await);
    }
}
