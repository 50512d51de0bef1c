//! Leader-side transaction generation and block packing.
//!
//! Only the designated server (the one whose id equals `server-count`)
//! runs a packer. Non-packer servers receive blocks exclusively through
//! peer relay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tomchain_types::{Block, Timestamp, Transaction};

use crate::pools::{shared, BlockPools, OutboundQueues};
use crate::metrics::NodeMetrics;
use crate::ServerConfig;

/// Each server mints ids from its own window of this size, which keeps
/// ids globally unique across servers.
const BLOCK_ID_WINDOW: u64 = 1_000_000;

pub struct Packer {
    config: Arc<ServerConfig>,
    pools: Arc<BlockPools>,
    outbound: Arc<OutboundQueues>,
    metrics: Arc<NodeMetrics>,
    /// Monotonic block id counter seeded at `server_id * 10^6`.
    next_block_id: AtomicU64,
    rng: Mutex<StdRng>,
}

impl Packer {
    pub fn new(
        config: Arc<ServerConfig>,
        pools: Arc<BlockPools>,
        outbound: Arc<OutboundQueues>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        let seed = config.server_id.wrapping_mul(BLOCK_ID_WINDOW);
        Self {
            config,
            pools,
            outbound,
            metrics,
            next_block_id: AtomicU64::new(seed),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic transaction generation for tests.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// One pack iteration: top up the transaction pool unless the pending
    /// pool is at its backpressure limit, then drain full blocks.
    pub async fn tick(&self) {
        if self.pools.pending_len().await < self.config.pb_pool_limit as usize {
            self.generate_txs(self.config.generate_tx_rate).await;
        }
        self.pack_blocks().await;
    }

    /// Insert `count` random transactions into the pending-tx pool.
    async fn generate_txs(&self, count: u64) {
        let account_count = self.config.account_count.max(1);
        for _ in 0..count {
            let tx = {
                let mut rng = match self.rng.lock() {
                    Ok(rng) => rng,
                    Err(poisoned) => poisoned.into_inner(),
                };
                Transaction::new(
                    rng.gen_range(1..=account_count),
                    rng.gen_range(1..=account_count),
                    rng.gen_range(1..=account_count),
                    0,
                    rng.gen_range(1..=account_count),
                )
            };
            self.pools.insert_tx(tx).await;
        }
    }

    /// Drain `tx-per-block` transactions at a time into new blocks until
    /// the transaction pool runs short.
    async fn pack_blocks(&self) {
        let tx_per_block = self.config.tx_per_block as usize;
        while let Some(txs) = self.pools.drain_txs(tx_per_block).await {
            let block_id = self.next_block_id.fetch_add(1, Ordering::SeqCst);
            let mut block = Block::new(block_id, Timestamp::now());
            block.tx_vec = txs;
            block.header.dist_ts = Timestamp::now();

            let block = shared(block);
            self.outbound.push_block_all(&block);
            self.pools.insert_pending(block_id, block).await;
            self.metrics.blocks_packed.inc();
            tracing::trace!(block = block_id, "packed block");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packer_with(config: ServerConfig, peer_ids: &[u64]) -> (Packer, Arc<BlockPools>, Arc<OutboundQueues>) {
        let pools = Arc::new(BlockPools::new());
        let outbound = Arc::new(OutboundQueues::new(peer_ids));
        let packer = Packer::new(
            Arc::new(config),
            Arc::clone(&pools),
            Arc::clone(&outbound),
            Arc::new(NodeMetrics::new()),
        )
        .with_rng_seed(7);
        (packer, pools, outbound)
    }

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::from_json_str("{}").unwrap();
        config.server_id = 1;
        config.server_count = 1;
        config.account_count = 1_000_000;
        config.generate_tx_rate = 4;
        config.tx_per_block = 2;
        config.pb_pool_limit = 10;
        config
    }

    #[tokio::test]
    async fn tick_generates_and_packs() {
        let (packer, pools, _) = packer_with(test_config(), &[]);
        packer.tick().await;
        assert!(pools.pending_len().await >= 1);
        // All generated transactions were either packed or left below a
        // full batch.
        assert!(pools.tx_len().await < 2);
    }

    #[tokio::test]
    async fn block_ids_are_seeded_and_strictly_increasing() {
        let (packer, pools, _) = packer_with(test_config(), &[]);
        for _ in 0..4 {
            packer.tick().await;
        }
        let mut ids = pools.pending_ids().await;
        ids.sort_unstable();
        assert!(ids.len() >= 2);
        assert!(ids[0] >= BLOCK_ID_WINDOW);
        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[tokio::test]
    async fn packed_blocks_are_queued_for_every_peer() {
        let mut config = test_config();
        config.server_id = 3;
        config.server_count = 3;
        let (packer, _, outbound) = packer_with(config, &[1, 2]);
        packer.tick().await;
        let to_1 = outbound.drain_blocks(1).await;
        let to_2 = outbound.drain_blocks(2).await;
        assert!(!to_1.is_empty());
        assert_eq!(to_1.len(), to_2.len());
    }

    #[tokio::test]
    async fn backpressure_stops_generation_not_packing() {
        let mut config = test_config();
        config.pb_pool_limit = 5;
        config.generate_tx_rate = 2;
        config.tx_per_block = 2;
        let (packer, pools, _) = packer_with(config, &[]);

        for _ in 0..20 {
            packer.tick().await;
        }
        let size = pools.pending_len().await;
        assert!(size <= 5, "pending stabilized above the limit: {size}");

        // Further ticks no longer grow the pool.
        packer.tick().await;
        assert_eq!(pools.pending_len().await, size);
    }

    #[tokio::test]
    async fn transactions_carry_zero_value() {
        let (packer, pools, _) = packer_with(test_config(), &[]);
        packer.tick().await;
        for id in pools.pending_ids().await {
            let block = pools.get_pending(id).await.unwrap();
            for tx in &block.lock().await.tx_vec {
                assert_eq!(tx.value, 0);
                assert!(tx.fee >= 1);
            }
        }
    }
}
