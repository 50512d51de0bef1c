//! Periodic drivers for the consensus pipeline.
//!
//! Three interval tasks, each running its work sequentially within the
//! task. Missed ticks are skipped, which gives every driver the
//! single-flight property: a tick that fires while the previous firing
//! is still running is simply dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics::NodeMetrics;
use crate::packer::Packer;
use crate::peer_rpc::PeerSender;
use crate::peers::PeerSet;
use crate::pools::BlockPools;
use crate::shutdown::ShutdownController;
use crate::votes::VoteEngine;
use crate::ServerConfig;

fn tick_interval(millis: u64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(millis.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Spawn the three periodic drivers. Returned handles finish once
/// shutdown is signaled.
pub fn spawn_tasks(
    config: Arc<ServerConfig>,
    engine: Arc<VoteEngine>,
    sender: Arc<PeerSender>,
    packer: Option<Arc<Packer>>,
    pools: Arc<BlockPools>,
    peers: Arc<PeerSet>,
    metrics: Arc<NodeMetrics>,
    shutdown: &ShutdownController,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    // Heartbeats, vote relay, commit broadcast, merge drain, dead-block
    // eviction.
    {
        let engine = Arc::clone(&engine);
        let sender = Arc::clone(&sender);
        let mut shutdown_rx = shutdown.subscribe();
        let freq = config.scheduler_freq;
        handles.push(tokio::spawn(async move {
            let mut interval = tick_interval(freq);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => return,
                    _ = interval.tick() => {
                        sender.send_heartbeats().await;
                        sender.send_relay_votes().await;
                        sender.bcast_commits().await;
                        engine.drain_merge_queue().await;
                        engine.remove_dead_blocks().await;
                    }
                }
            }
        }));
    }

    // Packing (designated server only) and block relay with sync signals.
    {
        let sender = Arc::clone(&sender);
        let mut shutdown_rx = shutdown.subscribe();
        let freq = config.pack_freq;
        handles.push(tokio::spawn(async move {
            let mut interval = tick_interval(freq);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => return,
                    _ = interval.tick() => {
                        if let Some(packer) = packer.as_ref() {
                            packer.tick().await;
                        }
                        sender.send_relay_blocks().await;
                    }
                }
            }
        }));
    }

    // Pool-size logging and metrics refresh.
    {
        let mut shutdown_rx = shutdown.subscribe();
        let freq = config.count_freq;
        handles.push(tokio::spawn(async move {
            let mut interval = tick_interval(freq);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => return,
                    _ = interval.tick() => {
                        let tx = pools.tx_len().await;
                        let pb = pools.pending_len().await;
                        let cb = pools.committed_len().await;
                        let dead = pools.dead_len().await;
                        tracing::info!(tx, pb, cb, dead, "pool sizes");
                        metrics.pending_txs.set(tx as i64);
                        metrics.pending_blocks.set(pb as i64);
                        metrics.committed_blocks.set(cb as i64);
                        metrics.dead_blocks.set(dead as i64);
                        metrics.alive_peers.set(peers.alive_count() as i64);
                    }
                }
            }
        }));
    }

    handles
}
