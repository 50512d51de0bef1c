//! Server-to-server RPC: inbound handlers and outbound queue drains.
//!
//! Inbound: the peer listener accepts connections from other servers and
//! answers request frames sequentially per connection (connections are
//! handled in parallel). Outbound: each scheduler tick drains the
//! per-peer queues and issues at most one RPC per queue per peer; an
//! empty queue skips the call entirely. There are no retries — receivers
//! are idempotent and the next tick redelivers what matters.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use tomchain_messages::{PeerEnvelope, PeerFrame, PeerRequest, PeerResponse};
use tomchain_network::{read_frame, write_frame};
use tomchain_types::{Block, BlockVote};

use crate::peers::PeerSet;
use crate::pools::{shared, BlockPools, OutboundQueues};
use crate::votes::{VoteEngine, VoteSource};
use crate::ServerConfig;

// ── Inbound ────────────────────────────────────────────────────────────

/// Handlers for the five peer-service operations.
pub struct PeerService {
    pools: Arc<BlockPools>,
    engine: Arc<VoteEngine>,
    peers: Arc<PeerSet>,
}

impl PeerService {
    pub fn new(pools: Arc<BlockPools>, engine: Arc<VoteEngine>, peers: Arc<PeerSet>) -> Self {
        Self {
            pools,
            engine,
            peers,
        }
    }

    pub async fn handle(&self, request: PeerRequest) -> PeerResponse {
        match request {
            PeerRequest::Heartbeat { server_id } => {
                tracing::trace!(peer = server_id, "heartbeat");
                self.peers.set_alive(server_id, true);
            }
            PeerRequest::RelayVote { server_id, votes } => {
                self.handle_relay_vote(server_id, votes).await;
            }
            PeerRequest::RelayBlock { server_id, blocks } => {
                self.handle_relay_block(server_id, blocks).await;
            }
            PeerRequest::BcastCommit {
                server_id, blocks, ..
            } => {
                self.handle_bcast_commit(server_id, blocks).await;
            }
            PeerRequest::BlockSync {
                server_id,
                block_id,
            } => {
                tracing::trace!(peer = server_id, block = block_id, "block sync label");
                self.pools.add_sync_label(block_id).await;
            }
        }
        PeerResponse::ok()
    }

    async fn handle_relay_vote(&self, peer_id: u64, votes: Vec<Vec<u8>>) {
        for bytes in votes {
            let vote: BlockVote = match bincode::deserialize(&bytes) {
                Ok(vote) => vote,
                Err(e) => {
                    tracing::error!(peer = peer_id, error = %e, "malformed relayed vote dropped");
                    continue;
                }
            };
            self.engine.ingest_vote(vote, VoteSource::Peer).await;
        }
    }

    async fn handle_relay_block(&self, peer_id: u64, blocks: Vec<Vec<u8>>) {
        for bytes in blocks {
            let block: Block = match bincode::deserialize(&bytes) {
                Ok(block) => block,
                Err(e) => {
                    tracing::error!(peer = peer_id, error = %e, "malformed relayed block dropped");
                    continue;
                }
            };
            let block_id = block.id();
            // A relay that arrives after the block left pending (committed
            // or evicted) must not resurrect it.
            if self.pools.is_dead(block_id).await
                || self.pools.get_committed(block_id).await.is_some()
            {
                tracing::trace!(block = block_id, "late block relay ignored");
                continue;
            }
            tracing::debug!(peer = peer_id, block = block_id, "mirrored relayed block");
            self.pools.insert_pending(block_id, shared(block)).await;
        }
    }

    async fn handle_bcast_commit(&self, peer_id: u64, blocks: Vec<Vec<u8>>) {
        for bytes in blocks {
            let block: Block = match bincode::deserialize(&bytes) {
                Ok(block) => block,
                Err(e) => {
                    tracing::error!(peer = peer_id, error = %e, "malformed commit broadcast dropped");
                    continue;
                }
            };
            self.engine.apply_committed(block).await;
        }
    }
}

/// Accept peer connections until shutdown; one task per connection.
pub async fn run_peer_listener(
    listener: TcpListener,
    service: Arc<PeerService>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "peer accept failed");
                        continue;
                    }
                };
                tracing::debug!(peer_addr = %addr, "peer connected");
                let service = Arc::clone(&service);
                tokio::spawn(serve_peer_conn(stream, service));
            }
        }
    }
}

async fn serve_peer_conn(mut stream: TcpStream, service: Arc<PeerService>) {
    loop {
        let body = match read_frame(&mut stream).await {
            Ok(body) => body,
            Err(_) => return,
        };
        let envelope: PeerEnvelope = match bincode::deserialize(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, "malformed peer frame dropped");
                continue;
            }
        };
        let PeerFrame::Request(request) = envelope.frame else {
            continue;
        };
        let response = service.handle(request).await;
        let reply = PeerEnvelope {
            request_id: envelope.request_id,
            frame: PeerFrame::Response(response),
        };
        let bytes = match bincode::serialize(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "cannot serialize peer response");
                continue;
            }
        };
        if write_frame(&mut stream, &bytes).await.is_err() {
            return;
        }
    }
}

// ── Outbound ───────────────────────────────────────────────────────────

/// Drains the per-peer outbound queues into RPC calls.
pub struct PeerSender {
    config: Arc<ServerConfig>,
    outbound: Arc<OutboundQueues>,
    peers: Arc<PeerSet>,
    pools: Arc<BlockPools>,
}

impl PeerSender {
    pub fn new(
        config: Arc<ServerConfig>,
        outbound: Arc<OutboundQueues>,
        peers: Arc<PeerSet>,
        pools: Arc<BlockPools>,
    ) -> Self {
        Self {
            config,
            outbound,
            peers,
            pools,
        }
    }

    /// Heartbeat every peer in parallel; call outcomes update peer status.
    pub async fn send_heartbeats(&self) {
        let calls = self.peers.peer_ids().into_iter().map(|peer_id| {
            let peers = Arc::clone(&self.peers);
            let server_id = self.config.server_id;
            async move {
                let Some(client) = peers.client(peer_id) else {
                    return;
                };
                let alive = client
                    .call(PeerRequest::Heartbeat { server_id })
                    .await
                    .map(|response| response.status.is_ok())
                    .unwrap_or(false);
                peers.set_alive(peer_id, alive);
            }
        });
        join_all(calls).await;
    }

    /// Drain and relay queued votes, one RPC per peer with a non-empty
    /// queue.
    pub async fn send_relay_votes(&self) {
        let calls = self.peers.peer_ids().into_iter().map(|peer_id| async move {
            let votes = self.outbound.drain_votes(peer_id).await;
            if votes.is_empty() {
                return;
            }
            let mut payload = Vec::with_capacity(votes.len());
            for vote in &votes {
                match bincode::serialize(vote) {
                    Ok(bytes) => payload.push(bytes),
                    Err(e) => tracing::error!(error = %e, "cannot serialize vote for relay"),
                }
            }
            if let Some(client) = self.peers.client(peer_id) {
                let request = PeerRequest::RelayVote {
                    server_id: self.config.server_id,
                    votes: payload,
                };
                if let Err(e) = client.call(request).await {
                    tracing::warn!(peer = peer_id, error = %e, "vote relay failed");
                }
            }
        });
        join_all(calls).await;
    }

    /// Drain and relay queued blocks; successfully sent block ids are
    /// pushed onto the sync queue for the follow-up sync signals.
    pub async fn send_relay_blocks(&self) {
        let calls = self.peers.peer_ids().into_iter().map(|peer_id| async move {
            let blocks = self.outbound.drain_blocks(peer_id).await;
            if blocks.is_empty() {
                return;
            }
            let mut payload = Vec::with_capacity(blocks.len());
            let mut block_ids = Vec::with_capacity(blocks.len());
            for block in &blocks {
                let guard = block.lock().await;
                match bincode::serialize(&*guard) {
                    Ok(bytes) => {
                        payload.push(bytes);
                        block_ids.push(guard.id());
                    }
                    Err(e) => tracing::error!(error = %e, "cannot serialize block for relay"),
                }
            }
            let Some(client) = self.peers.client(peer_id) else {
                return;
            };
            let request = PeerRequest::RelayBlock {
                server_id: self.config.server_id,
                blocks: payload,
            };
            match client.call(request).await {
                Ok(_) => {
                    for block_id in block_ids {
                        self.outbound.push_sync(block_id);
                    }
                }
                Err(e) => tracing::warn!(peer = peer_id, error = %e, "block relay failed"),
            }
        });
        join_all(calls).await;

        self.send_block_syncs().await;
    }

    /// Drain the sync queue: fan each block id out to all peers and label
    /// it locally.
    pub async fn send_block_syncs(&self) {
        for block_id in self.outbound.drain_sync().await {
            let calls = self.peers.peer_ids().into_iter().map(|peer_id| async move {
                let Some(client) = self.peers.client(peer_id) else {
                    return;
                };
                let request = PeerRequest::BlockSync {
                    server_id: self.config.server_id,
                    block_id,
                };
                if let Err(e) = client.call(request).await {
                    tracing::warn!(peer = peer_id, block = block_id, error = %e, "block sync failed");
                }
            });
            join_all(calls).await;

            self.pools.add_sync_label(block_id).await;
            tracing::trace!(block = block_id, "block labeled sync locally");
        }
    }

    /// Drain and broadcast queued committed blocks.
    pub async fn bcast_commits(&self) {
        let calls = self.peers.peer_ids().into_iter().map(|peer_id| async move {
            let blocks = self.outbound.drain_commits(peer_id).await;
            if blocks.is_empty() {
                return;
            }
            let mut payload = Vec::with_capacity(blocks.len());
            for block in &blocks {
                let guard = block.lock().await;
                match bincode::serialize(&*guard) {
                    Ok(bytes) => payload.push(bytes),
                    Err(e) => tracing::error!(error = %e, "cannot serialize commit broadcast"),
                }
            }
            if let Some(client) = self.peers.client(peer_id) {
                let request = PeerRequest::BcastCommit {
                    server_id: self.config.server_id,
                    timestamp: tomchain_utils::now_millis(),
                    blocks: payload,
                };
                if let Err(e) = client.call(request).await {
                    tracing::warn!(peer = peer_id, error = %e, "commit broadcast failed");
                }
            }
        });
        join_all(calls).await;
    }
}
