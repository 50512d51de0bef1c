//! Outbound peer handles and liveness bookkeeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tomchain_network::PeerClient;

use crate::ServerConfig;

/// One RPC client per remote server plus the heartbeat-driven status
/// vector. `status[i]` is the last known liveness of server `i + 1`.
pub struct PeerSet {
    clients: HashMap<u64, Arc<PeerClient>>,
    status: Vec<AtomicBool>,
}

impl PeerSet {
    /// Build clients for every remote peer from `peer-addr` (indexed by
    /// `server_id - 1`; the entry for this server is skipped).
    pub fn new(config: &ServerConfig) -> Self {
        let timeout = config.rpc_timeout();
        let mut clients = HashMap::new();
        for peer_id in config.peer_ids() {
            let index = (peer_id - 1) as usize;
            let Some(addr) = config.peer_addr.get(index) else {
                continue;
            };
            clients.insert(
                peer_id,
                Arc::new(PeerClient::new(peer_id, addr.clone(), timeout)),
            );
        }
        let status = (0..config.server_count).map(|_| AtomicBool::new(false)).collect();
        Self { clients, status }
    }

    pub fn client(&self, peer_id: u64) -> Option<Arc<PeerClient>> {
        self.clients.get(&peer_id).cloned()
    }

    /// Remote peer ids in ascending order.
    pub fn peer_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn set_alive(&self, server_id: u64, alive: bool) {
        if let Some(slot) = self.status.get((server_id - 1) as usize) {
            slot.store(alive, Ordering::Relaxed);
        }
    }

    pub fn is_alive(&self, server_id: u64) -> bool {
        self.status
            .get((server_id - 1) as usize)
            .map(|slot| slot.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    pub fn alive_count(&self) -> usize {
        self.status.iter().filter(|s| s.load(Ordering::Relaxed)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(server_id: u64) -> ServerConfig {
        let mut config = ServerConfig::from_json_str("{}").unwrap();
        config.server_id = server_id;
        config.server_count = 3;
        config.peer_addr = vec![
            "127.0.0.1:7201".into(),
            "127.0.0.1:7202".into(),
            "127.0.0.1:7203".into(),
        ];
        config
    }

    #[test]
    fn skips_own_entry() {
        let peers = PeerSet::new(&config_for(2));
        assert_eq!(peers.peer_ids(), vec![1, 3]);
        assert!(peers.client(2).is_none());
        assert_eq!(peers.client(3).unwrap().addr(), "127.0.0.1:7203");
    }

    #[test]
    fn status_starts_dead_and_tracks_updates() {
        let peers = PeerSet::new(&config_for(1));
        assert!(!peers.is_alive(2));
        peers.set_alive(2, true);
        assert!(peers.is_alive(2));
        assert_eq!(peers.alive_count(), 1);
        peers.set_alive(2, false);
        assert_eq!(peers.alive_count(), 0);
    }
}
