//! Server configuration loaded from a JSON file.
//!
//! Key names follow the deployed config format exactly (kebab-case for
//! most keys, snake_case for the scheduler frequencies), so existing
//! config files keep working. The struct is immutable after load and
//! passed by `Arc` into each component.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::NodeError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// This server's 1-based id. Overridable with `--id`.
    #[serde(rename = "server-id", default = "default_server_id")]
    pub server_id: u64,

    /// Total number of servers. The server whose id equals this count is
    /// the designated packer.
    #[serde(rename = "server-count", default = "default_server_id")]
    pub server_count: u64,

    /// Total number of clients; also the default quorum threshold.
    #[serde(rename = "client-count", default = "default_client_count")]
    pub client_count: u64,

    /// Upper bound of the random transaction address space.
    #[serde(rename = "account-count", default = "default_account_count")]
    pub account_count: u64,

    /// Transactions generated per packer iteration.
    #[serde(rename = "generate-tx-rate", default = "default_generate_tx_rate")]
    pub generate_tx_rate: u64,

    /// Transactions drained per pack attempt.
    #[serde(rename = "tx-per-block", default = "default_tx_per_block")]
    pub tx_per_block: u64,

    /// Pending-block backpressure threshold: transaction generation stops
    /// while the pending pool is at or above this size.
    #[serde(rename = "pb-pool-limit", default = "default_pb_pool_limit")]
    pub pb_pool_limit: u64,

    /// Client-service listen endpoint.
    #[serde(rename = "grpc-listen-addr", default = "default_listen_addr")]
    pub grpc_listen_addr: String,

    /// Peer-service listen endpoint.
    #[serde(rename = "grpc-peer-listen-addr", default = "default_peer_listen_addr")]
    pub grpc_peer_listen_addr: String,

    /// Peer endpoints indexed by `server_id - 1`; the entry matching this
    /// server's own id is skipped.
    #[serde(rename = "peer-addr", default)]
    pub peer_addr: Vec<String>,

    /// Heartbeat / vote-relay / commit-broadcast / merge tick, in ms.
    #[serde(rename = "scheduler_freq", default = "default_scheduler_freq")]
    pub scheduler_freq: u64,

    /// Pack + block-relay tick, in ms.
    #[serde(rename = "pack_freq", default = "default_pack_freq")]
    pub pack_freq: u64,

    /// Pool-size logging tick, in ms.
    #[serde(rename = "count_freq", default = "default_count_freq")]
    pub count_freq: u64,

    /// Age in ms after which an unquorumed pending block is evicted.
    #[serde(rename = "block-die-threshold", default = "default_block_die_threshold")]
    pub block_die_threshold: u64,

    /// Enable the durable on-disk block store. When false, committed
    /// blocks are persisted to an in-memory store only.
    #[serde(rename = "use-rocksdb", default)]
    pub use_rocksdb: bool,

    /// Directory for on-disk state; the store opens
    /// `<data-dir>/tc-server-<id>`.
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Default tracing filter: "trace", "debug", "info", "warn", "error".
    #[serde(rename = "log-level", default = "default_log_level")]
    pub log_level: String,

    /// Register runtime metrics.
    #[serde(rename = "profiler-enable", default)]
    pub profiler_enable: bool,

    /// Serve the metrics registry over HTTP on port `9100 + server_id`.
    #[serde(rename = "profiler-listen", default)]
    pub profiler_listen: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_server_id() -> u64 {
    1
}

fn default_client_count() -> u64 {
    1
}

fn default_account_count() -> u64 {
    10_000
}

fn default_generate_tx_rate() -> u64 {
    100
}

fn default_tx_per_block() -> u64 {
    20
}

fn default_pb_pool_limit() -> u64 {
    128
}

fn default_listen_addr() -> String {
    "0.0.0.0:7100".to_string()
}

fn default_peer_listen_addr() -> String {
    "0.0.0.0:7200".to_string()
}

fn default_scheduler_freq() -> u64 {
    200
}

fn default_pack_freq() -> u64 {
    500
}

fn default_count_freq() -> u64 {
    2_000
}

fn default_block_die_threshold() -> u64 {
    30_000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/tmp/tomchain")
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, NodeError> {
        serde_json::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.server_id == 0 {
            return Err(NodeError::Config("server-id must be >= 1".into()));
        }
        if self.server_id > self.server_count {
            return Err(NodeError::Config(format!(
                "server-id {} exceeds server-count {}",
                self.server_id, self.server_count
            )));
        }
        if self.client_count == 0 {
            return Err(NodeError::Config("client-count must be >= 1".into()));
        }
        if self.tx_per_block == 0 {
            return Err(NodeError::Config("tx-per-block must be >= 1".into()));
        }
        if self.server_count > 1 && (self.peer_addr.len() as u64) < self.server_count {
            return Err(NodeError::Config(format!(
                "peer-addr has {} entries for {} servers",
                self.peer_addr.len(),
                self.server_count
            )));
        }
        if self.scheduler_freq == 0 || self.pack_freq == 0 || self.count_freq == 0 {
            return Err(NodeError::Config("tick frequencies must be >= 1 ms".into()));
        }
        Ok(())
    }

    /// Whether this server is the designated packer.
    pub fn is_packer(&self) -> bool {
        self.server_id == self.server_count
    }

    /// Quorum threshold `t`. The engine treats this as a parameter; the
    /// deployed scheme is unanimous (`t = n = client-count`).
    pub fn quorum_threshold(&self) -> usize {
        self.client_count as usize
    }

    /// Per-call RPC timeout: twice the scheduler tick.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduler_freq.saturating_mul(2).max(1))
    }

    /// Ids of all remote peers (every server id except this one).
    pub fn peer_ids(&self) -> Vec<u64> {
        (1..=self.server_count)
            .filter(|id| *id != self.server_id)
            .collect()
    }

    /// Path of this server's on-disk store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(format!("tc-server-{}", self.server_id))
    }
}
