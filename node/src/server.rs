//! The main TomChain server struct — wires all subsystems together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use blsttc::PublicKeySet;
use tomchain_crypto::generate_shares;
use tomchain_store::{BlockStore, LmdbBlockStore, MemoryBlockStore};
use tomchain_types::ClientProfile;

use crate::client_rpc::{run_client_listener, ClientService};
use crate::metrics::{serve_metrics, NodeMetrics};
use crate::packer::Packer;
use crate::peer_rpc::{run_peer_listener, PeerSender, PeerService};
use crate::peers::PeerSet;
use crate::pools::{BlockPools, OutboundQueues};
use crate::scheduler::spawn_tasks;
use crate::shutdown::ShutdownController;
use crate::votes::VoteEngine;
use crate::{NodeError, ServerConfig};

/// Well-known seed for the threshold key material. Every server derives
/// the identical share set from it, so shares handed to clients and the
/// aggregated signatures they produce match across the whole deployment.
const TSS_KEYGEN_SEED: [u8; 32] = [0u8; 32];

/// Timeout for joining background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running TomChain server.
pub struct TomchainServer {
    pub config: Arc<ServerConfig>,
    pub pools: Arc<BlockPools>,
    pub outbound: Arc<OutboundQueues>,
    pub engine: Arc<VoteEngine>,
    pub peers: Arc<PeerSet>,
    pub sender: Arc<PeerSender>,
    /// Present only on the designated packer server.
    pub packer: Option<Arc<Packer>>,
    pub clients: Arc<RwLock<HashMap<u64, ClientProfile>>>,
    pub pk_set: PublicKeySet,
    pub store: Arc<Mutex<Box<dyn BlockStore>>>,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,

    client_service: Arc<ClientService>,
    peer_service: Arc<PeerService>,
    task_handles: Vec<JoinHandle<()>>,
}

impl TomchainServer {
    /// Create and initialize a server: open the store, derive client key
    /// material, and build every subsystem. Call [`Self::start`] to bind
    /// the listeners and begin scheduling.
    pub fn new(config: ServerConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let config = Arc::new(config);
        tracing::info!(
            server_id = config.server_id,
            server_count = config.server_count,
            packer = config.is_packer(),
            "initializing server"
        );

        let store: Box<dyn BlockStore> = if config.use_rocksdb {
            Box::new(LmdbBlockStore::open(&config.store_path())?)
        } else {
            Box::new(MemoryBlockStore::new())
        };
        let store = Arc::new(Mutex::new(store));

        // Threshold key shares for every client, derived deterministically
        // so all servers agree on the group key.
        let threshold = config.quorum_threshold();
        let mut rng = StdRng::from_seed(TSS_KEYGEN_SEED);
        let (pk_set, shares) = generate_shares(threshold, config.client_count as usize, &mut rng)?;
        let mut profiles = HashMap::new();
        for share in shares {
            profiles.insert(
                share.signer_id,
                ClientProfile::new(share.signer_id, share.secret, share.public),
            );
        }
        let clients = Arc::new(RwLock::new(profiles));

        let pools = Arc::new(BlockPools::new());
        let peer_ids = config.peer_ids();
        let outbound = Arc::new(OutboundQueues::new(&peer_ids));
        let peers = Arc::new(PeerSet::new(&config));
        let metrics = Arc::new(NodeMetrics::new());

        let engine = Arc::new(VoteEngine::new(
            Arc::clone(&config),
            Arc::clone(&pools),
            Arc::clone(&outbound),
            pk_set.clone(),
            Arc::clone(&store),
            Arc::clone(&metrics),
        ));

        let sender = Arc::new(PeerSender::new(
            Arc::clone(&config),
            Arc::clone(&outbound),
            Arc::clone(&peers),
            Arc::clone(&pools),
        ));

        let packer = config.is_packer().then(|| {
            Arc::new(Packer::new(
                Arc::clone(&config),
                Arc::clone(&pools),
                Arc::clone(&outbound),
                Arc::clone(&metrics),
            ))
        });

        let client_service = Arc::new(ClientService::new(
            Arc::clone(&pools),
            Arc::clone(&engine),
            Arc::clone(&clients),
        ));
        let peer_service = Arc::new(PeerService::new(
            Arc::clone(&pools),
            Arc::clone(&engine),
            Arc::clone(&peers),
        ));

        Ok(Self {
            config,
            pools,
            outbound,
            engine,
            peers,
            sender,
            packer,
            clients,
            pk_set,
            store,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            client_service,
            peer_service,
            task_handles: Vec::new(),
        })
    }

    /// Bind the client and peer listeners and spawn their accept loops.
    /// A bind failure is an init failure.
    pub async fn spawn_listeners(&mut self) -> Result<(), NodeError> {
        let client_listener = TcpListener::bind(&self.config.grpc_listen_addr).await?;
        let peer_listener = TcpListener::bind(&self.config.grpc_peer_listen_addr).await?;
        tracing::info!(
            client_addr = %self.config.grpc_listen_addr,
            peer_addr = %self.config.grpc_peer_listen_addr,
            "listeners bound"
        );

        self.task_handles.push(tokio::spawn(run_client_listener(
            client_listener,
            Arc::clone(&self.client_service),
            self.shutdown.subscribe(),
        )));
        self.task_handles.push(tokio::spawn(run_peer_listener(
            peer_listener,
            Arc::clone(&self.peer_service),
            self.shutdown.subscribe(),
        )));

        if self.config.profiler_enable && self.config.profiler_listen {
            let addr = format!("0.0.0.0:{}", 9100 + self.config.server_id);
            self.task_handles.push(tokio::spawn(serve_metrics(
                Arc::clone(&self.metrics),
                addr,
                self.shutdown.subscribe(),
            )));
        }
        Ok(())
    }

    /// Spawn the periodic drivers.
    pub fn spawn_schedulers(&mut self) {
        let handles = spawn_tasks(
            Arc::clone(&self.config),
            Arc::clone(&self.engine),
            Arc::clone(&self.sender),
            self.packer.clone(),
            Arc::clone(&self.pools),
            Arc::clone(&self.peers),
            Arc::clone(&self.metrics),
            &self.shutdown,
        );
        self.task_handles.extend(handles);
    }

    /// Start the full server: listeners plus scheduled drivers.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        self.spawn_listeners().await?;
        self.spawn_schedulers();
        tracing::info!(server_id = self.config.server_id, "server started");
        Ok(())
    }

    /// Block until SIGINT/SIGTERM.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown.wait_for_signal().await;
    }

    /// Signal shutdown and join all background tasks.
    pub async fn stop(&mut self) {
        self.shutdown.signal();
        let handles = std::mem::take(&mut self.task_handles);
        for handle in handles {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                tracing::warn!("background task did not stop within the shutdown timeout");
            }
        }
        tracing::info!(server_id = self.config.server_id, "server stopped");
    }

    /// The client-service handlers (used directly by in-process tests).
    pub fn client_service(&self) -> Arc<ClientService> {
        Arc::clone(&self.client_service)
    }

    /// The peer-service handlers (used directly by in-process tests).
    pub fn peer_service(&self) -> Arc<PeerService> {
        Arc::clone(&self.peer_service)
    }
}
