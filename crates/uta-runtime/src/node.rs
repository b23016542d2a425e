//! Cluster assembly: nodes, the entity registry, and envelope routing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uta_core::{EntityId, NodeConfig, NodeName};
use uta_entities::map::CityMap;
use uta_entities::proto::{Command, Envelope, Message, VizEvent};
use uta_journal::{
    EventJournal, FileJournal, FileSnapshots, JournalResult, MemoryJournal, MemorySnapshots,
    SnapshotStore,
};

use crate::shard::ShardTopology;
use crate::time::TimeBroadcaster;
use crate::entity;

/// Mailbox depth per entity.  Senders never block on a full mailbox (the
/// overflow send is completed from a detached task), so this only bounds
/// memory, not liveness.
const MAILBOX: usize = 256;

/// Visualization fan-out buffer; slow clients lose old frames, by design.
const VIZ_BUFFER: usize = 1024;

// ── Services ──────────────────────────────────────────────────────────────────

/// Process-wide stateful services, injected into every entity at
/// construction — never reached through ambient globals.
#[derive(Clone)]
pub struct Services {
    pub journal:   Arc<dyn EventJournal>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub map:       Arc<CityMap>,
    pub config:    Arc<NodeConfig>,
    pub time:      TimeBroadcaster,
    pub viz:       broadcast::Sender<VizEvent>,
}

impl Services {
    /// Heap-backed persistence (tests, throwaway runs).
    pub fn in_memory(map: CityMap, config: NodeConfig) -> Services {
        let (viz, _) = broadcast::channel(VIZ_BUFFER);
        Services {
            journal:   Arc::new(MemoryJournal::new()),
            snapshots: Arc::new(MemorySnapshots::new()),
            map:       Arc::new(map),
            config:    Arc::new(config),
            time:      TimeBroadcaster::new(),
            viz,
        }
    }

    /// File-backed persistence under `config.journal_dir`.
    ///
    /// Falls back to the in-memory stores when no directory is configured.
    pub fn open(map: CityMap, config: NodeConfig) -> JournalResult<Services> {
        let Some(dir) = config.journal_dir.clone() else {
            return Ok(Self::in_memory(map, config));
        };
        let (viz, _) = broadcast::channel(VIZ_BUFFER);
        Ok(Services {
            journal:   Arc::new(FileJournal::open(&dir, config.sync_writes)?),
            snapshots: Arc::new(FileSnapshots::open(&dir)?),
            map:       Arc::new(map),
            config:    Arc::new(config),
            time:      TimeBroadcaster::new(),
            viz,
        })
    }
}

// ── Node ──────────────────────────────────────────────────────────────────────

/// One logical cluster node: a registry of live entity mailboxes.
///
/// The registry upholds the shard-singleton property within the process:
/// `ensure_entity` is the only spawn path and it runs under the registry
/// lock, so an entity ID maps to at most one live task.
pub struct Node {
    pub name: NodeName,
    pub addr: String,
    registry: Mutex<HashMap<EntityId, mpsc::Sender<Envelope>>>,
}

impl Node {
    fn new(name: NodeName, addr: String) -> Arc<Node> {
        Arc::new(Node {
            name,
            addr,
            registry: Mutex::new(HashMap::new()),
        })
    }

    /// Find the live mailbox for `id`, spawning the entity task if needed.
    fn ensure_entity(
        self: &Arc<Node>,
        id: &EntityId,
        cluster: &Arc<Cluster>,
    ) -> mpsc::Sender<Envelope> {
        let mut registry = self.registry.lock().expect("registry lock poisoned");
        if let Some(tx) = registry.get(id) {
            if !tx.is_closed() {
                return tx.clone();
            }
        }
        debug!(node = %self.name, entity = %id, "spawning entity task");
        let (tx, rx) = mpsc::channel(MAILBOX);
        tokio::spawn(entity::run(
            id.clone(),
            rx,
            Arc::clone(self),
            Arc::clone(cluster),
        ));
        registry.insert(id.clone(), tx.clone());
        tx
    }

    /// Remove a finished entity from the registry (stop or fatal error).
    pub(crate) fn deregister(&self, id: &EntityId) {
        let mut registry = self.registry.lock().expect("registry lock poisoned");
        registry.remove(id);
    }

    /// Number of live entities on this node.
    pub fn live_entities(&self) -> usize {
        let registry = self.registry.lock().expect("registry lock poisoned");
        registry.values().filter(|tx| !tx.is_closed()).count()
    }
}

// ── Cluster ───────────────────────────────────────────────────────────────────

/// The set of logical nodes hosted by this process, plus the routing table.
pub struct Cluster {
    topology: ShardTopology,
    nodes:    Vec<Arc<Node>>,
    services: Services,
}

impl Cluster {
    pub fn new(services: Services) -> Arc<Cluster> {
        let config = &services.config;
        let topology = ShardTopology::new(config.shard_count, config.node_count);
        let nodes = (0..topology.node_count)
            .map(|i| Node::new(NodeName::for_index(i), config.ws_bind.clone()))
            .collect();
        info!(
            shards = topology.shard_count,
            nodes = topology.node_count,
            "cluster assembled"
        );
        Arc::new(Cluster { topology, nodes, services })
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn topology(&self) -> ShardTopology {
        self.topology
    }

    fn node_for(&self, id: &EntityId) -> &Arc<Node> {
        &self.nodes[self.topology.node_for(id)]
    }

    /// Route one envelope to the destination entity's mailbox, spawning the
    /// entity on its owning node if it is not live.
    ///
    /// Never blocks the caller and never drops: a full mailbox is drained by
    /// a detached task that completes the send.
    pub fn route(self: &Arc<Cluster>, envelope: Envelope) {
        // Two attempts: the entity may stop between lookup and send.
        for _ in 0..2 {
            let node = self.node_for(&envelope.to);
            let tx = node.ensure_entity(&envelope.to, self);
            match tx.try_send(envelope.clone()) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(envelope)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if tx.send(envelope).await.is_err() {
                            warn!("mailbox closed while draining an overflow send");
                        }
                    });
                    return;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    node.deregister(&envelope.to);
                    continue;
                }
            }
        }
        warn!(to = %envelope.to, "destination entity kept stopping; envelope dropped");
    }

    /// Spawn (or revive) `id` on its owning node without sending anything.
    pub fn spawn(self: &Arc<Cluster>, id: &EntityId) {
        let node = self.node_for(id).clone();
        node.ensure_entity(id, self);
    }

    /// Unreliable one-shot from a non-persistent sender (the injector).
    pub fn tell(self: &Arc<Cluster>, from: EntityId, to: EntityId, command: Command) {
        self.route(Envelope { from, to, message: Message::Tell { command } });
    }

    /// Stop accepting envelopes and let entity mailboxes drain.  Pending
    /// snapshots are neither cancelled nor awaited.
    pub fn shutdown(&self) {
        info!("cluster shutting down");
        for node in &self.nodes {
            let mut registry = node.registry.lock().expect("registry lock poisoned");
            registry.clear();
        }
    }

    /// Total live entities across all nodes.
    pub fn live_entities(&self) -> usize {
        self.nodes.iter().map(|node| node.live_entities()).sum()
    }
}
