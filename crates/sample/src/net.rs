//! In-process loopback transport and the per-world network stream unit.
//!
//! The server world's stream unit listens on a port and pushes a JSON
//! snapshot of its entities to every connected client once per step. A
//! client world's stream unit connects to that port and keeps the newest
//! snapshot it received in the [`SnapshotInbox`] resource.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tickworld_common::EntityId;
use tickworld_ecs::DataStore;
use tickworld_kernel::{LogicUnit, UnitContext};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("port {0} is already bound")]
    AddrInUse(u16),
    #[error("nothing is listening on port {0}")]
    NoListener(u16),
    #[error("connection {0} is not open")]
    NotConnected(u32),
    #[error("snapshot codec: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Identifier of one client connection on the loopback hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

#[derive(Debug, Default)]
struct Listener {
    backlog: Vec<ConnectionId>,
}

#[derive(Debug, Default)]
struct Hub {
    listeners: BTreeMap<u16, Listener>,
    inboxes: BTreeMap<ConnectionId, VecDeque<Vec<u8>>>,
    next_connection: u32,
}

/// A shared in-memory network. Clones talk to the same hub.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn listen(&self, port: u16) -> Result<(), TransportError> {
        let mut hub = self.hub();
        if hub.listeners.contains_key(&port) {
            return Err(TransportError::AddrInUse(port));
        }
        hub.listeners.insert(port, Listener::default());
        Ok(())
    }

    pub fn connect(&self, port: u16) -> Result<ConnectionId, TransportError> {
        let mut hub = self.hub();
        if !hub.listeners.contains_key(&port) {
            return Err(TransportError::NoListener(port));
        }
        hub.next_connection += 1;
        let id = ConnectionId(hub.next_connection);
        hub.inboxes.insert(id, VecDeque::new());
        if let Some(listener) = hub.listeners.get_mut(&port) {
            listener.backlog.push(id);
        }
        Ok(id)
    }

    /// Take the connections that arrived on `port` since the last call.
    pub fn accept(&self, port: u16) -> Vec<ConnectionId> {
        self.hub()
            .listeners
            .get_mut(&port)
            .map(|l| std::mem::take(&mut l.backlog))
            .unwrap_or_default()
    }

    pub fn send(&self, to: ConnectionId, payload: Vec<u8>) -> Result<(), TransportError> {
        match self.hub().inboxes.get_mut(&to) {
            Some(inbox) => {
                inbox.push_back(payload);
                Ok(())
            }
            None => Err(TransportError::NotConnected(to.0)),
        }
    }

    /// Drain every payload queued for `conn`, oldest first.
    pub fn receive(&self, conn: ConnectionId) -> Result<Vec<Vec<u8>>, TransportError> {
        match self.hub().inboxes.get_mut(&conn) {
            Some(inbox) => Ok(inbox.drain(..).collect()),
            None => Err(TransportError::NotConnected(conn.0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: EntityId,
    pub name: String,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Server state at the end of one server step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u32,
    pub entities: Vec<EntityState>,
}

impl Snapshot {
    /// Capture every non-ghost entity that has a transform.
    pub fn capture(store: &DataStore, tick: u32) -> Self {
        let entities = store
            .entities()
            .filter(|id| store.ghost(*id).is_none())
            .filter_map(|id| {
                let transform = store.transform(id)?;
                Some(EntityState {
                    id,
                    name: store.name(id).map(|n| n.0.clone()).unwrap_or_default(),
                    position: transform.position,
                    velocity: store.velocity(id).map(|v| v.0).unwrap_or_default(),
                })
            })
            .collect();
        Self { tick, entities }
    }
}

/// Client world resource: the newest snapshot not yet applied.
#[derive(Debug, Clone, Default)]
pub struct SnapshotInbox {
    pub latest: Option<Snapshot>,
    pub received: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamMode {
    Idle,
    Listening { port: u16, clients: Vec<ConnectionId> },
    Connected { port: u16, conn: ConnectionId },
}

/// Network stream unit. One instance per world; the bootstrap calls
/// [`listen`](Self::listen) on the server's and [`connect`](Self::connect) on each client's.
#[derive(Debug)]
pub struct NetworkStreamUnit {
    net: LoopbackNetwork,
    mode: StreamMode,
    sent: u64,
    received: u64,
}

impl NetworkStreamUnit {
    pub fn new(net: LoopbackNetwork) -> Self {
        Self {
            net,
            mode: StreamMode::Idle,
            sent: 0,
            received: 0,
        }
    }

    pub fn listen(&mut self, port: u16) -> Result<(), TransportError> {
        self.net.listen(port)?;
        tracing::info!(port, "listening");
        self.mode = StreamMode::Listening {
            port,
            clients: Vec::new(),
        };
        Ok(())
    }

    pub fn connect(&mut self, port: u16) -> Result<ConnectionId, TransportError> {
        let conn = self.net.connect(port)?;
        tracing::info!(port, connection = conn.0, "connected");
        self.mode = StreamMode::Connected { port, conn };
        Ok(conn)
    }

    pub fn is_listening(&self) -> bool {
        matches!(self.mode, StreamMode::Listening { .. })
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        match self.mode {
            StreamMode::Connected { conn, .. } => Some(conn),
            _ => None,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self.mode {
            StreamMode::Idle => None,
            StreamMode::Listening { port, .. } | StreamMode::Connected { port, .. } => Some(port),
        }
    }

    /// Connections accepted so far (server side).
    pub fn clients(&self) -> &[ConnectionId] {
        match &self.mode {
            StreamMode::Listening { clients, .. } => clients,
            _ => &[],
        }
    }

    pub fn snapshots_sent(&self) -> u64 {
        self.sent
    }

    pub fn snapshots_received(&self) -> u64 {
        self.received
    }

    fn broadcast(&mut self, store: &DataStore, tick: u32) -> Result<(), TransportError> {
        let StreamMode::Listening { port, clients } = &mut self.mode else {
            return Ok(());
        };
        let accepted = self.net.accept(*port);
        if !accepted.is_empty() {
            tracing::debug!(count = accepted.len(), "accepted connections");
            clients.extend(accepted);
        }
        if clients.is_empty() {
            return Ok(());
        }
        let payload = serde_json::to_vec(&Snapshot::capture(store, tick))?;
        for conn in clients.iter() {
            self.net.send(*conn, payload.clone())?;
            self.sent += 1;
        }
        Ok(())
    }

    fn poll(&mut self, store: &mut DataStore) -> Result<(), TransportError> {
        let StreamMode::Connected { conn, .. } = self.mode else {
            return Ok(());
        };
        let mut newest = None;
        for payload in self.net.receive(conn)? {
            let snapshot: Snapshot = serde_json::from_slice(&payload)?;
            self.received += 1;
            newest = Some(snapshot);
        }
        if let Some(snapshot) = newest {
            if store.resource::<SnapshotInbox>().is_none() {
                store.insert_resource(SnapshotInbox::default());
            }
            if let Some(inbox) = store.resource_mut::<SnapshotInbox>() {
                inbox.latest = Some(snapshot);
                inbox.received = self.received;
            }
        }
        Ok(())
    }
}

impl LogicUnit for NetworkStreamUnit {
    fn update(&mut self, cx: &mut UnitContext<'_>) {
        let result = if cx.role.is_server() {
            let tick = cx.server_tick.map(|t| t.get()).unwrap_or_default();
            self.broadcast(cx.store, tick)
        } else {
            self.poll(cx.store)
        };
        if let Err(err) = result {
            tracing::warn!(role = %cx.role, "network stream: {err}");
        }
    }
}
