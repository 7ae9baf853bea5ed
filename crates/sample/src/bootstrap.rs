use std::fmt;

use tickworld_kernel::{
    ClientServerOrchestrator, FrameTime, GroupId, GroupRegistry, SchedError, SchedulerConfig,
    StaticModule, TickKind, UnitEntry, UnitId,
};

use crate::ghost::GhostUpdateUnit;
use crate::movement::MovementUnit;
use crate::net::{LoopbackNetwork, NetworkStreamUnit, TransportError};
use crate::presentation::PresentationStatsUnit;
use crate::settings::{ClientSettings, GameSettings, ServerSettings};
use crate::spawn::AsteroidSpawnUnit;

pub const NETWORK_PORT: u16 = 50001;

pub const NETWORK_STREAM: UnitId = UnitId::from_static("NetworkStream");
pub const ASTEROID_SPAWN: UnitId = UnitId::from_static("AsteroidSpawn");
pub const MOVEMENT: UnitId = UnitId::from_static("Movement");
pub const GHOST_UPDATE: UnitId = UnitId::from_static("GhostUpdate");
pub const PRESENTATION_STATS: UnitId = UnitId::from_static("PresentationStats");

/// Custom group holding the network stream; runs in both roles.
pub fn network_receive_group() -> GroupId {
    GroupId::custom("NetworkReceive")
}

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Sched(#[from] SchedError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid game settings: {0}")]
    Settings(String),
    #[error("unit {unit} is missing from {world}")]
    MissingUnit { world: String, unit: UnitId },
}

/// The sample's registration table. Every world-bound unit shares `net`.
pub fn module(net: &LoopbackNetwork) -> StaticModule {
    let net = net.clone();
    StaticModule::new("asteroids")
        .with(
            UnitEntry::new(NETWORK_STREAM, move || {
                Box::new(NetworkStreamUnit::new(net.clone()))
            })
            .in_group(network_receive_group()),
        )
        .with(
            UnitEntry::of::<AsteroidSpawnUnit>(ASTEROID_SPAWN)
                .in_group(GroupId::ServerSimulation)
                .before(MOVEMENT),
        )
        .with(UnitEntry::of::<MovementUnit>(MOVEMENT).in_group(GroupId::ClientAndServerSimulation))
        .with(UnitEntry::of::<GhostUpdateUnit>(GHOST_UPDATE).in_group(GroupId::GhostSpawn))
        .with(UnitEntry::of::<PresentationStatsUnit>(PRESENTATION_STATS).in_group(GroupId::ClientPresentation))
}

/// Registry with the sample module and its custom group declaration.
pub fn registry(net: &LoopbackNetwork) -> Result<GroupRegistry, SchedError> {
    let mut registry = GroupRegistry::new();
    registry.declare_group(network_receive_group(), [GroupId::ClientAndServerSimulation])?;
    registry.register_module(module(net));
    Ok(registry)
}

/// Start-up controller: holds every tick entry until the worlds are configured,
/// then configures them on its first update.
#[derive(Debug)]
pub struct Bootstrap {
    game: GameSettings,
    port: u16,
    pending: bool,
}

impl Bootstrap {
    pub fn new(game: GameSettings, port: u16) -> Self {
        Self {
            game,
            port,
            pending: true,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Disable every tick entry and gate the simulation groups on their settings.
    pub fn install(&self, orch: &mut ClientServerOrchestrator) -> Result<(), SampleError> {
        for kind in TickKind::ORDER {
            orch.set_tick_enabled(kind, false);
        }
        if let Some(server) = orch.server_world_mut() {
            server
                .group_mut(&GroupId::ServerSimulation)?
                .require_resource::<ServerSettings>();
        }
        for handle in orch.client_handles().to_vec() {
            orch.try_world_mut(handle)?
                .group_mut(&GroupId::ClientSimulation)?
                .require_resource::<ClientSettings>();
        }
        Ok(())
    }

    /// Configure the worlds once. Returns `true` on the call that did the work.
    pub fn update(&mut self, orch: &mut ClientServerOrchestrator) -> Result<bool, SampleError> {
        if !self.pending {
            return Ok(false);
        }
        self.pending = false;
        let _span = tracing::info_span!("bootstrap", port = self.port).entered();

        if orch.server_world().is_some() {
            orch.set_tick_enabled(TickKind::Server, true);
            if let Some(server) = orch.server_world_mut() {
                server.store_mut().insert_resource(ServerSettings {
                    game: self.game.clone(),
                });
                let name = server.name().to_string();
                server
                    .unit_mut::<NetworkStreamUnit>(&NETWORK_STREAM)
                    .ok_or(SampleError::MissingUnit {
                        world: name,
                        unit: NETWORK_STREAM,
                    })?
                    .listen(self.port)?;
            }
        }

        let clients = orch.client_handles().to_vec();
        if !clients.is_empty() {
            orch.set_tick_enabled(TickKind::ClientSimulation, true);
            orch.set_tick_enabled(TickKind::ClientPresentation, true);
        }
        for handle in clients {
            let world = orch.try_world_mut(handle)?;
            world
                .store_mut()
                .insert_resource(ClientSettings::from(&self.game));
            let name = world.name().to_string();
            world
                .unit_mut::<NetworkStreamUnit>(&NETWORK_STREAM)
                .ok_or(SampleError::MissingUnit {
                    world: name,
                    unit: NETWORK_STREAM,
                })?
                .connect(self.port)?;
        }
        tracing::info!("worlds configured");
        Ok(true)
    }
}

/// Per-world summary printed by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldReport {
    pub name: String,
    pub server_tick: Option<u32>,
    pub entities: usize,
    pub ghosts: usize,
    pub state_hash: u64,
}

impl fmt::Display for WorldReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<14}", self.name)?;
        match self.server_tick {
            Some(tick) => write!(f, " tick={tick:<6}")?,
            None => write!(f, " tick=-     ")?,
        }
        write!(
            f,
            " entities={:<5} ghosts={:<5} hash={:016x}",
            self.entities, self.ghosts, self.state_hash
        )
    }
}

/// A running sample: orchestrator, bootstrap and the loopback network they share.
#[derive(Debug)]
pub struct Session {
    orch: ClientServerOrchestrator,
    bootstrap: Bootstrap,
    net: LoopbackNetwork,
}

impl Session {
    /// Build a server world plus `clients` client worlds, ready for the first frame.
    pub fn launch(
        scheduler: SchedulerConfig,
        game: GameSettings,
        clients: usize,
        port: u16,
    ) -> Result<Self, SampleError> {
        game.validate().map_err(SampleError::Settings)?;
        let net = LoopbackNetwork::new();
        let mut orch = ClientServerOrchestrator::new(registry(&net)?, scheduler)?;

        let discovery = orch.collect_all_candidates();
        tracing::debug!(
            candidates = discovery.candidates.len(),
            warnings = discovery.warnings.len(),
            "sample units discovered"
        );
        orch.init_server_world()?;
        for _ in 0..clients {
            orch.init_client_world()?;
        }

        let bootstrap = Bootstrap::new(game, port);
        bootstrap.install(&mut orch)?;
        Ok(Self {
            orch,
            bootstrap,
            net,
        })
    }

    /// One host frame: bootstrap (first frame only), then every tick entry.
    pub fn frame(&mut self, delta_seconds: f64) -> Result<FrameTime, SampleError> {
        self.bootstrap.update(&mut self.orch)?;
        Ok(self.orch.update(delta_seconds))
    }

    pub fn orchestrator(&self) -> &ClientServerOrchestrator {
        &self.orch
    }

    pub fn orchestrator_mut(&mut self) -> &mut ClientServerOrchestrator {
        &mut self.orch
    }

    pub fn network(&self) -> &LoopbackNetwork {
        &self.net
    }

    pub fn reports(&self) -> Vec<WorldReport> {
        self.orch
            .worlds()
            .iter()
            .map(|world| WorldReport {
                name: world.name().to_string(),
                server_tick: world.server_tick().map(|t| t.get()),
                entities: world.store().entity_count(),
                ghosts: world.store().ghosts().len(),
                state_hash: world.store().state_hash(),
            })
            .collect()
    }
}
