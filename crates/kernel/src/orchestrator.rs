//! Wires discovered candidates into server and client worlds.
//!
//! # Routing
//! For each candidate and each group it declares, in this precedence:
//! 1. A dedicated group of this world's role (or the shared client+server
//!    group) adds the unit to that group directly.
//! 2. A dedicated group of the other role is skipped.
//! 3. Any other group is resolved through the registry; if its affinity
//!    includes this world's role the group is created in the world (and
//!    attached to its own parents) and the unit is added to it.
//!
//! Candidates with no declared group, or whose groups resolve to no role,
//! are left out of every world.

use tickworld_common::WorldRole;

use crate::config::SchedulerConfig;
use crate::error::SchedError;
use crate::group::{GroupConfig, MemberSpec};
use crate::registry::{Candidate, Discovery, GroupId, GroupRegistry, WorldMask};
use crate::tick::{FrameTime, TickEntry, TickKind};
use crate::world::{World, WorldHandle};

/// Where one declared group sends a member in a given world.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Direct(GroupId),
    Skip,
    Resolve,
}

fn route_for(role: WorldRole, group: &GroupId) -> Route {
    match (role, group) {
        (_, GroupId::Custom(_)) => Route::Resolve,
        (WorldRole::Server, GroupId::ServerSimulation | GroupId::ClientAndServerSimulation) => {
            Route::Direct(GroupId::ServerSimulation)
        }
        (WorldRole::Server, _) => Route::Skip,
        (WorldRole::Client(_), GroupId::ClientSimulation | GroupId::ClientAndServerSimulation) => {
            Route::Direct(GroupId::ClientSimulation)
        }
        (WorldRole::Client(_), GroupId::ClientPresentation) => {
            Route::Direct(GroupId::ClientPresentation)
        }
        (WorldRole::Client(_), GroupId::GhostSpawn) => Route::Direct(GroupId::GhostSpawn),
        (WorldRole::Client(_), GroupId::ServerSimulation) => Route::Skip,
    }
}

/// Per-world routing counts, logged after initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingReport {
    /// (unit, group) memberships added.
    pub routed: usize,
    /// Declarations skipped because they belong to the other role.
    pub skipped: usize,
    /// Candidates that ended up in no group of this world.
    pub unrouted: usize,
    /// Custom groups created in this world.
    pub custom_groups: usize,
}

/// Owns the registry, the cached discovery, every world and the three tick entries.
#[derive(Debug)]
pub struct ClientServerOrchestrator {
    config: SchedulerConfig,
    registry: GroupRegistry,
    discovery: Option<Discovery>,
    worlds: Vec<World>,
    server: Option<WorldHandle>,
    clients: Vec<WorldHandle>,
    ticks: [TickEntry; 3],
    elapsed: f64,
}

impl ClientServerOrchestrator {
    pub fn new(registry: GroupRegistry, config: SchedulerConfig) -> Result<Self, SchedError> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            discovery: None,
            worlds: Vec::new(),
            server: None,
            clients: Vec::new(),
            ticks: TickKind::ORDER.map(TickEntry::new),
            elapsed: 0.0,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    /// Run discovery and cache the result for the `init_*` calls.
    pub fn collect_all_candidates(&mut self) -> &Discovery {
        self.discovery.insert(self.registry.discover_candidates())
    }

    /// The cached discovery, if `collect_all_candidates` has run.
    pub fn discovery(&self) -> Option<&Discovery> {
        self.discovery.as_ref()
    }

    /// Create the server world and register it with the server tick entry.
    pub fn init_server_world(&mut self) -> Result<WorldHandle, SchedError> {
        if self.server.is_some() {
            return Err(SchedError::ServerWorldExists);
        }
        let mut world = World::new(WorldRole::Server, self.config.seed);
        world.create_group(
            GroupId::ServerSimulation,
            GroupConfig::server_simulation(self.config.fixed_step_secs, self.config.max_steps_per_frame),
        );
        world.add_root(GroupId::ServerSimulation);

        self.populate(&mut world)?;
        let handle = self.push_world(world);
        self.server = Some(handle);
        self.tick_mut(TickKind::Server).add_world(handle);
        Ok(handle)
    }

    /// Create another client world and register it with both client tick entries.
    pub fn init_client_world(&mut self) -> Result<WorldHandle, SchedError> {
        let role = WorldRole::Client(self.clients.len());
        let seed = self
            .config
            .seed
            .wrapping_add(1 + self.clients.len() as u64);
        let mut world = World::new(role, seed);
        world.create_group(
            GroupId::ClientSimulation,
            GroupConfig::client_simulation(self.config.fixed_step_secs, self.config.max_steps_per_frame),
        );
        world.create_group(GroupId::ClientPresentation, GroupConfig::client_presentation());
        world.create_group(GroupId::GhostSpawn, GroupConfig::nested());
        world.add_root(GroupId::ClientSimulation);
        world.add_root(GroupId::ClientPresentation);

        self.populate(&mut world)?;
        let handle = self.push_world(world);
        self.clients.push(handle);
        self.tick_mut(TickKind::ClientSimulation).add_world(handle);
        self.tick_mut(TickKind::ClientPresentation).add_world(handle);
        Ok(handle)
    }

    fn push_world(&mut self, world: World) -> WorldHandle {
        let handle = WorldHandle::new(self.worlds.len());
        self.worlds.push(world);
        handle
    }

    /// Route every cached candidate into `world`, then sort its groups.
    fn populate(&mut self, world: &mut World) -> Result<RoutingReport, SchedError> {
        let _span = tracing::info_span!("init_world", world = %world.name()).entered();
        if self.discovery.is_none() {
            tracing::debug!("candidates not collected yet; collecting now");
            self.collect_all_candidates();
        }
        let candidates = self
            .discovery
            .as_ref()
            .map(|d| d.candidates.as_slice())
            .unwrap_or(&[]);

        let report = route_candidates(&self.registry, world, candidates)?;
        world.sort_groups()?;
        tracing::info!(
            routed = report.routed,
            skipped = report.skipped,
            unrouted = report.unrouted,
            custom_groups = report.custom_groups,
            units = world.units().len(),
            "world initialized"
        );
        Ok(report)
    }

    pub fn world(&self, handle: WorldHandle) -> Option<&World> {
        self.worlds.get(handle.index())
    }

    pub fn world_mut(&mut self, handle: WorldHandle) -> Option<&mut World> {
        self.worlds.get_mut(handle.index())
    }

    /// Like [`Self::world_mut`], but a stale handle is an error.
    pub fn try_world_mut(&mut self, handle: WorldHandle) -> Result<&mut World, SchedError> {
        self.worlds
            .get_mut(handle.index())
            .ok_or(SchedError::UnknownWorld(handle.index()))
    }

    pub fn server_world(&self) -> Option<&World> {
        self.server.and_then(|h| self.world(h))
    }

    pub fn server_world_mut(&mut self) -> Option<&mut World> {
        let handle = self.server?;
        self.world_mut(handle)
    }

    pub fn client_handles(&self) -> &[WorldHandle] {
        &self.clients
    }

    pub fn client_world(&self, index: usize) -> Option<&World> {
        self.clients.get(index).and_then(|h| self.world(*h))
    }

    pub fn client_world_mut(&mut self, index: usize) -> Option<&mut World> {
        let handle = *self.clients.get(index)?;
        self.world_mut(handle)
    }

    pub fn worlds(&self) -> &[World] {
        &self.worlds
    }

    pub fn tick_entry(&self, kind: TickKind) -> &TickEntry {
        &self.ticks[kind as usize]
    }

    fn tick_mut(&mut self, kind: TickKind) -> &mut TickEntry {
        &mut self.ticks[kind as usize]
    }

    pub fn set_tick_enabled(&mut self, kind: TickKind, enabled: bool) {
        tracing::debug!(entry = %kind, enabled, "tick entry toggled");
        self.tick_mut(kind).set_enabled(enabled);
    }

    /// Run one top-level tick entry.
    pub fn tick(&mut self, kind: TickKind, frame: FrameTime) {
        let entry = &self.ticks[kind as usize];
        entry.update(&mut self.worlds, frame);
    }

    /// One host frame: advance host time and run every tick entry in order.
    pub fn update(&mut self, delta_seconds: f64) -> FrameTime {
        let delta = if delta_seconds.is_finite() && delta_seconds > 0.0 {
            delta_seconds
        } else {
            0.0
        };
        self.elapsed += delta;
        let frame = FrameTime {
            delta,
            elapsed: self.elapsed,
        };
        for kind in TickKind::ORDER {
            self.tick(kind, frame);
        }
        frame
    }

    /// Seconds of host time seen by `update`.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

/// Add every candidate to the groups it belongs to in `world`.
pub fn route_candidates(
    registry: &GroupRegistry,
    world: &mut World,
    candidates: &[Candidate],
) -> Result<RoutingReport, SchedError> {
    let role = world.role();
    let mut report = RoutingReport::default();

    for candidate in candidates {
        let mut placed = false;
        for group in &candidate.groups {
            let target = match route_for(role, group) {
                Route::Direct(target) => target,
                Route::Skip => {
                    tracing::trace!(unit = %candidate.id, %group, "declared for the other role; skipped");
                    report.skipped += 1;
                    continue;
                }
                Route::Resolve => {
                    let mask = registry.resolve_world_affinity(group)?;
                    if !mask.intersects(WorldMask::for_role(role)) {
                        tracing::trace!(unit = %candidate.id, %group, ?mask, "group not hosted by this role");
                        continue;
                    }
                    report.custom_groups += ensure_custom_group(registry, world, group, candidate.ordinal)?;
                    group.clone()
                }
            };

            let key = world.get_or_create_unit(candidate);
            world
                .group_mut(&target)?
                .add_unit(key, MemberSpec::from(candidate));
            tracing::debug!(unit = %candidate.id, group = %target, world = %world.name(), "unit routed");
            report.routed += 1;
            placed = true;
        }
        if !placed {
            tracing::debug!(unit = %candidate.id, world = %world.name(), "candidate not routed to this world");
            report.unrouted += 1;
        }
    }
    Ok(report)
}

/// Create custom `group` in `world` and hook it under each of its parents this role hosts.
///
/// Returns how many groups were created. `ordinal` positions the group among
/// its parent's members.
fn ensure_custom_group(
    registry: &GroupRegistry,
    world: &mut World,
    group: &GroupId,
    ordinal: usize,
) -> Result<usize, SchedError> {
    if world.has_group(group) {
        return Ok(0);
    }
    world.create_group(group.clone(), GroupConfig::nested());
    let mut created = 1;
    let role_mask = WorldMask::for_role(world.role());

    for parent in registry.declared_parents(group) {
        let target = match route_for(world.role(), parent) {
            Route::Direct(target) => target,
            Route::Skip => continue,
            Route::Resolve => {
                if !registry.resolve_world_affinity(parent)?.intersects(role_mask) {
                    continue;
                }
                created += ensure_custom_group(registry, world, parent, ordinal)?;
                parent.clone()
            }
        };
        world.group_mut(&target)?.add_group(group.clone(), ordinal);
        tracing::debug!(%group, parent = %target, world = %world.name(), "group attached");
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{StaticModule, UnitEntry, UnitId};
    use crate::unit::NoopUnit;

    fn noop(id: &'static str) -> UnitEntry {
        UnitEntry::of::<NoopUnit>(id)
    }

    #[test]
    fn route_table_per_role() {
        let server = WorldRole::Server;
        let client = WorldRole::Client(0);
        assert_eq!(route_for(server, &GroupId::ServerSimulation), Route::Direct(GroupId::ServerSimulation));
        assert_eq!(
            route_for(server, &GroupId::ClientAndServerSimulation),
            Route::Direct(GroupId::ServerSimulation)
        );
        assert_eq!(route_for(server, &GroupId::ClientPresentation), Route::Skip);
        assert_eq!(route_for(server, &GroupId::GhostSpawn), Route::Skip);
        assert_eq!(
            route_for(client, &GroupId::ClientAndServerSimulation),
            Route::Direct(GroupId::ClientSimulation)
        );
        assert_eq!(route_for(client, &GroupId::ServerSimulation), Route::Skip);
        assert_eq!(route_for(client, &GroupId::custom("X")), Route::Resolve);
    }

    #[test]
    fn second_server_world_is_rejected() {
        let mut orch = ClientServerOrchestrator::new(GroupRegistry::new(), SchedulerConfig::default()).unwrap();
        orch.collect_all_candidates();
        orch.init_server_world().unwrap();
        assert!(matches!(orch.init_server_world(), Err(SchedError::ServerWorldExists)));
        assert!(matches!(
            orch.try_world_mut(WorldHandle::new(7)),
            Err(SchedError::UnknownWorld(7))
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = SchedulerConfig {
            max_steps_per_frame: 0,
            ..Default::default()
        };
        assert!(ClientServerOrchestrator::new(GroupRegistry::new(), cfg).is_err());
    }

    #[test]
    fn init_collects_candidates_when_needed() {
        let mut reg = GroupRegistry::new();
        reg.register_module(StaticModule::new("m").with(noop("A").in_group(GroupId::ServerSimulation)));
        let mut orch = ClientServerOrchestrator::new(reg, SchedulerConfig::default()).unwrap();
        let h = orch.init_server_world().unwrap();
        assert!(orch.discovery().is_some());
        assert_eq!(
            orch.world(h).unwrap().execution_order(&GroupId::ServerSimulation, false),
            vec![UnitId::new("A")]
        );
    }

    #[test]
    fn custom_group_chain_is_attached_under_root() {
        let mut reg = GroupRegistry::new();
        reg.declare_group(GroupId::custom("Outer"), [GroupId::ServerSimulation]).unwrap();
        reg.declare_group(GroupId::custom("Inner"), [GroupId::custom("Outer")]).unwrap();
        reg.register_module(
            StaticModule::new("m")
                .with(noop("First").in_group(GroupId::ServerSimulation))
                .with(noop("Deep").in_group(GroupId::custom("Inner")))
                .with(noop("Last").in_group(GroupId::ServerSimulation)),
        );
        let mut orch = ClientServerOrchestrator::new(reg, SchedulerConfig::default()).unwrap();
        orch.collect_all_candidates();
        let h = orch.init_server_world().unwrap();
        let world = orch.world(h).unwrap();
        assert!(world.has_group(&GroupId::custom("Outer")));
        assert!(world.has_group(&GroupId::custom("Inner")));
        assert_eq!(
            world.execution_order(&GroupId::ServerSimulation, false),
            vec![UnitId::new("First"), UnitId::new("Deep"), UnitId::new("Last")]
        );
    }

    #[test]
    fn cyclic_declaration_aborts_world_init() {
        let mut reg = GroupRegistry::new();
        reg.declare_group(GroupId::custom("A"), [GroupId::custom("B")]).unwrap();
        reg.declare_group(GroupId::custom("B"), [GroupId::custom("A")]).unwrap();
        reg.register_module(StaticModule::new("m").with(noop("U").in_group(GroupId::custom("A"))));
        let mut orch = ClientServerOrchestrator::new(reg, SchedulerConfig::default()).unwrap();
        orch.collect_all_candidates();
        let err = orch.init_server_world().unwrap_err();
        assert!(matches!(err, SchedError::CyclicGroupDeclaration { .. }));
        assert!(orch.server_world().is_none());
        assert!(orch.worlds().is_empty());
    }

    #[test]
    fn update_runs_entries_in_order_and_tracks_time() {
        let mut orch = ClientServerOrchestrator::new(GroupRegistry::new(), SchedulerConfig::default()).unwrap();
        orch.collect_all_candidates();
        orch.init_server_world().unwrap();
        orch.init_client_world().unwrap();
        let frame = orch.update(1.0 / 60.0);
        assert_eq!(frame.elapsed, 1.0 / 60.0);
        assert_eq!(orch.server_world().unwrap().server_tick().unwrap().get(), 2);

        orch.set_tick_enabled(TickKind::Server, false);
        orch.update(1.0 / 60.0);
        assert_eq!(orch.server_world().unwrap().server_tick().unwrap().get(), 2);
        assert!(!orch.tick_entry(TickKind::Server).is_enabled());
    }
}
