use std::collections::BTreeMap;

use tickworld_common::WorldRole;
use tickworld_ecs::DataStore;

use crate::error::SchedError;
use crate::group::{Group, GroupConfig, GroupEnv, Member};
use crate::registry::{Candidate, GroupId, UnitId};
use crate::tick::{FrameTime, ServerTick};
use crate::unit::{LogicUnit, UnitKey, UnitTable, WorldState};

/// Index of a world inside its orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldHandle(usize);

impl WorldHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// An isolated simulation context.
///
/// A world owns its data store, its unit instances and its groups. Nothing
/// in a world is shared with another world.
#[derive(Debug)]
pub struct World {
    name: String,
    role: WorldRole,
    store: DataStore,
    units: UnitTable,
    groups: BTreeMap<GroupId, Group>,
    state: WorldState,
    roots: Vec<GroupId>,
}

impl World {
    /// Create an empty world whose entity ids derive from `seed`.
    pub fn new(role: WorldRole, seed: u64) -> Self {
        Self {
            name: role.world_name(),
            role,
            store: DataStore::with_seed(seed),
            units: UnitTable::new(),
            groups: BTreeMap::new(),
            state: WorldState::new(role),
            roots: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> WorldRole {
        self.role
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DataStore {
        &mut self.store
    }

    pub fn units(&self) -> &UnitTable {
        &self.units
    }

    /// Server tick of this world's server simulation group, if it has one.
    pub fn server_tick(&self) -> Option<ServerTick> {
        self.groups
            .get(&GroupId::ServerSimulation)
            .and_then(Group::server_tick)
    }

    /// The unit instance for `candidate`, constructed on first request.
    pub fn get_or_create_unit(&mut self, candidate: &Candidate) -> UnitKey {
        self.units
            .get_or_insert_with(&candidate.id, || candidate.instantiate())
    }

    /// Downcast a unit instance by id.
    pub fn unit<T: LogicUnit>(&self, id: &UnitId) -> Option<&T> {
        self.units.downcast::<T>(id)
    }

    pub fn unit_mut<T: LogicUnit>(&mut self, id: &UnitId) -> Option<&mut T> {
        self.units.downcast_mut::<T>(id)
    }

    /// Create group `id` unless it already exists. Returns `true` if it was created.
    pub fn create_group(&mut self, id: GroupId, config: GroupConfig) -> bool {
        if self.groups.contains_key(&id) {
            return false;
        }
        let group = Group::new(id.clone(), config, &mut self.units);
        tracing::debug!(world = %self.name, group = %id, "group created");
        self.groups.insert(id, group);
        true
    }

    /// Mark a group as a root: one that a top-level tick entry updates directly.
    pub fn add_root(&mut self, id: GroupId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    pub fn roots(&self) -> &[GroupId] {
        &self.roots
    }

    pub fn has_group(&self, id: &GroupId) -> bool {
        self.groups.contains_key(id)
    }

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn group_mut(&mut self, id: &GroupId) -> Result<&mut Group, SchedError> {
        match self.groups.get_mut(id) {
            Some(group) => Ok(group),
            None => Err(SchedError::UnknownGroup {
                world: self.name.clone(),
                group: id.clone(),
            }),
        }
    }

    pub fn group_ids(&self) -> impl Iterator<Item = &GroupId> {
        self.groups.keys()
    }

    /// Sort every group in the world.
    pub fn sort_groups(&mut self) -> Result<(), SchedError> {
        for group in self.groups.values_mut() {
            group.sort()?;
        }
        Ok(())
    }

    /// Update one group for a host frame. Unknown groups are ignored.
    pub fn update_group(&mut self, id: &GroupId, frame: FrameTime) {
        let Some(mut group) = self.groups.remove(id) else {
            tracing::trace!(world = %self.name, group = %id, "no such group to update");
            return;
        };
        let mut env = GroupEnv {
            units: &mut self.units,
            store: &mut self.store,
            state: &mut self.state,
            groups: &mut self.groups,
        };
        group.update(&mut env, frame);
        self.groups.insert(id.clone(), group);
    }

    /// Leaf units of a group in execution order, nested groups expanded.
    ///
    /// Barriers are included only when `with_barriers` is set.
    pub fn execution_order(&self, id: &GroupId, with_barriers: bool) -> Vec<UnitId> {
        let mut out = Vec::new();
        self.flatten_into(id, with_barriers, &mut out);
        out
    }

    fn flatten_into(&self, id: &GroupId, with_barriers: bool, out: &mut Vec<UnitId>) {
        let Some(group) = self.groups.get(id) else {
            return;
        };
        let members = if with_barriers {
            group.execution()
        } else {
            group.sorted_members()
        };
        for member in members {
            match member {
                Member::Unit(key) => {
                    if let Some(unit) = self.units.id_of(*key) {
                        out.push(unit.clone());
                    }
                }
                Member::Group(nested) => self.flatten_into(nested, with_barriers, out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{GroupRegistry, StaticModule, UnitEntry};
    use crate::unit::{NoopUnit, UnitContext};

    #[derive(Default)]
    struct Counter {
        runs: u32,
    }

    impl LogicUnit for Counter {
        fn update(&mut self, _cx: &mut UnitContext<'_>) {
            self.runs += 1;
        }
    }

    fn candidates() -> Vec<Candidate> {
        let mut reg = GroupRegistry::new();
        reg.register_module(
            StaticModule::new("test")
                .with(UnitEntry::of::<Counter>("Counter").in_group(GroupId::ServerSimulation))
                .with(UnitEntry::of::<NoopUnit>("Noop").in_group(GroupId::ServerSimulation)),
        );
        reg.discover_candidates().candidates
    }

    #[test]
    fn world_names_follow_role() {
        assert_eq!(World::new(WorldRole::Server, 0).name(), "ServerWorld");
        assert_eq!(World::new(WorldRole::Client(1), 0).name(), "ClientWorld1");
    }

    #[test]
    fn units_are_created_lazily_once() {
        let cands = candidates();
        let mut world = World::new(WorldRole::Server, 0);
        assert!(world.units().is_empty());
        let a = world.get_or_create_unit(&cands[0]);
        let b = world.get_or_create_unit(&cands[0]);
        assert_eq!(a, b);
        assert_eq!(world.units().len(), 1);
    }

    #[test]
    fn group_creation_is_idempotent() {
        let mut world = World::new(WorldRole::Server, 0);
        assert!(world.create_group(GroupId::custom("G"), GroupConfig::nested()));
        assert!(!world.create_group(GroupId::custom("G"), GroupConfig::nested()));
        assert!(world.group_mut(&GroupId::custom("Missing")).is_err());
    }

    #[test]
    fn update_group_runs_members_and_counts_ticks() {
        let cands = candidates();
        let mut world = World::new(WorldRole::Server, 0);
        world.create_group(GroupId::ServerSimulation, GroupConfig::server_simulation(1.0 / 60.0, 4));
        for c in &cands {
            let key = world.get_or_create_unit(c);
            world
                .group_mut(&GroupId::ServerSimulation)
                .unwrap()
                .add_unit(key, c.into());
        }
        world.sort_groups().unwrap();

        let frame = FrameTime {
            delta: 1.0 / 30.0,
            elapsed: 1.0 / 30.0,
        };
        world.update_group(&GroupId::ServerSimulation, frame);
        assert_eq!(world.unit::<Counter>(&UnitId::new("Counter")).unwrap().runs, 2);
        assert_eq!(world.server_tick().unwrap().get(), 3);
        assert!(world.has_group(&GroupId::ServerSimulation));
    }

    #[test]
    fn execution_order_with_and_without_barriers() {
        let cands = candidates();
        let mut world = World::new(WorldRole::Server, 0);
        world.create_group(GroupId::ServerSimulation, GroupConfig::server_simulation(1.0 / 60.0, 4));
        for c in &cands {
            let key = world.get_or_create_unit(c);
            world
                .group_mut(&GroupId::ServerSimulation)
                .unwrap()
                .add_unit(key, c.into());
        }
        world.sort_groups().unwrap();

        let bare = world.execution_order(&GroupId::ServerSimulation, false);
        assert_eq!(bare, vec![UnitId::new("Counter"), UnitId::new("Noop")]);
        let full = world.execution_order(&GroupId::ServerSimulation, true);
        assert_eq!(full.len(), 4);
        assert_eq!(full[0].as_str(), "BeginSimulationCommandBuffer");
        assert_eq!(full[3].as_str(), "EndSimulationCommandBuffer");
    }
}
