//! Minimal deterministic per-world data store.
//!
//! Components are stored in BTreeMap for deterministic iteration order.
//! Each component type has its own storage keyed by EntityId. Structural
//! changes recorded during a pass are deferred into a [`CommandBuffer`] and
//! applied when a barrier calls [`DataStore::playback`].
//!
//! # Invariants
//! - Iteration order is deterministic (BTreeMap).
//! - Entity ids are allocated from the store seed and a counter, so two stores
//!   with the same seed and the same operations hold identical ids.
//! - A store is owned by exactly one world and is never shared.

mod command;
mod resources;

pub use command::{Command, CommandBuffer};
pub use resources::Resources;

use glam::Vec3;
use std::collections::{BTreeMap, BTreeSet};
use tickworld_common::{EntityId, Transform};

/// Human-readable name component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

/// Linear velocity component, units per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity(pub Vec3);

/// Marks a replica of an entity owned by another world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ghost {
    pub source: EntityId,
}

/// Description of an entity to spawn.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnDesc {
    pub name: String,
    pub transform: Transform,
    pub velocity: Vec3,
}

/// Component storage, singleton resources and the deferred command queue of one world.
#[derive(Debug, Default)]
pub struct DataStore {
    seed: u64,
    next_index: u64,
    entities: BTreeSet<EntityId>,
    names: BTreeMap<EntityId, Name>,
    transforms: BTreeMap<EntityId, Transform>,
    velocities: BTreeMap<EntityId, Velocity>,
    ghosts: BTreeMap<EntityId, Ghost>,
    resources: Resources,
    pending: CommandBuffer,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose entity ids derive from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains(&id)
    }

    /// All live entities in canonical order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    /// Allocate the next reproducible entity id without creating the entity.
    pub fn reserve_entity(&mut self) -> EntityId {
        self.next_index += 1;
        EntityId::sequential(self.seed, self.next_index)
    }

    /// Create an entity immediately, bypassing the command buffer.
    pub fn spawn(&mut self, desc: SpawnDesc) -> EntityId {
        let id = self.reserve_entity();
        self.apply(&Command::Spawn {
            id,
            name: desc.name,
            transform: desc.transform,
            velocity: desc.velocity,
        });
        id
    }

    /// Reserve an id now and record the spawn for the next barrier.
    pub fn defer_spawn(&mut self, desc: SpawnDesc) -> EntityId {
        let id = self.reserve_entity();
        self.pending.push(Command::Spawn {
            id,
            name: desc.name,
            transform: desc.transform,
            velocity: desc.velocity,
        });
        id
    }

    /// Record any command for the next barrier.
    pub fn defer(&mut self, command: Command) {
        self.pending.push(command);
    }

    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    /// Apply every deferred command in recording order. Returns how many were applied.
    pub fn playback(&mut self) -> usize {
        let commands = self.pending.drain();
        for command in &commands {
            self.apply(command);
        }
        if !commands.is_empty() {
            tracing::trace!(applied = commands.len(), "command buffer played back");
        }
        commands.len()
    }

    /// Apply one command immediately. Commands targeting missing entities are ignored.
    pub fn apply(&mut self, command: &Command) {
        match command {
            Command::Spawn {
                id,
                name,
                transform,
                velocity,
            } => {
                self.entities.insert(*id);
                self.names.insert(*id, Name(name.clone()));
                self.transforms.insert(*id, *transform);
                self.velocities.insert(*id, Velocity(*velocity));
            }
            Command::Despawn { id } => {
                self.entities.remove(id);
                self.names.remove(id);
                self.transforms.remove(id);
                self.velocities.remove(id);
                self.ghosts.remove(id);
            }
            Command::SetTransform { id, transform } => {
                if let Some(t) = self.transforms.get_mut(id) {
                    *t = *transform;
                }
            }
            Command::SetVelocity { id, velocity } => {
                if let Some(v) = self.velocities.get_mut(id) {
                    v.0 = *velocity;
                }
            }
            Command::MarkGhost { id, source } => {
                if self.entities.contains(id) {
                    self.ghosts.insert(*id, Ghost { source: *source });
                }
            }
        }
    }

    // --- Components ---
    pub fn name(&self, id: EntityId) -> Option<&Name> {
        self.names.get(&id)
    }

    pub fn transform(&self, id: EntityId) -> Option<&Transform> {
        self.transforms.get(&id)
    }

    pub fn transform_mut(&mut self, id: EntityId) -> Option<&mut Transform> {
        self.transforms.get_mut(&id)
    }

    pub fn velocity(&self, id: EntityId) -> Option<&Velocity> {
        self.velocities.get(&id)
    }

    /// Iterate entities that have both a transform and a velocity, mutably.
    pub fn moving_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut Transform, Vec3)> + '_ {
        let velocities = &self.velocities;
        self.transforms.iter_mut().filter_map(move |(id, t)| {
            velocities.get(id).map(|v| (*id, t, v.0))
        })
    }

    pub fn ghost(&self, id: EntityId) -> Option<&Ghost> {
        self.ghosts.get(&id)
    }

    pub fn ghosts(&self) -> &BTreeMap<EntityId, Ghost> {
        &self.ghosts
    }

    /// Find the local replica of a remote entity.
    pub fn ghost_of(&self, source: EntityId) -> Option<EntityId> {
        self.ghosts
            .iter()
            .find(|(_, g)| g.source == source)
            .map(|(id, _)| *id)
    }

    /// Count entities whose name equals `name`.
    pub fn count_named(&self, name: &str) -> usize {
        self.names.values().filter(|n| n.0 == name).count()
    }

    // --- Resources ---
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    pub fn insert_resource<T: 'static>(&mut self, value: T) -> Option<T> {
        self.resources.insert(value)
    }

    pub fn resource<T: 'static>(&self) -> Option<&T> {
        self.resources.get::<T>()
    }

    pub fn resource_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.resources.get_mut::<T>()
    }

    pub fn has_resource<T: 'static>(&self) -> bool {
        self.resources.contains::<T>()
    }

    /// Compute a deterministic hash of entity state for comparison.
    /// Uses canonical (BTreeMap) iteration order; resources are not hashed.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325; // FNV offset basis
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        for id in &self.entities {
            mix(&mut h, id.0.as_bytes());
            if let Some(name) = self.names.get(id) {
                mix(&mut h, name.0.as_bytes());
            }
            if let Some(t) = self.transforms.get(id) {
                for v in t.position.to_array() {
                    mix(&mut h, &v.to_le_bytes());
                }
                for v in t.rotation.to_array() {
                    mix(&mut h, &v.to_le_bytes());
                }
            }
            if let Some(v) = self.velocities.get(id) {
                for c in v.0.to_array() {
                    mix(&mut h, &c.to_le_bytes());
                }
            }
            if let Some(g) = self.ghosts.get(id) {
                mix(&mut h, g.source.0.as_bytes());
            }
        }
        h
    }
}

pub fn crate_info() -> &'static str {
    "tickworld-ecs v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rock(x: f32) -> SpawnDesc {
        SpawnDesc {
            name: "rock".into(),
            transform: Transform::from_position(Vec3::new(x, 0.0, 0.0)),
            velocity: Vec3::new(1.0, 0.0, 0.0),
        }
    }

    #[test]
    fn spawn_and_despawn() {
        let mut store = DataStore::new();
        let id = store.spawn(rock(0.0));
        assert_eq!(store.entity_count(), 1);
        assert_eq!(store.name(id).unwrap().0, "rock");

        store.apply(&Command::Despawn { id });
        assert_eq!(store.entity_count(), 0);
        assert!(store.transform(id).is_none());
        assert!(store.velocity(id).is_none());
    }

    #[test]
    fn deferred_spawn_waits_for_playback() {
        let mut store = DataStore::new();
        let id = store.defer_spawn(rock(1.0));
        assert!(!store.contains(id));
        assert_eq!(store.pending_commands(), 1);

        assert_eq!(store.playback(), 1);
        assert!(store.contains(id));
        assert_eq!(store.pending_commands(), 0);
        assert_eq!(store.playback(), 0);
    }

    #[test]
    fn commands_apply_in_recording_order() {
        let mut store = DataStore::new();
        let id = store.defer_spawn(rock(0.0));
        store.defer(Command::SetVelocity {
            id,
            velocity: Vec3::new(0.0, 2.0, 0.0),
        });
        store.defer(Command::Despawn { id });
        store.playback();
        assert!(!store.contains(id));
    }

    #[test]
    fn ghost_marking_and_lookup() {
        let mut store = DataStore::new();
        let local = store.spawn(rock(0.0));
        let remote = EntityId::sequential(99, 1);
        store.apply(&Command::MarkGhost { id: local, source: remote });
        assert_eq!(store.ghost_of(remote), Some(local));
        assert_eq!(store.ghost(local).unwrap().source, remote);
    }

    #[test]
    fn moving_mut_integrates() {
        let mut store = DataStore::new();
        let id = store.spawn(rock(0.0));
        for (_, t, v) in store.moving_mut() {
            t.position += v * 0.5;
        }
        assert_eq!(store.transform(id).unwrap().position.x, 0.5);
    }

    #[test]
    fn same_seed_same_ops_same_hash() {
        let mut a = DataStore::with_seed(42);
        let mut b = DataStore::with_seed(42);
        for i in 0..10 {
            a.spawn(rock(i as f32));
            b.spawn(rock(i as f32));
        }
        assert_eq!(a.state_hash(), b.state_hash());

        b.spawn(rock(100.0));
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn different_seeds_allocate_different_ids() {
        let mut a = DataStore::with_seed(1);
        let mut b = DataStore::with_seed(2);
        assert_ne!(a.reserve_entity(), b.reserve_entity());
    }

    #[test]
    fn resources_round_trip() {
        struct Settings {
            radius: f32,
        }
        let mut store = DataStore::new();
        assert!(!store.has_resource::<Settings>());
        store.insert_resource(Settings { radius: 15.0 });
        assert!(store.has_resource::<Settings>());
        store.resource_mut::<Settings>().unwrap().radius = 10.0;
        assert_eq!(store.resource::<Settings>().unwrap().radius, 10.0);
    }
}
