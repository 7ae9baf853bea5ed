use std::collections::BTreeMap;

use tickworld_common::{EntityId, Transform};
use tickworld_ecs::{Command, SpawnDesc};
use tickworld_kernel::{LogicUnit, UnitContext};

use crate::net::SnapshotInbox;

/// Client unit in the ghost spawn group: mirrors the newest server snapshot
/// into local replica entities.
///
/// Spawns and state updates are applied immediately, so replicas exist when
/// the ordinary client simulation units run later in the same step.
/// Despawns are deferred to the end barrier.
#[derive(Debug, Default)]
pub struct GhostUpdateUnit {
    applied_tick: Option<u32>,
    spawned: u64,
    despawned: u64,
}

impl GhostUpdateUnit {
    /// Server tick of the last snapshot mirrored.
    pub fn applied_tick(&self) -> Option<u32> {
        self.applied_tick
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    pub fn despawned(&self) -> u64 {
        self.despawned
    }
}

impl LogicUnit for GhostUpdateUnit {
    fn update(&mut self, cx: &mut UnitContext<'_>) {
        let Some(snapshot) = cx
            .store
            .resource_mut::<SnapshotInbox>()
            .and_then(|inbox| inbox.latest.take())
        else {
            return;
        };

        let mut replicas: BTreeMap<EntityId, EntityId> = cx
            .store
            .ghosts()
            .iter()
            .map(|(id, ghost)| (ghost.source, *id))
            .collect();

        for remote in snapshot.entities {
            let transform = Transform::from_position(remote.position);
            match replicas.remove(&remote.id) {
                Some(local) => {
                    cx.store.apply(&Command::SetTransform {
                        id: local,
                        transform,
                    });
                    cx.store.apply(&Command::SetVelocity {
                        id: local,
                        velocity: remote.velocity,
                    });
                }
                None => {
                    let local = cx.store.spawn(SpawnDesc {
                        name: remote.name,
                        transform,
                        velocity: remote.velocity,
                    });
                    cx.store.apply(&Command::MarkGhost {
                        id: local,
                        source: remote.id,
                    });
                    self.spawned += 1;
                }
            }
        }

        // Whatever is left was not in the snapshot: the server dropped it.
        for local in replicas.into_values() {
            cx.store.defer(Command::Despawn { id: local });
            self.despawned += 1;
        }
        self.applied_tick = Some(snapshot.tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{EntityState, Snapshot};
    use glam::Vec3;
    use tickworld_common::WorldRole;
    use tickworld_ecs::DataStore;
    use tickworld_kernel::StepTime;

    fn deliver(store: &mut DataStore, tick: u32, entities: Vec<EntityState>) {
        store.insert_resource(SnapshotInbox {
            latest: Some(Snapshot { tick, entities }),
            received: 1,
        });
    }

    fn run(unit: &mut GhostUpdateUnit, store: &mut DataStore) {
        let mut cx = UnitContext {
            store,
            role: WorldRole::Client(0),
            time: StepTime::default(),
            server_tick: None,
        };
        unit.update(&mut cx);
    }

    fn step(unit: &mut GhostUpdateUnit, store: &mut DataStore) {
        run(unit, store);
        store.playback();
    }

    fn remote(seed: u64, x: f32) -> EntityState {
        EntityState {
            id: EntityId::sequential(seed, 1),
            name: "asteroid".into(),
            position: Vec3::new(x, 0.0, 0.0),
            velocity: Vec3::Y,
        }
    }

    #[test]
    fn spawns_updates_and_despawns_replicas() {
        let mut store = DataStore::with_seed(5);
        let mut unit = GhostUpdateUnit::default();

        deliver(&mut store, 2, vec![remote(100, 1.0), remote(200, 2.0)]);
        step(&mut unit, &mut store);
        assert_eq!(store.ghosts().len(), 2);
        assert_eq!(unit.spawned(), 2);
        assert_eq!(unit.applied_tick(), Some(2));

        deliver(&mut store, 3, vec![remote(100, 9.0)]);
        step(&mut unit, &mut store);
        assert_eq!(store.ghosts().len(), 1);
        assert_eq!(unit.despawned(), 1);
        let local = store.ghost_of(EntityId::sequential(100, 1)).unwrap();
        assert_eq!(store.transform(local).unwrap().position.x, 9.0);
    }

    #[test]
    fn spawns_land_before_the_barrier_and_despawns_after() {
        let mut store = DataStore::with_seed(5);
        let mut unit = GhostUpdateUnit::default();

        deliver(&mut store, 2, vec![remote(100, 1.0), remote(200, 2.0)]);
        run(&mut unit, &mut store);
        assert_eq!(store.ghosts().len(), 2);
        assert_eq!(store.pending_commands(), 0);

        deliver(&mut store, 3, vec![remote(100, 4.0)]);
        run(&mut unit, &mut store);
        let local = store.ghost_of(EntityId::sequential(100, 1)).unwrap();
        assert_eq!(store.transform(local).unwrap().position.x, 4.0);
        assert_eq!(store.ghosts().len(), 2);
        assert_eq!(store.pending_commands(), 1);
        store.playback();
        assert_eq!(store.ghosts().len(), 1);
    }

    #[test]
    fn snapshot_is_applied_once() {
        let mut store = DataStore::with_seed(5);
        let mut unit = GhostUpdateUnit::default();
        deliver(&mut store, 2, vec![remote(100, 1.0)]);
        step(&mut unit, &mut store);
        step(&mut unit, &mut store);
        assert_eq!(unit.spawned(), 1);
        assert!(store.resource::<SnapshotInbox>().unwrap().latest.is_none());
    }
}
