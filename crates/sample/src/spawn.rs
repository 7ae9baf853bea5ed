use glam::{Vec2, Vec3};
use tickworld_common::Transform;
use tickworld_ecs::SpawnDesc;
use tickworld_kernel::{LogicUnit, UnitContext};

use crate::settings::ServerSettings;

pub const ASTEROID: &str = "asteroid";

/// splitmix64: small, seedable and identical on every platform.
#[derive(Debug, Clone)]
pub struct SplitMix64(u64);

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Server unit: populates the level with asteroids once settings exist.
#[derive(Debug, Default)]
pub struct AsteroidSpawnUnit {
    spawned: u32,
}

impl AsteroidSpawnUnit {
    pub fn spawned(&self) -> u32 {
        self.spawned
    }
}

impl LogicUnit for AsteroidSpawnUnit {
    fn update(&mut self, cx: &mut UnitContext<'_>) {
        let Some(settings) = cx.store.resource::<ServerSettings>() else {
            return;
        };
        let game = settings.game.clone();
        if self.spawned >= game.num_asteroids {
            return;
        }

        let mut rng = SplitMix64::new(cx.store.seed() ^ u64::from(self.spawned));
        let size = game.level_size();
        let missing = game.num_asteroids - self.spawned;
        for _ in 0..missing {
            let position = Vec2::new(rng.next_f32() * size.x, rng.next_f32() * size.y);
            let angle = rng.next_f32() * std::f32::consts::TAU;
            let velocity = Vec2::from_angle(angle) * game.asteroid_velocity;
            cx.store.defer_spawn(SpawnDesc {
                name: ASTEROID.to_string(),
                transform: Transform::from_position(position.extend(0.0)),
                velocity: Vec3::new(velocity.x, velocity.y, 0.0),
            });
        }
        self.spawned = game.num_asteroids;
        tracing::debug!(count = missing, tick = ?cx.server_tick.map(|t| t.get()), "asteroids queued");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::GameSettings;
    use tickworld_common::WorldRole;
    use tickworld_ecs::DataStore;
    use tickworld_kernel::StepTime;

    fn run(unit: &mut AsteroidSpawnUnit, store: &mut DataStore) {
        let mut cx = UnitContext {
            store,
            role: WorldRole::Server,
            time: StepTime::default(),
            server_tick: None,
        };
        unit.update(&mut cx);
    }

    #[test]
    fn rng_is_reproducible_and_in_range() {
        let mut a = SplitMix64::new(7);
        let mut b = SplitMix64::new(7);
        for _ in 0..100 {
            let x = a.next_f32();
            assert_eq!(x, b.next_f32());
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn waits_for_settings() {
        let mut store = DataStore::with_seed(1);
        let mut unit = AsteroidSpawnUnit::default();
        run(&mut unit, &mut store);
        assert_eq!(store.pending_commands(), 0);
        assert_eq!(unit.spawned(), 0);
    }

    #[test]
    fn spawns_once_through_the_command_buffer() {
        let mut store = DataStore::with_seed(1);
        store.insert_resource(ServerSettings {
            game: GameSettings {
                num_asteroids: 5,
                ..Default::default()
            },
        });
        let mut unit = AsteroidSpawnUnit::default();
        run(&mut unit, &mut store);
        assert_eq!(store.pending_commands(), 5);
        assert_eq!(store.entity_count(), 0);

        store.playback();
        run(&mut unit, &mut store);
        assert_eq!(store.pending_commands(), 0);
        assert_eq!(store.count_named(ASTEROID), 5);
    }

    #[test]
    fn same_seed_same_field() {
        let make = || {
            let mut store = DataStore::with_seed(42);
            store.insert_resource(ServerSettings {
                game: GameSettings {
                    num_asteroids: 8,
                    ..Default::default()
                },
            });
            run(&mut AsteroidSpawnUnit::default(), &mut store);
            store.playback();
            store.state_hash()
        };
        assert_eq!(make(), make());
    }
}
