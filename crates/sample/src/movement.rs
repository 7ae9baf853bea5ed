use glam::Vec2;
use tickworld_kernel::{LogicUnit, UnitContext};

use crate::settings::{ClientSettings, ServerSettings, wrap_position};

/// Integrates velocity into position and wraps at the level edges. Runs in both roles.
#[derive(Debug, Default)]
pub struct MovementUnit {
    steps: u64,
}

impl MovementUnit {
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

fn level_size(cx: &UnitContext<'_>) -> Option<Vec2> {
    if cx.role.is_server() {
        cx.store.resource::<ServerSettings>().map(|s| s.game.level_size())
    } else {
        cx.store.resource::<ClientSettings>().map(|s| s.level_size)
    }
}

impl LogicUnit for MovementUnit {
    fn update(&mut self, cx: &mut UnitContext<'_>) {
        let Some(size) = level_size(cx) else {
            return;
        };
        let dt = cx.time.delta as f32;
        for (_, transform, velocity) in cx.store.moving_mut() {
            let moved = transform.position.truncate() + velocity.truncate() * dt;
            let wrapped = wrap_position(moved, size);
            transform.position.x = wrapped.x;
            transform.position.y = wrapped.y;
        }
        self.steps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use tickworld_common::{Transform, WorldRole};
    use tickworld_ecs::{DataStore, SpawnDesc};
    use tickworld_kernel::StepTime;

    fn step(unit: &mut MovementUnit, store: &mut DataStore, role: WorldRole, delta: f64) {
        let mut cx = UnitContext {
            store,
            role,
            time: StepTime {
                update_time: 0.0,
                delta,
            },
            server_tick: None,
        };
        unit.update(&mut cx);
    }

    #[test]
    fn moves_and_wraps_on_client() {
        let mut store = DataStore::new();
        store.insert_resource(ClientSettings {
            level_size: Vec2::new(100.0, 100.0),
        });
        let id = store.spawn(SpawnDesc {
            name: "rock".into(),
            transform: Transform::from_position(Vec3::new(95.0, 50.0, 0.0)),
            velocity: Vec3::new(10.0, 0.0, 0.0),
        });
        let mut unit = MovementUnit::default();
        step(&mut unit, &mut store, WorldRole::Client(0), 1.0);
        assert_eq!(store.transform(id).unwrap().position, Vec3::new(5.0, 50.0, 0.0));
        assert_eq!(unit.steps(), 1);
    }

    #[test]
    fn idle_without_settings() {
        let mut store = DataStore::new();
        let id = store.spawn(SpawnDesc {
            name: "rock".into(),
            transform: Transform::default(),
            velocity: Vec3::X,
        });
        let mut unit = MovementUnit::default();
        step(&mut unit, &mut store, WorldRole::Server, 1.0);
        assert_eq!(store.transform(id).unwrap().position, Vec3::ZERO);
        assert_eq!(unit.steps(), 0);
    }
}
