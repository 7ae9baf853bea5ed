use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Tunables of the sample game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub asteroid_radius: f32,
    pub player_radius: f32,
    pub bullet_radius: f32,
    pub asteroid_velocity: f32,
    pub player_force: f32,
    pub bullet_velocity: f32,
    pub num_asteroids: u32,
    pub level_width: u32,
    pub level_height: u32,
    pub damage_ships: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            asteroid_radius: 15.0,
            player_radius: 10.0,
            bullet_radius: 1.0,
            asteroid_velocity: 10.0,
            player_force: 50.0,
            bullet_velocity: 500.0,
            num_asteroids: 200,
            level_width: 2048,
            level_height: 2048,
            damage_ships: 1,
        }
    }
}

impl GameSettings {
    pub fn level_size(&self) -> Vec2 {
        Vec2::new(self.level_width as f32, self.level_height as f32)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.level_width == 0 || self.level_height == 0 {
            return Err(format!(
                "level must be non-empty, got {}x{}",
                self.level_width, self.level_height
            ));
        }
        if !(self.asteroid_velocity.is_finite() && self.asteroid_velocity >= 0.0) {
            return Err(format!(
                "asteroid_velocity must be a non-negative number, got {}",
                self.asteroid_velocity
            ));
        }
        Ok(())
    }
}

/// Server world singleton; the server simulation waits for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub game: GameSettings,
}

/// Client world singleton; the client simulation waits for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientSettings {
    pub level_size: Vec2,
}

impl From<&GameSettings> for ClientSettings {
    fn from(game: &GameSettings) -> Self {
        Self {
            level_size: game.level_size(),
        }
    }
}

/// Wrap `p` into `[0, size)` on both axes.
pub fn wrap_position(p: Vec2, size: Vec2) -> Vec2 {
    Vec2::new(p.x.rem_euclid(size.x), p.y.rem_euclid(size.y))
}
