use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tickworld_kernel::SchedulerConfig;
use tickworld_sample::{GameSettings, NETWORK_PORT};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything the driver needs. Missing keys fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub game: GameSettings,
    pub clients: usize,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            game: GameSettings::default(),
            clients: 1,
            port: NETWORK_PORT,
        }
    }
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.game.validate().map_err(ConfigError::Invalid)?;
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_mapping_gives_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "{{}}").unwrap();
        let cfg = AppConfig::load(tmp.path()).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.clients, 1);
        assert_eq!(cfg.port, 50001);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "clients: 3\nscheduler:\n  max_steps_per_frame: 2\ngame:\n  num_asteroids: 12\n"
        )
        .unwrap();
        let cfg = AppConfig::load(tmp.path()).unwrap();
        assert_eq!(cfg.clients, 3);
        assert_eq!(cfg.scheduler.max_steps_per_frame, 2);
        assert_eq!(cfg.scheduler.fixed_step_secs, 1.0 / 60.0);
        assert_eq!(cfg.game.num_asteroids, 12);
        assert_eq!(cfg.game.level_width, 2048);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            AppConfig::from_yaml("scheduler:\n  fixed_step_secs: -1.0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_yaml("clients: [1, 2]\n"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
