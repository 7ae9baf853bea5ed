use serde::{Deserialize, Serialize};

use crate::clock::{DEFAULT_FIXED_STEP, DEFAULT_MAX_STEPS_PER_FRAME};
use crate::error::SchedError;

/// Scheduler tuning shared by every world an orchestrator creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Duration of one simulation step, in seconds.
    pub fixed_step_secs: f64,
    /// Catch-up bound: steps beyond this in one frame are discarded.
    pub max_steps_per_frame: u32,
    /// Base seed for per-world entity id allocation.
    pub seed: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fixed_step_secs: DEFAULT_FIXED_STEP,
            max_steps_per_frame: DEFAULT_MAX_STEPS_PER_FRAME,
            seed: 0,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), SchedError> {
        if !(self.fixed_step_secs.is_finite() && self.fixed_step_secs > 0.0) {
            return Err(SchedError::InvalidConfig(format!(
                "fixed_step_secs must be positive, got {}",
                self.fixed_step_secs
            )));
        }
        if self.max_steps_per_frame == 0 {
            return Err(SchedError::InvalidConfig(
                "max_steps_per_frame must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
