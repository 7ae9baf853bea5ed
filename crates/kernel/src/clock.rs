/// Default simulation step: 60 Hz.
pub const DEFAULT_FIXED_STEP: f64 = 1.0 / 60.0;
/// Default catch-up bound per host frame.
pub const DEFAULT_MAX_STEPS_PER_FRAME: u32 = 4;

/// Fixed-timestep accumulator with a bounded number of steps per frame.
///
/// Call [`begin_frame`](Self::begin_frame) once per host frame, then loop on
/// [`should_step`](Self::should_step). When a frame would need more than
/// `max_steps_per_frame` steps the leftover backlog is reduced modulo the step
/// length and dropped, so a long stall never snowballs into later frames.
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    accumulated_time: f64,
    elapsed_time: f64,
    fixed_step: f64,
    max_steps_per_frame: u32,
    steps_this_frame: u32,
}

impl Default for FixedStepClock {
    fn default() -> Self {
        Self::new(DEFAULT_FIXED_STEP, DEFAULT_MAX_STEPS_PER_FRAME)
    }
}

impl FixedStepClock {
    pub fn new(fixed_step: f64, max_steps_per_frame: u32) -> Self {
        Self {
            accumulated_time: 0.0,
            elapsed_time: 0.0,
            fixed_step,
            max_steps_per_frame,
            steps_this_frame: 0,
        }
    }

    /// Add one host frame's elapsed time. Negative or non-finite deltas count as zero.
    pub fn begin_frame(&mut self, delta_seconds: f64) {
        let delta = if delta_seconds.is_finite() && delta_seconds > 0.0 {
            delta_seconds
        } else {
            0.0
        };
        self.accumulated_time += delta;
        self.elapsed_time += delta;
        self.steps_this_frame = 0;
    }

    /// Consume one step from the accumulator if one is due and the frame budget allows.
    pub fn should_step(&mut self) -> bool {
        if self.accumulated_time < self.fixed_step {
            return false;
        }
        self.steps_this_frame += 1;
        if self.steps_this_frame > self.max_steps_per_frame {
            let backlog = self.accumulated_time;
            self.accumulated_time %= self.fixed_step;
            tracing::debug!(
                backlog,
                kept = self.accumulated_time,
                "catch-up clamp dropped simulation backlog"
            );
            return false;
        }
        self.accumulated_time -= self.fixed_step;
        true
    }

    /// Time the simulation has logically reached: elapsed host time minus the leftover.
    pub fn update_time(&self) -> f64 {
        self.elapsed_time - self.accumulated_time
    }

    /// Always exactly one fixed step.
    pub fn update_delta_time(&self) -> f64 {
        self.fixed_step
    }

    pub fn accumulated_time(&self) -> f64 {
        self.accumulated_time
    }

    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    pub fn max_steps_per_frame(&self) -> u32 {
        self.max_steps_per_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f64 = DEFAULT_FIXED_STEP;

    fn run_frame(clock: &mut FixedStepClock, delta: f64) -> u32 {
        clock.begin_frame(delta);
        let mut steps = 0;
        while clock.should_step() {
            steps += 1;
        }
        steps
    }

    #[test]
    fn one_step_per_exact_frame() {
        let mut clock = FixedStepClock::default();
        clock.begin_frame(STEP);
        assert!(clock.should_step());
        assert!(!clock.should_step());
        assert!(clock.accumulated_time() < STEP);
    }

    #[test]
    fn short_frames_accumulate() {
        let mut clock = FixedStepClock::default();
        assert_eq!(run_frame(&mut clock, STEP * 0.6), 0);
        assert_eq!(run_frame(&mut clock, STEP * 0.6), 1);
        assert!((clock.accumulated_time() - STEP * 0.2).abs() < 1e-12);
    }

    #[test]
    fn two_steps_for_a_thirty_hertz_frame() {
        let mut clock = FixedStepClock::default();
        assert_eq!(run_frame(&mut clock, 1.0 / 30.0), 2);
    }

    #[test]
    fn huge_stall_is_clamped_and_reduced_modulo_step() {
        let mut clock = FixedStepClock::default();
        let steps = run_frame(&mut clock, 10.0);
        assert_eq!(steps, 4);

        let mut expected = 10.0;
        for _ in 0..4 {
            expected -= STEP;
        }
        let truncated = expected;
        expected %= STEP;
        assert!((clock.accumulated_time() - expected).abs() < 1e-9);
        assert!(clock.accumulated_time() < STEP);
        assert!(clock.accumulated_time() < truncated);
    }

    #[test]
    fn clamp_does_not_leak_into_next_frame() {
        let mut clock = FixedStepClock::default();
        run_frame(&mut clock, 10.0);
        assert!(run_frame(&mut clock, STEP) <= 2);
    }

    #[test]
    fn bounded_steps_and_accumulator_for_varied_frames() {
        // Deterministic pseudo-random frame deltas between 0 and ~0.2s.
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut clock = FixedStepClock::default();
        for _ in 0..5_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let delta = (state % 200_000) as f64 / 1_000_000.0;
            let steps = run_frame(&mut clock, delta);
            assert!(steps <= clock.max_steps_per_frame());
            assert!(clock.accumulated_time() >= 0.0);
            assert!(clock.accumulated_time() < STEP);
        }
    }

    #[test]
    fn same_inputs_same_outputs() {
        let deltas = [0.016, 0.033, 0.5, 0.001, 0.017, 0.2, 0.0];
        let mut a = FixedStepClock::default();
        let mut b = FixedStepClock::default();
        let sa: Vec<u32> = deltas.iter().map(|d| run_frame(&mut a, *d)).collect();
        let sb: Vec<u32> = deltas.iter().map(|d| run_frame(&mut b, *d)).collect();
        assert_eq!(sa, sb);
        assert_eq!(a.accumulated_time().to_bits(), b.accumulated_time().to_bits());
    }

    #[test]
    fn update_time_trails_elapsed_by_leftover() {
        let mut clock = FixedStepClock::default();
        run_frame(&mut clock, STEP * 2.5);
        assert_eq!(clock.update_delta_time(), STEP);
        assert!((clock.update_time() - STEP * 2.0).abs() < 1e-12);
        assert!((clock.elapsed_time() - STEP * 2.5).abs() < 1e-12);
    }

    #[test]
    fn negative_and_nan_deltas_are_ignored() {
        let mut clock = FixedStepClock::default();
        assert_eq!(run_frame(&mut clock, -1.0), 0);
        assert_eq!(run_frame(&mut clock, f64::NAN), 0);
        assert_eq!(clock.elapsed_time(), 0.0);
    }
}
