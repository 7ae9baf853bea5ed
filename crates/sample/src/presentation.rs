use tickworld_kernel::{LogicUnit, UnitContext};

/// Client presentation unit: per-frame counters a renderer would draw from.
#[derive(Debug, Default)]
pub struct PresentationStatsUnit {
    frames: u64,
    visible: usize,
    last_frame_time: f64,
}

impl PresentationStatsUnit {
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Replicated entities seen in the last frame.
    pub fn visible(&self) -> usize {
        self.visible
    }

    pub fn last_frame_time(&self) -> f64 {
        self.last_frame_time
    }
}

impl LogicUnit for PresentationStatsUnit {
    fn update(&mut self, cx: &mut UnitContext<'_>) {
        self.frames += 1;
        self.visible = cx.store.ghosts().len();
        self.last_frame_time = cx.time.update_time;
        tracing::trace!(role = %cx.role, frame = self.frames, visible = self.visible, "presented");
    }
}
