use std::fmt;
use std::num::NonZeroU32;

use crate::registry::GroupId;
use crate::world::{World, WorldHandle};

/// Monotonic server step counter.
///
/// Starts at 1 and wraps from `u32::MAX` back to 1. Zero is never a valid
/// tick; "no tick yet" is expressed as `Option<ServerTick>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerTick(NonZeroU32);

impl ServerTick {
    pub const FIRST: Self = Self(NonZeroU32::MIN);

    /// `None` for the reserved value 0.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Advance by one step, skipping 0 on wraparound.
    pub fn advance(&mut self) {
        self.0 = NonZeroU32::new(self.0.get().wrapping_add(1)).unwrap_or(NonZeroU32::MIN);
    }

    pub fn next(self) -> Self {
        let mut t = self;
        t.advance();
        t
    }
}

impl Default for ServerTick {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for ServerTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Host frame timing handed to top-level tick entries.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTime {
    /// Seconds since the previous host frame.
    pub delta: f64,
    /// Seconds since the host loop started.
    pub elapsed: f64,
}

/// The three entry points the host frame loop calls, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TickKind {
    Server,
    ClientSimulation,
    ClientPresentation,
}

impl TickKind {
    pub const ORDER: [TickKind; 3] = [
        TickKind::Server,
        TickKind::ClientSimulation,
        TickKind::ClientPresentation,
    ];

    /// The root group this entry updates in each registered world.
    pub fn root_group(self) -> GroupId {
        match self {
            Self::Server => GroupId::ServerSimulation,
            Self::ClientSimulation => GroupId::ClientSimulation,
            Self::ClientPresentation => GroupId::ClientPresentation,
        }
    }
}

impl fmt::Display for TickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "TickServerSimulation"),
            Self::ClientSimulation => write!(f, "TickClientSimulation"),
            Self::ClientPresentation => write!(f, "TickClientPresentation"),
        }
    }
}

/// A top-level tick unit: updates one root group in each registered world.
#[derive(Debug, Clone)]
pub struct TickEntry {
    kind: TickKind,
    enabled: bool,
    worlds: Vec<WorldHandle>,
}

impl TickEntry {
    pub fn new(kind: TickKind) -> Self {
        Self {
            kind,
            enabled: true,
            worlds: Vec::new(),
        }
    }

    pub fn kind(&self) -> TickKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn worlds(&self) -> &[WorldHandle] {
        &self.worlds
    }

    /// Register a world; its root group is updated on every tick from now on.
    pub fn add_world(&mut self, handle: WorldHandle) {
        if !self.worlds.contains(&handle) {
            self.worlds.push(handle);
        }
    }

    /// Update every registered world's root group once, in registration order.
    pub fn update(&self, worlds: &mut [World], frame: FrameTime) {
        if !self.enabled {
            return;
        }
        let _span = tracing::trace_span!("tick", entry = %self.kind).entered();
        let group = self.kind.root_group();
        for handle in &self.worlds {
            if let Some(world) = worlds.get_mut(handle.index()) {
                world.update_group(&group, frame);
            }
        }
    }
}
