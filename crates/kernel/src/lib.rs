//! Tickworld kernel: fixed-step groups, world routing and the client/server orchestrator.
//!
//! # Invariants
//! - Every world owns its own data store, unit instances and groups.
//! - Fixed-step groups advance in whole steps; excess accumulated time past
//!   the per-frame step bound is discarded.
//! - Group member order is decided once, when the world is initialized.

pub mod clock;
pub mod config;
pub mod error;
pub mod group;
pub mod orchestrator;
pub mod registry;
pub mod tick;
pub mod unit;
pub mod world;

pub use clock::FixedStepClock;
pub use config::SchedulerConfig;
pub use error::SchedError;
pub use group::{Group, GroupConfig, StepPolicy};
pub use orchestrator::{ClientServerOrchestrator, RoutingReport};
pub use registry::{
    Candidate, Discovery, GroupId, GroupRegistry, ModuleLoadError, StaticModule, UnitEntry, UnitId,
    UnitModule, WorldMask,
};
pub use tick::{FrameTime, ServerTick, TickEntry, TickKind};
pub use unit::{LogicUnit, StepTime, UnitContext};
pub use world::{World, WorldHandle};
