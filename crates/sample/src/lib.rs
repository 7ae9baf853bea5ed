//! Asteroids-style sample that exercises the scheduler end to end.
//!
//! The server world spawns and moves asteroids and streams snapshots over an
//! in-process loopback network; every client world mirrors them as ghosts
//! and keeps presentation counters.
//!
//! # Invariants
//! - Nothing ticks until [`Bootstrap`] has created each world's settings
//!   resource and opened the transport.
//! - The only state shared between worlds is the loopback network.

mod bootstrap;
mod ghost;
mod movement;
mod net;
mod presentation;
mod settings;
mod spawn;

pub use bootstrap::{
    ASTEROID_SPAWN, Bootstrap, GHOST_UPDATE, MOVEMENT, NETWORK_PORT, NETWORK_STREAM,
    PRESENTATION_STATS, SampleError, Session, WorldReport, module, network_receive_group, registry,
};
pub use ghost::GhostUpdateUnit;
pub use movement::MovementUnit;
pub use net::{
    ConnectionId, EntityState, LoopbackNetwork, NetworkStreamUnit, Snapshot, SnapshotInbox,
    TransportError,
};
pub use presentation::PresentationStatsUnit;
pub use settings::{ClientSettings, GameSettings, ServerSettings, wrap_position};
pub use spawn::{ASTEROID, AsteroidSpawnUnit, SplitMix64};

pub fn crate_info() -> &'static str {
    "tickworld-sample v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("sample"));
    }
}
