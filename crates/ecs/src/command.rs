use glam::Vec3;
use serde::{Deserialize, Serialize};
use tickworld_common::{EntityId, Transform};

/// A deferred structural change, recorded during a pass and applied at a barrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Create an entity under a pre-reserved id.
    Spawn {
        id: EntityId,
        name: String,
        transform: Transform,
        velocity: Vec3,
    },
    /// Remove an entity and all of its components.
    Despawn { id: EntityId },
    SetTransform { id: EntityId, transform: Transform },
    SetVelocity { id: EntityId, velocity: Vec3 },
    /// Tag an entity as a replica of an entity owned by another world.
    MarkGhost { id: EntityId, source: EntityId },
}

impl Command {
    pub fn target(&self) -> EntityId {
        match self {
            Self::Spawn { id, .. }
            | Self::Despawn { id }
            | Self::SetTransform { id, .. }
            | Self::SetVelocity { id, .. }
            | Self::MarkGhost { id, .. } => *id,
        }
    }
}

/// Append-only queue of commands, drained in recording order.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take every pending command, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}
