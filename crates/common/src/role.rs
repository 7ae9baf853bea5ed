use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a world plays in a client/server session.
///
/// Exactly one server world and any number of client worlds may coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorldRole {
    Server,
    /// Client world, numbered in creation order.
    Client(usize),
}

impl WorldRole {
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server)
    }

    pub fn is_client(&self) -> bool {
        matches!(self, Self::Client(_))
    }

    /// Default world name, e.g. `ServerWorld` or `ClientWorld1`.
    pub fn world_name(&self) -> String {
        match self {
            Self::Server => "ServerWorld".to_string(),
            Self::Client(index) => format!("ClientWorld{index}"),
        }
    }
}

impl fmt::Display for WorldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client(index) => write!(f, "client#{index}"),
        }
    }
}
