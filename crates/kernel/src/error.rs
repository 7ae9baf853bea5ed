use crate::registry::{GroupId, UnitId};

/// Errors from registry resolution, group sorting and world initialization.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    #[error("cyclic group declaration: {}", join_path(.cycle))]
    CyclicGroupDeclaration { cycle: Vec<GroupId> },
    #[error("ordering hints in group {group} form a cycle among: {}", join_path(.units))]
    OrderingCycle { group: GroupId, units: Vec<UnitId> },
    #[error("built-in group {0} cannot declare parent groups")]
    BuiltinGroupDeclaration(GroupId),
    #[error("a server world already exists")]
    ServerWorldExists,
    #[error("no world with handle {0}")]
    UnknownWorld(usize),
    #[error("group {group} does not exist in world {world}")]
    UnknownGroup { world: String, group: GroupId },
    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),
}

fn join_path<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = SchedError::CyclicGroupDeclaration {
            cycle: vec![GroupId::custom("A"), GroupId::custom("B"), GroupId::custom("A")],
        };
        assert_eq!(err.to_string(), "cyclic group declaration: A -> B -> A");
    }
}
