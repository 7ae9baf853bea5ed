//! Registration table for logic units and group declarations.
//!
//! Units are grouped into [`UnitModule`]s. Discovery walks the modules in
//! registration order and keeps every concrete, constructible logic unit.
//! Group-on-group declarations decide which worlds a custom group lives in.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use tickworld_common::WorldRole;

use crate::error::SchedError;
use crate::unit::LogicUnit;

/// Name of a logic unit type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(Cow<'static, str>);

impl UnitId {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for UnitId {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

/// A group a unit (or another group) can declare membership in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupId {
    ServerSimulation,
    ClientSimulation,
    ClientPresentation,
    /// Runs in the simulation group of every world.
    ClientAndServerSimulation,
    /// Client-only group ticked right after the begin barrier of each client step.
    GhostSpawn,
    Custom(Cow<'static, str>),
}

impl GroupId {
    pub fn custom(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Custom(name.into())
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Affinity of a group that declares no parents.
    fn base_affinity(&self) -> WorldMask {
        match self {
            Self::ClientAndServerSimulation => WorldMask::CLIENT | WorldMask::SERVER,
            Self::ServerSimulation => WorldMask::SERVER,
            Self::ClientSimulation | Self::ClientPresentation | Self::GhostSpawn => {
                WorldMask::CLIENT
            }
            Self::Custom(_) => WorldMask::DEFAULT,
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerSimulation => f.write_str("ServerSimulationGroup"),
            Self::ClientSimulation => f.write_str("ClientSimulationGroup"),
            Self::ClientPresentation => f.write_str("ClientPresentationGroup"),
            Self::ClientAndServerSimulation => f.write_str("ClientAndServerSimulationGroup"),
            Self::GhostSpawn => f.write_str("GhostSpawnGroup"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

bitflags! {
    /// Top-level worlds a group resolves to.
    ///
    /// `DEFAULT` marks groups that belong to neither role; they are never routed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WorldMask: u8 {
        const DEFAULT = 1;
        const CLIENT = 1 << 1;
        const SERVER = 1 << 2;
    }
}

impl WorldMask {
    pub fn for_role(role: WorldRole) -> Self {
        match role {
            WorldRole::Server => Self::SERVER,
            WorldRole::Client(_) => Self::CLIENT,
        }
    }

    pub fn is_both(self) -> bool {
        self.contains(Self::CLIENT | Self::SERVER)
    }
}

/// Zero-argument constructor for a logic unit.
pub type UnitFactory = Arc<dyn Fn() -> Box<dyn LogicUnit> + Send + Sync>;

/// Shape of a registered type. Only concrete types can be instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitShape {
    Concrete,
    Abstract,
    Generic,
}

/// What a registered type is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    LogicUnit,
    /// Any other type a module exposes; ignored by discovery.
    Other,
}

/// One row of the registration table.
#[derive(Clone)]
pub struct UnitEntry {
    pub id: UnitId,
    pub shape: UnitShape,
    pub kind: EntryKind,
    pub groups: Vec<GroupId>,
    pub before: Vec<UnitId>,
    pub after: Vec<UnitId>,
    pub factory: Option<UnitFactory>,
}

impl UnitEntry {
    /// A concrete logic unit built by `factory`.
    pub fn new<F>(id: impl Into<UnitId>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn LogicUnit> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            shape: UnitShape::Concrete,
            kind: EntryKind::LogicUnit,
            groups: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            factory: Some(Arc::new(factory)),
        }
    }

    /// A concrete logic unit constructed through `Default`.
    pub fn of<T: LogicUnit + Default>(id: impl Into<UnitId>) -> Self {
        Self::new(id, || Box::new(T::default()))
    }

    /// A logic unit type without a usable zero-argument constructor.
    pub fn without_factory(id: impl Into<UnitId>) -> Self {
        Self {
            id: id.into(),
            shape: UnitShape::Concrete,
            kind: EntryKind::LogicUnit,
            groups: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            factory: None,
        }
    }

    pub fn with_shape(mut self, shape: UnitShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn in_group(mut self, group: GroupId) -> Self {
        self.groups.push(group);
        self
    }

    /// Run before `other` when both are members of the same group.
    pub fn before(mut self, other: impl Into<UnitId>) -> Self {
        self.before.push(other.into());
        self
    }

    /// Run after `other` when both are members of the same group.
    pub fn after(mut self, other: impl Into<UnitId>) -> Self {
        self.after.push(other.into());
        self
    }

    fn is_candidate(&self) -> bool {
        self.kind == EntryKind::LogicUnit
            && self.shape == UnitShape::Concrete
            && self.factory.is_some()
    }
}

impl fmt::Debug for UnitEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitEntry")
            .field("id", &self.id)
            .field("shape", &self.shape)
            .field("kind", &self.kind)
            .field("groups", &self.groups)
            .field("before", &self.before)
            .field("after", &self.after)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

/// A module failed to load completely. Entries that did load are kept.
#[derive(Debug, thiserror::Error)]
#[error("module `{module}` loaded partially: {reason}")]
pub struct ModuleLoadError {
    pub module: String,
    pub reason: String,
    pub recovered: Vec<UnitEntry>,
}

/// A unit of registration, analogous to a compiled library of logic units.
pub trait UnitModule: Send + Sync {
    fn name(&self) -> &str;

    /// Modules that do not depend on the scheduler are skipped without loading.
    fn references_scheduler(&self) -> bool {
        true
    }

    fn load(&self) -> Result<Vec<UnitEntry>, ModuleLoadError>;
}

/// In-memory module assembled at startup.
#[derive(Debug, Default)]
pub struct StaticModule {
    name: String,
    entries: Vec<UnitEntry>,
    failures: Vec<String>,
    foreign: bool,
}

impl StaticModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with(mut self, entry: UnitEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Record an entry that could not be loaded; `load` then reports a partial failure.
    pub fn with_failure(mut self, reason: impl Into<String>) -> Self {
        self.failures.push(reason.into());
        self
    }

    /// Mark the module as not referencing the scheduler at all.
    pub fn foreign(mut self) -> Self {
        self.foreign = true;
        self
    }
}

impl UnitModule for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn references_scheduler(&self) -> bool {
        !self.foreign
    }

    fn load(&self) -> Result<Vec<UnitEntry>, ModuleLoadError> {
        if self.failures.is_empty() {
            Ok(self.entries.clone())
        } else {
            Err(ModuleLoadError {
                module: self.name.clone(),
                reason: self.failures.join("; "),
                recovered: self.entries.clone(),
            })
        }
    }
}

/// A discovered, instantiable logic unit type.
#[derive(Clone)]
pub struct Candidate {
    pub id: UnitId,
    pub groups: Vec<GroupId>,
    pub before: Vec<UnitId>,
    pub after: Vec<UnitId>,
    /// Discovery position; the tie-breaker for group ordering.
    pub ordinal: usize,
    factory: UnitFactory,
}

impl Candidate {
    pub fn instantiate(&self) -> Box<dyn LogicUnit> {
        (self.factory)()
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("id", &self.id)
            .field("groups", &self.groups)
            .field("ordinal", &self.ordinal)
            .finish_non_exhaustive()
    }
}

/// Result of one discovery scan.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub candidates: Vec<Candidate>,
    /// One message per module that loaded partially.
    pub warnings: Vec<String>,
}

/// Registered modules plus custom group declarations.
#[derive(Default)]
pub struct GroupRegistry {
    modules: Vec<Box<dyn UnitModule>>,
    declarations: BTreeMap<GroupId, Vec<GroupId>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_module(&mut self, module: impl UnitModule + 'static) -> &mut Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Declare that custom `group` is itself a member of each of `parents`.
    pub fn declare_group(
        &mut self,
        group: GroupId,
        parents: impl IntoIterator<Item = GroupId>,
    ) -> Result<&mut Self, SchedError> {
        if group.is_builtin() {
            return Err(SchedError::BuiltinGroupDeclaration(group));
        }
        let declared = self.declarations.entry(group).or_default();
        for parent in parents {
            if !declared.contains(&parent) {
                declared.push(parent);
            }
        }
        Ok(self)
    }

    /// Parents declared for `group`, in declaration order.
    pub fn declared_parents(&self, group: &GroupId) -> &[GroupId] {
        self.declarations
            .get(group)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Scan every module and keep concrete, constructible logic units.
    ///
    /// Partially loaded modules contribute what they recovered and add a warning.
    pub fn discover_candidates(&self) -> Discovery {
        let _span = tracing::info_span!("discover_candidates").entered();
        let mut discovery = Discovery::default();
        let mut seen = BTreeSet::new();

        for module in &self.modules {
            if !module.references_scheduler() {
                tracing::trace!(module = module.name(), "skipping module without logic units");
                continue;
            }
            let entries = match module.load() {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!("failed loading module: {err}");
                    discovery.warnings.push(err.to_string());
                    err.recovered
                }
            };

            for entry in entries {
                if !entry.is_candidate() {
                    tracing::trace!(unit = %entry.id, shape = ?entry.shape, "not a candidate");
                    continue;
                }
                if !seen.insert(entry.id.clone()) {
                    tracing::warn!(unit = %entry.id, module = module.name(), "duplicate unit registration ignored");
                    continue;
                }
                let Some(factory) = entry.factory else {
                    continue;
                };
                discovery.candidates.push(Candidate {
                    ordinal: discovery.candidates.len(),
                    id: entry.id,
                    groups: entry.groups,
                    before: entry.before,
                    after: entry.after,
                    factory,
                });
            }
        }

        tracing::info!(
            candidates = discovery.candidates.len(),
            warnings = discovery.warnings.len(),
            "discovery complete"
        );
        discovery
    }

    /// Resolve which top-level worlds `group` belongs to.
    ///
    /// Built-in groups and undeclared custom groups use fixed base cases; a
    /// declared group is the union of its parents. A declaration cycle is a
    /// configuration error.
    pub fn resolve_world_affinity(&self, group: &GroupId) -> Result<WorldMask, SchedError> {
        let mut path = Vec::new();
        self.resolve_inner(group, &mut path)
    }

    fn resolve_inner(&self, group: &GroupId, path: &mut Vec<GroupId>) -> Result<WorldMask, SchedError> {
        if let Some(start) = path.iter().position(|g| g == group) {
            let mut cycle = path[start..].to_vec();
            cycle.push(group.clone());
            return Err(SchedError::CyclicGroupDeclaration { cycle });
        }

        let parents = self.declared_parents(group);
        if parents.is_empty() {
            return Ok(group.base_affinity());
        }

        path.push(group.clone());
        let mut mask = WorldMask::empty();
        for parent in parents {
            mask |= self.resolve_inner(parent, path)?;
        }
        path.pop();
        Ok(mask)
    }
}

impl fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRegistry")
            .field(
                "modules",
                &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("declarations", &self.declarations)
            .finish()
    }
}
