//! Barrier-bracketed, sorted groups of logic units.
//!
//! A single [`Group`] type covers every world group. Its [`GroupConfig`]
//! picks the barrier pair, the step policy (fixed-step or once per pass),
//! whether it counts server ticks and whether a spawn group runs after the
//! begin barrier.
//!
//! # Invariants
//! - A sorted group's execution list is `[begin] + members + [end]`.
//! - Sorting is a stable topological sort over ordering hints; ties break by
//!   discovery ordinal, so the same membership always sorts the same way.
//! - A fixed-step pass is never interrupted: each step runs begin barrier,
//!   members and end barrier to completion before the next step starts.

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet};

use tickworld_ecs::DataStore;

use crate::clock::FixedStepClock;
use crate::error::SchedError;
use crate::registry::{Candidate, GroupId, UnitId};
use crate::tick::{FrameTime, ServerTick};
use crate::unit::{BarrierStage, StepTime, UnitContext, UnitKey, UnitTable, WorldState};

/// How often a group's pass runs per update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepPolicy {
    /// Zero or more fixed steps per host frame, bounded by `max_steps_per_frame`.
    FixedStep {
        fixed_step: f64,
        max_steps_per_frame: u32,
    },
    /// One pass per host frame, using host time.
    OncePerFrame,
    /// One pass each time the enclosing group runs; inherits the parent's time.
    OncePerPass,
}

/// Composition parameters for a [`Group`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupConfig {
    pub barriers: Option<(BarrierStage, BarrierStage)>,
    pub policy: StepPolicy,
    pub counts_server_ticks: bool,
    pub spawn_pass: Option<GroupId>,
}

impl GroupConfig {
    pub fn server_simulation(fixed_step: f64, max_steps_per_frame: u32) -> Self {
        Self {
            barriers: Some((BarrierStage::BeginSimulation, BarrierStage::EndSimulation)),
            policy: StepPolicy::FixedStep {
                fixed_step,
                max_steps_per_frame,
            },
            counts_server_ticks: true,
            spawn_pass: None,
        }
    }

    pub fn client_simulation(fixed_step: f64, max_steps_per_frame: u32) -> Self {
        Self {
            barriers: Some((BarrierStage::BeginSimulation, BarrierStage::EndSimulation)),
            policy: StepPolicy::FixedStep {
                fixed_step,
                max_steps_per_frame,
            },
            counts_server_ticks: false,
            spawn_pass: Some(GroupId::GhostSpawn),
        }
    }

    pub fn client_presentation() -> Self {
        Self {
            barriers: Some((BarrierStage::BeginPresentation, BarrierStage::EndPresentation)),
            policy: StepPolicy::OncePerFrame,
            counts_server_ticks: false,
            spawn_pass: None,
        }
    }

    /// Custom and spawn groups: no barriers, one pass per enclosing pass.
    pub fn nested() -> Self {
        Self {
            barriers: None,
            policy: StepPolicy::OncePerPass,
            counts_server_ticks: false,
            spawn_pass: None,
        }
    }
}

/// One entry of a group's execution list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    Unit(UnitKey),
    Group(GroupId),
}

/// Ordering metadata for a member awaiting sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSpec {
    /// Unit id, or `None` for a nested group.
    pub unit: Option<UnitId>,
    pub ordinal: usize,
    pub before: Vec<UnitId>,
    pub after: Vec<UnitId>,
}

impl MemberSpec {
    pub fn for_group(ordinal: usize) -> Self {
        Self {
            unit: None,
            ordinal,
            before: Vec::new(),
            after: Vec::new(),
        }
    }
}

impl From<&Candidate> for MemberSpec {
    fn from(c: &Candidate) -> Self {
        Self {
            unit: Some(c.id.clone()),
            ordinal: c.ordinal,
            before: c.before.clone(),
            after: c.after.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Pending {
    member: Member,
    spec: MemberSpec,
}

#[derive(Debug, Clone, Copy)]
struct BarrierPair {
    begin: UnitKey,
    end: UnitKey,
}

#[derive(Debug, Clone)]
struct Requirement {
    type_id: TypeId,
    name: &'static str,
}

/// Mutable view of a world's parts, minus the group being updated.
pub struct GroupEnv<'a> {
    pub units: &'a mut UnitTable,
    pub store: &'a mut DataStore,
    pub state: &'a mut WorldState,
    pub groups: &'a mut BTreeMap<GroupId, Group>,
}

/// An ordered list of logic units (and nested groups) sharing an execution context.
#[derive(Debug)]
pub struct Group {
    id: GroupId,
    barriers: Option<BarrierPair>,
    clock: Option<FixedStepClock>,
    policy: StepPolicy,
    server_tick: Option<ServerTick>,
    spawn_pass: Option<GroupId>,
    pending: Vec<Pending>,
    execution: Vec<Member>,
    requirements: Vec<Requirement>,
}

impl Group {
    /// Build a group. Barrier instances are created in (or fetched from) `units`.
    pub fn new(id: GroupId, config: GroupConfig, units: &mut UnitTable) -> Self {
        let barriers = config.barriers.map(|(begin, end)| BarrierPair {
            begin: units.get_or_insert_with(&begin.unit_id(), || {
                Box::new(crate::unit::CommandBufferBarrier::new(begin))
            }),
            end: units.get_or_insert_with(&end.unit_id(), || {
                Box::new(crate::unit::CommandBufferBarrier::new(end))
            }),
        });
        let clock = match config.policy {
            StepPolicy::FixedStep {
                fixed_step,
                max_steps_per_frame,
            } => Some(FixedStepClock::new(fixed_step, max_steps_per_frame)),
            StepPolicy::OncePerFrame | StepPolicy::OncePerPass => None,
        };
        let mut group = Self {
            id,
            barriers,
            clock,
            policy: config.policy,
            server_tick: config.counts_server_ticks.then_some(ServerTick::FIRST),
            spawn_pass: config.spawn_pass,
            pending: Vec::new(),
            execution: Vec::new(),
            requirements: Vec::new(),
        };
        group.rebuild_execution(Vec::new());
        group
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn clock(&self) -> Option<&FixedStepClock> {
        self.clock.as_ref()
    }

    /// Current server tick, for groups that count them.
    pub fn server_tick(&self) -> Option<ServerTick> {
        self.server_tick
    }

    /// Append a unit to the pending membership. Re-adding a member is a no-op.
    pub fn add_unit(&mut self, key: UnitKey, spec: MemberSpec) {
        self.add_member(Member::Unit(key), spec);
    }

    /// Append a nested group to the pending membership.
    pub fn add_group(&mut self, group: GroupId, ordinal: usize) {
        self.add_member(Member::Group(group), MemberSpec::for_group(ordinal));
    }

    fn add_member(&mut self, member: Member, spec: MemberSpec) {
        if self.pending.iter().any(|p| p.member == member) {
            return;
        }
        self.pending.push(Pending { member, spec });
    }

    pub fn member_count(&self) -> usize {
        self.pending.len()
    }

    /// Skip every update until the world's data store holds a `T` singleton.
    pub fn require_resource<T: 'static>(&mut self) {
        let type_id = TypeId::of::<T>();
        if self.requirements.iter().all(|r| r.type_id != type_id) {
            self.requirements.push(Requirement {
                type_id,
                name: std::any::type_name::<T>(),
            });
        }
    }

    fn missing_requirement(&self, store: &DataStore) -> Option<&'static str> {
        self.requirements
            .iter()
            .find(|r| !store.resources().contains_id(r.type_id))
            .map(|r| r.name)
    }

    /// Sort pending members and rebuild `[begin] + members + [end]`.
    pub fn sort(&mut self) -> Result<(), SchedError> {
        let order = self.topological_order()?;
        let members = order
            .into_iter()
            .map(|i| self.pending[i].member.clone())
            .collect();
        self.rebuild_execution(members);
        Ok(())
    }

    fn rebuild_execution(&mut self, members: Vec<Member>) {
        let mut execution = Vec::with_capacity(members.len() + 2);
        if let Some(b) = self.barriers {
            execution.push(Member::Unit(b.begin));
        }
        execution.extend(members);
        if let Some(b) = self.barriers {
            execution.push(Member::Unit(b.end));
        }
        self.execution = execution;
    }

    fn topological_order(&self) -> Result<Vec<usize>, SchedError> {
        let n = self.pending.len();
        let by_id: BTreeMap<&UnitId, usize> = self
            .pending
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.spec.unit.as_ref().map(|id| (id, i)))
            .collect();

        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for (i, p) in self.pending.iter().enumerate() {
            for target in &p.spec.before {
                match by_id.get(target) {
                    Some(&j) if j != i => {
                        successors[i].insert(j);
                    }
                    Some(_) => {}
                    None => tracing::warn!(
                        group = %self.id,
                        unit = ?p.spec.unit,
                        before = %target,
                        "ordering hint names a unit outside this group; ignored"
                    ),
                }
            }
            for target in &p.spec.after {
                match by_id.get(target) {
                    Some(&j) if j != i => {
                        successors[j].insert(i);
                    }
                    Some(_) => {}
                    None => tracing::warn!(
                        group = %self.id,
                        unit = ?p.spec.unit,
                        after = %target,
                        "ordering hint names a unit outside this group; ignored"
                    ),
                }
            }
        }

        let mut in_degree = vec![0usize; n];
        for succ in &successors {
            for &j in succ {
                in_degree[j] += 1;
            }
        }

        // Ready set ordered by (ordinal, insertion index) for reproducible ties.
        let key = |i: usize| (self.pending[i].spec.ordinal, i);
        let mut ready: BTreeSet<(usize, usize)> =
            (0..n).filter(|&i| in_degree[i] == 0).map(key).collect();
        let mut order = Vec::with_capacity(n);
        while let Some((_, i)) = ready.pop_first() {
            order.push(i);
            for &j in &successors[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(key(j));
                }
            }
        }

        if order.len() < n {
            let units = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .filter_map(|i| self.pending[i].spec.unit.clone())
                .collect();
            return Err(SchedError::OrderingCycle {
                group: self.id.clone(),
                units,
            });
        }
        Ok(order)
    }

    /// The sorted execution list, barriers included.
    pub fn execution(&self) -> &[Member] {
        &self.execution
    }

    /// The sorted execution list without the barriers.
    pub fn sorted_members(&self) -> &[Member] {
        match self.barriers {
            Some(_) if self.execution.len() >= 2 => &self.execution[1..self.execution.len() - 1],
            _ => &self.execution,
        }
    }

    /// Run the group for one host frame (or one enclosing pass for nested groups).
    pub fn update(&mut self, env: &mut GroupEnv<'_>, frame: FrameTime) {
        if let Some(missing) = self.missing_requirement(env.store) {
            tracing::trace!(group = %self.id, missing, "waiting for required resource");
            return;
        }

        match self.clock.as_mut() {
            Some(clock) => {
                clock.begin_frame(frame.delta);
                while clock.should_step() {
                    env.state.time = StepTime {
                        update_time: clock.update_time(),
                        delta: clock.update_delta_time(),
                    };
                    if self.server_tick.is_some() {
                        env.state.server_tick = self.server_tick;
                    }
                    run_pass(&self.execution, self.barriers.is_some(), self.spawn_pass.as_ref(), env, frame);
                    if let Some(tick) = self.server_tick.as_mut() {
                        tick.advance();
                        tracing::trace!(group = %self.id, tick = tick.get(), "server step complete");
                    }
                }
            }
            None => {
                if self.policy == StepPolicy::OncePerFrame {
                    env.state.time = StepTime {
                        update_time: frame.elapsed,
                        delta: frame.delta,
                    };
                }
                run_pass(&self.execution, self.barriers.is_some(), self.spawn_pass.as_ref(), env, frame);
            }
        }
    }
}

/// One bracketed pass: begin barrier, spawn group, members, end barrier.
fn run_pass(
    execution: &[Member],
    has_barriers: bool,
    spawn_pass: Option<&GroupId>,
    env: &mut GroupEnv<'_>,
    frame: FrameTime,
) {
    let spawn_after = usize::from(has_barriers);
    for (i, member) in execution.iter().enumerate() {
        if i == spawn_after {
            if let Some(spawn) = spawn_pass {
                run_nested(env, spawn, frame);
            }
        }
        match member {
            Member::Unit(key) => {
                let mut cx = UnitContext {
                    store: &mut *env.store,
                    role: env.state.role,
                    time: env.state.time,
                    server_tick: env.state.server_tick,
                };
                env.units.update(*key, &mut cx);
            }
            Member::Group(id) => run_nested(env, id, frame),
        }
    }
}

/// Update a group that lives in `env.groups`, detaching it for the duration.
pub(crate) fn run_nested(env: &mut GroupEnv<'_>, id: &GroupId, frame: FrameTime) {
    let Some(mut group) = env.groups.remove(id) else {
        tracing::warn!(group = %id, "nested group missing from world");
        return;
    };
    group.update(env, frame);
    env.groups.insert(id.clone(), group);
}
