use std::any::Any;
use std::collections::BTreeMap;

use tickworld_common::WorldRole;
use tickworld_ecs::DataStore;

use crate::registry::UnitId;
use crate::tick::ServerTick;

/// Downcast support for boxed units. Implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A piece of per-tick behaviour owned by exactly one world.
pub trait LogicUnit: AsAny {
    fn update(&mut self, cx: &mut UnitContext<'_>);
}

/// Time values a unit sees during one pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepTime {
    /// Fixed-step groups: the time the simulation has reached. Presentation: host time.
    pub update_time: f64,
    /// Fixed-step groups: exactly one step. Presentation: the host frame delta.
    pub delta: f64,
}

/// Everything a unit may touch while it runs.
pub struct UnitContext<'a> {
    pub store: &'a mut DataStore,
    pub role: WorldRole,
    pub time: StepTime,
    /// Current step of the server world; `None` in client worlds.
    pub server_tick: Option<ServerTick>,
}

/// World-scoped values published to units before each pass.
#[derive(Debug, Clone, Copy)]
pub struct WorldState {
    pub role: WorldRole,
    pub time: StepTime,
    pub server_tick: Option<ServerTick>,
}

impl WorldState {
    pub fn new(role: WorldRole) -> Self {
        Self {
            role,
            time: StepTime::default(),
            server_tick: None,
        }
    }
}

/// A unit that does nothing.
#[derive(Debug, Default)]
pub struct NoopUnit;

impl LogicUnit for NoopUnit {
    fn update(&mut self, _cx: &mut UnitContext<'_>) {}
}

/// Position of a barrier in its group's pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BarrierStage {
    BeginSimulation,
    EndSimulation,
    BeginPresentation,
    EndPresentation,
}

impl BarrierStage {
    pub fn unit_id(self) -> UnitId {
        UnitId::from_static(match self {
            Self::BeginSimulation => "BeginSimulationCommandBuffer",
            Self::EndSimulation => "EndSimulationCommandBuffer",
            Self::BeginPresentation => "BeginPresentationCommandBuffer",
            Self::EndPresentation => "EndPresentationCommandBuffer",
        })
    }
}

/// Barrier unit: plays back the world's deferred commands.
#[derive(Debug)]
pub struct CommandBufferBarrier {
    stage: BarrierStage,
    flushes: u64,
    applied: u64,
}

impl CommandBufferBarrier {
    pub fn new(stage: BarrierStage) -> Self {
        Self {
            stage,
            flushes: 0,
            applied: 0,
        }
    }

    pub fn stage(&self) -> BarrierStage {
        self.stage
    }

    /// How many times this barrier has run.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Total commands played back by this barrier.
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

impl LogicUnit for CommandBufferBarrier {
    fn update(&mut self, cx: &mut UnitContext<'_>) {
        self.flushes += 1;
        self.applied += cx.store.playback() as u64;
    }
}

/// Index of a unit instance inside its world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey(usize);

struct UnitSlot {
    id: UnitId,
    unit: Box<dyn LogicUnit>,
}

/// The unit instances of one world, at most one per unit id.
#[derive(Default)]
pub struct UnitTable {
    slots: Vec<UnitSlot>,
    index: BTreeMap<UnitId, UnitKey>,
}

impl UnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn key_of(&self, id: &UnitId) -> Option<UnitKey> {
        self.index.get(id).copied()
    }

    pub fn id_of(&self, key: UnitKey) -> Option<&UnitId> {
        self.slots.get(key.0).map(|s| &s.id)
    }

    /// Return the existing instance for `id`, or construct one with `make`.
    pub fn get_or_insert_with(
        &mut self,
        id: &UnitId,
        make: impl FnOnce() -> Box<dyn LogicUnit>,
    ) -> UnitKey {
        if let Some(key) = self.key_of(id) {
            return key;
        }
        let key = UnitKey(self.slots.len());
        self.slots.push(UnitSlot {
            id: id.clone(),
            unit: make(),
        });
        self.index.insert(id.clone(), key);
        key
    }

    pub fn get(&self, key: UnitKey) -> Option<&dyn LogicUnit> {
        self.slots.get(key.0).map(|s| s.unit.as_ref())
    }

    pub fn get_mut(&mut self, key: UnitKey) -> Option<&mut dyn LogicUnit> {
        match self.slots.get_mut(key.0) {
            Some(slot) => Some(slot.unit.as_mut()),
            None => None,
        }
    }

    /// Downcast the instance registered under `id`.
    pub fn downcast<T: LogicUnit>(&self, id: &UnitId) -> Option<&T> {
        let unit = self.get(self.key_of(id)?)?;
        unit.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: LogicUnit>(&mut self, id: &UnitId) -> Option<&mut T> {
        let key = self.key_of(id)?;
        let unit = self.get_mut(key)?;
        unit.as_any_mut().downcast_mut::<T>()
    }

    /// Run one unit.
    pub fn update(&mut self, key: UnitKey, cx: &mut UnitContext<'_>) {
        if let Some(unit) = self.get_mut(key) {
            unit.update(cx);
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &UnitId> {
        self.slots.iter().map(|s| &s.id)
    }
}

impl std::fmt::Debug for UnitTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        runs: u32,
    }

    impl LogicUnit for Counter {
        fn update(&mut self, _cx: &mut UnitContext<'_>) {
            self.runs += 1;
        }
    }

    fn context(store: &mut DataStore) -> UnitContext<'_> {
        UnitContext {
            store,
            role: WorldRole::Server,
            time: StepTime::default(),
            server_tick: None,
        }
    }

    #[test]
    fn instances_are_created_once_per_id() {
        let mut table = UnitTable::new();
        let id = UnitId::from_static("Counter");
        let a = table.get_or_insert_with(&id, || Box::new(Counter::default()));
        let b = table.get_or_insert_with(&id, || panic!("constructed twice"));
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn downcast_reaches_concrete_type() {
        let mut table = UnitTable::new();
        let id = UnitId::from_static("Counter");
        let key = table.get_or_insert_with(&id, || Box::new(Counter::default()));
        let mut store = DataStore::new();
        table.update(key, &mut context(&mut store));
        table.update(key, &mut context(&mut store));

        assert_eq!(table.downcast::<Counter>(&id).unwrap().runs, 2);
        assert!(table.downcast::<NoopUnit>(&id).is_none());
        table.downcast_mut::<Counter>(&id).unwrap().runs = 0;
        assert_eq!(table.downcast::<Counter>(&id).unwrap().runs, 0);
    }

    #[test]
    fn barrier_plays_back_commands() {
        let mut store = DataStore::new();
        store.defer_spawn(tickworld_ecs::SpawnDesc {
            name: "x".into(),
            transform: Default::default(),
            velocity: Default::default(),
        });
        let mut barrier = CommandBufferBarrier::new(BarrierStage::EndSimulation);
        barrier.update(&mut context(&mut store));
        assert_eq!(store.entity_count(), 1);
        assert_eq!(barrier.flushes(), 1);
        assert_eq!(barrier.applied(), 1);
    }
}
