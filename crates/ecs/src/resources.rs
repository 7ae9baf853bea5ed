use std::any::{Any, TypeId};
use std::collections::BTreeMap;

/// Typed singleton storage: at most one value per type.
///
/// World-scoped settings and per-world singleton state live here.
#[derive(Default)]
pub struct Resources {
    values: BTreeMap<TypeId, (&'static str, Box<dyn Any>)>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the singleton of type `T`. Returns the previous value.
    pub fn insert<T: 'static>(&mut self, value: T) -> Option<T> {
        let previous = self
            .values
            .insert(TypeId::of::<T>(), (std::any::type_name::<T>(), Box::new(value)));
        previous.and_then(|(_, v)| v.downcast::<T>().ok().map(|b| *b))
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|(_, v)| v.downcast::<T>().ok().map(|b| *b))
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|(_, v)| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|(_, v)| v.downcast_mut::<T>())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.contains_id(TypeId::of::<T>())
    }

    pub fn contains_id(&self, id: TypeId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Type names of the stored singletons, for diagnostics.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.values.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.type_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Settings(u32);

    #[test]
    fn insert_get_replace_remove() {
        let mut res = Resources::new();
        assert!(!res.contains::<Settings>());
        assert!(res.insert(Settings(1)).is_none());
        assert_eq!(res.get::<Settings>(), Some(&Settings(1)));

        let old = res.insert(Settings(2));
        assert_eq!(old, Some(Settings(1)));
        res.get_mut::<Settings>().unwrap().0 += 1;
        assert_eq!(res.remove::<Settings>(), Some(Settings(3)));
        assert!(res.is_empty());
    }

    #[test]
    fn distinct_types_do_not_collide() {
        let mut res = Resources::new();
        res.insert(1u32);
        res.insert(2u64);
        assert_eq!(res.get::<u32>(), Some(&1));
        assert_eq!(res.get::<u64>(), Some(&2));
        assert_eq!(res.len(), 2);
    }
}
