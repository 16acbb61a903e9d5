// Name-keyed registries
//
// Meshes and materials are registered once by name and looked up by a small
// typed id on the hot path. Re-registering a name replaces the entry in place
// and keeps its id, so objects already pointing at it stay valid.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Index into a `Registry<T>`
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub fn from_index(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> u32 {
        self.index
    }
}

// Manual impls: derives would put bounds on T
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index)
    }
}

pub struct Registry<T> {
    by_name: HashMap<String, Id<T>>,
    items: Vec<T>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            items: Vec::new(),
        }
    }

    pub fn insert(&mut self, name: &str, item: T) -> Id<T> {
        if let Some(&id) = self.by_name.get(name) {
            log::debug!("Replacing registry entry '{}'", name);
            self.items[id.index as usize] = item;
            return id;
        }

        let id = Id::from_index(self.items.len() as u32);
        self.items.push(item);
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<Id<T>> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.items.get(id.index as usize)
    }

    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        self.items.get_mut(id.index as usize)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.id(name).and_then(|id| self.get(id))
    }

    pub fn contains(&self, id: Id<T>) -> bool {
        (id.index as usize) < self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
