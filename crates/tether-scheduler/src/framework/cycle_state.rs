use crate::{Result, SchedulerError};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Key under which a plugin stores data in the cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey(&'static str);

impl StateKey {
    pub const fn new(key: &'static str) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Data a plugin stores in the cycle state
///
/// Implemented for every `Clone` type; `clone_data` is how a copied
/// `CycleState` gets an independent value.
pub trait StateData: Any + Send + Sync + fmt::Debug {
    /// Return an independent copy of this value
    fn clone_data(&self) -> Box<dyn StateData>;

    fn as_any(&self) -> &dyn Any;
}

impl<T> StateData for T
where
    T: Any + Clone + Send + Sync + fmt::Debug,
{
    fn clone_data(&self) -> Box<dyn StateData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Per-cycle, per-pod state shared between the plugins of one scheduling attempt
///
/// A new `CycleState` is created for every attempt and dropped when it ends.
/// Writes need `&mut self`, so only extension points that run sequentially
/// (Reserve) can store data; Filter runs concurrently on `&CycleState`.
#[derive(Debug, Default)]
pub struct CycleState {
    storage: HashMap<StateKey, Box<dyn StateData>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn write<T: StateData>(&mut self, key: StateKey, value: T) {
        self.storage.insert(key, Box::new(value));
    }

    /// Read the value stored under `key` as a `T`
    ///
    /// Fails with `StateNotFound` if nothing was written under `key`, and
    /// with `StateTypeMismatch` if the stored value is not a `T`.
    pub fn read<T: StateData>(&self, key: StateKey) -> Result<&T> {
        let data = self
            .storage
            .get(&key)
            .ok_or_else(|| SchedulerError::state_not_found(key.as_str()))?;

        (**data)
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| SchedulerError::state_type_mismatch(key.as_str(), short_type_name::<T>()))
    }

    /// Remove the value stored under `key`
    pub fn delete(&mut self, key: StateKey) {
        self.storage.remove(&key);
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl Clone for CycleState {
    fn clone(&self) -> Self {
        Self {
            storage: self
                .storage
                .iter()
                .map(|(key, data)| (*key, (**data).clone_data()))
                .collect(),
        }
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
