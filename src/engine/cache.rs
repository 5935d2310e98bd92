// src/engine/cache.rs

//! Scoped, typed key-value stores shared between planners and steps.
//!
//! A key *type* fixes the value type it maps to, so a lookup can never
//! return the wrong kind of value:
//!
//! ```
//! use hostdag::engine::cache::{CacheKey, ScopedStore};
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! enum CaState { NeedsRenewal }
//!
//! impl CacheKey for CaState {
//!     type Value = bool;
//! }
//!
//! let store = ScopedStore::default();
//! store.set(CaState::NeedsRenewal, true);
//! assert_eq!(store.get(&CaState::NeedsRenewal), Some(true));
//! ```
//!
//! These stores carry *facts*, never ordering: a later task's gate may read
//! a flag an earlier step wrote, but waiting is always expressed as edges.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};

/// A strongly typed cache key.
pub trait CacheKey: Eq + Hash + Clone + Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;
}

/// Named boolean signal, e.g. "the CA needs renewal".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Flag(String);

impl Flag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl CacheKey for Flag {
    type Value = bool;
}

type Erased = Box<dyn Any + Send + Sync>;

/// Concurrent store holding one typed map per key type.
#[derive(Default)]
pub struct ScopedStore {
    maps: RwLock<HashMap<TypeId, Erased>>,
}

impl ScopedStore {
    /// Insert or replace, returning the previous value.
    pub fn set<K: CacheKey>(&self, key: K, value: K::Value) -> Option<K::Value> {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        let slot = maps
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Box::new(HashMap::<K, K::Value>::new()));
        if !(**slot).is::<HashMap<K, K::Value>>() {
            *slot = Box::new(HashMap::<K, K::Value>::new());
        }
        (**slot)
            .downcast_mut::<HashMap<K, K::Value>>()
            .and_then(|map| map.insert(key, value))
    }

    pub fn get<K: CacheKey>(&self, key: &K) -> Option<K::Value> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.get(&TypeId::of::<K>())
            .and_then(|slot| (**slot).downcast_ref::<HashMap<K, K::Value>>())
            .and_then(|map| map.get(key).cloned())
    }

    pub fn contains<K: CacheKey>(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove<K: CacheKey>(&self, key: &K) -> Option<K::Value> {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        maps.get_mut(&TypeId::of::<K>())
            .and_then(|slot| (**slot).downcast_mut::<HashMap<K, K::Value>>())
            .and_then(|map| map.remove(key))
    }

    /// Convenience for [`Flag`]s: unset counts as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.get(&Flag::new(name)).unwrap_or(false)
    }

    pub fn clear(&self) {
        self.maps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds = self
            .maps
            .read()
            .map(|m| m.len())
            .unwrap_or_default();
        f.debug_struct("ScopedStore").field("key_types", &kinds).finish()
    }
}

/// Which store a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Lives as long as the execution context.
    Run,
    /// Cleared when a pipeline starts.
    Pipeline,
    /// Cleared when each module starts.
    Module,
}

#[derive(Debug, Default)]
pub struct Caches {
    run: ScopedStore,
    pipeline: ScopedStore,
    module: ScopedStore,
}

impl Caches {
    pub fn scope(&self, scope: Scope) -> &ScopedStore {
        match scope {
            Scope::Run => &self.run,
            Scope::Pipeline => &self.pipeline,
            Scope::Module => &self.module,
        }
    }

    pub fn run(&self) -> &ScopedStore {
        &self.run
    }

    pub fn pipeline(&self) -> &ScopedStore {
        &self.pipeline
    }

    pub fn module(&self) -> &ScopedStore {
        &self.module
    }
}
