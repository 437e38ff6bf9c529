use serde_json::Value;
use std::path::PathBuf;

use crate::settings::{PersistMode, Settings};
use crate::store::KeyedStore;

/// Well-known ConfigObject keys.
pub mod keys {
    pub const ANALYSIS_NAME: &str = "analysis_name";
    pub const VERSION: &str = "version";
    pub const RESULTS_DIR: &str = "results_dir";
    pub const PERSIST: &str = "persist";
    pub const BEGIN_WITH_CHAIN: &str = "begin_with_chain";
    pub const END_WITH_CHAIN: &str = "end_with_chain";
    pub const MAX_WORKERS: &str = "max_workers";
    pub const REPEAT_LIMIT: &str = "repeat_limit";
    /// Present (and true) only while a chain is being forked
    pub const FORK: &str = "fork";
    /// Fork width of the chain currently being forked
    pub const N_FORK: &str = "n_fork";
    /// Index of the current worker; only set inside a worker
    pub const FORK_INDEX: &str = "fork_index";
}

/// Process-wide run settings, readable by the manager and by links.
///
/// Backed by a [`KeyedStore`] so links can read free-form variables with the
/// same assertion-checked reads they use on the DataStore. Typed accessors
/// cover the well-known keys in [`keys`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigObject {
    store: KeyedStore,
}

impl ConfigObject {
    pub fn new() -> Self {
        Self::from_settings(&Settings::default())
    }

    /// Build a ConfigObject holding `settings` and its free-form variables.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut store = KeyedStore::new();
        store.set(keys::ANALYSIS_NAME, settings.analysis_name.clone());
        store.set(keys::VERSION, settings.version);
        store.set(
            keys::RESULTS_DIR,
            settings.results_dir.to_string_lossy().to_string(),
        );
        store.set(
            keys::PERSIST,
            serde_json::to_value(&settings.persist).unwrap_or(Value::Null),
        );
        if let Some(ref chain) = settings.begin_with_chain {
            store.set(keys::BEGIN_WITH_CHAIN, chain.clone());
        }
        if let Some(ref chain) = settings.end_with_chain {
            store.set(keys::END_WITH_CHAIN, chain.clone());
        }
        store.set(keys::MAX_WORKERS, settings.max_workers() as u64);
        store.set(keys::REPEAT_LIMIT, settings.repeat_limit);
        for (name, value) in &settings.vars {
            store.set(name.clone(), value.clone());
        }
        Self { store }
    }

    /// Rebuild from a persisted store.
    pub fn from_store(store: KeyedStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &KeyedStore {
        &self.store
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.store.get(key).ok()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.store.set(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.store.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains(key)
    }

    /// Whether `key` is present and holds a truthy value.
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    pub fn analysis_name(&self) -> &str {
        self.get(keys::ANALYSIS_NAME)
            .and_then(Value::as_str)
            .unwrap_or("analysis")
    }

    pub fn version(&self) -> u64 {
        self.get(keys::VERSION).and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.get(keys::RESULTS_DIR)
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("results"))
    }

    pub fn persist_mode(&self) -> PersistMode {
        self.get(keys::PERSIST)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn begin_with_chain(&self) -> Option<&str> {
        self.get(keys::BEGIN_WITH_CHAIN).and_then(Value::as_str)
    }

    pub fn end_with_chain(&self) -> Option<&str> {
        self.get(keys::END_WITH_CHAIN).and_then(Value::as_str)
    }

    pub fn max_workers(&self) -> usize {
        self.get(keys::MAX_WORKERS)
            .and_then(Value::as_u64)
            .map(|n| n.max(1) as usize)
            .unwrap_or(1)
    }

    pub fn repeat_limit(&self) -> u32 {
        self.get(keys::REPEAT_LIMIT)
            .and_then(Value::as_u64)
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(crate::chain::DEFAULT_REPEAT_LIMIT)
    }

    /// True while a chain is being forked (in the parent and in workers).
    pub fn is_forked(&self) -> bool {
        self.is_truthy(keys::FORK)
    }

    /// Index of the current worker, `None` outside a worker.
    pub fn fork_index(&self) -> Option<usize> {
        self.get(keys::FORK_INDEX)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }

    pub fn n_fork(&self) -> Option<usize> {
        self.get(keys::N_FORK)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }

    pub(crate) fn enter_fork(&mut self, width: usize) {
        self.set(keys::FORK, true);
        self.set(keys::N_FORK, width as u64);
    }

    pub(crate) fn leave_fork(&mut self) {
        self.remove(keys::FORK);
        self.remove(keys::N_FORK);
        self.remove(keys::FORK_INDEX);
    }

    /// Private copy for worker `index`.
    pub(crate) fn for_worker(&self, index: usize) -> Self {
        let mut copy = self.clone();
        copy.set(keys::FORK_INDEX, index as u64);
        copy
    }
}
