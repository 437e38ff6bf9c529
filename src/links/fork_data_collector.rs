//! Collector link merging per-worker results into the parent DataStore.
//!
//! Inside each fork worker, execute appends the listed DataStore values to
//! lists in the ForkStore. After all workers joined, finalize runs once in
//! the parent and writes every merged list (optionally transformed) back
//! into the parent DataStore. The order of merged entries is the order in
//! which workers reached the lock and carries no meaning.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::config::keys;
use crate::errors::{LinkError, StoreError};
use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;

/// Function applied to a merged ForkStore value before it is written back.
pub type Transform = Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// One DataStore key to collect.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectKey {
    pub key_ds: String,
    /// ForkStore key; defaults to `key_ds`
    #[serde(default)]
    pub key_fs: Option<String>,
    /// Append list items one by one instead of appending the list itself
    #[serde(default = "default_true")]
    pub append: bool,
}

impl CollectKey {
    pub fn new(key_ds: &str) -> Self {
        Self {
            key_ds: key_ds.to_string(),
            key_fs: None,
            append: true,
        }
    }

    pub fn key_fs(&self) -> &str {
        self.key_fs.as_deref().unwrap_or(&self.key_ds)
    }
}

fn default_true() -> bool {
    true
}

/// A collect key, either a bare DataStore key or a full table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CollectKeySpec {
    Key(String),
    Full(CollectKey),
}

impl From<CollectKeySpec> for CollectKey {
    fn from(spec: CollectKeySpec) -> Self {
        match spec {
            CollectKeySpec::Key(key) => CollectKey::new(&key),
            CollectKeySpec::Full(key) => key,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForkDataCollectorOptions {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub keys: Vec<CollectKeySpec>,
}

fn default_name() -> String {
    "ForkDataCollector".to_string()
}

#[derive(Clone)]
pub struct ForkDataCollector {
    name: String,
    keys: Vec<CollectKey>,
    transforms: HashMap<String, Transform>,
}

impl std::fmt::Debug for ForkDataCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkDataCollector")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ForkDataCollector {
    pub fn new(opts: ForkDataCollectorOptions) -> Self {
        Self {
            name: opts.name,
            keys: opts.keys.into_iter().map(CollectKey::from).collect(),
            transforms: HashMap::new(),
        }
    }

    pub fn with_keys(name: &str, keys: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keys: keys.iter().map(|k| CollectKey::new(k)).collect(),
            transforms: HashMap::new(),
        }
    }

    /// Apply `transform` to the merged value of `key_ds` before storing it.
    pub fn with_transform(
        mut self,
        key_ds: &str,
        transform: impl Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.transforms
            .insert(key_ds.to_string(), Arc::new(transform));
        self
    }

    fn counter_key(&self) -> String {
        format!("n_{}_executed", self.name)
    }
}

impl Link for ForkDataCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, services: &mut Services) -> LinkResult {
        if self.keys.is_empty() {
            tracing::warn!(link = %self.name, "no keys to collect");
        }
        if self.keys.iter().any(|k| k.key_ds.is_empty()) {
            return Err(LinkError::config(&self.name, "key_ds not set"));
        }
        let counter = self.counter_key();
        services.forkstore.with_lock(|fs| -> Result<(), StoreError> {
            fs.set(counter, 0);
            Ok(())
        })?;
        Ok(StatusCode::Success)
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult {
        if !services.config.is_forked() {
            return Ok(StatusCode::Success);
        }

        let mut values = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            values.push(services.datastore.get(&key.key_ds)?.clone());
        }

        let counter = self.counter_key();
        services.forkstore.with_lock(|fs| -> Result<(), StoreError> {
            let executed = if fs.contains(&counter) {
                fs.get_i64(&counter)?
            } else {
                0
            };
            fs.set(counter.as_str(), executed + 1);

            for (key, value) in self.keys.iter().zip(values) {
                let mut merged = match fs.remove(key.key_fs()) {
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                match value {
                    Value::Array(items) if key.append => merged.extend(items),
                    other => merged.push(other),
                }
                fs.set(key.key_fs(), Value::Array(merged));
            }
            Ok(())
        })?;
        Ok(StatusCode::Success)
    }

    fn finalize(&mut self, services: &mut Services) -> LinkResult {
        let counter = self.counter_key();
        let (executed, n_fork, merged) =
            services.forkstore.with_lock(|fs| -> Result<_, StoreError> {
                let executed = if fs.contains(&counter) {
                    fs.get_i64(&counter)?
                } else {
                    0
                };
                let n_fork = if fs.contains(keys::N_FORK) {
                    fs.get_i64(keys::N_FORK)?
                } else {
                    0
                };
                if executed == 0 {
                    return Ok((0, n_fork, Vec::new()));
                }
                let mut merged = Vec::with_capacity(self.keys.len());
                for key in &self.keys {
                    merged.push(fs.get(key.key_fs())?.clone());
                }
                Ok((executed, n_fork, merged))
            })?;

        if executed == 0 {
            return Ok(StatusCode::Success);
        }
        if n_fork > 0 && executed % n_fork != 0 {
            tracing::warn!(
                link = %self.name,
                executed,
                n_fork,
                "collector did not execute a multiple of the fork width, data may be missing"
            );
        }

        for (key, value) in self.keys.iter().zip(merged) {
            let value = match self.transforms.get(&key.key_ds) {
                Some(transform) => transform(value).map_err(|e| {
                    LinkError::Other(e.context(format!("failed to transform '{}'", key.key_ds)))
                })?,
                None => value,
            };
            tracing::debug!(link = %self.name, key = %key.key_ds, "storing merged fork results");
            services.datastore.set(key.key_ds.clone(), value);
        }
        Ok(StatusCode::Success)
    }

    fn merges_fork_results(&self) -> bool {
        true
    }
}
