use serde::Deserialize;

use crate::errors::StoreError;
use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForkIndexOptions {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_store_key")]
    pub store_key: String,
}

fn default_name() -> String {
    "ForkIndex".to_string()
}

fn default_store_key() -> String {
    "fork_index".to_string()
}

/// Inside a fork worker, stores the worker's fork index in its DataStore and
/// counts executions in the ForkStore. Does nothing outside a fork.
#[derive(Debug, Clone)]
pub struct ForkIndex {
    opts: ForkIndexOptions,
}

impl ForkIndex {
    pub fn new(opts: ForkIndexOptions) -> Self {
        Self { opts }
    }

    pub fn with_store_key(name: &str, store_key: &str) -> Self {
        Self::new(ForkIndexOptions {
            name: name.to_string(),
            store_key: store_key.to_string(),
        })
    }

    fn counter_key(&self) -> String {
        format!("n_{}_executed", self.opts.name)
    }
}

impl Link for ForkIndex {
    fn name(&self) -> &str {
        &self.opts.name
    }

    fn initialize(&mut self, services: &mut Services) -> LinkResult {
        let key = self.counter_key();
        services.forkstore.with_lock(|fs| -> Result<(), StoreError> {
            fs.set(key, 0);
            Ok(())
        })?;
        Ok(StatusCode::Success)
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult {
        let Some(index) = services.config.fork_index() else {
            return Ok(StatusCode::Success);
        };
        tracing::debug!(link = %self.opts.name, fork_index = index, "storing fork index");
        services.datastore.set(self.opts.store_key.clone(), index as u64);
        services.forkstore.increment(&self.counter_key(), 1)?;
        Ok(StatusCode::Success)
    }

    fn finalize(&mut self, services: &mut Services) -> LinkResult {
        let key = self.counter_key();
        let executed = services
            .forkstore
            .with_lock(|fs| -> Result<i64, StoreError> {
                if fs.contains(&key) { fs.get_i64(&key) } else { Ok(0) }
            })?;
        tracing::debug!(link = %self.opts.name, executed, "fork index link executions so far");
        Ok(StatusCode::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_outside_fork() {
        let mut services = Services::default();
        let mut link = ForkIndex::with_store_key("idx", "collected");
        link.initialize(&mut services).unwrap();
        link.execute(&mut services).unwrap();
        assert!(!services.datastore.contains("collected"));
    }

    #[test]
    fn test_stores_index_in_worker() {
        let parent = Services::default();
        let mut worker = parent.for_worker(7);
        let mut link = ForkIndex::with_store_key("idx", "collected");
        link.initialize(&mut worker).unwrap();
        link.execute(&mut worker).unwrap();
        assert_eq!(worker.datastore.get_i64("collected").unwrap(), 7);
        assert_eq!(
            parent
                .forkstore
                .snapshot()
                .unwrap()
                .get_i64("n_idx_executed")
                .unwrap(),
            1
        );
    }
}
