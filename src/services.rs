//! Shared process services handed to every link call.
//!
//! The registry is an explicit context object owned by the
//! [`ProcessManager`](crate::manager::ProcessManager) and passed by `&mut` to
//! link lifecycle methods. Fork workers get their own `Services` with private
//! copies of the ConfigObject and DataStore; only the ForkStore handle is
//! shared.
//!
//! Services can be persisted per chain under
//! `{results_dir}/{analysis_name}/proc_service_data/v{version}/_{chain}/`,
//! one JSON file per service kind, with a `latest` marker naming the most
//! recently persisted chain directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ConfigObject;
use crate::errors::PersistenceError;
use crate::persistence;
use crate::settings::Settings;
use crate::store::{DataStore, ForkStore};

const SERVICE_DATA_DIR: &str = "proc_service_data";
const LATEST_MARKER: &str = "latest";

/// Persistable service kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Config,
    DataStore,
}

impl ServiceKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ServiceKind::Config => "config.json",
            ServiceKind::DataStore => "datastore.json",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Services {
    pub config: ConfigObject,
    pub datastore: DataStore,
    pub forkstore: ForkStore,
}

impl Services {
    pub fn new(settings: &Settings) -> Self {
        Self {
            config: ConfigObject::from_settings(settings),
            datastore: DataStore::new(),
            forkstore: ForkStore::new(),
        }
    }

    /// Services for fork worker `index`.
    ///
    /// The config and datastore are private copies of the current (pre-fork)
    /// state; the fork store is the same shared handle.
    pub fn for_worker(&self, index: usize) -> Self {
        Self {
            config: self.config.for_worker(index),
            datastore: self.datastore.clone(),
            forkstore: self.forkstore.clone(),
        }
    }

    /// Drop all service state and start over from `settings`.
    pub fn reset(&mut self, settings: &Settings) {
        *self = Self::new(settings);
    }

    /// Base directory of persisted service data for this analysis and version.
    pub fn service_data_dir(&self) -> PathBuf {
        self.config
            .results_dir()
            .join(sanitize(self.config.analysis_name()))
            .join(SERVICE_DATA_DIR)
            .join(format!("v{}", self.config.version()))
    }

    /// Directory holding the services persisted after `chain`.
    pub fn chain_dir(&self, chain: &str) -> PathBuf {
        self.service_data_dir().join(format!("_{}", chain))
    }

    /// Persist the ConfigObject and DataStore as the output of `chain`.
    pub fn persist(&self, chain: &str) -> Result<PathBuf, PersistenceError> {
        let chain_dir = self.chain_dir(chain);
        persistence::persist(
            self.config.store(),
            &chain_dir.join(ServiceKind::Config.file_name()),
        )?;
        persistence::persist(
            &self.datastore,
            &chain_dir.join(ServiceKind::DataStore.file_name()),
        )?;

        let marker = self.service_data_dir().join(LATEST_MARKER);
        fs::write(&marker, format!("_{}\n", chain)).map_err(|source| PersistenceError::Io {
            path: marker.clone(),
            source,
        })?;

        tracing::info!(chain = %chain, dir = %chain_dir.display(), "persisted process services");
        Ok(chain_dir)
    }

    /// Restore one service kind persisted after `chain`, or after the latest
    /// persisted chain when `chain` is `None`.
    pub fn restore(
        &self,
        kind: ServiceKind,
        chain: Option<&str>,
    ) -> Result<crate::store::KeyedStore, PersistenceError> {
        let dir = match chain {
            Some(chain) => self.chain_dir(chain),
            None => self.latest_dir()?,
        };
        persistence::restore(&dir.join(kind.file_name()))
    }

    /// Replace the live DataStore with the one persisted after `chain`.
    pub fn import_datastore(&mut self, chain: Option<&str>) -> Result<(), PersistenceError> {
        let restored = self.restore(ServiceKind::DataStore, chain)?;
        tracing::debug!(
            chain = chain.unwrap_or(LATEST_MARKER),
            keys = restored.len(),
            "imported datastore"
        );
        self.datastore = restored;
        Ok(())
    }

    fn latest_dir(&self) -> Result<PathBuf, PersistenceError> {
        let base = self.service_data_dir();
        let marker = base.join(LATEST_MARKER);
        let name = read_marker(&marker)?;
        Ok(base.join(name))
    }
}

fn read_marker(marker: &Path) -> Result<String, PersistenceError> {
    match fs::read_to_string(marker) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PersistenceError::NotFound {
            path: marker.to_path_buf(),
        }),
        Err(source) => Err(PersistenceError::Io {
            path: marker.to_path_buf(),
            source,
        }),
    }
}

fn sanitize(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn services_in(dir: &Path) -> Services {
        let settings = Settings {
            analysis_name: "my analysis".to_string(),
            version: 2,
            results_dir: dir.to_path_buf(),
            ..Settings::default()
        };
        Services::new(&settings)
    }

    #[test]
    fn test_service_data_dir_layout() {
        let dir = TempDir::new().unwrap();
        let services = services_in(dir.path());
        assert_eq!(
            services.chain_dir("Start"),
            dir.path()
                .join("my_analysis/proc_service_data/v2/_Start")
        );
    }

    #[test]
    fn test_persist_and_import_datastore() {
        let dir = TempDir::new().unwrap();
        let mut services = services_in(dir.path());
        services.datastore.set("number", 1);
        services.persist("Start").unwrap();

        services.datastore.set("number", 2);
        services.datastore.set("extra", true);
        services.import_datastore(Some("Start")).unwrap();

        assert_eq!(services.datastore.get("number").unwrap(), &json!(1));
        assert!(!services.datastore.contains("extra"));
    }

    #[test]
    fn test_latest_marker_follows_last_persist() {
        let dir = TempDir::new().unwrap();
        let mut services = services_in(dir.path());
        services.datastore.set("step", "first");
        services.persist("First").unwrap();
        services.datastore.set("step", "second");
        services.persist("Second").unwrap();

        let restored = services.restore(ServiceKind::DataStore, None).unwrap();
        assert_eq!(restored.get_str("step").unwrap(), "second");

        let config = services.restore(ServiceKind::Config, Some("First")).unwrap();
        assert_eq!(config.get_str("analysis_name").unwrap(), "my analysis");
    }

    #[test]
    fn test_import_missing_chain_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut services = services_in(dir.path());
        let err = services.import_datastore(Some("Nowhere")).unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
        let err = services.import_datastore(None).unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
    }

    #[test]
    fn test_worker_services_are_private_except_forkstore() {
        let mut parent = Services::default();
        parent.datastore.set("seed", 7);

        let mut worker = parent.for_worker(3);
        worker.datastore.set("seed", 8);
        worker.forkstore.increment("n", 1).unwrap();

        assert_eq!(worker.config.fork_index(), Some(3));
        assert_eq!(parent.config.fork_index(), None);
        assert_eq!(parent.datastore.get_i64("seed").unwrap(), 7);
        assert_eq!(parent.forkstore.snapshot().unwrap().get_i64("n").unwrap(), 1);
    }
}
