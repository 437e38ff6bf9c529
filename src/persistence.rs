//! Snapshot and restore of keyed stores to named slots.
//!
//! A slot is a filesystem path holding the store as a JSON object. Restoring
//! always produces a fresh store; it never merges into an existing one.

use crate::errors::PersistenceError;
use crate::store::KeyedStore;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Serialize `store` into `slot`, replacing any previous snapshot.
pub fn persist(store: &KeyedStore, slot: &Path) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: slot.to_path_buf(),
        source,
    };

    if let Some(parent) = slot.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let file = fs::File::create(slot).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, store).map_err(|e| PersistenceError::Io {
        path: slot.to_path_buf(),
        source: e.into(),
    })?;
    writer.flush().map_err(io_err)?;

    tracing::debug!(slot = %slot.display(), keys = store.len(), "persisted store");
    Ok(())
}

/// Deserialize the snapshot in `slot` into a new store.
pub fn restore(slot: &Path) -> Result<KeyedStore, PersistenceError> {
    let file = match fs::File::open(slot) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PersistenceError::NotFound {
                path: slot.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(PersistenceError::Io {
                path: slot.to_path_buf(),
                source,
            });
        }
    };

    let store: KeyedStore =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            PersistenceError::Corrupt {
                path: slot.to_path_buf(),
                source,
            }
        })?;

    tracing::debug!(slot = %slot.display(), keys = store.len(), "restored store");
    Ok(store)
}
