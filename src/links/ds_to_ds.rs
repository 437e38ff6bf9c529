use serde::Deserialize;

use crate::errors::LinkError;
use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DsToDsOptions {
    #[serde(default = "default_name")]
    pub name: String,
    pub read_key: String,
    pub store_key: String,
    /// Keep the value under `read_key` instead of moving it
    #[serde(default)]
    pub copy: bool,
}

fn default_name() -> String {
    "DsToDs".to_string()
}

/// Moves (or copies) a DataStore value to another key.
#[derive(Debug, Clone)]
pub struct DsToDs {
    opts: DsToDsOptions,
}

impl DsToDs {
    pub fn new(opts: DsToDsOptions) -> Self {
        Self { opts }
    }
}

impl Link for DsToDs {
    fn name(&self) -> &str {
        &self.opts.name
    }

    fn initialize(&mut self, _services: &mut Services) -> LinkResult {
        if self.opts.read_key.is_empty() {
            return Err(LinkError::config(&self.opts.name, "read_key not set"));
        }
        if self.opts.store_key.is_empty() {
            return Err(LinkError::config(&self.opts.name, "store_key not set"));
        }
        Ok(StatusCode::Success)
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult {
        let ds = &mut services.datastore;
        let value = if self.opts.copy {
            ds.get(&self.opts.read_key).ok().cloned()
        } else {
            ds.remove(&self.opts.read_key)
        };

        match value {
            Some(value) => {
                ds.set(self.opts.store_key.clone(), value);
            }
            None => {
                tracing::warn!(
                    link = %self.opts.name,
                    key = %self.opts.read_key,
                    "read_key not in DataStore"
                );
            }
        }
        Ok(StatusCode::Success)
    }
}
