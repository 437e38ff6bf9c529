use serde::Deserialize;

use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssertInDsOptions {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub keys: Vec<String>,
}

fn default_name() -> String {
    "AssertInDs".to_string()
}

/// Fails the run when any of its keys is missing from the DataStore.
#[derive(Debug, Clone)]
pub struct AssertInDs {
    opts: AssertInDsOptions,
}

impl AssertInDs {
    pub fn new(opts: AssertInDsOptions) -> Self {
        Self { opts }
    }

    pub fn with_keys(name: &str, keys: &[&str]) -> Self {
        Self::new(AssertInDsOptions {
            name: name.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        })
    }
}

impl Link for AssertInDs {
    fn name(&self) -> &str {
        &self.opts.name
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult {
        for key in &self.opts.keys {
            services.datastore.get(key)?;
        }
        Ok(StatusCode::Success)
    }
}
