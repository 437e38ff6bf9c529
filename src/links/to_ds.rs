use serde::Deserialize;
use serde_json::Value;

use crate::errors::LinkError;
use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;

/// Options for [`ToDs`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToDsOptions {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub store_key: Option<String>,
    pub value: Value,
    /// Overwrite a value already in the DataStore
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub at_initialize: bool,
    #[serde(default = "default_true")]
    pub at_execute: bool,
    /// When `value` is a map, store each entry under its own key
    #[serde(default)]
    pub copy_map: bool,
}

fn default_name() -> String {
    "ToDs".to_string()
}

fn default_true() -> bool {
    true
}

/// Stores a literal value in the DataStore.
#[derive(Debug, Clone)]
pub struct ToDs {
    opts: ToDsOptions,
}

impl ToDs {
    pub fn new(opts: ToDsOptions) -> Self {
        Self { opts }
    }

    /// Store `value` under `key` at execute.
    pub fn with_value(name: &str, key: &str, value: impl Into<Value>) -> Self {
        Self::new(ToDsOptions {
            name: name.to_string(),
            store_key: Some(key.to_string()),
            value: value.into(),
            force: false,
            at_initialize: false,
            at_execute: true,
            copy_map: false,
        })
    }

    pub fn force(mut self, force: bool) -> Self {
        self.opts.force = force;
        self
    }

    fn spreads_map(&self) -> bool {
        self.opts.copy_map && self.opts.value.is_object()
    }

    fn store_one(&self, services: &mut Services, key: &str, value: &Value) {
        if services.datastore.contains(key) && !self.opts.force {
            tracing::warn!(
                link = %self.opts.name,
                key = %key,
                "key already in DataStore, not overwriting"
            );
            return;
        }
        tracing::debug!(link = %self.opts.name, key = %key, "storing value");
        services.datastore.set(key, value.clone());
    }

    fn store(&self, services: &mut Services) -> LinkResult {
        match (&self.opts.value, &self.opts.store_key) {
            (Value::Object(entries), _) if self.opts.copy_map => {
                for (key, value) in entries {
                    self.store_one(services, key, value);
                }
            }
            (value, Some(key)) => self.store_one(services, key, value),
            (_, None) => return Err(LinkError::config(&self.opts.name, "store_key not set")),
        }
        Ok(StatusCode::Success)
    }
}

impl Link for ToDs {
    fn name(&self) -> &str {
        &self.opts.name
    }

    fn initialize(&mut self, services: &mut Services) -> LinkResult {
        if self.opts.value.is_null() {
            return Err(LinkError::config(&self.opts.name, "value to store is null"));
        }
        if !self.spreads_map() && self.opts.store_key.as_deref().is_none_or(str::is_empty) {
            return Err(LinkError::config(&self.opts.name, "store_key not set"));
        }
        if self.opts.at_initialize {
            return self.store(services);
        }
        Ok(StatusCode::Success)
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult {
        if self.opts.at_execute {
            return self.store(services);
        }
        Ok(StatusCode::Success)
    }
}
