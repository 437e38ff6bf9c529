use serde::Deserialize;

use crate::errors::StoreError;
use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;
use crate::store::{ValueKind, value_len};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkipChainIfEmptyOptions {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub keys: Vec<String>,
    /// Skip when a key is absent (otherwise warn and continue)
    #[serde(default = "default_true")]
    pub skip_missing: bool,
    /// Skip when a value has zero length
    #[serde(default = "default_true")]
    pub skip_zero_len: bool,
    #[serde(default = "default_true")]
    pub check_at_initialize: bool,
    #[serde(default)]
    pub check_at_execute: bool,
}

fn default_name() -> String {
    "SkipChainIfEmpty".to_string()
}

fn default_true() -> bool {
    true
}

/// Skips the rest of the chain when any of its DataStore entries is missing
/// or empty.
#[derive(Debug, Clone)]
pub struct SkipChainIfEmpty {
    opts: SkipChainIfEmptyOptions,
}

impl SkipChainIfEmpty {
    pub fn new(opts: SkipChainIfEmptyOptions) -> Self {
        Self { opts }
    }

    pub fn with_keys(name: &str, keys: &[&str]) -> Self {
        Self::new(SkipChainIfEmptyOptions {
            name: name.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            skip_missing: true,
            skip_zero_len: true,
            check_at_initialize: true,
            check_at_execute: false,
        })
    }

    fn check(&self, services: &Services) -> LinkResult {
        let ds = &services.datastore;
        for key in &self.opts.keys {
            let Ok(value) = ds.get(key) else {
                if self.opts.skip_missing {
                    tracing::info!(
                        link = %self.opts.name,
                        key = %key,
                        "key not in DataStore, skipping chain"
                    );
                    return Ok(StatusCode::SkipChain);
                }
                tracing::warn!(
                    link = %self.opts.name,
                    key = %key,
                    "key not in DataStore, continuing"
                );
                continue;
            };

            if self.opts.skip_zero_len {
                match value_len(value) {
                    Some(0) => {
                        tracing::info!(
                            link = %self.opts.name,
                            key = %key,
                            "value has zero length, skipping chain"
                        );
                        return Ok(StatusCode::SkipChain);
                    }
                    Some(len) => {
                        tracing::debug!(
                            link = %self.opts.name,
                            key = %key,
                            len,
                            "value is not empty"
                        );
                    }
                    None => {
                        return Err(StoreError::Unsized {
                            key: key.clone(),
                            kind: ValueKind::of(value),
                        }
                        .into());
                    }
                }
            }
        }
        Ok(StatusCode::Success)
    }
}

impl Link for SkipChainIfEmpty {
    fn name(&self) -> &str {
        &self.opts.name
    }

    fn initialize(&mut self, services: &mut Services) -> LinkResult {
        if self.opts.check_at_initialize {
            return self.check(services);
        }
        Ok(StatusCode::Success)
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult {
        if !self.opts.check_at_initialize || self.opts.check_at_execute {
            return self.check(services);
        }
        Ok(StatusCode::Success)
    }
}
