use serde::Deserialize;

use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;
use crate::store::{GetOptions, ValueKind};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkipChainIfPresentOptions {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub keys: Vec<String>,
    /// Check at initialize; when off the check runs at execute
    #[serde(default = "default_true")]
    pub check_at_initialize: bool,
    /// A present key only counts when its value is non-empty
    #[serde(default = "default_true")]
    pub assert_len: bool,
    /// A present key only counts when its value is of one of these kinds
    #[serde(default)]
    pub assert_type: Vec<ValueKind>,
}

fn default_name() -> String {
    "SkipChainIfPresent".to_string()
}

fn default_true() -> bool {
    true
}

/// Skips the chain when all of its keys are already in the DataStore, e.g.
/// because an earlier run produced them.
#[derive(Debug, Clone)]
pub struct SkipChainIfPresent {
    opts: SkipChainIfPresentOptions,
}

impl SkipChainIfPresent {
    pub fn new(opts: SkipChainIfPresentOptions) -> Self {
        Self { opts }
    }

    pub fn with_keys(name: &str, keys: &[&str]) -> Self {
        Self::new(SkipChainIfPresentOptions {
            name: name.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            check_at_initialize: true,
            assert_len: true,
            assert_type: Vec::new(),
        })
    }

    fn check(&self, services: &Services) -> StatusCode {
        let get_opts = GetOptions::new()
            .with_types(&self.opts.assert_type)
            .with_assert_len(self.opts.assert_len);

        let all_present = !self.opts.keys.is_empty()
            && self
                .opts
                .keys
                .iter()
                .all(|key| services.datastore.get_with(key, &get_opts).is_ok());

        if all_present {
            tracing::info!(
                link = %self.opts.name,
                keys = ?self.opts.keys,
                "all keys present, skipping chain"
            );
            StatusCode::SkipChain
        } else {
            StatusCode::Success
        }
    }
}

impl Link for SkipChainIfPresent {
    fn name(&self) -> &str {
        &self.opts.name
    }

    fn initialize(&mut self, services: &mut Services) -> LinkResult {
        if self.opts.check_at_initialize {
            return Ok(self.check(services));
        }
        Ok(StatusCode::Success)
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult {
        if !self.opts.check_at_initialize {
            return Ok(self.check(services));
        }
        Ok(StatusCode::Success)
    }
}
