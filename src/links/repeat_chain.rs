use serde::Deserialize;

use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepeatChainOptions {
    #[serde(default = "default_name")]
    pub name: String,
    /// Repeat until the chain has been restarted this many times
    #[serde(default)]
    pub max_count: Option<u32>,
    /// Repeat while any of these ConfigObject keys is truthy
    #[serde(default)]
    pub listen_to: Vec<String>,
}

fn default_name() -> String {
    "RepeatChain".to_string()
}

/// Asks the manager to restart the current chain.
#[derive(Debug, Clone)]
pub struct RepeatChain {
    opts: RepeatChainOptions,
    counter: u32,
}

impl RepeatChain {
    pub fn new(opts: RepeatChainOptions) -> Self {
        Self { opts, counter: 0 }
    }

    pub fn with_max_count(name: &str, max_count: u32) -> Self {
        Self::new(RepeatChainOptions {
            name: name.to_string(),
            max_count: Some(max_count),
            listen_to: Vec::new(),
        })
    }

    /// Restarts requested so far.
    pub fn count(&self) -> u32 {
        self.counter
    }
}

impl Link for RepeatChain {
    fn name(&self) -> &str {
        &self.opts.name
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult {
        let listening = self
            .opts
            .listen_to
            .iter()
            .any(|key| services.config.is_truthy(key));
        let below_max = self.opts.max_count.is_some_and(|max| self.counter < max);

        if listening || below_max {
            self.counter += 1;
            tracing::debug!(link = %self.opts.name, count = self.counter, "repeating chain");
            return Ok(StatusCode::RepeatChain);
        }
        Ok(StatusCode::Success)
    }
}
