use serde::Deserialize;

use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakOptions {
    #[serde(default = "default_name")]
    pub name: String,
    /// Send BreakChain (stop, run completed) instead of Failure
    #[serde(default)]
    pub send_break: bool,
}

fn default_name() -> String {
    "Break".to_string()
}

/// Halts the run.
#[derive(Debug, Clone)]
pub struct Break {
    opts: BreakOptions,
}

impl Break {
    pub fn new(opts: BreakOptions) -> Self {
        Self { opts }
    }

    pub fn failure(name: &str) -> Self {
        Self::new(BreakOptions {
            name: name.to_string(),
            send_break: false,
        })
    }

    pub fn break_chain(name: &str) -> Self {
        Self::new(BreakOptions {
            name: name.to_string(),
            send_break: true,
        })
    }
}

impl Link for Break {
    fn name(&self) -> &str {
        &self.opts.name
    }

    fn execute(&mut self, _services: &mut Services) -> LinkResult {
        if self.opts.send_break {
            return Ok(StatusCode::BreakChain);
        }
        tracing::info!(link = %self.opts.name, "sending failure to halt the run");
        Ok(StatusCode::Failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals() {
        let mut services = Services::default();
        assert_eq!(
            Break::failure("stop").execute(&mut services).unwrap(),
            StatusCode::Failure
        );
        assert_eq!(
            Break::break_chain("stop").execute(&mut services).unwrap(),
            StatusCode::BreakChain
        );
    }
}
