use serde::Deserialize;
use serde_json::Value;
use std::io::Write;

use crate::errors::LinkError;
use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinePrinterOptions {
    #[serde(default = "default_name")]
    pub name: String,
    pub read_key: String,
}

fn default_name() -> String {
    "LinePrinter".to_string()
}

/// Prints every line of a non-empty DataStore list to stdout.
#[derive(Debug, Clone)]
pub struct LinePrinter {
    opts: LinePrinterOptions,
}

impl LinePrinter {
    pub fn new(opts: LinePrinterOptions) -> Self {
        Self { opts }
    }

    pub fn reading(read_key: &str) -> Self {
        Self::new(LinePrinterOptions {
            name: default_name(),
            read_key: read_key.to_string(),
        })
    }

    /// Write the lines under `read_key` to `out`, one per line.
    pub fn print_to(&self, services: &Services, out: &mut impl Write) -> LinkResult {
        let lines = services.datastore.get_list(&self.opts.read_key)?;
        if lines.is_empty() {
            return Err(LinkError::config(
                &self.opts.name,
                format!("'{}' is an empty list", self.opts.read_key),
            ));
        }
        for line in lines {
            let written = match line {
                Value::String(s) => writeln!(out, "{}", s),
                other => writeln!(out, "{}", other),
            };
            written.map_err(anyhow::Error::from)?;
        }
        Ok(StatusCode::Success)
    }
}

impl Link for LinePrinter {
    fn name(&self) -> &str {
        &self.opts.name
    }

    fn initialize(&mut self, _services: &mut Services) -> LinkResult {
        if self.opts.read_key.is_empty() {
            return Err(LinkError::config(&self.opts.name, "read_key not set"));
        }
        Ok(StatusCode::Success)
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult {
        self.print_to(services, &mut std::io::stdout().lock())
    }
}
