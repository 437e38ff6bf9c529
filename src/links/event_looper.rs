use serde::Deserialize;
use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::LinkError;
use crate::link::{Link, LinkResult};
use crate::services::Services;
use crate::status::StatusCode;

/// Function applied to every accepted input line, in registration order.
pub type LineProcessor = Arc<dyn Fn(String) -> String + Send + Sync>;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventLooperOptions {
    #[serde(default = "default_name")]
    pub name: String,
    /// Input file; standard input when unset
    #[serde(default)]
    pub filename: Option<PathBuf>,
    /// Collect the lines under this DataStore key instead of printing them
    #[serde(default)]
    pub store_key: Option<String>,
    #[serde(default)]
    pub sort: bool,
    /// Drop repeated lines, keeping the first occurrence
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "default_skip_prefixes")]
    pub skip_line_beginning_with: Vec<String>,
}

fn default_name() -> String {
    "EventLooper".to_string()
}

fn default_skip_prefixes() -> Vec<String> {
    vec!["#".to_string()]
}

impl Default for EventLooperOptions {
    fn default() -> Self {
        Self {
            name: default_name(),
            filename: None,
            store_key: None,
            sort: false,
            unique: false,
            skip_line_beginning_with: default_skip_prefixes(),
        }
    }
}

/// Reads input lines, processes them and prints or stores them.
///
/// Lines are trimmed; empty lines and lines starting with one of the skip
/// prefixes are dropped. With `store_key` set, the processed lines go to the
/// DataStore as a list together with their count under `n_<store_key>`, so a
/// later `RepeatChain` or `LinePrinter` can pick them up. Otherwise each line
/// is printed to stdout for the next stage of a shell pipeline.
#[derive(Clone)]
pub struct EventLooper {
    opts: EventLooperOptions,
    processors: Vec<LineProcessor>,
}

impl std::fmt::Debug for EventLooper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLooper")
            .field("opts", &self.opts)
            .field("processors", &self.processors.len())
            .finish()
    }
}

impl EventLooper {
    pub fn new(opts: EventLooperOptions) -> Self {
        Self {
            opts,
            processors: Vec::new(),
        }
    }

    pub fn with_processor(
        mut self,
        processor: impl Fn(String) -> String + Send + Sync + 'static,
    ) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    fn read_lines(&self) -> Result<Vec<String>, LinkError> {
        let reader: Box<dyn BufRead> = match self.opts.filename {
            Some(ref path) => {
                let file = std::fs::File::open(path).map_err(|e| {
                    LinkError::config(
                        &self.opts.name,
                        format!("cannot open {}: {}", path.display(), e),
                    )
                })?;
                Box::new(BufReader::new(file))
            }
            None => Box::new(std::io::stdin().lock()),
        };

        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(anyhow::Error::from)?;
            let line = line.trim();
            if line.is_empty()
                || self
                    .opts
                    .skip_line_beginning_with
                    .iter()
                    .any(|prefix| line.starts_with(prefix.as_str()))
            {
                continue;
            }
            let processed = self
                .processors
                .iter()
                .fold(line.to_string(), |line, processor| processor(line));
            lines.push(processed);
        }
        Ok(lines)
    }
}

impl Link for EventLooper {
    fn name(&self) -> &str {
        &self.opts.name
    }

    fn initialize(&mut self, _services: &mut Services) -> LinkResult {
        if let Some(ref key) = self.opts.store_key {
            if key.is_empty() {
                return Err(LinkError::config(&self.opts.name, "store_key is empty"));
            }
        }
        if let Some(ref path) = self.opts.filename {
            if !path.is_file() {
                return Err(LinkError::config(
                    &self.opts.name,
                    format!("cannot open {}", path.display()),
                ));
            }
        }
        Ok(StatusCode::Success)
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult {
        let mut lines = self.read_lines()?;

        let Some(ref key) = self.opts.store_key else {
            for line in &lines {
                println!("{}", line);
            }
            return Ok(StatusCode::Success);
        };

        if self.opts.sort {
            lines.sort();
        }
        if self.opts.unique {
            let mut seen = HashSet::new();
            lines.retain(|line| seen.insert(line.clone()));
        }

        tracing::debug!(link = %self.opts.name, key = %key, lines = lines.len(), "storing lines");
        services.datastore.set(format!("n_{}", key), lines.len() as u64);
        services.datastore.set(key.clone(), lines);
        Ok(StatusCode::Success)
    }
}
