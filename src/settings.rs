//! Run settings with layered sources.
//!
//! Settings come from the `[settings]` table of a pipeline file, or from a
//! standalone settings file given with `chainrun run --settings`, which
//! replaces that table. Environment variables override them, then CLI flags.
//!
//! ```toml
//! analysis_name = "esk105"
//! version = 0
//! results_dir = "results"
//! persist = "each_chain"        # none | last_chain | each_chain | { one_chain = "chain2" }
//! begin_with_chain = "chain2"
//! max_workers = 8
//! repeat_limit = 1000
//!
//! [vars]
//! threshold = 0.25
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::chain::DEFAULT_REPEAT_LIMIT;

/// When to persist the process services (ConfigObject and DataStore).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// Never persist
    #[default]
    None,
    /// Persist once, after the last executed chain
    LastChain,
    /// Persist after every executed chain
    EachChain,
    /// Persist after the named chain and every chain after it
    OneChain(String),
}

impl std::fmt::Display for PersistMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistMode::None => write!(f, "none"),
            PersistMode::LastChain => write!(f, "last_chain"),
            PersistMode::EachChain => write!(f, "each_chain"),
            PersistMode::OneChain(chain) => write!(f, "one_chain:{}", chain),
        }
    }
}

impl std::str::FromStr for PersistMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(chain) = s.strip_prefix("one_chain:") {
            if chain.is_empty() {
                anyhow::bail!("one_chain persist mode needs a chain name");
            }
            return Ok(PersistMode::OneChain(chain.to_string()));
        }
        match s.to_lowercase().as_str() {
            "none" => Ok(PersistMode::None),
            "last_chain" => Ok(PersistMode::LastChain),
            "each_chain" => Ok(PersistMode::EachChain),
            _ => anyhow::bail!(
                "Invalid persist mode '{}'. Valid values: none, last_chain, each_chain, one_chain:<chain>",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_analysis_name")]
    pub analysis_name: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default)]
    pub persist: PersistMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_with_chain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_with_chain: Option<String>,
    /// Run only this chain; shorthand for begin and end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_chain: Option<String>,
    /// Cap on concurrently running fork workers (default: available parallelism)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Default repeat ceiling for chains that do not set their own
    #[serde(default = "default_repeat_limit")]
    pub repeat_limit: u32,
    /// Free-form variables copied into the ConfigObject
    #[serde(default)]
    pub vars: Map<String, Value>,
}

fn default_analysis_name() -> String {
    "analysis".to_string()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_repeat_limit() -> u32 {
    DEFAULT_REPEAT_LIMIT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            analysis_name: default_analysis_name(),
            version: 0,
            results_dir: default_results_dir(),
            persist: PersistMode::default(),
            begin_with_chain: None,
            end_with_chain: None,
            single_chain: None,
            max_workers: None,
            repeat_limit: default_repeat_limit(),
            vars: Map::new(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse settings from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let mut settings: Self = toml::from_str(content).context("Failed to parse settings")?;
        settings.normalize();
        Ok(settings)
    }

    /// Apply `CHAINRUN_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(name) = lookup("CHAINRUN_ANALYSIS_NAME") {
            self.analysis_name = name;
        }
        if let Some(version) = lookup("CHAINRUN_VERSION") {
            self.version = version
                .parse()
                .with_context(|| format!("Invalid CHAINRUN_VERSION '{}'", version))?;
        }
        if let Some(dir) = lookup("CHAINRUN_RESULTS_DIR") {
            self.results_dir = PathBuf::from(dir);
        }
        if let Some(workers) = lookup("CHAINRUN_MAX_WORKERS") {
            self.max_workers = Some(
                workers
                    .parse()
                    .with_context(|| format!("Invalid CHAINRUN_MAX_WORKERS '{}'", workers))?,
            );
        }
        Ok(())
    }

    /// Restrict the run to a single chain.
    pub fn with_single_chain(mut self, chain: &str) -> Self {
        self.single_chain = Some(chain.to_string());
        self.normalize();
        self
    }

    /// Effective worker cap.
    pub fn max_workers(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    pub(crate) fn normalize(&mut self) {
        if let Some(ref chain) = self.single_chain {
            self.begin_with_chain = Some(chain.clone());
            self.end_with_chain = Some(chain.clone());
        }
    }

    /// Return warnings for suspicious but loadable settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.analysis_name.trim().is_empty() {
            warnings.push("analysis_name is empty".to_string());
        }
        if self.repeat_limit == 0 {
            warnings.push("repeat_limit is 0: any RepeatChain signal fails the run".to_string());
        }
        if self.single_chain.is_some() && self.persist == PersistMode::None {
            warnings.push(
                "single_chain without persistence: results of the chain are discarded".to_string(),
            );
        }
        warnings
    }
}
