//! Declarative pipeline files.
//!
//! A pipeline file describes the run settings and the chains with their
//! links:
//!
//! ```toml
//! [settings]
//! analysis_name = "esk106"
//! persist = "each_chain"
//!
//! [[chains]]
//! name = "Start"
//!
//! [[chains.links]]
//! type = "to_ds"
//! store_key = "number"
//! value = 2
//!
//! [[chains]]
//! name = "Fork"
//! fork = 10
//!
//! [[chains.links]]
//! type = "fork_index"
//! store_key = "collected"
//!
//! [[chains.links]]
//! type = "fork_data_collector"
//! keys = ["collected"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::chain::Chain;
use crate::link::Link;
use crate::links::{
    AssertInDs, AssertInDsOptions, Break, BreakOptions, DsToDs, DsToDsOptions, EventLooper,
    EventLooperOptions, ForkDataCollector, ForkDataCollectorOptions, ForkIndex, ForkIndexOptions,
    LinePrinter, LinePrinterOptions, RepeatChain, RepeatChainOptions, SkipChainIfEmpty,
    SkipChainIfEmptyOptions, SkipChainIfPresent, SkipChainIfPresentOptions, ToDs, ToDsOptions,
};
use crate::manager::ProcessManager;
use crate::settings::Settings;

/// A built-in link and its options, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkSpec {
    ToDs(ToDsOptions),
    AssertInDs(AssertInDsOptions),
    DsToDs(DsToDsOptions),
    SkipChainIfEmpty(SkipChainIfEmptyOptions),
    SkipChainIfPresent(SkipChainIfPresentOptions),
    RepeatChain(RepeatChainOptions),
    Break(BreakOptions),
    ForkIndex(ForkIndexOptions),
    ForkDataCollector(ForkDataCollectorOptions),
    EventLooper(EventLooperOptions),
    LinePrinter(LinePrinterOptions),
}

impl LinkSpec {
    pub fn build(&self) -> Box<dyn Link> {
        match self.clone() {
            LinkSpec::ToDs(opts) => Box::new(ToDs::new(opts)),
            LinkSpec::AssertInDs(opts) => Box::new(AssertInDs::new(opts)),
            LinkSpec::DsToDs(opts) => Box::new(DsToDs::new(opts)),
            LinkSpec::SkipChainIfEmpty(opts) => Box::new(SkipChainIfEmpty::new(opts)),
            LinkSpec::SkipChainIfPresent(opts) => Box::new(SkipChainIfPresent::new(opts)),
            LinkSpec::RepeatChain(opts) => Box::new(RepeatChain::new(opts)),
            LinkSpec::Break(opts) => Box::new(Break::new(opts)),
            LinkSpec::ForkIndex(opts) => Box::new(ForkIndex::new(opts)),
            LinkSpec::ForkDataCollector(opts) => Box::new(ForkDataCollector::new(opts)),
            LinkSpec::EventLooper(opts) => Box::new(EventLooper::new(opts)),
            LinkSpec::LinePrinter(opts) => Box::new(LinePrinter::new(opts)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSpec {
    pub name: String,
    /// Number of parallel workers
    #[serde(default = "default_fork")]
    pub fork: usize,
    #[serde(default)]
    pub repeat_limit: Option<u32>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

fn default_fork() -> usize {
    1
}

impl ChainSpec {
    pub fn build(&self) -> Result<Chain> {
        let mut chain = Chain::new(&self.name).with_fork(self.fork);
        if let Some(limit) = self.repeat_limit {
            chain = chain.with_repeat_limit(limit);
        }
        for link in &self.links {
            chain.add_boxed(link.build())?;
        }
        Ok(chain)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineFile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub chains: Vec<ChainSpec>,
}

impl PipelineFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid pipeline file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut pipeline: Self = toml::from_str(content).context("Failed to parse pipeline")?;
        pipeline.settings.normalize();
        Ok(pipeline)
    }

    /// Build a ready-to-run manager using `settings` (normally this file's
    /// settings with environment and CLI overrides applied).
    pub fn build(&self, settings: Settings) -> Result<ProcessManager> {
        for warning in settings.validate() {
            tracing::warn!("{}", warning);
        }
        let mut manager = ProcessManager::new(settings);
        for spec in &self.chains {
            let chain = spec
                .build()
                .with_context(|| format!("Failed to build chain '{}'", spec.name))?;
            manager.add(chain)?;
        }
        Ok(manager)
    }
}
