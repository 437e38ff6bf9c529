use crate::chain::Chain;
use crate::errors::RunError;
use crate::manager::fork::{self, ForkPlan};
use crate::manager::report::{ChainReport, ExecutionTimer, LinkTiming, RunReport};
use crate::manager::runner::{self, ChainFailure, ExecuteOutcome};
use crate::services::Services;
use crate::settings::{PersistMode, Settings};
use crate::status::StatusCode;

/// Owns the ordered chains and the process services of one run.
///
/// A run has three stages:
/// 1. initialize: record each chain's predecessor, apply the
///    begin/end window and, when resuming, restore the DataStore persisted
///    by the chain before the first enabled one;
/// 2. execute: run the enabled chains in declared order, applying the
///    status-code state machine and persisting services as configured;
/// 3. finalize: report the run.
///
/// Call [`ProcessManager::reset`] between independent runs.
#[derive(Debug)]
pub struct ProcessManager {
    chains: Vec<Chain>,
    services: Services,
    settings: Settings,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl ProcessManager {
    pub fn new(settings: Settings) -> Self {
        Self {
            chains: Vec::new(),
            services: Services::new(&settings),
            settings,
        }
    }

    /// Register a chain at the end of the run. Chain names are unique.
    pub fn add(&mut self, chain: Chain) -> Result<(), RunError> {
        if self.chains.iter().any(|c| c.name() == chain.name()) {
            return Err(RunError::DuplicateChain {
                name: chain.name().to_string(),
            });
        }
        tracing::debug!(chain = %chain.name(), links = chain.len(), "registered chain");
        self.chains.push(chain);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Chain, RunError> {
        self.chains
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| RunError::UnknownChain {
                name: name.to_string(),
            })
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Chain, RunError> {
        self.chains
            .iter_mut()
            .find(|c| c.name() == name)
            .ok_or_else(|| RunError::UnknownChain {
                name: name.to_string(),
            })
    }

    /// Remove and return the chain named `name`.
    pub fn discard(&mut self, name: &str) -> Option<Chain> {
        let idx = self.chains.iter().position(|c| c.name() == name)?;
        Some(self.chains.remove(idx))
    }

    /// Remove all chains, clearing their links first.
    pub fn clear(&mut self) {
        for chain in &mut self.chains {
            chain.clear();
        }
        self.chains.clear();
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn chain_names(&self) -> Vec<&str> {
        self.chains.iter().map(|c| c.name()).collect()
    }

    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Remove all chains and start the services over from the settings.
    pub fn reset(&mut self) {
        self.clear();
        self.services.reset(&self.settings);
    }

    /// Run all enabled chains.
    ///
    /// Never panics on link misbehaviour: every failure ends up in the
    /// returned report, together with the chains that ran before it.
    pub async fn run(&mut self) -> RunReport {
        let timer = ExecutionTimer::start();
        let mut report = RunReport::start();
        tracing::info!(
            run_id = %report.run_id,
            chains = self.chains.len(),
            "initializing process manager"
        );

        let result = match self.initialize() {
            Ok(()) => self.execute(&mut report).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(status) => report.status = status,
            Err(e) => {
                tracing::error!(error = %e, "run failed");
                report.status = StatusCode::Failure;
                report.error = Some(e);
            }
        }

        report.duration = timer.elapsed();
        tracing::info!(
            run_id = %report.run_id,
            status = %report.status,
            seconds = report.duration.as_secs_f64(),
            "finalized process manager"
        );
        report
    }

    fn initialize(&mut self) -> Result<(), RunError> {
        let mut prev: Option<String> = None;
        for chain in &mut self.chains {
            chain.enabled = true;
            chain.prev_chain_name = prev.replace(chain.name().to_string());
        }

        let config = &self.services.config;
        let begin = config.begin_with_chain().map(str::to_string);
        let end = config.end_with_chain().map(str::to_string);

        if let Some(ref begin) = begin {
            let idx = self.position(begin)?;
            for chain in &mut self.chains[..idx] {
                chain.enabled = false;
            }
            if let Some(prev) = self.chains[idx].prev_chain_name.clone() {
                tracing::info!(
                    chain = %begin,
                    previous = %prev,
                    "resuming from persisted services"
                );
                self.services
                    .import_datastore(Some(prev.as_str()))
                    .inspect_err(|e| {
                        tracing::error!(
                            chain = %prev,
                            error = %e,
                            "unable to import persisted services"
                        );
                    })?;
            }
        }

        if let Some(ref end) = end {
            let idx = self.position(end)?;
            for chain in &mut self.chains[idx + 1..] {
                chain.enabled = false;
            }
        }

        for chain in &self.chains {
            tracing::debug!(
                chain = %chain.name(),
                enabled = chain.enabled,
                links = ?chain.link_names(),
                "configured chain"
            );
        }
        Ok(())
    }

    fn position(&self, name: &str) -> Result<usize, RunError> {
        self.chains
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| RunError::UnknownChain {
                name: name.to_string(),
            })
    }

    async fn execute(&mut self, report: &mut RunReport) -> Result<StatusCode, RunError> {
        tracing::info!("executing process manager");

        let persist_mode = self.services.config.persist_mode();
        let mut persist_results = persist_mode == PersistMode::EachChain;
        let mut last_chain: Option<String> = None;
        let mut result = Ok(StatusCode::Success);

        for idx in 0..self.chains.len() {
            if !self.chains[idx].enabled {
                tracing::debug!(
                    chain = %self.chains[idx].name(),
                    "chain disabled, not executing"
                );
                continue;
            }

            let timer = ExecutionTimer::start();
            let outcome = self.exec_chain(idx).await;
            let chain = &self.chains[idx];
            let name = chain.name().to_string();
            let (status, executed_links, repeats) = match &outcome {
                Ok(o) => (o.status, o.reached, o.repeats),
                Err(f) => (StatusCode::Failure, f.reached, f.repeats),
            };
            let links = match &outcome {
                Ok(o) => chain
                    .link_names()
                    .into_iter()
                    .zip(&o.link_durations)
                    .map(|(link, duration)| LinkTiming {
                        name: link.to_string(),
                        duration: *duration,
                    })
                    .collect(),
                Err(_) => Vec::new(),
            };
            report.chains.push(ChainReport {
                name: name.clone(),
                status,
                executed_links,
                repeats,
                fork_width: chain.fork(),
                duration: timer.elapsed(),
                links,
            });

            if let Err(failure) = outcome {
                result = Err(failure.error);
                break;
            }

            if persist_mode != PersistMode::None {
                persist_results =
                    persist_results || persist_mode == PersistMode::OneChain(name.clone());
                if persist_results {
                    if let Err(e) = self.services.persist(&name) {
                        result = Err(e.into());
                        break;
                    }
                    last_chain = None;
                } else {
                    last_chain = Some(name.clone());
                }
            }

            if status.is_break_chain() {
                tracing::info!(
                    chain = %name,
                    "BreakChain received, not executing further chains"
                );
                result = Ok(StatusCode::BreakChain);
                break;
            }
        }

        // Output of the last executed chain that was not persisted yet
        if let Some(chain) = last_chain {
            if let Err(e) = self.services.persist(&chain) {
                tracing::error!(chain = %chain, error = %e, "unable to persist process services");
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }

        result
    }

    async fn exec_chain(&mut self, idx: usize) -> Result<ExecuteOutcome, ChainFailure> {
        let repeat_limit = self.chains[idx]
            .repeat_limit()
            .unwrap_or_else(|| self.services.config.repeat_limit());
        let max_workers = self.services.config.max_workers();

        let chain = &mut self.chains[idx];
        let name = chain.name().to_string();
        let width = chain.fork();
        tracing::info!(chain = %name, links = chain.len(), fork = width, "executing chain");

        let init = runner::initialize_links(&name, chain.links_mut(), &mut self.services)?;
        let outcome = if init.status.is_skip_chain() {
            let initialized = &mut chain.links_mut()[..init.initialized];
            runner::finalize_links(&name, initialized, &mut self.services, |_| true)?;
            ExecuteOutcome::skipped()
        } else if width > 1 {
            let plan = ForkPlan {
                width,
                max_workers,
                repeat_limit,
            };
            fork::run_forked(&name, chain.links_mut(), &mut self.services, plan).await?
        } else {
            let links = chain.links_mut();
            let outcome = runner::execute_links(&name, links, &mut self.services, repeat_limit)?;
            runner::finalize_links(&name, links, &mut self.services, |_| true).map_err(
                |error| ChainFailure {
                    error,
                    reached: outcome.reached,
                    repeats: outcome.repeats,
                },
            )?;
            outcome
        };

        self.services
            .forkstore
            .clear()
            .map_err(|e| ChainFailure {
                error: e.into(),
                reached: outcome.reached,
                repeats: outcome.repeats,
            })?;
        tracing::info!(chain = %name, status = %outcome.status, "finished chain");
        Ok(outcome)
    }
}
