//! Forked chain execution.
//!
//! A forked chain runs its execute phase in `width` parallel workers. Each
//! worker is a blocking task holding a semaphore permit, so at most
//! `max_workers` run at once. Workers own cloned links and private copies of
//! the ConfigObject and DataStore; the ForkStore handle is the only shared
//! state. After every worker has joined, the parent finalizes the collector
//! links, which merge the ForkStore back into the parent DataStore.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::keys;
use crate::errors::{RunError, StoreError};
use crate::link::Link;
use crate::manager::runner::{self, ChainFailure, ExecuteOutcome};
use crate::services::Services;
use crate::status::StatusCode;

/// Parameters of one forked execution.
#[derive(Debug, Clone, Copy)]
pub struct ForkPlan {
    pub width: usize,
    pub max_workers: usize,
    pub repeat_limit: u32,
}

/// Execute phase of one worker, followed by finalize of its non-collector
/// links.
fn run_worker(
    chain: &str,
    links: &mut [Box<dyn Link>],
    services: &mut Services,
    repeat_limit: u32,
) -> Result<ExecuteOutcome, ChainFailure> {
    let outcome = runner::execute_links(chain, links, services, repeat_limit)?;
    runner::finalize_links(chain, links, services, |l| !l.merges_fork_results()).map_err(
        |error| ChainFailure {
            error,
            reached: outcome.reached,
            repeats: outcome.repeats,
        },
    )?;
    Ok(outcome)
}

/// Run the execute and finalize phases of an initialized chain in parallel
/// workers.
///
/// All workers are joined before any decision is taken. If one or more
/// workers failed, the run fails with [`RunError::WorkerFailure`] wrapping
/// the error of the lowest failing fork index; the collector pass is then
/// skipped and the ForkStore is left as the workers wrote it.
pub async fn run_forked(
    chain: &str,
    links: &mut [Box<dyn Link>],
    services: &mut Services,
    plan: ForkPlan,
) -> Result<ExecuteOutcome, ChainFailure> {
    tracing::info!(
        chain = %chain,
        width = plan.width,
        max_workers = plan.max_workers,
        "forking chain"
    );

    services.config.enter_fork(plan.width);
    services
        .forkstore
        .with_lock(|fs| -> Result<(), StoreError> {
            fs.set(keys::N_FORK, plan.width as u64);
            Ok(())
        })
        .map_err(RunError::from)?;

    let semaphore = Arc::new(Semaphore::new(plan.max_workers.max(1)));
    let mut handles: Vec<(usize, JoinHandle<Result<ExecuteOutcome, ChainFailure>>)> =
        Vec::with_capacity(plan.width);
    let mut failures: Vec<(usize, RunError)> = Vec::new();
    let mut reached = 0usize;
    let mut repeats = 0u32;

    for index in 0..plan.width {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                let reason = format!("no worker permit: {}", e);
                failures.push((index, aborted(chain, index, reason)));
                continue;
            }
        };

        let mut worker_links: Vec<Box<dyn Link>> = links.to_vec();
        let mut worker_services = services.for_worker(index);
        let chain_name = chain.to_string();
        let repeat_limit = plan.repeat_limit;

        tracing::debug!(chain = %chain, fork_index = index, "spawning worker");
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit; // Hold until complete
            run_worker(&chain_name, &mut worker_links, &mut worker_services, repeat_limit)
        });
        handles.push((index, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (index, handle) in handles {
        match handle.await {
            Ok(Ok(outcome)) => {
                tracing::debug!(
                    chain = %chain,
                    fork_index = index,
                    status = %outcome.status,
                    "worker finished"
                );
                outcomes.push(outcome);
            }
            Ok(Err(failure)) => {
                tracing::error!(
                    chain = %chain,
                    fork_index = index,
                    error = %failure.error,
                    "worker failed"
                );
                reached = reached.max(failure.reached);
                repeats = repeats.max(failure.repeats);
                failures.push((index, failure.error));
            }
            Err(e) => {
                tracing::error!(chain = %chain, fork_index = index, error = %e, "worker panicked");
                let reason = format!("worker panicked: {}", e);
                failures.push((index, aborted(chain, index, reason)));
            }
        }
    }

    services.config.leave_fork();

    for outcome in &outcomes {
        reached = reached.max(outcome.reached);
        repeats = repeats.max(outcome.repeats);
    }

    if let Some((worker, error)) = failures.into_iter().min_by_key(|(index, _)| *index) {
        let error = match error {
            e @ RunError::WorkerAborted { .. } => e,
            other => RunError::WorkerFailure {
                chain: chain.to_string(),
                worker,
                source: Box::new(other),
            },
        };
        return Err(ChainFailure {
            error,
            reached,
            repeats,
        });
    }

    let status = StatusCode::most_severe(outcomes.iter().map(|o| o.status));
    let mut link_durations = vec![Duration::ZERO; links.len()];
    for outcome in &outcomes {
        for (total, spent) in link_durations.iter_mut().zip(&outcome.link_durations) {
            *total += *spent;
        }
    }

    runner::finalize_links(chain, links, services, |l| l.merges_fork_results()).map_err(
        |error| ChainFailure {
            error,
            reached,
            repeats,
        },
    )?;

    tracing::info!(chain = %chain, width = plan.width, %status, "finished forking chain");
    Ok(ExecuteOutcome {
        status,
        reached,
        repeats,
        link_durations,
    })
}

fn aborted(chain: &str, worker: usize, reason: String) -> RunError {
    RunError::WorkerAborted {
        chain: chain.to_string(),
        worker,
        reason,
    }
}
