//! Sequential lifecycle driver for the links of one chain.
//!
//! These functions apply the status-code state machine to a slice of links.
//! The process manager uses them directly for non-forked chains, and every
//! fork worker runs the same execute loop on its private link clones.

use std::time::{Duration, Instant};

use crate::errors::{LinkError, Phase, RunError};
use crate::link::Link;
use crate::services::Services;
use crate::status::StatusCode;

/// How the initialize phase of a chain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOutcome {
    /// Success or SkipChain
    pub status: StatusCode,
    /// Number of leading links whose initialize was called
    pub initialized: usize,
}

/// How the execute phase of a chain ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOutcome {
    /// Success, SkipChain or BreakChain
    pub status: StatusCode,
    /// Number of leading links reached by any pass
    pub reached: usize,
    /// Restarts granted by RepeatChain
    pub repeats: u32,
    /// Time spent in execute per link, summed over passes; index-aligned
    /// with the chain's links
    pub link_durations: Vec<Duration>,
}

impl ExecuteOutcome {
    /// Outcome of a chain skipped during initialize.
    pub fn skipped() -> Self {
        Self {
            status: StatusCode::SkipChain,
            reached: 0,
            repeats: 0,
            link_durations: Vec::new(),
        }
    }
}

/// A chain that stopped with an error, and how far its execute phase got.
#[derive(Debug)]
pub struct ChainFailure {
    pub error: RunError,
    pub reached: usize,
    pub repeats: u32,
}

impl From<RunError> for ChainFailure {
    fn from(error: RunError) -> Self {
        Self {
            error,
            reached: 0,
            repeats: 0,
        }
    }
}

fn attribute(
    chain: &str,
    link: &dyn Link,
    phase: Phase,
    result: Result<StatusCode, LinkError>,
) -> Result<StatusCode, RunError> {
    result.map_err(|source| {
        tracing::error!(
            chain = %chain,
            link = %link.name(),
            %phase,
            error = %source,
            "link raised an error"
        );
        RunError::LinkFailed {
            chain: chain.to_string(),
            link: link.name().to_string(),
            phase,
            source,
        }
    })
}

fn returned_failure(chain: &str, link: &dyn Link, phase: Phase) -> RunError {
    tracing::error!(chain = %chain, link = %link.name(), %phase, "link returned Failure");
    RunError::LinkReturnedFailure {
        chain: chain.to_string(),
        link: link.name().to_string(),
        phase,
    }
}

fn invalid_status(chain: &str, link: &dyn Link, phase: Phase, status: StatusCode) -> RunError {
    tracing::error!(
        chain = %chain,
        link = %link.name(),
        %phase,
        %status,
        "link returned a status not allowed here"
    );
    RunError::InvalidStatus {
        chain: chain.to_string(),
        link: link.name().to_string(),
        phase,
        status,
    }
}

/// Initialize every link in declared order.
///
/// Stops at the first link that asks to skip the chain; later links are then
/// not initialized.
pub fn initialize_links(
    chain: &str,
    links: &mut [Box<dyn Link>],
    services: &mut Services,
) -> Result<InitOutcome, RunError> {
    for (idx, link) in links.iter_mut().enumerate() {
        tracing::debug!(chain = %chain, link = %link.name(), "initializing link");
        let result = link.initialize(services);
        let status = attribute(chain, link.as_ref(), Phase::Initialize, result)?;
        match status {
            StatusCode::Success => {}
            StatusCode::SkipChain => {
                tracing::info!(
                    chain = %chain,
                    link = %link.name(),
                    "chain skipped during initialize"
                );
                return Ok(InitOutcome {
                    status: StatusCode::SkipChain,
                    initialized: idx + 1,
                });
            }
            StatusCode::Failure => {
                return Err(returned_failure(chain, link.as_ref(), Phase::Initialize));
            }
            other => {
                return Err(invalid_status(chain, link.as_ref(), Phase::Initialize, other));
            }
        }
    }
    Ok(InitOutcome {
        status: StatusCode::Success,
        initialized: links.len(),
    })
}

/// Execute the links in declared order until one returns a non-Success
/// signal, restarting from the first link on RepeatChain.
///
/// More than `repeat_limit` restarts fail with `RepeatLimitExceeded`.
pub fn execute_links(
    chain: &str,
    links: &mut [Box<dyn Link>],
    services: &mut Services,
    repeat_limit: u32,
) -> Result<ExecuteOutcome, ChainFailure> {
    let mut repeats = 0u32;
    let mut reached = 0usize;
    let mut link_durations = vec![Duration::ZERO; links.len()];

    loop {
        let mut status = StatusCode::Success;

        for (idx, link) in links.iter_mut().enumerate() {
            reached = reached.max(idx + 1);
            tracing::debug!(chain = %chain, link = %link.name(), "executing link");
            let started = Instant::now();
            let result = link.execute(services);
            link_durations[idx] += started.elapsed();

            let error = match attribute(chain, link.as_ref(), Phase::Execute, result) {
                Ok(StatusCode::Success) => continue,
                Ok(StatusCode::Failure) => {
                    returned_failure(chain, link.as_ref(), Phase::Execute)
                }
                Ok(StatusCode::Undefined) => {
                    invalid_status(chain, link.as_ref(), Phase::Execute, StatusCode::Undefined)
                }
                Ok(signal) => {
                    tracing::debug!(
                        chain = %chain,
                        link = %link.name(),
                        status = %signal,
                        "link ended the pass"
                    );
                    status = signal;
                    break;
                }
                Err(e) => e,
            };
            return Err(ChainFailure {
                error,
                reached,
                repeats,
            });
        }

        if !status.is_repeat_chain() {
            return Ok(ExecuteOutcome {
                status,
                reached,
                repeats,
                link_durations,
            });
        }

        if repeats >= repeat_limit {
            tracing::error!(chain = %chain, limit = repeat_limit, "repeat limit exceeded");
            return Err(ChainFailure {
                error: RunError::RepeatLimitExceeded {
                    chain: chain.to_string(),
                    limit: repeat_limit,
                },
                reached,
                repeats,
            });
        }
        repeats += 1;
        tracing::debug!(chain = %chain, repeat = repeats, "repeating chain");
    }
}

/// Finalize the links selected by `select`, in declared order.
///
/// A failing finalize does not stop the pass: the remaining links are still
/// finalized and the first error is returned at the end.
pub fn finalize_links(
    chain: &str,
    links: &mut [Box<dyn Link>],
    services: &mut Services,
    select: impl Fn(&dyn Link) -> bool,
) -> Result<(), RunError> {
    let mut first_error = None;

    for link in links.iter_mut() {
        if !select(link.as_ref()) {
            continue;
        }
        tracing::debug!(chain = %chain, link = %link.name(), "finalizing link");
        let result = link.finalize(services);
        let outcome = match attribute(chain, link.as_ref(), Phase::Finalize, result) {
            Ok(StatusCode::Success) => Ok(()),
            Ok(StatusCode::Failure) => Err(returned_failure(chain, link.as_ref(), Phase::Finalize)),
            Ok(other) => Err(invalid_status(chain, link.as_ref(), Phase::Finalize, other)),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
