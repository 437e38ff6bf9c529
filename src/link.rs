//! The unit of work executed by a chain.

use crate::errors::LinkError;
use crate::services::Services;
use crate::status::StatusCode;

/// Outcome of a lifecycle call. An `Err` counts as `Failure` and is reported
/// with the chain, link and phase that produced it.
pub type LinkResult = Result<StatusCode, LinkError>;

/// A named unit of work with an initialize/execute/finalize lifecycle.
///
/// - `initialize` runs once per run, before any link of the chain executes,
///   and should validate configuration. It returns `Success`, `Failure` or
///   `SkipChain`.
/// - `execute` may run several times when the chain repeats.
/// - `finalize` runs once, after the chain outcome is known, for every
///   initialized link, including links that never executed. It returns
///   `Success` or `Failure`.
///
/// Links are cloned (via [`dyn_clone`]) for every fork worker, so any state
/// they carry is private to that worker.
pub trait Link: dyn_clone::DynClone + Send {
    fn name(&self) -> &str;

    fn initialize(&mut self, _services: &mut Services) -> LinkResult {
        Ok(StatusCode::Success)
    }

    fn execute(&mut self, services: &mut Services) -> LinkResult;

    fn finalize(&mut self, _services: &mut Services) -> LinkResult {
        Ok(StatusCode::Success)
    }

    /// Collector-style links merge fork results into the parent DataStore.
    ///
    /// For forked chains their finalize runs once in the parent, after all
    /// workers joined, instead of inside the workers.
    fn merges_fork_results(&self) -> bool {
        false
    }
}

dyn_clone::clone_trait_object!(Link);

impl std::fmt::Debug for dyn Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Link name={}>", self.name())
    }
}
