//! Chain sequencing, forked execution and run reporting.

mod fork;
mod process;
mod report;
mod runner;

pub use fork::ForkPlan;
pub use process::ProcessManager;
pub use report::{ChainReport, LinkTiming, RunReport};
pub use runner::{ChainFailure, ExecuteOutcome, InitOutcome};
