//! Pipeline execution engine for multi-stage data-analysis jobs.
//!
//! A run is an ordered list of [`Chain`]s, each an ordered list of
//! [`Link`]s. Links read and write a shared [`DataStore`](store::DataStore)
//! and steer the run with [`StatusCode`] signals. The [`ProcessManager`]
//! sequences the chains, applies the signals and runs forked chains in
//! parallel workers that merge their results through a lock-guarded
//! [`ForkStore`](store::ForkStore).

pub mod chain;
pub mod config;
pub mod errors;
pub mod link;
pub mod links;
pub mod manager;
pub mod persistence;
pub mod pipeline;
pub mod services;
pub mod settings;
pub mod status;
pub mod store;

pub use chain::Chain;
pub use config::ConfigObject;
pub use errors::{LinkError, PersistenceError, RunError, StoreError};
pub use link::{Link, LinkResult};
pub use manager::{ProcessManager, RunReport};
pub use services::Services;
pub use settings::{PersistMode, Settings};
pub use status::StatusCode;
