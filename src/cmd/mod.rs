//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `chains` | `Chains`         |

pub mod chains;
pub mod run;

pub use chains::cmd_chains;
pub use run::cmd_run;
