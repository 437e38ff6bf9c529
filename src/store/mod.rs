//! Keyed stores exchanged between links.
//!
//! - [`KeyedStore`] is the ordered key → value mapping with assertion-checked reads.
//! - [`DataStore`] is the run-scoped instance owned by whoever executes a chain.
//! - [`ForkStore`] is the lock-guarded instance shared by fork workers.

mod fork;
mod keyed;

pub use fork::ForkStore;
pub use keyed::{GetOptions, KeyedStore, ValueKind, value_len};

/// Run-scoped store; never shared between fork workers.
pub type DataStore = KeyedStore;
