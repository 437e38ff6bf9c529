//! Built-in links.
//!
//! Every link takes an options struct that deserializes with
//! `deny_unknown_fields`, so a misspelled option in a pipeline file is
//! rejected when the pipeline is built.

mod assert_in_ds;
mod break_link;
mod ds_to_ds;
mod event_looper;
mod fork_data_collector;
mod fork_index;
mod line_printer;
mod repeat_chain;
mod skip_chain_if_empty;
mod skip_chain_if_present;
mod to_ds;

pub use assert_in_ds::{AssertInDs, AssertInDsOptions};
pub use break_link::{Break, BreakOptions};
pub use ds_to_ds::{DsToDs, DsToDsOptions};
pub use event_looper::{EventLooper, EventLooperOptions, LineProcessor};
pub use fork_data_collector::{
    CollectKey, CollectKeySpec, ForkDataCollector, ForkDataCollectorOptions, Transform,
};
pub use fork_index::{ForkIndex, ForkIndexOptions};
pub use line_printer::{LinePrinter, LinePrinterOptions};
pub use repeat_chain::{RepeatChain, RepeatChainOptions};
pub use skip_chain_if_empty::{SkipChainIfEmpty, SkipChainIfEmptyOptions};
pub use skip_chain_if_present::{SkipChainIfPresent, SkipChainIfPresentOptions};
pub use to_ds::{ToDs, ToDsOptions};
