//! Typed error hierarchy for the chainrun engine.
//!
//! Four top-level enums cover the subsystems:
//! - `StoreError`: assertion-checked reads and lock handling on keyed stores
//! - `PersistenceError`: snapshot/restore of stores to named slots
//! - `LinkError`: anything a link lifecycle call can fail with
//! - `RunError`: why a run was aborted, with chain/link attribution

use crate::status::StatusCode;
use crate::store::ValueKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading or locking a keyed store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Key '{key}' not found in store")]
    KeyNotFound { key: String },

    #[error("Value under '{key}' is {found}, expected one of {}", format_kinds(.expected))]
    TypeAssertion {
        key: String,
        expected: Vec<ValueKind>,
        found: ValueKind,
    },

    #[error("Value under '{key}' has zero length")]
    LengthAssertion { key: String },

    #[error("Value under '{key}' is {kind}, which has no length")]
    Unsized { key: String, kind: ValueKind },

    #[error("Fork store lock poisoned")]
    LockPoisoned,
}

fn format_kinds(kinds: &[ValueKind]) -> String {
    let names: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
    format!("[{}]", names.join(", "))
}

/// Errors from persisting or restoring a store snapshot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to access snapshot slot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot slot {path} does not exist")]
    NotFound { path: PathBuf },

    #[error("Snapshot slot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised from inside a link's initialize/execute/finalize.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Link '{link}' is misconfigured: {message}")]
    Configuration { link: String, message: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LinkError {
    /// Shorthand for a configuration error attributed to `link`.
    pub fn config(link: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            link: link.to_string(),
            message: message.into(),
        }
    }
}

/// Lifecycle phase a status or error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialize,
    Execute,
    Finalize,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Initialize => write!(f, "initialize"),
            Phase::Execute => write!(f, "execute"),
            Phase::Finalize => write!(f, "finalize"),
        }
    }
}

/// Reasons a run stops with a failure.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Link '{link}' in chain '{chain}' failed during {phase}: {source}")]
    LinkFailed {
        chain: String,
        link: String,
        phase: Phase,
        #[source]
        source: LinkError,
    },

    #[error("Link '{link}' in chain '{chain}' returned Failure during {phase}")]
    LinkReturnedFailure {
        chain: String,
        link: String,
        phase: Phase,
    },

    #[error(
        "Link '{link}' in chain '{chain}' returned {status} during {phase}, which is not allowed there"
    )]
    InvalidStatus {
        chain: String,
        link: String,
        phase: Phase,
        status: StatusCode,
    },

    #[error("Chain '{chain}' requested more than {limit} repeats")]
    RepeatLimitExceeded { chain: String, limit: u32 },

    #[error("Worker {worker} of chain '{chain}' failed: {source}")]
    WorkerFailure {
        chain: String,
        worker: usize,
        #[source]
        source: Box<RunError>,
    },

    #[error("Worker {worker} of chain '{chain}' did not complete: {reason}")]
    WorkerAborted {
        chain: String,
        worker: usize,
        reason: String,
    },

    #[error("Chain '{name}' is already registered")]
    DuplicateChain { name: String },

    #[error("Chain '{chain}' already has a link named '{link}'")]
    DuplicateLink { chain: String, link: String },

    #[error("No chain named '{name}'")]
    UnknownChain { name: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RunError {
    /// Name of the chain the failure is attributed to, if any.
    pub fn chain(&self) -> Option<&str> {
        match self {
            RunError::LinkFailed { chain, .. }
            | RunError::LinkReturnedFailure { chain, .. }
            | RunError::InvalidStatus { chain, .. }
            | RunError::RepeatLimitExceeded { chain, .. }
            | RunError::WorkerFailure { chain, .. }
            | RunError::WorkerAborted { chain, .. }
            | RunError::DuplicateLink { chain, .. } => Some(chain),
            _ => None,
        }
    }

    /// Name of the link the failure is attributed to, if any.
    ///
    /// For a failed fork worker this is the link that failed inside it.
    pub fn link(&self) -> Option<&str> {
        match self {
            RunError::LinkFailed { link, .. }
            | RunError::LinkReturnedFailure { link, .. }
            | RunError::InvalidStatus { link, .. }
            | RunError::DuplicateLink { link, .. } => Some(link),
            RunError::WorkerFailure { source, .. } => source.link(),
            _ => None,
        }
    }
}
