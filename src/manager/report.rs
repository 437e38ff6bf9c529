use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::errors::RunError;
use crate::status::StatusCode;

/// Outcome of one executed chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub name: String,
    pub status: StatusCode,
    /// Links reached by the execute phase
    pub executed_links: usize,
    pub repeats: u32,
    pub fork_width: usize,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Execute time spent in each link, summed over repeats and workers
    pub links: Vec<LinkTiming>,
}

impl ChainReport {
    /// Link timings, slowest first.
    pub fn slowest_links(&self) -> Vec<&LinkTiming> {
        let mut links: Vec<&LinkTiming> = self.links.iter().collect();
        links.sort_by(|a, b| b.duration.cmp(&a.duration));
        links
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkTiming {
    pub name: String,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Outcome of a whole run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Success, BreakChain (stopped early but completed) or Failure
    pub status: StatusCode,
    pub chains: Vec<ChainReport>,
    #[serde(serialize_with = "error_message")]
    pub error: Option<RunError>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl RunReport {
    pub(crate) fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            status: StatusCode::Undefined,
            chains: Vec::new(),
            error: None,
            duration: Duration::ZERO,
        }
    }

    /// Whether the run completed; a run stopped by BreakChain counts.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_completed()
    }

    /// Process exit code: 0 for completed runs, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn chain(&self, name: &str) -> Option<&ChainReport> {
        self.chains.iter().find(|c| c.name == name)
    }
}

fn error_message<S>(error: &Option<RunError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Tracks elapsed time for a chain or a run.
#[derive(Debug)]
pub(crate) struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

mod duration_serde {
    use serde::{Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }
}
