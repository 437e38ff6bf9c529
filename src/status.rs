//! Control signals returned by link lifecycle calls.
//!
//! | Signal        | Current chain                      | Run                              |
//! |---------------|------------------------------------|----------------------------------|
//! | `Success`     | continue with the next link        | continue with the next chain     |
//! | `SkipChain`   | stop; finalize reached links       | continue with the next chain     |
//! | `RepeatChain` | restart execute from the first link | failure once the ceiling is hit |
//! | `BreakChain`  | stop; finalize reached links       | stop, reported as completed      |
//! | `Failure`     | stop                               | abort, reported as failed        |
//! | `Undefined`   | never legal from a link            |                                  |

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Placeholder before any lifecycle call has produced a status
    #[default]
    Undefined,
    Success,
    Failure,
    SkipChain,
    RepeatChain,
    BreakChain,
}

impl StatusCode {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }

    pub fn is_skip_chain(&self) -> bool {
        matches!(self, Self::SkipChain)
    }

    pub fn is_repeat_chain(&self) -> bool {
        matches!(self, Self::RepeatChain)
    }

    pub fn is_break_chain(&self) -> bool {
        matches!(self, Self::BreakChain)
    }

    /// Whether the run as a whole completed (BreakChain counts as completed).
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Success | Self::SkipChain | Self::BreakChain)
    }

    /// Rank used when combining the outcomes of forked workers.
    ///
    /// Higher wins: a single failing worker fails the chain, a break beats a
    /// skip, and a skip beats plain success.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::RepeatChain => 1,
            Self::SkipChain => 2,
            Self::BreakChain => 3,
            Self::Undefined => 4,
            Self::Failure => 5,
        }
    }

    /// Combine worker outcomes, keeping the most severe one.
    pub fn most_severe(codes: impl IntoIterator<Item = StatusCode>) -> StatusCode {
        codes
            .into_iter()
            .max_by_key(|c| c.severity())
            .unwrap_or(StatusCode::Success)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::Undefined => write!(f, "Undefined"),
            StatusCode::Success => write!(f, "Success"),
            StatusCode::Failure => write!(f, "Failure"),
            StatusCode::SkipChain => write!(f, "SkipChain"),
            StatusCode::RepeatChain => write!(f, "RepeatChain"),
            StatusCode::BreakChain => write!(f, "BreakChain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_undefined() {
        assert_eq!(StatusCode::default(), StatusCode::Undefined);
    }

    #[test]
    fn test_completed_statuses() {
        assert!(StatusCode::Success.is_completed());
        assert!(StatusCode::SkipChain.is_completed());
        assert!(StatusCode::BreakChain.is_completed());
        assert!(!StatusCode::Failure.is_completed());
        assert!(!StatusCode::Undefined.is_completed());
        assert!(!StatusCode::RepeatChain.is_completed());
    }

    #[test]
    fn test_most_severe_prefers_failure() {
        let codes = vec![
            StatusCode::Success,
            StatusCode::Failure,
            StatusCode::BreakChain,
        ];
        assert_eq!(StatusCode::most_severe(codes), StatusCode::Failure);
    }

    #[test]
    fn test_most_severe_break_over_skip() {
        let codes = vec![StatusCode::SkipChain, StatusCode::BreakChain];
        assert_eq!(StatusCode::most_severe(codes), StatusCode::BreakChain);
    }

    #[test]
    fn test_most_severe_empty_is_success() {
        assert_eq!(StatusCode::most_severe(Vec::new()), StatusCode::Success);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&StatusCode::SkipChain).unwrap();
        assert_eq!(json, "\"skip_chain\"");
        let parsed: StatusCode = serde_json::from_str("\"break_chain\"").unwrap();
        assert_eq!(parsed, StatusCode::BreakChain);
    }
}
