//! Run outcome and progress types shared by the toolbox and its observers
//!
//! # Main Types
//!
//! - [`RunStatus`] - Terminal status of a toolbox run
//! - [`AbortReason`] - Why a run was aborted
//! - [`GroupStats`] - Per-thread-group progress counters
//! - [`RunSummary`] - Aggregate counters broadcast on the `summary` signal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a run ended early
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// Cancellation was requested from outside (e.g. Ctrl-C)
    Cancelled,
    /// A thread group returned an error
    GroupFailed { group: String, error: String },
    /// A thread group panicked
    GroupPanicked { group: String, message: String },
    /// Threads did not exit within the grace period after `cause`
    Hang {
        groups: Vec<String>,
        cause: Box<AbortReason>,
    },
}

impl AbortReason {
    /// The reason without any hang wrapper
    pub fn root(&self) -> &AbortReason {
        match self {
            AbortReason::Hang { cause, .. } => cause.root(),
            other => other,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => write!(f, "cancelled"),
            AbortReason::GroupFailed { group, error } => {
                write!(f, "thread group <{}> failed: {}", group, error)
            }
            AbortReason::GroupPanicked { group, message } => {
                write!(f, "thread group <{}> panicked: {}", group, message)
            }
            AbortReason::Hang { groups, cause } => write!(
                f,
                "thread groups [{}] did not exit within the grace period ({})",
                groups.join(", "),
                cause
            ),
        }
    }
}

/// Terminal status of a toolbox run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    Aborted(AbortReason),
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            RunStatus::Completed => None,
            RunStatus::Aborted(reason) => Some(reason),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "Completed"),
            RunStatus::Aborted(reason) => write!(f, "Aborted ({})", reason),
        }
    }
}

/// Progress counters for one thread group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    /// Thread group name
    pub group: String,
    /// Instance name of the driving processor, if any
    pub driver: Option<String>,
    /// Slices driven through this group so far
    pub slices: u64,
    /// Whether the group's thread has exited
    pub finished: bool,
}

/// Aggregate counters broadcast periodically while running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Wall-clock time of this snapshot
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the run started
    pub elapsed_ms: u64,
    /// Per-group counters, sorted by group name
    pub groups: Vec<GroupStats>,
}

impl RunSummary {
    /// Slices produced by source groups
    pub fn total_slices(&self) -> u64 {
        self.groups.iter().map(|g| g.slices).sum()
    }

    pub fn running_groups(&self) -> usize {
        self.groups.iter().filter(|g| !g.finished).count()
    }

    /// Average slice rate over the whole run
    pub fn slices_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            0.0
        } else {
            self.total_slices() as f64 * 1000.0 / self.elapsed_ms as f64
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} slices in {:.1}s ({:.1}/s), {} of {} groups running",
            self.total_slices(),
            self.elapsed_ms as f64 / 1000.0,
            self.slices_per_second(),
            self.running_groups(),
            self.groups.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        RunSummary {
            timestamp: Utc::now(),
            elapsed_ms: 2000,
            groups: vec![
                GroupStats {
                    group: "a".into(),
                    driver: Some("source".into()),
                    slices: 10,
                    finished: true,
                },
                GroupStats {
                    group: "b".into(),
                    driver: Some("queue".into()),
                    slices: 6,
                    finished: false,
                },
            ],
        }
    }

    #[test]
    fn test_summary_totals() {
        let summary = summary();
        assert_eq!(summary.total_slices(), 16);
        assert_eq!(summary.running_groups(), 1);
        assert!((summary.slices_per_second() - 8.0).abs() < f64::EPSILON);
        assert!(summary.to_string().starts_with("16 slices in 2.0s"));
    }

    #[test]
    fn test_summary_zero_elapsed() {
        let mut summary = summary();
        summary.elapsed_ms = 0;
        assert_eq!(summary.slices_per_second(), 0.0);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RunStatus::Completed.to_string(), "Completed");
        let aborted = RunStatus::Aborted(AbortReason::GroupFailed {
            group: "source".into(),
            error: "boom".into(),
        });
        assert!(!aborted.is_completed());
        assert_eq!(
            aborted.to_string(),
            "Aborted (thread group <source> failed: boom)"
        );
    }

    #[test]
    fn test_hang_root() {
        let reason = AbortReason::Hang {
            groups: vec!["slow".into()],
            cause: Box::new(AbortReason::Cancelled),
        };
        assert_eq!(reason.root(), &AbortReason::Cancelled);
        assert!(reason.to_string().contains("slow"));
    }

    #[test]
    fn test_summary_serializes() {
        let json = serde_json::to_string(&summary()).unwrap();
        let parsed: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.groups, summary().groups);
    }
}
