//! Run-time settings for the toolbox scheduler.
//!
//! These come from the `[run]` section of a toolbox configuration file. All
//! durations are stored in milliseconds so the file format stays flat.
//!
//! # Timing
//!
//! - **Grace period**: how long an abort waits for threads to exit before
//!   reporting the stragglers as hung.
//! - **Summary interval**: how often the `summary` signal fires while running.
//!   Zero disables it.
//! - **Queue timeout**: the poll interval used by consumer groups between timed
//!   pops, which bounds how long they take to notice a cancellation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default grace period for joining threads after an abort
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2000;

/// Default summary broadcast interval
pub const DEFAULT_SUMMARY_INTERVAL_MS: u64 = 1000;

/// Default consumer poll interval
pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 500;

/// Scheduler timing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Time allowed for threads to exit after an abort
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Interval between `summary` broadcasts (0 disables)
    #[serde(default = "default_summary_interval_ms")]
    pub summary_interval_ms: u64,

    /// Poll interval for consumer groups
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
}

fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}

fn default_summary_interval_ms() -> u64 {
    DEFAULT_SUMMARY_INTERVAL_MS
}

fn default_queue_timeout_ms() -> u64 {
    DEFAULT_QUEUE_TIMEOUT_MS
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            summary_interval_ms: DEFAULT_SUMMARY_INTERVAL_MS,
            queue_timeout_ms: DEFAULT_QUEUE_TIMEOUT_MS,
        }
    }
}

impl RunSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// `None` when summaries are disabled
    pub fn summary_interval(&self) -> Option<Duration> {
        (self.summary_interval_ms > 0).then(|| Duration::from_millis(self.summary_interval_ms))
    }

    /// Never zero, so timed pops always make progress
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RunSettings::default();
        assert_eq!(settings.grace_period(), Duration::from_secs(2));
        assert_eq!(settings.summary_interval(), Some(Duration::from_secs(1)));
        assert_eq!(settings.queue_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_interval_disables_summary() {
        let settings = RunSettings {
            summary_interval_ms: 0,
            queue_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(settings.summary_interval(), None);
        assert_eq!(settings.queue_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let settings: RunSettings = toml::from_str("grace_period_ms = 50").unwrap();
        assert_eq!(settings.grace_period_ms, 50);
        assert_eq!(settings.summary_interval_ms, DEFAULT_SUMMARY_INTERVAL_MS);
    }
}
