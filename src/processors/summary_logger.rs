//! `summary-logger`: logs each run summary broadcast by the toolbox.
//!
//! Connect `toolbox:summary` to `summary-logger:summary`. With `per_group =
//! true` each group's counters are logged as well.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{ConfigError, ParamNode};
use crate::pipeline::{Ports, Processor, Slot};
use crate::types::RunSummary;

pub const TYPE_KEY: &str = "summary-logger";

pub struct SummaryLogger {
    ports: Ports,
    received: Arc<AtomicU64>,
    per_group: Arc<AtomicBool>,
}

impl SummaryLogger {
    pub fn new() -> Self {
        let mut ports = Ports::new();
        let received = Arc::new(AtomicU64::new(0));
        let per_group = Arc::new(AtomicBool::new(false));

        let count = received.clone();
        let detailed = per_group.clone();
        ports.slot(Slot::new::<RunSummary, _>("summary", move |summary| {
            count.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                "{} slices after {} ms ({:.1}/s), {} groups running",
                summary.total_slices(),
                summary.elapsed_ms,
                summary.slices_per_second(),
                summary.running_groups()
            );
            if detailed.load(Ordering::Relaxed) {
                for group in &summary.groups {
                    tracing::info!(
                        group = %group.group,
                        "{} slices{}",
                        group.slices,
                        if group.finished { " (finished)" } else { "" }
                    );
                }
            }
            Ok(())
        }));

        Self {
            ports,
            received,
            per_group,
        }
    }

    /// Summaries seen so far.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl Default for SummaryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for SummaryLogger {
    fn configure(&mut self, params: &ParamNode) -> Result<(), ConfigError> {
        self.per_group
            .store(params.get_or("per_group", false)?, Ordering::Relaxed);
        Ok(())
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }
}
