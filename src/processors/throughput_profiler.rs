//! `throughput-profiler`: measures slices per second between `start` and `stop`.
//!
//! Connect `start` and `stop` to any signals (they ignore their argument) and
//! `data` to a record signal. On `stop` the profiler logs its measurement and,
//! if `output_file` is set, writes it as a JSON report.

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ConfigError, ParamNode};
use crate::pipeline::{Ports, Processor, Slot};
use crate::record::DataHandle;

pub const TYPE_KEY: &str = "throughput-profiler";

/// One profiling window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputReport {
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub slices: u64,
    pub elapsed_ms: f64,
    pub slices_per_second: f64,
}

#[derive(Debug, Default)]
struct Profile {
    output_file: Option<PathBuf>,
    started: Option<(Instant, DateTime<Utc>)>,
    slices: u64,
    report: Option<ThroughputReport>,
}

impl Profile {
    fn start(&mut self) {
        if self.started.is_some() {
            tracing::debug!("Profiler already started");
            return;
        }
        self.started = Some((Instant::now(), Utc::now()));
        self.slices = 0;
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        let Some((instant, started_at)) = self.started.take() else {
            tracing::warn!("Profiler stopped without being started");
            return Ok(());
        };
        let elapsed = instant.elapsed().as_secs_f64();
        let report = ThroughputReport {
            started_at,
            stopped_at: Utc::now(),
            slices: self.slices,
            elapsed_ms: elapsed * 1000.0,
            slices_per_second: if elapsed > 0.0 {
                self.slices as f64 / elapsed
            } else {
                0.0
            },
        };
        tracing::info!(
            "Processed {} slices in {:.3} s ({:.1} slices/s)",
            report.slices,
            elapsed,
            report.slices_per_second
        );

        if let Some(path) = &self.output_file {
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(path, json)
                .with_context(|| format!("writing throughput report to {}", path.display()))?;
            tracing::info!("Throughput report written to {:?}", path);
        }
        self.report = Some(report);
        Ok(())
    }
}

pub struct ThroughputProfiler {
    ports: Ports,
    profile: Arc<Mutex<Profile>>,
}

impl ThroughputProfiler {
    pub fn new() -> Self {
        let mut ports = Ports::new();
        let profile = Arc::new(Mutex::new(Profile::default()));

        let state = profile.clone();
        ports.slot(Slot::unit("start", move || {
            state.lock().start();
            Ok(())
        }));

        let state = profile.clone();
        ports.slot(Slot::new::<DataHandle, _>("data", move |_| {
            let mut profile = state.lock();
            if profile.started.is_none() {
                profile.start();
            }
            profile.slices += 1;
            Ok(())
        }));

        let state = profile.clone();
        ports.slot(Slot::unit("stop", move || state.lock().stop()));

        Self { ports, profile }
    }

    /// The most recent completed measurement.
    pub fn report(&self) -> Option<ThroughputReport> {
        self.profile.lock().report.clone()
    }
}

impl Default for ThroughputProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for ThroughputProfiler {
    fn configure(&mut self, params: &ParamNode) -> Result<(), ConfigError> {
        self.profile.lock().output_file = params.get::<PathBuf>("output_file")?;
        Ok(())
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }
}
