//! `apply-cut`: routes records by their overall cut verdict.
//!
//! Every record arriving on `data` is re-emitted on `all`, then on `pass` if
//! all attached cuts accept it, otherwise on `fail`.

use anyhow::Context;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{ConfigError, ParamNode};
use crate::pipeline::{Ports, Processor, Slot};
use crate::record::DataHandle;

pub const TYPE_KEY: &str = "apply-cut";

#[derive(Debug, Default)]
struct Tally {
    passed: AtomicU64,
    failed: AtomicU64,
}

pub struct DataCutter {
    ports: Ports,
    tally: Arc<Tally>,
}

impl DataCutter {
    pub fn new() -> Self {
        let mut ports = Ports::new();
        let all = ports.signal::<DataHandle>("all");
        let pass = ports.signal::<DataHandle>("pass");
        let fail = ports.signal::<DataHandle>("fail");
        let tally = Arc::new(Tally::default());

        let counts = tally.clone();
        ports.slot(Slot::new::<DataHandle, _>("data", move |handle| {
            let (sequence, accepted) = {
                let data = handle.lock();
                (data.sequence(), data.cuts().is_accepted())
            };
            all.emit(handle)
                .with_context(|| format!("emitting slice {} on <all>", sequence))?;
            if accepted {
                counts.passed.fetch_add(1, Ordering::Relaxed);
                pass.emit(handle)
                    .with_context(|| format!("emitting slice {} on <pass>", sequence))
            } else {
                counts.failed.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Slice {} rejected", sequence);
                fail.emit(handle)
                    .with_context(|| format!("emitting slice {} on <fail>", sequence))
            }
        }));

        Self { ports, tally }
    }

    /// `(passed, failed)` so far.
    pub fn counts(&self) -> (u64, u64) {
        (
            self.tally.passed.load(Ordering::Relaxed),
            self.tally.failed.load(Ordering::Relaxed),
        )
    }
}

impl Default for DataCutter {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for DataCutter {
    fn configure(&mut self, _params: &ParamNode) -> Result<(), ConfigError> {
        Ok(())
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }
}

impl Drop for DataCutter {
    fn drop(&mut self) {
        let (passed, failed) = self.counts();
        if passed + failed > 0 {
            tracing::info!("Cut routing: {} passed, {} failed", passed, failed);
        }
    }
}
