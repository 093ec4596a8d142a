//! `slice-source`: a primary producing empty records numbered `1..=n_slices`.
//!
//! The final record is marked end-of-stream. `interval_ms` paces production;
//! the wait is interrupted by cancellation.

use std::time::{Duration, Instant};

use crate::config::{ConfigError, ParamNode};
use crate::pipeline::{Ports, Primary, Processor, Produced, Role, RunContext, Signal};
use crate::record::{Data, DataHandle};

pub const TYPE_KEY: &str = "slice-source";

pub const DEFAULT_N_SLICES: u64 = 10;

/// Granularity of the cancellable pacing sleep.
const PACING_STEP: Duration = Duration::from_millis(5);

pub struct SliceSource {
    ports: Ports,
    // Held so the signal stays typed; emission goes through the group runner.
    _output: Signal<DataHandle>,
    n_slices: u64,
    interval: Duration,
    produced: u64,
    last_emit: Option<Instant>,
}

impl SliceSource {
    pub fn new() -> Self {
        let mut ports = Ports::new();
        let output = ports.signal::<DataHandle>("data");
        Self {
            ports,
            _output: output,
            n_slices: DEFAULT_N_SLICES,
            interval: Duration::ZERO,
            produced: 0,
            last_emit: None,
        }
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Sleep until the next slice is due. Returns `false` if cancelled meanwhile.
    fn pace(&self, ctx: &RunContext) -> bool {
        let Some(previous) = self.last_emit else {
            return true;
        };
        let due = previous + self.interval;
        loop {
            if ctx.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= due {
                return true;
            }
            std::thread::sleep((due - now).min(PACING_STEP));
        }
    }
}

impl Default for SliceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for SliceSource {
    fn configure(&mut self, params: &ParamNode) -> Result<(), ConfigError> {
        self.n_slices = params.get_or("n_slices", DEFAULT_N_SLICES)?;
        self.interval = Duration::from_millis(params.get_or("interval_ms", 0u64)?);
        Ok(())
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }

    fn role(&self) -> Role {
        Role::Source
    }

    fn as_primary(&mut self) -> Option<&mut dyn Primary> {
        Some(self)
    }
}

impl Primary for SliceSource {
    fn produce_next(&mut self, ctx: &RunContext) -> anyhow::Result<Produced> {
        if self.produced >= self.n_slices {
            return Ok(Produced::EndOfStream);
        }
        if !self.interval.is_zero() && !self.pace(ctx) {
            return Ok(Produced::Idle);
        }

        self.produced += 1;
        self.last_emit = Some(Instant::now());
        let mut data = Data::new(self.produced);
        if self.produced == self.n_slices {
            data.mark_last();
        }
        Ok(Produced::Data(DataHandle::new(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CancelToken, GroupCounters};
    use std::sync::Arc;

    fn context(token: CancelToken) -> RunContext {
        RunContext::new("source", token, Duration::from_millis(10), Arc::new(GroupCounters::default()))
    }

    #[test]
    fn test_produces_numbered_slices_then_end() {
        let mut source = SliceSource::new();
        source
            .configure(&ParamNode::from_toml_str("config.source", "n_slices = 3").unwrap())
            .unwrap();
        let ctx = context(CancelToken::new());

        let mut seen = Vec::new();
        loop {
            match source.produce_next(&ctx).unwrap() {
                Produced::Data(handle) => seen.push((handle.sequence(), handle.is_last())),
                Produced::Idle => continue,
                Produced::EndOfStream => break,
            }
        }
        assert_eq!(seen, vec![(1, false), (2, false), (3, true)]);
    }

    #[test]
    fn test_zero_slices_ends_immediately() {
        let mut source = SliceSource::new();
        source
            .configure(&ParamNode::from_toml_str("config.source", "n_slices = 0").unwrap())
            .unwrap();
        assert!(matches!(
            source.produce_next(&context(CancelToken::new())).unwrap(),
            Produced::EndOfStream
        ));
    }

    #[test]
    fn test_pacing_interrupted_by_cancel() {
        let mut source = SliceSource::new();
        source
            .configure(
                &ParamNode::from_toml_str("config.source", "n_slices = 5\ninterval_ms = 60000").unwrap(),
            )
            .unwrap();
        let token = CancelToken::new();
        let ctx = context(token.clone());
        assert!(matches!(source.produce_next(&ctx).unwrap(), Produced::Data(_)));

        token.cancel();
        let started = Instant::now();
        assert!(matches!(source.produce_next(&ctx).unwrap(), Produced::Idle));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(source.produced(), 1);
    }

    #[test]
    fn test_wrong_type_parameter() {
        let mut source = SliceSource::new();
        let params = ParamNode::from_toml_str("config.source", "n_slices = \"many\"").unwrap();
        assert!(source.configure(&params).is_err());
    }
}
