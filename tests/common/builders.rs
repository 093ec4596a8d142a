//! Test processors and builders

use parking_lot::Mutex;
use sliceflow::config::{ConfigError, ParamNode};
use sliceflow::pipeline::{
    Ports, Primary, Processor, Produced, Role, RunContext, Signal, Slot,
};
use sliceflow::record::{Data, DataHandle};
use std::sync::Arc;
use std::time::Duration;

/// One record as observed by a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub sequence: u64,
    pub last: bool,
    pub thread: Option<String>,
}

pub type SeenLog = Arc<Mutex<Vec<Seen>>>;

/// What a [`CountingSource`] does at a given sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Error,
    Panic,
}

/// Primary producing `1..=n`, the last one marked end-of-stream
pub struct CountingSource {
    ports: Ports,
    _output: Signal<DataHandle>,
    n: u64,
    next: u64,
    fault: Option<(u64, Fault)>,
    mark_last: bool,
    interval: Duration,
}

impl CountingSource {
    pub fn new(n: u64) -> Self {
        let mut ports = Ports::new();
        let output = ports.signal::<DataHandle>("data");
        Self {
            ports,
            _output: output,
            n,
            next: 1,
            fault: None,
            mark_last: true,
            interval: Duration::ZERO,
        }
    }

    /// Fail when about to produce `sequence`
    pub fn fault_at(mut self, sequence: u64, fault: Fault) -> Self {
        self.fault = Some((sequence, fault));
        self
    }

    /// End with `EndOfStream` instead of a marked final record
    pub fn without_last_marker(mut self) -> Self {
        self.mark_last = false;
        self
    }

    /// Sleep `interval` before each record
    pub fn paced(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Unbounded source paced by `interval`; only cancellation stops it
    pub fn endless(interval: Duration) -> Self {
        let mut source = Self::new(u64::MAX);
        source.mark_last = false;
        source.interval = interval;
        source
    }

    pub fn boxed(self) -> Box<dyn Processor> {
        Box::new(self)
    }
}

impl Processor for CountingSource {
    fn configure(&mut self, _params: &ParamNode) -> Result<(), ConfigError> {
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

impl Primary for CountingSource {
    fn produce_next(&mut self, _ctx: &RunContext) -> anyhow::Result<Produced> {
        if self.next > self.n {
            return Ok(Produced::EndOfStream);
        }
        match self.fault {
            Some((at, Fault::Error)) if at == self.next => {
                anyhow::bail!("source failed at slice {}", at)
            }
            Some((at, Fault::Panic)) if at == self.next => panic!("source panicked at slice {}", at),
            _ => {}
        }
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }

        let mut data = Data::new(self.next);
        if self.mark_last && self.next == self.n {
            data.mark_last();
        }
        self.next += 1;
        Ok(Produced::Data(DataHandle::new(data)))
    }
}

/// Source that ignores cancellation and blocks for `stall` on every call
pub struct StuckSource {
    ports: Ports,
    _output: Signal<DataHandle>,
    stall: Duration,
}

impl StuckSource {
    pub fn new(stall: Duration) -> Self {
        let mut ports = Ports::new();
        let output = ports.signal::<DataHandle>("data");
        Self {
            ports,
            _output: output,
            stall,
        }
    }
}

impl Processor for StuckSource {
    fn configure(&mut self, _params: &ParamNode) -> Result<(), ConfigError> {
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

impl Primary for StuckSource {
    fn produce_next(&mut self, _ctx: &RunContext) -> anyhow::Result<Produced> {
        std::thread::sleep(self.stall);
        Ok(Produced::Idle)
    }
}

type Hook = Arc<dyn Fn(&DataHandle) -> anyhow::Result<()> + Send + Sync>;

/// Plain processor recording every record arriving on its `data` slot
pub struct RecordingSink {
    ports: Ports,
    log: SeenLog,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::with_hook(Arc::new(|_| Ok(())))
    }

    /// Run `hook` after recording each record; its error fails the slot
    pub fn with_hook(hook: Hook) -> Self {
        let mut ports = Ports::new();
        let log: SeenLog = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        ports.slot(Slot::new::<DataHandle, _>("data", move |handle| {
            let (sequence, last) = {
                let data = handle.lock();
                (data.sequence(), data.is_last())
            };
            sink.lock().push(Seen {
                sequence,
                last,
                thread: std::thread::current().name().map(str::to_string),
            });
            hook(handle)
        }));
        Self { ports, log }
    }

    pub fn log(&self) -> SeenLog {
        self.log.clone()
    }

    pub fn boxed(self) -> Box<dyn Processor> {
        Box::new(self)
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for RecordingSink {
    fn configure(&mut self, _params: &ParamNode) -> Result<(), ConfigError> {
        Ok(())
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }
}

/// Processor with a slot of the wrong argument type for record signals
pub struct TextSink {
    ports: Ports,
    calls: Arc<Mutex<usize>>,
}

impl TextSink {
    pub fn new() -> Self {
        let mut ports = Ports::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        ports.slot(Slot::new::<String, _>("text", move |_| {
            *counter.lock() += 1;
            Ok(())
        }));
        Self { ports, calls }
    }

    pub fn calls(&self) -> Arc<Mutex<usize>> {
        self.calls.clone()
    }
}

impl Processor for TextSink {
    fn configure(&mut self, _params: &ParamNode) -> Result<(), ConfigError> {
        Ok(())
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }
}

/// Sequence numbers in a log
pub fn sequences(log: &SeenLog) -> Vec<u64> {
    log.lock().iter().map(|seen| seen.sequence).collect()
}

/// Sequence numbers flagged end-of-stream in a log
pub fn last_markers(log: &SeenLog) -> Vec<u64> {
    log.lock()
        .iter()
        .filter(|seen| seen.last)
        .map(|seen| seen.sequence)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sliceflow::pipeline::{CancelToken, GroupCounters};

    #[test]
    fn test_counting_source() {
        let mut source = CountingSource::new(2);
        let ctx = RunContext::new(
            "g",
            CancelToken::new(),
            Duration::from_millis(1),
            Arc::new(GroupCounters::default()),
        );
        let mut seen = Vec::new();
        while let Produced::Data(handle) = source.produce_next(&ctx).unwrap() {
            seen.push((handle.sequence(), handle.is_last()));
        }
        assert_eq!(seen, vec![(1, false), (2, true)]);
    }
}
