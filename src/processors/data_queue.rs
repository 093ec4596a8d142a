//! `data-queue`: hands records from one thread group to another.
//!
//! The `data` slot is queueing: it runs on the producer's thread and pushes the
//! shared record handle onto a [`ConcurrentQueue`]. The processor drives its
//! own thread group as a [`Consumer`], popping records and re-emitting them on
//! its `data` signal. When draining ends it emits `queue-done` once.
//!
//! Pushing into a queue that was already closed fails the pushing slot, which
//! aborts the run rather than losing the record. With `stop_on_last`, the
//! consumer stops once it has seen one end-of-stream record per source feeding
//! it; otherwise it runs until the toolbox closes the queue.
//!
//! Parameters:
//!
//! | key | default | meaning |
//! |---|---|---|
//! | `timeout_ms` | run `queue_timeout_ms` | wait per timed pop |
//! | `capacity` | `0` | queue bound, `0` = unbounded |
//! | `pop_mode` | `timed` | `timed`, `blocking` or `single` |
//! | `stop_on_last` | `true` | stop after the last source's end-of-stream record |

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigError, ParamNode};
use crate::pipeline::{Consumer, Ports, Processor, Role, RunContext, Signal, Slot};
use crate::queue::{ConcurrentQueue, PopError, PushError, QueueControl};
use crate::record::DataHandle;

pub const TYPE_KEY: &str = "data-queue";

/// Back-off between polls in `single` mode.
const SINGLE_POP_BACKOFF: Duration = Duration::from_millis(1);

/// How the consumer waits for the next record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopMode {
    /// Wait up to the timeout, then check for cancellation and retry
    #[default]
    Timed,
    /// Wait until an item arrives or the queue is stopped
    Blocking,
    /// Poll without waiting
    Single,
}

type SharedQueue = Arc<RwLock<Arc<ConcurrentQueue<DataHandle>>>>;

pub struct DataQueue {
    ports: Ports,
    output: Signal<DataHandle>,
    done: Signal<()>,
    queue: SharedQueue,
    mode: Arc<Mutex<PopMode>>,
    timeout: Option<Duration>,
    stop_on_last: bool,
}

impl DataQueue {
    pub fn new() -> Self {
        let mut ports = Ports::new();
        let queue: SharedQueue = Arc::new(RwLock::new(Arc::new(ConcurrentQueue::unbounded())));
        let mode = Arc::new(Mutex::new(PopMode::default()));

        let output = ports.signal::<DataHandle>("data");
        let done = ports.signal::<()>("queue-done");

        let inbox = queue.clone();
        ports.slot(
            Slot::new::<DataHandle, _>("data", move |handle| {
                let queue = inbox.read().clone();
                match queue.push(handle.clone()) {
                    Ok(()) => {
                        tracing::trace!("Queued slice {} ({} waiting)", handle.sequence(), queue.len());
                        Ok(())
                    }
                    Err(PushError::Cancelled) => {
                        tracing::trace!("Queue cancelled; dropping slice");
                        Ok(())
                    }
                    Err(PushError::Closed) => {
                        anyhow::bail!("queue closed before slice {} was pushed", handle.sequence())
                    }
                }
            })
            .queueing(),
        );

        for (slot, target) in [
            ("use-timed-pop", PopMode::Timed),
            ("use-untimed-pop", PopMode::Blocking),
            ("use-single-pop", PopMode::Single),
        ] {
            let mode = mode.clone();
            ports.slot(Slot::unit(slot, move || {
                *mode.lock() = target;
                tracing::debug!("Pop mode switched to {:?}", target);
                Ok(())
            }));
        }

        Self {
            ports,
            output,
            done,
            queue,
            mode,
            timeout: None,
            stop_on_last: true,
        }
    }

    pub fn pop_mode(&self) -> PopMode {
        *self.mode.lock()
    }

    pub fn queue(&self) -> Arc<ConcurrentQueue<DataHandle>> {
        self.queue.read().clone()
    }

    fn pop(&self, queue: &ConcurrentQueue<DataHandle>, timeout: Duration) -> Result<Option<DataHandle>, PopError> {
        let mode = *self.mode.lock();
        match mode {
            PopMode::Timed => match queue.pop_timed(timeout) {
                Ok(handle) => Ok(Some(handle)),
                Err(PopError::TimedOut) => Ok(None),
                Err(e) => Err(e),
            },
            PopMode::Blocking => queue.pop_blocking().map(Some),
            PopMode::Single => {
                let popped = queue.try_pop()?;
                if popped.is_none() {
                    std::thread::sleep(SINGLE_POP_BACKOFF);
                }
                Ok(popped)
            }
        }
    }
}

impl Default for DataQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for DataQueue {
    fn configure(&mut self, params: &ParamNode) -> Result<(), ConfigError> {
        if let Some(ms) = params.get::<u64>("timeout_ms")? {
            if ms == 0 {
                return Err(params.invalid("timeout_ms", "must be greater than zero"));
            }
            self.timeout = Some(Duration::from_millis(ms));
        }
        let capacity: usize = params.get_or("capacity", 0)?;
        if capacity > 0 {
            *self.queue.write() = Arc::new(ConcurrentQueue::bounded(capacity));
        }
        if let Some(mode) = params.get::<PopMode>("pop_mode")? {
            *self.mode.lock() = mode;
        }
        self.stop_on_last = params.get_or("stop_on_last", true)?;
        Ok(())
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }

    fn role(&self) -> Role {
        Role::Consumer
    }

    fn as_consumer(&mut self) -> Option<&mut dyn Consumer> {
        Some(self)
    }

    fn queue_control(&self) -> Option<Arc<dyn QueueControl>> {
        Some(self.queue() as Arc<dyn QueueControl>)
    }
}

impl Consumer for DataQueue {
    fn drain(&mut self, ctx: &RunContext) -> anyhow::Result<()> {
        let queue = self.queue();
        let timeout = self.timeout.unwrap_or_else(|| ctx.queue_timeout());
        let expected_markers = ctx.upstream_sources().max(1);
        let mut markers = 0;
        tracing::debug!(
            "Draining queue ({:?}, timeout {:?}, {} upstream sources)",
            self.pop_mode(),
            timeout,
            expected_markers
        );

        loop {
            let handle = match self.pop(&queue, timeout) {
                Ok(Some(handle)) => handle,
                Ok(None) => {
                    if ctx.is_cancelled() {
                        break;
                    }
                    continue;
                }
                Err(PopError::Cancelled) => {
                    tracing::debug!("Queue cancelled");
                    break;
                }
                Err(PopError::Closed) => {
                    tracing::debug!("Queue closed and drained");
                    break;
                }
                Err(PopError::TimedOut) => continue,
            };

            let (sequence, last) = {
                let data = handle.lock();
                (data.sequence(), data.is_last())
            };
            self.output
                .emit(&handle)
                .with_context(|| format!("re-emitting slice {}", sequence))?;
            ctx.record_slice();

            if last && self.stop_on_last {
                markers += 1;
                if markers >= expected_markers {
                    tracing::debug!("End-of-stream record {} reached", sequence);
                    break;
                }
                tracing::debug!(
                    "End-of-stream record {} ({} of {} sources finished)",
                    sequence,
                    markers,
                    expected_markers
                );
            }
        }

        // Later pushes are dropped instead of piling up.
        queue.close();
        let (pushed, popped) = queue.counters();
        tracing::info!("Queue finished: {} pushed, {} popped", pushed, popped);
        self.done.emit(&())
    }
}
