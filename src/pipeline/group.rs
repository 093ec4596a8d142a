//! Per-thread run loop for one thread group.
//!
//! Each group with a driver gets one OS thread. The thread runs the driver
//! (a [`Primary`](super::Primary) loop or a [`Consumer`](super::Consumer)
//! drain), catches panics, and reports a single [`GroupEvent`] back to the
//! toolbox over a crossbeam channel.

use anyhow::Context;
use crossbeam_channel::Sender;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::processor::{Processor, Produced, Role, RunContext};
use super::signal::SignalPort;

/// Longest pause after a source reports it has nothing to produce.
const MAX_IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// Live counters for one group, read by the toolbox for summaries.
#[derive(Debug, Default)]
pub struct GroupCounters {
    slices: AtomicU64,
    finished: AtomicBool,
}

impl GroupCounters {
    pub fn record_slice(&self) {
        self.slices.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slices(&self) -> u64 {
        self.slices.load(Ordering::Relaxed)
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// How a group's thread ended.
#[derive(Debug)]
pub enum GroupOutcome {
    Finished,
    Failed(anyhow::Error),
    Panicked(String),
}

/// Sent by a group thread exactly once, just before it exits.
#[derive(Debug)]
pub struct GroupEvent {
    pub group: String,
    pub outcome: GroupOutcome,
}

/// A driver processor together with everything its thread needs.
pub struct GroupRunner {
    name: String,
    driver_name: String,
    driver: Box<dyn Processor>,
    /// Signal a source's records are emitted through
    output: Option<SignalPort>,
    ctx: RunContext,
}

impl GroupRunner {
    pub fn new(
        name: impl Into<String>,
        driver_name: impl Into<String>,
        driver: Box<dyn Processor>,
        output: Option<SignalPort>,
        ctx: RunContext,
    ) -> Self {
        Self {
            name: name.into(),
            driver_name: driver_name.into(),
            driver,
            output,
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the driver on this thread until it finishes.
    pub fn run(self) -> anyhow::Result<()> {
        let Self {
            name,
            driver_name,
            mut driver,
            output,
            ctx,
        } = self;

        match driver.role() {
            Role::Source => {
                let output = output
                    .with_context(|| format!("source <{}> has no output signal", driver_name))?;
                let primary = driver
                    .as_primary()
                    .with_context(|| format!("<{}> is declared a source but is not primary", driver_name))?;
                let mut last_sequence: Option<u64> = None;

                loop {
                    if ctx.is_cancelled() {
                        tracing::debug!("Source <{}> stopping on cancellation", driver_name);
                        break;
                    }
                    match primary.produce_next(&ctx)? {
                        Produced::Data(handle) => {
                            let (sequence, last) = {
                                let data = handle.lock();
                                (data.sequence(), data.is_last())
                            };
                            if let Some(previous) = last_sequence {
                                if sequence <= previous {
                                    anyhow::bail!(
                                        "source <{}> produced sequence {} after {}",
                                        driver_name,
                                        sequence,
                                        previous
                                    );
                                }
                            }
                            last_sequence = Some(sequence);

                            tracing::trace!("Emitting slice {} on <{}>", sequence, output.name());
                            output.emit_any(&handle)?;
                            ctx.record_slice();

                            if last {
                                tracing::debug!("Source <{}> reached end of stream at slice {}", driver_name, sequence);
                                break;
                            }
                        }
                        Produced::Idle => thread::sleep(idle_backoff(&ctx)),
                        Produced::EndOfStream => {
                            tracing::debug!("Source <{}> reached end of stream", driver_name);
                            break;
                        }
                    }
                }
                Ok(())
            }
            Role::Consumer => {
                let consumer = driver
                    .as_consumer()
                    .with_context(|| format!("<{}> is declared a consumer but cannot drain", driver_name))?;
                consumer.drain(&ctx)
            }
            Role::Plain => {
                tracing::warn!("Group <{}> has no driver; nothing to run", name);
                Ok(())
            }
        }
    }

    /// Spawn the group's thread. The thread reports its outcome on `events`.
    pub fn spawn(
        self,
        counters: Arc<GroupCounters>,
        events: Sender<GroupEvent>,
    ) -> std::io::Result<JoinHandle<()>> {
        let group = self.name.clone();
        thread::Builder::new()
            .name(format!("group-{}", group))
            .spawn(move || {
                let span = tracing::info_span!("group", group = %group);
                let _enter = span.enter();
                tracing::info!("Thread started");

                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
                    Ok(Ok(())) => GroupOutcome::Finished,
                    Ok(Err(error)) => {
                        tracing::error!("Thread failed: {:#}", error);
                        GroupOutcome::Failed(error)
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::error!("Thread panicked: {}", message);
                        GroupOutcome::Panicked(message)
                    }
                };
                counters.mark_finished();
                tracing::info!("Thread stopped");
                // The toolbox may have stopped listening after a hang report.
                let _ = events.send(GroupEvent { group, outcome });
            })
    }
}

fn idle_backoff(ctx: &RunContext) -> Duration {
    ctx.queue_timeout().min(MAX_IDLE_BACKOFF)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
