//! The processor contract.
//!
//! Every pipeline stage implements [`Processor`]: it is built by the registry,
//! configured once from its parameter subtree, and exposes named signals and
//! slots through its [`Ports`]. Two optional capabilities make a processor a
//! thread-group driver:
//!
//! - [`Primary`]: a source whose `produce_next` is called in a loop by its group.
//! - [`Consumer`]: drains an inbound queue on its own thread.
//!
//! All other processors are passive; their slots run on whichever thread emits
//! the connected signal.

use std::sync::Arc;
use std::time::Duration;

use super::cancel::CancelToken;
use super::port::Ports;
use super::group::GroupCounters;
use crate::config::{ConfigError, ParamNode};
use crate::queue::QueueControl;
use crate::record::DataHandle;

/// Default name of the signal a primary's records are emitted through.
pub const DEFAULT_OUTPUT_SIGNAL: &str = "data";

/// What drives a processor's thread group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Passive; runs only when its slots are invoked
    Plain,
    /// Produces records (implements [`Primary`])
    Source,
    /// Drains a queue (implements [`Consumer`])
    Consumer,
}

impl Role {
    pub fn is_driver(&self) -> bool {
        !matches!(self, Role::Plain)
    }
}

/// Result of one `produce_next` call.
#[derive(Debug)]
pub enum Produced {
    /// A new record to emit. If it is marked last, the group stops after it.
    Data(DataHandle),
    /// Nothing this time; the group checks for cancellation and calls again.
    Idle,
    /// The stream ended without a final record.
    EndOfStream,
}

/// Per-thread state handed to drivers while running.
#[derive(Debug, Clone)]
pub struct RunContext {
    group: String,
    cancel: CancelToken,
    queue_timeout: Duration,
    counters: Arc<GroupCounters>,
    upstream_sources: usize,
}

impl RunContext {
    pub fn new(
        group: impl Into<String>,
        cancel: CancelToken,
        queue_timeout: Duration,
        counters: Arc<GroupCounters>,
    ) -> Self {
        Self {
            group: group.into(),
            cancel,
            queue_timeout,
            counters,
            upstream_sources: 1,
        }
    }

    /// Set how many source groups feed this group through queues.
    pub fn with_upstream_sources(mut self, count: usize) -> Self {
        self.upstream_sources = count;
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Poll interval for timed queue pops.
    pub fn queue_timeout(&self) -> Duration {
        self.queue_timeout
    }

    /// Source groups whose records reach this group, i.e. how many
    /// end-of-stream records a consumer can expect.
    pub fn upstream_sources(&self) -> usize {
        self.upstream_sources
    }

    /// Count one slice driven through this group.
    pub fn record_slice(&self) {
        self.counters.record_slice();
    }
}

/// A pipeline stage.
pub trait Processor: Send {
    /// Apply the processor's parameter subtree. Called once, before wiring.
    fn configure(&mut self, params: &ParamNode) -> Result<(), ConfigError>;

    /// Named signals and slots.
    fn ports(&self) -> &Ports;

    fn role(&self) -> Role {
        Role::Plain
    }

    fn as_primary(&mut self) -> Option<&mut dyn Primary> {
        None
    }

    fn as_consumer(&mut self) -> Option<&mut dyn Consumer> {
        None
    }

    /// Receive the run's cancellation token before the run starts.
    fn set_cancel_token(&mut self, _token: CancelToken) {}

    /// Queue owned by this processor, to be stopped by the toolbox.
    fn queue_control(&self) -> Option<Arc<dyn QueueControl>> {
        None
    }
}

/// A source that drives its thread group.
pub trait Primary {
    /// Produce the next record, or report that the stream ended.
    fn produce_next(&mut self, ctx: &RunContext) -> anyhow::Result<Produced>;

    /// Signal that records are emitted through.
    fn output_signal(&self) -> &str {
        DEFAULT_OUTPUT_SIGNAL
    }
}

/// A driver that drains an inbound queue until it is closed or cancelled.
pub trait Consumer {
    fn drain(&mut self, ctx: &RunContext) -> anyhow::Result<()>;
}
