//! Processor graph runtime.
//!
//! Processors are wired at run time by name: each exposes typed signals and
//! slots, and configuration connects `processor:signal` to `processor:slot`.
//! The toolbox partitions the graph into thread groups and runs one OS thread
//! per group that has a driver.
//!
//! # Architecture
//!
//! ```text
//! [slice-source] ──data──► [apply-cut] ──pass──► [profiler]
//!        │                                    (same thread group)
//!        └──data──► [data-queue] ═══queue═══► [slow-sink]
//!                      (consumer thread group)
//! ```
//!
//! # Design
//!
//! - **Synchronous dispatch**: emitting a signal calls each connected slot on
//!   the emitting thread, in dispatch order.
//! - **Queues at thread boundaries**: a queueing slot hands the record to a
//!   consumer that drains it on its own thread.
//! - **Type-checked wiring**: signal and slot argument types are compared by
//!   `TypeId` when connecting; signals are sealed before running.
//! - **Upstream-first shutdown**: a hand-off queue is closed only after every
//!   thread group feeding it has exited, so records in flight reach the end of
//!   a chain of queues.
//! - **Cooperative abort**: one [`CancelToken`] cancels every registered queue
//!   and is polled by drivers.

pub mod cancel;
pub mod error;
pub mod group;
pub mod planner;
pub mod port;
pub mod processor;
pub mod signal;
pub mod slot;
pub mod toolbox;

pub use cancel::CancelToken;
pub use error::{PipelineError, PipelineResult};
pub use group::{GroupCounters, GroupEvent, GroupOutcome, GroupRunner};
pub use planner::{GroupPlan, PlanEdge, PlanNode, Planner, ThreadPlan};
pub use port::{PortDescriptor, PortDirection, Ports};
pub use processor::{Consumer, Primary, Processor, Produced, Role, RunContext, DEFAULT_OUTPUT_SIGNAL};
pub use signal::{slot_fn, Signal, SignalError, SignalPort, Signature};
pub use slot::{Slot, SlotRef};
pub use toolbox::{parse_address, Toolbox, ToolboxState, SUMMARY_SIGNAL, TOOLBOX_ADDRESS};
