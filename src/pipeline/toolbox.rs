//! The toolbox: builds, wires, runs and shuts down a processor graph.
//!
//! # State machine
//!
//! ```text
//! Unconfigured ──configure()──► Wired ──run()──► Running ──► Completed
//!                                                        └──► Aborted
//! ```
//!
//! - `configure` instantiates processors through the registry, applies their
//!   parameters, installs every signal→slot connection, partitions the graph
//!   into thread groups and seals all signals.
//! - `run` spawns one thread per group that has a driver and supervises them.
//!   A consumer's queue is closed once every group feeding it has exited, so
//!   the consumer delivers what is queued and exits in turn. Closing therefore
//!   ripples down a chain of queues. Any group error, panic, or an external
//!   cancel aborts the run: queues are cancelled and threads get a grace
//!   period to exit, after which the stragglers are reported as hung.
//!
//! While running, the toolbox emits a [`RunSummary`] on its own `summary`
//! signal, addressable in configuration as `toolbox:summary`.

use crossbeam_channel::RecvTimeoutError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::cancel::CancelToken;
use super::error::{PipelineError, PipelineResult};
use super::group::{GroupCounters, GroupEvent, GroupOutcome, GroupRunner};
use super::planner::{PlanEdge, PlanNode, Planner, ThreadPlan};
use super::processor::{Processor, Role, RunContext};
use super::signal::{Signal, SignalPort, Signature};
use super::slot::SlotRef;
use crate::config::{ConnectionDecl, ParamNode, RunSettings, ToolboxConfig};
use crate::queue::QueueControl;
use crate::record::DataHandle;
use crate::registry::{ProcessorRegistry, RegistryError};
use crate::types::{AbortReason, GroupStats, RunStatus, RunSummary};

/// Processor name under which the toolbox's own signals are addressed.
pub const TOOLBOX_ADDRESS: &str = "toolbox";

/// Name of the periodic summary signal.
pub const SUMMARY_SIGNAL: &str = "summary";

/// Separator between processor and port in connection addresses.
pub const ADDRESS_SEPARATOR: char = ':';

/// Upper bound on how long the supervisor sleeps between checks.
const SUPERVISOR_TICK: Duration = Duration::from_millis(20);

/// Lifecycle state of a [`Toolbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolboxState {
    Unconfigured,
    Wired,
    Running,
    Completed,
    Aborted,
}

struct ProcessorEntry {
    name: String,
    type_key: String,
    role: Role,
    /// Taken by the group thread when the processor is a driver
    processor: Option<Box<dyn Processor>>,
    /// Output signal of a source, resolved while wiring
    output: Option<SignalPort>,
}

/// Split `processor:port`.
pub fn parse_address(address: &str) -> PipelineResult<(&str, &str)> {
    match address.split_once(ADDRESS_SEPARATOR) {
        Some((processor, port))
            if !processor.is_empty() && !port.is_empty() && !port.contains(ADDRESS_SEPARATOR) =>
        {
            Ok((processor.trim(), port.trim()))
        }
        _ => Err(PipelineError::BadAddress(address.to_string())),
    }
}

/// Scheduler for one processor graph.
pub struct Toolbox {
    registry: Arc<ProcessorRegistry>,
    state: ToolboxState,
    settings: RunSettings,
    entries: Vec<ProcessorEntry>,
    plan: ThreadPlan,
    token: CancelToken,
    summary: Signal<RunSummary>,
    status: Option<RunStatus>,
}

impl Toolbox {
    pub fn new(registry: Arc<ProcessorRegistry>) -> Self {
        Self {
            registry,
            state: ToolboxState::Unconfigured,
            settings: RunSettings::default(),
            entries: Vec::new(),
            plan: ThreadPlan::default(),
            token: CancelToken::new(),
            summary: Signal::new(SUMMARY_SIGNAL),
            status: None,
        }
    }

    /// Build and wire a toolbox in one step.
    pub fn from_config(
        registry: Arc<ProcessorRegistry>,
        config: &ToolboxConfig,
    ) -> PipelineResult<Self> {
        let mut toolbox = Self::new(registry);
        toolbox.configure(config)?;
        Ok(toolbox)
    }

    pub fn state(&self) -> ToolboxState {
        self.state
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn plan(&self) -> &ThreadPlan {
        &self.plan
    }

    /// Handle for requesting cancellation from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn summary_signal(&self) -> &Signal<RunSummary> {
        &self.summary
    }

    /// Terminal status, once `run` has returned.
    pub fn status(&self) -> Option<&RunStatus> {
        self.status.as_ref()
    }

    /// Instance names in declaration order.
    pub fn processor_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    fn expect_state(&self, expected: ToolboxState) -> PipelineResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    // ── Setup ──

    /// Add an already-built processor. Only valid before `configure`.
    pub fn add_processor(
        &mut self,
        name: impl Into<String>,
        type_key: impl Into<String>,
        processor: Box<dyn Processor>,
    ) -> PipelineResult<()> {
        self.expect_state(ToolboxState::Unconfigured)?;
        let name = name.into();
        if name == TOOLBOX_ADDRESS || self.index_of(&name).is_some() {
            return Err(PipelineError::DuplicateProcessor(name));
        }
        let role = processor.role();
        tracing::debug!(processor = %name, "Added processor ({:?})", role);
        self.entries.push(ProcessorEntry {
            name,
            type_key: type_key.into(),
            role,
            processor: Some(processor),
            output: None,
        });
        Ok(())
    }

    /// Unconfigured → Wired.
    pub fn configure(&mut self, config: &ToolboxConfig) -> PipelineResult<()> {
        self.expect_state(ToolboxState::Unconfigured)?;
        self.settings = config.run.clone();

        tracing::info!("Creating {} processors", config.processors.len());
        for decl in &config.processors {
            let name = decl.instance_name();
            let processor = self.registry.create(&decl.type_key).map_err(|e| match e {
                RegistryError::UnknownKey { .. } => PipelineError::UnknownProcessorType {
                    name: name.to_string(),
                    type_key: decl.type_key.clone(),
                },
                other => other.into(),
            })?;
            self.add_processor(name, decl.type_key.clone(), processor)?;
        }

        self.configure_processors(config)?;
        let edges = self.wire(&config.connections)?;

        let nodes: Vec<PlanNode> = self
            .entries
            .iter()
            .map(|e| PlanNode {
                name: e.name.clone(),
                role: e.role,
            })
            .collect();
        self.plan = Planner::plan(&nodes, &edges, &config.threads)?;

        self.resolve_outputs()?;

        for entry in &self.entries {
            if let Some(processor) = &entry.processor {
                processor.ports().seal();
            }
        }
        self.summary.port().seal();

        self.state = ToolboxState::Wired;
        tracing::info!(
            "Toolbox wired: {} processors, {} connections, {} thread groups",
            self.entries.len(),
            config.connections.len(),
            self.plan.active_groups().count()
        );
        Ok(())
    }

    fn configure_processors(&mut self, config: &ToolboxConfig) -> PipelineResult<()> {
        for entry in &mut self.entries {
            let Some(processor) = entry.processor.as_mut() else {
                continue;
            };
            let params = match config.params_for(&entry.name, &entry.type_key) {
                Some(params) => params,
                None => {
                    tracing::warn!(
                        processor = %entry.name,
                        "No configuration found under config.{} or config.{}; using defaults",
                        entry.name,
                        entry.type_key
                    );
                    ParamNode::empty(format!("config.{}", entry.name))
                }
            };
            processor
                .configure(&params)
                .map_err(|source| PipelineError::Config {
                    processor: entry.name.clone(),
                    source,
                })?;
            processor.set_cancel_token(self.token.clone());
            if let Some(queue) = processor.queue_control() {
                self.token.register_queue(queue);
            }
            tracing::debug!(processor = %entry.name, "Configured from {}", params.path());
        }
        Ok(())
    }

    fn find_signal(&self, processor: &str, port: &str) -> PipelineResult<(Option<usize>, SignalPort)> {
        if processor == TOOLBOX_ADDRESS {
            if port == SUMMARY_SIGNAL {
                return Ok((None, self.summary.port()));
            }
            return Err(PipelineError::UnknownSignalOrSlot {
                processor: processor.to_string(),
                port: port.to_string(),
                kind: "signal",
            });
        }
        let index = self
            .index_of(processor)
            .ok_or_else(|| PipelineError::UnknownProcessor(processor.to_string()))?;
        let signal = self.entries[index]
            .processor
            .as_ref()
            .and_then(|p| p.ports().find_signal(port))
            .cloned()
            .ok_or_else(|| PipelineError::UnknownSignalOrSlot {
                processor: processor.to_string(),
                port: port.to_string(),
                kind: "signal",
            })?;
        Ok((Some(index), signal))
    }

    fn find_slot(&self, processor: &str, port: &str) -> PipelineResult<(usize, SlotRef)> {
        let index = self
            .index_of(processor)
            .ok_or_else(|| PipelineError::UnknownProcessor(processor.to_string()))?;
        let slot = self.entries[index]
            .processor
            .as_ref()
            .and_then(|p| p.ports().find_slot(port))
            .cloned()
            .ok_or_else(|| PipelineError::UnknownSignalOrSlot {
                processor: processor.to_string(),
                port: port.to_string(),
                kind: "slot",
            })?;
        Ok((index, slot))
    }

    fn wire(&self, connections: &[ConnectionDecl]) -> PipelineResult<Vec<PlanEdge>> {
        let mut edges = Vec::with_capacity(connections.len());
        for connection in connections {
            let (signal_proc, signal_name) = parse_address(&connection.signal)?;
            let (slot_proc, slot_name) = parse_address(&connection.slot)?;

            let (from, signal) = self.find_signal(signal_proc, signal_name)?;
            let (to, slot) = self.find_slot(slot_proc, slot_name)?;
            let queueing = slot.is_queueing();

            signal.connect(slot, connection.order)?;
            tracing::info!(
                "Connected {} → {}{}",
                connection.signal,
                connection.slot,
                if queueing { " (queued)" } else { "" }
            );

            if let Some(from) = from {
                edges.push(PlanEdge { from, to, queueing });
            }
        }
        Ok(edges)
    }

    /// Look up each source's output signal and check it carries records.
    fn resolve_outputs(&mut self) -> PipelineResult<()> {
        let expected = Signature::of::<DataHandle>();
        for entry in &mut self.entries {
            if entry.role != Role::Source {
                continue;
            }
            let Some(processor) = entry.processor.as_mut() else {
                continue;
            };
            let signal_name = match processor.as_primary() {
                Some(primary) => primary.output_signal().to_string(),
                None => {
                    return Err(PipelineError::Processor {
                        processor: entry.name.clone(),
                        source: anyhow::anyhow!("declares the source role but is not a primary"),
                    })
                }
            };
            let output = processor
                .ports()
                .find_signal(&signal_name)
                .cloned()
                .ok_or_else(|| PipelineError::UnknownSignalOrSlot {
                    processor: entry.name.clone(),
                    port: signal_name.clone(),
                    kind: "signal",
                })?;
            if output.signature() != expected {
                return Err(PipelineError::Processor {
                    processor: entry.name.clone(),
                    source: anyhow::anyhow!(
                        "output signal <{}> carries {} instead of records",
                        signal_name,
                        output.signature()
                    ),
                });
            }
            entry.output = Some(output);
        }
        Ok(())
    }

    // ── Running ──

    /// Wired → Running → Completed | Aborted. Blocks until the run ends.
    pub fn run(&mut self) -> PipelineResult<RunStatus> {
        self.expect_state(ToolboxState::Wired)?;
        self.state = ToolboxState::Running;
        tracing::info!("Toolbox running");

        let (events_tx, events_rx) = crossbeam_channel::unbounded::<GroupEvent>();
        let mut counters: Vec<(String, Option<String>, Arc<GroupCounters>)> = Vec::new();
        let mut handles: BTreeMap<String, JoinHandle<()>> = BTreeMap::new();
        let mut source_groups: BTreeSet<String> = BTreeSet::new();
        let mut queues: BTreeMap<String, Arc<dyn QueueControl>> = BTreeMap::new();

        let groups = self.plan.groups.clone();
        for group in &groups {
            let Some(driver) = group.driver else {
                counters.push((group.name.clone(), None, Arc::new(GroupCounters::default())));
                continue;
            };
            let entry = &mut self.entries[driver];
            let Some(processor) = entry.processor.take() else {
                continue;
            };
            if entry.role == Role::Source {
                source_groups.insert(group.name.clone());
            }
            if let Some(queue) = processor.queue_control() {
                queues.insert(group.name.clone(), queue);
            }

            let group_counters = Arc::new(GroupCounters::default());
            counters.push((group.name.clone(), Some(entry.name.clone()), group_counters.clone()));
            let ctx = RunContext::new(
                group.name.clone(),
                self.token.clone(),
                self.settings.queue_timeout(),
                group_counters.clone(),
            )
            .with_upstream_sources(self.plan.upstream_sources(&group.name));
            let runner = GroupRunner::new(
                group.name.clone(),
                entry.name.clone(),
                processor,
                entry.output.clone(),
                ctx,
            );
            match runner.spawn(group_counters.clone(), events_tx.clone()) {
                Ok(handle) => {
                    handles.insert(group.name.clone(), handle);
                }
                Err(e) => {
                    let error = PipelineError::Spawn {
                        group: group.name.clone(),
                        source: e,
                    };
                    tracing::error!("{}", error);
                    group_counters.mark_finished();
                    self.token.abort(AbortReason::GroupFailed {
                        group: group.name.clone(),
                        error: error.to_string(),
                    });
                    break;
                }
            }
        }
        drop(events_tx);

        let supervisor = Supervisor {
            token: &self.token,
            summary: &self.summary,
            settings: &self.settings,
            counters: &counters,
            plan: &self.plan,
            source_groups,
        };
        let status = supervisor.supervise(events_rx, handles, queues);

        self.state = match status {
            RunStatus::Completed => ToolboxState::Completed,
            RunStatus::Aborted(_) => ToolboxState::Aborted,
        };
        match &status {
            RunStatus::Completed => tracing::info!("Toolbox completed"),
            RunStatus::Aborted(reason) => tracing::error!("Toolbox aborted: {}", reason),
        }
        self.status = Some(status.clone());
        Ok(status)
    }
}

/// Borrowed view of the toolbox used while threads are running.
struct Supervisor<'a> {
    token: &'a CancelToken,
    summary: &'a Signal<RunSummary>,
    settings: &'a RunSettings,
    counters: &'a [(String, Option<String>, Arc<GroupCounters>)],
    plan: &'a ThreadPlan,
    source_groups: BTreeSet<String>,
}

impl Supervisor<'_> {
    fn snapshot(&self, start: Instant) -> RunSummary {
        RunSummary {
            timestamp: chrono::Utc::now(),
            elapsed_ms: start.elapsed().as_millis() as u64,
            groups: self
                .counters
                .iter()
                .map(|(group, driver, counters)| GroupStats {
                    group: group.clone(),
                    driver: driver.clone(),
                    slices: counters.slices(),
                    finished: driver.is_none() || counters.is_finished(),
                })
                .collect(),
        }
    }

    fn emit_summary(&self, start: Instant) {
        if self.summary.connection_count() == 0 {
            return;
        }
        let summary = self.snapshot(start);
        tracing::debug!("Run summary: {}", summary);
        if let Err(e) = self.summary.emit(&summary) {
            tracing::error!("Summary slot failed: {:#}", e);
            self.token.abort(AbortReason::GroupFailed {
                group: TOOLBOX_ADDRESS.to_string(),
                error: format!("{:#}", e),
            });
        }
    }

    /// Close every still-open queue whose feeders have all exited.
    fn close_fed_queues(
        &self,
        pending: &BTreeSet<String>,
        open: &mut BTreeMap<String, Arc<dyn QueueControl>>,
    ) {
        if self.token.is_cancelled() {
            return;
        }
        open.retain(|group, queue| {
            let waiting_on = self
                .plan
                .close_after(group)
                .into_iter()
                .filter(|feeder| pending.contains(feeder))
                .count();
            if waiting_on > 0 {
                return true;
            }
            tracing::info!("All feeders of <{}> have exited; closing its queue", group);
            queue.close();
            false
        });
    }

    fn supervise(
        self,
        events: crossbeam_channel::Receiver<GroupEvent>,
        mut handles: BTreeMap<String, JoinHandle<()>>,
        mut open_queues: BTreeMap<String, Arc<dyn QueueControl>>,
    ) -> RunStatus {
        let start = Instant::now();
        let mut pending: BTreeSet<String> = handles.keys().cloned().collect();
        let mut sources_left = self
            .source_groups
            .iter()
            .filter(|g| pending.contains(*g))
            .count();
        let interval = self.settings.summary_interval();
        let mut next_summary = interval.map(|i| start + i);
        let mut abort_deadline: Option<Instant> = None;

        if sources_left == 0 {
            tracing::info!("No source groups running");
        }
        self.close_fed_queues(&pending, &mut open_queues);

        while !pending.is_empty() {
            let now = Instant::now();
            if abort_deadline.is_none() && self.token.is_cancelled() {
                tracing::info!(
                    "Waiting up to {:?} for {} thread groups to exit",
                    self.settings.grace_period(),
                    pending.len()
                );
                abort_deadline = Some(now + self.settings.grace_period());
            }
            if let Some(deadline) = abort_deadline {
                if now >= deadline {
                    break;
                }
            }

            let mut wait = SUPERVISOR_TICK;
            if let Some(deadline) = abort_deadline {
                wait = wait.min(deadline.saturating_duration_since(now));
            }
            if let Some(due) = next_summary {
                wait = wait.min(due.saturating_duration_since(now));
            }

            match events.recv_timeout(wait) {
                Ok(GroupEvent { group, outcome }) => {
                    pending.remove(&group);
                    if let Some(handle) = handles.remove(&group) {
                        if handle.join().is_err() {
                            tracing::warn!("Thread group <{}> panicked while exiting", group);
                        }
                    }
                    match outcome {
                        GroupOutcome::Finished => {
                            tracing::info!("Thread group <{}> finished", group);
                            if self.source_groups.contains(&group) {
                                sources_left = sources_left.saturating_sub(1);
                                if sources_left == 0 {
                                    tracing::info!("All sources reached end of stream");
                                }
                            }
                            self.close_fed_queues(&pending, &mut open_queues);
                        }
                        GroupOutcome::Failed(error) => {
                            self.token.abort(AbortReason::GroupFailed {
                                group,
                                error: format!("{:#}", error),
                            });
                        }
                        GroupOutcome::Panicked(message) => {
                            self.token.abort(AbortReason::GroupPanicked { group, message });
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let (Some(due), Some(interval)) = (next_summary, interval) {
                if Instant::now() >= due && abort_deadline.is_none() {
                    self.emit_summary(start);
                    next_summary = Some(due + interval);
                }
            }
        }

        if !pending.is_empty() {
            let groups: Vec<String> = pending.into_iter().collect();
            let cause = self.token.abort_reason().unwrap_or(AbortReason::Cancelled);
            tracing::error!(
                "Thread groups [{}] did not exit within {:?}; leaving them detached",
                groups.join(", "),
                self.settings.grace_period()
            );
            // Dropping the handles detaches the threads.
            drop(handles);
            return RunStatus::Aborted(AbortReason::Hang {
                groups,
                cause: Box::new(cause),
            });
        }

        match self.token.abort_reason() {
            Some(reason) => RunStatus::Aborted(reason),
            None => {
                self.emit_summary(start);
                RunStatus::Completed
            }
        }
    }
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox")
            .field("state", &self.state)
            .field("processors", &self.processor_names())
            .field("plan", &self.plan)
            .finish()
    }
}
