//! # sliceflow: multi-threaded slice pipeline runtime
//!
//! Independently written processing stages ("processors") are wired together
//! at run time from a configuration file into a graph spanning several
//! threads. One [`Data`](record::Data) record per slice flows through the
//! graph, and each stage attaches its own results to it.
//!
//! ## Architecture
//!
//! - **Registry**: name-keyed constructors for processors and cut types
//! - **Record**: append-only, type-keyed records ([`record::Data`], [`record::CutStatus`])
//! - **Signals and slots**: typed, name-addressed connections checked at wiring time
//! - **Toolbox**: partitions the graph into thread groups, runs and stops them
//! - **Queue**: the thread-safe FIFO that carries records between groups
//!
//! ## Configuration
//!
//! ```toml
//! [[processors]]
//! type = "slice-source"
//! name = "source"
//!
//! [[processors]]
//! type = "throughput-profiler"
//! name = "profiler"
//!
//! [[connections]]
//! signal = "source:data"
//! slot = "profiler:data"
//!
//! [config.source]
//! n_slices = 100
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use sliceflow::{config::ToolboxConfig, pipeline::Toolbox, processors};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(processors::builtin_registry()?);
//! let config = ToolboxConfig::load("pipeline.toml")?;
//! let mut toolbox = Toolbox::from_config(registry, &config)?;
//! let status = toolbox.run()?;
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod processors;
pub mod queue;
pub mod record;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use config::{ParamNode, RunSettings, ToolboxConfig};
pub use error::{Error, Result};
pub use pipeline::{Processor, Toolbox, ToolboxState};
pub use queue::ConcurrentQueue;
pub use record::{CutStatus, Data, DataHandle};
pub use registry::{ProcessorRegistry, Registry, RegistryError};
pub use types::{AbortReason, RunStatus, RunSummary};
