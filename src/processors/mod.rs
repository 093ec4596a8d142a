//! Built-in processors.
//!
//! | type key | processor | role |
//! |---|---|---|
//! | `slice-source` | [`SliceSource`] | source |
//! | `data-queue` | [`DataQueue`] | consumer |
//! | `apply-cut` | [`DataCutter`] | plain |
//! | `throughput-profiler` | [`ThroughputProfiler`] | plain |
//! | `summary-logger` | [`SummaryLogger`] | plain |

pub mod data_cutter;
pub mod data_queue;
pub mod slice_source;
pub mod summary_logger;
pub mod throughput_profiler;

pub use data_cutter::DataCutter;
pub use data_queue::{DataQueue, PopMode};
pub use slice_source::SliceSource;
pub use summary_logger::SummaryLogger;
pub use throughput_profiler::{ThroughputProfiler, ThroughputReport};

use crate::pipeline::Processor;
use crate::registry::{ProcessorRegistry, RegistryError};

/// Register every built-in processor type.
pub fn register_builtin(registry: &mut ProcessorRegistry) -> Result<(), RegistryError> {
    registry.register(slice_source::TYPE_KEY, || -> Box<dyn Processor> {
        Box::new(SliceSource::new())
    })?;
    registry.register(data_queue::TYPE_KEY, || -> Box<dyn Processor> {
        Box::new(DataQueue::new())
    })?;
    registry.register(data_cutter::TYPE_KEY, || -> Box<dyn Processor> {
        Box::new(DataCutter::new())
    })?;
    registry.register(throughput_profiler::TYPE_KEY, || -> Box<dyn Processor> {
        Box::new(ThroughputProfiler::new())
    })?;
    registry.register(summary_logger::TYPE_KEY, || -> Box<dyn Processor> {
        Box::new(SummaryLogger::new())
    })?;
    Ok(())
}

/// A registry holding the built-in processors.
pub fn builtin_registry() -> Result<ProcessorRegistry, RegistryError> {
    let mut registry = ProcessorRegistry::new("processor");
    register_builtin(&mut registry)?;
    Ok(registry)
}
