//! Pipeline-specific error types.

use crate::config::ConfigError;
use crate::registry::RegistryError;
use thiserror::Error;

use super::signal::SignalError;
use super::toolbox::ToolboxState;

/// Errors raised while wiring or running a toolbox.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Processor <{name}> has unknown type <{type_key}>")]
    UnknownProcessorType { name: String, type_key: String },

    #[error("Processor name <{0}> is used more than once")]
    DuplicateProcessor(String),

    #[error("Unknown processor <{0}>")]
    UnknownProcessor(String),

    #[error("Failed to configure processor <{processor}>: {source}")]
    Config {
        processor: String,
        #[source]
        source: ConfigError,
    },

    #[error("Malformed address <{0}> (expected `processor:port`)")]
    BadAddress(String),

    #[error("Processor <{processor}> has no {kind} named <{port}>")]
    UnknownSignalOrSlot {
        processor: String,
        port: String,
        kind: &'static str,
    },

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error("Thread group <{group}> has more than one driver: <{first}> and <{second}>")]
    MultiplePrimaries {
        group: String,
        first: String,
        second: String,
    },

    #[error("Toolbox is {actual:?}; operation requires {expected:?}")]
    InvalidState {
        expected: ToolboxState,
        actual: ToolboxState,
    },

    #[error("Processor <{processor}> failed: {source:#}")]
    Processor {
        processor: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to spawn thread for group <{group}>: {source}")]
    Spawn {
        group: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::UnknownSignalOrSlot {
            processor: "queue".into(),
            port: "nope".into(),
            kind: "slot",
        };
        assert_eq!(err.to_string(), "Processor <queue> has no slot named <nope>");
    }

    #[test]
    fn test_registry_error_is_transparent() {
        let err: PipelineError = RegistryError::DuplicateRegistration {
            kind: "processor",
            key: "slice-source".into(),
        }
        .into();
        assert_eq!(err.to_string(), "processor type <slice-source> is already registered");
    }

    #[test]
    fn test_processor_error_shows_chain() {
        let source = anyhow::anyhow!("disk full").context("writing report");
        let err = PipelineError::Processor {
            processor: "profiler".into(),
            source,
        };
        assert_eq!(
            err.to_string(),
            "Processor <profiler> failed: writing report: disk full"
        );
    }
}
