//! Error handling for sliceflow
//!
//! Each layer has its own `thiserror` enum; this module folds them into one
//! crate-level [`Error`] for callers that drive a whole run, such as the
//! command-line front end.

use thiserror::Error;

use crate::config::ConfigError;
use crate::pipeline::PipelineError;
use crate::registry::RegistryError;
use crate::types::AbortReason;

/// Main error type for sliceflow operations
#[derive(Error, Debug)]
pub enum Error {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors related to type registration
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Setup or runtime errors from the toolbox
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A run ended without completing
    #[error("Run aborted: {0}")]
    Aborted(AbortReason),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for sliceflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Aborted(AbortReason::Cancelled);
        assert_eq!(err.to_string(), "Run aborted: cancelled");
    }

    #[test]
    fn test_error_with_context() {
        let err: std::result::Result<(), ConfigError> = Err(ConfigError::Missing("config.source.n_slices".into()));
        let with_ctx = err.context("Failed to configure").unwrap_err();
        assert!(with_ctx.to_string().starts_with("Failed to configure: "));
        assert!(with_ctx.to_string().contains("config.source.n_slices"));
    }

    #[test]
    fn test_lazy_context_on_foreign_error() {
        let err: std::result::Result<(), RegistryError> = Err(RegistryError::UnknownKey {
            kind: "processor",
            key: "fft".into(),
        });
        let with_ctx = err.with_context(|| format!("loading {}", "pipeline.toml")).unwrap_err();
        assert_eq!(
            with_ctx.to_string(),
            "loading pipeline.toml: Registry error: Unknown processor type <fft>"
        );
    }
}
