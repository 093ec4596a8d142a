//! Toolbox configuration documents.
//!
//! A configuration file declares the processors to build, the signal/slot
//! connections between them, an optional thread-group assignment, and a
//! parameter subtree per processor. TOML and JSON are both accepted; the format
//! is picked from the file extension.
//!
//! ```toml
//! [run]
//! grace_period_ms = 2000
//!
//! [[processors]]
//! type = "slice-source"
//! name = "source"
//!
//! [[processors]]
//! type = "data-queue"
//! name = "queue"
//!
//! [[connections]]
//! signal = "source:data"
//! slot = "queue:data"
//!
//! [threads]
//! source = "producer"
//!
//! [config.source]
//! n_slices = 5
//! ```

pub mod params;
pub mod settings;

pub use params::ParamNode;
pub use settings::RunSettings;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading configuration or configuring a processor.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported config format {0:?} (expected .toml or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("Missing required parameter `{0}`")]
    Missing(String),

    #[error("Invalid parameter `{key}`: {message}")]
    Invalid { key: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ==================== Declarations ====================

/// One `[[processors]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorDecl {
    /// Registry key of the processor type
    #[serde(rename = "type")]
    pub type_key: String,

    /// Instance name; defaults to the type key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ProcessorDecl {
    pub fn new(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            name: None,
        }
    }

    pub fn named(type_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            name: Some(name.into()),
        }
    }

    pub fn instance_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.type_key)
    }
}

/// One `[[connections]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDecl {
    /// `processor:signal`
    pub signal: String,

    /// `processor:slot`
    pub slot: String,

    /// Lower runs first; ordered connections run before unordered ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

// ==================== Toolbox Config ====================

/// Complete toolbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolboxConfig {
    /// Scheduler timing
    #[serde(default)]
    pub run: RunSettings,

    /// Processor instances, in declaration order
    #[serde(default)]
    pub processors: Vec<ProcessorDecl>,

    /// Signal to slot connections, in connect order
    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,

    /// Optional instance-name to thread-group assignment
    #[serde(default)]
    pub threads: BTreeMap<String, String>,

    /// Per-processor parameters keyed by instance name or type key
    #[serde(default)]
    pub config: BTreeMap<String, toml::Table>,
}

impl ToolboxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file. `.toml` and `.json` are supported.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let parsed: std::result::Result<Self, String> = match extension.as_deref() {
            Some("toml") => toml::from_str(&content).map_err(|e| e.message().to_string()),
            Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        let config = parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        tracing::info!(
            "Loaded toolbox config {:?}: {} processors, {} connections",
            path,
            config.processors.len(),
            config.connections.len()
        );
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            message: e.message().to_string(),
        })
    }

    /// Save as TOML or JSON depending on the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::to_string_pretty(self).map_err(|e| e.to_string()),
            Some("json") => serde_json::to_string_pretty(self).map_err(|e| e.to_string()),
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
        .map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        std::fs::write(path, content).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Parameters for an instance: `config.<name>`, else `config.<type_key>`.
    pub fn params_for(&self, name: &str, type_key: &str) -> Option<ParamNode> {
        if let Some(table) = self.config.get(name) {
            return Some(ParamNode::new(format!("config.{}", name), table.clone()));
        }
        self.config
            .get(type_key)
            .map(|table| ParamNode::new(format!("config.{}", type_key), table.clone()))
    }

    // ── Programmatic construction ──

    pub fn with_processor(mut self, decl: ProcessorDecl) -> Self {
        self.processors.push(decl);
        self
    }

    pub fn with_connection(mut self, signal: impl Into<String>, slot: impl Into<String>) -> Self {
        self.connections.push(ConnectionDecl {
            signal: signal.into(),
            slot: slot.into(),
            order: None,
        });
        self
    }

    pub fn with_ordered_connection(
        mut self,
        signal: impl Into<String>,
        slot: impl Into<String>,
        order: i64,
    ) -> Self {
        self.connections.push(ConnectionDecl {
            signal: signal.into(),
            slot: slot.into(),
            order: Some(order),
        });
        self
    }

    pub fn with_thread(mut self, processor: impl Into<String>, group: impl Into<String>) -> Self {
        self.threads.insert(processor.into(), group.into());
        self
    }

    pub fn with_params(mut self, key: impl Into<String>, table: toml::Table) -> Self {
        self.config.insert(key.into(), table);
        self
    }

    pub fn with_run_settings(mut self, run: RunSettings) -> Self {
        self.run = run;
        self
    }
}

// ==================== Tests ====================
