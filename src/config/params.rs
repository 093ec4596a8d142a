//! Typed view over one processor's configuration subtree.

use serde::de::DeserializeOwned;
use std::fmt;

use super::ConfigError;

/// A named table of parameters handed to `Processor::configure`.
///
/// Values are deserialised on access, so each processor decides the types it
/// expects. Errors carry the full dotted path of the offending key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamNode {
    path: String,
    table: toml::Table,
}

impl ParamNode {
    pub fn new(path: impl Into<String>, table: toml::Table) -> Self {
        Self {
            path: path.into(),
            table,
        }
    }

    /// A node with no parameters. Every lookup falls back to its default.
    pub fn empty(path: impl Into<String>) -> Self {
        Self::new(path, toml::Table::new())
    }

    /// Parse a TOML snippet into a node. Handy for tests and programmatic setup.
    pub fn from_toml_str(path: impl Into<String>, text: &str) -> Result<Self, ConfigError> {
        let path = path.into();
        let table: toml::Table = text.parse().map_err(|e: toml::de::Error| ConfigError::Invalid {
            key: path.clone(),
            message: e.message().to_string(),
        })?;
        Ok(Self::new(path, table))
    }

    /// Dotted location of this node, e.g. `config.queue`.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn key_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    /// The value at `key`, or `None` if absent. A present value of the wrong
    /// type is an error.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(value) => value
                .clone()
                .try_into()
                .map(Some)
                .map_err(|e: toml::de::Error| ConfigError::Invalid {
                    key: self.key_path(key),
                    message: e.message().to_string(),
                }),
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        self.get(key)?
            .ok_or_else(|| ConfigError::Missing(self.key_path(key)))
    }

    /// Nested table at `key`.
    pub fn node(&self, key: &str) -> Result<Option<ParamNode>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::Table(table)) => Ok(Some(ParamNode::new(self.key_path(key), table.clone()))),
            Some(other) => Err(ConfigError::Invalid {
                key: self.key_path(key),
                message: format!("expected a table, found {}", other.type_str()),
            }),
        }
    }

    /// Build an [`ConfigError::Invalid`] for `key` under this node.
    pub fn invalid(&self, key: &str, message: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            key: self.key_path(key),
            message: message.into(),
        }
    }
}

impl fmt::Display for ParamNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({} keys)", self.path, self.table.len())
    }
}
