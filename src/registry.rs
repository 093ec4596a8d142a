//! Name-keyed constructor tables.
//!
//! A [`Registry`] maps a type key (the string used in configuration files) to a
//! zero-argument constructor returning a boxed instance of some base capability.
//! The processor registry uses `Registry<dyn Processor>`; the cut registry in
//! [`crate::record::cut`] uses `Registry<dyn CutResult>`.
//!
//! Registries are built once at process entry, filled by each module's
//! `register_*` function, and then shared read-only (typically behind an `Arc`)
//! with the toolbox. There is no global instance.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = ProcessorRegistry::new("processor");
//! sliceflow::processors::register_builtin(&mut registry)?;
//! let source = registry.create("slice-source")?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::pipeline::Processor;

/// Errors raised by a [`Registry`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The key was registered twice. Always a programming error.
    #[error("{kind} type <{key}> is already registered")]
    DuplicateRegistration { kind: &'static str, key: String },

    /// No constructor is registered under the key.
    #[error("Unknown {kind} type <{key}>")]
    UnknownKey { kind: &'static str, key: String },
}

/// Constructor stored in a registry.
pub type Constructor<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

/// Name-keyed factory for one base capability `T`.
pub struct Registry<T: ?Sized> {
    /// What this registry builds (used in error messages and logs).
    kind: &'static str,
    entries: BTreeMap<String, Constructor<T>>,
}

/// Registry of processor types.
pub type ProcessorRegistry = Registry<dyn Processor>;

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry. `kind` names the capability, e.g. `"processor"`.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// Register a constructor under `key`.
    ///
    /// Fails with [`RegistryError::DuplicateRegistration`] if the key is taken;
    /// the existing constructor is left in place.
    pub fn register<F>(&mut self, key: impl Into<String>, ctor: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(RegistryError::DuplicateRegistration {
                kind: self.kind,
                key,
            });
        }
        tracing::debug!("Registered {} type <{}>", self.kind, key);
        self.entries.insert(key, Arc::new(ctor));
        Ok(())
    }

    /// Construct a new instance of the type registered under `key`.
    pub fn create(&self, key: &str) -> Result<Box<T>, RegistryError> {
        match self.entries.get(key) {
            Some(ctor) => Ok(ctor()),
            None => Err(RegistryError::UnknownKey {
                kind: self.kind,
                key: key.to_string(),
            }),
        }
    }

    /// Whether a constructor is registered under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape: Send {
        fn sides(&self) -> u32;
    }

    struct Triangle;
    impl Shape for Triangle {
        fn sides(&self) -> u32 {
            3
        }
    }

    struct Square;
    impl Shape for Square {
        fn sides(&self) -> u32 {
            4
        }
    }

    fn shapes() -> Registry<dyn Shape> {
        let mut registry: Registry<dyn Shape> = Registry::new("shape");
        registry
            .register("triangle", || Box::new(Triangle) as Box<dyn Shape>)
            .unwrap();
        registry
            .register("square", || Box::new(Square) as Box<dyn Shape>)
            .unwrap();
        registry
    }

    #[test]
    fn test_create_registered() {
        let registry = shapes();
        assert_eq!(registry.create("triangle").unwrap().sides(), 3);
        assert_eq!(registry.create("square").unwrap().sides(), 4);
    }

    #[test]
    fn test_create_returns_fresh_instances() {
        let registry = shapes();
        let a = registry.create("square").unwrap();
        let b = registry.create("square").unwrap();
        let pa = &*a as *const dyn Shape as *const u8;
        let pb = &*b as *const dyn Shape as *const u8;
        // Zero-sized types may share an address, so only check both exist.
        assert_eq!(a.sides(), b.sides());
        let _ = (pa, pb);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = shapes();
        let err = registry
            .register("square", || Box::new(Triangle) as Box<dyn Shape>)
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateRegistration {
                kind: "shape",
                key: "square".to_string()
            }
        );
        // Original constructor survives
        assert_eq!(registry.create("square").unwrap().sides(), 4);
    }

    #[test]
    fn test_unknown_key() {
        let registry = shapes();
        match registry.create("hexagon") {
            Err(RegistryError::UnknownKey { kind, key }) => {
                assert_eq!(kind, "shape");
                assert_eq!(key, "hexagon");
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("unknown key must not construct anything"),
        }
    }

    #[test]
    fn test_keys_sorted() {
        let registry = shapes();
        let keys: Vec<_> = registry.keys().collect();
        assert_eq!(keys, vec!["square", "triangle"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("square"));
        assert!(!registry.contains("circle"));
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::UnknownKey {
            kind: "processor",
            key: "fft".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown processor type <fft>");
    }
}
