//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use sliceflow::config::RunSettings;
use sliceflow::{ProcessorRegistry, Toolbox};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Timing settings that keep tests fast: short grace period, no summaries
pub fn fast_settings() -> RunSettings {
    RunSettings {
        grace_period_ms: 300,
        summary_interval_ms: 0,
        queue_timeout_ms: 10,
    }
}

/// A toolbox backed by the built-in processors
pub fn builtin_toolbox() -> Toolbox {
    let registry = sliceflow::processors::builtin_registry().expect("built-in registration");
    Toolbox::new(Arc::new(registry))
}

/// A toolbox with an empty registry, for hand-added processors
pub fn empty_toolbox() -> Toolbox {
    Toolbox::new(Arc::new(ProcessorRegistry::new("processor")))
}

/// Poll `condition` until it holds or the test timeout expires
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
