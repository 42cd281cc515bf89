//! Shared test utilities for uart-mcp integration tests.
//!
//! This module provides common test infrastructure including:
//! - A fixture wiring a [`SerialManager`] to mock devices
//! - Polling helpers for background-thread effects
//! - JSON assertion helpers

#![allow(dead_code)]

use serde_json::Value;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uart_mcp::port::{MockDevice, MockPortOpener};
use uart_mcp::{
    Blacklist, ManagerOptions, NoBlacklist, SerialManager, TerminalManager, TerminalOptions,
};

/// Supervisor interval used by reconnect tests.
pub const FAST_RECONNECT: Duration = Duration::from_millis(25);

/// Serial manager over an in-memory set of devices.
pub struct Fixture {
    pub opener: MockPortOpener,
    pub serial: Arc<SerialManager>,
}

impl Fixture {
    /// Fixture without a reconnect supervisor.
    pub fn new(devices: &[&str]) -> Self {
        Self::build(
            devices,
            Arc::new(NoBlacklist),
            ManagerOptions {
                auto_reconnect: false,
                ..ManagerOptions::default()
            },
        )
    }

    /// Fixture whose supervisor runs every [`FAST_RECONNECT`].
    pub fn with_reconnect(devices: &[&str]) -> Self {
        Self::build(
            devices,
            Arc::new(NoBlacklist),
            ManagerOptions {
                auto_reconnect: true,
                reconnect_interval: FAST_RECONNECT,
                shutdown_timeout: Duration::from_secs(2),
                ..ManagerOptions::default()
            },
        )
    }

    pub fn build(devices: &[&str], blacklist: Arc<dyn Blacklist>, options: ManagerOptions) -> Self {
        let opener = MockPortOpener::new();
        for name in devices {
            opener.add_device(name);
        }
        let serial = Arc::new(SerialManager::new(Arc::new(opener.clone()), blacklist, options));
        Self { opener, serial }
    }

    pub fn device(&self, name: &str) -> MockDevice {
        self.opener
            .device(name)
            .unwrap_or_else(|| panic!("no mock device named {name}"))
    }

    /// Terminal manager with a short reader interval.
    pub fn terminals(&self) -> TerminalManager {
        TerminalManager::with_options(
            Arc::clone(&self.serial),
            TerminalOptions {
                read_interval: Duration::from_millis(5),
                read_timeout: Duration::from_millis(10),
                stop_timeout: Duration::from_secs(1),
            },
        )
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Assert that a JSON value contains specific fields with expected values.
///
/// # Example
/// ```ignore
/// let actual = json!({"status": "ok", "port": "COM1"});
/// let expected = json!({"status": "ok"});
/// assert_json_contains(&actual, &expected); // Passes - actual contains all of expected
/// ```
pub fn assert_json_contains(actual: &Value, expected: &Value) {
    match (actual, expected) {
        (Value::Object(actual_map), Value::Object(expected_map)) => {
            for (key, expected_value) in expected_map {
                let actual_value = actual_map
                    .get(key)
                    .unwrap_or_else(|| panic!("Expected key '{}' not found in actual JSON", key));
                assert_json_contains(actual_value, expected_value);
            }
        }
        (Value::Array(actual_arr), Value::Array(expected_arr)) => {
            assert_eq!(actual_arr.len(), expected_arr.len(), "Array lengths differ");
            for (actual_item, expected_item) in actual_arr.iter().zip(expected_arr.iter()) {
                assert_json_contains(actual_item, expected_item);
            }
        }
        _ => {
            assert_eq!(
                actual, expected,
                "JSON values differ: expected {:?}, got {:?}",
                expected, actual
            );
        }
    }
}
