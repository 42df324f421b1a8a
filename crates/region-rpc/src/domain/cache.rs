//! Per-connection memoization of idempotent rack commands.

use parking_lot::Mutex;
use serde_json::Value;
use shared_types::is_cacheable;
use std::collections::HashMap;

/// Cached results of allow-listed commands for one connection.
///
/// Owned by exactly one connection and dropped with it, so a reconnect
/// always starts empty.
#[derive(Debug, Default)]
pub struct CallCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl CallCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the cached result for `command`, if any.
    pub fn get(&self, command: &str) -> Option<Value> {
        self.entries.lock().get(command).cloned()
    }

    /// Remember `value` as the result of `command`.
    ///
    /// Ignored for commands outside the allow-list.
    pub fn store(&self, command: &str, value: Value) {
        if is_cacheable(command) {
            self.entries.lock().insert(command.to_string(), value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
