//! # Client Proxy
//!
//! The handle application code uses to call one rack over one specific
//! connection. Results of the argument-free idempotent commands on the cache
//! allow-list are memoized in that connection's [`CallCache`]; a new
//! connection, even for the same rack, starts with an empty cache.
//!
//! [`CallCache`]: crate::domain::CallCache

use crate::domain::CallError;
use crate::service::Connection;
use region_telemetry::CALLS;
use serde_json::Value;
use shared_types::{is_cacheable, Arguments, RackIdentity};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Calls commands on the rack behind one connection.
#[derive(Clone)]
pub struct Client {
    connection: Arc<Connection>,
}

impl Client {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    /// Identity of the rack this client talks to.
    pub fn identity(&self) -> Option<RackIdentity> {
        self.connection.identity()
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection.id()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Whether this client is backed by exactly `connection`.
    pub fn uses(&self, connection: &Arc<Connection>) -> bool {
        Arc::ptr_eq(&self.connection, connection)
    }

    /// Call `command` with the connection's default timeout.
    pub async fn call(&self, command: &str, arguments: Arguments) -> Result<Value, CallError> {
        let timeout = self.connection.config().call_timeout;
        self.call_with_timeout(command, arguments, timeout).await
    }

    /// Call `command`, waiting at most `timeout` for a response.
    ///
    /// Failures are returned unchanged and never cached.
    pub async fn call_with_timeout(
        &self,
        command: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        let cacheable = is_cacheable(command) && arguments.is_empty();
        let cache = self.connection.cache();

        if cacheable {
            if let Some(hit) = cache.get(command) {
                CALLS.with_label_values(&[command, "cached"]).inc();
                return Ok(hit);
            }
        }

        let value = self
            .connection
            .call_with_timeout(command, arguments, timeout)
            .await?;

        if cacheable {
            cache.store(command, value.clone());
        }
        Ok(value)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("connection_id", &self.connection.id())
            .field("identity", &self.connection.identity())
            .finish()
    }
}
