//! Command dispatch table.

use crate::domain::ConnectionState;
use crate::ports::CommandHandler;
use crate::service::Connection;
use serde_json::Value;
use shared_types::{allowed_unauthenticated, Arguments, CommandError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Maps command names to their handlers.
///
/// Requests for anything other than the unauthenticated allow-list wait for
/// the handshake outcome and are refused unless the connection is trusted.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `command`, replacing any previous one.
    pub fn register<H>(&mut self, command: impl Into<String>, handler: H) -> &mut Self
    where
        H: CommandHandler + 'static,
    {
        self.handlers.insert(command.into(), Arc::new(handler));
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<H>(mut self, command: impl Into<String>, handler: H) -> Self
    where
        H: CommandHandler + 'static,
    {
        self.register(command, handler);
        self
    }

    pub fn contains(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Registered command names, unordered.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Run `command` for the peer of `connection`.
    pub async fn dispatch(
        &self,
        connection: &Arc<Connection>,
        command: &str,
        arguments: Arguments,
    ) -> Result<Value, CommandError> {
        if !allowed_unauthenticated(command)
            && connection.wait_for_handshake().await != ConnectionState::Trusted
        {
            debug!(connection_id = %connection.id(), command, "Refusing command on untrusted connection");
            return Err(CommandError::Unauthenticated(command.to_string()));
        }

        let handler = self
            .handlers
            .get(command)
            .ok_or_else(|| CommandError::UnknownCommand(command.to_string()))?;

        debug!(connection_id = %connection.id(), command, "Dispatching command");
        handler.handle(connection, arguments).await
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<_> = self.commands().collect();
        commands.sort_unstable();
        f.debug_struct("Dispatcher").field("commands", &commands).finish()
    }
}
