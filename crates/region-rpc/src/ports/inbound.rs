//! # Driving Ports (Inbound API)
//!
//! A command handler turns a named request from the peer into a result or a
//! typed [`CommandError`]. Handlers are looked up by name in a
//! [`Dispatcher`](crate::service::Dispatcher).

use crate::service::Connection;
use async_trait::async_trait;
use serde_json::Value;
use shared_types::{Arguments, CommandError};
use std::future::Future;
use std::sync::Arc;

/// Responder for one command name.
///
/// # Thread Safety
///
/// Handlers are shared by every connection and invoked concurrently.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command on behalf of the peer of `connection`.
    async fn handle(
        &self,
        connection: &Arc<Connection>,
        arguments: Arguments,
    ) -> Result<Value, CommandError>;
}

/// Adapter for handlers that only need the arguments.
pub struct FnHandler<F>(F);

/// Wrap an async closure as a [`CommandHandler`].
///
/// ```rust,ignore
/// dispatcher.register("DescribePowerTypes", handler_fn(|_| async {
///     Ok(json!({"power_types": ["ipmi", "redfish"]}))
/// }));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, CommandError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, CommandError>> + Send + 'static,
{
    async fn handle(
        &self,
        _connection: &Arc<Connection>,
        arguments: Arguments,
    ) -> Result<Value, CommandError> {
        (self.0)(arguments).await
    }
}
