//! Region-side responders for `RegisterRackController`, `Identify` and
//! `Ping`.

use crate::ports::{handler_fn, CommandHandler, RackRegistrar};
use crate::service::Connection;
use async_trait::async_trait;
use region_telemetry::REGISTRATIONS;
use serde_json::{json, Value};
use shared_types::{
    Arguments, Capability, CommandError, RegistrationRequest, RegistrationResponse,
};
use std::sync::Arc;
use tracing::{error, info};

/// Capabilities this region acknowledges when a rack declares them.
pub const SUPPORTED_CAPABILITIES: &[Capability] =
    &[Capability::VersionedResponses, Capability::Beacons];

/// Registers a trusted rack under the identity the registrar assigns.
///
/// Any failure answers `CannotRegister`, after which the connection is
/// dropped.
pub struct RegisterRackControllerHandler {
    registrar: Arc<dyn RackRegistrar>,
    version: String,
}

impl RegisterRackControllerHandler {
    pub fn new(registrar: Arc<dyn RackRegistrar>, version: impl Into<String>) -> Self {
        Self {
            registrar,
            version: version.into(),
        }
    }
}

#[async_trait]
impl CommandHandler for RegisterRackControllerHandler {
    async fn handle(
        &self,
        connection: &Arc<Connection>,
        arguments: Arguments,
    ) -> Result<Value, CommandError> {
        if !connection.begin_registration() {
            return Err(CommandError::failed(
                "AlreadyRegistered",
                format!("connection {} is already registered", connection.id()),
            ));
        }

        let request: RegistrationRequest = serde_json::from_value(Value::Object(arguments))
            .map_err(|e| refuse(connection, "", format!("invalid registration: {e}")))?;

        let registry = connection.registry().ok_or_else(|| {
            refuse(
                connection,
                &request.hostname,
                "region is not accepting registrations".to_string(),
            )
        })?;

        let registration = self
            .registrar
            .register(&request, connection.peer())
            .await
            .map_err(|e| refuse(connection, &request.hostname, e.to_string()))?;

        registry
            .register(&registration.identity, connection)
            .map_err(|e| refuse(connection, &request.hostname, e.to_string()))?;

        REGISTRATIONS.with_label_values(&["accepted"]).inc();
        info!(
            identity = %registration.identity,
            hostname = %request.hostname,
            peer = %connection.peer(),
            connection_id = %connection.id(),
            "Rack controller registered"
        );

        let capabilities = request
            .declared_capabilities()
            .into_iter()
            .filter(|cap| SUPPORTED_CAPABILITIES.contains(cap))
            .collect();

        let response = RegistrationResponse {
            system_id: registration.identity.to_string(),
            uuid: registration.uuid,
            // Legacy racks that send no version get no version back.
            version: request.version.as_ref().map(|_| self.version.clone()),
            capabilities,
        };
        serde_json::to_value(response)
            .map_err(|e| CommandError::failed("EncodingFailed", e.to_string()))
    }
}

fn refuse(connection: &Connection, hostname: &str, reason: String) -> CommandError {
    error!(
        peer = %connection.peer(),
        connection_id = %connection.id(),
        hostname,
        %reason,
        "Rack controller registration failed; dropping connection"
    );
    REGISTRATIONS.with_label_values(&["refused"]).inc();
    CommandError::CannotRegister(reason)
}

/// `Identify`: the region's event-loop name.
pub fn identify_handler(name: String) -> impl CommandHandler + 'static {
    handler_fn(move |_| std::future::ready(Ok(json!({ "ident": name }))))
}

/// `Ping`: liveness probe.
pub fn ping_handler() -> impl CommandHandler + 'static {
    handler_fn(|_| std::future::ready(Ok(json!({}))))
}
