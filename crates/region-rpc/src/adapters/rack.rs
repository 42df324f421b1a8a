//! # Rack Connector
//!
//! The rack end of the control channel:
//!
//! 1. Dial the region.
//! 2. Answer the region's `Authenticate` challenge (always allowed).
//! 3. Challenge the region in turn; a region that fails is disconnected.
//! 4. Send `RegisterRackController` and adopt the system id it returns.
//!
//! The region may answer step 4 with `CannotRegister`, after which it drops
//! the connection.

use crate::domain::{CallError, ConnectError};
use crate::service::{
    authenticate_peer, AuthenticateHandler, Connection, ConnectionConfig, ConnectionContext,
    Dispatcher, DEFAULT_HANDSHAKE_TIMEOUT,
};
use shared_types::{
    arguments_from, CommandError, RackIdentity, RegistrationRequest, RegistrationResponse,
    SharedSecret, AUTHENTICATE, REGISTER_RACK_CONTROLLER,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// An authenticated, registered connection to a region.
#[derive(Debug, Clone)]
pub struct RackSession {
    pub connection: Arc<Connection>,
    pub registration: RegistrationResponse,
}

impl RackSession {
    /// System id the region assigned.
    pub fn identity(&self) -> RackIdentity {
        RackIdentity::new(self.registration.system_id.clone())
    }
}

/// Connects a rack controller to a region.
pub struct RackConnector {
    secret: SharedSecret,
    registration: RegistrationRequest,
    handlers: Dispatcher,
    handshake_timeout: Duration,
    config: ConnectionConfig,
}

impl RackConnector {
    pub fn new(secret: SharedSecret, registration: RegistrationRequest) -> Self {
        Self {
            secret,
            registration,
            handlers: Dispatcher::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            config: ConnectionConfig::default(),
        }
    }

    /// Commands the region may call on this rack.
    #[must_use]
    pub fn with_handlers(mut self, handlers: Dispatcher) -> Self {
        self.handlers = handlers;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Dial `address` and run the full handshake and registration.
    pub async fn connect(&self, address: SocketAddr) -> Result<RackSession, ConnectError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| ConnectError::Io {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(region = %address, error = %e, "Failed to set TCP_NODELAY");
        }
        self.establish(stream, address).await
    }

    /// Run the handshake and registration over an existing stream.
    pub async fn establish<T>(&self, io: T, region: SocketAddr) -> Result<RackSession, ConnectError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let dispatcher = self
            .handlers
            .clone()
            .with(AUTHENTICATE, AuthenticateHandler::new(self.secret.clone()));
        let context = ConnectionContext::new(Arc::new(dispatcher)).with_config(self.config.clone());
        let connection = Connection::spawn(io, region, context);

        if let Err(e) = authenticate_peer(&connection, &self.secret, self.handshake_timeout).await {
            warn!(%region, error = %e, "Region failed authentication; disconnecting");
            connection.abort();
            return Err(ConnectError::AuthenticationFailed(e));
        }

        match self.register(&connection).await {
            Ok(registration) => {
                connection.set_identity(RackIdentity::new(registration.system_id.clone()));
                info!(
                    %region,
                    system_id = %registration.system_id,
                    capabilities = ?registration.capabilities,
                    "Registered with region"
                );
                Ok(RackSession {
                    connection,
                    registration,
                })
            }
            Err(e) => {
                connection.abort();
                Err(e)
            }
        }
    }

    async fn register(&self, connection: &Connection) -> Result<RegistrationResponse, ConnectError> {
        let arguments = serde_json::to_value(&self.registration)
            .map(arguments_from)
            .map_err(|e| CallError::Encode(e.to_string()))?;

        let answer = match connection.call(REGISTER_RACK_CONTROLLER, arguments).await {
            Ok(answer) => answer,
            Err(CallError::Remote(CommandError::CannotRegister(reason))) => {
                return Err(ConnectError::RegistrationRefused(reason))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_value(answer).map_err(|e| {
            ConnectError::Call(CallError::Transport(format!(
                "malformed registration response: {e}"
            )))
        })
    }
}
