//! # Connection
//!
//! One duplex channel to one peer process. A single I/O task owns the framed
//! socket: it writes queued outbound frames, reads inbound frames, completes
//! in-flight calls by request id and spawns a task per inbound request so
//! that a slow handler never stalls the channel.
//!
//! Both ends of the control channel use this type. On the region side the
//! connection carries a weak handle to the [`Registry`] so it can leave it
//! when the socket goes away.

use crate::domain::{CallCache, CallError, ConnectionInfo, ConnectionState};
use crate::service::{Dispatcher, Registry};
use crate::transport::{framed_transport, Transport, MAX_FRAME_LEN};
use bytes::Bytes;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use region_telemetry::{metrics::HistogramTimer, CALLS};
use serde_json::Value;
use shared_types::{Arguments, CommandError, Frame, RackIdentity, RequestId};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default bound on a single outgoing call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// How long `close` waits for the I/O task to finish.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout applied by [`Connection::call`].
    pub call_timeout: Duration,
    /// Largest frame sent to or accepted from the peer.
    pub max_frame_length: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_frame_length: MAX_FRAME_LEN,
        }
    }
}

/// Everything a new connection is wired to.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Responders for inbound requests.
    pub dispatcher: Arc<Dispatcher>,
    /// Registry to leave on close; `None` on the rack side.
    pub registry: Option<Weak<Registry>>,
    /// Parent token; cancelling it closes the connection.
    pub shutdown: CancellationToken,
    pub config: ConnectionConfig,
}

impl ConnectionContext {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            registry: None,
            shutdown: CancellationToken::new(),
            config: ConnectionConfig::default(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: &Arc<Registry>) -> Self {
        self.registry = Some(Arc::downgrade(registry));
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }
}

enum Outbound {
    Frame(Bytes),
    /// Stop after everything queued before it has been written.
    Close,
}

type PendingCall = oneshot::Sender<Result<Value, CommandError>>;

/// A live channel to one peer.
pub struct Connection {
    id: Uuid,
    peer: SocketAddr,
    state: watch::Sender<ConnectionState>,
    identity: Mutex<Option<RackIdentity>>,
    /// Only read or written with the registry lock held.
    registered: AtomicBool,
    registering: AtomicBool,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: DashMap<RequestId, PendingCall>,
    next_request_id: AtomicU64,
    cache: CallCache,
    dispatcher: Arc<Dispatcher>,
    registry: Option<Weak<Registry>>,
    config: ConnectionConfig,
    shutdown: CancellationToken,
    close_error: Mutex<Option<String>>,
}

impl Connection {
    /// Start the I/O task for `io` and enter `Handshaking`.
    pub fn spawn<T>(io: T, peer: SocketAddr, context: ConnectionContext) -> Arc<Self>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let transport = framed_transport(io, context.config.max_frame_length);

        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            peer,
            state,
            identity: Mutex::new(None),
            registered: AtomicBool::new(false),
            registering: AtomicBool::new(false),
            outbound,
            pending: DashMap::new(),
            next_request_id: AtomicU64::new(1),
            cache: CallCache::new(),
            dispatcher: context.dispatcher,
            registry: context.registry,
            config: context.config,
            shutdown: context.shutdown.child_token(),
            close_error: Mutex::new(None),
        });

        connection.transition(ConnectionState::Handshaking);
        tokio::spawn(Arc::clone(&connection).run(transport, outbound_rx));
        debug!(connection_id = %connection.id, %peer, "Connection opened");
        connection
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Random correlation id of this connection.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_trusted(&self) -> bool {
        self.state() == ConnectionState::Trusted
    }

    /// Identity of the peer, once registered.
    pub fn identity(&self) -> Option<RackIdentity> {
        self.identity.lock().clone()
    }

    /// Results memoized for this connection only.
    pub fn cache(&self) -> &CallCache {
        &self.cache
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Number of outgoing calls awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// True once the connection has started shutting down.
    pub fn is_closing(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            identity: self.identity(),
            peer: self.peer,
            state: self.state(),
        }
    }

    pub(crate) fn registry(&self) -> Option<Arc<Registry>> {
        self.registry.as_ref().and_then(Weak::upgrade)
    }

    // =========================================================================
    // STATE
    // =========================================================================

    fn transition(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn mark_trusted(&self) -> bool {
        self.transition(ConnectionState::Trusted)
    }

    pub(crate) fn mark_rejected(&self) -> bool {
        self.transition(ConnectionState::Rejected)
    }

    pub(crate) fn set_identity(&self, identity: RackIdentity) {
        *self.identity.lock() = Some(identity);
    }

    /// Claim the single registration slot of this connection.
    pub(crate) fn begin_registration(&self) -> bool {
        !self.registering.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Wait until the handshake outcome is known.
    pub async fn wait_for_handshake(&self) -> ConnectionState {
        let mut state = self.state.subscribe();
        let settled = state.wait_for(|s| s.is_settled()).await.map(|s| *s);
        settled.unwrap_or(ConnectionState::Closed)
    }

    /// Wait until the connection is fully closed and deregistered.
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    // =========================================================================
    // OUTGOING CALLS
    // =========================================================================

    /// Issue `command` to the peer with the configured call timeout.
    pub async fn call(&self, command: &str, arguments: Arguments) -> Result<Value, CallError> {
        self.call_with_timeout(command, arguments, self.config.call_timeout)
            .await
    }

    /// Issue `command` to the peer and wait at most `timeout` for the result.
    ///
    /// A timed-out call is forgotten; a late response for it is discarded.
    pub async fn call_with_timeout(
        &self,
        command: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        if self.is_closing() {
            return Err(CallError::ConnectionClosed);
        }

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::request(id, command, arguments)
            .encode()
            .map_err(|e| CallError::Encode(e.to_string()))?;
        // The codec refuses oversized frames by failing the whole transport.
        if frame.len() > self.config.max_frame_length {
            CALLS.with_label_values(&[command, "error"]).inc();
            return Err(CallError::Encode(format!(
                "frame of {} bytes exceeds the {} byte limit",
                frame.len(),
                self.config.max_frame_length
            )));
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if self.outbound.send(Outbound::Frame(Bytes::from(frame))).is_err() {
            self.pending.remove(&id);
            return Err(CallError::ConnectionClosed);
        }
        debug!(connection_id = %self.id, request_id = id, command, "Request sent");

        let _timer = HistogramTimer::for_command(command);
        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(remote))) => Err(CallError::Remote(remote)),
            Ok(Err(_)) => Err(CallError::ConnectionClosed),
            Err(_) => {
                self.pending.remove(&id);
                Err(CallError::Timeout {
                    command: command.to_string(),
                    timeout,
                })
            }
        };

        CALLS
            .with_label_values(&[command, outcome_label(&outcome)])
            .inc();
        outcome
    }

    // =========================================================================
    // CLOSING
    // =========================================================================

    /// Start closing without waiting.
    pub fn abort(&self) {
        self.shutdown.cancel();
    }

    /// Close the connection and wait until it has left the registry.
    ///
    /// Reports a failure to shut the socket down cleanly.
    pub async fn close(&self) -> Result<(), CallError> {
        self.shutdown.cancel();
        if tokio::time::timeout(CLOSE_TIMEOUT, self.closed()).await.is_err() {
            return Err(CallError::Timeout {
                command: "close".to_string(),
                timeout: CLOSE_TIMEOUT,
            });
        }
        match self.close_error.lock().take() {
            Some(reason) => Err(CallError::Transport(reason)),
            None => Ok(()),
        }
    }

    /// Close once every frame queued so far has been written.
    fn close_after_flush(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    // =========================================================================
    // I/O TASK
    // =========================================================================

    async fn run<T>(
        self: Arc<Self>,
        mut transport: Transport<T>,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
    ) where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                message = outbound.recv() => match message {
                    Some(Outbound::Frame(bytes)) => {
                        if let Err(e) = transport.send(bytes).await {
                            debug!(connection_id = %self.id, error = %e, "Write failed");
                            *self.close_error.lock() = Some(e.to_string());
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => break,
                },
                inbound = transport.next() => match inbound {
                    Some(Ok(bytes)) => self.handle_inbound(&bytes),
                    Some(Err(e)) => {
                        debug!(connection_id = %self.id, error = %e, "Read failed");
                        break;
                    }
                    None => {
                        debug!(connection_id = %self.id, "Peer closed the connection");
                        break;
                    }
                },
            }
        }

        if let Err(e) = transport.get_mut().shutdown().await {
            if e.kind() != std::io::ErrorKind::NotConnected {
                self.close_error.lock().get_or_insert_with(|| e.to_string());
            }
        }
        self.finish(&mut outbound);
    }

    fn finish(&self, outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
        self.shutdown.cancel();
        outbound.close();

        // Dropping the senders fails every in-flight call with ConnectionClosed.
        let abandoned = self.pending.len();
        self.pending.clear();

        if let Some(registry) = self.registry() {
            registry.connection_closed(self);
        }
        self.transition(ConnectionState::Closed);

        debug!(
            connection_id = %self.id,
            peer = %self.peer,
            abandoned,
            "Connection closed"
        );
    }

    fn handle_inbound(self: &Arc<Self>, bytes: &[u8]) {
        match Frame::decode(bytes) {
            Ok(Frame::Response { id, result }) => match self.pending.remove(&id) {
                Some((_, waiter)) => {
                    let _ = waiter.send(result);
                }
                None => {
                    debug!(connection_id = %self.id, request_id = id, "Response for unknown or expired request");
                }
            },
            Ok(Frame::Request {
                id,
                command,
                arguments,
            }) => {
                let connection = Arc::clone(self);
                tokio::spawn(async move { connection.respond(id, command, arguments).await });
            }
            Err(e) => {
                warn!(connection_id = %self.id, peer = %self.peer, error = %e, "Discarding malformed frame");
            }
        }
    }

    async fn respond(self: Arc<Self>, id: RequestId, command: String, arguments: Arguments) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let result = dispatcher.dispatch(&self, &command, arguments).await;
        let drop_after = matches!(&result, Err(e) if e.drops_connection());

        let encoded = match Frame::response(id, result).encode() {
            Ok(bytes) if bytes.len() > self.config.max_frame_length => {
                warn!(connection_id = %self.id, %command, size = bytes.len(), "Response too large, answering with an error");
                let refusal = Err(CommandError::failed(
                    "ResponseTooLarge",
                    format!(
                        "response of {} bytes exceeds the {} byte limit",
                        bytes.len(),
                        self.config.max_frame_length
                    ),
                ));
                Frame::response(id, refusal).encode()
            }
            other => other,
        };
        match encoded {
            Ok(bytes) => {
                let _ = self.outbound.send(Outbound::Frame(Bytes::from(bytes)));
            }
            Err(e) => {
                warn!(connection_id = %self.id, %command, error = %e, "Failed to encode response");
            }
        }

        if drop_after {
            self.close_after_flush();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .field("identity", &self.identity())
            .finish()
    }
}

fn outcome_label(outcome: &Result<Value, CallError>) -> &'static str {
    match outcome {
        Ok(_) => "ok",
        Err(CallError::Remote(_)) => "remote_error",
        Err(CallError::Timeout { .. }) => "timeout",
        Err(CallError::ConnectionClosed) => "closed",
        Err(CallError::Encode(_) | CallError::Transport(_)) => "error",
    }
}
