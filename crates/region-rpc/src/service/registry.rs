//! # Connection Registry
//!
//! Maps rack identity to the set of live connections serving it, and parks
//! callers asking for an identity that is not connected yet.
//!
//! ## Locking
//!
//! All state sits behind one mutex. Every public operation takes it once and
//! never holds it across an `.await`, so:
//!
//! - "is a connection available?" and "install a waiter" are one atomic step
//!   (a registration cannot slip in between and be missed);
//! - a registration resolves every matching waiter before anyone else can
//!   observe the new connection;
//! - events are published while the lock is held, so subscribers see
//!   `Connected`/`Disconnected` for an identity in the order they happened.
//!
//! An identity keeps its (possibly empty) entry after its last connection
//! leaves; only the `Disconnected` event is emitted.

use crate::domain::{BrokerError, ConnectionInfo, WaiterId, WaiterTable};
use crate::service::{Client, Connection};
use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use region_telemetry::{PENDING_WAITERS, RACK_CONNECTIONS};
use shared_bus::{EventPublisher, RackEvent};
use shared_types::RackIdentity;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

type WaiterSlot = oneshot::Sender<Result<Arc<Connection>, BrokerError>>;

#[derive(Default)]
struct RegistryState {
    connections: HashMap<RackIdentity, HashMap<Uuid, Arc<Connection>>>,
    waiters: WaiterTable<WaiterSlot>,
    stopping: bool,
}

impl RegistryState {
    fn pick(&self, identity: &RackIdentity) -> Option<Arc<Connection>> {
        self.connections
            .get(identity)
            .and_then(|set| set.values().choose(&mut rand::thread_rng()))
            .cloned()
    }

    fn install_waiter(
        &mut self,
        identities: Vec<RackIdentity>,
    ) -> (WaiterId, oneshot::Receiver<Result<Arc<Connection>, BrokerError>>) {
        let (tx, rx) = oneshot::channel();
        let id = self.waiters.insert(identities, tx);
        PENDING_WAITERS.inc();
        (id, rx)
    }
}

/// The long-lived broker state shared by the service and its connections.
pub struct Registry {
    state: Mutex<RegistryState>,
    events: Arc<dyn EventPublisher>,
}

impl Registry {
    pub fn new(events: Arc<dyn EventPublisher>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            events,
        }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Add `connection` under `identity`, hand it to every waiter interested
    /// in `identity`, then announce it.
    ///
    /// A connection belongs to at most one identity. Registering it again
    /// under the same identity changes nothing; under another identity it
    /// fails with [`BrokerError::AlreadyRegistered`].
    pub fn register(
        &self,
        identity: &RackIdentity,
        connection: &Arc<Connection>,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        if state.stopping {
            return Err(BrokerError::Stopping);
        }
        // Checked under the lock so a concurrent close either sees this
        // registration or prevents it.
        if connection.is_closing() {
            return Err(BrokerError::ConnectionClosed);
        }
        if connection.is_registered() {
            return match connection.identity() {
                Some(current) if current == *identity => Ok(()),
                Some(current) => Err(BrokerError::AlreadyRegistered { identity: current }),
                None => Err(BrokerError::ConnectionClosed),
            };
        }

        connection.set_identity(identity.clone());
        state
            .connections
            .entry(identity.clone())
            .or_default()
            .insert(connection.id(), Arc::clone(connection));
        connection.set_registered(true);
        RACK_CONNECTIONS.inc();

        let satisfied = state.waiters.take_for(identity);
        let woken = satisfied.len();
        for slot in satisfied {
            let _ = slot.send(Ok(Arc::clone(connection)));
        }
        PENDING_WAITERS.sub(woken as i64);

        self.events.publish(RackEvent::Connected {
            identity: identity.clone(),
            connection_id: connection.id(),
        });

        debug!(
            %identity,
            connection_id = %connection.id(),
            woken,
            "Connection registered"
        );
        Ok(())
    }

    /// Remove `connection` from `identity` and announce its departure.
    ///
    /// Idempotent. The `Disconnected` event is published even when the
    /// connection was not present or the identity has other connections.
    pub fn unregister(&self, identity: &RackIdentity, connection: &Connection) {
        let mut state = self.state.lock();
        self.remove_locked(&mut state, identity, connection);
    }

    /// Called by a connection as it closes.
    pub(crate) fn connection_closed(&self, connection: &Connection) {
        let mut state = self.state.lock();
        if !connection.is_registered() {
            return;
        }
        if let Some(identity) = connection.identity() {
            self.remove_locked(&mut state, &identity, connection);
        }
    }

    fn remove_locked(
        &self,
        state: &mut RegistryState,
        identity: &RackIdentity,
        connection: &Connection,
    ) {
        let removed = state
            .connections
            .get_mut(identity)
            .and_then(|set| set.remove(&connection.id()))
            .is_some();
        if removed {
            connection.set_registered(false);
            RACK_CONNECTIONS.dec();
        }

        self.events.publish(RackEvent::Disconnected {
            identity: identity.clone(),
            connection_id: connection.id(),
        });

        debug!(
            %identity,
            connection_id = %connection.id(),
            removed,
            "Connection unregistered"
        );
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// A client for `identity`, waiting up to `timeout` for one to connect.
    ///
    /// With a zero timeout this never waits.
    pub async fn get_client_for(
        &self,
        identity: &RackIdentity,
        timeout: Duration,
    ) -> Result<Client, BrokerError> {
        let identities = vec![identity.clone()];
        let (id, receiver) = {
            let mut state = self.state.lock();
            if state.stopping {
                return Err(BrokerError::Stopping);
            }
            if let Some(connection) = state.pick(identity) {
                return Ok(Client::new(connection));
            }
            if timeout.is_zero() {
                return Err(BrokerError::NoConnectionsAvailable { identities });
            }
            state.install_waiter(identities.clone())
        };

        self.wait(id, receiver, timeout, identities)
            .await
            .map(Client::new)
    }

    /// One client per listed identity that is connected right now; otherwise
    /// a single client for whichever of them connects first within `timeout`.
    pub async fn get_client_from_identifiers(
        &self,
        identities: &[RackIdentity],
        timeout: Duration,
    ) -> Result<Vec<Client>, BrokerError> {
        let mut wanted: Vec<RackIdentity> = Vec::with_capacity(identities.len());
        for identity in identities {
            if !wanted.contains(identity) {
                wanted.push(identity.clone());
            }
        }

        let (id, receiver) = {
            let mut state = self.state.lock();
            if state.stopping {
                return Err(BrokerError::Stopping);
            }
            let available: Vec<Client> = wanted
                .iter()
                .filter_map(|identity| state.pick(identity))
                .map(Client::new)
                .collect();
            if !available.is_empty() {
                return Ok(available);
            }
            if wanted.is_empty() || timeout.is_zero() {
                return Err(BrokerError::NoConnectionsAvailable { identities: wanted });
            }
            state.install_waiter(wanted.clone())
        };

        let connection = self.wait(id, receiver, timeout, wanted).await?;
        Ok(vec![Client::new(connection)])
    }

    /// One client per identity with at least one live connection.
    pub fn get_all_clients(&self) -> Vec<Client> {
        let state = self.state.lock();
        let mut rng = rand::thread_rng();
        state
            .connections
            .values()
            .filter_map(|set| set.values().choose(&mut rng))
            .cloned()
            .map(Client::new)
            .collect()
    }

    /// A client for a random connected identity.
    ///
    /// Fails with `NoConnectionsAvailable` carrying an empty identity list,
    /// which reads as "any rack", when nothing is connected.
    pub fn get_random_client(&self) -> Result<Client, BrokerError> {
        let state = self.state.lock();
        let mut rng = rand::thread_rng();
        state
            .connections
            .values()
            .filter(|set| !set.is_empty())
            .choose(&mut rng)
            .and_then(|set| set.values().choose(&mut rng))
            .cloned()
            .map(Client::new)
            .ok_or(BrokerError::NoConnectionsAvailable { identities: vec![] })
    }

    async fn wait(
        &self,
        id: WaiterId,
        receiver: oneshot::Receiver<Result<Arc<Connection>, BrokerError>>,
        timeout: Duration,
        identities: Vec<RackIdentity>,
    ) -> Result<Arc<Connection>, BrokerError> {
        // Removes the waiter however this future ends: resolved, timed out,
        // or dropped by the caller.
        let _guard = WaiterGuard { registry: self, id };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(resolved)) => resolved,
            Ok(Err(_)) => Err(BrokerError::Stopping),
            Err(_) => {
                debug!(waiter = %id, ?identities, ?timeout, "Waiter timed out");
                Err(BrokerError::NoConnectionsAvailable { identities })
            }
        }
    }

    fn remove_waiter(&self, id: WaiterId) {
        let mut state = self.state.lock();
        if state.waiters.remove(id).is_some() {
            PENDING_WAITERS.dec();
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Refuse new registrations and waiters, reject every outstanding waiter
    /// with [`BrokerError::Stopping`], and return the registered connections
    /// for the caller to close.
    pub fn begin_shutdown(&self) -> Vec<Arc<Connection>> {
        let mut state = self.state.lock();
        state.stopping = true;

        let cancelled = state.waiters.drain();
        let count = cancelled.len();
        for slot in cancelled {
            let _ = slot.send(Err(BrokerError::Stopping));
        }
        PENDING_WAITERS.sub(count as i64);
        if count > 0 {
            info!(cancelled = count, "Cancelled pending waiters");
        }

        state
            .connections
            .values()
            .flat_map(|set| set.values().cloned())
            .collect()
    }

    /// Accept registrations again after a shutdown.
    pub fn resume(&self) {
        self.state.lock().stopping = false;
    }

    pub fn is_stopping(&self) -> bool {
        self.state.lock().stopping
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Every registered connection.
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let state = self.state.lock();
        state
            .connections
            .values()
            .flat_map(|set| set.values().map(|c| c.info()))
            .collect()
    }

    /// Identities ever registered, including ones with no live connection.
    pub fn identities(&self) -> Vec<RackIdentity> {
        let mut identities: Vec<_> = self.state.lock().connections.keys().cloned().collect();
        identities.sort();
        identities
    }

    pub fn connection_count(&self, identity: &RackIdentity) -> usize {
        self.state
            .lock()
            .connections
            .get(identity)
            .map_or(0, HashMap::len)
    }

    /// Waiters interested in `identity`.
    pub fn waiter_count(&self, identity: &RackIdentity) -> usize {
        self.state.lock().waiters.count_for(identity)
    }

    /// All installed waiters.
    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

struct WaiterGuard<'a> {
    registry: &'a Registry,
    id: WaiterId,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove_waiter(self.id);
    }
}
