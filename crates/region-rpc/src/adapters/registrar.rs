//! In-memory rack inventory.

use crate::domain::RegistrationError;
use crate::ports::{RackRegistrar, RackRegistration};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{RackIdentity, RegistrationRequest};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use tracing::info;
use uuid::Uuid;

/// Length of generated system ids.
const SYSTEM_ID_LEN: usize = 6;

/// Registrar backed by a hostname to system-id map.
///
/// A rack that registers with an empty system id is assigned one, and gets
/// the same one back when it reconnects under the same hostname.
#[derive(Debug, Default)]
pub struct InMemoryRegistrar {
    region_uuid: Option<String>,
    allowed_hostnames: Option<HashSet<String>>,
    racks: Mutex<HashMap<String, RackIdentity>>,
}

impl InMemoryRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// UUID echoed to racks in the registration response.
    #[must_use]
    pub fn with_region_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.region_uuid = Some(uuid.into());
        self
    }

    /// Refuse every hostname not listed.
    #[must_use]
    pub fn allow_only<I, S>(mut self, hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_hostnames = Some(hostnames.into_iter().map(Into::into).collect());
        self
    }

    /// Identity recorded for `hostname`, if it ever registered.
    pub fn identity_of(&self, hostname: &str) -> Option<RackIdentity> {
        self.racks.lock().get(hostname).cloned()
    }

    pub fn len(&self) -> usize {
        self.racks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.racks.lock().is_empty()
    }
}

#[async_trait]
impl RackRegistrar for InMemoryRegistrar {
    async fn register(
        &self,
        request: &RegistrationRequest,
        peer: SocketAddr,
    ) -> Result<RackRegistration, RegistrationError> {
        if request.hostname.is_empty() {
            return Err(RegistrationError::Lookup("hostname is required".to_string()));
        }
        if let Some(allowed) = &self.allowed_hostnames {
            if !allowed.contains(&request.hostname) {
                return Err(RegistrationError::Refused(format!(
                    "unknown rack controller {}",
                    request.hostname
                )));
            }
        }

        let mut racks = self.racks.lock();
        let identity = if request.system_id.is_empty() {
            racks
                .get(&request.hostname)
                .cloned()
                .unwrap_or_else(generate_system_id)
        } else {
            RackIdentity::new(request.system_id.clone())
        };

        if racks.insert(request.hostname.clone(), identity.clone()).is_none() {
            info!(%identity, hostname = %request.hostname, %peer, "New rack controller recorded");
        }

        Ok(RackRegistration {
            identity,
            uuid: self.region_uuid.clone(),
        })
    }
}

fn generate_system_id() -> RackIdentity {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(SYSTEM_ID_LEN);
    RackIdentity::new(id)
}
