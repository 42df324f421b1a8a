//! Region and rack builders shared by the integration flows.

use region_rpc::testing::{counting_rack_handlers, test_secret, RecordingDiscovery};
use region_rpc::{
    ConnectError, Dispatcher, InMemoryRegistrar, RackConnector, RackRegistrar, RackSession,
    RegionDependencies, RegionService, RegionServiceConfig,
};
use shared_bus::InMemoryEventBus;
use shared_types::RegistrationRequest;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// A region service on an ephemeral loopback port.
pub struct TestRegion {
    pub service: RegionService,
    pub events: Arc<InMemoryEventBus>,
    pub discovery: Arc<RecordingDiscovery>,
}

impl TestRegion {
    pub fn new() -> Self {
        Self::with_registrar(Arc::new(InMemoryRegistrar::new()))
    }

    pub fn with_registrar(registrar: Arc<dyn RackRegistrar>) -> Self {
        Self::with_config(registrar, loopback_config(vec![0]))
    }

    pub fn with_config(registrar: Arc<dyn RackRegistrar>, config: RegionServiceConfig) -> Self {
        let events = Arc::new(InMemoryEventBus::new());
        let discovery = Arc::new(RecordingDiscovery::new());
        let service = RegionService::new(
            config,
            RegionDependencies {
                secret: test_secret(),
                registrar,
                discovery: discovery.clone(),
                events: events.clone(),
                handlers: Dispatcher::new(),
            },
        );
        Self {
            service,
            events,
            discovery,
        }
    }

    /// Start the service and return its address.
    pub async fn start(&self) -> SocketAddr {
        let port = self.service.start().await.expect("region starts");
        SocketAddr::new(LOCALHOST, port)
    }
}

impl Default for TestRegion {
    fn default() -> Self {
        Self::new()
    }
}

pub fn loopback_config(ports: Vec<u16>) -> RegionServiceConfig {
    RegionServiceConfig {
        name: "regiond:test".to_string(),
        bind_address: LOCALHOST,
        ports,
        handshake_timeout: Duration::from_secs(5),
        ..RegionServiceConfig::default()
    }
}

/// A rack that reports how often it ran `DescribePowerTypes`.
pub struct TestRack {
    pub session: RackSession,
    pub power_type_runs: Arc<AtomicU64>,
}

/// Connect a rack with the test secret and counting handlers.
pub async fn connect_rack(
    region: SocketAddr,
    system_id: &str,
    hostname: &str,
) -> Result<TestRack, ConnectError> {
    let (handlers, power_type_runs) = counting_rack_handlers();
    let mut request = RegistrationRequest::new(system_id, hostname);
    request.version = Some("3.5.0".to_string());

    let session = RackConnector::new(test_secret(), request)
        .with_handlers(handlers)
        .connect(region)
        .await?;
    Ok(TestRack {
        session,
        power_type_runs,
    })
}
