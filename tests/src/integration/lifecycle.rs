//! # Service Lifecycle
//!
//! Start binds the first free candidate port and publishes it; stop rejects
//! pending waiters and closes every rack connection.

#[cfg(test)]
mod tests {
    use crate::fixtures::{connect_rack, loopback_config, TestRegion, LOCALHOST};
    use region_rpc::{BrokerError, InMemoryRegistrar};
    use region_runtime::config::RegionConfig;
    use region_runtime::RegionRuntime;
    use shared_types::RackIdentity;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_start_publishes_port_and_stop_clears_it() {
        let region = TestRegion::new();
        assert_eq!(region.service.port(), None);
        assert_eq!(region.service.stop().await, Err(BrokerError::NotRunning));

        let address = region.start().await;
        assert_eq!(region.service.port(), Some(address.port()));
        assert_eq!(region.discovery.ports(), vec![address.port()]);
        assert_eq!(region.service.start().await, Err(BrokerError::AlreadyRunning));

        region.service.stop().await.unwrap();
        assert_eq!(region.service.port(), None);
        assert_eq!(region.service.stop().await, Err(BrokerError::NotRunning));

        // Restartable.
        let again = region.start().await;
        assert_eq!(region.discovery.ports().len(), 2);
        assert!(connect_rack(again, "abc123", "rack-a").await.is_ok());
        region.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_falls_back_to_next_candidate_port() {
        let taken = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let taken_port = taken.local_addr().unwrap().port();

        let region = TestRegion::with_config(
            Arc::new(InMemoryRegistrar::new()),
            loopback_config(vec![taken_port, 0]),
        );
        let address = region.start().await;
        assert_ne!(address.port(), taken_port);
        region.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_free_candidate_port() {
        let taken = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let taken_port = taken.local_addr().unwrap().port();

        let region = TestRegion::with_config(
            Arc::new(InMemoryRegistrar::new()),
            loopback_config(vec![taken_port]),
        );
        let err = region.service.start().await.unwrap_err();
        assert!(matches!(err, BrokerError::BindFailed { attempts: 1, .. }));
        assert_eq!(region.service.port(), None);
        assert!(region.discovery.ports().is_empty());
    }

    #[tokio::test]
    async fn test_stop_rejects_waiters_and_closes_racks() {
        let region = TestRegion::new();
        let address = region.start().await;
        let rack = connect_rack(address, "abc123", "rack-a").await.unwrap();

        let registry = Arc::clone(region.service.registry());
        let waiter = tokio::spawn(async move {
            registry
                .get_client_for(&RackIdentity::from("never"), Duration::from_secs(3600))
                .await
        });
        while region.service.registry().pending_waiters() == 0 {
            tokio::task::yield_now().await;
        }

        region.service.stop().await.unwrap();

        assert_eq!(waiter.await.unwrap().unwrap_err(), BrokerError::Stopping);
        tokio::time::timeout(WAIT, rack.session.connection.closed())
            .await
            .unwrap();
        assert!(region.service.registry().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_runtime_publishes_port_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let port_file = dir.path().join("rpc-port");

        let mut config = RegionConfig::default();
        config.security.shared_secret = "5f4dcc3b5aa765d61d8327deb882cf99".into();
        config.rpc.bind_address = LOCALHOST;
        config.rpc.ports = vec![0];
        config.rpc.discovery_file = Some(port_file.clone());

        let runtime = RegionRuntime::new(&config).unwrap();
        let port = runtime.start().await.unwrap();

        let published = tokio::fs::read_to_string(&port_file).await.unwrap();
        assert_eq!(published.trim().parse::<u16>().unwrap(), port);

        runtime.shutdown().await;
        assert_eq!(runtime.service().port(), None);
    }
}
