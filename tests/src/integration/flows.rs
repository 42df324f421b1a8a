//! # Registration and Call Flows
//!
//! A rack controller dials the region over TCP, both ends authenticate,
//! the rack registers, and the region reaches it through the registry.
//!
//! ## Flows Tested:
//!
//! 1. **Waiter then registration**: a region caller waiting for a rack is
//!    woken by the rack's registration
//! 2. **Cached calls**: argument-free idempotent commands run once per
//!    connection
//! 3. **Redundant racks**: two connections under one system id are both used
//! 4. **Disconnection**: a closed rack leaves the registry
//! 5. **Rack-to-region calls**: the rack reaches the region's own commands

#[cfg(test)]
mod tests {
    use crate::fixtures::{connect_rack, TestRegion};
    use futures::StreamExt;
    use region_rpc::{BrokerError, CallError, InMemoryRegistrar};
    use serde_json::json;
    use shared_bus::{EventFilter, EventKind, RackEvent};
    use shared_types::{Arguments, CommandError, RackIdentity, IDENTIFY, PING};
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_waiting_caller_reaches_rack_after_registration() {
        let region = TestRegion::new();
        let address = region.start().await;
        let identity = RackIdentity::from("abc123");

        let registry = Arc::clone(region.service.registry());
        let wanted = identity.clone();
        let waiter = tokio::spawn(async move { registry.get_client_for(&wanted, WAIT).await });
        while region.service.registry().waiter_count(&identity) == 0 {
            tokio::task::yield_now().await;
        }

        let rack = connect_rack(address, "abc123", "rack-a").await.unwrap();
        assert_eq!(rack.session.identity(), identity);

        let client = waiter.await.unwrap().unwrap();
        let first = client.call("DescribePowerTypes", Arguments::new()).await.unwrap();
        let second = client.call("DescribePowerTypes", Arguments::new()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first["power_types"], json!(["ipmi", "redfish"]));
        assert_eq!(rack.power_type_runs.load(Ordering::SeqCst), 1);

        let mut args = Arguments::new();
        args.insert("system_id".into(), json!("node-7"));
        let echoed = client.call("PowerQuery", args).await.unwrap();
        assert_eq!(echoed["echo"]["system_id"], json!("node-7"));

        region.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_new_rack_is_assigned_a_system_id() {
        let region = TestRegion::with_registrar(Arc::new(
            InMemoryRegistrar::new().with_region_uuid("region-uuid"),
        ));
        let address = region.start().await;

        let first = connect_rack(address, "", "rack-new").await.unwrap();
        let assigned = first.session.identity();
        assert!(!assigned.is_empty());
        assert_eq!(first.session.registration.uuid.as_deref(), Some("region-uuid"));
        assert!(first.session.registration.version.is_some());

        // Reconnecting under the same hostname keeps the id.
        let second = connect_rack(address, "", "rack-new").await.unwrap();
        assert_eq!(second.session.identity(), assigned);
        assert_eq!(region.service.registry().connection_count(&assigned), 2);

        region.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_redundant_connections_are_both_used() {
        let region = TestRegion::new();
        let address = region.start().await;

        let one = connect_rack(address, "rack-2", "rack-2a").await.unwrap();
        let two = connect_rack(address, "rack-2", "rack-2b").await.unwrap();

        let identity = RackIdentity::from("rack-2");
        let registry = region.service.registry();
        assert_eq!(registry.connection_count(&identity), 2);

        let mut seen = HashSet::new();
        for _ in 0..200 {
            let clients = registry.get_all_clients();
            assert_eq!(clients.len(), 1);
            seen.insert(clients[0].connection_id());
        }
        assert_eq!(seen.len(), 2);

        // Each connection keeps its own cache.
        for _ in 0..50 {
            let client = registry.get_client_for(&identity, WAIT).await.unwrap();
            client.call("DescribePowerTypes", Arguments::new()).await.unwrap();
        }
        assert!(one.power_type_runs.load(Ordering::SeqCst) <= 1);
        assert!(two.power_type_runs.load(Ordering::SeqCst) <= 1);

        region.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnected_rack_leaves_registry() {
        let region = TestRegion::new();
        let address = region.start().await;
        let mut disconnects = region
            .events
            .event_stream(EventFilter::kinds(vec![EventKind::Disconnected]));

        let rack = connect_rack(address, "rack-3", "rack-3").await.unwrap();
        rack.session.connection.close().await.unwrap();

        let event = tokio::time::timeout(WAIT, disconnects.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, RackEvent::Disconnected { ref identity, .. } if identity.as_str() == "rack-3"));

        let err = region
            .service
            .registry()
            .get_client_for(&RackIdentity::from("rack-3"), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NoConnectionsAvailable { .. }));

        region.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_rack_calls_region_commands() {
        let region = TestRegion::new();
        let address = region.start().await;
        let rack = connect_rack(address, "rack-4", "rack-4").await.unwrap();

        let ident = rack
            .session
            .connection
            .call(IDENTIFY, Arguments::new())
            .await
            .unwrap();
        assert_eq!(ident, json!({ "ident": "regiond:test" }));

        let pong = rack.session.connection.call(PING, Arguments::new()).await.unwrap();
        assert_eq!(pong, json!({}));

        let err = rack
            .session
            .connection
            .call("PowerOn", Arguments::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CallError::Remote(CommandError::UnknownCommand("PowerOn".into()))
        );

        region.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_identifiers_wait_for_any_rack() {
        let region = TestRegion::new();
        let address = region.start().await;
        let wanted = vec![RackIdentity::from("rack-a"), RackIdentity::from("rack-b")];

        let registry = Arc::clone(region.service.registry());
        let asked = wanted.clone();
        let waiter =
            tokio::spawn(async move { registry.get_client_from_identifiers(&asked, WAIT).await });
        while region.service.registry().pending_waiters() == 0 {
            tokio::task::yield_now().await;
        }

        let _rack = connect_rack(address, "rack-b", "rack-b").await.unwrap();
        let clients = waiter.await.unwrap().unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].identity(), Some(RackIdentity::from("rack-b")));
        assert_eq!(region.service.registry().pending_waiters(), 0);

        region.service.stop().await.unwrap();
    }
}
