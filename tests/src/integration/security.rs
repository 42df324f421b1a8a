//! # Handshake Failures
//!
//! A peer that cannot prove knowledge of the shared secret is dropped and
//! never reaches the registry, whichever side it is on.

#[cfg(test)]
mod tests {
    use crate::fixtures::TestRegion;
    use region_rpc::service::ConnectionContext;
    use region_rpc::testing::{test_secret, FailingRegistrar};
    use region_rpc::{handler_fn, CallError, ConnectError, Connection, Dispatcher, RackConnector};
    use serde_json::Value;
    use shared_types::{
        arguments_from, verify_response, AuthenticateRequest, AuthenticateResponse, CommandError,
        RegistrationRequest, SharedSecret, AUTHENTICATE, REGISTER_RACK_CONTROLLER,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpStream;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_rack_with_wrong_secret_is_dropped() {
        let region = TestRegion::new();
        let address = region.start().await;

        let wrong = SharedSecret::new(b"definitely-not-the-secret".to_vec());
        let err = RackConnector::new(wrong, RegistrationRequest::new("abc123", "rack-a"))
            .connect(address)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::AuthenticationFailed(_)));

        assert!(region.service.registry().snapshot().is_empty());
        assert!(region.service.registry().get_all_clients().is_empty());
        region.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_peer_cannot_register() {
        let region = TestRegion::new();
        let address = region.start().await;

        // Fails the region's challenge with UnknownCommand.
        let stream = TcpStream::connect(address).await.unwrap();
        let peer = Connection::spawn(
            stream,
            address,
            ConnectionContext::new(Arc::new(Dispatcher::new())),
        );

        let request = serde_json::to_value(RegistrationRequest::new("abc123", "rack-a")).unwrap();
        let err = peer
            .call_with_timeout(REGISTER_RACK_CONTROLLER, arguments_from(request), WAIT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CallError::Remote(CommandError::Unauthenticated(_)) | CallError::ConnectionClosed
        ));

        tokio::time::timeout(WAIT, peer.closed()).await.unwrap();
        assert!(region.service.registry().snapshot().is_empty());
        region.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_registration_drops_connection() {
        let region = TestRegion::with_registrar(Arc::new(FailingRegistrar::new("rack is retired")));
        let address = region.start().await;

        let err = RackConnector::new(test_secret(), RegistrationRequest::new("abc123", "rack-a"))
            .connect(address)
            .await
            .unwrap_err();
        match err {
            ConnectError::RegistrationRefused(reason) => assert!(reason.contains("rack is retired")),
            other => panic!("expected a refusal, got {other:?}"),
        }

        assert!(region.service.registry().snapshot().is_empty());
        region.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_region_answers_challenge_before_trust() {
        let region = TestRegion::new();
        let address = region.start().await;

        // Holds the region's challenge open so the connection stays up.
        let stalling = Dispatcher::new().with(
            AUTHENTICATE,
            handler_fn(|_| std::future::pending::<Result<Value, CommandError>>()),
        );
        let stream = TcpStream::connect(address).await.unwrap();
        let peer = Connection::spawn(stream, address, ConnectionContext::new(Arc::new(stalling)));

        let challenge = AuthenticateRequest::random();
        let answer = peer
            .call_with_timeout(
                AUTHENTICATE,
                arguments_from(serde_json::to_value(&challenge).unwrap()),
                WAIT,
            )
            .await
            .unwrap();
        let response: AuthenticateResponse = serde_json::from_value(answer).unwrap();

        assert!(verify_response(&test_secret(), &challenge, &response));
        let wrong = SharedSecret::new(b"some-other-secret".to_vec());
        assert!(!verify_response(&wrong, &challenge, &response));

        peer.abort();
        region.service.stop().await.unwrap();
    }
}
