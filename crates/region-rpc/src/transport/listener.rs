//! Endpoint binding.

use crate::domain::BrokerError;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Bind the first of `ports` that succeeds, trying them in order.
///
/// Later candidates are only tried when earlier ones fail. Returns
/// [`BrokerError::Stopping`] if `cancel` fires before a bind succeeds.
pub async fn bind_first(
    address: IpAddr,
    ports: &[u16],
    cancel: &CancellationToken,
) -> Result<TcpListener, BrokerError> {
    let mut last_error = String::from("no candidate ports configured");

    for (attempt, port) in ports.iter().copied().enumerate() {
        let endpoint = SocketAddr::new(address, port);
        let bound = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BrokerError::Stopping),
            bound = TcpListener::bind(endpoint) => bound,
        };

        match bound {
            Ok(listener) => {
                info!(%endpoint, attempt, "Bound RPC endpoint");
                return Ok(listener);
            }
            Err(e) => {
                debug!(%endpoint, error = %e, "Endpoint unavailable, trying next candidate");
                last_error = format!("{endpoint}: {e}");
            }
        }
    }

    Err(BrokerError::BindFailed {
        attempts: ports.len(),
        reason: last_error,
    })
}
