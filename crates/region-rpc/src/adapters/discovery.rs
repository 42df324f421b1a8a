//! Discovery publishers.

use crate::domain::DiscoveryError;
use crate::ports::DiscoveryPublisher;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Only logs the port.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDiscoveryPublisher;

#[async_trait]
impl DiscoveryPublisher for LoggingDiscoveryPublisher {
    async fn publish(&self, port: u16) -> Result<(), DiscoveryError> {
        info!(port, "RPC endpoint available");
        Ok(())
    }
}

/// Writes the port to a file that local rack agents read.
#[derive(Debug, Clone)]
pub struct FileDiscoveryPublisher {
    path: PathBuf,
}

impl FileDiscoveryPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl DiscoveryPublisher for FileDiscoveryPublisher {
    async fn publish(&self, port: u16) -> Result<(), DiscoveryError> {
        let tmp = self.path.with_extension("tmp");
        let write = async {
            tokio::fs::write(&tmp, format!("{port}\n")).await?;
            tokio::fs::rename(&tmp, &self.path).await
        };
        write.await.map_err(|e| DiscoveryError {
            port,
            reason: format!("{}: {e}", self.path.display()),
        })?;
        info!(port, path = %self.path.display(), "Published RPC port");
        Ok(())
    }
}
