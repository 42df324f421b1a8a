//! # Region Configuration
//!
//! Layered, lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config <path>` or `REGION_CONFIG`)
//! 3. Environment (`REGION_SHARED_SECRET`, `REGION_RPC_PORTS`,
//!    `REGION_BIND_ADDRESS`, plus the telemetry variables)
//!
//! ## Security Requirements
//!
//! - `security.shared_secret` MUST be set; an empty or all-zero secret is
//!   refused by [`RegionConfig::validate`].

use region_rpc::service::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_CLIENT_WAIT_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PORTS,
};
use region_rpc::{ConnectionConfig, RegionServiceConfig};
use region_telemetry::TelemetryConfig;
use serde::Deserialize;
use shared_types::{SecretError, SharedSecret};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "REGION_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    /// Secret missing, malformed, or all zeros.
    #[error(
        "SECURITY VIOLATION: {0}. Set REGION_SHARED_SECRET or security.shared_secret to a hex key."
    )]
    InsecureSecret(#[from] SecretError),

    #[error("No candidate RPC ports configured")]
    NoPorts,
}

/// Complete region configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub rpc: RpcConfig,
    pub security: SecurityConfig,
    pub telemetry: TelemetryConfig,
}

/// RPC endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Event-loop name answered to `Identify`.
    pub name: String,
    pub bind_address: IpAddr,
    /// Candidate ports, tried in order.
    pub ports: Vec<u16>,
    pub handshake_timeout_secs: u64,
    pub call_timeout_secs: u64,
    pub client_wait_timeout_secs: u64,
    /// Where to publish the bound port. Logged only when unset.
    pub discovery_file: Option<PathBuf>,
    /// Region UUID returned to registering racks.
    pub region_uuid: Option<String>,
    /// Hostnames allowed to register. Any hostname when unset.
    pub allowed_hostnames: Option<Vec<String>>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            name: format!("regiond:pid={}", std::process::id()),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ports: DEFAULT_PORTS.collect(),
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
            client_wait_timeout_secs: DEFAULT_CLIENT_WAIT_TIMEOUT.as_secs(),
            discovery_file: None,
            region_uuid: None,
            allowed_hostnames: None,
        }
    }
}

/// Security configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Hex-encoded secret shared with every rack controller.
    pub shared_secret: String,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}

impl SecurityConfig {
    /// Decode and check the shared secret.
    pub fn secret(&self) -> Result<SharedSecret, ConfigError> {
        let secret = SharedSecret::from_hex(&self.shared_secret)?;
        secret.validate()?;
        Ok(secret)
    }
}

impl RegionConfig {
    /// Defaults, then `path` (or `REGION_CONFIG`) if given, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.telemetry = config.telemetry.with_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply RPC and security overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("REGION_SHARED_SECRET") {
            self.security.shared_secret = secret;
        }
        if let Some(ports) = lookup("REGION_RPC_PORTS") {
            self.rpc.ports = parse_ports(&ports).map_err(|reason| ConfigError::InvalidEnv {
                var: "REGION_RPC_PORTS",
                reason,
            })?;
        }
        if let Some(address) = lookup("REGION_BIND_ADDRESS") {
            self.rpc.bind_address =
                address
                    .trim()
                    .parse()
                    .map_err(|e: std::net::AddrParseError| ConfigError::InvalidEnv {
                        var: "REGION_BIND_ADDRESS",
                        reason: e.to_string(),
                    })?;
        }
        Ok(())
    }

    /// Validate for production readiness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.security.secret()?;
        if self.rpc.ports.is_empty() {
            return Err(ConfigError::NoPorts);
        }
        Ok(())
    }

    /// Broker settings derived from the `rpc` section.
    pub fn service_config(&self) -> RegionServiceConfig {
        RegionServiceConfig {
            name: self.rpc.name.clone(),
            bind_address: self.rpc.bind_address,
            ports: self.rpc.ports.clone(),
            handshake_timeout: Duration::from_secs(self.rpc.handshake_timeout_secs),
            client_wait_timeout: Duration::from_secs(self.rpc.client_wait_timeout_secs),
            connection: ConnectionConfig {
                call_timeout: Duration::from_secs(self.rpc.call_timeout_secs),
                ..ConnectionConfig::default()
            },
            ..RegionServiceConfig::default()
        }
    }
}

/// Parse `5250-5259` or `5250,5252,5254`.
fn parse_ports(text: &str) -> Result<Vec<u16>, String> {
    let text = text.trim();
    if let Some((low, high)) = text.split_once('-') {
        let low: u16 = low.trim().parse().map_err(|e| format!("{low:?}: {e}"))?;
        let high: u16 = high.trim().parse().map_err(|e| format!("{high:?}: {e}"))?;
        if low > high {
            return Err(format!("empty range {low}-{high}"));
        }
        return Ok((low..=high).collect());
    }
    text.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.trim()
                .parse::<u16>()
                .map_err(|e| format!("{part:?}: {e}"))
        })
        .collect()
}
