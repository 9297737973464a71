// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Socket backend configuration.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use figment::{
    Figment, Provider,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "TRELLIS_CONFIG_PATH";

/// Prefix of environment overrides, e.g. `TRELLIS_SOCKET_EXPECTED_PEER_COUNT`.
pub const ENV_PREFIX: &str = "TRELLIS_SOCKET_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("Failed to extract configuration: {0}")]
    Extraction(#[from] Box<figment::Error>),

    /// Values were read but are not acceptable.
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Settings of a [`super::SocketBackend`].
///
/// Endpoints accept `host:port` with an optional `tcp://` scheme.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq, Eq)]
#[serde(default)]
pub struct SocketConfig {
    /// Registry endpoint receiving join requests.
    #[validate(custom(function = "validate_endpoint"))]
    pub publish_endpoint: String,

    /// Registry endpoint streaming roster updates.
    #[validate(custom(function = "validate_endpoint"))]
    pub collect_endpoint: String,

    /// Peers that form the initial context; connecting waits for them.
    #[validate(range(min = 1))]
    pub expected_peer_count: usize,

    /// Local address of this peer's data listener. Port 0 picks a free port.
    #[validate(custom(function = "validate_endpoint"))]
    pub bind_endpoint: String,

    /// Run the registry inside this peer before joining.
    pub host_registry: bool,

    /// Attempts made when dialing the registry or another peer.
    #[validate(range(min = 1))]
    pub connect_attempts: u32,

    /// Pause between dial attempts, in milliseconds.
    pub connect_retry_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            publish_endpoint: "tcp://127.0.0.1:5000".to_string(),
            collect_endpoint: "tcp://127.0.0.1:5001".to_string(),
            expected_peer_count: 1,
            bind_endpoint: "tcp://127.0.0.1:0".to_string(),
            host_registry: false,
            connect_attempts: 100,
            connect_retry_ms: 50,
        }
    }
}

impl SocketConfig {
    /// Config with the three rendezvous settings and defaults elsewhere.
    pub fn new(
        publish_endpoint: impl Into<String>,
        collect_endpoint: impl Into<String>,
        expected_peer_count: usize,
    ) -> Self {
        Self {
            publish_endpoint: publish_endpoint.into(),
            collect_endpoint: collect_endpoint.into(),
            expected_peer_count,
            ..Self::default()
        }
    }

    /// Sets whether this peer hosts the registry.
    pub fn with_host_registry(mut self, host: bool) -> Self {
        self.host_registry = host;
        self
    }

    /// Create a Figment configuration with all sources merged.
    ///
    /// Sources in priority order (lowest to highest):
    /// 1. Code defaults
    /// 2. TOML file from the `TRELLIS_CONFIG_PATH` environment variable
    /// 3. Environment variables (`TRELLIS_SOCKET_*`)
    pub fn figment() -> Figment {
        let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_default();
        Figment::new()
            .merge(Serialized::defaults(SocketConfig::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load configuration from the default figment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::extract_from(Self::figment())
    }

    /// Extract and validate configuration from any provider.
    pub fn extract_from<T: Provider>(provider: T) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(provider)
            .extract()
            .map_err(|e| ConfigError::Extraction(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Default figment with `extra` merged at the highest priority.
    pub fn figment_with<T: Provider>(extra: T) -> Figment {
        Self::figment().merge(extra)
    }

    pub(crate) fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}

fn strip_scheme(endpoint: &str) -> &str {
    endpoint.strip_prefix("tcp://").unwrap_or(endpoint)
}

/// Resolves an endpoint string to a socket address.
pub fn parse_endpoint(endpoint: &str) -> Result<SocketAddr> {
    let host_port = strip_scheme(endpoint);
    if let Ok(addr) = host_port.parse::<SocketAddr>() {
        return Ok(addr);
    }
    host_port
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve endpoint {endpoint}"))?
        .next()
        .ok_or_else(|| anyhow!("Endpoint {endpoint} resolved to no address"))
}

fn validate_endpoint(endpoint: &str) -> Result<(), ValidationError> {
    let host_port = strip_scheme(endpoint);
    let valid = match host_port.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("endpoint_invalid");
        err.add_param("value".into(), &endpoint);
        Err(err)
    }
}
