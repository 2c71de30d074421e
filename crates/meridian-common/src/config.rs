//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > meridian.toml (or `--config PATH`) > defaults
//!
//! Environment variables use the `MERIDIAN_` prefix and `__` as the nesting
//! separator, e.g. `MERIDIAN_FEDERATION__ENABLED=true` or
//! `MERIDIAN_FEDERATION__DISCOVERY_METHOD=hub`.
//!
//! The loaded [`AppConfig`] is returned by value and handed to the services
//! that need it; nothing here is process-global.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::validation::{validate_domain, ValidationError};

/// Default hub registry used when `discovery_method = "hub"`.
pub const DEFAULT_HUB_URL: &str = "https://hub.meridian.chat";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ValidationError> for ConfigLoadError {
    fn from(e: ValidationError) -> Self {
        ConfigLoadError::Invalid(e.to_string())
    }
}

/// Load configuration from defaults, an optional file, and the environment.
///
/// When `path` is `None` a `meridian.toml` in the working directory is used
/// if present. An explicit path must exist.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigLoadError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let file_source = match path {
        Some(p) => config::File::from(p).required(true),
        None => config::File::with_name("meridian").required(false),
    };

    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 3000)?
        .set_default("log.format", "pretty")?
        .set_default("log.filter", "meridian=debug,tower_http=info")?
        .set_default("federation.enabled", false)?
        .set_default("federation.domain", "")?
        .set_default("federation.discovery_method", "dns")?
        .set_default("federation.hub_url", DEFAULT_HUB_URL)?
        .set_default("federation.private_key_path", "./data/federation.key")?
        .set_default("federation.request_timeout_ms", 10_000)?
        .set_default("federation.lookup_timeout_ms", 5_000)?
        .set_default("federation.peer_cache_ttl_secs", 3_600)?
        .set_default("federation.expose_crypto_failure_kind", false)?
        .add_source(file_source)
        // Environment variables (MERIDIAN_SERVER__PORT, MERIDIAN_FEDERATION__DOMAIN, etc.)
        .add_source(
            config::Environment::with_prefix("MERIDIAN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub federation: FederationConfig,
}

impl AppConfig {
    /// Cross-field checks that serde alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let fed = &self.federation;
        if fed.enabled {
            if fed.domain.trim().is_empty() {
                return Err(ConfigLoadError::Invalid(
                    "federation.domain must be set when federation is enabled".into(),
                ));
            }
            validate_domain(&fed.domain)?;
        }
        if fed.discovery_method == DiscoveryMethod::Hub {
            url::Url::parse(&fed.hub_url).map_err(|e| {
                ConfigLoadError::Invalid(format!("federation.hub_url is not a valid URL: {e}"))
            })?;
        }
        if let Some(public_url) = &fed.public_url {
            url::Url::parse(public_url).map_err(|e| {
                ConfigLoadError::Invalid(format!("federation.public_url is not a valid URL: {e}"))
            })?;
        }
        for peer in &fed.peers {
            validate_domain(&peer.domain)?;
            url::Url::parse(&peer.endpoint).map_err(|e| {
                ConfigLoadError::Invalid(format!(
                    "endpoint for pinned peer '{}' is not a valid URL: {e}",
                    peer.domain
                ))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

/// How remote peers are resolved to a public key and endpoint.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    /// SRV + TXT records published under the peer's own domain.
    Dns,
    /// A central hub registry queried over HTTPS.
    Hub,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FederationConfig {
    /// Gates whether the federation endpoints are mounted at all.
    pub enabled: bool,
    /// This server's federation identity (e.g. "chat.example.org").
    pub domain: String,
    /// Base URL peers should deliver to. Defaults to `https://<domain>`.
    #[serde(default)]
    pub public_url: Option<String>,
    pub discovery_method: DiscoveryMethod,
    /// Only consulted when `discovery_method = "hub"`.
    pub hub_url: String,
    /// File holding the base64url-encoded 32-byte Ed25519 seed.
    pub private_key_path: String,
    /// Deadline for a whole inbound request (lookup + crypto + dispatch).
    pub request_timeout_ms: u64,
    /// Deadline for a single directory lookup.
    pub lookup_timeout_ms: u64,
    pub peer_cache_ttl_secs: u64,
    /// Report `auth-failed` separately from `decrypt-failed` to remote peers.
    /// Off by default so a peer cannot tell which envelope layer rejected it.
    pub expose_crypto_failure_kind: bool,
    /// Peers pinned in configuration; consulted before the discovery method.
    #[serde(default)]
    pub peers: Vec<PinnedPeer>,
}

impl FederationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn peer_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.peer_cache_ttl_secs)
    }

    /// The endpoint this server advertises to the hub.
    pub fn advertised_url(&self) -> String {
        self.public_url.clone().unwrap_or_else(|| format!("https://{}", self.domain))
    }
}

/// A statically configured peer.
#[derive(Debug, Deserialize, Clone)]
pub struct PinnedPeer {
    pub domain: String,
    /// Base64url Ed25519 public key.
    pub public_key: String,
    /// Base URL the peer accepts federation requests on.
    pub endpoint: String,
}
