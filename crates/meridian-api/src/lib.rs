//! # meridian-api
//!
//! HTTP layer for Meridian. Hosts the inbound federation endpoint that remote
//! servers POST sealed events to, the public key document, and a health check.

pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use meridian_common::config::FederationConfig;
use meridian_federation::{EventRouter, FederationClient, FederationError, KeyStore, PeerDirectory};

/// Maximum accepted request body. Envelopes are a few KiB; the byte-array
/// JSON encoding inflates them roughly fourfold.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub started_at: Instant,
    /// `None` when federation is disabled; the federation routes are then
    /// not mounted at all.
    pub federation: Option<Arc<FederationState>>,
}

impl AppState {
    pub fn new(federation: Option<FederationState>) -> Self {
        Self { started_at: Instant::now(), federation: federation.map(Arc::new) }
    }
}

/// Everything the inbound pipeline needs, injected at startup.
pub struct FederationState {
    /// This server's federation identity (e.g. "chat.example.org").
    pub domain: String,
    pub keys: Arc<KeyStore>,
    pub directory: Arc<dyn PeerDirectory>,
    pub router: Arc<EventRouter>,
    /// Outbound client for host code sending events; shares the keys and directory.
    pub client: Arc<FederationClient>,
    pub settings: FederationSettings,
}

impl FederationState {
    pub fn new(
        domain: impl Into<String>,
        keys: Arc<KeyStore>,
        directory: Arc<dyn PeerDirectory>,
        router: Arc<EventRouter>,
        settings: FederationSettings,
    ) -> Result<Self, FederationError> {
        let domain = domain.into();
        let client = FederationClient::with_timeout(
            domain.clone(),
            keys.clone(),
            directory.clone(),
            settings.request_timeout,
        )?;
        Ok(Self { domain, keys, directory, router, client: Arc::new(client), settings })
    }
}

/// Tunables of the inbound pipeline.
#[derive(Debug, Clone, Copy)]
pub struct FederationSettings {
    /// Deadline for lookup + crypto + dispatch.
    pub request_timeout: Duration,
    pub lookup_timeout: Duration,
    pub expose_crypto_failure_kind: bool,
}

impl Default for FederationSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            lookup_timeout: Duration::from_secs(5),
            expose_crypto_failure_kind: false,
        }
    }
}

impl From<&FederationConfig> for FederationSettings {
    fn from(config: &FederationConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            lookup_timeout: config.lookup_timeout(),
            expose_crypto_failure_kind: config.expose_crypto_failure_kind,
        }
    }
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let mut api_routes = Router::new().merge(routes::health::router());
    if let Some(federation) = &state.federation {
        api_routes = api_routes.merge(routes::federation::router(federation.clone()));
    }

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(tower_http::limit::RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
