//! Server-to-server HTTP client.
//!
//! The [`FederationClient`] handles all outbound delivery to remote Meridian
//! servers. Every event is sealed for the destination before it leaves.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use meridian_federation::{
//!     client::FederationClient,
//!     directory::{PeerDirectory, StaticDirectory},
//!     events::{EventBody, FederationEvent, MessageDeleted},
//!     keys::KeyStore,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let keys = Arc::new(KeyStore::generate());
//!     let directory: Arc<dyn PeerDirectory> = Arc::new(StaticDirectory::new([]));
//!     let client = FederationClient::new("chat.example.org", keys, directory).unwrap();
//!
//!     let event = FederationEvent::new(
//!         "chat.example.org",
//!         EventBody::MessageDeleted(MessageDeleted { room_id: "r1".into(), message_id: "m1".into() }),
//!     );
//!     client.send(&event, "other.example.net").await.unwrap();
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::{
    directory::PeerDirectory,
    envelope::Envelope,
    error::FederationError,
    events::{FederationEvent, RawEvent},
    keys::KeyStore,
    types::{EventsRequest, FederationResponse, PeerRecord, DOMAIN_HEADER},
};

/// Default per-request timeout for outbound delivery.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Client ──────────────────────────────────────────────────────────────────

/// Async HTTP client for outbound server-to-server delivery.
///
/// Internally uses `reqwest` with a connection pool; cheap to share via `Arc`.
pub struct FederationClient {
    domain: String,
    keys: Arc<KeyStore>,
    directory: Arc<dyn PeerDirectory>,
    http: Client,
}

impl FederationClient {
    /// Create a client that sends as `domain`.
    pub fn new(
        domain: impl Into<String>,
        keys: Arc<KeyStore>,
        directory: Arc<dyn PeerDirectory>,
    ) -> Result<Self, FederationError> {
        Self::with_timeout(domain, keys, directory, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        domain: impl Into<String>,
        keys: Arc<KeyStore>,
        directory: Arc<dyn PeerDirectory>,
        timeout: Duration,
    ) -> Result<Self, FederationError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("Meridian-Federation/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { domain: domain.into(), keys, directory, http })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    // ── Delivery ─────────────────────────────────────────────────────────────

    /// Deliver `event` to `destination`.
    ///
    /// `POST <endpoint>/api/v1/federation.events`
    pub async fn send(&self, event: &FederationEvent, destination: &str) -> Result<(), FederationError> {
        self.send_raw(&event.to_raw()?, destination).await
    }

    /// Deliver an already-encoded event. The type code is not checked, which
    /// lets callers relay codes this build does not know.
    pub async fn send_raw(&self, event: &RawEvent, destination: &str) -> Result<(), FederationError> {
        let peer = self.directory.lookup(destination).await?;
        let result = self.deliver(&peer, event).await;
        if let Err(e) = &result {
            warn!("Delivery of {} ({}) to {} failed: {}", event.id, event.t, destination, e);
            // Next attempt re-resolves, in case the peer moved or rotated keys.
            self.directory.invalidate(destination).await;
        }
        result
    }

    async fn deliver(&self, peer: &PeerRecord, event: &RawEvent) -> Result<(), FederationError> {
        let envelope = Envelope::seal_raw(event, &self.keys, &peer.domain, &peer.public_key)?;
        let url = peer.events_url()?;
        debug!("Federation POST {} ({})", url, event.t);

        let resp = self
            .http
            .post(url)
            .header(DOMAIN_HEADER, &self.domain)
            .json(&EventsRequest::new(envelope.ciphertext))
            .send()
            .await?;

        let status = resp.status();
        let body: FederationResponse = resp.json().await.map_err(|e| {
            FederationError::RemoteHttp(peer.domain.clone(), format!("HTTP {status}: unreadable response: {e}"))
        })?;

        if body.success {
            return Ok(());
        }
        Err(FederationError::RemoteRejected {
            domain: peer.domain.clone(),
            error_type: body.error_type.unwrap_or_else(|| "unknown".into()),
            message: body.message.unwrap_or_default(),
        })
    }
}
