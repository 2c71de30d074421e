//! Federation wire types: peer records, the inbound/outbound request body,
//! the structured response, and the published key document.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::keys::PeerPublicKey;

/// Header carrying the sender's claimed federation domain.
pub const DOMAIN_HEADER: &str = "x-federation-domain";

/// Path of the inbound events endpoint, relative to a peer's base URL.
pub const EVENTS_PATH: &str = "/api/v1/federation.events";

/// Path of the public key document.
pub const KEY_PATH: &str = "/api/v1/federation.key";

// ─── Peers ───────────────────────────────────────────────────────────────────

/// A remote server as resolved by a [`PeerDirectory`](crate::directory::PeerDirectory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub domain: String,
    pub public_key: PeerPublicKey,
    /// Base URL; events are POSTed to `endpoint` + [`EVENTS_PATH`].
    pub endpoint: Url,
}

impl PeerRecord {
    pub fn new(domain: impl Into<String>, public_key: PeerPublicKey, endpoint: Url) -> Self {
        Self { domain: domain.into(), public_key, endpoint }
    }

    /// Full URL of the peer's events endpoint.
    pub fn events_url(&self) -> Result<Url, url::ParseError> {
        join_path(&self.endpoint, EVENTS_PATH)
    }
}

/// Append an absolute API path to a base URL, keeping any base path prefix.
pub(crate) fn join_path(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let trimmed = base.as_str().trim_end_matches('/');
    Url::parse(&format!("{trimmed}{path}"))
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// Body of `POST /api/v1/federation.events`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadData>,
}

impl EventsRequest {
    pub fn new(ciphertext: Vec<u8>) -> Self {
        Self { payload: Some(PayloadData { data: ciphertext }) }
    }
}

/// The envelope ciphertext, carried as a JSON array of byte values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadData {
    pub data: Vec<u8>,
}

// ─── Responses ───────────────────────────────────────────────────────────────

/// `{ success: true }` or `{ success: false, message, errorType }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "errorType", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl FederationResponse {
    pub fn ok() -> Self {
        Self { success: true, message: None, error_type: None }
    }

    pub fn failure(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()), error_type: Some(error_type.into()) }
    }
}

/// Published at [`KEY_PATH`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDocument {
    pub domain: String,
    /// Base64url-encoded Ed25519 public key.
    pub public_key: String,
}
