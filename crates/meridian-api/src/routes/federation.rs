//! Server-to-server federation routes.
//!
//! These endpoints are called by *remote Meridian servers*, not by end-user
//! clients. There is no session or bearer token: every inbound request is
//! authenticated by its envelope.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST   | `/api/v1/federation.events` | Receive one sealed event from a peer |
//! | GET    | `/api/v1/federation.key` | Serve this server's public key document |
//!
//! ## Inbound lifecycle
//!
//! ```text
//! received → payload validated → peer resolved → envelope opened → dispatched → response
//! ```
//!
//! Each step either advances or ends the request with a failure response;
//! nothing is retried here.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use meridian_common::validation::validate_domain;
use meridian_federation::{
    types::{EventsRequest, KeyDocument, DOMAIN_HEADER},
    Envelope, EventKind, FederationError, FederationResponse,
};
use tracing::{debug, info, warn};

use crate::{error::InboundError, AppState, FederationState};

// ─── Router ───────────────────────────────────────────────────────────────────

/// Federation routes, relative to `/api/v1`.
pub fn router(state: Arc<FederationState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/federation.events", post(receive_event))
        .route("/federation.key", get(key_document))
        .with_state(state)
}

// ─── Key document ─────────────────────────────────────────────────────────────

/// `GET /api/v1/federation.key`
async fn key_document(State(state): State<Arc<FederationState>>) -> Json<KeyDocument> {
    Json(KeyDocument { domain: state.domain.clone(), public_key: state.keys.public_key_base64() })
}

// ─── Event receive ────────────────────────────────────────────────────────────

/// `POST /api/v1/federation.events`
///
/// The body is read as raw bytes so that a missing or unparseable payload
/// still gets a structured failure response instead of an extractor rejection.
async fn receive_event(
    State(state): State<Arc<FederationState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<FederationResponse>, InboundError> {
    let sender = headers
        .get(DOMAIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let deadline = state.settings.request_timeout;
    let result = match tokio::time::timeout(deadline, process(&state, sender, &body)).await {
        Ok(result) => result,
        Err(_) => Err(InboundError::Timeout(deadline)),
    };

    match result {
        Ok(kind) => {
            debug!("Accepted {} event from {}", kind, sender.unwrap_or("?"));
            Ok(Json(FederationResponse::ok()))
        }
        Err(e) => {
            warn!(
                sender = sender.unwrap_or("-"),
                event_type = event_type_of(&e).unwrap_or("-"),
                error_type = e.error_type(),
                "Rejected federation request: {}",
                e
            );
            Err(e.masked(state.settings.expose_crypto_failure_kind))
        }
    }
}

async fn process(
    state: &FederationState,
    sender: Option<&str>,
    body: &[u8],
) -> Result<EventKind, InboundError> {
    // ── 1. Validate payload and header ────────────────────────────────────────
    let request: EventsRequest = if body.is_empty() {
        EventsRequest::default()
    } else {
        serde_json::from_slice(body).map_err(|e| InboundError::UnreadableBody(e.to_string()))?
    };
    let payload = request.payload.ok_or(InboundError::MissingPayload)?;
    let domain = sender.ok_or(InboundError::MissingDomainHeader)?;

    // ── 2. Resolve the claimed sender ─────────────────────────────────────────
    validate_domain(domain).map_err(|_| FederationError::UnknownPeer(domain.to_owned()))?;
    let peer = tokio::time::timeout(state.settings.lookup_timeout, state.directory.lookup(domain))
        .await
        .map_err(|_| FederationError::DirectoryUnavailable(domain.to_owned(), "lookup timed out".into()))??;
    debug!("Resolved peer {} → {}", peer.domain, peer.endpoint);

    // ── 3. Open the envelope ──────────────────────────────────────────────────
    let raw = Envelope::new(domain, payload.data).open(&peer.public_key, &state.keys, &state.domain)?;
    debug!("Opened event {} ({}) from {}", raw.id, raw.t, domain);

    // ── 4. Dispatch ───────────────────────────────────────────────────────────
    let kind = state.router.dispatch(raw).await?;
    info!("Federation event {} from {} handled", kind, domain);
    Ok(kind)
}

fn event_type_of(e: &InboundError) -> Option<&str> {
    match e {
        InboundError::Federation(inner) => inner.event_type(),
        _ => None,
    }
}
