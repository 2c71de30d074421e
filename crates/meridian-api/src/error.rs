//! Inbound request failures and their JSON response shape.
//!
//! Every failure of the inbound pipeline becomes a
//! `{ success: false, message, errorType }` body. Details that would tell a
//! remote peer more than it needs (which crypto layer failed, internal
//! errors) stay in the local log.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use meridian_federation::{FederationError, FederationResponse};

/// Message sent for either envelope layer failing.
const CRYPTO_FAILURE_MESSAGE: &str = "Cannot handle that request";

/// Message sent for a body that is not JSON; the parser error is only logged.
const UNREADABLE_BODY_MESSAGE: &str = "Payload could not be read";

#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error("Payload was not sent")]
    MissingPayload,

    #[error("Payload could not be read: {0}")]
    UnreadableBody(String),

    #[error("Domain was not sent")]
    MissingDomainHeader,

    #[error("Request was not processed within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Federation(#[from] FederationError),
}

impl InboundError {
    /// Stable wire code for `errorType`.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MissingPayload | Self::UnreadableBody(_) => "missing-payload",
            Self::MissingDomainHeader => "missing-domain-header",
            Self::Timeout(_) => "request-timeout",
            Self::Federation(e) => e.error_type(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Federation(FederationError::DirectoryUnavailable(..)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Federation(e) if e.error_type() == "internal-error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Collapse the two crypto failure kinds into `decrypt-failed` unless
    /// the operator asked to expose them.
    pub fn masked(self, expose_crypto_failure_kind: bool) -> Self {
        match self {
            Self::Federation(FederationError::AuthenticationFailed | FederationError::Misdirected(_))
                if !expose_crypto_failure_kind =>
            {
                Self::Federation(FederationError::DecryptionFailed)
            }
            other => other,
        }
    }

    /// The short message the remote peer sees.
    fn public_message(&self) -> String {
        match self {
            Self::Federation(e) => match e {
                FederationError::DecryptionFailed
                | FederationError::AuthenticationFailed
                | FederationError::Misdirected(_) => CRYPTO_FAILURE_MESSAGE.to_owned(),
                FederationError::UnknownPeer(_) | FederationError::InvalidPublicKey(_) => {
                    "Could not find valid peer".to_owned()
                }
                FederationError::DirectoryUnavailable(..) => {
                    "Peer directory unavailable, try again later".to_owned()
                }
                FederationError::MalformedEvent { event_type: Some(t), reason } => {
                    format!("Malformed event:{t} - {reason}")
                }
                FederationError::MalformedEvent { event_type: None, .. } => "Malformed event".to_owned(),
                FederationError::UnsupportedEventType(_) | FederationError::HandlerFailed { .. } => {
                    e.to_string()
                }
                _ => {
                    tracing::error!("Internal federation error: {e}");
                    "An internal error occurred".to_owned()
                }
            },
            Self::UnreadableBody(_) => UNREADABLE_BODY_MESSAGE.to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for InboundError {
    fn into_response(self) -> Response {
        let body = FederationResponse::failure(self.error_type(), self.public_message());
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_federation::HandlerError;

    fn body(err: InboundError) -> FederationResponse {
        FederationResponse::failure(err.error_type(), err.public_message())
    }

    #[test]
    fn auth_failure_is_masked_by_default() {
        let err = InboundError::from(FederationError::AuthenticationFailed).masked(false);
        assert_eq!(err.error_type(), "decrypt-failed");
        assert_eq!(body(err).message.as_deref(), Some(CRYPTO_FAILURE_MESSAGE));
    }

    #[test]
    fn auth_failure_can_be_exposed() {
        let err = InboundError::from(FederationError::AuthenticationFailed).masked(true);
        assert_eq!(err.error_type(), "auth-failed");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn misdirected_envelope_is_masked_like_auth_failure() {
        let err = InboundError::from(FederationError::Misdirected("other.example".into()));
        assert_eq!(err.error_type(), "auth-failed");

        let masked = err.masked(false);
        assert_eq!(masked.error_type(), "decrypt-failed");
        assert_eq!(body(masked).message.as_deref(), Some(CRYPTO_FAILURE_MESSAGE));
    }

    #[test]
    fn unreadable_body_keeps_parser_detail_local() {
        let err = InboundError::UnreadableBody("expected value at line 1 column 2".into());
        assert!(err.to_string().contains("line 1 column 2"));
        assert_eq!(err.error_type(), "missing-payload");
        assert_eq!(body(err).message.as_deref(), Some(UNREADABLE_BODY_MESSAGE));
    }

    #[test]
    fn handler_failure_carries_type_and_cause() {
        let err = InboundError::from(FederationError::HandlerFailed {
            event_type: "usj".into(),
            source: HandlerError::new("room is archived"),
        });
        assert_eq!(err.error_type(), "handler-failed");
        assert_eq!(body(err).message.as_deref(), Some("Error handling event:usj - room is archived"));
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = InboundError::from(FederationError::Seal("rng exploded".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(err).message.as_deref(), Some("An internal error occurred"));
    }

    #[test]
    fn outage_is_retryable() {
        let err = InboundError::from(FederationError::DirectoryUnavailable("a.example".into(), "refused".into()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_type(), "directory-unavailable");
    }
}
