//! Federation-specific error types.

use thiserror::Error;

/// Errors that can occur in federation operations.
#[derive(Debug, Error)]
pub enum FederationError {
    // ── Key management ──────────────────────────────────────────────────────

    #[error("Failed to load federation key: {0}")]
    KeyLoad(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    // ── Envelope ─────────────────────────────────────────────────────────────

    #[error("Envelope could not be decrypted with the local key")]
    DecryptionFailed,

    #[error("Envelope was not signed by the claimed sender")]
    AuthenticationFailed,

    #[error("Envelope was signed for '{0}', not this server")]
    Misdirected(String),

    #[error("Malformed event: {reason}")]
    MalformedEvent {
        /// Raw type code, when the event got far enough to carry one.
        event_type: Option<String>,
        reason: String,
    },

    #[error("Failed to seal envelope: {0}")]
    Seal(String),

    // ── Directory ────────────────────────────────────────────────────────────

    #[error("No trusted peer found for domain '{0}'")]
    UnknownPeer(String),

    #[error("Peer directory unavailable while resolving '{0}': {1}")]
    DirectoryUnavailable(String, String),

    // ── Dispatch ─────────────────────────────────────────────────────────────

    #[error("Invalid event:{0}")]
    UnsupportedEventType(String),

    #[error("Error handling event:{event_type} - {source}")]
    HandlerFailed {
        event_type: String,
        source: HandlerError,
    },

    #[error("No handler registered for event types: {0}")]
    IncompleteRouter(String),

    // ── Remote communication ─────────────────────────────────────────────────

    #[error("HTTP error communicating with remote server '{0}': {1}")]
    RemoteHttp(String, String),

    #[error("Remote server '{domain}' rejected the event ({error_type}): {message}")]
    RemoteRejected {
        domain: String,
        error_type: String,
        message: String,
    },

    // ── General ─────────────────────────────────────────────────────────────

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FederationError {
    pub(crate) fn malformed(event_type: Option<&str>, reason: impl ToString) -> Self {
        FederationError::MalformedEvent {
            event_type: event_type.map(str::to_owned),
            reason: reason.to_string(),
        }
    }

    /// Stable wire code reported to the remote peer as `errorType`.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::DecryptionFailed => "decrypt-failed",
            Self::AuthenticationFailed | Self::Misdirected(_) => "auth-failed",
            Self::MalformedEvent { .. } => "malformed-event",
            // A record whose key cannot be parsed is as good as no record.
            Self::UnknownPeer(_) | Self::InvalidPublicKey(_) => "unknown-peer",
            Self::DirectoryUnavailable(..) => "directory-unavailable",
            Self::UnsupportedEventType(_) => "unsupported-event-type",
            Self::HandlerFailed { .. } => "handler-failed",
            Self::RemoteRejected { .. } | Self::RemoteHttp(..) => "remote-error",
            Self::KeyLoad(_)
            | Self::Seal(_)
            | Self::IncompleteRouter(_)
            | Self::Serialisation(_)
            | Self::UrlParse(_)
            | Self::Other(_) => "internal-error",
        }
    }

    /// True for failures of either envelope layer.
    pub fn is_crypto_failure(&self) -> bool {
        matches!(self, Self::DecryptionFailed | Self::AuthenticationFailed | Self::Misdirected(_))
    }

    /// The event type code this error concerns, when known.
    pub fn event_type(&self) -> Option<&str> {
        match self {
            Self::MalformedEvent { event_type, .. } => event_type.as_deref(),
            Self::UnsupportedEventType(t) => Some(t),
            Self::HandlerFailed { event_type, .. } => Some(event_type),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FederationError {
    fn from(e: reqwest::Error) -> Self {
        let server = e.url().map(|u| u.host_str().unwrap_or("?").to_owned()).unwrap_or_default();
        FederationError::RemoteHttp(server, e.to_string())
    }
}

/// Failure reported by a domain event handler.
///
/// `code` is an optional machine-readable reason (e.g. `"room-not-found"`)
/// that is logged alongside the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub code: Option<String>,
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { code: None, message: message.into() }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: Some(code.into()), message: message.into() }
    }
}
