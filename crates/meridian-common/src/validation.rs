//! Input validation utilities.
//!
//! Centralized checks for values that arrive from configuration or from
//! remote peers before they are used as lookup keys.

/// Longest hostname allowed by DNS (RFC 1035).
const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Domain cannot be empty")]
    EmptyDomain,

    #[error("Domain '{0}' is too long")]
    DomainTooLong(String),

    #[error("Domain '{0}' contains an invalid label")]
    InvalidLabel(String),
}

/// Validate that a string is a plausible federation domain (`host` or `host:port`).
///
/// This is a syntactic check only. Whether anyone actually answers for the
/// domain is the peer directory's business.
pub fn validate_domain(domain: &str) -> Result<(), ValidationError> {
    if domain.trim().is_empty() {
        return Err(ValidationError::EmptyDomain);
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(ValidationError::DomainTooLong(domain.to_owned()));
    }

    let host = match domain.rsplit_once(':') {
        Some((host, port)) => {
            if port.parse::<u16>().is_err() {
                return Err(ValidationError::InvalidLabel(domain.to_owned()));
            }
            host
        }
        None => domain,
    };

    let valid = host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    if !valid {
        return Err(ValidationError::InvalidLabel(domain.to_owned()));
    }

    Ok(())
}

/// Normalise a domain for use as a map key (trimmed, lowercase, no trailing dot).
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}
