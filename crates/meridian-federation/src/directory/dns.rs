//! DNS-published peer records.
//!
//! A server announces itself under its own domain:
//!
//! ```text
//! _meridian._tcp.chat.example.org.        SRV  0 0 443 meridian.chat.example.org.
//! meridian-public-key.chat.example.org.   TXT  "<base64url ed25519 public key>"
//! meridian-protocol.chat.example.org.     TXT  "https"        ; optional
//! ```

use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::{
    error::{ResolveError, ResolveErrorKind},
    TokioAsyncResolver,
};
use meridian_common::validation::normalize_domain;
use tracing::debug;
use url::Url;

use super::PeerDirectory;
use crate::{error::FederationError, keys::PeerPublicKey, types::PeerRecord};

/// Resolves peers from SRV and TXT records.
pub struct DnsDirectory {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsDirectory {
    pub fn new(resolver: TokioAsyncResolver, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    /// Use the host's resolver configuration (`/etc/resolv.conf` on Unix).
    pub fn from_system_conf(timeout: Duration) -> Result<Self, FederationError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| FederationError::DirectoryUnavailable("<system resolver>".into(), e.to_string()))?;
        Ok(Self::new(resolver, timeout))
    }

    async fn srv(&self, domain: &str) -> Result<Option<(String, u16)>, FederationError> {
        let name = format!("_meridian._tcp.{domain}.");
        let lookup = match self.resolver.srv_lookup(name).await {
            Ok(lookup) => lookup,
            Err(e) => return none_if_missing(domain, e),
        };
        // Lowest priority wins; weight is ignored, a single endpoint is enough.
        Ok(lookup
            .iter()
            .min_by_key(|srv| srv.priority())
            .map(|srv| (srv.target().to_utf8().trim_end_matches('.').to_owned(), srv.port())))
    }

    async fn txt(&self, domain: &str, label: &str) -> Result<Option<String>, FederationError> {
        let name = format!("{label}.{domain}.");
        let lookup = match self.resolver.txt_lookup(name).await {
            Ok(lookup) => lookup,
            Err(e) => return none_if_missing(domain, e),
        };
        Ok(lookup.iter().next().map(|txt| {
            txt.txt_data()
                .iter()
                .map(|chunk| String::from_utf8_lossy(chunk))
                .collect::<String>()
        }))
    }

    async fn resolve(&self, domain: &str) -> Result<PeerRecord, FederationError> {
        let srv = self.srv(domain).await?;
        let key = self.txt(domain, "meridian-public-key").await?;
        let protocol = self.txt(domain, "meridian-protocol").await?;
        peer_from_records(domain, srv, key, protocol)
    }
}

#[async_trait]
impl PeerDirectory for DnsDirectory {
    async fn lookup(&self, domain: &str) -> Result<PeerRecord, FederationError> {
        let domain = normalize_domain(domain);
        debug!("Directory (dns): resolving {}", domain);
        tokio::time::timeout(self.timeout, self.resolve(&domain))
            .await
            .map_err(|_| FederationError::DirectoryUnavailable(domain.clone(), "DNS lookup timed out".into()))?
    }
}

fn none_if_missing<T>(domain: &str, e: ResolveError) -> Result<Option<T>, FederationError> {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => Ok(None),
        _ => Err(FederationError::DirectoryUnavailable(domain.to_owned(), e.to_string())),
    }
}

/// Turn the raw record values into a peer record.
fn peer_from_records(
    domain: &str,
    srv: Option<(String, u16)>,
    public_key: Option<String>,
    protocol: Option<String>,
) -> Result<PeerRecord, FederationError> {
    let (Some((host, port)), Some(public_key)) = (srv, public_key) else {
        return Err(FederationError::UnknownPeer(domain.to_owned()));
    };
    let scheme = match protocol.as_deref().map(str::trim) {
        None | Some("https") => "https",
        Some("http") => "http",
        Some(other) => {
            return Err(FederationError::UnknownPeer(format!(
                "{domain} (unsupported protocol '{other}')"
            )));
        }
    };
    let public_key = PeerPublicKey::from_base64(&public_key)?;
    let endpoint = Url::parse(&format!("{scheme}://{host}:{port}"))
        .map_err(|e| FederationError::UnknownPeer(format!("{domain} (bad SRV target '{host}': {e})")))?;
    Ok(PeerRecord::new(domain, public_key, endpoint))
}
