//! Peer directory — resolves a remote domain to its public key and endpoint.
//!
//! Resolution order:
//!
//! 1. **Pinned peers** from configuration ([`StaticDirectory`]).
//! 2. **Cache** of earlier successful lookups ([`CachedDirectory`]).
//! 3. **Discovery method**: DNS SRV/TXT records ([`DnsDirectory`]) or the
//!    central hub registry ([`HubDirectory`]).
//!
//! The directory only supplies key material; whether an envelope really came
//! from that key is checked by [`Envelope::open`](crate::envelope::Envelope::open).

mod cache;
mod dns;
mod hub;
mod pinned;

use std::sync::Arc;

use async_trait::async_trait;
use meridian_common::config::{DiscoveryMethod, FederationConfig, PinnedPeer};
use url::Url;

use crate::{error::FederationError, keys::PeerPublicKey, types::PeerRecord};

pub use cache::CachedDirectory;
pub use dns::DnsDirectory;
pub use hub::{HubDirectory, HubPeer};
pub use pinned::StaticDirectory;

/// Resolves a peer domain to a [`PeerRecord`].
///
/// Implementations must return `UnknownPeer` when the domain has no trusted
/// record and `DirectoryUnavailable` when the resolution service itself
/// failed, so callers can tell "not trusted" from "try again later".
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    async fn lookup(&self, domain: &str) -> Result<PeerRecord, FederationError>;

    /// Drop any cached record for `domain` (e.g. after a delivery failure).
    async fn invalidate(&self, _domain: &str) {}
}

#[async_trait]
impl<D: PeerDirectory + ?Sized> PeerDirectory for Arc<D> {
    async fn lookup(&self, domain: &str) -> Result<PeerRecord, FederationError> {
        (**self).lookup(domain).await
    }

    async fn invalidate(&self, domain: &str) {
        (**self).invalidate(domain).await
    }
}

/// Build the directory stack described by `config`.
pub fn build_directory(config: &FederationConfig) -> Result<Arc<dyn PeerDirectory>, FederationError> {
    let strategy: Arc<dyn PeerDirectory> = match config.discovery_method {
        DiscoveryMethod::Dns => Arc::new(DnsDirectory::from_system_conf(config.lookup_timeout())?),
        DiscoveryMethod::Hub => {
            Arc::new(HubDirectory::new(Url::parse(&config.hub_url)?, config.lookup_timeout())?)
        }
    };
    let cached = CachedDirectory::new(strategy, config.peer_cache_ttl());

    let pinned = config
        .peers
        .iter()
        .map(pinned_record)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Arc::new(StaticDirectory::new(pinned).with_fallback(Arc::new(cached))))
}

fn pinned_record(peer: &PinnedPeer) -> Result<PeerRecord, FederationError> {
    let public_key = PeerPublicKey::from_base64(&peer.public_key).map_err(|e| {
        FederationError::InvalidPublicKey(format!("pinned peer '{}': {e}", peer.domain))
    })?;
    Ok(PeerRecord::new(peer.domain.clone(), public_key, Url::parse(&peer.endpoint)?))
}
