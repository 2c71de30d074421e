use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use meridian_common::validation::normalize_domain;
use tracing::debug;

use super::PeerDirectory;
use crate::{error::FederationError, types::PeerRecord};

/// A fixed set of peers, optionally backed by another directory for
/// domains not in the set.
pub struct StaticDirectory {
    peers: HashMap<String, PeerRecord>,
    fallback: Option<Arc<dyn PeerDirectory>>,
}

impl StaticDirectory {
    pub fn new(peers: impl IntoIterator<Item = PeerRecord>) -> Self {
        let peers = peers
            .into_iter()
            .map(|record| (normalize_domain(&record.domain), record))
            .collect();
        Self { peers, fallback: None }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn PeerDirectory>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[async_trait]
impl PeerDirectory for StaticDirectory {
    async fn lookup(&self, domain: &str) -> Result<PeerRecord, FederationError> {
        if let Some(record) = self.peers.get(&normalize_domain(domain)) {
            debug!("Directory: {} is a pinned peer", domain);
            return Ok(record.clone());
        }
        match &self.fallback {
            Some(fallback) => fallback.lookup(domain).await,
            None => Err(FederationError::UnknownPeer(domain.to_owned())),
        }
    }

    async fn invalidate(&self, domain: &str) {
        if let Some(fallback) = &self.fallback {
            fallback.invalidate(domain).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyStore;
    use url::Url;

    fn record(domain: &str) -> PeerRecord {
        PeerRecord::new(
            domain,
            KeyStore::generate().public_key().clone(),
            Url::parse(&format!("https://{domain}")).unwrap(),
        )
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let directory = StaticDirectory::new([record("chat.example.org")]);
        assert!(directory.lookup("CHAT.example.org.").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_without_fallback() {
        let directory = StaticDirectory::new([record("chat.example.org")]);
        let err = directory.lookup("other.example.org").await.unwrap_err();
        assert!(matches!(err, FederationError::UnknownPeer(d) if d == "other.example.org"));
    }

    #[tokio::test]
    async fn falls_back_for_unpinned_domains() {
        let fallback: Arc<dyn PeerDirectory> = Arc::new(StaticDirectory::new([record("b.example")]));
        let directory = StaticDirectory::new([record("a.example")]).with_fallback(fallback);

        assert_eq!(directory.lookup("b.example").await.unwrap().domain, "b.example");
        assert!(directory.lookup("c.example").await.is_err());
    }
}
