use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use meridian_common::validation::normalize_domain;
use tokio::{sync::RwLock, time::Instant};
use tracing::debug;

use super::PeerDirectory;
use crate::{error::FederationError, types::PeerRecord};

/// Default bound on cached records.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug)]
struct CacheEntry {
    record: PeerRecord,
    resolved_at: Instant,
}

/// TTL cache in front of another directory.
///
/// Only successful lookups are cached; `UnknownPeer` and outages always go
/// back to the inner directory. Readers never block each other.
///
/// Lookups are keyed by an unauthenticated header, so the map is bounded:
/// expired entries are swept on every insert, and at `max_entries` the
/// oldest record is evicted.
pub struct CachedDirectory {
    inner: Arc<dyn PeerDirectory>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl CachedDirectory {
    pub fn new(inner: Arc<dyn PeerDirectory>, ttl: Duration) -> Self {
        Self::with_max_entries(inner, ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(inner: Arc<dyn PeerDirectory>, ttl: Duration, max_entries: usize) -> Self {
        Self { inner, entries: RwLock::new(HashMap::new()), ttl, max_entries: max_entries.max(1) }
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl PeerDirectory for CachedDirectory {
    async fn lookup(&self, domain: &str) -> Result<PeerRecord, FederationError> {
        let key = normalize_domain(domain);

        // Check cache.
        {
            let cache = self.entries.read().await;
            if let Some(entry) = cache.get(&key) {
                if entry.resolved_at.elapsed() < self.ttl {
                    debug!("Directory cache hit: {}", key);
                    return Ok(entry.record.clone());
                }
            }
        }

        // Resolve.
        let record = self.inner.lookup(&key).await?;

        // Populate cache.
        let mut cache = self.entries.write().await;
        let ttl = self.ttl;
        cache.retain(|_, e| e.resolved_at.elapsed() < ttl);
        if cache.len() >= self.max_entries && !cache.contains_key(&key) {
            let oldest = cache.iter().min_by_key(|(_, e)| e.resolved_at).map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!("Directory cache full, evicting {}", oldest);
                cache.remove(&oldest);
            }
        }
        cache.insert(key, CacheEntry { record: record.clone(), resolved_at: Instant::now() });

        Ok(record)
    }

    async fn invalidate(&self, domain: &str) {
        let key = normalize_domain(domain);
        self.entries.write().await.remove(&key);
        self.inner.invalidate(&key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// Counts lookups; knows every domain except `stranger.*`.
    struct Counting {
        calls: AtomicUsize,
        record: PeerRecord,
    }

    impl Counting {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                record: PeerRecord::new(
                    "known.example",
                    KeyStore::generate().public_key().clone(),
                    Url::parse("https://known.example").unwrap(),
                ),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PeerDirectory for Counting {
        async fn lookup(&self, domain: &str) -> Result<PeerRecord, FederationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if domain.starts_with("stranger.") {
                Err(FederationError::UnknownPeer(domain.to_owned()))
            } else {
                Ok(self.record.clone())
            }
        }
    }

    #[tokio::test]
    async fn hits_are_served_from_cache() {
        let inner = Counting::new();
        let cache = CachedDirectory::new(inner.clone(), Duration::from_secs(60));

        cache.lookup("known.example").await.unwrap();
        cache.lookup("Known.Example").await.unwrap();
        assert_eq!(inner.calls(), 1);
        assert_eq!(cache.entry_count().await, 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let inner = Counting::new();
        let cache = CachedDirectory::new(inner.clone(), Duration::from_secs(60));

        assert!(cache.lookup("stranger.example").await.is_err());
        assert!(cache.lookup("stranger.example").await.is_err());
        assert_eq!(inner.calls(), 2);
        assert_eq!(cache.entry_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let inner = Counting::new();
        let cache = CachedDirectory::new(inner.clone(), Duration::from_secs(60));

        cache.lookup("known.example").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.lookup("known.example").await.unwrap();
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_swept_on_insert() {
        let inner = Counting::new();
        let cache = CachedDirectory::new(inner.clone(), Duration::from_secs(60));

        for i in 0..5 {
            cache.lookup(&format!("sub{i}.wild.example")).await.unwrap();
        }
        assert_eq!(cache.entry_count().await, 5);

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.lookup("known.example").await.unwrap();
        assert_eq!(cache.entry_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_evicts_the_oldest_entry() {
        let inner = Counting::new();
        let cache = CachedDirectory::with_max_entries(inner.clone(), Duration::from_secs(3600), 3);

        for i in 0..3 {
            cache.lookup(&format!("sub{i}.wild.example")).await.unwrap();
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        cache.lookup("sub3.wild.example").await.unwrap();
        assert_eq!(cache.entry_count().await, 3);

        // sub0 went out; sub1 is still served from cache.
        let before = inner.calls();
        cache.lookup("sub1.wild.example").await.unwrap();
        assert_eq!(inner.calls(), before);
        cache.lookup("sub0.wild.example").await.unwrap();
        assert_eq!(inner.calls(), before + 1);
    }

    #[tokio::test]
    async fn invalidate_forces_re_resolution() {
        let inner = Counting::new();
        let cache = CachedDirectory::new(inner.clone(), Duration::from_secs(60));

        cache.lookup("known.example").await.unwrap();
        cache.invalidate("known.example").await;
        cache.lookup("known.example").await.unwrap();
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_readers_share_one_entry() {
        let inner = Counting::new();
        let cache = Arc::new(CachedDirectory::new(inner.clone(), Duration::from_secs(60)));
        cache.lookup("known.example").await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.lookup("known.example").await.map(|r| r.domain) })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "known.example");
        }
        assert_eq!(inner.calls(), 1);
    }
}
