//! Central hub registry.
//!
//! `GET  <hub>/api/v1/peers?search=<domain>` → `{ "peers": [{ domain, url, public_key }] }`
//! `POST <hub>/api/v1/peers` with one `HubPeer` registers this server.

use std::time::Duration;

use async_trait::async_trait;
use meridian_common::validation::normalize_domain;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::PeerDirectory;
use crate::{error::FederationError, keys::PeerPublicKey, types::{join_path, PeerRecord}};

const PEERS_PATH: &str = "/api/v1/peers";

/// A peer entry as stored by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubPeer {
    pub domain: String,
    pub url: String,
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    peers: Vec<HubPeer>,
}

/// Looks peers up in (and registers with) a hub.
pub struct HubDirectory {
    hub: Url,
    http: Client,
}

impl HubDirectory {
    pub fn new(hub: Url, timeout: Duration) -> Result<Self, FederationError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("Meridian-Federation/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { hub, http })
    }

    pub fn hub_url(&self) -> &Url {
        &self.hub
    }

    /// Publish this server's record so other hub users can find it.
    pub async fn register(&self, peer: &HubPeer) -> Result<(), FederationError> {
        let url = join_path(&self.hub, PEERS_PATH)?;
        debug!("Hub register {} at {}", peer.domain, url);
        self.http
            .post(url)
            .json(peer)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| FederationError::RemoteHttp(self.hub_host(), e.to_string()))?;
        info!("Registered {} with hub {}", peer.domain, self.hub);
        Ok(())
    }

    fn hub_host(&self) -> String {
        self.hub.host_str().unwrap_or("?").to_owned()
    }

    async fn search(&self, domain: &str) -> Result<Vec<HubPeer>, FederationError> {
        let mut url = join_path(&self.hub, PEERS_PATH)?;
        url.query_pairs_mut().append_pair("search", domain);

        let unavailable = |e: reqwest::Error| FederationError::DirectoryUnavailable(domain.to_owned(), e.to_string());
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;
        let body: SearchResponse = resp.json().await.map_err(unavailable)?;
        Ok(body.peers)
    }
}

#[async_trait]
impl PeerDirectory for HubDirectory {
    async fn lookup(&self, domain: &str) -> Result<PeerRecord, FederationError> {
        let domain = normalize_domain(domain);
        debug!("Directory (hub): resolving {}", domain);

        // The hub search is fuzzy; only an exact domain match is trusted.
        let peer = self
            .search(&domain)
            .await?
            .into_iter()
            .find(|p| normalize_domain(&p.domain) == domain)
            .ok_or_else(|| FederationError::UnknownPeer(domain.clone()))?;

        let public_key = PeerPublicKey::from_base64(&peer.public_key)?;
        // A listing we cannot use is treated like no listing.
        let endpoint = Url::parse(&peer.url)
            .map_err(|e| FederationError::UnknownPeer(format!("{domain} (bad endpoint '{}': {e})", peer.url)))?;
        Ok(PeerRecord::new(domain, public_key, endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyStore;
    use axum::{
        extract::{Query, State},
        http::StatusCode,
        routing::get,
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Registry = Arc<Mutex<Vec<HubPeer>>>;

    async fn search(
        State(registry): State<Registry>,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        let term = q.get("search").cloned().unwrap_or_default();
        let peers: Vec<HubPeer> = registry
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.domain.contains(&term))
            .cloned()
            .collect();
        Json(serde_json::json!({ "peers": peers }))
    }

    async fn register(State(registry): State<Registry>, Json(peer): Json<HubPeer>) -> StatusCode {
        registry.lock().unwrap().push(peer);
        StatusCode::CREATED
    }

    async fn spawn_hub(registry: Registry) -> Url {
        let app = Router::new()
            .route(PEERS_PATH, get(search).post(register))
            .with_state(registry);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    fn peer(domain: &str, keys: &KeyStore) -> HubPeer {
        HubPeer {
            domain: domain.into(),
            url: format!("https://{domain}"),
            public_key: keys.public_key_base64(),
        }
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let hub_url = spawn_hub(Registry::default()).await;
        let hub = HubDirectory::new(hub_url, Duration::from_secs(5)).unwrap();
        let keys = KeyStore::generate();

        hub.register(&peer("chat.example.org", &keys)).await.unwrap();
        let record = hub.lookup("chat.example.org").await.unwrap();
        assert_eq!(&record.public_key, keys.public_key());
        assert_eq!(record.endpoint.as_str(), "https://chat.example.org/");
    }

    #[tokio::test]
    async fn partial_matches_are_not_trusted() {
        let registry = Registry::default();
        registry.lock().unwrap().push(peer("evilchat.example.org", &KeyStore::generate()));
        let hub = HubDirectory::new(spawn_hub(registry).await, Duration::from_secs(5)).unwrap();

        let err = hub.lookup("chat.example.org").await.unwrap_err();
        assert!(matches!(err, FederationError::UnknownPeer(_)));
    }

    #[tokio::test]
    async fn unusable_listing_url_is_unknown_peer() {
        let registry = Registry::default();
        let mut listing = peer("chat.example.org", &KeyStore::generate());
        listing.url = "not a url".into();
        registry.lock().unwrap().push(listing);
        let hub = HubDirectory::new(spawn_hub(registry).await, Duration::from_secs(5)).unwrap();

        let err = hub.lookup("chat.example.org").await.unwrap_err();
        assert!(matches!(err, FederationError::UnknownPeer(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unreachable_hub_is_unavailable_not_unknown() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let hub = HubDirectory::new(Url::parse(&format!("http://{addr}")).unwrap(), Duration::from_secs(2)).unwrap();
        let err = hub.lookup("chat.example.org").await.unwrap_err();
        assert_eq!(err.error_type(), "directory-unavailable");
    }
}
