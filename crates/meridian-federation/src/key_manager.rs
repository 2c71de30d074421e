//! File-backed server key provisioning.
//!
//! On startup, `KeyManager::load_or_generate` reads the base64url-encoded
//! Ed25519 seed from the configured key file. If the file does not exist
//! (first run), it generates a fresh key pair, writes it, and returns it.
//!
//! # Key rotation
//! Delete or replace the key file and restart. Peers must pick up the new
//! public key from DNS or the hub before envelopes from this server verify again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::{error::FederationError, keys::KeyStore};

/// Loads or provisions this server's key pair from a file on disk.
pub struct KeyManager {
    path: PathBuf,
}

impl KeyManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return this server's `KeyStore`.
    ///
    /// Steps:
    /// 1. If the key file exists, decode the seed and return it.
    /// 2. Otherwise generate a new pair, persist the seed, and return it.
    pub async fn load_or_generate(&self) -> Result<Arc<KeyStore>, FederationError> {
        // ── 1. Try loading from disk ─────────────────────────────────────────
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let keys = KeyStore::from_seed_base64(&contents)?;
                info!("Federation: loaded signing key {} from {}", keys.key_id(), self.path.display());
                return Ok(Arc::new(keys));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(FederationError::KeyLoad(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        }

        // ── 2. Nothing found — generate + persist ────────────────────────────
        warn!("No federation key at {} — generating a new Ed25519 key pair", self.path.display());

        let keys = KeyStore::generate();
        write_key_file(&self.path, &keys).await?;

        info!("Federation: generated and persisted new signing key {}", keys.key_id());
        Ok(Arc::new(keys))
    }
}

/// Write the seed of `keys` to `path`, creating parent directories.
/// On Unix the file is created with mode `0600`, so the seed is never
/// readable by others, not even briefly.
pub async fn write_key_file(path: &Path, keys: &KeyStore) -> Result<(), FederationError> {
    use tokio::io::AsyncWriteExt;

    let io_err = |e: std::io::Error| FederationError::KeyLoad(format!("cannot write {}: {e}", path.display()));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await.map_err(io_err)?;

    // An overwritten file keeps its old mode; tighten it before writing.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).await.map_err(io_err)?;
    }

    file.write_all(keys.seed_base64().as_bytes()).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    Ok(())
}
