//! Server identity keys and the four envelope primitives.
//!
//! Each Meridian server holds a single Ed25519 key pair. The public half is
//! its federation identity: peers publish it via DNS or the hub, and every
//! envelope claiming to come from that server must verify against it.
//!
//! The same key material serves both envelope layers:
//!
//! - **sign-encrypt / verify-decrypt** — an Ed25519 signature over the
//!   plaintext, prepended to it. Only the private-key holder can produce a
//!   blob that verifies under the public key.
//! - **encrypt / decrypt** — ephemeral X25519 Diffie-Hellman against the
//!   recipient's key (converted Edwards → Montgomery), HKDF-SHA256, then
//!   XChaCha20-Poly1305. Only the recipient's private key can open it.
//!
//! # Wire layouts
//!
//! ```text
//! signed    = signature (64) || plaintext
//! encrypted = version (1) || ephemeral_pk (32) || nonce (24) || ciphertext+tag
//! ```

use std::fmt;

use base64::Engine as _;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, SIGNATURE_LENGTH};
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519Secret};

use crate::error::FederationError;

/// Current version byte of the confidentiality layer.
const ENCRYPTION_VERSION: u8 = 1;
const EPHEMERAL_PK_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const ENCRYPTED_HEADER_LEN: usize = 1 + EPHEMERAL_PK_LEN + NONCE_LEN;

/// HKDF info string for domain separation.
const HKDF_INFO: &[u8] = b"meridian-federation-envelope-xchacha20poly1305-v1";
/// Prefix mixed into every signature so envelope signatures cannot be
/// confused with signatures made for any other purpose.
const SIGNING_CONTEXT: &[u8] = b"meridian-federation-envelope-v1";

// ─── Local key store ─────────────────────────────────────────────────────────

/// This server's key pair.
///
/// Immutable after construction and safe to share across requests via `Arc`.
pub struct KeyStore {
    /// Short fingerprint in the format `ed25519:<12-char-hex>`, for logs.
    key_id: String,
    signing_key: SigningKey,
    exchange_secret: X25519Secret,
    public: PeerPublicKey,
}

impl KeyStore {
    /// Generate a brand-new random key pair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Reconstruct a `KeyStore` from the raw 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, FederationError> {
        let bytes: [u8; 32] = seed
            .try_into()
            .map_err(|_| FederationError::KeyLoad("seed must be exactly 32 bytes".into()))?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes)))
    }

    /// Reconstruct a `KeyStore` from a base64url-encoded seed (as stored on disk).
    pub fn from_seed_base64(encoded: &str) -> Result<Self, FederationError> {
        let seed = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| FederationError::KeyLoad("seed is not valid base64url".into()))?;
        Self::from_seed(&seed)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let exchange_secret = X25519Secret::from(ed25519_to_x25519_secret(&signing_key.to_bytes()));
        // The X25519 public key of the derived secret is the Montgomery form of the Ed25519 key.
        let public = PeerPublicKey {
            verifying_key: signing_key.verifying_key(),
            exchange_key: X25519PublicKey::from(&exchange_secret),
        };
        let key_id = derive_key_id(signing_key.verifying_key().as_bytes());
        Self { key_id, signing_key, exchange_secret, public }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Return the 32-byte seed for persistence.
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn seed_base64(&self) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.seed_bytes())
    }

    /// The public half, as a peer would see it.
    pub fn public_key(&self) -> &PeerPublicKey {
        &self.public
    }

    /// Base64url-encoded public key, as published to peers.
    pub fn public_key_base64(&self) -> String {
        self.public.to_base64()
    }

    /// Authenticate `plaintext` as coming from this server.
    pub fn sign_encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let signature = self.signing_key.sign(&signing_input(plaintext));
        let mut out = Vec::with_capacity(SIGNATURE_LENGTH + plaintext.len());
        out.extend_from_slice(&signature.to_bytes());
        out.extend_from_slice(plaintext);
        out
    }

    /// Remove the confidentiality layer of a blob encrypted for this server.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, FederationError> {
        if blob.len() < ENCRYPTED_HEADER_LEN + TAG_LEN || blob[0] != ENCRYPTION_VERSION {
            return Err(FederationError::DecryptionFailed);
        }

        let mut ephemeral = [0u8; EPHEMERAL_PK_LEN];
        ephemeral.copy_from_slice(&blob[1..1 + EPHEMERAL_PK_LEN]);
        let nonce = XNonce::from_slice(&blob[1 + EPHEMERAL_PK_LEN..ENCRYPTED_HEADER_LEN]);
        let ciphertext = &blob[ENCRYPTED_HEADER_LEN..];

        let ephemeral_pk = X25519PublicKey::from(ephemeral);
        let shared = self.exchange_secret.diffie_hellman(&ephemeral_pk);
        let key = derive_key(shared.as_bytes(), &ephemeral, self.public.exchange_key.as_bytes())
            .map_err(|_| FederationError::DecryptionFailed)?;

        XChaCha20Poly1305::new(&key.into())
            .decrypt(nonce, ciphertext)
            .map_err(|_| FederationError::DecryptionFailed)
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

// ─── Peer public key ─────────────────────────────────────────────────────────

/// A remote server's public key, validated and pre-converted for both layers.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerPublicKey {
    verifying_key: VerifyingKey,
    exchange_key: X25519PublicKey,
}

impl PeerPublicKey {
    /// Parse a base64url-encoded 32-byte Ed25519 public key.
    pub fn from_base64(encoded: &str) -> Result<Self, FederationError> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| FederationError::InvalidPublicKey("not valid base64url".into()))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| FederationError::InvalidPublicKey("expected 32 bytes".into()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, FederationError> {
        let verifying_key = VerifyingKey::from_bytes(bytes)
            .map_err(|_| FederationError::InvalidPublicKey("not a valid Ed25519 point".into()))?;
        if verifying_key.is_weak() {
            return Err(FederationError::InvalidPublicKey("weak Ed25519 key".into()));
        }
        let exchange_key = X25519PublicKey::from(ed25519_to_x25519_public(bytes)?);
        Ok(Self { verifying_key, exchange_key })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.verifying_key.as_bytes()
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.verifying_key.as_bytes())
    }

    /// Check that `blob` was produced by [`KeyStore::sign_encrypt`] with the
    /// matching private key, and return the authenticated plaintext.
    pub fn verify_decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, FederationError> {
        if blob.len() < SIGNATURE_LENGTH {
            return Err(FederationError::AuthenticationFailed);
        }
        let (sig_bytes, plaintext) = blob.split_at(SIGNATURE_LENGTH);
        let sig_bytes: [u8; SIGNATURE_LENGTH] = sig_bytes
            .try_into()
            .map_err(|_| FederationError::AuthenticationFailed)?;
        let signature = Signature::from_bytes(&sig_bytes);

        self.verifying_key
            .verify_strict(&signing_input(plaintext), &signature)
            .map_err(|_| FederationError::AuthenticationFailed)?;
        Ok(plaintext.to_vec())
    }

    /// Encrypt `plaintext` so only the holder of this key's private half can read it.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, FederationError> {
        let ephemeral_secret = X25519Secret::random_from_rng(OsRng);
        let ephemeral_pk = X25519PublicKey::from(&ephemeral_secret);
        let shared = ephemeral_secret.diffie_hellman(&self.exchange_key);
        let key = derive_key(shared.as_bytes(), ephemeral_pk.as_bytes(), self.exchange_key.as_bytes())
            .map_err(|e| FederationError::Seal(format!("key derivation failed: {e}")))?;

        // Random 24-byte nonce (safe for random generation with XChaCha20)
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = XChaCha20Poly1305::new(&key.into())
            .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| FederationError::Seal(format!("encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(ENCRYPTED_HEADER_LEN + ciphertext.len());
        out.push(ENCRYPTION_VERSION);
        out.extend_from_slice(ephemeral_pk.as_bytes());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }
}

impl fmt::Debug for PeerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PeerPublicKey").field(&self.to_base64()).finish()
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Derive a stable key ID from raw public key bytes.
///
/// Uses the first 6 bytes of the pubkey as a short hex fingerprint.
fn derive_key_id(pubkey_bytes: &[u8]) -> String {
    let fingerprint = hex::encode(&pubkey_bytes[..6]);
    format!("ed25519:{}", fingerprint)
}

fn signing_input(plaintext: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(SIGNING_CONTEXT.len() + plaintext.len());
    input.extend_from_slice(SIGNING_CONTEXT);
    input.extend_from_slice(plaintext);
    input
}

/// Derive the AEAD key from a DH shared secret, bound to both public keys.
fn derive_key(
    shared_secret: &[u8; 32],
    ephemeral_pk: &[u8; 32],
    recipient_pk: &[u8; 32],
) -> Result<[u8; 32], hkdf::InvalidLength> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_pk);
    salt[32..].copy_from_slice(recipient_pk);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut key = [0u8; 32];
    hkdf.expand(HKDF_INFO, &mut key)?;
    Ok(key)
}

/// Convert an Ed25519 public key to an X25519 public key (Edwards → Montgomery).
fn ed25519_to_x25519_public(ed25519_pk: &[u8; 32]) -> Result<[u8; 32], FederationError> {
    let edwards = CompressedEdwardsY(*ed25519_pk)
        .decompress()
        .ok_or_else(|| FederationError::InvalidPublicKey("decompression failed".into()))?;
    Ok(edwards.to_montgomery().to_bytes())
}

/// Convert an Ed25519 seed to the matching X25519 secret: SHA-512(seed), first 32 bytes, clamped.
fn ed25519_to_x25519_secret(ed25519_seed: &[u8; 32]) -> [u8; 32] {
    let hash = Sha512::digest(ed25519_seed);
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&hash[..32]);
    secret[0] &= 248;
    secret[31] &= 127;
    secret[31] |= 64;
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let kp = KeyStore::generate();
        let blob = kp.sign_encrypt(b"hello meridian federation");
        let plain = kp.public_key().verify_decrypt(&blob).expect("signature should verify");
        assert_eq!(plain, b"hello meridian federation");
    }

    #[test]
    fn verify_with_other_key_fails() {
        let a = KeyStore::generate();
        let b = KeyStore::generate();
        let blob = a.sign_encrypt(b"payload");
        assert!(matches!(
            b.public_key().verify_decrypt(&blob),
            Err(FederationError::AuthenticationFailed)
        ));
    }

    #[test]
    fn truncated_signed_blob_fails() {
        let kp = KeyStore::generate();
        assert!(kp.public_key().verify_decrypt(&[0u8; 10]).is_err());
    }

    #[test]
    fn encrypt_then_decrypt() {
        let kp = KeyStore::generate();
        let blob = kp.public_key().encrypt(b"secret").unwrap();
        assert_eq!(kp.decrypt(&blob).unwrap(), b"secret");
    }

    #[test]
    fn encrypt_empty_payload() {
        let kp = KeyStore::generate();
        let blob = kp.public_key().encrypt(b"").unwrap();
        assert_eq!(kp.decrypt(&blob).unwrap(), b"");
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let recipient = KeyStore::generate();
        let other = KeyStore::generate();
        let blob = recipient.public_key().encrypt(b"secret").unwrap();
        assert!(matches!(other.decrypt(&blob), Err(FederationError::DecryptionFailed)));
    }

    #[test]
    fn encryptions_are_randomised() {
        let kp = KeyStore::generate();
        let e1 = kp.public_key().encrypt(b"same message").unwrap();
        let e2 = kp.public_key().encrypt(b"same message").unwrap();
        assert_ne!(e1, e2);
    }

    #[test]
    fn unknown_version_byte_fails() {
        let kp = KeyStore::generate();
        let mut blob = kp.public_key().encrypt(b"secret").unwrap();
        blob[0] = 2;
        assert!(matches!(kp.decrypt(&blob), Err(FederationError::DecryptionFailed)));
    }

    #[test]
    fn seed_round_trip_is_stable() {
        let kp1 = KeyStore::generate();
        let kp2 = KeyStore::from_seed_base64(&kp1.seed_base64()).unwrap();
        assert_eq!(kp1.key_id(), kp2.key_id());
        assert_eq!(kp1.public_key_base64(), kp2.public_key_base64());
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn public_key_base64_round_trip() {
        let kp = KeyStore::generate();
        let parsed = PeerPublicKey::from_base64(&kp.public_key_base64()).unwrap();
        assert_eq!(&parsed, kp.public_key());
        assert!(kp.key_id().starts_with("ed25519:"));
    }

    #[test]
    fn rejects_bad_public_keys() {
        assert!(PeerPublicKey::from_base64("not base64!").is_err());
        assert!(PeerPublicKey::from_base64("AAAA").is_err());
        // The identity point is a weak key.
        let mut identity = [0u8; 32];
        identity[0] = 1;
        assert!(PeerPublicKey::from_bytes(&identity).is_err());
    }

    #[test]
    fn bad_seed_length_is_rejected() {
        assert!(matches!(KeyStore::from_seed(&[1u8; 16]), Err(FederationError::KeyLoad(_))));
    }
}
