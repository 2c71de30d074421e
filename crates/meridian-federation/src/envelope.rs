//! The double-layer envelope every federation event travels in.
//!
//! Sealing signs the canonical JSON of the event with the sender's key and
//! then encrypts the signed blob for the recipient. Opening unwinds the two
//! layers in reverse: decrypt with the local key, then verify against the
//! claimed sender's key, then parse.
//!
//! The signed document names the destination domain. A peer that strips its
//! own encryption layer and re-encrypts the signed blob for a third server
//! gets the envelope rejected there as misdirected.
//!
//! A failure of either layer is reported as its own error variant so local
//! logs can tell them apart; what the remote peer is told is decided at the
//! transport boundary.

use meridian_common::validation::normalize_domain;
use tracing::debug;

use crate::{
    canonical::to_canonical_vec,
    error::FederationError,
    events::{EventDocument, FederationEvent, RawEvent},
    keys::{KeyStore, PeerPublicKey},
};

/// An event in transit between two servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Domain the envelope claims to come from (the `x-federation-domain` header).
    pub sender_domain: String,
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    pub fn new(sender_domain: impl Into<String>, ciphertext: Vec<u8>) -> Self {
        Self { sender_domain: sender_domain.into(), ciphertext }
    }

    /// Seal a typed event for the server at `destination` holding `recipient`.
    /// The sender domain is the event's origin.
    pub fn seal(
        event: &FederationEvent,
        local: &KeyStore,
        destination: &str,
        recipient: &PeerPublicKey,
    ) -> Result<Self, FederationError> {
        Self::seal_raw(&event.to_raw()?, local, destination, recipient)
    }

    /// Seal an already-encoded event. The type code is not checked.
    pub fn seal_raw(
        event: &RawEvent,
        local: &KeyStore,
        destination: &str,
        recipient: &PeerPublicKey,
    ) -> Result<Self, FederationError> {
        let document = EventDocument { destination: normalize_domain(destination), event: Some(event) };
        let plaintext = to_canonical_vec(&document)?;
        let signed = local.sign_encrypt(&plaintext);
        let ciphertext = recipient.encrypt(&signed)?;
        debug!(
            "Sealed event {} ({}) for {}: {} bytes",
            event.id,
            event.t,
            document.destination,
            ciphertext.len()
        );
        Ok(Self { sender_domain: event.origin.clone(), ciphertext })
    }

    /// Open the envelope with the local key and the claimed sender's public key.
    /// `local_domain` must be the destination the sender signed for.
    ///
    /// Returns the event with its type code still unchecked; see
    /// [`RawEvent::decode`].
    pub fn open(
        &self,
        sender: &PeerPublicKey,
        local: &KeyStore,
        local_domain: &str,
    ) -> Result<RawEvent, FederationError> {
        let signed = local.decrypt(&self.ciphertext)?;
        let plaintext = sender.verify_decrypt(&signed)?;

        let document: EventDocument<RawEvent> = serde_json::from_slice(&plaintext)
            .map_err(|e| FederationError::malformed(None, e))?;
        if normalize_domain(&document.destination) != normalize_domain(local_domain) {
            return Err(FederationError::Misdirected(document.destination));
        }
        let event = document
            .event
            .ok_or_else(|| FederationError::malformed(None, "document has no event"))?;

        if normalize_domain(&event.origin) != normalize_domain(&self.sender_domain) {
            return Err(FederationError::malformed(
                Some(&event.t),
                format!(
                    "event origin '{}' does not match sender domain '{}'",
                    event.origin, self.sender_domain
                ),
            ));
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::fixtures::message_created;
    use serde_json::json;
    use uuid::Uuid;

    const BOB: &str = "bob.example";

    struct Pair {
        alice: KeyStore,
        bob: KeyStore,
    }

    fn pair() -> Pair {
        Pair { alice: KeyStore::generate(), bob: KeyStore::generate() }
    }

    #[test]
    fn seal_then_open_returns_the_event() {
        let Pair { alice, bob } = pair();
        let event = message_created("alice.example");

        let envelope = Envelope::seal(&event, &alice, BOB, bob.public_key()).unwrap();
        assert_eq!(envelope.sender_domain, "alice.example");

        let opened = envelope.open(alice.public_key(), &bob, BOB).unwrap();
        assert_eq!(opened.decode().unwrap(), event);
    }

    #[test]
    fn every_single_bit_flip_is_rejected() {
        let Pair { alice, bob } = pair();
        let envelope = Envelope::seal(&message_created("alice.example"), &alice, BOB, bob.public_key()).unwrap();

        for byte in 0..envelope.ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = envelope.clone();
                tampered.ciphertext[byte] ^= 1 << bit;
                let err = tampered.open(alice.public_key(), &bob, BOB).unwrap_err();
                assert!(err.is_crypto_failure(), "byte {byte} bit {bit}: {err:?}");
            }
        }
    }

    #[test]
    fn wrong_recipient_fails_to_decrypt() {
        let Pair { alice, bob } = pair();
        let carol = KeyStore::generate();
        let envelope = Envelope::seal(&message_created("alice.example"), &alice, BOB, bob.public_key()).unwrap();

        let err = envelope.open(alice.public_key(), &carol, "carol.example").unwrap_err();
        assert!(matches!(err, FederationError::DecryptionFailed));
    }

    #[test]
    fn wrong_sender_key_fails_authentication() {
        let Pair { alice, bob } = pair();
        let mallory = KeyStore::generate();
        let envelope = Envelope::seal(&message_created("alice.example"), &mallory, BOB, bob.public_key()).unwrap();

        let err = envelope.open(alice.public_key(), &bob, BOB).unwrap_err();
        assert!(matches!(err, FederationError::AuthenticationFailed));
    }

    #[test]
    fn unknown_type_code_still_opens() {
        let Pair { alice, bob } = pair();
        let raw = RawEvent {
            id: Uuid::now_v7(),
            origin: "alice.example".into(),
            ts: 0,
            t: "xyz".into(),
            payload: json!({ "anything": true }),
        };
        let opened = Envelope::seal_raw(&raw, &alice, BOB, bob.public_key())
            .unwrap()
            .open(alice.public_key(), &bob, BOB)
            .unwrap();
        assert_eq!(opened.t, "xyz");
    }

    #[test]
    fn origin_must_match_sender_domain() {
        let Pair { alice, bob } = pair();
        let mut envelope = Envelope::seal(&message_created("alice.example"), &alice, BOB, bob.public_key()).unwrap();
        envelope.sender_domain = "someone-else.example".into();

        let err = envelope.open(alice.public_key(), &bob, BOB).unwrap_err();
        assert_eq!(err.error_type(), "malformed-event");
    }

    #[test]
    fn forwarded_envelope_is_rejected_by_third_server() {
        let Pair { alice, bob } = pair();
        let carol = KeyStore::generate();
        let envelope = Envelope::seal(&message_created("alice.example"), &alice, BOB, bob.public_key()).unwrap();

        // Bob strips his layer and passes Alice's signed blob on to Carol.
        let signed = bob.decrypt(&envelope.ciphertext).unwrap();
        let forwarded = Envelope::new("alice.example", carol.public_key().encrypt(&signed).unwrap());

        let err = forwarded.open(alice.public_key(), &carol, "carol.example").unwrap_err();
        assert!(matches!(&err, FederationError::Misdirected(d) if d == BOB), "{err:?}");
        assert!(err.is_crypto_failure());
    }

    #[test]
    fn destination_comparison_ignores_case_and_trailing_dot() {
        let Pair { alice, bob } = pair();
        let envelope = Envelope::seal(&message_created("alice.example"), &alice, "Bob.Example.", bob.public_key()).unwrap();
        assert!(envelope.open(alice.public_key(), &bob, BOB).is_ok());
    }

    #[test]
    fn authenticated_garbage_is_malformed() {
        let Pair { alice, bob } = pair();
        let ciphertext = bob.public_key().encrypt(&alice.sign_encrypt(b"not json")).unwrap();

        let err = Envelope::new("alice.example", ciphertext)
            .open(alice.public_key(), &bob, BOB)
            .unwrap_err();
        assert!(matches!(err, FederationError::MalformedEvent { event_type: None, .. }));
    }
}
