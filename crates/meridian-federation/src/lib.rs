//! # meridian-federation
//!
//! Encrypted, authenticated server-to-server (S2S) event exchange for Meridian.
//!
//! ## Architecture
//!
//! Independently operated chat servers replicate room, membership, message
//! and reaction changes to each other by POSTing sealed events. There is no
//! shared database and no session: trust is established per request by the
//! envelope.
//!
//! ```text
//!  chat.example.org                                 other.example.net
//!       │                                                  │
//!       │  build event → Envelope::seal                    │
//!       ├── POST /api/v1/federation.events ──────────────► │
//!       │   x-federation-domain: chat.example.org          │  PeerDirectory::lookup
//!       │   { payload: { data: [..] } }                    │  Envelope::open
//!       │                                                  │  EventRouter::dispatch
//!       │ ◄────────────────────────── { success: true } ── │
//! ```
//!
//! ## Key concepts
//!
//! - **Server keys** (`keys.rs`): each server holds one Ed25519 key pair; the
//!   public half is published via DNS or the hub.
//! - **Envelope** (`envelope.rs`): canonical JSON, signed by the sender, then
//!   encrypted for the recipient.
//! - **Events** (`events.rs`): the closed catalogue of fourteen event kinds and
//!   their structured payloads.
//! - **Directory** (`directory/`): pinned peers, DNS records or the hub, behind
//!   a TTL cache.
//! - **Router** (`router.rs`): one idempotent handler per event kind.
//! - **Federation client** (`client.rs`): outbound delivery.

pub mod canonical;
pub mod client;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod events;
pub mod key_manager;
pub mod keys;
pub mod router;
pub mod types;

pub use client::FederationClient;
pub use directory::{build_directory, PeerDirectory};
pub use envelope::Envelope;
pub use error::{FederationError, HandlerError};
pub use events::{EventBody, EventKind, FederationEvent, RawEvent};
pub use key_manager::KeyManager;
pub use keys::{KeyStore, PeerPublicKey};
pub use router::{EventHandler, EventRouter};
pub use types::{FederationResponse, PeerRecord};
