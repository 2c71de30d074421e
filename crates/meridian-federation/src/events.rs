//! Federation event model — the closed catalogue of replicated state changes.
//!
//! On the wire every event is a JSON object:
//!
//! ```json
//! { "event": { "id": "…", "origin": "chat.example.org", "ts": 1700000000000,
//!              "t": "msc", "payload": { … } } }
//! ```
//!
//! Decoding happens in two stages. [`RawEvent`] accepts any `t` string so that
//! an envelope carrying an unknown type still opens cleanly; the router then
//! resolves the code to an [`EventKind`] and decodes `payload` into the
//! variant's structured type with [`RawEvent::decode`].

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::FederationError;

// ─── Event kinds ─────────────────────────────────────────────────────────────

/// Every event type understood by this protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    DirectRoomCreated,
    RoomCreated,
    UserJoined,
    UserAdded,
    UserLeft,
    UserRemoved,
    UserMuted,
    UserUnmuted,
    MessageCreated,
    MessageUpdated,
    MessageDeleted,
    MessagesRead,
    ReactionSet,
    ReactionUnset,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        EventKind::DirectRoomCreated,
        EventKind::RoomCreated,
        EventKind::UserJoined,
        EventKind::UserAdded,
        EventKind::UserLeft,
        EventKind::UserRemoved,
        EventKind::UserMuted,
        EventKind::UserUnmuted,
        EventKind::MessageCreated,
        EventKind::MessageUpdated,
        EventKind::MessageDeleted,
        EventKind::MessagesRead,
        EventKind::ReactionSet,
        EventKind::ReactionUnset,
    ];

    /// The stable three-character wire code.
    pub fn code(self) -> &'static str {
        match self {
            EventKind::DirectRoomCreated => "drc",
            EventKind::RoomCreated => "roc",
            EventKind::UserJoined => "usj",
            EventKind::UserAdded => "usa",
            EventKind::UserLeft => "usl",
            EventKind::UserRemoved => "usr",
            EventKind::UserMuted => "usm",
            EventKind::UserUnmuted => "usu",
            EventKind::MessageCreated => "msc",
            EventKind::MessageUpdated => "msu",
            EventKind::MessageDeleted => "msd",
            EventKind::MessagesRead => "msr",
            EventKind::ReactionSet => "mrs",
            EventKind::ReactionUnset => "mru",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ─── Shared shapes ───────────────────────────────────────────────────────────

/// A user as known to the federation, qualified by their home domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedUser {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Home server of the user.
    pub domain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomKind {
    #[serde(rename = "c")]
    Public,
    #[serde(rename = "p")]
    Private,
    #[serde(rename = "d")]
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedRoom {
    pub id: String,
    pub kind: RoomKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedMessage {
    pub id: String,
    pub room_id: String,
    pub sender: FederatedUser,
    pub text: String,
    /// Unix millisecond timestamp on the origin server.
    pub ts: i64,
}

// ─── Payloads ────────────────────────────────────────────────────────────────

/// Body of `drc` and `roc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCreated {
    pub room: FederatedRoom,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<FederatedUser>,
    #[serde(default)]
    pub users: Vec<FederatedUser>,
}

/// Body of `usj` and `usl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub room_id: String,
    pub user: FederatedUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAdded {
    pub room_id: String,
    pub user: FederatedUser,
    pub inviter: FederatedUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRemoved {
    pub room_id: String,
    pub user: FederatedUser,
    pub removed_by: FederatedUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMuted {
    pub room_id: String,
    pub user: FederatedUser,
    pub muted_by: FederatedUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUnmuted {
    pub room_id: String,
    pub user: FederatedUser,
    pub unmuted_by: FederatedUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreated {
    pub message: FederatedMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdated {
    pub message: FederatedMessage,
    pub edited_by: FederatedUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeleted {
    pub room_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesRead {
    pub room_id: String,
    pub user_id: String,
}

/// Body of `mrs` and `mru`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub room_id: String,
    pub message_id: String,
    pub user: FederatedUser,
    /// Emoji shortcode, e.g. `:thumbsup:`.
    pub reaction: String,
}

/// Structured body of an event, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBody {
    DirectRoomCreated(RoomCreated),
    RoomCreated(RoomCreated),
    UserJoined(Membership),
    UserAdded(UserAdded),
    UserLeft(Membership),
    UserRemoved(UserRemoved),
    UserMuted(UserMuted),
    UserUnmuted(UserUnmuted),
    MessageCreated(MessageCreated),
    MessageUpdated(MessageUpdated),
    MessageDeleted(MessageDeleted),
    MessagesRead(MessagesRead),
    ReactionSet(Reaction),
    ReactionUnset(Reaction),
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::DirectRoomCreated(_) => EventKind::DirectRoomCreated,
            EventBody::RoomCreated(_) => EventKind::RoomCreated,
            EventBody::UserJoined(_) => EventKind::UserJoined,
            EventBody::UserAdded(_) => EventKind::UserAdded,
            EventBody::UserLeft(_) => EventKind::UserLeft,
            EventBody::UserRemoved(_) => EventKind::UserRemoved,
            EventBody::UserMuted(_) => EventKind::UserMuted,
            EventBody::UserUnmuted(_) => EventKind::UserUnmuted,
            EventBody::MessageCreated(_) => EventKind::MessageCreated,
            EventBody::MessageUpdated(_) => EventKind::MessageUpdated,
            EventBody::MessageDeleted(_) => EventKind::MessageDeleted,
            EventBody::MessagesRead(_) => EventKind::MessagesRead,
            EventBody::ReactionSet(_) => EventKind::ReactionSet,
            EventBody::ReactionUnset(_) => EventKind::ReactionUnset,
        }
    }

    /// Decode `payload` as the body of `kind`.
    pub fn decode(kind: EventKind, payload: Value) -> Result<Self, serde_json::Error> {
        use serde_json::from_value as de;
        Ok(match kind {
            EventKind::DirectRoomCreated => EventBody::DirectRoomCreated(de(payload)?),
            EventKind::RoomCreated => EventBody::RoomCreated(de(payload)?),
            EventKind::UserJoined => EventBody::UserJoined(de(payload)?),
            EventKind::UserAdded => EventBody::UserAdded(de(payload)?),
            EventKind::UserLeft => EventBody::UserLeft(de(payload)?),
            EventKind::UserRemoved => EventBody::UserRemoved(de(payload)?),
            EventKind::UserMuted => EventBody::UserMuted(de(payload)?),
            EventKind::UserUnmuted => EventBody::UserUnmuted(de(payload)?),
            EventKind::MessageCreated => EventBody::MessageCreated(de(payload)?),
            EventKind::MessageUpdated => EventBody::MessageUpdated(de(payload)?),
            EventKind::MessageDeleted => EventBody::MessageDeleted(de(payload)?),
            EventKind::MessagesRead => EventBody::MessagesRead(de(payload)?),
            EventKind::ReactionSet => EventBody::ReactionSet(de(payload)?),
            EventKind::ReactionUnset => EventBody::ReactionUnset(de(payload)?),
        })
    }

    /// Encode the body as the wire `payload` value.
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        use serde_json::to_value as en;
        match self {
            EventBody::DirectRoomCreated(p) | EventBody::RoomCreated(p) => en(p),
            EventBody::UserJoined(p) | EventBody::UserLeft(p) => en(p),
            EventBody::UserAdded(p) => en(p),
            EventBody::UserRemoved(p) => en(p),
            EventBody::UserMuted(p) => en(p),
            EventBody::UserUnmuted(p) => en(p),
            EventBody::MessageCreated(p) => en(p),
            EventBody::MessageUpdated(p) => en(p),
            EventBody::MessageDeleted(p) => en(p),
            EventBody::MessagesRead(p) => en(p),
            EventBody::ReactionSet(p) | EventBody::ReactionUnset(p) => en(p),
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// A fully decoded, type-checked federation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederationEvent {
    pub id: Uuid,
    /// Domain of the server that created the event.
    pub origin: String,
    /// Unix millisecond timestamp on the origin server.
    pub ts: i64,
    pub body: EventBody,
}

impl FederationEvent {
    /// Create a new event originating from `origin`, stamped now.
    pub fn new(origin: impl Into<String>, body: EventBody) -> Self {
        Self {
            id: Uuid::now_v7(),
            origin: origin.into(),
            ts: Utc::now().timestamp_millis(),
            body,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }

    pub fn to_raw(&self) -> Result<RawEvent, serde_json::Error> {
        Ok(RawEvent {
            id: self.id,
            origin: self.origin.clone(),
            ts: self.ts,
            t: self.kind().code().to_owned(),
            payload: self.body.to_payload()?,
        })
    }
}

/// A structurally valid event whose type code has not been checked yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: Uuid,
    pub origin: String,
    pub ts: i64,
    /// Type code as sent by the peer.
    pub t: String,
    pub payload: Value,
}

impl RawEvent {
    /// The event kind, if `t` is in the supported set.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_code(&self.t)
    }

    /// Resolve the type code and decode the body.
    ///
    /// Fails with `UnsupportedEventType` for codes outside the catalogue and
    /// `MalformedEvent` when the payload does not match the variant's shape.
    pub fn decode(self) -> Result<FederationEvent, FederationError> {
        let kind = self
            .kind()
            .ok_or_else(|| FederationError::UnsupportedEventType(self.t.clone()))?;
        let body = EventBody::decode(kind, self.payload)
            .map_err(|e| FederationError::malformed(Some(kind.code()), e))?;
        Ok(FederationEvent { id: self.id, origin: self.origin, ts: self.ts, body })
    }
}

/// The top-level signed document: `{ "destination": "…", "event": { … } }`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EventDocument<E> {
    /// Domain of the server the sender sealed this document for.
    pub destination: String,
    pub event: Option<E>,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn codes_are_unique_and_round_trip() {
        let mut codes: Vec<_> = EventKind::ALL.iter().map(|k| k.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), EventKind::ALL.len());

        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_code(kind.code()), Some(kind));
            assert_eq!(kind.code().len(), 3);
        }
        assert_eq!(EventKind::from_code("xyz"), None);
        assert_eq!(EventKind::from_code("MSC"), None);
    }

    #[test]
    fn typed_event_survives_raw_conversion() {
        let event = message_created("chat.example.org");
        let raw = event.to_raw().unwrap();
        assert_eq!(raw.t, "msc");
        assert_eq!(raw.clone().decode().unwrap(), event);
    }

    #[test]
    fn unknown_code_is_unsupported_not_malformed() {
        let raw = RawEvent {
            id: Uuid::nil(),
            origin: "a.example".into(),
            ts: 0,
            t: "xyz".into(),
            payload: json!({}),
        };
        match raw.decode() {
            Err(FederationError::UnsupportedEventType(code)) => assert_eq!(code, "xyz"),
            other => panic!("expected UnsupportedEventType, got {other:?}"),
        }
    }

    #[test]
    fn wrong_payload_shape_is_malformed() {
        let raw = RawEvent {
            id: Uuid::nil(),
            origin: "a.example".into(),
            ts: 0,
            t: "msd".into(),
            payload: json!({ "room_id": "r1" }),
        };
        match raw.decode() {
            Err(FederationError::MalformedEvent { event_type, .. }) => {
                assert_eq!(event_type.as_deref(), Some("msd"))
            }
            other => panic!("expected MalformedEvent, got {other:?}"),
        }
    }

    #[test]
    fn room_kind_uses_single_letter_codes() {
        let room = FederatedRoom { id: "r".into(), kind: RoomKind::Direct, name: None, topic: None };
        assert_eq!(serde_json::to_value(&room).unwrap(), json!({ "id": "r", "kind": "d" }));
    }

    #[test]
    fn shared_payload_shapes_decode_per_kind() {
        let payload = json!({
            "room_id": "r1",
            "user": { "id": "u1", "username": "bob", "domain": "b.example" }
        });
        let joined = EventBody::decode(EventKind::UserJoined, payload.clone()).unwrap();
        let left = EventBody::decode(EventKind::UserLeft, payload).unwrap();
        assert_eq!(joined.kind(), EventKind::UserJoined);
        assert_eq!(left.kind(), EventKind::UserLeft);
    }
}
