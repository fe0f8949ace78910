//! Wire-compatible frame types for the listening room protocol.
//!
//! Every frame is a single JSON value in serde's default (externally tagged)
//! enum representation: `{"Tag":{...payload...}}`. Two shapes deviate from
//! the plain object form and are kept for compatibility with the room server:
//!
//! - `JoinQueue` carries no payload and is written as `{"JoinQueue":null}`.
//! - `UserQueueChange` arrives as the bare string `"UserQueueChange"`.

use serde::{Deserialize, Serialize, Serializer};

use crate::error::Result;

// ── Type aliases ────────────────────────────────────────────────────

/// Opaque identifier of a room session.
pub type RoomId = String;

/// Opaque identifier of a queued track.
pub type TrackId = String;

/// Opaque identifier of a room participant.
pub type UserId = String;

// ── Payload structs ─────────────────────────────────────────────────

/// A chat line broadcast by the server.
///
/// `id` and `from` are optional on the wire; frames that only carry
/// `message` parse with both left empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned message id. Empty for system messages.
    #[serde(default)]
    pub id: String,
    /// Sender of the message (`"system"` for server notices).
    #[serde(default)]
    pub from: String,
    /// The chat text.
    pub message: String,
}

impl ChatMessage {
    /// Create a chat message carrying only text.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Commands sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum ClientCommand {
    /// Post a chat line to the room.
    ChatMessage { message: String },
    /// Select the playback device for this participant.
    SetDevice { device_id: String },
    /// Enqueue a specific track in this participant's queue.
    QueueSong { track_id: TrackId },
    /// Join the room's playback rotation.
    JoinQueue,
    /// Heartbeat carrying an opaque nonce.
    KeepAlivePing { data: String },
}

impl ClientCommand {
    /// Serialize this command into a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Serialization`](crate::RoomError::Serialization)
    /// if the command cannot be encoded.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Short tag name used in logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ChatMessage { .. } => "ChatMessage",
            Self::SetDevice { .. } => "SetDevice",
            Self::QueueSong { .. } => "QueueSong",
            Self::JoinQueue => "JoinQueue",
            Self::KeepAlivePing { .. } => "KeepAlivePing",
        }
    }
}

/// Borrowed wire form of [`ClientCommand`]. `JoinQueue` is a newtype over
/// `()` so that it encodes as `{"JoinQueue":null}` rather than a bare string.
#[derive(Serialize)]
enum WireCommand<'a> {
    ChatMessage { message: &'a str },
    SetDevice { device_id: &'a str },
    QueueSong { track_id: &'a str },
    JoinQueue(()),
    KeepAlivePing { data: &'a str },
}

impl Serialize for ClientCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = match self {
            Self::ChatMessage { message } => WireCommand::ChatMessage { message },
            Self::SetDevice { device_id } => WireCommand::SetDevice { device_id },
            Self::QueueSong { track_id } => WireCommand::QueueSong { track_id },
            Self::JoinQueue => WireCommand::JoinQueue(()),
            Self::KeepAlivePing { data } => WireCommand::KeepAlivePing { data },
        };
        wire.serialize(serializer)
    }
}

/// Events sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// A chat line was posted to the room.
    ChatMessage(ChatMessage),
    /// Authoritative queue and presence lists, always sent together.
    PresencesQueueMessage {
        queue: Vec<TrackId>,
        presences: Vec<UserId>,
    },
    /// This participant's personal queue changed on the server.
    UserQueueChange,
    /// Echo of a [`ClientCommand::KeepAlivePing`] nonce.
    KeepAlivePong { data: String },
}

impl ServerEvent {
    /// Parse a text frame into an event.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Serialization`](crate::RoomError::Serialization)
    /// for malformed JSON and for tags this client does not know.
    pub fn from_frame(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn join_queue_is_written_with_null_payload() {
        let frame = ClientCommand::JoinQueue.to_frame().unwrap();
        assert_eq!(frame, r#"{"JoinQueue":null}"#);
    }

    #[test]
    fn join_queue_reads_both_null_and_bare_forms() {
        let from_null: ClientCommand = serde_json::from_str(r#"{"JoinQueue":null}"#).unwrap();
        let from_bare: ClientCommand = serde_json::from_str(r#""JoinQueue""#).unwrap();
        assert_eq!(from_null, ClientCommand::JoinQueue);
        assert_eq!(from_bare, ClientCommand::JoinQueue);
    }

    #[test]
    fn commands_use_tag_as_object_key() {
        let frame = ClientCommand::SetDevice {
            device_id: "dev-1".into(),
        }
        .to_frame()
        .unwrap();
        assert_eq!(frame, r#"{"SetDevice":{"device_id":"dev-1"}}"#);
    }

    #[test]
    fn user_queue_change_is_a_bare_string() {
        let event = ServerEvent::from_frame(r#""UserQueueChange""#).unwrap();
        assert_eq!(event, ServerEvent::UserQueueChange);
    }

    #[test]
    fn chat_message_without_sender_fields_parses() {
        let event = ServerEvent::from_frame(r#"{"ChatMessage":{"message":"hi"}}"#).unwrap();
        assert_eq!(event, ServerEvent::ChatMessage(ChatMessage::text("hi")));
    }

    #[test]
    fn unknown_tag_fails_to_parse() {
        assert!(ServerEvent::from_frame(r#"{"UnknownTag":{}}"#).is_err());
    }

    #[test]
    fn tag_names_match_wire_keys() {
        let cmd = ClientCommand::QueueSong {
            track_id: "t1".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&cmd.to_frame().unwrap()).unwrap();
        assert!(value.get(cmd.tag()).is_some());
    }
}
