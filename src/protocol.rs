//! Wire-compatible protocol types for the watch-party room server.
//!
//! Every message is a flat JSON object tagged by a `type` field. The room
//! server echoes every field of its message struct on every message, so
//! inbound variants only name the fields they use and ignore the rest.
//! Message types this client does not know deserialize to
//! [`ServerMessage::Unknown`] and are dropped by the session.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Server-assigned participant identifier (opaque string).
pub type ParticipantId = String;

/// Video identifier assigned by the video directory.
pub type VideoId = u64;

/// The `video_id` the server uses for "no video selected".
pub const UNSET_VIDEO_ID: VideoId = 0;

// ── Enums ───────────────────────────────────────────────────────────

/// Playback status carried by `sync_state.content`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    #[default]
    Paused,
}

impl PlaybackStatus {
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// A participant as listed in `user_list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub username: String,
    #[serde(default)]
    pub is_host: bool,
}

/// A playlist entry from the video directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    pub video_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// One row of the room directory listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSummary {
    pub name: String,
    pub count: u32,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Chat line.
    Chat { username: String, content: String },
    /// "I am typing" announcement.
    Typing { username: String },
    /// Emoji reaction; `content` holds the emoji.
    Reaction { username: String, content: String },
    /// Host resumed playback at `timestamp`.
    Play {
        username: String,
        timestamp: f64,
        video_id: VideoId,
    },
    /// Host paused playback at `timestamp`.
    Pause {
        username: String,
        timestamp: f64,
        video_id: VideoId,
    },
    /// Host moved the playhead to `timestamp`.
    Seek {
        username: String,
        timestamp: f64,
        video_id: VideoId,
    },
    /// Host selected another playlist entry.
    ChangeVideo { username: String, video_id: VideoId },
    /// Give authority to the participant whose id is `content`.
    GrantControl { content: ParticipantId },
    /// Take authority from the participant whose id is `content`.
    RevokeControl { content: ParticipantId },
    /// Ask the current host for control.
    RequestControl { username: String },
    /// A video was added to the room's playlist; peers should refetch.
    NewVideo { username: String, room: String },
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Own participant id and authority flag.
    Identity { user_id: ParticipantId, is_host: bool },
    /// Full roster replacement.
    UserList {
        #[serde(default)]
        user_list: Vec<Participant>,
    },
    /// Chat line from a participant.
    Chat {
        #[serde(default)]
        username: String,
        #[serde(default)]
        content: String,
    },
    /// Server announcement (host promotion and the like).
    System {
        #[serde(default)]
        username: String,
        #[serde(default)]
        content: String,
    },
    /// Someone is typing.
    Typing {
        #[serde(default)]
        username: String,
    },
    /// Emoji reaction.
    Reaction {
        #[serde(default)]
        username: String,
        #[serde(default)]
        content: String,
    },
    /// Authoritative resume at `timestamp`.
    Play {
        #[serde(default)]
        timestamp: f64,
    },
    /// Authoritative pause at `timestamp`.
    Pause {
        #[serde(default)]
        timestamp: f64,
    },
    /// Authoritative seek to `timestamp`.
    Seek {
        #[serde(default)]
        timestamp: f64,
    },
    /// Full playback snapshot sent to a joining participant.
    SyncState {
        #[serde(default)]
        timestamp: f64,
        #[serde(default)]
        content: PlaybackStatus,
        #[serde(default)]
        video_id: VideoId,
    },
    /// The host switched to another playlist entry.
    ChangeVideo {
        #[serde(default)]
        video_id: VideoId,
    },
    /// The playlist changed; refetch it.
    NewVideo,
    /// A participant asked for control.
    RequestControl {
        #[serde(default)]
        username: String,
    },
    /// Handshake-level failure; the server closes right after.
    Error { content: crate::error_codes::ErrorReason },
    /// Any message type this client does not understand.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn playback_command_serializes_flat() {
        let msg = ClientMessage::Seek {
            username: "ana".into(),
            timestamp: 12.5,
            video_id: 3,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "seek", "username": "ana", "timestamp": 12.5, "video_id": 3})
        );
    }

    #[test]
    fn server_fields_beyond_the_variant_are_ignored() {
        // The room server fills every field of its message struct.
        let raw = r#"{"type":"play","username":"","user_id":"u1","content":"","timestamp":4.5,"video_id":2,"room":"general","is_host":false}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg, ServerMessage::Play { timestamp: 4.5 });
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"heartbeat_v9","foo":1}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn user_list_defaults_to_empty_when_omitted() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"user_list"}"#).unwrap();
        assert_eq!(msg, ServerMessage::UserList { user_list: vec![] });
    }

    #[test]
    fn video_thumbnail_is_optional() {
        let video: Video = serde_json::from_value(json!({
            "id": 7,
            "title": "Trailer",
            "video_url": "https://example.com/t.mp4",
            "thumbnail": null,
            "room": "general",
            "uploaded_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(video.id, 7);
        assert!(video.thumbnail.is_none());
    }
}
