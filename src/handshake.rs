//! Room names, join intent, and the query-parameterized connection handshake.
//!
//! The room server reads everything it needs from the upgrade request:
//!
//! ```text
//! ws://host:8080/ws?room=movie-night&username=Ana&action=join
//! ```
//!
//! so the server can refuse a duplicate `create` or a `join` of a missing
//! room before any protocol message is exchanged.

use std::fmt;

use url::Url;

use crate::error::{Result, WatchPartyError};

/// Environment variable naming the room server base URL.
pub const WS_URL_ENV: &str = "WATCHPARTY_WS_URL";
/// Environment variable naming the video directory base URL.
pub const API_URL_ENV: &str = "WATCHPARTY_API_URL";

const DEFAULT_WS_BASE: &str = "ws://localhost:8080";
const DEFAULT_API_BASE: &str = "http://localhost:8000";
const MAX_ROOM_NAME_LEN: usize = 64;

// ── RoomName ────────────────────────────────────────────────────────

/// A validated, case-normalized room identifier.
///
/// ```
/// use watchparty_client::handshake::RoomName;
///
/// let room = RoomName::new("  Movie-Night ").unwrap();
/// assert_eq!(room.as_str(), "movie-night");
/// assert!(RoomName::new("no spaces").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomName(String);

impl RoomName {
    /// Trim, lowercase, and validate a room name.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::InvalidRoomName`] if the result is empty,
    /// longer than 64 characters, or contains anything outside `[a-z0-9_-]`.
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let normalized = raw.as_ref().trim().to_lowercase();
        let valid = !normalized.is_empty()
            && normalized.len() <= MAX_ROOM_NAME_LEN
            && normalized
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if valid {
            Ok(Self(normalized))
        } else {
            Err(WatchPartyError::InvalidRoomName(raw.as_ref().to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RoomName {
    fn default() -> Self {
        Self("general".to_owned())
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── JoinIntent ──────────────────────────────────────────────────────

/// Whether the handshake creates a new room or joins an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinIntent {
    /// Create the room; the server refuses with `room_exists` if it is taken.
    Create,
    /// Join the room; the server refuses with `room_not_found` if it is missing.
    #[default]
    Join,
}

impl JoinIntent {
    /// Value of the `action` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Join => "join",
        }
    }
}

// ── Handshake ───────────────────────────────────────────────────────

/// Everything that identifies one room membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub room: RoomName,
    pub username: String,
    pub intent: JoinIntent,
}

impl Handshake {
    /// Validate the display name and bundle the handshake parameters.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::InvalidDisplayName`] if `username` is blank.
    pub fn new(room: RoomName, username: impl AsRef<str>, intent: JoinIntent) -> Result<Self> {
        let username = username.as_ref().trim();
        if username.is_empty() {
            return Err(WatchPartyError::InvalidDisplayName);
        }
        Ok(Self {
            room,
            username: username.to_owned(),
            intent,
        })
    }

    /// Build the upgrade URL against a room server base such as
    /// `ws://localhost:8080`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::InvalidUrl`] if `ws_base` does not parse or
    /// cannot carry a path.
    pub fn url(&self, ws_base: &str) -> Result<Url> {
        let mut url = append_path(Url::parse(ws_base)?, &["ws"])?;
        url.query_pairs_mut()
            .append_pair("room", self.room.as_str())
            .append_pair("username", &self.username)
            .append_pair("action", self.intent.as_str());
        Ok(url)
    }
}

// ── Endpoints ───────────────────────────────────────────────────────

/// Base URLs of the room server and the video directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Room server, `ws://` or `wss://`.
    pub ws_base: String,
    /// Video directory, `http://` or `https://`.
    pub api_base: String,
}

impl Endpoints {
    pub fn new(ws_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into(),
            api_base: api_base.into(),
        }
    }

    /// Read [`WS_URL_ENV`] and [`API_URL_ENV`], falling back to the local
    /// development ports.
    pub fn from_env() -> Self {
        Self {
            ws_base: std::env::var(WS_URL_ENV).unwrap_or_else(|_| DEFAULT_WS_BASE.to_owned()),
            api_base: std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_owned()),
        }
    }

    /// HTTP form of the room server base (the room listing lives there).
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::InvalidUrl`] if `ws_base` does not parse.
    pub fn room_server_http(&self) -> Result<Url> {
        let mut url = Url::parse(&self.ws_base)?;
        let scheme = match url.scheme() {
            "wss" => "https",
            "ws" => "http",
            other => other,
        }
        .to_owned();
        // Switching between special schemes cannot fail for ws/wss/http/https.
        let _ = url.set_scheme(&scheme);
        Ok(url)
    }
}

/// Append path segments below whatever path `base` already carries, so a
/// server mounted under a prefix keeps it. An empty last segment leaves a
/// trailing slash.
pub(crate) fn append_path(mut base: Url, segments: &[&str]) -> Result<Url> {
    let cannot_be_base = url::ParseError::RelativeUrlWithCannotBeABaseBase;
    base.path_segments_mut()
        .map_err(|()| WatchPartyError::InvalidUrl(cannot_be_base))?
        .pop_if_empty()
        .extend(segments);
    Ok(base)
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_WS_BASE, DEFAULT_API_BASE)
    }
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

    #[test]
    fn room_names_are_normalized() {
        assert_eq!(RoomName::new("General").unwrap().as_str(), "general");
        assert_eq!(RoomName::new(" a_b-9 ").unwrap().as_str(), "a_b-9");
    }

    #[test]
    fn room_names_reject_unsafe_characters() {
        let too_long = "x".repeat(65);
        for bad in ["", "   ", "two words", "slash/room", "ünïcode", too_long.as_str()] {
            assert!(
                matches!(RoomName::new(bad), Err(WatchPartyError::InvalidRoomName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn handshake_url_carries_room_name_and_intent() {
        let handshake = Handshake::new(
            RoomName::new("Movie-Night").unwrap(),
            " Ana Lucia ",
            JoinIntent::Create,
        )
        .unwrap();
        let url = handshake.url("ws://localhost:8080").unwrap();
        assert_eq!(url.path(), "/ws");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("room".into(), "movie-night".into()),
                ("username".into(), "Ana Lucia".into()),
                ("action".into(), "create".into()),
            ]
        );
    }

    #[test]
    fn handshake_url_keeps_a_path_prefix() {
        let handshake =
            Handshake::new(RoomName::new("lobby").unwrap(), "bo", JoinIntent::Join).unwrap();
        for base in ["wss://host.example.com/party", "wss://host.example.com/party/"] {
            let url = handshake.url(base).unwrap();
            assert_eq!(
                url.as_str(),
                "wss://host.example.com/party/ws?room=lobby&username=bo&action=join"
            );
        }
    }

    #[test]
    fn opaque_base_url_is_rejected() {
        let handshake =
            Handshake::new(RoomName::new("lobby").unwrap(), "bo", JoinIntent::Join).unwrap();
        assert!(matches!(
            handshake.url("mailto:party@example.com"),
            Err(WatchPartyError::InvalidUrl(_))
        ));
    }

    #[test]
    fn blank_display_name_is_rejected() {
        let err = Handshake::new(RoomName::default(), "  ", JoinIntent::Join).unwrap_err();
        assert!(matches!(err, WatchPartyError::InvalidDisplayName));
    }

    #[test]
    fn room_server_http_swaps_scheme() {
        let endpoints = Endpoints::new("wss://party.example.com", "https://api.example.com");
        assert_eq!(
            endpoints.room_server_http().unwrap().as_str(),
            "https://party.example.com/"
        );
        let local = Endpoints::default();
        assert_eq!(
            local.room_server_http().unwrap().as_str(),
            "http://localhost:8080/"
        );
    }
}
