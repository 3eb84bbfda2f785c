//! Reasons carried by the server's `error` message.
//!
//! The room server reports handshake-level failures as
//! `{"type":"error","content":"room_exists"}`. Known reasons map onto
//! [`RoomError`]; anything else is preserved verbatim so newer servers do not
//! break older clients.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RoomError;

/// The `content` field of an inbound `error` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorReason {
    /// `room_exists`: a create intent named a taken room.
    RoomExists,
    /// `room_not_found`: a join intent named a missing room.
    RoomNotFound,
    /// Any other reason string.
    Other(String),
}

impl ErrorReason {
    /// Wire form of this reason.
    pub fn as_str(&self) -> &str {
        match self {
            Self::RoomExists => "room_exists",
            Self::RoomNotFound => "room_not_found",
            Self::Other(reason) => reason,
        }
    }

    /// Returns a human-readable description of this reason.
    pub fn description(&self) -> &str {
        match self {
            Self::RoomExists => "A room with this name already exists. Pick another name or join it.",
            Self::RoomNotFound => {
                "No room with this name exists. Check the name or create the room."
            }
            Self::Other(reason) => reason,
        }
    }

    /// The room-level condition this reason ends a session with.
    pub fn to_room_error(&self) -> RoomError {
        match self {
            Self::RoomExists => RoomError::RoomExists,
            Self::RoomNotFound => RoomError::RoomNotFound,
            Self::Other(reason) => RoomError::Rejected(reason.clone()),
        }
    }
}

impl From<String> for ErrorReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "room_exists" => Self::RoomExists,
            "room_not_found" => Self::RoomNotFound,
            _ => Self::Other(value),
        }
    }
}

impl From<ErrorReason> for String {
    fn from(value: ErrorReason) -> Self {
        match value {
            ErrorReason::Other(reason) => reason,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
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
    fn known_reasons_parse() {
        let reason: ErrorReason = serde_json::from_str("\"room_exists\"").unwrap();
        assert_eq!(reason, ErrorReason::RoomExists);
        let reason: ErrorReason = serde_json::from_str("\"room_not_found\"").unwrap();
        assert_eq!(reason, ErrorReason::RoomNotFound);
    }

    #[test]
    fn unknown_reason_is_preserved() {
        let reason: ErrorReason = serde_json::from_str("\"room_full\"").unwrap();
        assert_eq!(reason, ErrorReason::Other("room_full".into()));
        assert_eq!(serde_json::to_string(&reason).unwrap(), "\"room_full\"");
        assert_eq!(
            reason.to_room_error(),
            RoomError::Rejected("room_full".into())
        );
    }

    #[test]
    fn known_reasons_map_to_room_errors() {
        assert_eq!(ErrorReason::RoomExists.to_room_error(), RoomError::RoomExists);
        assert_eq!(
            ErrorReason::RoomNotFound.to_room_error(),
            RoomError::RoomNotFound
        );
    }

    #[test]
    fn descriptions_are_not_empty() {
        for reason in [ErrorReason::RoomExists, ErrorReason::RoomNotFound] {
            assert!(!reason.description().is_empty());
            assert_ne!(reason.description(), reason.as_str());
        }
    }
}
