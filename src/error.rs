//! Error types for the watch-party client.

use thiserror::Error;

/// Room-level conditions that end a connection attempt.
///
/// These are the reasons surfaced to the caller in
/// [`WatchPartyEvent::Disconnected`](crate::WatchPartyEvent::Disconnected).
/// Each one should return the user to a room-selection state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// A `create` handshake named a room that already exists.
    #[error("room already exists")]
    RoomExists,

    /// A `join` handshake named a room that does not exist.
    ///
    /// Reported either explicitly by the server or inferred from a close
    /// before the session was established.
    #[error("room not found")]
    RoomNotFound,

    /// The connection closed without being asked to after the session was
    /// established.
    #[error("connection lost")]
    ConnectionLost,

    /// The server rejected the session with a reason this client does not
    /// recognize.
    #[error("rejected by server: {0}")]
    Rejected(String),
}

/// Errors that can occur when using the watch-party client.
#[derive(Debug, Error)]
pub enum WatchPartyError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// The server refused the WebSocket upgrade.
    #[error("handshake rejected with HTTP status {status}")]
    HandshakeRejected {
        /// HTTP status code of the refusal.
        status: u16,
    },

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection.
    #[error("not connected to a room")]
    NotConnected,

    /// A room-level condition ended the connection attempt.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The room or video directory could not be queried.
    #[error("metadata fetch failed: {0}")]
    MetadataFetchFailed(String),

    /// A room name was empty or contained characters outside `[a-z0-9_-]`.
    #[error("invalid room name: {0:?}")]
    InvalidRoomName(String),

    /// A display name was empty after trimming.
    #[error("display name must not be empty")]
    InvalidDisplayName,

    /// An endpoint URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for watch-party client operations.
pub type Result<T> = std::result::Result<T, WatchPartyError>;
