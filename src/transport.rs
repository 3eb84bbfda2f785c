//! Transport abstraction for the watch-party room protocol.
//!
//! The [`Transport`] trait is a bidirectional text message channel between
//! the client and the room server. Every protocol message is one JSON text
//! message, so implementations handle framing internally (WebSocket frames in
//! the default [`WebSocketTransport`](crate::transports::WebSocketTransport)).
//!
//! # Connection Setup
//!
//! Connection setup is not part of this trait. Build a connected transport
//! with a [`Connector`](crate::connection::Connector) (or by hand) and pass it
//! to `WatchPartyClient::start`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use watchparty_client::error::WatchPartyError;
//! use watchparty_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), WatchPartyError> {
//!         // Send the JSON text message over your transport
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, WatchPartyError>> {
//!         // Receive the next JSON text message; None once the peer closed
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), WatchPartyError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::WatchPartyError;

/// A bidirectional text message transport to the room server.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message
/// and each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: the session loop polls
/// it inside `tokio::select!` alongside player events and timers, so a
/// cancelled `recv` must not lose a message.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::TransportSend`] if the message could not be
    /// sent, or [`WatchPartyError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), WatchPartyError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the server closed the connection
    async fn recv(&mut self) -> Option<Result<String, WatchPartyError>>;

    /// Close the connection gracefully. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// either way.
    async fn close(&mut self) -> Result<(), WatchPartyError>;
}
