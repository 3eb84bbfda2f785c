//! # Watch Party Client
//!
//! Transport-agnostic Rust client for synchronized watch-party rooms.
//!
//! Participants in a room watch the same video in lock-step while chatting,
//! reacting and handing playback control ("host") to one another. This crate
//! implements the client side of that protocol: it reconciles a local media
//! player with the room's authoritative playback stream without feedback
//! loops, and tolerates late joiners, jitter, host handoffs and video
//! switches.
//!
//! ## Layers
//!
//! - [`reconcile`], [`presence`], [`signals`]: sans-IO state machines usable
//!   from any event loop.
//! - [`WatchPartyClient`]: a tokio task per connection that drives them from
//!   a [`Transport`], a [`MediaPlayer`] and a [`Directory`].
//! - [`ConnectionManager`]: one live connection at a time, with clean
//!   teardown on room change.
//!
//! ## Features
//!
//! - `transport-websocket` (default): [`WebSocketTransport`] and
//!   [`WebSocketConnector`].
//! - `http-directory` (default): [`HttpDirectory`] for the room listing and
//!   the video service.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "transport-websocket", feature = "http-directory"))]
//! # async fn example() -> watchparty_client::Result<()> {
//! use std::sync::Arc;
//! use watchparty_client::{
//!     ConnectionManager, Endpoints, HeadlessPlayer, HttpDirectory, JoinIntent, RoomName,
//!     WatchPartyConfig, WatchPartyEvent, WebSocketConnector,
//! };
//!
//! let endpoints = Endpoints::from_env();
//! let mut manager = ConnectionManager::new(
//!     WebSocketConnector::from_endpoints(&endpoints),
//!     HeadlessPlayer::new(),
//!     Arc::new(HttpDirectory::new(&endpoints)?),
//!     WatchPartyConfig::default(),
//! );
//!
//! let mut events = manager
//!     .open(RoomName::new("movie-night")?, "Ana", JoinIntent::Join)
//!     .await?;
//! while let Some(event) = events.recv().await {
//!     if let WatchPartyEvent::Disconnected { reason } = event {
//!         println!("left room: {reason:?}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod directory;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod handshake;
pub mod player;
pub mod presence;
pub mod protocol;
pub mod reconcile;
pub mod session;
pub mod signals;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{WatchPartyClient, WatchPartyConfig};
pub use connection::{ConnectionManager, Connector};
pub use directory::{Directory, RoomPoller};
pub use error::{Result, RoomError, WatchPartyError};
pub use error_codes::ErrorReason;
pub use event::WatchPartyEvent;
pub use handshake::{Endpoints, Handshake, JoinIntent, RoomName};
pub use player::{HeadlessPlayer, MediaPlayer, PlayerEvent};
pub use protocol::{ClientMessage, Participant, RoomSummary, ServerMessage, Video, VideoId};
pub use session::{Phase, RoomSnapshot};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use connection::WebSocketConnector;
#[cfg(feature = "http-directory")]
pub use directory::HttpDirectory;
#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
