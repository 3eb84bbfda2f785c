//! Connection lifecycle across room changes.
//!
//! [`ConnectionManager`] owns at most one live [`WatchPartyClient`]. Opening a
//! room always tears the previous connection down first, and every connection
//! starts from a fresh session, so nothing from one room (playlist, current
//! video, playback flags, pending sync, error) can leak into the next.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{WatchPartyClient, WatchPartyConfig};
use crate::directory::{Directory, RoomPoller};
use crate::error::{Result, RoomError, WatchPartyError};
use crate::event::WatchPartyEvent;
use crate::handshake::{Handshake, JoinIntent, RoomName};
use crate::player::MediaPlayer;
use crate::session::RoomSnapshot;
use crate::transport::Transport;

/// Opens a transport for a handshake.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Connect to the room server.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::HandshakeRejected`] if the server refused the
    /// upgrade, or another transport error if it could not be reached.
    async fn connect(&self, handshake: &Handshake) -> Result<Self::Transport>;
}

#[cfg(feature = "transport-websocket")]
pub use ws::WebSocketConnector;

#[cfg(feature = "transport-websocket")]
mod ws {
    use async_trait::async_trait;

    use super::Connector;
    use crate::error::Result;
    use crate::handshake::{Endpoints, Handshake};
    use crate::transports::WebSocketTransport;

    /// [`Connector`] for the room server's `/ws` endpoint.
    #[derive(Debug, Clone)]
    pub struct WebSocketConnector {
        ws_base: String,
    }

    impl WebSocketConnector {
        /// `ws_base` is the room server root, e.g. `ws://localhost:8080`.
        pub fn new(ws_base: impl Into<String>) -> Self {
            Self {
                ws_base: ws_base.into(),
            }
        }

        pub fn from_endpoints(endpoints: &Endpoints) -> Self {
            Self::new(endpoints.ws_base.clone())
        }
    }

    #[async_trait]
    impl Connector for WebSocketConnector {
        type Transport = WebSocketTransport;

        async fn connect(&self, handshake: &Handshake) -> Result<WebSocketTransport> {
            let url = handshake.url(&self.ws_base)?;
            WebSocketTransport::connect(url.as_str()).await
        }
    }
}

/// Owns the single active room connection and its collaborators.
///
/// The player is cloned into each new connection; a player that forwards to
/// a UI over a channel is cheap to clone.
pub struct ConnectionManager<C, P> {
    connector: C,
    player: P,
    directory: Arc<dyn Directory>,
    config: WatchPartyConfig,
    active: Option<WatchPartyClient>,
}

impl<C, P> ConnectionManager<C, P>
where
    C: Connector,
    P: MediaPlayer + Clone,
{
    pub fn new(
        connector: C,
        player: P,
        directory: Arc<dyn Directory>,
        config: WatchPartyConfig,
    ) -> Self {
        Self {
            connector,
            player,
            directory,
            config,
            active: None,
        }
    }

    /// Join or create `room` as `username`.
    ///
    /// Any current connection is closed first. Returns the new connection's
    /// event receiver.
    ///
    /// # Errors
    ///
    /// - [`WatchPartyError::InvalidDisplayName`] for a blank name.
    /// - [`RoomError::RoomNotFound`] if the server refused a `join` handshake.
    /// - Transport errors if the server could not be reached.
    pub async fn open(
        &mut self,
        room: RoomName,
        username: &str,
        intent: JoinIntent,
    ) -> Result<mpsc::Receiver<WatchPartyEvent>> {
        self.close().await;
        let handshake = Handshake::new(room, username, intent)?;
        debug!(room = %handshake.room, intent = intent.as_str(), "opening room connection");

        let transport = match self.connector.connect(&handshake).await {
            Ok(transport) => transport,
            Err(WatchPartyError::HandshakeRejected { status }) if intent == JoinIntent::Join => {
                warn!(status, room = %handshake.room, "join refused at upgrade");
                return Err(RoomError::RoomNotFound.into());
            }
            Err(e) => return Err(e),
        };

        info!(room = %handshake.room, "room connection established");
        let (client, events) = WatchPartyClient::start(
            transport,
            handshake,
            self.player.clone(),
            Arc::clone(&self.directory),
            self.config.clone(),
        );
        self.active = Some(client);
        Ok(events)
    }

    /// Close the current connection, if any. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.active.take() {
            debug!(room = %client.room(), "closing room connection");
            client.shutdown().await;
        }
    }

    /// The live connection, if one is open.
    pub fn client(&self) -> Option<&WatchPartyClient> {
        self.active.as_ref()
    }

    /// State of the current connection, or an empty snapshot when there is
    /// none.
    pub async fn snapshot(&self) -> RoomSnapshot {
        match &self.active {
            Some(client) => client.snapshot().await,
            None => RoomSnapshot::default(),
        }
    }

    /// Start polling the room listing with the configured interval.
    pub fn room_poller(&self) -> RoomPoller {
        RoomPoller::start(Arc::clone(&self.directory), self.config.room_poll_interval)
    }
}

impl<C, P> std::fmt::Debug for ConnectionManager<C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("active", &self.active)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
