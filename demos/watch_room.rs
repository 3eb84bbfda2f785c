//! # Watch Room Demo
//!
//! A headless participant that follows a watch-party room:
//!
//! 1. List the rooms the server knows about
//! 2. Join (or create) a room over WebSocket
//! 3. Follow the room's playback with a clock-driven player
//! 4. Log chat, reactions, host changes and video switches
//! 5. Leave cleanly on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start the room server on :8080 and the video service on :8000, then:
//! cargo run --example watch_room -- movie-night Ana
//!
//! # Create the room instead of joining it:
//! cargo run --example watch_room -- movie-night Ana create
//!
//! # Point at other servers:
//! WATCHPARTY_WS_URL=wss://party.example.com WATCHPARTY_API_URL=https://api.example.com \
//!     cargo run --example watch_room -- movie-night Ana
//! ```

use std::sync::Arc;

use watchparty_client::{
    ConnectionManager, Endpoints, HeadlessPlayer, HttpDirectory, JoinIntent, RoomName,
    WatchPartyConfig, WatchPartyEvent, WebSocketConnector,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=watchparty_client=debug` for protocol traces.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let mut args = std::env::args().skip(1);
    let room = RoomName::new(args.next().unwrap_or_else(|| "general".to_owned()))?;
    let username = args.next().unwrap_or_else(|| "watcher".to_owned());
    let intent = match args.next().as_deref() {
        Some("create") => JoinIntent::Create,
        _ => JoinIntent::Join,
    };

    let endpoints = Endpoints::from_env();
    tracing::info!(ws = %endpoints.ws_base, api = %endpoints.api_base, "using endpoints");

    let mut manager = ConnectionManager::new(
        WebSocketConnector::from_endpoints(&endpoints),
        HeadlessPlayer::new(),
        Arc::new(HttpDirectory::new(&endpoints)?),
        WatchPartyConfig::default(),
    );

    // ── Room listing ────────────────────────────────────────────────
    let poller = manager.room_poller();
    let mut rooms = poller.subscribe();
    if tokio::time::timeout(std::time::Duration::from_secs(2), rooms.changed())
        .await
        .is_ok()
    {
        for summary in poller.rooms() {
            tracing::info!("room {} ({} watching)", summary.name, summary.count);
        }
    }
    drop(poller);

    // ── Join ────────────────────────────────────────────────────────
    let mut events = manager.open(room, &username, intent).await?;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("event channel closed, exiting");
                    break;
                };
                let Some(client) = manager.client() else { break };

                match event {
                    WatchPartyEvent::Connected => tracing::info!("connected, waiting for the room"),
                    WatchPartyEvent::Synced => {
                        let snapshot = client.snapshot().await;
                        tracing::info!(
                            "in room with {} participant(s), host: {} (me: {})",
                            snapshot.participants.len(),
                            snapshot.host.as_ref().map_or("nobody", |p| p.username.as_str()),
                            snapshot.is_host
                        );
                    }
                    // The headless player is ready as soon as it has loaded.
                    WatchPartyEvent::VideoChanged { video } => {
                        tracing::info!("now showing {} ({})", video.title, video.video_url);
                        client.player_ready()?;
                    }
                    WatchPartyEvent::PlaybackChanged { playing } => {
                        tracing::info!("{}", if playing { "playing" } else { "paused" });
                    }
                    WatchPartyEvent::AuthorityChanged { is_host } => {
                        tracing::info!("host control: {is_host}");
                    }
                    WatchPartyEvent::Chat(line) => {
                        tracing::info!("[{:?}] {}: {}", line.kind, line.username, line.content);
                    }
                    WatchPartyEvent::Reaction(reaction) => {
                        tracing::info!("{} reacted {}", reaction.username, reaction.emoji);
                    }
                    WatchPartyEvent::ControlRequested { username } => {
                        tracing::info!("{username} asked for control");
                    }
                    WatchPartyEvent::MetadataFetchFailed { message } => {
                        tracing::warn!("video service unavailable: {message}");
                    }
                    WatchPartyEvent::Disconnected { reason } => {
                        match reason {
                            Some(reason) => tracing::warn!("left room: {reason}"),
                            None => tracing::info!("left room"),
                        }
                        break;
                    }
                    other => tracing::debug!("event: {other:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving room");
                manager.close().await;
            }
        }
    }

    manager.close().await;
    Ok(())
}
