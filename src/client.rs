//! Async client for one watch-party room connection.
//!
//! [`WatchPartyClient`] is a thin handle that talks to a background session
//! loop over an unbounded MPSC channel. Events are emitted on a bounded
//! channel ([`tokio::sync::mpsc::Receiver<WatchPartyEvent>`]) returned from
//! [`WatchPartyClient::start`].
//!
//! The loop is the only place session state is touched: protocol messages,
//! player notifications, user actions, the typing-expiry timer and playlist
//! fetch completions are handled one at a time in a single `tokio::select!`.
//!
//! # Example
//!
//! ```rust,ignore
//! let handshake = Handshake::new(RoomName::new("movie-night")?, "Ana", JoinIntent::Join)?;
//! let transport = WebSocketTransport::connect(handshake.url(&endpoints.ws_base)?.as_str()).await?;
//! let directory = Arc::new(HttpDirectory::new(&endpoints)?);
//! let (client, mut events) = WatchPartyClient::start(
//!     transport, handshake, HeadlessPlayer::new(), directory, WatchPartyConfig::default(),
//! );
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         WatchPartyEvent::VideoChanged { video } => { /* load it in the UI */ }
//!         WatchPartyEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::directory::{Directory, DEFAULT_ROOM_POLL_INTERVAL};
use crate::error::{Result, WatchPartyError};
use crate::event::WatchPartyEvent;
use crate::handshake::{Handshake, RoomName};
use crate::player::{MediaPlayer, PlayerEvent};
use crate::protocol::{ParticipantId, ServerMessage, Video, VideoId};
use crate::reconcile::DEFAULT_DRIFT_THRESHOLD;
use crate::session::{Command, Effect, RoomSnapshot, Session};
use crate::signals::{DEFAULT_TYPING_QUIET_WINDOW, DEFAULT_TYPING_SEND_INTERVAL};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Source of per-connection epochs; playlist results carry the epoch of the
/// connection that asked for them.
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

// ── Configuration ───────────────────────────────────────────────────

/// Tuning for a [`WatchPartyClient`] connection.
///
/// Every field has a default matching the room server's reference client.
///
/// ```
/// use watchparty_client::client::WatchPartyConfig;
/// use std::time::Duration;
///
/// let config = WatchPartyConfig::default()
///     .with_event_channel_capacity(512)
///     .with_drift_threshold(0.5)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.event_channel_capacity, 512);
/// assert_eq!(config.typing_quiet_window, Duration::from_secs(4));
/// ```
#[derive(Debug, Clone)]
pub struct WatchPartyConfig {
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) so the session loop never blocks. `Disconnected` is always
    /// delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`WatchPartyClient::shutdown`] waits for the loop to close the
    /// transport before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Inbound `play` seeks first when the local player is further than this
    /// from the command's timestamp, in seconds. Defaults to **1.0**.
    pub drift_threshold: f64,
    /// A typist disappears after this long without another signal.
    /// Defaults to **4 seconds**.
    pub typing_quiet_window: Duration,
    /// Minimum gap between outbound typing signals. Defaults to **3 seconds**.
    pub typing_send_interval: Duration,
    /// Refresh period for [`RoomPoller`](crate::directory::RoomPoller).
    /// Defaults to **5 seconds**.
    pub room_poll_interval: Duration,
}

impl Default for WatchPartyConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            typing_quiet_window: DEFAULT_TYPING_QUIET_WINDOW,
            typing_send_interval: DEFAULT_TYPING_SEND_INTERVAL,
            room_poll_interval: DEFAULT_ROOM_POLL_INTERVAL,
        }
    }
}

impl WatchPartyConfig {
    /// Set the capacity of the bounded event channel. Values below 1 are
    /// clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown. A zero timeout aborts the
    /// session loop immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the drift tolerance for inbound `play`, in seconds. Negative
    /// values are clamped to 0.
    #[must_use]
    pub fn with_drift_threshold(mut self, seconds: f64) -> Self {
        self.drift_threshold = seconds.max(0.0);
        self
    }

    #[must_use]
    pub fn with_typing_quiet_window(mut self, window: Duration) -> Self {
        self.typing_quiet_window = window;
        self
    }

    #[must_use]
    pub fn with_typing_send_interval(mut self, interval: Duration) -> Self {
        self.typing_send_interval = interval;
        self
    }

    #[must_use]
    pub fn with_room_poll_interval(mut self, interval: Duration) -> Self {
        self.room_poll_interval = interval;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Shared between the handle and the session loop.
struct ClientState {
    connected: AtomicBool,
    snapshot: Mutex<RoomSnapshot>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            snapshot: Mutex::new(RoomSnapshot::default()),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to one room connection.
///
/// Created via [`WatchPartyClient::start`], which spawns the session loop and
/// returns this handle together with an event receiver. Methods queue a
/// command to the loop and return immediately.
pub struct WatchPartyClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<ClientState>,
    directory: Arc<dyn Directory>,
    room: RoomName,
    username: String,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl WatchPartyClient {
    /// Start the session loop on an already-connected transport.
    ///
    /// `handshake` must be the one the transport was opened with. The loop
    /// emits [`WatchPartyEvent::Connected`] and loads the room's playlist
    /// from `directory` straight away.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<P: MediaPlayer>(
        transport: impl Transport,
        handshake: Handshake,
        player: P,
        directory: Arc<dyn Directory>,
        config: WatchPartyConfig,
    ) -> (Self, mpsc::Receiver<WatchPartyEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<WatchPartyEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientState::new());
        let room = handshake.room.clone();
        let username = handshake.username.clone();
        let epoch = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
        let session = Session::new(handshake, epoch, player, &config);

        let task = tokio::spawn(session_loop(
            transport,
            session,
            Arc::clone(&directory),
            cmd_rx,
            event_tx,
            Arc::clone(&state),
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            directory,
            room,
            username,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Player notifications ────────────────────────────────────────

    /// The player finished loading the current media.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn player_ready(&self) -> Result<()> {
        self.player_event(PlayerEvent::Ready)
    }

    /// The player started playing at `time` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn played(&self, time: f64) -> Result<()> {
        self.player_event(PlayerEvent::Played { time })
    }

    /// The player paused at `time` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn paused(&self, time: f64) -> Result<()> {
        self.player_event(PlayerEvent::Paused { time })
    }

    /// The player's playhead moved to `time` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn seeked(&self, time: f64) -> Result<()> {
        self.player_event(PlayerEvent::Seeked { time })
    }

    /// Forward any player notification.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn player_event(&self, event: PlayerEvent) -> Result<()> {
        self.send(Command::Player(event))
    }

    // ── Room actions ────────────────────────────────────────────────

    /// Send a chat line. Blank lines are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::Chat(text.into()))
    }

    /// Announce that we are typing. Rate-limited by the session.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn send_typing(&self) -> Result<()> {
        self.send(Command::Typing)
    }

    /// Send an emoji reaction.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn react(&self, emoji: impl Into<String>) -> Result<()> {
        self.send(Command::React(emoji.into()))
    }

    /// Switch the room to another playlist entry. Ignored unless we are the
    /// host; the switch happens locally when the server broadcasts it.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn change_video(&self, video_id: VideoId) -> Result<()> {
        self.send(Command::ChangeVideo(video_id))
    }

    /// Give playback authority to `participant`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn grant_control(&self, participant: impl Into<ParticipantId>) -> Result<()> {
        self.send(Command::GrantControl(participant.into()))
    }

    /// Take playback authority from `participant`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn revoke_control(&self, participant: impl Into<ParticipantId>) -> Result<()> {
        self.send(Command::RevokeControl(participant.into()))
    }

    /// Ask the host for playback authority.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn request_control(&self) -> Result<()> {
        self.send(Command::RequestControl)
    }

    /// Tell peers the playlist changed so they refetch it.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended.
    pub fn notify_new_video(&self) -> Result<()> {
        self.send(Command::NotifyNewVideo)
    }

    /// Add a video to this room's playlist, then notify peers.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::NotConnected`] once the session has ended,
    /// or [`WatchPartyError::MetadataFetchFailed`] if the directory refused.
    pub async fn add_video(&self, video_url: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(WatchPartyError::NotConnected);
        }
        self.directory.add_video(&self.room, video_url).await?;
        self.notify_new_video()
    }

    /// Shut down the client, closing the transport and stopping the loop.
    ///
    /// A final `Disconnected { reason: None }` is emitted if the session was
    /// still live. Calling this more than once is harmless.
    pub async fn shutdown(&mut self) {
        debug!(room = %self.room, "WatchPartyClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout. If it doesn't exit in time, abort it
        // so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` until the session ends.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    pub fn room(&self) -> &RoomName {
        &self.room
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The session's state as of its last processed input.
    pub async fn snapshot(&self) -> RoomSnapshot {
        self.state.snapshot.lock().await.clone()
    }

    pub async fn is_host(&self) -> bool {
        self.state.snapshot.lock().await.is_host
    }

    pub async fn current_video(&self) -> Option<Video> {
        self.state.snapshot.lock().await.current_video.clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, cmd: Command) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(WatchPartyError::NotConnected);
        }
        self.cmd_tx
            .send(cmd)
            .map_err(|_| WatchPartyError::NotConnected)
    }
}

impl std::fmt::Debug for WatchPartyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchPartyClient")
            .field("room", &self.room)
            .field("username", &self.username)
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for WatchPartyClient {
    fn drop(&mut self) {
        // Drop cannot await a graceful close; aborting drops the loop future
        // (and with it the transport and any in-flight playlist fetches).
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

type PlaylistFetch = (u64, Result<Vec<Video>>);

/// Owns the transport and the session; multiplexes every input with
/// `tokio::select!`.
///
/// Exits once the session reaches `Disconnected`: on request, on an explicit
/// server error, or when the transport fails or closes.
async fn session_loop<P: MediaPlayer>(
    mut transport: impl Transport,
    mut session: Session<P>,
    directory: Arc<dyn Directory>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<WatchPartyEvent>,
    state: Arc<ClientState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!(room = %session.room(), "session loop started");
    let mut fetches: JoinSet<PlaylistFetch> = JoinSet::new();
    let mut io = LoopIo {
        transport: &mut transport,
        fetches: &mut fetches,
        directory: &directory,
        event_tx: &event_tx,
        state: &state,
    };

    let effects = session.start();
    io.apply(&mut session, effects).await;
    publish(&state, session.snapshot()).await;

    while !session.is_terminal() {
        let typing_deadline = session.typing_deadline();
        let effects = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => session.handle_command(cmd, Instant::now()),
                // Command channel closed: client handle dropped.
                None => session.close_requested(),
            },

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                session.close_requested()
            }

            incoming = io.transport.recv() => match incoming {
                Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(msg) => {
                        debug!(?msg, "received");
                        session.handle_server(msg, Instant::now())
                    }
                    Err(e) => {
                        warn!("failed to deserialize server message: {e} (raw: {text})");
                        Vec::new()
                    }
                },
                Some(Err(e)) => {
                    error!("transport receive error: {e}");
                    session.transport_closed()
                }
                None => {
                    debug!("transport closed by server");
                    session.transport_closed()
                }
            },

            Some(joined) = io.fetches.join_next(), if !io.fetches.is_empty() => match joined {
                Ok((epoch, result)) => session.playlist_loaded(epoch, result),
                Err(join_err) => {
                    debug!("playlist fetch task ended early: {join_err}");
                    Vec::new()
                }
            },

            _ = tokio::time::sleep_until(typing_deadline.unwrap_or_else(Instant::now)),
                if typing_deadline.is_some() => session.expire_typing(Instant::now()),
        };
        io.apply(&mut session, effects).await;
        publish(&state, session.snapshot()).await;
    }

    fetches.abort_all();
    debug!("session loop exited");
}

/// Everything the loop touches while carrying out effects.
struct LoopIo<'a, T> {
    transport: &'a mut T,
    fetches: &'a mut JoinSet<PlaylistFetch>,
    directory: &'a Arc<dyn Directory>,
    event_tx: &'a mpsc::Sender<WatchPartyEvent>,
    state: &'a ClientState,
}

impl<T: Transport> LoopIo<'_, T> {
    async fn apply<P: MediaPlayer>(&mut self, session: &mut Session<P>, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Send(msg) => {
                    if session.is_terminal() {
                        debug!(?msg, "dropping outbound message after disconnect");
                        continue;
                    }
                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            debug!(?msg, "sending");
                            if let Err(e) = self.transport.send(json).await {
                                error!("transport send error: {e}");
                                queue.extend(session.send_failed());
                            }
                        }
                        // Serialization errors are programming bugs; don't kill the loop.
                        Err(e) => error!("failed to serialize ClientMessage: {e}"),
                    }
                }
                Effect::Emit(WatchPartyEvent::Disconnected { reason }) => {
                    emit_disconnected(self.event_tx, self.state, reason).await;
                }
                Effect::Emit(event) => emit_event(self.event_tx, event),
                Effect::FetchPlaylist { epoch } => {
                    let directory = Arc::clone(self.directory);
                    let room = session.room().clone();
                    self.fetches
                        .spawn(async move { (epoch, directory.list_videos(&room).await) });
                }
                Effect::Close => {
                    if let Err(e) = self.transport.close().await {
                        debug!("transport close failed: {e}");
                    }
                }
            }
        }
    }
}

/// The snapshot is built before the await so no `Session` borrow is held
/// across it; `P` only has to be `Send`.
async fn publish(state: &ClientState, snapshot: RoomSnapshot) {
    *state.snapshot.lock().await = snapshot;
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the session loop.
fn emit_event(event_tx: &mpsc::Sender<WatchPartyEvent>, event: WatchPartyEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit [`WatchPartyEvent::Disconnected`] and mark the handle disconnected.
///
/// Uses `send().await` instead of `try_send` because `Disconnected` is always
/// the last event on the channel and must never be silently dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<WatchPartyEvent>,
    state: &ClientState,
    reason: Option<crate::error::RoomError>,
) {
    state.connected.store(false, Ordering::Release);
    let event = WatchPartyEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::error::RoomError;
    use crate::handshake::JoinIntent;
    use crate::player::HeadlessPlayer;
    use crate::protocol::{ClientMessage, RoomSummary};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    // ── Mocks ───────────────────────────────────────────────────────

    type Script = Vec<Option<std::result::Result<String, WatchPartyError>>>;

    /// Records sent messages and replays scripted responses.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, WatchPartyError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(incoming: Script) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), WatchPartyError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, WatchPartyError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // Script exhausted: stay open until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), WatchPartyError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// A directory with a fixed playlist.
    struct StaticDirectory(Vec<Video>);

    #[async_trait]
    impl Directory for StaticDirectory {
        async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
            Ok(Vec::new())
        }
        async fn list_videos(&self, _room: &RoomName) -> Result<Vec<Video>> {
            Ok(self.0.clone())
        }
        async fn add_video(&self, _room: &RoomName, _video_url: &str) -> Result<()> {
            Ok(())
        }
    }

    fn handshake() -> Handshake {
        Handshake::new(RoomName::new("general").unwrap(), "ana", JoinIntent::Join).unwrap()
    }

    fn start(script: Script, config: WatchPartyConfig) -> (
        WatchPartyClient,
        mpsc::Receiver<WatchPartyEvent>,
        Arc<StdMutex<Vec<String>>>,
        Arc<AtomicBool>,
    ) {
        let (transport, sent, closed) = MockTransport::new(script);
        let (client, events) = WatchPartyClient::start(
            transport,
            handshake(),
            HeadlessPlayer::new(),
            Arc::new(StaticDirectory(Vec::new())),
            config,
        );
        (client, events, sent, closed)
    }

    fn identity_json(is_host: bool) -> String {
        format!(r#"{{"type":"identity","user_id":"u1","is_host":{is_host}}}"#)
    }

    async fn next_matching(
        events: &mut mpsc::Receiver<WatchPartyEvent>,
        pred: impl Fn(&WatchPartyEvent) -> bool,
    ) -> WatchPartyEvent {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    /// `Send` but not `Sync`, like a player that keeps its clock in a `Cell`.
    struct CellPlayer {
        time: std::cell::Cell<f64>,
    }

    impl MediaPlayer for CellPlayer {
        fn current_time(&self) -> f64 {
            self.time.get()
        }
        fn seek_to(&mut self, seconds: f64) {
            self.time.set(seconds);
        }
        fn set_playing(&mut self, _playing: bool) {}
        fn load(&mut self, _video: &Video) {
            self.time.set(0.0);
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn connected_is_first_event() {
        let (mut client, mut events, _sent, _closed) = start(vec![], WatchPartyConfig::default());

        let first = events.recv().await.unwrap();
        assert!(
            matches!(first, WatchPartyEvent::Connected),
            "expected Connected as first event, got {first:?}"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn snapshot_tracks_identity() {
        let (mut client, mut events, _sent, _closed) =
            start(vec![Some(Ok(identity_json(true)))], WatchPartyConfig::default());

        next_matching(&mut events, |e| matches!(e, WatchPartyEvent::Identity { .. })).await;
        // Snapshot is published right after the event is emitted.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = client.snapshot().await;
        assert!(snapshot.is_host);
        assert_eq!(snapshot.own_id.as_deref(), Some("u1"));
        assert_eq!(snapshot.room.as_ref().map(RoomName::as_str), Some("general"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn session_loop_accepts_a_player_that_is_not_sync() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(identity_json(true)))]);
        let player = CellPlayer {
            time: std::cell::Cell::new(0.0),
        };
        // `start` spawns the loop, which only compiles if its future is Send.
        let (mut client, mut events) = WatchPartyClient::start(
            transport,
            handshake(),
            player,
            Arc::new(StaticDirectory(Vec::new())),
            WatchPartyConfig::default(),
        );

        next_matching(&mut events, |e| matches!(e, WatchPartyEvent::Identity { .. })).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(client.snapshot().await.is_host);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn chat_sends_correct_message() {
        let (mut client, mut events, sent, _closed) = start(vec![], WatchPartyConfig::default());
        let _ = events.recv().await; // Connected

        client.send_chat("hello room").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert_eq!(
                last,
                ClientMessage::Chat {
                    username: "ana".into(),
                    content: "hello room".into()
                }
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected_without_reason() {
        let (mut client, mut events, _sent, closed) = start(vec![], WatchPartyConfig::default());
        let _ = events.recv().await; // Connected

        client.shutdown().await;

        let event =
            next_matching(&mut events, |e| matches!(e, WatchPartyEvent::Disconnected { .. }))
                .await;
        assert_eq!(event, WatchPartyEvent::Disconnected { reason: None });
        assert!(closed.load(Ordering::Relaxed));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn not_connected_error_after_shutdown() {
        let (mut client, mut events, _sent, _closed) = start(vec![], WatchPartyConfig::default());
        let _ = events.recv().await; // Connected

        client.shutdown().await;

        assert!(matches!(
            client.request_control(),
            Err(WatchPartyError::NotConnected)
        ));
        assert!(matches!(
            client.add_video("https://example.com/a.mp4").await,
            Err(WatchPartyError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn recv_error_while_joining_reports_room_not_found() {
        let (mut client, mut events, _sent, _closed) = start(
            vec![Some(Err(WatchPartyError::TransportReceive("boom".into())))],
            WatchPartyConfig::default(),
        );

        let event =
            next_matching(&mut events, |e| matches!(e, WatchPartyEvent::Disconnected { .. }))
                .await;
        assert_eq!(
            event,
            WatchPartyEvent::Disconnected {
                reason: Some(RoomError::RoomNotFound)
            }
        );
        assert!(!client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_message_is_skipped() {
        let (mut client, mut events, _sent, _closed) = start(
            vec![Some(Ok("{not json".into())), Some(Ok(identity_json(false)))],
            WatchPartyConfig::default(),
        );

        let event =
            next_matching(&mut events, |e| matches!(e, WatchPartyEvent::Identity { .. })).await;
        assert!(matches!(event, WatchPartyEvent::Identity { is_host: false, .. }));
        assert!(client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = WatchPartyConfig::default();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.drift_threshold, 1.0);
        assert_eq!(config.typing_quiet_window, Duration::from_secs(4));
        assert_eq!(config.typing_send_interval, Duration::from_secs(3));
        assert_eq!(config.room_poll_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn config_builder_clamps() {
        let config = WatchPartyConfig::default()
            .with_event_channel_capacity(0)
            .with_drift_threshold(-2.0);
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.drift_threshold, 0.0);
    }

    #[tokio::test]
    async fn zero_event_channel_capacity_does_not_panic() {
        let mut config = WatchPartyConfig::default().with_shutdown_timeout(Duration::from_millis(50));
        // Bypass the builder clamp; start clamps again.
        config.event_channel_capacity = 0;
        let (mut client, mut events, _sent, _closed) = start(vec![], config);

        let event = events.recv().await.unwrap();
        assert!(matches!(event, WatchPartyEvent::Connected));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn event_channel_backpressure_does_not_block() {
        let mut script: Script = Vec::new();
        for i in 0..(DEFAULT_EVENT_CHANNEL_CAPACITY + 50) {
            script.push(Some(Ok(format!(
                r#"{{"type":"chat","username":"bo","content":"line {i}"}}"#
            ))));
        }
        script.push(None);
        let (mut client, mut events, _sent, _closed) = start(script, WatchPartyConfig::default());

        // Let the channel fill up before draining.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut count = 0;
        let mut last = None;
        while let Some(event) = events.recv().await {
            count += 1;
            last = Some(event);
        }
        assert!(count > 0);
        assert!(matches!(last, Some(WatchPartyEvent::Disconnected { .. })));

        client.shutdown().await;
    }

    /// Transport that hangs forever in `close()` so the shutdown abort path runs.
    struct HangingCloseTransport {
        close_called: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), WatchPartyError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, WatchPartyError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), WatchPartyError> {
            self.close_called.store(true, Ordering::Release);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_session_loop() {
        let close_called = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = HangingCloseTransport {
            close_called: Arc::clone(&close_called),
            dropped: Arc::clone(&dropped),
        };
        let config = WatchPartyConfig::default().with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, mut events) = WatchPartyClient::start(
            transport,
            handshake(),
            HeadlessPlayer::new(),
            Arc::new(StaticDirectory(Vec::new())),
            config,
        );
        let _ = events.recv().await; // Connected

        client.shutdown().await;

        assert!(close_called.load(Ordering::Acquire));
        assert!(dropped.load(Ordering::Acquire));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (client, mut events, _sent, _closed) = start(vec![], WatchPartyConfig::default());
        let _ = events.recv().await; // Connected

        drop(client);

        // The aborted loop drops its sender; the channel drains and closes.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (mut client, mut events, _sent, _closed) = start(vec![], WatchPartyConfig::default());
        let _ = events.recv().await; // Connected

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("WatchPartyClient"));
        assert!(debug_str.contains("general"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn epochs_are_unique_per_connection() {
        let a = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
        let b = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
        assert_ne!(a, b);
    }
}
