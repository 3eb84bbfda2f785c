#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for watch-party client integration tests.
//!
//! Provides a channel-driven [`MockTransport`] with a [`MockServer`] handle
//! for pushing room-server messages mid-test, a recording [`MockPlayer`], a
//! scripted [`MockDirectory`], a [`MockConnector`], and JSON builders that
//! mirror the room server's wire output.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use watchparty_client::protocol::{ClientMessage, RoomSummary, Video, VideoId};
use watchparty_client::{
    Connector, Directory, Handshake, MediaPlayer, RoomName, RoomSnapshot, Transport,
    WatchPartyClient, WatchPartyError, WatchPartyEvent,
};

type Incoming = Option<Result<String, WatchPartyError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-backed mock transport.
///
/// Messages pushed through the paired [`MockServer`] are yielded by `recv()`
/// in order. Once the server handle is dropped, `recv()` hangs so the session
/// loop stays alive until shutdown.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// The test's side of a [`MockTransport`].
#[derive(Clone)]
pub struct MockServer {
    tx: mpsc::UnboundedSender<Incoming>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a transport whose first `recv()` calls yield `script`.
    pub fn new(script: Vec<String>) -> (Self, MockServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        for message in script {
            tx.send(Some(Ok(message))).unwrap();
        }
        let transport = Self {
            incoming: rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, MockServer { tx, sent, closed })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), WatchPartyError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(WatchPartyError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, WatchPartyError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), WatchPartyError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl MockServer {
    /// Deliver one JSON message to the client.
    pub fn push(&self, message: impl Into<String>) {
        self.tx.send(Some(Ok(message.into()))).unwrap();
    }

    /// Close the connection from the server side.
    pub fn hang_up(&self) {
        self.tx.send(None).unwrap();
    }

    /// Fail the connection with a receive error.
    pub fn fail(&self, reason: &str) {
        self.tx
            .send(Some(Err(WatchPartyError::TransportReceive(reason.into()))))
            .unwrap();
    }

    /// Everything the client has sent, decoded.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).expect("client sent invalid JSON"))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

// ── MockPlayer ──────────────────────────────────────────────────────

/// A command the session issued to the player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Seek(f64),
    Playing(bool),
    Load(VideoId),
}

#[derive(Debug, Default)]
struct PlayerLog {
    time: f64,
    commands: Vec<PlayerCommand>,
}

/// A recording player. Clones share one log, so a handle kept by the test
/// sees what the session did.
#[derive(Debug, Clone, Default)]
pub struct MockPlayer {
    log: Arc<StdMutex<PlayerLog>>,
}

impl MockPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the simulated playhead without recording a command.
    pub fn set_time(&self, seconds: f64) {
        self.log.lock().unwrap().time = seconds;
    }

    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.log.lock().unwrap().commands.clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().commands.clear();
    }
}

impl MediaPlayer for MockPlayer {
    fn current_time(&self) -> f64 {
        self.log.lock().unwrap().time
    }

    fn seek_to(&mut self, seconds: f64) {
        let mut log = self.log.lock().unwrap();
        log.time = seconds;
        log.commands.push(PlayerCommand::Seek(seconds));
    }

    fn set_playing(&mut self, playing: bool) {
        self.log
            .lock()
            .unwrap()
            .commands
            .push(PlayerCommand::Playing(playing));
    }

    fn load(&mut self, video: &Video) {
        let mut log = self.log.lock().unwrap();
        log.time = 0.0;
        log.commands.push(PlayerCommand::Load(video.id));
    }
}

// ── MockDirectory ───────────────────────────────────────────────────

/// Scripted room and video metadata.
#[derive(Default)]
pub struct MockDirectory {
    playlists: StdMutex<HashMap<String, Vec<Video>>>,
    delays: StdMutex<HashMap<String, Duration>>,
    rooms: StdMutex<Vec<RoomSummary>>,
    fail_videos: AtomicBool,
    pub added: StdMutex<Vec<(String, String)>>,
    pub video_requests: AtomicUsize,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_playlist(self, room: &str, videos: Vec<Video>) -> Self {
        self.set_playlist(room, videos);
        self
    }

    /// Delay every playlist response for `room`.
    pub fn with_delay(self, room: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(room.into(), delay);
        self
    }

    pub fn with_rooms(self, rooms: Vec<RoomSummary>) -> Self {
        *self.rooms.lock().unwrap() = rooms;
        self
    }

    pub fn set_playlist(&self, room: &str, videos: Vec<Video>) {
        self.playlists.lock().unwrap().insert(room.into(), videos);
    }

    pub fn fail_videos(&self, fail: bool) {
        self.fail_videos.store(fail, Ordering::Relaxed);
    }

    pub fn requests(&self) -> usize {
        self.video_requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Directory for MockDirectory {
    async fn list_rooms(&self) -> watchparty_client::Result<Vec<RoomSummary>> {
        Ok(self.rooms.lock().unwrap().clone())
    }

    async fn list_videos(&self, room: &RoomName) -> watchparty_client::Result<Vec<Video>> {
        self.video_requests.fetch_add(1, Ordering::Relaxed);
        let delay = self.delays.lock().unwrap().get(room.as_str()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_videos.load(Ordering::Relaxed) {
            return Err(WatchPartyError::MetadataFetchFailed("video service down".into()));
        }
        Ok(self
            .playlists
            .lock()
            .unwrap()
            .get(room.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn add_video(&self, room: &RoomName, video_url: &str) -> watchparty_client::Result<()> {
        self.added
            .lock()
            .unwrap()
            .push((room.as_str().to_owned(), video_url.to_owned()));
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out queued transports (or errors) and records every handshake.
#[derive(Clone, Default)]
pub struct MockConnector {
    queue: Arc<StdMutex<VecDeque<Result<MockTransport, WatchPartyError>>>>,
    pub handshakes: Arc<StdMutex<Vec<Handshake>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a connection that succeeds; returns its server handle.
    pub fn accept(&self, script: Vec<String>) -> MockServer {
        let (transport, server) = MockTransport::new(script);
        self.queue.lock().unwrap().push_back(Ok(transport));
        server
    }

    /// Queue a connection that fails.
    pub fn refuse(&self, err: WatchPartyError) {
        self.queue.lock().unwrap().push_back(Err(err));
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, handshake: &Handshake) -> watchparty_client::Result<MockTransport> {
        self.handshakes.lock().unwrap().push(handshake.clone());
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(WatchPartyError::TransportClosed))
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn video(id: VideoId) -> Video {
    Video {
        id,
        title: format!("Video {id}"),
        video_url: format!("https://cdn.example.com/{id}.mp4"),
        thumbnail: None,
    }
}

/// A server message with every field the room server always writes.
fn server_message(kind: &str, fields: serde_json::Value) -> String {
    let mut message = json!({
        "type": kind,
        "username": "",
        "user_id": "",
        "content": "",
        "timestamp": 0,
        "video_id": 0,
        "room": "",
        "is_host": false,
    });
    if let (Some(base), Some(extra)) = (message.as_object_mut(), fields.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    message.to_string()
}

pub fn identity_json(user_id: &str, is_host: bool) -> String {
    server_message("identity", json!({ "user_id": user_id, "is_host": is_host }))
}

/// `user_list` with `(id, username, is_host)` entries.
pub fn user_list_json(users: &[(&str, &str, bool)]) -> String {
    let list: Vec<_> = users
        .iter()
        .map(|(id, username, is_host)| json!({ "id": id, "username": username, "is_host": is_host }))
        .collect();
    server_message("user_list", json!({ "user_list": list }))
}

pub fn sync_state_json(timestamp: f64, status: &str, video_id: VideoId) -> String {
    server_message(
        "sync_state",
        json!({ "timestamp": timestamp, "content": status, "video_id": video_id }),
    )
}

pub fn play_json(timestamp: f64) -> String {
    server_message("play", json!({ "username": "host", "timestamp": timestamp, "video_id": 1 }))
}

pub fn pause_json(timestamp: f64) -> String {
    server_message("pause", json!({ "username": "host", "timestamp": timestamp, "video_id": 1 }))
}

pub fn seek_json(timestamp: f64) -> String {
    server_message("seek", json!({ "username": "host", "timestamp": timestamp, "video_id": 1 }))
}

pub fn change_video_json(video_id: VideoId) -> String {
    server_message("change_video", json!({ "username": "host", "video_id": video_id }))
}

pub fn new_video_json() -> String {
    server_message("new_video", json!({ "username": "host", "room": "general" }))
}

pub fn chat_json(username: &str, content: &str) -> String {
    server_message("chat", json!({ "username": username, "content": content }))
}

pub fn system_json(content: &str) -> String {
    server_message("system", json!({ "content": content }))
}

pub fn typing_json(username: &str) -> String {
    server_message("typing", json!({ "username": username }))
}

pub fn reaction_json(username: &str, emoji: &str) -> String {
    server_message("reaction", json!({ "username": username, "content": emoji }))
}

pub fn request_control_json(username: &str) -> String {
    server_message("request_control", json!({ "username": username }))
}

pub fn error_json(reason: &str) -> String {
    server_message("error", json!({ "content": reason }))
}

/// The usual join sequence: identity, sync state, roster.
pub fn join_script(is_host: bool, sync: (f64, &str, VideoId)) -> Vec<String> {
    vec![
        identity_json("u1", is_host),
        sync_state_json(sync.0, sync.1, sync.2),
        user_list_json(&[("u1", "ana", is_host), ("u2", "bo", !is_host)]),
    ]
}

// ── Waiting helpers ─────────────────────────────────────────────────

/// Let the session loop drain its queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Poll the client's snapshot until `pred` holds.
pub async fn wait_for_snapshot(
    client: &WatchPartyClient,
    pred: impl Fn(&RoomSnapshot) -> bool,
) -> RoomSnapshot {
    for _ in 0..200 {
        let snapshot = client.snapshot().await;
        if pred(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("snapshot condition not reached: {:?}", client.snapshot().await);
}

/// Receive events until one matches `pred`.
pub async fn next_event(
    events: &mut mpsc::Receiver<WatchPartyEvent>,
    pred: impl Fn(&WatchPartyEvent) -> bool,
) -> WatchPartyEvent {
    let wait = async {
        loop {
            match events.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => {}
                None => panic!("event channel closed before the expected event"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("timed out waiting for event")
}
