//! Playback reconciliation: the rules that keep a local player in step with
//! the room's authoritative playback stream.
//!
//! [`Reconciler`] is sans-IO. It is handed the player for each call, reads
//! the authority flag from its caller, and returns [`SyncEffect`]s for the
//! session to carry out (outbound messages, playlist fetches, state-change
//! notifications).
//!
//! # Echo suppression
//!
//! Applying an inbound command makes the player emit the same notification a
//! user action would. Immediately before applying an inbound command of kind
//! K the engine tags K in a single slot; the next local notification of kind
//! K consumes the tag instead of being broadcast. Notifications of any other
//! kind pass through untouched.
//!
//! # Readiness
//!
//! Until the player reports [`PlayerEvent::Ready`] for the current media,
//! inbound positioning is buffered in one pending slot (last write wins) and
//! applied once readiness arrives. The same holds while a refetch for a
//! video the room switched to is in flight; if the refetch comes back
//! without it, the switch is deferred and the player keeps following the
//! room on the video it has.

use tracing::{debug, warn};

use crate::player::{MediaPlayer, PlaybackKind, PlayerEvent};
use crate::protocol::{ClientMessage, PlaybackStatus, Video, VideoId, UNSET_VIDEO_ID};

/// Default drift tolerance for inbound `play`, in seconds.
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 1.0;

/// An authoritative position waiting for the player to become ready.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingSync {
    /// Position to seek to, in seconds.
    pub time: f64,
    /// Playing state to apply after the seek; `None` keeps the current one.
    pub playing: Option<bool>,
}

/// Work the session must carry out after a reconciliation step.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEffect {
    /// Send this message to the room server.
    Send(ClientMessage),
    /// Fetch the room's playlist and hand it to [`Reconciler::playlist_loaded`]
    /// tagged with `epoch`.
    FetchPlaylist { epoch: u64 },
    /// The derived playing flag changed.
    PlaybackChanged { playing: bool },
    /// The current video changed.
    VideoChanged(Video),
    /// The cached playlist was replaced.
    PlaylistChanged(Vec<Video>),
}

/// Per-connection reconciliation state.
#[derive(Debug)]
pub struct Reconciler {
    username: String,
    epoch: u64,
    drift_threshold: f64,

    ready: bool,
    pending: Option<PendingSync>,
    suppress: Option<PlaybackKind>,

    playing: bool,
    playlist: Vec<Video>,
    current: Option<VideoId>,
    /// Video an inbound command referenced before it was in the playlist.
    awaiting: Option<VideoId>,
    /// A refetch for `awaiting` is in flight; positioning is held until it
    /// lands.
    refetching: bool,
}

impl Reconciler {
    /// Fresh state for one connection. `epoch` tags playlist fetches so
    /// results from another connection are discarded.
    pub fn new(username: impl Into<String>, epoch: u64) -> Self {
        Self {
            username: username.into(),
            epoch,
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            ready: false,
            pending: None,
            suppress: None,
            playing: false,
            playlist: Vec::new(),
            current: None,
            awaiting: None,
            refetching: false,
        }
    }

    #[must_use]
    pub fn with_drift_threshold(mut self, seconds: f64) -> Self {
        self.drift_threshold = seconds.max(0.0);
        self
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the player has signalled readiness for the current media.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn pending(&self) -> Option<PendingSync> {
        self.pending
    }

    /// The echo kind currently tagged for suppression.
    pub fn suppressed(&self) -> Option<PlaybackKind> {
        self.suppress
    }

    pub fn playlist(&self) -> &[Video] {
        &self.playlist
    }

    pub fn current_video(&self) -> Option<&Video> {
        let id = self.current?;
        self.playlist.iter().find(|v| v.id == id)
    }

    pub fn current_video_id(&self) -> Option<VideoId> {
        self.current
    }

    /// Video referenced by the room but not yet present in the playlist.
    pub fn awaiting_video(&self) -> Option<VideoId> {
        self.awaiting
    }

    /// The effect that loads the playlist for this connection.
    pub fn fetch_playlist(&self) -> SyncEffect {
        SyncEffect::FetchPlaylist { epoch: self.epoch }
    }

    // ── Inbound commands ────────────────────────────────────────────

    /// Inbound `play`: correct drift beyond the threshold, then resume.
    pub fn remote_play(&mut self, timestamp: f64, player: &mut impl MediaPlayer) -> Vec<SyncEffect> {
        if self.holding() {
            self.buffer(timestamp, Some(true));
            return Vec::new();
        }
        let drift = (player.current_time() - timestamp).abs();
        self.suppress = Some(PlaybackKind::Play);
        if drift > self.drift_threshold {
            debug!(drift, timestamp, "play: correcting drift");
            player.seek_to(timestamp);
        }
        player.set_playing(true);
        self.set_playing(true).into_iter().collect()
    }

    /// Inbound `pause`: always snap to the exact timestamp, then pause.
    pub fn remote_pause(
        &mut self,
        timestamp: f64,
        player: &mut impl MediaPlayer,
    ) -> Vec<SyncEffect> {
        if self.holding() {
            self.buffer(timestamp, Some(false));
            return Vec::new();
        }
        self.suppress = Some(PlaybackKind::Pause);
        player.seek_to(timestamp);
        player.set_playing(false);
        self.set_playing(false).into_iter().collect()
    }

    /// Inbound `seek`: apply now if ready, otherwise buffer.
    pub fn remote_seek(&mut self, timestamp: f64, player: &mut impl MediaPlayer) -> Vec<SyncEffect> {
        if self.holding() {
            self.buffer(timestamp, None);
            return Vec::new();
        }
        self.suppress = Some(PlaybackKind::Seek);
        player.seek_to(timestamp);
        Vec::new()
    }

    /// Inbound `sync_state`: switch video if needed, then converge on the
    /// snapshot now or once the player is ready.
    pub fn remote_sync_state(
        &mut self,
        timestamp: f64,
        status: PlaybackStatus,
        video_id: VideoId,
        player: &mut impl MediaPlayer,
    ) -> Vec<SyncEffect> {
        let mut effects = Vec::new();
        if video_id != UNSET_VIDEO_ID {
            if self.current == Some(video_id) {
                // The room is on the video we have; an older switch is moot.
                self.clear_awaiting();
            } else {
                effects.extend(self.select_video(video_id, player));
            }
        }
        let playing = status.is_playing();
        if self.holding() {
            self.buffer(timestamp, Some(playing));
            return effects;
        }
        self.suppress = Some(PlaybackKind::Seek);
        player.seek_to(timestamp);
        player.set_playing(playing);
        effects.extend(self.set_playing(playing));
        effects
    }

    /// Inbound `change_video`: the room restarts at 0, paused, on `video_id`.
    pub fn remote_change_video(
        &mut self,
        video_id: VideoId,
        player: &mut impl MediaPlayer,
    ) -> Vec<SyncEffect> {
        self.pending = None;
        self.select_video(video_id, player)
    }

    /// Inbound `new_video`: the playlist grew.
    pub fn remote_new_video(&self) -> Vec<SyncEffect> {
        vec![self.fetch_playlist()]
    }

    // ── Playlist ────────────────────────────────────────────────────

    /// Apply a fetched playlist.
    ///
    /// Results tagged with another epoch are dropped. A video the room
    /// referenced before it was cached is switched to if it is now present;
    /// otherwise the first entry becomes current when nothing is.
    pub fn playlist_loaded(
        &mut self,
        epoch: u64,
        videos: Vec<Video>,
        player: &mut impl MediaPlayer,
    ) -> Vec<SyncEffect> {
        if epoch != self.epoch {
            debug!(
                epoch,
                current = self.epoch,
                "discarding playlist fetched for a torn-down connection"
            );
            return Vec::new();
        }
        self.playlist = videos;
        let mut effects = vec![SyncEffect::PlaylistChanged(self.playlist.clone())];

        if let Some(target) = self.awaiting {
            match self.playlist.iter().find(|v| v.id == target).cloned() {
                Some(video) => {
                    self.clear_awaiting();
                    effects.extend(self.switch_to(video, player));
                }
                None => {
                    warn!(video_id = target, "video still missing after refetch; switch deferred");
                    // Later loads may still resolve it, but stop holding
                    // positioning for a video that is not coming.
                    self.refetching = false;
                    effects.extend(self.apply_pending(player));
                }
            }
        } else if self.current.is_none() {
            if let Some(first) = self.playlist.first().cloned() {
                effects.extend(self.switch_to(first, player));
            }
        }
        effects
    }

    // ── Local player notifications ──────────────────────────────────

    /// Handle a notification from the local player.
    ///
    /// `is_authority` is read by the caller at handling time; only the
    /// authority's genuine actions are broadcast.
    pub fn local_event(
        &mut self,
        event: PlayerEvent,
        is_authority: bool,
        player: &mut impl MediaPlayer,
    ) -> Vec<SyncEffect> {
        match event {
            PlayerEvent::Ready => self.player_ready(player),
            PlayerEvent::Played { time } => {
                let mut effects: Vec<SyncEffect> = self.set_playing(true).into_iter().collect();
                if !self.consume_echo(PlaybackKind::Play) && is_authority {
                    effects.push(SyncEffect::Send(ClientMessage::Play {
                        username: self.username.clone(),
                        timestamp: time,
                        video_id: self.current_or_unset(),
                    }));
                }
                effects
            }
            PlayerEvent::Paused { time } => {
                let mut effects: Vec<SyncEffect> = self.set_playing(false).into_iter().collect();
                if !self.consume_echo(PlaybackKind::Pause) && is_authority {
                    effects.push(SyncEffect::Send(ClientMessage::Pause {
                        username: self.username.clone(),
                        timestamp: time,
                        video_id: self.current_or_unset(),
                    }));
                }
                effects
            }
            PlayerEvent::Seeked { time } => {
                // Startup jitter from the player's own initialization.
                if !self.ready {
                    return Vec::new();
                }
                if self.consume_echo(PlaybackKind::Seek) || !is_authority {
                    return Vec::new();
                }
                vec![SyncEffect::Send(ClientMessage::Seek {
                    username: self.username.clone(),
                    timestamp: time,
                    video_id: self.current_or_unset(),
                })]
            }
        }
    }

    /// Ask the room to switch video. Only the authority may.
    pub fn request_video_change(
        &self,
        video_id: VideoId,
        is_authority: bool,
    ) -> Option<ClientMessage> {
        if !is_authority {
            warn!(video_id, "ignoring video change: not the room's host");
            return None;
        }
        Some(ClientMessage::ChangeVideo {
            username: self.username.clone(),
            video_id,
        })
    }

    // ── Internals ───────────────────────────────────────────────────

    fn player_ready(&mut self, player: &mut impl MediaPlayer) -> Vec<SyncEffect> {
        self.ready = true;
        self.apply_pending(player)
    }

    /// Inbound positioning is buffered instead of applied.
    fn holding(&self) -> bool {
        !self.ready || self.refetching
    }

    fn apply_pending(&mut self, player: &mut impl MediaPlayer) -> Vec<SyncEffect> {
        if self.holding() {
            return Vec::new();
        }
        let Some(pending) = self.pending.take() else {
            return Vec::new();
        };
        debug!(time = pending.time, playing = ?pending.playing, "applying pending sync");
        self.suppress = Some(PlaybackKind::Seek);
        player.seek_to(pending.time);
        match pending.playing {
            Some(playing) => {
                player.set_playing(playing);
                self.set_playing(playing).into_iter().collect()
            }
            None => Vec::new(),
        }
    }

    /// Switch to `video_id` if cached, otherwise remember it and refetch.
    fn select_video(&mut self, video_id: VideoId, player: &mut impl MediaPlayer) -> Vec<SyncEffect> {
        match self.playlist.iter().find(|v| v.id == video_id).cloned() {
            Some(video) => {
                self.clear_awaiting();
                self.switch_to(video, player)
            }
            None => {
                debug!(video_id, "video not in playlist cache; refetching");
                self.awaiting = Some(video_id);
                self.refetching = true;
                vec![self.fetch_playlist()]
            }
        }
    }

    fn switch_to(&mut self, video: Video, player: &mut impl MediaPlayer) -> Vec<SyncEffect> {
        debug!(video_id = video.id, title = %video.title, "switching video");
        self.current = Some(video.id);
        self.suppress = None;
        self.ready = false;
        player.load(&video);
        let mut effects = vec![SyncEffect::VideoChanged(video)];
        effects.extend(self.set_playing(false));
        effects
    }

    fn clear_awaiting(&mut self) {
        self.awaiting = None;
        self.refetching = false;
    }

    fn buffer(&mut self, time: f64, playing: Option<bool>) {
        if let Some(previous) = self.pending.replace(PendingSync { time, playing }) {
            debug!(replaced = previous.time, time, "pending sync overwritten");
        }
    }

    fn consume_echo(&mut self, kind: PlaybackKind) -> bool {
        if self.suppress == Some(kind) {
            self.suppress = None;
            true
        } else {
            false
        }
    }

    fn set_playing(&mut self, playing: bool) -> Option<SyncEffect> {
        if self.playing == playing {
            return None;
        }
        self.playing = playing;
        Some(SyncEffect::PlaybackChanged { playing })
    }

    fn current_or_unset(&self) -> VideoId {
        self.current.unwrap_or(UNSET_VIDEO_ID)
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

    #[derive(Debug, Clone, PartialEq)]
    enum Cmd {
        Seek(f64),
        Playing(bool),
        Load(VideoId),
    }

    #[derive(Debug, Default)]
    struct ScriptedPlayer {
        time: f64,
        commands: Vec<Cmd>,
    }

    impl MediaPlayer for ScriptedPlayer {
        fn current_time(&self) -> f64 {
            self.time
        }
        fn seek_to(&mut self, seconds: f64) {
            self.time = seconds;
            self.commands.push(Cmd::Seek(seconds));
        }
        fn set_playing(&mut self, playing: bool) {
            self.commands.push(Cmd::Playing(playing));
        }
        fn load(&mut self, video: &Video) {
            self.time = 0.0;
            self.commands.push(Cmd::Load(video.id));
        }
    }

    fn video(id: VideoId) -> Video {
        Video {
            id,
            title: format!("video {id}"),
            video_url: format!("https://example.com/{id}.mp4"),
            thumbnail: None,
        }
    }

    fn sends(effects: &[SyncEffect]) -> Vec<&ClientMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                SyncEffect::Send(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    /// Engine with videos 1..=3 cached, video 1 current and the player ready.
    fn ready_engine(player: &mut ScriptedPlayer) -> Reconciler {
        let mut engine = Reconciler::new("ana", 1);
        engine.playlist_loaded(1, vec![video(1), video(2), video(3)], player);
        engine.local_event(PlayerEvent::Ready, false, player);
        player.commands.clear();
        engine
    }

    #[test]
    fn play_beyond_drift_threshold_seeks_first() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);
        player.time = 50.0;

        let effects = engine.remote_play(53.2, &mut player);

        assert_eq!(player.commands, vec![Cmd::Seek(53.2), Cmd::Playing(true)]);
        assert!(engine.is_playing());
        assert!(effects.contains(&SyncEffect::PlaybackChanged { playing: true }));
    }

    #[test]
    fn play_within_drift_threshold_does_not_seek() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);
        player.time = 50.0;

        engine.remote_play(50.4, &mut player);

        assert_eq!(player.commands, vec![Cmd::Playing(true)]);
        assert!(engine.is_playing());
    }

    #[test]
    fn custom_drift_threshold_is_honoured() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player).with_drift_threshold(5.0);
        player.time = 50.0;

        engine.remote_play(53.2, &mut player);

        assert_eq!(player.commands, vec![Cmd::Playing(true)]);
    }

    #[test]
    fn pause_always_snaps_to_timestamp() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);
        engine.remote_play(77.0, &mut player);
        player.commands.clear();
        player.time = 77.05;

        engine.remote_pause(77.0, &mut player);

        assert_eq!(player.commands, vec![Cmd::Seek(77.0), Cmd::Playing(false)]);
        assert!(!engine.is_playing());
    }

    #[test]
    fn echo_of_applied_command_is_not_broadcast() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        engine.remote_play(10.0, &mut player);
        let effects = engine.local_event(PlayerEvent::Played { time: 10.0 }, true, &mut player);

        assert!(sends(&effects).is_empty());
        assert_eq!(engine.suppressed(), None);
    }

    #[test]
    fn different_kind_during_suppression_is_broadcast() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        engine.remote_play(10.0, &mut player);
        let effects = engine.local_event(PlayerEvent::Seeked { time: 30.0 }, true, &mut player);

        assert_eq!(
            sends(&effects),
            vec![&ClientMessage::Seek {
                username: "ana".into(),
                timestamp: 30.0,
                video_id: 1,
            }]
        );
        // The play tag is still waiting for its own echo.
        assert_eq!(engine.suppressed(), Some(PlaybackKind::Play));
    }

    #[test]
    fn second_notification_of_same_kind_is_genuine() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        engine.remote_pause(5.0, &mut player);
        let echo = engine.local_event(PlayerEvent::Paused { time: 5.0 }, true, &mut player);
        let genuine = engine.local_event(PlayerEvent::Paused { time: 6.0 }, true, &mut player);

        assert!(sends(&echo).is_empty());
        assert_eq!(sends(&genuine).len(), 1);
    }

    #[test]
    fn non_authority_never_broadcasts() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        let mut effects = Vec::new();
        effects.extend(engine.local_event(PlayerEvent::Played { time: 1.0 }, false, &mut player));
        effects.extend(engine.local_event(PlayerEvent::Seeked { time: 2.0 }, false, &mut player));
        effects.extend(engine.local_event(PlayerEvent::Paused { time: 3.0 }, false, &mut player));

        assert!(sends(&effects).is_empty());
        // Local UI state still follows the player.
        assert!(!engine.is_playing());
        assert!(effects.contains(&SyncEffect::PlaybackChanged { playing: true }));
        assert!(effects.contains(&SyncEffect::PlaybackChanged { playing: false }));
    }

    #[test]
    fn authority_broadcasts_genuine_actions_with_current_video() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        let effects = engine.local_event(PlayerEvent::Played { time: 12.0 }, true, &mut player);

        assert_eq!(
            sends(&effects),
            vec![&ClientMessage::Play {
                username: "ana".into(),
                timestamp: 12.0,
                video_id: 1,
            }]
        );
    }

    #[test]
    fn seeks_before_ready_are_startup_jitter() {
        let mut player = ScriptedPlayer::default();
        let mut engine = Reconciler::new("ana", 1);

        let effects = engine.local_event(PlayerEvent::Seeked { time: 0.3 }, true, &mut player);

        assert!(effects.is_empty());
    }

    #[test]
    fn late_join_sync_applies_once_on_ready() {
        let mut player = ScriptedPlayer::default();
        let mut engine = Reconciler::new("ana", 1);
        engine.playlist_loaded(1, vec![video(1)], &mut player);
        player.commands.clear();

        let effects = engine.remote_sync_state(120.0, PlaybackStatus::Playing, 1, &mut player);
        assert!(effects.is_empty());
        assert!(player.commands.is_empty());
        assert_eq!(
            engine.pending(),
            Some(PendingSync {
                time: 120.0,
                playing: Some(true)
            })
        );

        let effects = engine.local_event(PlayerEvent::Ready, false, &mut player);
        assert_eq!(player.commands, vec![Cmd::Seek(120.0), Cmd::Playing(true)]);
        assert!(effects.contains(&SyncEffect::PlaybackChanged { playing: true }));
        assert_eq!(engine.pending(), None);

        // A second readiness signal does not replay anything.
        player.commands.clear();
        engine.local_event(PlayerEvent::Ready, false, &mut player);
        assert!(player.commands.is_empty());
    }

    #[test]
    fn pending_sync_is_last_write_wins() {
        let mut player = ScriptedPlayer::default();
        let mut engine = Reconciler::new("ana", 1);

        engine.remote_sync_state(10.0, PlaybackStatus::Paused, UNSET_VIDEO_ID, &mut player);
        engine.remote_sync_state(20.0, PlaybackStatus::Playing, UNSET_VIDEO_ID, &mut player);
        engine.local_event(PlayerEvent::Ready, false, &mut player);

        assert_eq!(player.commands, vec![Cmd::Seek(20.0), Cmd::Playing(true)]);
    }

    #[test]
    fn applied_pending_seek_is_not_echoed() {
        let mut player = ScriptedPlayer::default();
        let mut engine = Reconciler::new("ana", 1);
        engine.remote_seek(42.0, &mut player);
        engine.local_event(PlayerEvent::Ready, true, &mut player);

        let effects = engine.local_event(PlayerEvent::Seeked { time: 42.0 }, true, &mut player);

        assert!(sends(&effects).is_empty());
    }

    #[test]
    fn buffered_seek_keeps_playing_state() {
        let mut player = ScriptedPlayer::default();
        let mut engine = Reconciler::new("ana", 1);

        engine.remote_seek(42.0, &mut player);
        engine.local_event(PlayerEvent::Ready, false, &mut player);

        assert_eq!(player.commands, vec![Cmd::Seek(42.0)]);
        assert!(!engine.is_playing());
    }

    #[test]
    fn change_video_resets_readiness_and_buffers_next_seek() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);
        engine.remote_play(5.0, &mut player);
        player.commands.clear();

        let effects = engine.remote_change_video(3, &mut player);

        assert_eq!(engine.current_video_id(), Some(3));
        assert!(!engine.is_playing());
        assert!(!engine.is_ready());
        assert_eq!(engine.suppressed(), None);
        assert_eq!(player.commands, vec![Cmd::Load(3)]);
        assert!(effects.contains(&SyncEffect::VideoChanged(video(3))));
        assert!(effects.contains(&SyncEffect::PlaybackChanged { playing: false }));

        player.commands.clear();
        engine.remote_seek(8.0, &mut player);
        assert!(player.commands.is_empty());
        assert_eq!(engine.pending().map(|p| p.time), Some(8.0));

        engine.local_event(PlayerEvent::Ready, false, &mut player);
        assert_eq!(player.commands, vec![Cmd::Seek(8.0)]);
    }

    #[test]
    fn change_video_cache_miss_refetches_then_switches() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        let effects = engine.remote_change_video(9, &mut player);
        assert_eq!(effects, vec![SyncEffect::FetchPlaylist { epoch: 1 }]);
        assert_eq!(engine.current_video_id(), Some(1));
        assert_eq!(engine.awaiting_video(), Some(9));

        let effects =
            engine.playlist_loaded(1, vec![video(1), video(2), video(3), video(9)], &mut player);
        assert!(effects.contains(&SyncEffect::VideoChanged(video(9))));
        assert_eq!(engine.current_video_id(), Some(9));
        assert_eq!(engine.awaiting_video(), None);
        assert!(!engine.is_ready());
    }

    #[test]
    fn change_video_still_missing_after_refetch_is_deferred() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        engine.remote_change_video(9, &mut player);
        let effects = engine.playlist_loaded(1, vec![video(1), video(2)], &mut player);

        assert_eq!(effects, vec![SyncEffect::PlaylistChanged(vec![video(1), video(2)])]);
        assert_eq!(engine.current_video_id(), Some(1));
        assert_eq!(engine.awaiting_video(), Some(9));
    }

    #[test]
    fn deferred_switch_releases_positioning_on_current_video() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        engine.remote_change_video(9, &mut player);
        engine.remote_seek(40.0, &mut player);
        assert!(player.commands.is_empty());

        // The refetch comes back without video 9: the held seek lands now.
        engine.playlist_loaded(1, vec![video(1), video(2)], &mut player);
        assert_eq!(player.commands, vec![Cmd::Seek(40.0)]);
        assert_eq!(engine.pending(), None);

        player.commands.clear();
        engine.local_event(PlayerEvent::Ready, false, &mut player);
        engine.remote_sync_state(50.0, PlaybackStatus::Playing, 1, &mut player);

        assert_eq!(player.commands, vec![Cmd::Seek(50.0), Cmd::Playing(true)]);
        assert!(engine.is_playing());
        assert_eq!(engine.pending(), None);
        assert_eq!(engine.awaiting_video(), None);
    }

    #[test]
    fn deferred_switch_still_resolves_on_a_later_playlist() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        engine.remote_change_video(9, &mut player);
        engine.playlist_loaded(1, vec![video(1)], &mut player);
        engine.remote_seek(12.0, &mut player);
        assert_eq!(player.commands, vec![Cmd::Seek(12.0)]);

        player.commands.clear();
        engine.playlist_loaded(1, vec![video(1), video(9)], &mut player);
        assert_eq!(engine.current_video_id(), Some(9));
        assert_eq!(player.commands, vec![Cmd::Load(9)]);
    }

    #[test]
    fn play_during_refetch_is_carried_to_the_new_video() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        engine.remote_change_video(9, &mut player);
        engine.remote_play(0.0, &mut player);
        assert!(player.commands.is_empty());
        assert_eq!(
            engine.pending(),
            Some(PendingSync {
                time: 0.0,
                playing: Some(true)
            })
        );

        engine.playlist_loaded(1, vec![video(1), video(9)], &mut player);
        engine.local_event(PlayerEvent::Ready, false, &mut player);

        assert_eq!(
            player.commands,
            vec![Cmd::Load(9), Cmd::Seek(0.0), Cmd::Playing(true)]
        );
        assert!(engine.is_playing());
    }

    #[test]
    fn pause_during_refetch_is_held() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);
        engine.remote_play(3.0, &mut player);
        player.commands.clear();

        engine.remote_change_video(9, &mut player);
        engine.remote_pause(4.0, &mut player);

        assert!(player.commands.is_empty());
        assert_eq!(engine.pending().and_then(|p| p.playing), Some(false));
    }

    #[test]
    fn sync_state_for_uncached_video_converges_after_refetch() {
        let mut player = ScriptedPlayer::default();
        let mut engine = Reconciler::new("ana", 4);

        // Snapshot arrives before the first playlist load.
        let effects = engine.remote_sync_state(30.0, PlaybackStatus::Playing, 2, &mut player);
        assert_eq!(effects, vec![SyncEffect::FetchPlaylist { epoch: 4 }]);

        // The playlist arrives; video 2 is selected rather than the first entry.
        engine.playlist_loaded(4, vec![video(1), video(2)], &mut player);
        assert_eq!(engine.current_video_id(), Some(2));
        assert_eq!(player.commands, vec![Cmd::Load(2)]);

        engine.local_event(PlayerEvent::Ready, false, &mut player);
        assert_eq!(
            player.commands,
            vec![Cmd::Load(2), Cmd::Seek(30.0), Cmd::Playing(true)]
        );
    }

    #[test]
    fn sync_state_switching_video_defers_seek_until_ready() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        engine.remote_sync_state(61.0, PlaybackStatus::Paused, 2, &mut player);
        assert_eq!(player.commands, vec![Cmd::Load(2)]);
        assert!(!engine.is_ready());

        engine.local_event(PlayerEvent::Ready, false, &mut player);
        assert_eq!(
            player.commands,
            vec![Cmd::Load(2), Cmd::Seek(61.0), Cmd::Playing(false)]
        );
    }

    #[test]
    fn sync_state_on_ready_player_applies_immediately() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        engine.remote_sync_state(15.0, PlaybackStatus::Playing, 1, &mut player);

        assert_eq!(player.commands, vec![Cmd::Seek(15.0), Cmd::Playing(true)]);
        assert_eq!(engine.suppressed(), Some(PlaybackKind::Seek));
    }

    #[test]
    fn first_playlist_entry_becomes_current() {
        let mut player = ScriptedPlayer::default();
        let mut engine = Reconciler::new("ana", 1);

        let effects = engine.playlist_loaded(1, vec![video(5), video(6)], &mut player);

        assert_eq!(engine.current_video().map(|v| v.id), Some(5));
        assert!(effects.contains(&SyncEffect::VideoChanged(video(5))));
    }

    #[test]
    fn refresh_keeps_current_video() {
        let mut player = ScriptedPlayer::default();
        let mut engine = ready_engine(&mut player);

        engine.playlist_loaded(1, vec![video(1), video(2), video(3), video(4)], &mut player);

        assert_eq!(engine.current_video_id(), Some(1));
        assert!(engine.is_ready());
        assert!(player.commands.is_empty());
    }

    #[test]
    fn stale_epoch_playlist_is_discarded() {
        let mut player = ScriptedPlayer::default();
        let mut engine = Reconciler::new("ana", 2);

        let effects = engine.playlist_loaded(1, vec![video(1)], &mut player);

        assert!(effects.is_empty());
        assert!(engine.playlist().is_empty());
        assert!(player.commands.is_empty());
    }

    #[test]
    fn only_authority_may_request_video_change() {
        let engine = Reconciler::new("ana", 1);
        assert_eq!(engine.request_video_change(4, false), None);
        assert_eq!(
            engine.request_video_change(4, true),
            Some(ClientMessage::ChangeVideo {
                username: "ana".into(),
                video_id: 4
            })
        );
    }

    #[test]
    fn play_before_ready_is_buffered() {
        let mut player = ScriptedPlayer::default();
        let mut engine = Reconciler::new("ana", 1);

        engine.remote_play(9.0, &mut player);
        assert!(player.commands.is_empty());

        engine.local_event(PlayerEvent::Ready, false, &mut player);
        assert_eq!(player.commands, vec![Cmd::Seek(9.0), Cmd::Playing(true)]);
    }
}
