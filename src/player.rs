//! The media player seam.
//!
//! The physical playback engine is an external collaborator. The session
//! drives it through [`MediaPlayer`] and learns what it did through
//! [`PlayerEvent`]s the embedding application forwards from the player's
//! callbacks.

use std::time::Instant;

use crate::protocol::Video;

/// Commands the reconciliation engine issues to the local player.
///
/// Calls are synchronous and must not block; a player living on a UI thread
/// can forward them over a channel. Every `seek_to` is expected to produce
/// exactly one [`PlayerEvent::Seeked`], and every `set_playing` that changes
/// state exactly one [`PlayerEvent::Played`] or [`PlayerEvent::Paused`].
pub trait MediaPlayer: Send + 'static {
    /// Current playhead position in seconds.
    fn current_time(&self) -> f64;

    /// Move the playhead.
    fn seek_to(&mut self, seconds: f64);

    /// Resume or pause playback.
    fn set_playing(&mut self, playing: bool);

    /// Load another video, paused at position 0. The player must report
    /// [`PlayerEvent::Ready`] again once the new media accepts seeks.
    fn load(&mut self, video: &Video);
}

/// Notifications from the local player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// Media finished loading and accepts seeks.
    Ready,
    /// Playback started at `time`.
    Played { time: f64 },
    /// Playback paused at `time`.
    Paused { time: f64 },
    /// The playhead moved to `time`.
    Seeked { time: f64 },
}

/// Kind of a playback command, used to tag the echo to suppress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackKind {
    Play,
    Pause,
    Seek,
}

impl PlayerEvent {
    /// Playback kind of this notification, if it has one.
    pub fn kind(&self) -> Option<PlaybackKind> {
        match self {
            Self::Ready => None,
            Self::Played { .. } => Some(PlaybackKind::Play),
            Self::Paused { .. } => Some(PlaybackKind::Pause),
            Self::Seeked { .. } => Some(PlaybackKind::Seek),
        }
    }
}

/// A clock-driven stand-in for a real player.
///
/// Keeps a playhead that advances with wall time while playing. Useful for
/// headless participants (bots, terminal clients) that follow a room without
/// rendering video.
///
/// Unlike a real player it has no callbacks, so it never produces
/// [`PlayerEvent`]s. Its owner reports [`PlayerEvent::Ready`] after each
/// load. Since no `Played`, `Paused` or `Seeked` is ever forwarded, a
/// session driving it never broadcasts playback even while holding
/// authority: it only follows.
#[derive(Debug, Clone)]
pub struct HeadlessPlayer {
    position: f64,
    playing_since: Option<Instant>,
    loaded: Option<Video>,
}

impl HeadlessPlayer {
    pub fn new() -> Self {
        Self {
            position: 0.0,
            playing_since: None,
            loaded: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing_since.is_some()
    }

    /// The video most recently passed to [`MediaPlayer::load`].
    pub fn loaded(&self) -> Option<&Video> {
        self.loaded.as_ref()
    }
}

impl Default for HeadlessPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaPlayer for HeadlessPlayer {
    fn current_time(&self) -> f64 {
        match self.playing_since {
            Some(since) => self.position + since.elapsed().as_secs_f64(),
            None => self.position,
        }
    }

    fn seek_to(&mut self, seconds: f64) {
        self.position = seconds.max(0.0);
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
    }

    fn set_playing(&mut self, playing: bool) {
        match (playing, self.playing_since) {
            (true, None) => self.playing_since = Some(Instant::now()),
            (false, Some(_)) => {
                self.position = self.current_time();
                self.playing_since = None;
            }
            _ => {}
        }
    }

    fn load(&mut self, video: &Video) {
        self.loaded = Some(video.clone());
        self.position = 0.0;
        self.playing_since = None;
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

    fn video() -> Video {
        Video {
            id: 1,
            title: "Intro".into(),
            video_url: "https://example.com/1.mp4".into(),
            thumbnail: None,
        }
    }

    #[test]
    fn event_kinds() {
        assert_eq!(PlayerEvent::Ready.kind(), None);
        assert_eq!(
            PlayerEvent::Played { time: 1.0 }.kind(),
            Some(PlaybackKind::Play)
        );
        assert_eq!(
            PlayerEvent::Seeked { time: 1.0 }.kind(),
            Some(PlaybackKind::Seek)
        );
    }

    #[test]
    fn headless_player_holds_position_while_paused() {
        let mut player = HeadlessPlayer::new();
        player.seek_to(42.0);
        assert!(!player.is_playing());
        assert_eq!(player.current_time(), 42.0);
    }

    #[test]
    fn headless_player_advances_while_playing() {
        let mut player = HeadlessPlayer::new();
        player.seek_to(10.0);
        player.set_playing(true);
        assert!(player.current_time() >= 10.0);
        player.set_playing(false);
        let frozen = player.current_time();
        assert_eq!(player.current_time(), frozen);
    }

    #[test]
    fn load_resets_to_paused_at_zero() {
        let mut player = HeadlessPlayer::new();
        player.seek_to(30.0);
        player.set_playing(true);
        player.load(&video());
        assert!(!player.is_playing());
        assert_eq!(player.current_time(), 0.0);
        assert_eq!(player.loaded().map(|v| v.id), Some(1));
    }
}
