//! Ephemeral signals: chat lines, typing indicators, and emoji reactions.
//!
//! None of this survives a reconnect. The types here take the current
//! [`Instant`] as an argument so they can be driven by any clock; the session
//! loop passes `tokio::time::Instant::now()`.

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// Default quiet window after which a typist disappears.
pub const DEFAULT_TYPING_QUIET_WINDOW: Duration = Duration::from_secs(4);
/// Default minimum gap between outbound typing signals.
pub const DEFAULT_TYPING_SEND_INTERVAL: Duration = Duration::from_secs(3);

// ── Chat ────────────────────────────────────────────────────────────

/// Origin of a chat log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// Written by a participant.
    User,
    /// Announced by the room server.
    System,
}

/// One line of the session's chat log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub kind: ChatKind,
    pub username: String,
    pub content: String,
}

// ── Typing ──────────────────────────────────────────────────────────

/// Who is typing right now.
///
/// Each inbound signal (re)starts a quiet window for that name; the name is
/// dropped once the window passes without another signal.
#[derive(Debug, Clone)]
pub struct TypingTracker {
    quiet_window: Duration,
    ignored: Option<String>,
    // Insertion order is display order.
    active: Vec<(String, Instant)>,
}

impl TypingTracker {
    pub fn new(quiet_window: Duration) -> Self {
        Self {
            quiet_window,
            ignored: None,
            active: Vec::new(),
        }
    }

    /// Ignore signals for `name` (our own echoes).
    #[must_use]
    pub fn ignoring(mut self, name: impl Into<String>) -> Self {
        self.ignored = Some(name.into());
        self
    }

    /// Record a typing signal. Returns `true` if the visible set changed.
    pub fn note(&mut self, name: &str, now: Instant) -> bool {
        if name.is_empty() || self.ignored.as_deref() == Some(name) {
            return false;
        }
        let deadline = now + self.quiet_window;
        if let Some(entry) = self.active.iter_mut().find(|(n, _)| n == name) {
            entry.1 = deadline;
            return false;
        }
        self.active.push((name.to_owned(), deadline));
        true
    }

    /// Drop everyone whose window has passed. Returns `true` if anyone left.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.active.len();
        self.active.retain(|(_, deadline)| *deadline > now);
        self.active.len() != before
    }

    /// The earliest pending expiry, for scheduling a timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.iter().map(|(_, deadline)| *deadline).min()
    }

    pub fn names(&self) -> Vec<String> {
        self.active.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_QUIET_WINDOW)
    }
}

/// Rate limit for outbound typing signals.
#[derive(Debug, Clone)]
pub struct TypingThrottle {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl TypingThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    /// Whether a signal may go out at `now`; records the send if so.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last_sent {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_sent = Some(now);
                true
            }
        }
    }
}

impl Default for TypingThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_SEND_INTERVAL)
    }
}

// ── Reactions ───────────────────────────────────────────────────────

/// A reaction as surfaced for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// Fresh per reaction so repeated identical emoji re-trigger animations.
    pub id: Uuid,
    pub username: String,
    pub emoji: String,
}

/// Holds only the most recent reaction.
#[derive(Debug, Clone, Default)]
pub struct ReactionFeed {
    latest: Option<Reaction>,
}

impl ReactionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest reaction and return it.
    pub fn push(&mut self, username: impl Into<String>, emoji: impl Into<String>) -> Reaction {
        let reaction = Reaction {
            id: Uuid::new_v4(),
            username: username.into(),
            emoji: emoji.into(),
        };
        self.latest = Some(reaction.clone());
        reaction
    }

    pub fn latest(&self) -> Option<&Reaction> {
        self.latest.as_ref()
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
    fn typing_expires_after_quiet_window() {
        let start = Instant::now();
        let mut tracker = TypingTracker::default();

        assert!(tracker.note("bo", start));
        assert_eq!(tracker.names(), vec!["bo".to_owned()]);

        assert!(!tracker.expire(start + Duration::from_millis(3_900)));
        assert!(tracker.expire(start + Duration::from_secs(4)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn repeat_signal_resets_window() {
        let start = Instant::now();
        let mut tracker = TypingTracker::default();

        tracker.note("bo", start);
        assert!(!tracker.note("bo", start + Duration::from_secs(3)));

        assert!(!tracker.expire(start + Duration::from_secs(5)));
        assert_eq!(
            tracker.next_deadline(),
            Some(start + Duration::from_secs(7))
        );
        assert!(tracker.expire(start + Duration::from_secs(7)));
    }

    #[test]
    fn own_name_is_ignored() {
        let mut tracker = TypingTracker::default().ignoring("ana");
        assert!(!tracker.note("ana", Instant::now()));
        assert!(tracker.is_empty());
    }

    #[test]
    fn typists_keep_arrival_order() {
        let now = Instant::now();
        let mut tracker = TypingTracker::default();
        tracker.note("cy", now);
        tracker.note("bo", now);
        tracker.note("cy", now);
        assert_eq!(tracker.names(), vec!["cy".to_owned(), "bo".to_owned()]);
    }

    #[test]
    fn throttle_allows_one_send_per_interval() {
        let start = Instant::now();
        let mut throttle = TypingThrottle::default();

        assert!(throttle.try_acquire(start));
        assert!(!throttle.try_acquire(start + Duration::from_secs(1)));
        assert!(!throttle.try_acquire(start + Duration::from_millis(2_999)));
        assert!(throttle.try_acquire(start + Duration::from_secs(3)));
    }

    #[test]
    fn each_reaction_gets_a_fresh_id() {
        let mut feed = ReactionFeed::new();
        let first = feed.push("bo", "🎉");
        let second = feed.push("bo", "🎉");

        assert_ne!(first.id, second.id);
        assert_eq!(feed.latest(), Some(&second));
    }
}
