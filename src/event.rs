//! Events delivered to the application by a running session.

use crate::error::RoomError;
use crate::protocol::{Participant, ParticipantId, Video};
use crate::signals::{ChatLine, Reaction};

/// Everything a [`WatchPartyClient`](crate::WatchPartyClient) reports.
///
/// Events arrive on the bounded channel returned from
/// [`WatchPartyClient::start`](crate::WatchPartyClient::start). When the
/// consumer falls behind, events are dropped with a warning, except
/// [`Disconnected`](Self::Disconnected), which is always delivered and is
/// always the last event of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchPartyEvent {
    /// The session loop started; the room handshake has been accepted.
    Connected,

    /// The server told us who we are.
    Identity {
        user_id: ParticipantId,
        is_host: bool,
    },

    /// The roster was replaced.
    RosterChanged { participants: Vec<Participant> },

    /// Our playback authority changed.
    AuthorityChanged { is_host: bool },

    /// Identity and the first roster have both arrived.
    Synced,

    /// A chat or system line was appended to the log.
    Chat(ChatLine),

    /// The set of people currently typing changed.
    TypingChanged { names: Vec<String> },

    /// Someone reacted.
    Reaction(Reaction),

    /// A participant asked the host for control.
    ControlRequested { username: String },

    /// The playlist cache was replaced.
    PlaylistChanged { videos: Vec<Video> },

    /// A different video became current.
    VideoChanged { video: Video },

    /// The derived playing flag changed.
    PlaybackChanged { playing: bool },

    /// The video directory could not be queried. Not fatal.
    MetadataFetchFailed { message: String },

    /// The session ended.
    ///
    /// `reason` is `None` for a close the application asked for.
    Disconnected { reason: Option<RoomError> },
}
