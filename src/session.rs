//! Per-connection session state and message dispatch.
//!
//! A [`Session`] owns everything that belongs to one room membership: the
//! reconciliation engine, presence, ephemeral signals, the chat log and the
//! player. It does no I/O. The client loop feeds it inbound messages, local
//! commands, timer expiries and playlist fetch results, and carries out the
//! [`Effect`]s it returns.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::WatchPartyConfig;
use crate::error::{Result, RoomError};
use crate::event::WatchPartyEvent;
use crate::handshake::{Handshake, JoinIntent, RoomName};
use crate::player::{MediaPlayer, PlayerEvent};
use crate::presence::Presence;
use crate::protocol::{
    ClientMessage, Participant, ParticipantId, ServerMessage, Video, VideoId,
};
use crate::reconcile::{PendingSync, Reconciler, SyncEffect};
use crate::signals::{
    ChatKind, ChatLine, Reaction, ReactionFeed, TypingThrottle, TypingTracker,
};

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No room.
    #[default]
    Idle,
    /// Connected, identity or roster not yet received.
    Joining,
    /// Identity and at least one roster received.
    Synced,
    /// Terminal for this connection.
    Disconnected,
}

/// A point-in-time copy of everything the session knows about its room.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomSnapshot {
    pub room: Option<RoomName>,
    pub phase: Phase,
    pub own_id: Option<ParticipantId>,
    pub is_host: bool,
    /// Whoever the latest roster flags as host; may be someone else.
    pub host: Option<Participant>,
    pub participants: Vec<Participant>,
    pub playlist: Vec<Video>,
    pub current_video: Option<Video>,
    pub playing: bool,
    pub player_ready: bool,
    pub pending_sync: Option<PendingSync>,
    pub typing: Vec<String>,
    pub last_reaction: Option<Reaction>,
    /// Shared with the session; a snapshot does not copy the log.
    pub chat: Arc<Vec<ChatLine>>,
    pub error: Option<RoomError>,
}

/// Local requests routed through the session loop.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Player(PlayerEvent),
    Chat(String),
    Typing,
    React(String),
    ChangeVideo(VideoId),
    GrantControl(ParticipantId),
    RevokeControl(ParticipantId),
    RequestControl,
    NotifyNewVideo,
}

/// Work for the client loop.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    Send(ClientMessage),
    Emit(WatchPartyEvent),
    FetchPlaylist { epoch: u64 },
    Close,
}

pub(crate) struct Session<P> {
    room: RoomName,
    username: String,
    intent: JoinIntent,
    phase: Phase,
    player: P,
    reconciler: Reconciler,
    presence: Presence,
    typing: TypingTracker,
    throttle: TypingThrottle,
    reactions: ReactionFeed,
    chat: Arc<Vec<ChatLine>>,
    error: Option<RoomError>,
}

impl<P: MediaPlayer> Session<P> {
    pub fn new(handshake: Handshake, epoch: u64, player: P, config: &WatchPartyConfig) -> Self {
        let Handshake {
            room,
            username,
            intent,
        } = handshake;
        Self {
            reconciler: Reconciler::new(username.clone(), epoch)
                .with_drift_threshold(config.drift_threshold),
            typing: TypingTracker::new(config.typing_quiet_window).ignoring(username.clone()),
            throttle: TypingThrottle::new(config.typing_send_interval),
            room,
            username,
            intent,
            phase: Phase::Idle,
            player,
            presence: Presence::new(),
            reactions: ReactionFeed::new(),
            chat: Arc::default(),
            error: None,
        }
    }

    pub fn room(&self) -> &RoomName {
        &self.room
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Disconnected
    }

    /// Enter `Joining` and kick off the initial playlist load.
    pub fn start(&mut self) -> Vec<Effect> {
        info!(room = %self.room, username = %self.username, "joined room connection");
        self.phase = Phase::Joining;
        vec![
            Effect::Emit(WatchPartyEvent::Connected),
            Effect::FetchPlaylist {
                epoch: self.reconciler.epoch(),
            },
        ]
    }

    // ── Inbound ─────────────────────────────────────────────────────

    pub fn handle_server(&mut self, msg: ServerMessage, now: Instant) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        match msg {
            ServerMessage::Identity { user_id, is_host } => {
                let changed = self.presence.apply_identity(user_id.clone(), is_host);
                let mut effects = vec![Effect::Emit(WatchPartyEvent::Identity { user_id, is_host })];
                if changed {
                    effects.push(Effect::Emit(WatchPartyEvent::AuthorityChanged { is_host }));
                }
                effects.extend(self.check_synced());
                effects
            }
            ServerMessage::UserList { user_list } => {
                let changed = self.presence.apply_user_list(user_list);
                let mut effects = vec![Effect::Emit(WatchPartyEvent::RosterChanged {
                    participants: self.presence.roster().to_vec(),
                })];
                if changed {
                    effects.push(Effect::Emit(WatchPartyEvent::AuthorityChanged {
                        is_host: self.presence.is_authority(),
                    }));
                }
                effects.extend(self.check_synced());
                effects
            }
            ServerMessage::Chat { username, content } => {
                self.append_chat(ChatKind::User, username, content)
            }
            ServerMessage::System { username, content } => {
                self.append_chat(ChatKind::System, username, content)
            }
            ServerMessage::Typing { username } => {
                if self.typing.note(&username, now) {
                    vec![self.typing_changed()]
                } else {
                    Vec::new()
                }
            }
            ServerMessage::Reaction { username, content } => {
                let reaction = self.reactions.push(username, content);
                vec![Effect::Emit(WatchPartyEvent::Reaction(reaction))]
            }
            ServerMessage::Play { timestamp } => {
                let effects = self.reconciler.remote_play(timestamp, &mut self.player);
                Self::lift(effects)
            }
            ServerMessage::Pause { timestamp } => {
                let effects = self.reconciler.remote_pause(timestamp, &mut self.player);
                Self::lift(effects)
            }
            ServerMessage::Seek { timestamp } => {
                let effects = self.reconciler.remote_seek(timestamp, &mut self.player);
                Self::lift(effects)
            }
            ServerMessage::SyncState {
                timestamp,
                content,
                video_id,
            } => {
                let effects =
                    self.reconciler
                        .remote_sync_state(timestamp, content, video_id, &mut self.player);
                Self::lift(effects)
            }
            ServerMessage::ChangeVideo { video_id } => {
                let effects = self.reconciler.remote_change_video(video_id, &mut self.player);
                Self::lift(effects)
            }
            ServerMessage::NewVideo => Self::lift(self.reconciler.remote_new_video()),
            ServerMessage::RequestControl { username } => {
                if username == self.username {
                    Vec::new()
                } else {
                    vec![Effect::Emit(WatchPartyEvent::ControlRequested { username })]
                }
            }
            ServerMessage::Error { content } => {
                warn!(reason = content.as_str(), "server rejected session: {}", content.description());
                self.fail(content.to_room_error())
            }
            ServerMessage::Unknown => {
                debug!("ignoring unknown server message type");
                Vec::new()
            }
        }
    }

    /// A playlist fetch finished.
    pub fn playlist_loaded(&mut self, epoch: u64, result: Result<Vec<Video>>) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        match result {
            Ok(videos) => {
                let effects = self.reconciler.playlist_loaded(epoch, videos, &mut self.player);
                Self::lift(effects)
            }
            Err(e) if epoch == self.reconciler.epoch() => {
                warn!(room = %self.room, "playlist fetch failed: {e}");
                vec![Effect::Emit(WatchPartyEvent::MetadataFetchFailed {
                    message: e.to_string(),
                })]
            }
            Err(e) => {
                debug!(epoch, "ignoring failed playlist fetch for a torn-down connection: {e}");
                Vec::new()
            }
        }
    }

    // ── Local ───────────────────────────────────────────────────────

    pub fn handle_command(&mut self, cmd: Command, now: Instant) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        match cmd {
            Command::Player(event) => {
                let is_authority = self.presence.is_authority();
                let effects = self
                    .reconciler
                    .local_event(event, is_authority, &mut self.player);
                Self::lift(effects)
            }
            Command::Chat(text) => {
                let content = text.trim();
                if content.is_empty() {
                    debug!("not sending blank chat message");
                    return Vec::new();
                }
                vec![Effect::Send(ClientMessage::Chat {
                    username: self.username.clone(),
                    content: content.to_owned(),
                })]
            }
            Command::Typing => {
                if self.throttle.try_acquire(now) {
                    vec![Effect::Send(ClientMessage::Typing {
                        username: self.username.clone(),
                    })]
                } else {
                    Vec::new()
                }
            }
            Command::React(emoji) => {
                if emoji.trim().is_empty() {
                    return Vec::new();
                }
                vec![Effect::Send(ClientMessage::Reaction {
                    username: self.username.clone(),
                    content: emoji,
                })]
            }
            Command::ChangeVideo(video_id) => self
                .reconciler
                .request_video_change(video_id, self.presence.is_authority())
                .map(Effect::Send)
                .into_iter()
                .collect(),
            Command::GrantControl(target) => {
                vec![Effect::Send(ClientMessage::GrantControl { content: target })]
            }
            Command::RevokeControl(target) => {
                vec![Effect::Send(ClientMessage::RevokeControl { content: target })]
            }
            Command::RequestControl => vec![Effect::Send(ClientMessage::RequestControl {
                username: self.username.clone(),
            })],
            Command::NotifyNewVideo => vec![Effect::Send(ClientMessage::NewVideo {
                username: self.username.clone(),
                room: self.room.as_str().to_owned(),
            })],
        }
    }

    // ── Timers ──────────────────────────────────────────────────────

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.next_deadline()
    }

    pub fn expire_typing(&mut self, now: Instant) -> Vec<Effect> {
        if self.typing.expire(now) {
            vec![self.typing_changed()]
        } else {
            Vec::new()
        }
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// The application asked to leave. No error is reported.
    pub fn close_requested(&mut self) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        debug!(room = %self.room, "closing connection on request");
        self.phase = Phase::Disconnected;
        vec![
            Effect::Close,
            Effect::Emit(WatchPartyEvent::Disconnected { reason: None }),
        ]
    }

    /// The transport closed or failed without being asked to.
    ///
    /// A close before the session was established while joining means the
    /// room was not there; anything else is a lost connection.
    pub fn transport_closed(&mut self) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        let reason = if self.phase == Phase::Joining && self.intent == JoinIntent::Join {
            RoomError::RoomNotFound
        } else {
            RoomError::ConnectionLost
        };
        self.lose(reason)
    }

    /// Writing to the transport failed.
    pub fn send_failed(&mut self) -> Vec<Effect> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.lose(RoomError::ConnectionLost)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room: Some(self.room.clone()),
            phase: self.phase,
            own_id: self.presence.own_id().cloned(),
            is_host: self.presence.is_authority(),
            host: self.presence.host().cloned(),
            participants: self.presence.roster().to_vec(),
            playlist: self.reconciler.playlist().to_vec(),
            current_video: self.reconciler.current_video().cloned(),
            playing: self.reconciler.is_playing(),
            player_ready: self.reconciler.is_ready(),
            pending_sync: self.reconciler.pending(),
            typing: self.typing.names(),
            last_reaction: self.reactions.latest().cloned(),
            chat: Arc::clone(&self.chat),
            error: self.error.clone(),
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn check_synced(&mut self) -> Option<Effect> {
        if self.phase == Phase::Joining && self.presence.is_established() {
            info!(room = %self.room, is_host = self.presence.is_authority(), "room session synced");
            self.phase = Phase::Synced;
            Some(Effect::Emit(WatchPartyEvent::Synced))
        } else {
            None
        }
    }

    fn append_chat(&mut self, kind: ChatKind, username: String, content: String) -> Vec<Effect> {
        let line = ChatLine {
            kind,
            username,
            content,
        };
        Arc::make_mut(&mut self.chat).push(line.clone());
        vec![Effect::Emit(WatchPartyEvent::Chat(line))]
    }

    fn typing_changed(&self) -> Effect {
        Effect::Emit(WatchPartyEvent::TypingChanged {
            names: self.typing.names(),
        })
    }

    /// Explicit server error: close ourselves and report it.
    fn fail(&mut self, reason: RoomError) -> Vec<Effect> {
        self.phase = Phase::Disconnected;
        self.error = Some(reason.clone());
        vec![
            Effect::Close,
            Effect::Emit(WatchPartyEvent::Disconnected {
                reason: Some(reason),
            }),
        ]
    }

    fn lose(&mut self, reason: RoomError) -> Vec<Effect> {
        warn!(room = %self.room, phase = ?self.phase, "connection ended abnormally: {reason}");
        self.phase = Phase::Disconnected;
        self.error = Some(reason.clone());
        vec![Effect::Emit(WatchPartyEvent::Disconnected {
            reason: Some(reason),
        })]
    }

    fn lift(effects: Vec<SyncEffect>) -> Vec<Effect> {
        effects
            .into_iter()
            .map(|effect| match effect {
                SyncEffect::Send(msg) => Effect::Send(msg),
                SyncEffect::FetchPlaylist { epoch } => Effect::FetchPlaylist { epoch },
                SyncEffect::PlaybackChanged { playing } => {
                    Effect::Emit(WatchPartyEvent::PlaybackChanged { playing })
                }
                SyncEffect::VideoChanged(video) => {
                    Effect::Emit(WatchPartyEvent::VideoChanged { video })
                }
                SyncEffect::PlaylistChanged(videos) => {
                    Effect::Emit(WatchPartyEvent::PlaylistChanged { videos })
                }
            })
            .collect()
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
    use crate::error::WatchPartyError;
    use crate::error_codes::ErrorReason;
    use crate::player::HeadlessPlayer;

    fn session(intent: JoinIntent) -> Session<HeadlessPlayer> {
        let handshake = Handshake::new(RoomName::new("general").unwrap(), "ana", intent).unwrap();
        let mut session =
            Session::new(handshake, 7, HeadlessPlayer::new(), &WatchPartyConfig::default());
        session.start();
        session
    }

    fn participant(id: &str, username: &str, is_host: bool) -> Participant {
        Participant {
            id: id.into(),
            username: username.into(),
            is_host,
        }
    }

    fn disconnect_reason(effects: &[Effect]) -> Option<Option<RoomError>> {
        effects.iter().find_map(|e| match e {
            Effect::Emit(WatchPartyEvent::Disconnected { reason }) => Some(reason.clone()),
            _ => None,
        })
    }

    #[test]
    fn start_requests_playlist_for_its_epoch() {
        let handshake =
            Handshake::new(RoomName::default(), "ana", JoinIntent::Join).unwrap();
        let mut session =
            Session::new(handshake, 7, HeadlessPlayer::new(), &WatchPartyConfig::default());
        let effects = session.start();
        assert_eq!(
            effects,
            vec![
                Effect::Emit(WatchPartyEvent::Connected),
                Effect::FetchPlaylist { epoch: 7 }
            ]
        );
        assert_eq!(session.snapshot().phase, Phase::Joining);
    }

    #[test]
    fn synced_after_identity_and_roster() {
        let mut s = session(JoinIntent::Join);
        let now = Instant::now();

        let effects = s.handle_server(
            ServerMessage::Identity {
                user_id: "u1".into(),
                is_host: false,
            },
            now,
        );
        assert!(!effects.contains(&Effect::Emit(WatchPartyEvent::Synced)));

        let effects = s.handle_server(
            ServerMessage::UserList {
                user_list: vec![participant("u0", "bo", true), participant("u1", "ana", false)],
            },
            now,
        );
        assert!(effects.contains(&Effect::Emit(WatchPartyEvent::Synced)));
        let snapshot = s.snapshot();
        assert_eq!(snapshot.phase, Phase::Synced);
        assert!(!snapshot.is_host);
        assert_eq!(snapshot.host.map(|p| p.username), Some("bo".to_string()));
    }

    #[test]
    fn explicit_error_closes_and_reports_reason() {
        let mut s = session(JoinIntent::Create);

        let effects = s.handle_server(
            ServerMessage::Error {
                content: ErrorReason::RoomExists,
            },
            Instant::now(),
        );

        assert_eq!(effects.first(), Some(&Effect::Close));
        assert_eq!(disconnect_reason(&effects), Some(Some(RoomError::RoomExists)));
        // The close that follows is not reported a second time.
        assert!(s.transport_closed().is_empty());
        assert_eq!(s.snapshot().error, Some(RoomError::RoomExists));
    }

    #[test]
    fn close_while_joining_infers_room_not_found() {
        let mut s = session(JoinIntent::Join);
        let effects = s.transport_closed();
        assert_eq!(disconnect_reason(&effects), Some(Some(RoomError::RoomNotFound)));
    }

    #[test]
    fn close_while_creating_is_connection_lost() {
        let mut s = session(JoinIntent::Create);
        let effects = s.transport_closed();
        assert_eq!(disconnect_reason(&effects), Some(Some(RoomError::ConnectionLost)));
    }

    #[test]
    fn close_after_sync_is_connection_lost() {
        let mut s = session(JoinIntent::Join);
        let now = Instant::now();
        s.handle_server(
            ServerMessage::Identity {
                user_id: "u1".into(),
                is_host: true,
            },
            now,
        );
        s.handle_server(
            ServerMessage::UserList {
                user_list: vec![participant("u1", "ana", true)],
            },
            now,
        );

        let effects = s.transport_closed();
        assert_eq!(disconnect_reason(&effects), Some(Some(RoomError::ConnectionLost)));
    }

    #[test]
    fn requested_close_reports_no_reason() {
        let mut s = session(JoinIntent::Join);
        let effects = s.close_requested();
        assert_eq!(disconnect_reason(&effects), Some(None));
        assert!(s.close_requested().is_empty());
        assert!(s.transport_closed().is_empty());
    }

    #[test]
    fn blank_chat_is_not_sent() {
        let mut s = session(JoinIntent::Join);
        assert!(s.handle_command(Command::Chat("   ".into()), Instant::now()).is_empty());
        assert_eq!(
            s.handle_command(Command::Chat(" hi ".into()), Instant::now()),
            vec![Effect::Send(ClientMessage::Chat {
                username: "ana".into(),
                content: "hi".into()
            })]
        );
    }

    #[test]
    fn system_messages_join_the_chat_log() {
        let mut s = session(JoinIntent::Join);
        s.handle_server(
            ServerMessage::System {
                username: String::new(),
                content: "bo is now the host".into(),
            },
            Instant::now(),
        );
        let chat = s.snapshot().chat;
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0].kind, ChatKind::System);
    }

    #[test]
    fn headless_host_follows_without_broadcasting() {
        let mut s = session(JoinIntent::Join);
        let now = Instant::now();
        s.handle_server(
            ServerMessage::Identity {
                user_id: "u1".into(),
                is_host: true,
            },
            now,
        );
        s.handle_server(
            ServerMessage::UserList {
                user_list: vec![participant("u1", "ana", true)],
            },
            now,
        );
        let video = Video {
            id: 3,
            title: "intro".into(),
            video_url: "https://cdn.example.com/intro.mp4".into(),
            thumbnail: None,
        };
        s.playlist_loaded(7, Ok(vec![video]));

        let mut effects = s.handle_command(Command::Player(PlayerEvent::Ready), now);
        effects.extend(s.handle_server(ServerMessage::Play { timestamp: 12.0 }, now));
        effects.extend(s.handle_server(ServerMessage::Seek { timestamp: 40.0 }, now));

        assert!(!effects.iter().any(|e| matches!(e, Effect::Send(_))));
        let snapshot = s.snapshot();
        assert!(snapshot.is_host);
        assert!(snapshot.playing);
    }

    #[test]
    fn snapshots_share_the_chat_log_until_it_grows() {
        let mut s = session(JoinIntent::Join);
        let chat = |content: &str| ServerMessage::Chat {
            username: "bo".into(),
            content: content.into(),
        };
        s.handle_server(chat("hi"), Instant::now());

        let first = s.snapshot();
        let second = s.snapshot();
        assert!(Arc::ptr_eq(&first.chat, &second.chat));

        s.handle_server(chat("again"), Instant::now());
        let third = s.snapshot();
        assert!(!Arc::ptr_eq(&first.chat, &third.chat));
        assert_eq!(first.chat.len(), 1);
        assert_eq!(third.chat.len(), 2);
    }

    #[test]
    fn own_typing_echo_is_ignored() {
        let mut s = session(JoinIntent::Join);
        let now = Instant::now();
        assert!(s
            .handle_server(
                ServerMessage::Typing {
                    username: "ana".into()
                },
                now
            )
            .is_empty());
        assert_eq!(s.typing_deadline(), None);

        let effects = s.handle_server(
            ServerMessage::Typing {
                username: "bo".into(),
            },
            now,
        );
        assert_eq!(
            effects,
            vec![Effect::Emit(WatchPartyEvent::TypingChanged {
                names: vec!["bo".into()]
            })]
        );
    }

    #[test]
    fn stale_playlist_failure_is_silent() {
        let mut s = session(JoinIntent::Join);
        let effects = s.playlist_loaded(
            6,
            Err(WatchPartyError::MetadataFetchFailed("gone".into())),
        );
        assert!(effects.is_empty());

        let effects = s.playlist_loaded(
            7,
            Err(WatchPartyError::MetadataFetchFailed("down".into())),
        );
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn terminal_session_ignores_input() {
        let mut s = session(JoinIntent::Join);
        s.close_requested();
        let now = Instant::now();
        assert!(s
            .handle_server(ServerMessage::Play { timestamp: 1.0 }, now)
            .is_empty());
        assert!(s
            .handle_command(Command::Chat("late".into()), now)
            .is_empty());
    }
}
