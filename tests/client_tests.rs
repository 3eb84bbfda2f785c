//! Integration-style tests for the watch-party client.
//!
//! Drive a `WatchPartyClient` through a channel-backed mock room server and
//! a recording player, and check what reaches the player, the wire and the
//! event stream.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use watchparty_client::protocol::ClientMessage;
use watchparty_client::{
    ConnectionManager, Handshake, JoinIntent, Phase, RoomError, RoomName, WatchPartyClient,
    WatchPartyConfig, WatchPartyError, WatchPartyEvent,
};

use common::{
    change_video_json, chat_json, error_json, identity_json, join_script, new_video_json,
    next_event, pause_json, play_json, reaction_json, request_control_json, seek_json, settle,
    sync_state_json, system_json, typing_json, user_list_json, video, wait_for_snapshot,
    MockConnector, MockDirectory, MockPlayer, MockServer, MockTransport, PlayerCommand,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

struct Harness {
    client: WatchPartyClient,
    events: tokio::sync::mpsc::Receiver<WatchPartyEvent>,
    server: MockServer,
    player: MockPlayer,
    directory: Arc<MockDirectory>,
}

fn start_with(script: Vec<String>, intent: JoinIntent, directory: MockDirectory) -> Harness {
    let (transport, server) = MockTransport::new(script);
    let player = MockPlayer::new();
    let directory = Arc::new(directory);
    let handshake = Handshake::new(RoomName::new("general").unwrap(), "ana", intent).unwrap();
    let (client, events) = WatchPartyClient::start(
        transport,
        handshake,
        player.clone(),
        directory.clone(),
        WatchPartyConfig::default(),
    );
    Harness {
        client,
        events,
        server,
        player,
        directory,
    }
}

fn start(script: Vec<String>) -> Harness {
    start_with(
        script,
        JoinIntent::Join,
        MockDirectory::new().with_playlist("general", vec![video(1), video(2)]),
    )
}

/// Join, load the first video and report the player ready.
async fn synced_and_ready(is_host: bool, sync: (f64, &str, u64)) -> Harness {
    let h = start(join_script(is_host, sync));
    wait_for_snapshot(&h.client, |s| {
        s.phase == Phase::Synced && s.current_video.is_some()
    })
    .await;
    h.client.player_ready().unwrap();
    wait_for_snapshot(&h.client, |s| s.player_ready).await;
    h
}

async fn wait_for_sent(server: &MockServer, pred: impl Fn(&[ClientMessage]) -> bool) {
    for _ in 0..200 {
        if pred(&server.sent_messages()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected outbound message not sent: {:?}", server.sent_messages());
}

async fn wait_for_commands(player: &MockPlayer, pred: impl Fn(&[PlayerCommand]) -> bool) {
    for _ in 0..200 {
        if pred(&player.commands()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected player commands not issued: {:?}", player.commands());
}

fn plays(sent: &[ClientMessage]) -> usize {
    sent.iter()
        .filter(|m| matches!(m, ClientMessage::Play { .. }))
        .count()
}

// ════════════════════════════════════════════════════════════════════
// Join flow
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_flow_emits_connected_identity_roster_synced() {
    let mut h = start(join_script(false, (0.0, "paused", 1)));

    let first = h.events.recv().await.unwrap();
    assert_eq!(first, WatchPartyEvent::Connected);
    next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::Identity { user_id, is_host: false } if user_id == "u1")
    })
    .await;
    next_event(&mut h.events, |e| matches!(e, WatchPartyEvent::Synced)).await;

    let snapshot = wait_for_snapshot(&h.client, |s| s.current_video.is_some()).await;
    assert_eq!(snapshot.own_id.as_deref(), Some("u1"));
    assert!(!snapshot.is_host);
    assert_eq!(snapshot.participants.len(), 2);
    assert_eq!(snapshot.playlist, vec![video(1), video(2)]);
    assert_eq!(snapshot.current_video, Some(video(1)));
}

#[tokio::test]
async fn late_joiner_converges_on_ready() {
    let h = start(join_script(false, (120.0, "playing", 2)));

    let snapshot = wait_for_snapshot(&h.client, |s| {
        s.current_video.as_ref().map(|v| v.id) == Some(2)
    })
    .await;
    assert!(snapshot.pending_sync.is_some());
    assert!(!h
        .player
        .commands()
        .iter()
        .any(|c| matches!(c, PlayerCommand::Seek(_))));

    h.client.player_ready().unwrap();
    wait_for_commands(&h.player, |cmds| {
        cmds.ends_with(&[PlayerCommand::Seek(120.0), PlayerCommand::Playing(true)])
    })
    .await;

    let snapshot = wait_for_snapshot(&h.client, |s| s.player_ready).await;
    assert!(snapshot.playing);
    assert!(snapshot.pending_sync.is_none());
}

#[tokio::test]
async fn chat_and_system_lines_reach_the_log() {
    let mut h = start(join_script(false, (0.0, "paused", 1)));
    h.server.push(chat_json("bo", "hello"));
    h.server.push(system_json("bo is now the Host."));

    next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::Chat(line) if line.content == "bo is now the Host.")
    })
    .await;
    let snapshot = wait_for_snapshot(&h.client, |s| s.chat.len() == 2).await;
    assert_eq!(snapshot.chat[0].username, "bo");
    assert_eq!(snapshot.chat[0].content, "hello");
}

// ════════════════════════════════════════════════════════════════════
// Playback reconciliation
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn host_does_not_rebroadcast_its_own_echo() {
    let h = synced_and_ready(true, (0.0, "paused", 1)).await;
    // The player reports the seek the pending sync caused.
    h.client.seeked(0.0).unwrap();

    h.player.set_time(10.0);
    h.client.played(10.0).unwrap();
    wait_for_sent(&h.server, |sent| plays(sent) == 1).await;
    assert!(h.server.sent_messages().contains(&ClientMessage::Play {
        username: "ana".into(),
        timestamp: 10.0,
        video_id: 1,
    }));

    // The room server broadcasts back to its sender.
    h.player.clear();
    h.server.push(play_json(10.0));
    wait_for_commands(&h.player, |cmds| cmds == [PlayerCommand::Playing(true)]).await;

    // The player reports the resume it was told to do.
    h.client.played(10.0).unwrap();
    settle().await;
    assert_eq!(plays(&h.server.sent_messages()), 1);
    assert!(!h
        .server
        .sent_messages()
        .iter()
        .any(|m| matches!(m, ClientMessage::Seek { .. })));
}

#[tokio::test]
async fn play_beyond_drift_seeks_before_resuming() {
    let h = synced_and_ready(false, (50.0, "paused", 1)).await;
    h.player.set_time(53.2);
    h.player.clear();

    h.server.push(play_json(50.0));
    wait_for_commands(&h.player, |cmds| {
        cmds == [PlayerCommand::Seek(50.0), PlayerCommand::Playing(true)]
    })
    .await;
}

#[tokio::test]
async fn play_within_drift_only_resumes() {
    let h = synced_and_ready(false, (50.0, "paused", 1)).await;
    h.player.set_time(50.4);
    h.player.clear();

    h.server.push(play_json(50.0));
    wait_for_commands(&h.player, |cmds| cmds == [PlayerCommand::Playing(true)]).await;
}

#[tokio::test]
async fn pause_always_snaps_to_authoritative_time() {
    let h = synced_and_ready(false, (40.0, "playing", 1)).await;
    h.player.set_time(42.3);
    h.player.clear();

    h.server.push(pause_json(42.0));
    wait_for_commands(&h.player, |cmds| {
        cmds == [PlayerCommand::Seek(42.0), PlayerCommand::Playing(false)]
    })
    .await;
    let snapshot = wait_for_snapshot(&h.client, |s| !s.playing).await;
    assert_eq!(snapshot.current_video, Some(video(1)));
}

#[tokio::test]
async fn seek_during_video_switch_is_applied_after_ready() {
    let h = synced_and_ready(false, (0.0, "paused", 1)).await;
    h.player.clear();

    h.server.push(change_video_json(2));
    wait_for_snapshot(&h.client, |s| {
        !s.player_ready && s.current_video.as_ref().map(|v| v.id) == Some(2)
    })
    .await;
    h.server.push(seek_json(15.0));
    wait_for_snapshot(&h.client, |s| s.pending_sync.is_some()).await;
    assert_eq!(h.player.commands(), vec![PlayerCommand::Load(2)]);

    h.client.player_ready().unwrap();
    wait_for_commands(&h.player, |cmds| {
        cmds == [PlayerCommand::Load(2), PlayerCommand::Seek(15.0)]
    })
    .await;
}

// ════════════════════════════════════════════════════════════════════
// Authority
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn only_the_host_broadcasts_and_handoff_takes_effect() {
    let mut h = synced_and_ready(false, (0.0, "paused", 1)).await;

    h.client.played(5.0).unwrap();
    h.client.change_video(2).unwrap();
    settle().await;
    assert!(h.server.sent_messages().is_empty());

    h.server.push(user_list_json(&[("u1", "ana", true), ("u2", "bo", false)]));
    next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::AuthorityChanged { is_host: true })
    })
    .await;
    assert!(h.client.is_host().await);

    h.client.paused(6.0).unwrap();
    wait_for_sent(&h.server, |sent| {
        sent.iter()
            .any(|m| matches!(m, ClientMessage::Pause { timestamp, .. } if *timestamp == 6.0))
    })
    .await;
    h.client.change_video(2).unwrap();
    wait_for_sent(&h.server, |sent| {
        sent.contains(&ClientMessage::ChangeVideo {
            username: "ana".into(),
            video_id: 2,
        })
    })
    .await;
}

#[tokio::test]
async fn identity_promotion_reports_authority_change() {
    let mut h = synced_and_ready(false, (0.0, "paused", 1)).await;
    h.server.push(identity_json("u1", true));
    next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::AuthorityChanged { is_host: true })
    })
    .await;
}

#[tokio::test]
async fn control_requests_from_others_are_surfaced() {
    let mut h = start(join_script(true, (0.0, "paused", 1)));
    h.server.push(request_control_json("ana"));
    h.server.push(request_control_json("bo"));

    let event = next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::ControlRequested { .. })
    })
    .await;
    assert_eq!(
        event,
        WatchPartyEvent::ControlRequested {
            username: "bo".into()
        }
    );
}

#[tokio::test]
async fn grant_and_revoke_carry_target_id() {
    let h = start(join_script(true, (0.0, "paused", 1)));
    tokio_test::assert_ok!(h.client.grant_control("u2"));
    tokio_test::assert_ok!(h.client.revoke_control("u2"));
    wait_for_sent(&h.server, |sent| sent.len() == 2).await;
    assert_eq!(
        h.server.sent_messages(),
        vec![
            ClientMessage::GrantControl {
                content: "u2".into()
            },
            ClientMessage::RevokeControl {
                content: "u2".into()
            },
        ]
    );
}

// ════════════════════════════════════════════════════════════════════
// Errors and disconnects
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn explicit_error_wins_over_the_following_close() {
    let mut h = start_with(
        vec![error_json("room_exists")],
        JoinIntent::Create,
        MockDirectory::new(),
    );
    h.server.hang_up();

    let event = next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::Disconnected { .. })
    })
    .await;
    assert_eq!(
        event,
        WatchPartyEvent::Disconnected {
            reason: Some(RoomError::RoomExists)
        }
    );
    assert!(h.server.is_closed());
    let snapshot = wait_for_snapshot(&h.client, |s| s.phase == Phase::Disconnected).await;
    assert_eq!(snapshot.error, Some(RoomError::RoomExists));
    assert!(!h.client.is_connected());
}

#[tokio::test]
async fn close_before_session_on_join_means_room_not_found() {
    let mut h = start(Vec::new());
    h.server.hang_up();

    let event = next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::Disconnected { .. })
    })
    .await;
    assert_eq!(
        event,
        WatchPartyEvent::Disconnected {
            reason: Some(RoomError::RoomNotFound)
        }
    );
}

#[tokio::test]
async fn close_after_sync_is_connection_lost() {
    let mut h = start(join_script(false, (0.0, "paused", 1)));
    next_event(&mut h.events, |e| matches!(e, WatchPartyEvent::Synced)).await;
    h.server.fail("reset by peer");

    let event = next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::Disconnected { .. })
    })
    .await;
    assert_eq!(
        event,
        WatchPartyEvent::Disconnected {
            reason: Some(RoomError::ConnectionLost)
        }
    );
    let err = tokio_test::assert_err!(h.client.send_chat("anyone?"));
    assert!(matches!(err, WatchPartyError::NotConnected));
}

#[tokio::test]
async fn close_while_creating_is_connection_lost() {
    let mut h = start_with(Vec::new(), JoinIntent::Create, MockDirectory::new());
    h.server.hang_up();

    let event = next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::Disconnected { .. })
    })
    .await;
    assert_eq!(
        event,
        WatchPartyEvent::Disconnected {
            reason: Some(RoomError::ConnectionLost)
        }
    );
}

#[tokio::test]
async fn failed_playlist_fetch_is_reported_without_disconnecting() {
    let directory = MockDirectory::new();
    directory.fail_videos(true);
    let mut h = start_with(join_script(false, (0.0, "paused", 0)), JoinIntent::Join, directory);

    next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::MetadataFetchFailed { .. })
    })
    .await;
    assert!(h.client.is_connected());
}

// ════════════════════════════════════════════════════════════════════
// Social signals
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn typing_indicator_expires_after_quiet_window() {
    let mut h = start(join_script(false, (0.0, "paused", 1)));
    h.server.push(typing_json("ana"));
    h.server.push(typing_json("bo"));

    let event = next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::TypingChanged { .. })
    })
    .await;
    assert_eq!(
        event,
        WatchPartyEvent::TypingChanged {
            names: vec!["bo".into()]
        }
    );

    let event = next_event(&mut h.events, |e| {
        matches!(e, WatchPartyEvent::TypingChanged { .. })
    })
    .await;
    assert_eq!(event, WatchPartyEvent::TypingChanged { names: Vec::new() });
}

#[tokio::test(start_paused = true)]
async fn outbound_typing_is_throttled() {
    let h = start(join_script(false, (0.0, "paused", 1)));
    h.client.send_typing().unwrap();
    h.client.send_typing().unwrap();
    settle().await;
    assert_eq!(h.server.sent_messages().len(), 1);

    tokio::time::sleep(Duration::from_millis(3100)).await;
    h.client.send_typing().unwrap();
    wait_for_sent(&h.server, |sent| sent.len() == 2).await;
}

#[tokio::test]
async fn reactions_update_the_latest_overlay() {
    let mut h = start(join_script(false, (0.0, "paused", 1)));
    h.server.push(reaction_json("bo", "🔥"));
    next_event(&mut h.events, |e| matches!(e, WatchPartyEvent::Reaction(_))).await;

    let snapshot = wait_for_snapshot(&h.client, |s| s.last_reaction.is_some()).await;
    let reaction = snapshot.last_reaction.unwrap();
    assert_eq!(reaction.username, "bo");
    assert_eq!(reaction.emoji, "🔥");

    h.client.react("👍").unwrap();
    h.client.react("  ").unwrap();
    wait_for_sent(&h.server, |sent| !sent.is_empty()).await;
    settle().await;
    assert_eq!(
        h.server.sent_messages(),
        vec![ClientMessage::Reaction {
            username: "ana".into(),
            content: "👍".into(),
        }]
    );
}

// ════════════════════════════════════════════════════════════════════
// Playlist
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn add_video_notifies_peers() {
    let h = start(join_script(true, (0.0, "paused", 1)));
    h.client
        .add_video("https://youtu.be/abc")
        .await
        .unwrap();

    assert_eq!(
        h.directory.added.lock().unwrap().clone(),
        vec![("general".to_owned(), "https://youtu.be/abc".to_owned())]
    );
    wait_for_sent(&h.server, |sent| {
        sent.contains(&ClientMessage::NewVideo {
            username: "ana".into(),
            room: "general".into(),
        })
    })
    .await;
}

#[tokio::test]
async fn inbound_new_video_refetches_playlist() {
    let h = start(join_script(false, (0.0, "paused", 1)));
    wait_for_snapshot(&h.client, |s| s.playlist.len() == 2).await;

    h.directory
        .set_playlist("general", vec![video(1), video(2), video(3)]);
    h.server.push(new_video_json());

    let snapshot = wait_for_snapshot(&h.client, |s| s.playlist.len() == 3).await;
    assert_eq!(snapshot.current_video, Some(video(1)));
    assert!(h.directory.requests() >= 2);
}

#[tokio::test]
async fn sync_for_uncached_video_waits_for_next_playlist() {
    let h = start_with(
        vec![
            identity_json("u1", false),
            sync_state_json(30.0, "paused", 9),
            user_list_json(&[("u1", "ana", false)]),
        ],
        JoinIntent::Join,
        MockDirectory::new().with_playlist("general", vec![video(1)]),
    );
    let snapshot = wait_for_snapshot(&h.client, |s| s.phase == Phase::Synced).await;
    assert_ne!(snapshot.current_video, Some(video(9)));

    h.directory.set_playlist("general", vec![video(1), video(9)]);
    h.server.push(new_video_json());
    wait_for_snapshot(&h.client, |s| {
        s.current_video.as_ref().map(|v| v.id) == Some(9)
    })
    .await;

    h.client.player_ready().unwrap();
    wait_for_commands(&h.player, |cmds| {
        cmds.ends_with(&[PlayerCommand::Seek(30.0), PlayerCommand::Playing(false)])
    })
    .await;
}

// ════════════════════════════════════════════════════════════════════
// Connection manager
// ════════════════════════════════════════════════════════════════════

fn manager(
    connector: MockConnector,
    player: MockPlayer,
    directory: MockDirectory,
) -> ConnectionManager<MockConnector, MockPlayer> {
    ConnectionManager::new(
        connector,
        player,
        Arc::new(directory),
        WatchPartyConfig::default(),
    )
}

#[tokio::test]
async fn switching_rooms_discards_the_old_room_state() {
    let connector = MockConnector::new();
    let player = MockPlayer::new();
    let directory = MockDirectory::new()
        .with_playlist("alpha", vec![video(1), video(2), video(3)])
        .with_playlist("beta", vec![video(7)])
        .with_delay("beta", Duration::from_millis(300));
    let mut manager = manager(connector.clone(), player.clone(), directory);

    let _alpha = connector.accept(join_script(true, (30.0, "playing", 1)));
    let _beta = connector.accept(join_script(false, (0.0, "paused", 0)));

    // Alpha ends up with a full playlist, a current video and playback running.
    let _alpha_events = manager
        .open(RoomName::new("alpha").unwrap(), "ana", JoinIntent::Join)
        .await
        .unwrap();
    let alpha = manager.client().unwrap();
    wait_for_snapshot(alpha, |s| s.current_video == Some(video(1))).await;
    alpha.player_ready().unwrap();
    let before = wait_for_snapshot(alpha, |s| s.playing).await;
    assert_eq!(before.playlist.len(), 3);
    assert!(before.is_host);
    player.clear();

    let mut events = manager
        .open(RoomName::new("beta").unwrap(), "ana", JoinIntent::Join)
        .await
        .unwrap();

    // Synced in beta while its playlist is still in flight: nothing of
    // alpha may show through.
    let fresh = wait_for_snapshot(manager.client().unwrap(), |s| {
        s.room == Some(RoomName::new("beta").unwrap()) && s.phase == Phase::Synced
    })
    .await;
    assert!(fresh.playlist.is_empty());
    assert_eq!(fresh.current_video, None);
    assert!(!fresh.playing);
    assert!(!fresh.is_host);

    next_event(&mut events, |e| matches!(e, WatchPartyEvent::VideoChanged { .. })).await;
    let snapshot = wait_for_snapshot(manager.client().unwrap(), |s| !s.playlist.is_empty()).await;
    assert_eq!(snapshot.playlist, vec![video(7)]);
    assert_eq!(snapshot.current_video, Some(video(7)));
    assert!(!snapshot.playing);
    let commands = player.commands();
    assert!(commands.contains(&PlayerCommand::Load(7)));
    assert!(!commands.contains(&PlayerCommand::Load(1)));
    assert!(!commands.contains(&PlayerCommand::Playing(true)));

    let handshakes = connector.handshakes.lock().unwrap().clone();
    assert_eq!(handshakes.len(), 2);
    assert_eq!(handshakes[0].room.as_str(), "alpha");
    assert_eq!(handshakes[1].room.as_str(), "beta");
}

#[tokio::test]
async fn rejected_join_handshake_is_room_not_found() {
    let connector = MockConnector::new();
    connector.refuse(WatchPartyError::HandshakeRejected { status: 404 });
    let mut manager = manager(connector, MockPlayer::new(), MockDirectory::new());

    let err = manager
        .open(RoomName::new("ghost").unwrap(), "ana", JoinIntent::Join)
        .await
        .unwrap_err();
    assert!(matches!(err, WatchPartyError::Room(RoomError::RoomNotFound)));
    assert!(manager.client().is_none());
}

#[tokio::test]
async fn rejected_create_handshake_is_passed_through() {
    let connector = MockConnector::new();
    connector.refuse(WatchPartyError::HandshakeRejected { status: 400 });
    let mut manager = manager(connector, MockPlayer::new(), MockDirectory::new());

    let err = manager
        .open(RoomName::new("new").unwrap(), "ana", JoinIntent::Create)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WatchPartyError::HandshakeRejected { status: 400 }
    ));
}

#[tokio::test]
async fn blank_display_name_is_refused_before_connecting() {
    let connector = MockConnector::new();
    let mut manager = manager(connector.clone(), MockPlayer::new(), MockDirectory::new());

    let err = manager
        .open(RoomName::new("general").unwrap(), "   ", JoinIntent::Join)
        .await
        .unwrap_err();
    assert!(matches!(err, WatchPartyError::InvalidDisplayName));
    assert!(connector.handshakes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn closing_the_manager_ends_the_session_cleanly() {
    let connector = MockConnector::new();
    let server = connector.accept(join_script(false, (0.0, "paused", 1)));
    let mut manager = manager(
        connector,
        MockPlayer::new(),
        MockDirectory::new().with_playlist("general", vec![video(1)]),
    );

    let mut events = manager
        .open(RoomName::new("general").unwrap(), "ana", JoinIntent::Join)
        .await
        .unwrap();
    next_event(&mut events, |e| matches!(e, WatchPartyEvent::Synced)).await;

    manager.close().await;
    manager.close().await;
    next_event(&mut events, |e| {
        matches!(e, WatchPartyEvent::Disconnected { reason: None })
    })
    .await;
    assert!(server.is_closed());
    assert!(manager.client().is_none());
    assert_eq!(manager.snapshot().await.phase, Phase::Idle);
}

#[tokio::test]
async fn room_poller_publishes_directory_listing() {
    use watchparty_client::protocol::RoomSummary;

    let directory = MockDirectory::new().with_rooms(vec![RoomSummary {
        name: "general".into(),
        count: 3,
    }]);
    let manager = ConnectionManager::new(
        MockConnector::new(),
        MockPlayer::new(),
        Arc::new(directory),
        WatchPartyConfig::default().with_room_poll_interval(Duration::from_millis(20)),
    );
    let poller = manager.room_poller();
    let mut rooms = poller.subscribe();

    tokio::time::timeout(Duration::from_secs(5), rooms.wait_for(|r| !r.is_empty()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(poller.rooms()[0].count, 3);
}
