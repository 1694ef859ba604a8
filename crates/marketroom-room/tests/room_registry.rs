//! Integration tests for the registry and room actors over real channels.

use std::collections::BTreeMap;

use marketroom_protocol::{Phase, PlayerId, RoomKey, ServerEvent};
use marketroom_room::{GameConfig, PlayerSender, RoomAction, RoomError, RoomRegistry};
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn key(name: &str) -> RoomKey {
    RoomKey::new(name)
}

fn registry() -> RoomRegistry {
    RoomRegistry::new(GameConfig::default())
}

fn channel() -> (PlayerSender, mpsc::UnboundedReceiver<ServerEvent>) {
    mpsc::unbounded_channel()
}

/// Creates a dummy player sender (receiver is dropped immediately).
fn dummy_sender() -> PlayerSender {
    mpsc::unbounded_channel().0
}

/// Everything delivered so far. Room replies are sent after dispatch, so
/// no waiting is needed once the awaited call returns.
fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn submit(entries: &[(&str, i64)]) -> RoomAction {
    RoomAction::Submit {
        investments: entries
            .iter()
            .map(|(n, a)| (n.to_string(), *a))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn add(name: &str) -> RoomAction {
    RoomAction::AddCompany { name: name.into() }
}

// =========================================================================
// Registry lifecycle
// =========================================================================

#[tokio::test]
async fn test_join_without_key_uses_default_room() {
    let mut reg = registry();

    let snapshot = reg.join(pid(1), "alice", None, dummy_sender()).await.unwrap();

    assert_eq!(snapshot.room_key, key("lobby"));
    assert_eq!(snapshot.host_id, Some(pid(1)));
    assert_eq!(reg.player_room(pid(1)), Some(&key("lobby")));
    assert_eq!(reg.room_count(), 1);
}

#[tokio::test]
async fn test_join_creates_rooms_lazily() {
    let mut reg = registry();
    reg.join(pid(1), "a", Some(&key("alpha")), dummy_sender()).await.unwrap();
    reg.join(pid(2), "b", Some(&key("beta")), dummy_sender()).await.unwrap();
    reg.join(pid(3), "c", Some(&key("alpha")), dummy_sender()).await.unwrap();

    assert_eq!(reg.room_keys(), vec![key("alpha"), key("beta")]);
}

#[tokio::test]
async fn test_join_second_room_rejected() {
    let mut reg = registry();
    reg.join(pid(1), "a", Some(&key("alpha")), dummy_sender()).await.unwrap();

    let result = reg.join(pid(1), "a", Some(&key("beta")), dummy_sender()).await;

    assert_eq!(result, Err(RoomError::AlreadyInRoom(pid(1), key("alpha"))));
    assert_eq!(reg.room_count(), 1, "no room left behind for the failed join");
}

#[tokio::test]
async fn test_join_invalid_name_does_not_leave_empty_room() {
    let mut reg = registry();

    let result = reg.join(pid(1), "", Some(&key("alpha")), dummy_sender()).await;

    assert!(matches!(result, Err(RoomError::InvalidName(_))));
    assert_eq!(reg.room_count(), 0);
    assert_eq!(reg.player_room(pid(1)), None);
}

#[tokio::test]
async fn test_leave_last_player_destroys_room() {
    let mut reg = registry();
    reg.join(pid(1), "a", None, dummy_sender()).await.unwrap();
    reg.join(pid(2), "b", None, dummy_sender()).await.unwrap();

    reg.leave(pid(1)).await.unwrap();
    assert_eq!(reg.room_count(), 1);

    let left = reg.leave(pid(2)).await.unwrap();
    assert_eq!(left, key("lobby"));
    assert_eq!(reg.room_count(), 0);
}

#[tokio::test]
async fn test_leave_not_in_any_room() {
    let mut reg = registry();
    assert_eq!(reg.leave(pid(1)).await, Err(RoomError::UnknownPlayer(pid(1))));
}

#[tokio::test]
async fn test_destroy_room_forgets_players() {
    let mut reg = registry();
    reg.join(pid(1), "a", None, dummy_sender()).await.unwrap();

    assert!(reg.destroy(&key("lobby")).await);

    assert_eq!(reg.room_count(), 0);
    assert_eq!(reg.player_room(pid(1)), None);
    assert!(!reg.destroy(&key("lobby")).await);
}

#[tokio::test]
async fn test_handle_for_other_room_rejected() {
    let mut reg = registry();
    reg.join(pid(1), "a", Some(&key("alpha")), dummy_sender()).await.unwrap();
    reg.create(key("beta"));

    let result = reg.handle_for(pid(1), Some(&key("beta")));
    assert!(matches!(result, Err(RoomError::NotInRoom(p, k)) if p == pid(1) && k == key("beta")));

    let result = reg.handle_for(pid(9), None);
    assert!(matches!(result, Err(RoomError::NotInRoom(p, _)) if p == pid(9)));

    assert!(reg.handle_for(pid(1), None).is_ok());
}

#[tokio::test]
async fn test_list_rooms_sorted_with_counts() {
    let mut reg = registry();
    assert!(reg.list_rooms().await.is_empty());

    reg.join(pid(1), "a", Some(&key("zeta")), dummy_sender()).await.unwrap();
    reg.join(pid(2), "b", Some(&key("alpha")), dummy_sender()).await.unwrap();
    reg.join(pid(3), "c", Some(&key("alpha")), dummy_sender()).await.unwrap();

    let rooms = reg.list_rooms().await;

    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].room_key, key("alpha"));
    assert_eq!(rooms[0].player_count, 2);
    assert_eq!(rooms[0].phase, Phase::Waiting);
    assert_eq!(rooms[1].room_key, key("zeta"));
}

// =========================================================================
// Actor delivery
// =========================================================================

#[tokio::test]
async fn test_join_broadcasts_to_existing_members() {
    let mut reg = registry();
    let (tx1, mut rx1) = channel();
    let (tx2, mut rx2) = channel();

    reg.join(pid(1), "alice", None, tx1).await.unwrap();
    drain(&mut rx1);
    reg.join(pid(2), "bob", None, tx2).await.unwrap();

    let alice_sees = drain(&mut rx1);
    assert!(matches!(
        &alice_sees[0],
        ServerEvent::PlayerJoined { player, player_count: 2 } if player.name == "bob"
    ));
    assert!(matches!(&alice_sees[1], ServerEvent::GameState { .. }));

    // The joiner gets the snapshot, not their own join notice.
    let bob_sees = drain(&mut rx2);
    assert_eq!(bob_sees.len(), 1);
    assert!(matches!(&bob_sees[0], ServerEvent::GameState { snapshot } if snapshot.players.len() == 2));
}

#[tokio::test]
async fn test_rejected_action_broadcasts_nothing() {
    let mut reg = registry();
    let (tx1, mut rx1) = channel();
    let (tx2, mut rx2) = channel();
    reg.join(pid(1), "host", None, tx1).await.unwrap();
    reg.join(pid(2), "bob", None, tx2).await.unwrap();
    drain(&mut rx1);
    drain(&mut rx2);

    let handle = reg.handle_for(pid(2), None).unwrap();
    let result = handle.act(pid(2), add("Acme")).await;

    assert!(matches!(result, Err(RoomError::Unauthorized { .. })));
    assert!(drain(&mut rx1).is_empty());
    assert!(drain(&mut rx2).is_empty());
}

#[tokio::test]
async fn test_full_round_settles_and_notifies_everyone() {
    let mut reg = registry();
    let (tx1, mut rx1) = channel();
    let (tx2, mut rx2) = channel();
    reg.join(pid(1), "alice", None, tx1).await.unwrap();
    reg.join(pid(2), "bob", None, tx2).await.unwrap();

    let room = reg.handle_for(pid(1), None).unwrap();
    room.act(pid(1), add("Acme")).await.unwrap();
    room.act(pid(1), RoomAction::StartRound).await.unwrap();
    room.act(pid(1), submit(&[("Acme", 40_000)])).await.unwrap();
    drain(&mut rx1);
    drain(&mut rx2);

    room.act(pid(2), submit(&[("Acme", 60_000)])).await.unwrap();

    for rx in [&mut rx1, &mut rx2] {
        let events = drain(rx);
        let settled = events.iter().find_map(|e| match e {
            ServerEvent::AllPlayersSubmitted { snapshot, rankings } => Some((snapshot, rankings)),
            _ => None,
        });
        let (snapshot, rankings) = settled.expect("everyone sees the settlement");
        assert_eq!(snapshot.phase, Phase::Settled);
        assert_eq!(snapshot.player(pid(1)).unwrap().final_value, Some(52_000.0));
        assert_eq!(snapshot.player(pid(2)).unwrap().final_value, Some(78_000.0));
        assert_eq!(rankings, &vec![pid(2), pid(1)]);
    }

    let info = room.info().await.unwrap();
    assert_eq!(info.phase, Phase::Settled);
}

#[tokio::test]
async fn test_snapshot_versions_strictly_increase() {
    let mut reg = registry();
    let (tx1, mut rx1) = channel();
    reg.join(pid(1), "host", None, tx1).await.unwrap();
    reg.join(pid(2), "bob", None, dummy_sender()).await.unwrap();

    let room = reg.handle_for(pid(1), None).unwrap();
    room.act(pid(1), add("Acme")).await.unwrap();
    room.act(pid(1), add("Beta")).await.unwrap();
    room.act(pid(1), RoomAction::DeleteCompany { name: "Beta".into() }).await.unwrap();
    room.act(pid(1), RoomAction::StartRound).await.unwrap();
    room.act(pid(1), RoomAction::Reset).await.unwrap();

    let versions: Vec<u64> = drain(&mut rx1)
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::GameState { snapshot } => Some(snapshot.version),
            _ => None,
        })
        .collect();

    assert_eq!(versions.len(), 7);
    assert!(versions.windows(2).all(|w| w[1] == w[0] + 1), "{versions:?}");
}

#[tokio::test]
async fn test_kick_notifies_target_privately() {
    let mut reg = registry();
    let (tx1, mut rx1) = channel();
    let (tx2, mut rx2) = channel();
    reg.join(pid(1), "host", Some(&key("den")), tx1).await.unwrap();
    reg.join(pid(2), "bob", Some(&key("den")), tx2).await.unwrap();
    drain(&mut rx1);
    drain(&mut rx2);

    reg.kick(pid(1), pid(2), Some(&key("den"))).await.unwrap();

    let bob_sees = drain(&mut rx2);
    assert_eq!(bob_sees, vec![ServerEvent::KickedFromGame { room_key: key("den") }]);

    let host_sees = drain(&mut rx1);
    assert!(matches!(&host_sees[0], ServerEvent::PlayerKicked { player_id } if *player_id == pid(2)));
    assert!(matches!(&host_sees[1], ServerEvent::GameState { snapshot } if snapshot.players.len() == 1));

    assert_eq!(reg.player_room(pid(2)), None);
    // Kicked players may join again.
    reg.join(pid(2), "bob", Some(&key("den")), dummy_sender()).await.unwrap();
}

#[tokio::test]
async fn test_kick_by_non_host_keeps_target_seated() {
    let mut reg = registry();
    reg.join(pid(1), "host", None, dummy_sender()).await.unwrap();
    reg.join(pid(2), "bob", None, dummy_sender()).await.unwrap();
    reg.join(pid(3), "carol", None, dummy_sender()).await.unwrap();

    let result = reg.kick(pid(2), pid(3), None).await;

    assert!(matches!(result, Err(RoomError::Unauthorized { .. })));
    assert_eq!(reg.player_room(pid(3)), Some(&key("lobby")));
}

#[tokio::test]
async fn test_host_leave_hands_over_to_next_player() {
    let mut reg = registry();
    let (tx2, mut rx2) = channel();
    reg.join(pid(1), "host", None, dummy_sender()).await.unwrap();
    reg.join(pid(2), "bob", None, tx2).await.unwrap();
    reg.join(pid(3), "carol", None, dummy_sender()).await.unwrap();
    drain(&mut rx2);

    reg.leave(pid(1)).await.unwrap();

    let events = drain(&mut rx2);
    assert!(events.iter().any(|e| matches!(e, ServerEvent::HostChanged { host_id } if *host_id == pid(2))));
    let info = reg.get(&key("lobby")).unwrap().info().await.unwrap();
    assert_eq!(info.host, Some(pid(2)));
}

#[tokio::test]
async fn test_disconnect_then_reconnect_restores_delivery() {
    let mut reg = registry();
    let (tx1, mut rx1) = channel();
    let (tx2, _rx2) = channel();
    reg.join(pid(1), "host", None, tx1).await.unwrap();
    reg.join(pid(2), "bob", None, tx2).await.unwrap();
    drain(&mut rx1);

    reg.set_connected(pid(2), None).await.unwrap();
    let events = drain(&mut rx1);
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::PlayerConnection { player_id, connected: false } if *player_id == pid(2)
    )));

    let (tx2b, mut rx2b) = channel();
    let room = reg.reconnect(pid(2), tx2b).await.unwrap();
    assert_eq!(room, Some(key("lobby")));

    let events = drain(&mut rx2b);
    assert!(matches!(
        events.last(),
        Some(ServerEvent::GameState { snapshot }) if snapshot.player(pid(2)).unwrap().connected
    ));
}

#[tokio::test]
async fn test_reconnect_unseated_player_is_noop() {
    let reg = registry();
    assert_eq!(reg.reconnect(pid(7), dummy_sender()).await, Ok(None));
}

#[tokio::test]
async fn test_request_state_only_reaches_requester() {
    let mut reg = registry();
    let (tx1, mut rx1) = channel();
    let (tx2, mut rx2) = channel();
    reg.join(pid(1), "host", None, tx1).await.unwrap();
    reg.join(pid(2), "bob", None, tx2).await.unwrap();
    drain(&mut rx1);
    drain(&mut rx2);

    let room = reg.handle_for(pid(2), None).unwrap();
    room.act(pid(2), RoomAction::RequestState).await.unwrap();

    assert!(drain(&mut rx1).is_empty());
    assert_eq!(drain(&mut rx2).len(), 1);
}

#[tokio::test]
async fn test_rooms_are_independent() {
    let mut reg = registry();
    reg.join(pid(1), "a", Some(&key("alpha")), dummy_sender()).await.unwrap();
    reg.join(pid(2), "b", Some(&key("beta")), dummy_sender()).await.unwrap();

    let alpha = reg.handle_for(pid(1), None).unwrap();
    alpha.act(pid(1), RoomAction::StartRound).await.unwrap();

    let beta = reg.get(&key("beta")).unwrap().snapshot().await.unwrap();
    assert_eq!(beta.phase, Phase::Waiting);
}
