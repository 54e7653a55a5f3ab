//! End-to-end room flows over the in-memory store and the in-process room bus.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use room_sync_back::{
    client::{Effect, LobbyPhase, RoomController, RoomSession, SessionView},
    config::AppConfig,
    dao::room_store::{RoomStore, memory::MemoryRoomStore},
    engine::{EndReason, GameId, GameState, Outcome},
    services::matchmaking::{CodeSource, Matchmaker},
    state::{
        RoomHub, SearchRegistry,
        room::{QueueClass, Room, RoomStatus, Visibility},
    },
};

struct SameCode(&'static str);

impl CodeSource for SameCode {
    fn next_code(&self, _length: usize) -> String {
        self.0.to_owned()
    }
}

fn matchmaker_with(config: AppConfig) -> Matchmaker {
    Matchmaker::new(
        Arc::new(MemoryRoomStore::new()),
        Arc::new(RoomHub::new(64)),
        Arc::new(config),
        Arc::new(SearchRegistry::new()),
    )
}

fn fast_config() -> AppConfig {
    AppConfig {
        heartbeat_interval: Duration::from_millis(50),
        ..AppConfig::default()
    }
}

async fn settle(
    session: &RoomSession,
    predicate: impl FnMut(&SessionView) -> bool,
) -> SessionView {
    tokio::time::timeout(Duration::from_secs(3), session.wait_for(predicate))
        .await
        .expect("session settled in time")
        .unwrap()
}

/// Run controller effects by hand, the way a participant without a driver task would.
async fn run_effects(matchmaker: &Matchmaker, controller: &mut RoomController, effects: Vec<Effect>) {
    let mut queue: VecDeque<Effect> = effects.into();
    while let Some(effect) = queue.pop_front() {
        match effect {
            Effect::Publish { room, message } => {
                matchmaker.hub().publish(room, message);
            }
            Effect::Persist(room) => match matchmaker.store().update(room.clone()).await {
                Ok(version) => controller.committed(version),
                Err(err) if err.is_conflict() => {
                    let fresh = matchmaker.store().get(room.id).await.unwrap().unwrap();
                    queue.extend(controller.resync(fresh, Instant::now()));
                }
                Err(err) => panic!("room write failed: {err}"),
            },
            Effect::CreateRoom(_) | Effect::Follow(_) => {}
        }
    }
}

#[tokio::test]
async fn private_code_seats_the_second_player() {
    let matchmaker = matchmaker_with(fast_config()).with_codes(Arc::new(SameCode("AB12")));
    let alice = RoomSession::spawn("alice", matchmaker.clone());
    let bob = RoomSession::spawn("bob", matchmaker.clone());

    let code = alice.create_private_room(GameId::Poker).await.unwrap();
    assert_eq!(code, "AB12");
    bob.join_by_code(" ab12 ").await.unwrap();

    let host = alice.view();
    let guest = bob.view();
    assert_eq!(host.room_id, guest.room_id);
    assert_eq!(host.player, Some(1));
    assert_eq!(guest.player, Some(2));

    let room = matchmaker
        .store()
        .find_by_code("AB12".into())
        .await
        .unwrap()
        .unwrap();
    let seats: Vec<_> = room.participants.iter().map(|p| p.player).collect();
    assert_eq!(seats, vec![1, 2]);
    assert!(room.is_full());
}

#[tokio::test]
async fn silent_participant_is_forfeited_for_disconnect() {
    let config = AppConfig {
        heartbeat_interval: Duration::from_millis(40),
        heartbeat_timeout: Duration::from_millis(400),
        ..AppConfig::default()
    };
    let matchmaker = matchmaker_with(config);
    let alice = RoomSession::spawn("alice", matchmaker.clone());
    let code = alice.create_private_room(GameId::ConnectFive).await.unwrap();
    alice.set_ready(true).await.unwrap();

    // Bob joins, readies up and then never speaks again.
    let mut bob = RoomController::new("bob", matchmaker.config().clone());
    let ticket = matchmaker.join_by_code(&code, "bob").await.unwrap();
    let effects = bob.enter_room(ticket.room, Instant::now()).unwrap();
    run_effects(&matchmaker, &mut bob, effects).await;
    let effects = bob.set_ready(true, Instant::now()).unwrap();
    run_effects(&matchmaker, &mut bob, effects).await;

    let view = settle(&alice, |view| view.phase == LobbyPhase::Finished).await;
    let result = view.result.unwrap();
    assert_eq!(result.outcome, Outcome::Winner { player: 1 });
    assert_eq!(result.reason, EndReason::Disconnect);

    let stored = matchmaker
        .store()
        .get(view.room_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, RoomStatus::Finished);
    assert_eq!(stored.winner.as_deref(), Some("alice"));
}

#[tokio::test]
async fn oldest_open_room_is_filled_first() {
    let matchmaker = matchmaker_with(fast_config());
    let casual = Visibility::Public {
        queue: QueueClass::Casual,
    };
    let now = SystemTime::now();
    let older = Room::new(
        GameId::ConnectFive,
        casual,
        None,
        "alice",
        now - Duration::from_secs(30),
    );
    let newer = Room::new(GameId::ConnectFive, casual, None, "bob", now);
    matchmaker.store().create(newer.clone()).await.unwrap();
    matchmaker.store().create(older.clone()).await.unwrap();

    let ticket = matchmaker
        .find_match(GameId::ConnectFive, QueueClass::Casual, "carol")
        .await
        .unwrap();
    assert_eq!(ticket.room.id, older.id);
    assert_eq!(ticket.player, 2);
    assert!(ticket.room.is_full());

    let untouched = matchmaker.store().get(newer.id).await.unwrap().unwrap();
    assert_eq!(untouched.participants.len(), 1);
    assert!(untouched.is_open());
}

#[tokio::test]
async fn stored_rooms_keep_their_game_state() {
    let store = MemoryRoomStore::new();
    let mut room = Room::new(
        GameId::Blackjack,
        Visibility::Private,
        Some("QX7Z".into()),
        "alice",
        SystemTime::now(),
    );
    room.add_participant("bob", SystemTime::now()).unwrap();
    room.game_state = Some(GameState::init(GameId::Blackjack, 99, &room.seats()));
    room.last_seq = 1;
    store.create(room.clone()).await.unwrap();

    let loaded = store.get(room.id).await.unwrap().unwrap();
    assert_eq!(loaded, room);
    assert_eq!(
        store.find_by_code("QX7Z".into()).await.unwrap().map(|r| r.id),
        Some(room.id)
    );

    let version = store.update(loaded.clone()).await.unwrap();
    assert_eq!(version, room.version + 1);
    let stale = store.update(loaded).await.unwrap_err();
    assert!(stale.is_conflict());
}

#[tokio::test]
async fn rematch_moves_both_players_into_a_new_room() {
    let matchmaker = matchmaker_with(fast_config());
    let alice = RoomSession::spawn("alice", matchmaker.clone());
    let bob = RoomSession::spawn("bob", matchmaker.clone());

    let code = alice.create_private_room(GameId::ConnectFive).await.unwrap();
    bob.join_by_code(code).await.unwrap();
    alice.set_ready(true).await.unwrap();
    bob.set_ready(true).await.unwrap();
    settle(&bob, |view| view.phase == LobbyPhase::Playing).await;

    bob.surrender().await.unwrap();
    let finished = settle(&alice, |view| view.phase == LobbyPhase::Finished).await;
    let first_room = finished.room_id.unwrap();

    alice.play_again().await.unwrap();
    let host = settle(&alice, |view| {
        view.room_id.is_some_and(|id| id != first_room)
    })
    .await;
    let rematch = host.room_id.unwrap();

    // Bob follows the rematch pointer on his own.
    let guest = settle(&bob, |view| view.room_id == Some(rematch)).await;
    assert_eq!(host.phase, LobbyPhase::Waiting);
    assert_eq!(guest.phase, LobbyPhase::Waiting);
    assert_eq!((host.player, guest.player), (Some(1), Some(2)));

    let stored = matchmaker.store().get(rematch).await.unwrap().unwrap();
    assert_eq!(stored.status, RoomStatus::Waiting);
    assert_eq!(stored.participants.len(), 2);
}
