//! Async driver wiring a [`RoomController`] to the room bus and the room store.
//!
//! One tokio task owns the controller. Commands arrive over `mpsc` with `oneshot` replies, bus
//! messages and heartbeat ticks are interleaved with `select!`, and the controller view is
//! published through a `watch` channel after every step.

use std::{collections::VecDeque, future, time::Instant};

use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    time::{Duration, MissedTickBehavior, interval, sleep},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::controller::{Effect, RoomController, SessionView},
    dto::ws::RoomMessage,
    engine::{GameAction, GameId},
    error::SyncError,
    services::matchmaking::Matchmaker,
    state::room::{QueueClass, Room, RoomStatus, UserId},
};

const COMMAND_BUFFER: usize = 16;
/// Lost compare-and-swap races tolerated within one effect run.
const MAX_CONFLICTS: usize = 8;
const RECOVERY_BACKOFF: Duration = Duration::from_millis(100);

type Reply<T> = oneshot::Sender<Result<T, SyncError>>;

enum Command {
    FindMatch {
        game: GameId,
        queue: QueueClass,
        reply: Reply<()>,
    },
    CreatePrivate {
        game: GameId,
        reply: Reply<String>,
    },
    JoinByCode {
        code: String,
        reply: Reply<()>,
    },
    Ready {
        ready: bool,
        reply: Reply<()>,
    },
    Submit {
        action: GameAction,
        reply: Reply<()>,
    },
    Surrender {
        reply: Reply<()>,
    },
    PlayAgain {
        reply: Reply<()>,
    },
    Leave {
        reply: Reply<()>,
    },
}

/// Handle to a participant session running in its own task.
///
/// Dropping every handle leaves the current room and stops the task.
#[derive(Clone)]
pub struct RoomSession {
    user: UserId,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
    matchmaker: Matchmaker,
}

impl RoomSession {
    /// Start a session for `user`.
    pub fn spawn(user: impl Into<UserId>, matchmaker: Matchmaker) -> Self {
        let user = user.into();
        let controller = RoomController::new(user.clone(), matchmaker.config().clone());
        Self::spawn_with(controller, matchmaker)
    }

    /// Start a session around an already configured controller.
    pub fn spawn_with(controller: RoomController, matchmaker: Matchmaker) -> Self {
        let user = controller.user().to_owned();
        let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
        let (view_tx, view) = watch::channel(controller.view());
        let driver = Driver {
            controller,
            matchmaker: matchmaker.clone(),
            subscription: None,
            view: view_tx,
        };
        tokio::spawn(driver.run(inbox));
        Self {
            user,
            commands,
            view,
            matchmaker,
        }
    }

    /// User driving the session.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Queue for `game` and wait for a seat.
    pub async fn find_match(&self, game: GameId, queue: QueueClass) -> Result<(), SyncError> {
        self.request(|reply| Command::FindMatch { game, queue, reply })
            .await
    }

    /// Abort a running [`find_match`](Self::find_match). Returns whether a search was pending.
    pub fn cancel_search(&self) -> bool {
        self.matchmaker.cancel_search(&self.user)
    }

    /// Open a private room and return its join code.
    pub async fn create_private_room(&self, game: GameId) -> Result<String, SyncError> {
        self.request(|reply| Command::CreatePrivate { game, reply })
            .await
    }

    /// Join a private room by code.
    pub async fn join_by_code(&self, code: impl Into<String>) -> Result<(), SyncError> {
        let code = code.into();
        self.request(|reply| Command::JoinByCode { code, reply })
            .await
    }

    /// Toggle readiness.
    pub async fn set_ready(&self, ready: bool) -> Result<(), SyncError> {
        self.request(|reply| Command::Ready { ready, reply }).await
    }

    /// Play a move or control command.
    pub async fn submit(&self, action: GameAction) -> Result<(), SyncError> {
        self.request(|reply| Command::Submit { action, reply })
            .await
    }

    /// Give up the current game.
    pub async fn surrender(&self) -> Result<(), SyncError> {
        self.request(|reply| Command::Surrender { reply }).await
    }

    /// Start or follow a rematch after the game ended.
    pub async fn play_again(&self) -> Result<(), SyncError> {
        self.request(|reply| Command::PlayAgain { reply }).await
    }

    /// Leave the current room.
    pub async fn leave(&self) -> Result<(), SyncError> {
        self.request(|reply| Command::Leave { reply }).await
    }

    /// Latest view of the session.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Receiver notified on every view change.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Wait until the view satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionView) -> bool,
    ) -> Result<SessionView, SyncError> {
        let mut view = self.view.clone();
        view.wait_for(predicate)
            .await
            .map(|view| view.clone())
            .map_err(|_| SyncError::Disconnected)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, SyncError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SyncError::Disconnected)?;
        response.await.map_err(|_| SyncError::Disconnected)?
    }
}

struct Driver {
    controller: RoomController,
    matchmaker: Matchmaker,
    subscription: Option<(Uuid, broadcast::Receiver<RoomMessage>)>,
    view: watch::Sender<SessionView>,
}

impl Driver {
    async fn run(mut self, mut inbox: mpsc::Receiver<Command>) {
        let mut heartbeat = interval(self.matchmaker.config().heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(user = self.controller.user(), "session started");

        loop {
            tokio::select! {
                command = inbox.recv() => match command {
                    Some(command) => self.execute(command).await,
                    None => break,
                },
                received = next_message(&mut self.subscription) => match received {
                    Ok(message) => {
                        let effects = self.controller.handle(message, Instant::now());
                        self.run_effects(effects).await;
                    }
                    Err(err) => self.recover(err).await,
                },
                _ = heartbeat.tick() => {
                    let effects = self.controller.tick(Instant::now());
                    self.run_effects(effects).await;
                }
            }
            self.sync_subscription();
            self.view.send_replace(self.controller.view());
        }

        if self.controller.room().is_some() {
            match self.controller.leave(Instant::now()) {
                Ok(effects) => self.run_effects(effects).await,
                Err(err) => debug!(error = %err, "leave on shutdown refused"),
            }
        }
        debug!(user = self.controller.user(), "session stopped");
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::FindMatch { game, queue, reply } => {
                let _ = reply.send(self.find_match(game, queue).await);
            }
            Command::CreatePrivate { game, reply } => {
                let _ = reply.send(self.create_private(game).await);
            }
            Command::JoinByCode { code, reply } => {
                let _ = reply.send(self.join_by_code(&code).await);
            }
            Command::Ready { ready, reply } => {
                let outcome = self.controller.set_ready(ready, Instant::now());
                let _ = reply.send(self.settle(outcome).await);
            }
            Command::Submit { action, reply } => {
                let outcome = self.controller.submit(action, Instant::now());
                let _ = reply.send(self.settle(outcome).await);
            }
            Command::Surrender { reply } => {
                let outcome = self.controller.surrender(Instant::now());
                let _ = reply.send(self.settle(outcome).await);
            }
            Command::PlayAgain { reply } => {
                let outcome = self.controller.play_again(Instant::now());
                let _ = reply.send(self.settle(outcome).await);
            }
            Command::Leave { reply } => {
                let outcome = self.controller.leave(Instant::now());
                let _ = reply.send(self.settle(outcome).await);
            }
        }
    }

    async fn settle(&mut self, outcome: Result<Vec<Effect>, SyncError>) -> Result<(), SyncError> {
        self.run_effects(outcome?).await;
        Ok(())
    }

    async fn find_match(&mut self, game: GameId, queue: QueueClass) -> Result<(), SyncError> {
        self.controller.begin_search()?;
        self.view.send_replace(self.controller.view());

        let user = self.controller.user().to_owned();
        match self.matchmaker.find_match(game, queue, &user).await {
            Ok(ticket) => self.enter(ticket.room).await,
            Err(err) => {
                self.controller.search_failed(&err)?;
                Err(err)
            }
        }
    }

    async fn create_private(&mut self, game: GameId) -> Result<String, SyncError> {
        let user = self.controller.user().to_owned();
        let room = self.matchmaker.create_private_room(game, &user).await?;
        let code = room.code.clone().unwrap_or_default();
        self.enter(room).await?;
        Ok(code)
    }

    async fn join_by_code(&mut self, code: &str) -> Result<(), SyncError> {
        let user = self.controller.user().to_owned();
        let ticket = self.matchmaker.join_by_code(code, &user).await?;
        self.enter(ticket.room).await
    }

    /// Subscribe first, then read the room, so nothing published in between is missed.
    async fn enter(&mut self, room: Room) -> Result<(), SyncError> {
        let receiver = self.matchmaker.hub().subscribe(room.id);
        let fresh = self.matchmaker.store().get(room.id).await?.unwrap_or(room);
        self.subscription = Some((fresh.id, receiver));
        let effects = self.controller.enter_room(fresh, Instant::now())?;
        self.run_effects(effects).await;
        Ok(())
    }

    async fn run_effects(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        let mut conflicts = 0;

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Publish { room, message } => {
                    self.matchmaker.hub().publish(room, message);
                }
                Effect::Persist(room) => {
                    let id = room.id;
                    match self.matchmaker.store().update(room.clone()).await {
                        Ok(version) => {
                            if self.controller.room().is_some_and(|current| current.id == id) {
                                self.controller.committed(version);
                            }
                        }
                        Err(err) if err.is_conflict() && conflicts < MAX_CONFLICTS => {
                            conflicts += 1;
                            debug!(room_id = %id, "lost write race; resynchronising");
                            match self.after_conflict(room).await {
                                Ok(Recovery::Keep(effects)) => {
                                    for effect in effects.into_iter().rev() {
                                        queue.push_front(effect);
                                    }
                                }
                                Ok(Recovery::Replace(effects)) => {
                                    queue.retain(|effect| !publishes_to(effect, id));
                                    for effect in effects.into_iter().rev() {
                                        queue.push_front(effect);
                                    }
                                }
                                Err(err) => {
                                    warn!(room_id = %id, error = %err, "resync after conflict failed");
                                    queue.retain(|effect| !publishes_to(effect, id));
                                }
                            }
                        }
                        Err(err) => {
                            warn!(room_id = %id, error = %err, "failed to persist room");
                            queue.retain(|effect| !publishes_to(effect, id));
                        }
                    }
                }
                Effect::CreateRoom(room) => {
                    let id = room.id;
                    let receiver = self.matchmaker.hub().subscribe(id);
                    match self.matchmaker.store().create(room).await {
                        Ok(_) => {
                            info!(room_id = %id, "rematch room created");
                            self.subscription = Some((id, receiver));
                        }
                        Err(err) => warn!(room_id = %id, error = %err, "failed to create room"),
                    }
                }
                Effect::Follow(id) => match self.follow(id).await {
                    Ok(effects) => queue.extend(effects),
                    Err(err) => warn!(room_id = %id, error = %err, "failed to follow rematch"),
                },
            }
        }
    }

    /// Reconcile with the store after a lost compare-and-swap.
    async fn after_conflict(&mut self, attempted: Room) -> Result<Recovery, SyncError> {
        let fresh = self
            .matchmaker
            .store()
            .get(attempted.id)
            .await?
            .ok_or(SyncError::RoomNotFound)?;

        if self
            .controller
            .room()
            .is_none_or(|current| current.id != attempted.id)
        {
            return Ok(Recovery::Keep(retry_departure(
                fresh,
                self.controller.user(),
            )));
        }

        let effects = self.controller.resync(fresh, Instant::now());
        let kept = self.controller.room().is_some_and(|current| {
            current.last_seq == attempted.last_seq && current.game_state == attempted.game_state
        });
        Ok(if kept {
            Recovery::Keep(effects)
        } else {
            Recovery::Replace(effects)
        })
    }

    async fn follow(&mut self, id: Uuid) -> Result<Vec<Effect>, SyncError> {
        let receiver = self.matchmaker.hub().subscribe(id);
        let room = self
            .matchmaker
            .store()
            .get(id)
            .await?
            .ok_or(SyncError::RoomNotFound)?;
        self.subscription = Some((id, receiver));
        self.controller.follow(room, Instant::now())
    }

    /// Resubscribe and refetch after the bus lagged or closed, within the retry budget.
    async fn recover(&mut self, err: broadcast::error::RecvError) {
        let Some(id) = self.controller.room().map(|room| room.id) else {
            self.subscription = None;
            return;
        };
        warn!(room_id = %id, error = %err, "room bus interrupted; resubscribing");

        let budget = self.matchmaker.config().resubscribe_budget;
        for attempt in 1..=budget {
            let receiver = self.matchmaker.hub().subscribe(id);
            match self.matchmaker.store().get(id).await {
                Ok(Some(fresh)) => {
                    self.subscription = Some((id, receiver));
                    let effects = self.controller.resync(fresh, Instant::now());
                    self.run_effects(effects).await;
                    info!(room_id = %id, attempt, "room bus recovered");
                    return;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(room_id = %id, attempt, error = %err, "refetch failed");
                    sleep(RECOVERY_BACKOFF * attempt).await;
                }
            }
        }

        self.subscription = None;
        self.controller.connection_lost();
    }

    fn sync_subscription(&mut self) {
        match self.controller.room().map(|room| room.id) {
            None => self.subscription = None,
            Some(id) if self.subscription.as_ref().is_none_or(|(current, _)| *current != id) => {
                self.subscription = Some((id, self.matchmaker.hub().subscribe(id)));
            }
            Some(_) => {}
        }
    }
}

enum Recovery {
    /// Local state survived; the rest of the batch still goes out.
    Keep(Vec<Effect>),
    /// The store won; pending publishes for the room are stale.
    Replace(Vec<Effect>),
}

fn publishes_to(effect: &Effect, id: Uuid) -> bool {
    matches!(effect, Effect::Publish { room, .. } if *room == id)
}

/// Redo a departure from a lobby against the fresh room.
fn retry_departure(mut fresh: Room, user: &str) -> Vec<Effect> {
    if fresh.remove_participant(user).is_none() {
        return Vec::new();
    }
    if fresh.participants.is_empty()
        && let Err(err) = fresh.advance(RoomStatus::Abandoned)
    {
        debug!(room_id = %fresh.id, error = %err, "room already closed");
    }
    fresh.updated_at = std::time::SystemTime::now();
    vec![Effect::Persist(fresh)]
}

async fn next_message(
    subscription: &mut Option<(Uuid, broadcast::Receiver<RoomMessage>)>,
) -> Result<RoomMessage, broadcast::error::RecvError> {
    match subscription {
        Some((_, receiver)) => receiver.recv().await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        client::phase::LobbyPhase,
        config::AppConfig,
        dao::room_store::memory::MemoryRoomStore,
        state::{RoomHub, SearchRegistry},
    };

    fn matchmaker() -> Matchmaker {
        let config = AppConfig {
            heartbeat_interval: Duration::from_millis(50),
            ..AppConfig::default()
        };
        Matchmaker::new(
            Arc::new(MemoryRoomStore::new()),
            Arc::new(RoomHub::new(64)),
            Arc::new(config),
            Arc::new(SearchRegistry::new()),
        )
    }

    async fn settle(session: &RoomSession, phase: LobbyPhase) -> SessionView {
        tokio::time::timeout(
            Duration::from_secs(2),
            session.wait_for(|view| view.phase == phase),
        )
        .await
        .expect("phase reached in time")
        .unwrap()
    }

    #[tokio::test]
    async fn private_room_game_runs_to_completion() {
        let matchmaker = matchmaker();
        let alice = RoomSession::spawn("alice", matchmaker.clone());
        let bob = RoomSession::spawn("bob", matchmaker.clone());

        let code = alice.create_private_room(GameId::ConnectFive).await.unwrap();
        bob.join_by_code(code).await.unwrap();
        alice.set_ready(true).await.unwrap();
        bob.set_ready(true).await.unwrap();

        let view = settle(&alice, LobbyPhase::Playing).await;
        settle(&bob, LobbyPhase::Playing).await;
        assert_eq!(view.player, Some(1));

        bob.surrender().await.unwrap();
        let view = settle(&alice, LobbyPhase::Finished).await;
        assert!(view.result.is_some());

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
    async fn out_of_turn_submit_is_refused() {
        let matchmaker = matchmaker();
        let alice = RoomSession::spawn("alice", matchmaker.clone());
        let bob = RoomSession::spawn("bob", matchmaker.clone());

        let code = alice.create_private_room(GameId::ConnectFive).await.unwrap();
        bob.join_by_code(code).await.unwrap();
        alice.set_ready(true).await.unwrap();
        bob.set_ready(true).await.unwrap();
        settle(&bob, LobbyPhase::Playing).await;

        let err = bob
            .submit(GameAction::Drop { column: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotYourTurn { player: 2, .. }));
    }

    #[tokio::test]
    async fn leaving_the_lobby_frees_the_seat() {
        let matchmaker = matchmaker();
        let alice = RoomSession::spawn("alice", matchmaker.clone());
        let bob = RoomSession::spawn("bob", matchmaker.clone());

        let code = alice.create_private_room(GameId::Mastermind).await.unwrap();
        bob.join_by_code(code.clone()).await.unwrap();
        bob.leave().await.unwrap();
        assert_eq!(bob.view().phase, LobbyPhase::Idle);

        let room = matchmaker
            .store()
            .find_by_code(code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room.participants.len(), 1);
        assert!(room.is_open());
    }

    #[tokio::test]
    async fn leaving_a_full_lobby_closes_the_room() {
        let matchmaker = matchmaker();
        let alice = RoomSession::spawn("alice", matchmaker.clone());
        let bob = RoomSession::spawn("bob", matchmaker.clone());

        let code = alice.create_private_room(GameId::Poker).await.unwrap();
        bob.join_by_code(code.clone()).await.unwrap();
        bob.leave().await.unwrap();

        let closed = tokio::time::timeout(
            Duration::from_secs(3),
            alice.wait_for(|view| view.status == Some(RoomStatus::Abandoned)),
        )
        .await
        .unwrap()
        .unwrap();
        let room = matchmaker
            .store()
            .get(closed.room_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room.status, RoomStatus::Abandoned);
        assert_eq!(room.seats(), vec![1, 2]);
        assert!(matches!(
            matchmaker.join_by_code(&code, "carol").await,
            Err(SyncError::RoomNotFound | SyncError::RoomFull(_))
        ));
    }
}
