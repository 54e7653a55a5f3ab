//! Per-participant room lifecycle controller.
//!
//! The controller performs no I/O. Every operation returns the [`Effect`]s the caller must run,
//! in order: a [`Effect::Persist`] always precedes the publishes of the same batch so that a lost
//! compare-and-swap race stops the batch before anything is announced.

use std::{
    sync::Arc,
    time::{Instant, SystemTime},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::{
        authority::{Reconciler, Verdict},
        phase::{InvalidTransition, LobbyEvent, LobbyMachine, LobbyPhase},
        presence::PresenceTracker,
    },
    config::{AppConfig, TurnTimeoutPolicy},
    dto::ws::RoomMessage,
    engine::{EndReason, EngineRejection, GameAction, GameResult, GameState, Outcome, PlayerNumber},
    error::SyncError,
    state::room::{Room, RoomStatus, UserId},
};

/// Side effect requested by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a message on a room topic.
    Publish {
        /// Topic.
        room: Uuid,
        /// Payload.
        message: RoomMessage,
    },
    /// Compare-and-swap write of the room at `room.version`; report the new version through
    /// [`RoomController::committed`].
    Persist(Room),
    /// Insert a freshly allocated room.
    CreateRoom(Room),
    /// Fetch the given room and hand it to [`RoomController::follow`].
    Follow(Uuid),
}

/// Read-only projection of the controller, published to session observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    /// Lifecycle phase.
    pub phase: LobbyPhase,
    /// Current room.
    pub room_id: Option<Uuid>,
    /// Own seat.
    pub player: Option<PlayerNumber>,
    /// Seat currently holding authority.
    pub authority: Option<PlayerNumber>,
    /// Room status as last seen.
    pub status: Option<RoomStatus>,
    /// Confirmed game state.
    pub game_state: Option<GameState>,
    /// Terminal result.
    pub result: Option<GameResult>,
    /// Room offered for a rematch.
    pub rematch: Option<Uuid>,
    /// Last failure surfaced to the user.
    pub error: Option<String>,
}

#[derive(Debug)]
struct Seat {
    room: Room,
    player: PlayerNumber,
    reconciler: Reconciler,
    presence: PresenceTracker,
    turn_clock: Option<(PlayerNumber, Instant)>,
    result: Option<GameResult>,
    rematch: Option<Uuid>,
}

impl Seat {
    fn is_authority(&self) -> bool {
        self.room.authority == self.player
    }

    fn restart_clock(&mut self, now: Instant) {
        self.turn_clock = self
            .room
            .game_state
            .as_ref()
            .and_then(GameState::current_turn)
            .map(|turn| (turn, now));
    }

    fn publish(&self, message: RoomMessage) -> Effect {
        Effect::Publish {
            room: self.room.id,
            message,
        }
    }
}

/// Effects accumulated by one operation; the persist request is hoisted ahead of publishes.
#[derive(Default)]
struct Batch {
    persist: bool,
    messages: Vec<RoomMessage>,
    tail: Vec<Effect>,
}

impl Batch {
    fn into_effects(self, seat: &Seat) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(self.messages.len() + self.tail.len() + 1);
        if self.persist {
            effects.push(Effect::Persist(seat.room.clone()));
        }
        effects.extend(self.messages.into_iter().map(|message| seat.publish(message)));
        effects.extend(self.tail);
        effects
    }
}

/// State machine driving one participant through search, seating, play and rematch.
pub struct RoomController {
    user: UserId,
    config: Arc<AppConfig>,
    machine: LobbyMachine,
    seat: Option<Seat>,
    rng: StdRng,
    error: Option<String>,
}

impl RoomController {
    /// Controller for `user` drawing deal seeds from the OS.
    pub fn new(user: impl Into<UserId>, config: Arc<AppConfig>) -> Self {
        Self::with_rng(user, config, StdRng::from_os_rng())
    }

    /// Controller with a fixed seed source, for reproducible deals.
    pub fn seeded(user: impl Into<UserId>, config: Arc<AppConfig>, seed: u64) -> Self {
        Self::with_rng(user, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(user: impl Into<UserId>, config: Arc<AppConfig>, rng: StdRng) -> Self {
        Self {
            user: user.into(),
            config,
            machine: LobbyMachine::new(),
            seat: None,
            rng,
            error: None,
        }
    }

    /// User driving this controller.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Lifecycle phase.
    pub fn phase(&self) -> LobbyPhase {
        self.machine.phase()
    }

    /// Room the controller is attached to.
    pub fn room(&self) -> Option<&Room> {
        self.seat.as_ref().map(|seat| &seat.room)
    }

    /// Own seat number.
    pub fn player(&self) -> Option<PlayerNumber> {
        self.seat.as_ref().map(|seat| seat.player)
    }

    /// Whether this participant currently holds the room authority.
    pub fn is_authority(&self) -> bool {
        self.seat.as_ref().is_some_and(Seat::is_authority)
    }

    /// Snapshot for observers.
    pub fn view(&self) -> SessionView {
        let seat = self.seat.as_ref();
        SessionView {
            phase: self.machine.phase(),
            room_id: seat.map(|seat| seat.room.id),
            player: seat.map(|seat| seat.player),
            authority: seat.map(|seat| seat.room.authority),
            status: seat.map(|seat| seat.room.status),
            game_state: seat.and_then(|seat| seat.room.game_state.clone()),
            result: seat.and_then(|seat| seat.result.clone()),
            rematch: seat.and_then(|seat| seat.rematch),
            error: self.error.clone(),
        }
    }

    /// Enter the matchmaking queue.
    pub fn begin_search(&mut self) -> Result<(), SyncError> {
        self.error = None;
        self.machine.apply(LobbyEvent::SearchStarted)?;
        Ok(())
    }

    /// The matchmaking search ended without a seat.
    pub fn search_failed(&mut self, err: &SyncError) -> Result<(), SyncError> {
        self.machine.apply(LobbyEvent::SearchFailed)?;
        self.error = Some(err.to_string());
        Ok(())
    }

    /// Attach to a room in which the user already holds a seat.
    pub fn enter_room(&mut self, room: Room, now: Instant) -> Result<Vec<Effect>, SyncError> {
        self.install(room, LobbyEvent::Seated, now)
    }

    /// Follow a rematch announced by another participant.
    pub fn follow(&mut self, room: Room, now: Instant) -> Result<Vec<Effect>, SyncError> {
        self.install(room, LobbyEvent::Rematch, now)
    }

    fn install(
        &mut self,
        room: Room,
        event: LobbyEvent,
        now: Instant,
    ) -> Result<Vec<Effect>, SyncError> {
        let participant = room
            .participant(&self.user)
            .cloned()
            .ok_or(SyncError::RoomNotFound)?;
        self.machine.apply(event)?;
        self.error = None;

        let mut presence = PresenceTracker::new(self.config.heartbeat_timeout, participant.player);
        for other in &room.participants {
            presence.observe(other.player, now);
        }

        let mut seat = Seat {
            reconciler: Reconciler::new(room.game),
            player: participant.player,
            presence,
            turn_clock: None,
            result: None,
            rematch: None,
            room,
        };
        info!(
            room_id = %seat.room.id,
            player = seat.player,
            status = seat.room.status.as_str(),
            "entered room"
        );

        let mut batch = Batch::default();
        batch.messages.push(RoomMessage::PlayerJoin { participant });
        batch.messages.push(RoomMessage::Heartbeat {
            player: seat.player,
        });

        if let Some(state) = seat.room.game_state.clone() {
            seat.reconciler.reset(seat.room.last_seq, Some(state));
            self.catch_up(&mut seat, now);
        }
        self.seat = Some(seat);
        self.evaluate_readiness(&mut batch, now);

        Ok(self.finish_batch(batch))
    }

    /// Align the lifecycle phase with a room that is already playing or finished.
    fn catch_up(&mut self, seat: &mut Seat, now: Instant) {
        let Some(state) = seat.room.game_state.as_ref() else {
            return;
        };
        let result = state.result().cloned();
        if matches!(self.machine.phase(), LobbyPhase::Waiting | LobbyPhase::Ready) {
            let _ = self.machine.apply(LobbyEvent::GameStarted);
            advance(&mut seat.room, RoomStatus::Playing);
        }
        if let Some(result) = result {
            if self.machine.phase() == LobbyPhase::Playing {
                let _ = self.machine.apply(LobbyEvent::GameEnded);
            }
            record_result(seat, result);
        }
        seat.restart_clock(now);
    }

    /// Toggle readiness. The authority deals as soon as everyone is ready.
    pub fn set_ready(&mut self, ready: bool, now: Instant) -> Result<Vec<Effect>, SyncError> {
        let phase = self.machine.phase();
        let seat = self.seat.as_mut().ok_or(SyncError::Disconnected)?;
        if !matches!(phase, LobbyPhase::Waiting | LobbyPhase::Ready) {
            return Err(InvalidTransition {
                from: phase,
                event: LobbyEvent::AllReady,
            }
            .into());
        }

        let player = seat.player;
        if let Some(participant) = seat.room.participant_at_mut(player) {
            participant.ready = ready;
        }
        seat.room.updated_at = SystemTime::now();

        let mut batch = Batch {
            persist: seat.is_authority(),
            ..Batch::default()
        };
        batch.messages.push(RoomMessage::PlayerReady { player, ready });
        self.evaluate_readiness(&mut batch, now);
        Ok(self.finish_batch(batch))
    }

    /// Move between `waiting` and `ready` and let the authority deal.
    fn evaluate_readiness(&mut self, batch: &mut Batch, now: Instant) {
        let Some(seat) = self.seat.as_mut() else {
            return;
        };
        let all_ready = seat.room.all_ready() && seat.room.status < RoomStatus::Playing;
        match (self.machine.phase(), all_ready) {
            (LobbyPhase::Waiting, true) => {
                let _ = self.machine.apply(LobbyEvent::AllReady);
            }
            (LobbyPhase::Ready, false) => {
                let _ = self.machine.apply(LobbyEvent::ReadinessLost);
                return;
            }
            _ => {}
        }

        if self.machine.phase() != LobbyPhase::Ready
            || !seat.is_authority()
            || seat.room.game_state.is_some()
        {
            return;
        }

        let seed = self.rng.random::<u64>() >> 11;
        let seats = seat.room.seats();
        let state = GameState::init(seat.room.game, seed, &seats);
        advance(&mut seat.room, RoomStatus::Ready);
        advance(&mut seat.room, RoomStatus::Playing);
        seat.room.game_state = Some(state.clone());
        seat.room.last_seq = 0;
        seat.room.updated_at = SystemTime::now();
        seat.reconciler.record_start(seed, seat.player, seats);
        seat.reconciler.commit_local(0, state.clone());
        seat.restart_clock(now);
        let _ = self.machine.apply(LobbyEvent::GameStarted);

        info!(room_id = %seat.room.id, seed, game = %seat.room.game, "dealt opening state");
        batch.persist = true;
        batch.messages.push(RoomMessage::GameStart {
            seed,
            authority: seat.player,
        });
        batch.messages.push(RoomMessage::StateUpdate {
            state: state.clone(),
            seq: 0,
            author: seat.player,
        });

        // Naturals all round settle the table on the deal.
        if let Some(result) = state.result().cloned() {
            batch.messages.push(RoomMessage::GameEnd {
                outcome: result.outcome.clone(),
                reason: result.reason,
            });
            record_result(seat, result);
            let _ = self.machine.apply(LobbyEvent::GameEnded);
        }
    }

    /// Apply a local move or control command and broadcast the resulting state.
    pub fn submit(&mut self, action: GameAction, now: Instant) -> Result<Vec<Effect>, SyncError> {
        let phase = self.machine.phase();
        let seat = self.seat.as_ref().ok_or(SyncError::Disconnected)?;
        let player = seat.player;
        match phase {
            LobbyPhase::Playing => {}
            LobbyPhase::Finished => return Err(EngineRejection::GameOver.into()),
            _ => return Err(SyncError::NotYourTurn { player, turn: None }),
        }
        let state = seat
            .room
            .game_state
            .as_ref()
            .ok_or(SyncError::NotYourTurn { player, turn: None })?;

        if !action.is_control() {
            let turn = state.current_turn();
            if turn != Some(player) {
                return Err(SyncError::NotYourTurn { player, turn });
            }
        }
        let self_forfeit = matches!(action, GameAction::Forfeit { loser, .. } if loser == player);
        if action.requires_authority() && !seat.is_authority() && !self_forfeit {
            return Err(EngineRejection::Illegal(format!(
                "only the room authority may issue `{}`",
                action.label()
            ))
            .into());
        }

        let mut batch = Batch::default();
        self.commit_action(action, &mut batch, now)?;
        Ok(self.finish_batch(batch))
    }

    /// Give up the match, regardless of turn.
    pub fn surrender(&mut self, now: Instant) -> Result<Vec<Effect>, SyncError> {
        self.submit(GameAction::Surrender, now)
    }

    /// Fold `action` by the own seat into the room state and queue its broadcast.
    fn commit_action(
        &mut self,
        action: GameAction,
        batch: &mut Batch,
        now: Instant,
    ) -> Result<(), SyncError> {
        let seat = self.seat.as_mut().ok_or(SyncError::Disconnected)?;
        let state = seat
            .room
            .game_state
            .as_ref()
            .ok_or(EngineRejection::GameOver)?;
        let next = state.apply(seat.player, &action)?;
        let seq = seat.reconciler.next_seq();

        debug!(
            room_id = %seat.room.id,
            player = seat.player,
            seq,
            action = action.label(),
            "applied local action"
        );
        seat.reconciler
            .record_action(seat.player, seq, action.clone());
        seat.reconciler.commit_local(seq, next.clone());
        seat.room.game_state = Some(next.clone());
        seat.room.last_seq = seq;
        seat.room.updated_at = SystemTime::now();
        seat.restart_clock(now);

        batch.persist |= seat.is_authority();
        batch.messages.push(RoomMessage::Action {
            player: seat.player,
            seq,
            payload: action,
        });
        batch.messages.push(RoomMessage::StateUpdate {
            state: next.clone(),
            seq,
            author: seat.player,
        });

        if let Some(result) = next.result().cloned() {
            batch.messages.push(RoomMessage::GameEnd {
                outcome: result.outcome.clone(),
                reason: result.reason,
            });
            record_result(seat, result);
            let _ = self.machine.apply(LobbyEvent::GameEnded);
        }
        Ok(())
    }

    /// React to a message received on the room topic.
    pub fn handle(&mut self, message: RoomMessage, now: Instant) -> Vec<Effect> {
        let Some(seat) = self.seat.as_mut() else {
            return Vec::new();
        };
        let mut batch = Batch::default();

        match message {
            RoomMessage::PlayerJoin { participant } => {
                if participant.player == seat.player {
                    return Vec::new();
                }
                seat.presence.observe(participant.player, now);
                let returning = match seat.room.participant_at_mut(participant.player) {
                    Some(existing) if existing.user_id == participant.user_id => {
                        let returning = !existing.connected;
                        existing.connected = true;
                        existing.last_seen = SystemTime::now();
                        returning
                    }
                    Some(existing) => {
                        *existing = participant;
                        false
                    }
                    None => {
                        seat.room.participants.push(participant);
                        seat.room.participants.sort_by_key(|p| p.player);
                        false
                    }
                };
                batch.persist |= returning;
                if seat.room.elect_authority() {
                    info!(room_id = %seat.room.id, authority = seat.room.authority, "authority moved");
                    batch.persist = true;
                }
                batch.persist &= seat.is_authority();
                batch.messages.push(RoomMessage::Heartbeat {
                    player: seat.player,
                });
                self.evaluate_readiness(&mut batch, now);
            }
            RoomMessage::PlayerLeave { player } => {
                if player == seat.player {
                    return Vec::new();
                }
                seat.presence.forget(player);
                if seat.room.status < RoomStatus::Playing {
                    if let Some(user) = seat.room.user_of(player).cloned() {
                        seat.room.remove_participant(&user);
                    }
                    if seat.room.status.is_closed() {
                        info!(room_id = %seat.room.id, player, "full lobby closed by a departure");
                    }
                } else if let Some(participant) = seat.room.participant_at_mut(player) {
                    participant.connected = false;
                }
                seat.room.elect_authority();
                debug!(room_id = %seat.room.id, player, "participant left");
                self.evaluate_readiness(&mut batch, now);
            }
            RoomMessage::PlayerReady { player, ready } => {
                seat.presence.observe(player, now);
                if let Some(participant) = seat.room.participant_at_mut(player) {
                    participant.ready = ready;
                    participant.last_seen = SystemTime::now();
                }
                batch.persist = seat.is_authority() && player != seat.player;
                self.evaluate_readiness(&mut batch, now);
            }
            RoomMessage::GameStart { seed, authority } => {
                seat.presence.observe(authority, now);
                seat.reconciler
                    .record_start(seed, authority, seat.room.seats());
            }
            RoomMessage::Action {
                player,
                seq,
                payload,
            } => {
                seat.presence.observe(player, now);
                seat.reconciler.record_action(player, seq, payload);
            }
            RoomMessage::StateUpdate { state, seq, author } => {
                if author != seat.player {
                    seat.presence.observe(author, now);
                }
                self.accept_state(state, seq, author, &mut batch, now);
            }
            RoomMessage::GameEnd { outcome, reason } => {
                self.accept_end(outcome, reason);
            }
            RoomMessage::Heartbeat { player } => {
                if player == seat.player {
                    return Vec::new();
                }
                seat.presence.observe(player, now);
                if let Some(participant) = seat.room.participant_at_mut(player) {
                    participant.last_seen = SystemTime::now();
                    if !participant.connected {
                        participant.connected = true;
                        info!(room_id = %seat.room.id, player, "participant reconnected");
                        seat.room.elect_authority();
                        batch.persist = seat.is_authority();
                    }
                }
            }
            RoomMessage::Rematch { room_id } => {
                if room_id == seat.room.id {
                    return Vec::new();
                }
                seat.rematch = Some(room_id);
                if self.machine.phase() == LobbyPhase::Finished {
                    batch.tail.push(Effect::Follow(room_id));
                }
            }
        }

        self.finish_batch(batch)
    }

    fn accept_state(
        &mut self,
        state: GameState,
        seq: u64,
        author: PlayerNumber,
        batch: &mut Batch,
        now: Instant,
    ) {
        let Some(seat) = self.seat.as_mut() else {
            return;
        };
        let authority = seat.room.authority;
        match seat.reconciler.receive(seq, &state, author, authority) {
            Ok(Verdict::Duplicate) => {}
            Ok(verdict) => {
                debug!(room_id = %seat.room.id, seq, author, ?verdict, "confirmed state");
                seat.room.game_state = Some(state);
                seat.room.last_seq = seq;
                seat.room.updated_at = SystemTime::now();
                batch.persist = seat.is_authority();
                let mut seat = self.seat.take();
                if let Some(seat) = seat.as_mut() {
                    self.catch_up(seat, now);
                }
                self.seat = seat;
            }
            Err(rejection) => {
                warn!(
                    room_id = %seat.room.id,
                    seq,
                    author,
                    error = %rejection,
                    "rejected state update"
                );
            }
        }
    }

    fn accept_end(&mut self, outcome: Outcome, reason: EndReason) {
        let Some(seat) = self.seat.as_mut() else {
            return;
        };
        if seat.result.is_some() {
            return;
        }
        // The terminal state_update was missed; keep the announced result.
        let stats = Vec::new();
        record_result(
            seat,
            GameResult {
                outcome,
                reason,
                stats,
            },
        );
        if self.machine.phase() == LobbyPhase::Playing {
            let _ = self.machine.apply(LobbyEvent::GameEnded);
        }
    }

    /// Periodic duty: heartbeat, presence lapses, forced forfeits and the turn clock.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        let phase = self.machine.phase();
        let Some(seat) = self.seat.as_mut() else {
            return Vec::new();
        };
        let mut batch = Batch::default();
        batch.messages.push(RoomMessage::Heartbeat {
            player: seat.player,
        });

        let lapsed: Vec<PlayerNumber> = seat
            .presence
            .lapsed(now)
            .into_iter()
            .filter(|player| {
                seat.room
                    .participant_at(*player)
                    .is_some_and(|participant| participant.connected)
            })
            .collect();
        for player in &lapsed {
            if let Some(participant) = seat.room.participant_at_mut(*player) {
                participant.connected = false;
            }
            warn!(room_id = %seat.room.id, player, "heartbeat lapsed");
        }
        if !lapsed.is_empty() {
            if seat.room.elect_authority() {
                info!(room_id = %seat.room.id, authority = seat.room.authority, "authority moved");
            }
            batch.persist = seat.is_authority();
        }

        if phase == LobbyPhase::Playing && seat.is_authority() {
            let forced = self.forced_action(&lapsed, now);
            if let Some(action) = forced
                && let Err(err) = self.commit_action(action, &mut batch, now)
            {
                warn!(error = %err, "forced action was refused");
            }
        }

        self.finish_batch(batch)
    }

    /// Control command the authority owes the room: forfeit a vanished seat or enforce the clock.
    fn forced_action(&self, lapsed: &[PlayerNumber], now: Instant) -> Option<GameAction> {
        let seat = self.seat.as_ref()?;
        let state = seat.room.game_state.as_ref()?;
        if state.is_terminal() {
            return None;
        }

        if let Some(loser) = lapsed
            .iter()
            .copied()
            .find(|player| state.players().contains(player))
        {
            return Some(GameAction::Forfeit {
                loser,
                reason: EndReason::Disconnect,
            });
        }

        let limit = self.config.turn_timeout?;
        let (holder, since) = seat.turn_clock?;
        if now.saturating_duration_since(since) <= limit {
            return None;
        }
        let pass = GameAction::PassTurn { player: holder };
        let forfeit = GameAction::Forfeit {
            loser: holder,
            reason: EndReason::TurnTimeout,
        };
        match self.config.turn_timeout_policy {
            TurnTimeoutPolicy::Skip if state.apply(seat.player, &pass).is_ok() => Some(pass),
            _ => Some(forfeit),
        }
    }

    /// Offer a rematch: allocate a fresh room with the same seats and move into it.
    pub fn play_again(&mut self, now: Instant) -> Result<Vec<Effect>, SyncError> {
        let phase = self.machine.phase();
        let seat = self.seat.as_ref().ok_or(SyncError::Disconnected)?;
        if phase != LobbyPhase::Finished {
            return Err(InvalidTransition {
                from: phase,
                event: LobbyEvent::Rematch,
            }
            .into());
        }

        if let Some(existing) = seat.rematch {
            return Ok(vec![Effect::Follow(existing)]);
        }

        let previous = seat.room.id;
        let next = Room::rematch_of(&seat.room, SystemTime::now());
        info!(room_id = %previous, rematch = %next.id, "offering rematch");
        let mut effects = vec![
            Effect::CreateRoom(next.clone()),
            Effect::Publish {
                room: previous,
                message: RoomMessage::Rematch { room_id: next.id },
            },
        ];
        effects.extend(self.follow(next, now)?);
        Ok(effects)
    }

    /// Leave the room. Mid-game this forfeits the own seat; before the deal it frees the seat.
    pub fn leave(&mut self, now: Instant) -> Result<Vec<Effect>, SyncError> {
        let phase = self.machine.phase();
        let mut effects = Vec::new();

        if let Some(seat) = self.seat.as_ref() {
            let player = seat.player;
            let room = seat.room.id;
            match phase {
                LobbyPhase::Playing => {
                    let mut batch = Batch::default();
                    let forfeit = GameAction::Forfeit {
                        loser: player,
                        reason: EndReason::Left,
                    };
                    if let Err(err) = self.commit_action(forfeit, &mut batch, now) {
                        debug!(error = %err, "leaving without forfeit");
                    }
                    effects = self.finish_batch(batch);
                }
                LobbyPhase::Waiting | LobbyPhase::Ready => {
                    let mut room_copy = seat.room.clone();
                    room_copy.remove_participant(&self.user);
                    if room_copy.participants.is_empty() {
                        advance(&mut room_copy, RoomStatus::Abandoned);
                    }
                    room_copy.updated_at = SystemTime::now();
                    effects.push(Effect::Persist(room_copy));
                }
                _ => {}
            }
            effects.push(Effect::Publish {
                room,
                message: RoomMessage::PlayerLeave { player },
            });
            info!(room_id = %room, player, "left room");
        }

        self.seat = None;
        self.machine.apply(LobbyEvent::Leave)?;
        Ok(effects)
    }

    /// Merge a fresh copy of the room read from the store after a lost write or a resubscribe.
    pub fn resync(&mut self, fresh: Room, now: Instant) -> Vec<Effect> {
        let Some(mut seat) = self.seat.take() else {
            return Vec::new();
        };
        if fresh.id != seat.room.id {
            self.seat = Some(seat);
            return Vec::new();
        }

        let local = std::mem::replace(&mut seat.room, fresh);
        let own_ready = local.participant_at(seat.player).map(|p| p.ready);
        let mut batch = Batch::default();

        let local_ahead = local.game_state.is_some()
            && (seat.room.game_state.is_none() || local.last_seq > seat.room.last_seq);
        if local_ahead {
            seat.room.game_state = local.game_state;
            seat.room.last_seq = local.last_seq;
            seat.room.winner = local.winner;
            advance(&mut seat.room, local.status);
            batch.persist = true;
        } else if seat.room.game_state.is_some() {
            seat.reconciler
                .reset(seat.room.last_seq, seat.room.game_state.clone());
        }

        let lobby = seat.room.status < RoomStatus::Playing;
        if let Some(me) = seat.room.participant_at_mut(seat.player) {
            me.connected = true;
            me.last_seen = SystemTime::now();
            if lobby && let Some(ready) = own_ready.filter(|ready| *ready != me.ready) {
                me.ready = ready;
                batch.persist = true;
            }
        }
        batch.persist |= seat.room.elect_authority();
        batch.persist &= seat.is_authority();
        debug!(
            room_id = %seat.room.id,
            version = seat.room.version,
            local_ahead,
            "resynchronised with store"
        );

        self.catch_up(&mut seat, now);
        self.seat = Some(seat);
        self.evaluate_readiness(&mut batch, now);
        self.finish_batch(batch)
    }

    /// Record the version assigned by a successful persist.
    pub fn committed(&mut self, version: u64) {
        if let Some(seat) = self.seat.as_mut() {
            seat.room.version = version;
        }
    }

    /// Give up on the room after the transport could not be recovered.
    pub fn connection_lost(&mut self) {
        if let Some(seat) = self.seat.take() {
            warn!(room_id = %seat.room.id, "connection lost");
        }
        let _ = self.machine.apply(LobbyEvent::Leave);
        self.error = Some(SyncError::ConnectionLost.to_string());
    }

    fn finish_batch(&self, batch: Batch) -> Vec<Effect> {
        match self.seat.as_ref() {
            Some(seat) => batch.into_effects(seat),
            None => batch.tail,
        }
    }
}

fn record_result(seat: &mut Seat, result: GameResult) {
    if let Outcome::Winner { player } = result.outcome {
        seat.room.winner = seat.room.user_of(player).cloned();
    }
    advance(&mut seat.room, RoomStatus::Finished);
    seat.turn_clock = None;
    seat.result = Some(result);
}

fn advance(room: &mut Room, to: RoomStatus) {
    if let Err(err) = room.advance(to) {
        debug!(room_id = %room.id, error = %err, "status left unchanged");
    }
}
