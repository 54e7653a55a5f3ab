use serde::Serialize;
use thiserror::Error;

/// Phases a participant's room controller moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyPhase {
    /// Not attached to any room.
    Idle,
    /// Queued for matchmaking.
    Searching,
    /// Seated; seats missing or somebody is not ready.
    Waiting,
    /// Every seat filled and ready; the opening deal is on its way.
    Ready,
    /// A game state is live.
    Playing,
    /// The game is over; the result is shown.
    Finished,
}

/// Events that can be applied to the lobby state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyEvent {
    /// Joined a matchmaking queue.
    SearchStarted,
    /// The search timed out or was cancelled.
    SearchFailed,
    /// Took a seat in a room.
    Seated,
    /// Every seat is filled and ready.
    AllReady,
    /// A participant left or withdrew readiness before the deal.
    ReadinessLost,
    /// The opening state was produced or received.
    GameStarted,
    /// The game reached its terminal phase.
    GameEnded,
    /// Followed a rematch into a fresh room.
    Rematch,
    /// Left the room or cancelled, from any phase.
    Leave,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the machine was in when the invalid event was received.
    pub from: LobbyPhase,
    /// The event that cannot be applied from this phase.
    pub event: LobbyEvent,
}

/// Snapshot of the current machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase.
    pub phase: LobbyPhase,
    /// Number of transitions applied so far.
    pub version: usize,
}

/// Per-client lifecycle: `idle -> searching -> waiting -> ready -> playing -> finished`.
#[derive(Debug, Clone)]
pub struct LobbyMachine {
    phase: LobbyPhase,
    version: usize,
}

impl Default for LobbyMachine {
    fn default() -> Self {
        Self {
            phase: LobbyPhase::Idle,
            version: 0,
        }
    }
}

impl LobbyMachine {
    /// Create a machine in the idle phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> LobbyPhase {
        self.phase
    }

    /// Create a snapshot of the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
        }
    }

    /// Whether `event` would be accepted right now.
    pub fn can_apply(&self, event: LobbyEvent) -> bool {
        self.compute_transition(event).is_ok()
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: LobbyEvent) -> Result<LobbyPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    fn compute_transition(&self, event: LobbyEvent) -> Result<LobbyPhase, InvalidTransition> {
        use LobbyEvent as E;
        use LobbyPhase as P;

        let next = match (self.phase, event) {
            (_, E::Leave) => P::Idle,
            (P::Idle, E::SearchStarted) => P::Searching,
            (P::Searching, E::SearchFailed) => P::Idle,
            (P::Idle | P::Searching, E::Seated) => P::Waiting,
            (P::Waiting, E::AllReady) => P::Ready,
            (P::Ready, E::ReadinessLost) => P::Waiting,
            (P::Waiting | P::Ready, E::GameStarted) => P::Playing,
            (P::Playing, E::GameEnded) => P::Finished,
            (P::Finished, E::Rematch) => P::Waiting,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(machine: &mut LobbyMachine, event: LobbyEvent) -> LobbyPhase {
        machine.apply(event).unwrap()
    }

    #[test]
    fn initial_state_is_idle() {
        let machine = LobbyMachine::new();
        assert_eq!(machine.phase(), LobbyPhase::Idle);
        assert_eq!(machine.snapshot().version, 0);
    }

    #[test]
    fn full_happy_path_through_a_match() {
        let mut machine = LobbyMachine::new();
        assert_eq!(apply(&mut machine, LobbyEvent::SearchStarted), LobbyPhase::Searching);
        assert_eq!(apply(&mut machine, LobbyEvent::Seated), LobbyPhase::Waiting);
        assert_eq!(apply(&mut machine, LobbyEvent::AllReady), LobbyPhase::Ready);
        assert_eq!(apply(&mut machine, LobbyEvent::GameStarted), LobbyPhase::Playing);
        assert_eq!(apply(&mut machine, LobbyEvent::GameEnded), LobbyPhase::Finished);
        assert_eq!(apply(&mut machine, LobbyEvent::Rematch), LobbyPhase::Waiting);
        assert_eq!(machine.snapshot().version, 6);
    }

    #[test]
    fn private_rooms_skip_searching() {
        let mut machine = LobbyMachine::new();
        assert_eq!(apply(&mut machine, LobbyEvent::Seated), LobbyPhase::Waiting);
    }

    #[test]
    fn leave_resets_from_anywhere() {
        let mut machine = LobbyMachine::new();
        apply(&mut machine, LobbyEvent::Seated);
        apply(&mut machine, LobbyEvent::GameStarted);
        assert_eq!(apply(&mut machine, LobbyEvent::Leave), LobbyPhase::Idle);
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut machine = LobbyMachine::new();
        let err = machine.apply(LobbyEvent::GameEnded).unwrap_err();
        assert_eq!(err.from, LobbyPhase::Idle);
        assert_eq!(err.event, LobbyEvent::GameEnded);
        assert_eq!(machine.phase(), LobbyPhase::Idle);
        assert!(!machine.can_apply(LobbyEvent::AllReady));
    }
}
