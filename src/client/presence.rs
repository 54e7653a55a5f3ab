//! Heartbeat bookkeeping for the seats of one room.

use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::engine::PlayerNumber;

/// Tracks when each other seat was last heard from.
///
/// The owner's own seat is never tracked: its echoes say nothing about its liveness.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    timeout: Duration,
    own: PlayerNumber,
    last_seen: IndexMap<PlayerNumber, Instant>,
}

impl PresenceTracker {
    /// Tracker for the seat `own`, declaring other seats gone after `timeout` of silence.
    pub fn new(timeout: Duration, own: PlayerNumber) -> Self {
        Self {
            timeout,
            own,
            last_seen: IndexMap::new(),
        }
    }

    /// Record a sign of life from `player`. Returns `true` if the seat was not tracked before.
    pub fn observe(&mut self, player: PlayerNumber, now: Instant) -> bool {
        if player == self.own {
            return false;
        }
        self.last_seen.insert(player, now).is_none()
    }

    /// Stop tracking `player`.
    pub fn forget(&mut self, player: PlayerNumber) -> bool {
        self.last_seen.shift_remove(&player).is_some()
    }

    /// Seats silent for longer than the timeout, in the order they were first seen.
    pub fn lapsed(&self, now: Instant) -> Vec<PlayerNumber> {
        self.last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > self.timeout)
            .map(|(player, _)| *player)
            .collect()
    }

    /// Last time `player` was heard from.
    pub fn last_seen(&self, player: PlayerNumber) -> Option<Instant> {
        self.last_seen.get(&player).copied()
    }

    /// Whether `player` is tracked and within the timeout.
    pub fn is_present(&self, player: PlayerNumber, now: Instant) -> bool {
        self.last_seen(player)
            .is_some_and(|seen| now.saturating_duration_since(seen) <= self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_past_the_timeout_lapses() {
        let start = Instant::now();
        let mut presence = PresenceTracker::new(Duration::from_secs(20), 4);
        assert!(presence.observe(1, start));
        assert!(presence.observe(2, start));
        assert!(!presence.observe(1, start + Duration::from_secs(15)));

        let later = start + Duration::from_secs(25);
        assert_eq!(presence.lapsed(later), vec![2]);
        assert!(presence.is_present(1, later));
        assert!(!presence.is_present(2, later));
    }

    #[test]
    fn forgotten_seats_never_lapse() {
        let start = Instant::now();
        let mut presence = PresenceTracker::new(Duration::from_secs(1), 1);
        presence.observe(3, start);
        assert!(presence.forget(3));
        assert!(presence.lapsed(start + Duration::from_secs(60)).is_empty());
        assert!(presence.last_seen(3).is_none());
    }

    #[test]
    fn own_seat_is_never_tracked() {
        let start = Instant::now();
        let mut presence = PresenceTracker::new(Duration::from_secs(1), 1);
        assert!(!presence.observe(1, start));
        presence.observe(2, start + Duration::from_secs(60));
        assert!(presence.lapsed(start + Duration::from_secs(60)).is_empty());
        assert!(presence.last_seen(1).is_none());
    }
}
