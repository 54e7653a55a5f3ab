//! Heads-up five-card showdown: ante, deal five cards each, one betting round, then showdown.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use super::{
    EndReason, EngineRejection, GameAction, GameEngine, GameId, GameResult, Outcome,
    PlayerNumber, PlayerStat,
    cards::{ACE, Card, Shoe},
};

/// Chips each seat brings to the table.
pub const STARTING_STACK: u32 = 100;
/// Forced contribution taken from every seat before the deal.
pub const ANTE: u32 = 1;
/// Cards per hand.
pub const HAND_SIZE: usize = 5;

/// Poker hand categories, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum HandCategory {
    HighCard,
    Pair,
    TwoPair,
    Trips,
    Straight,
    Flush,
    FullHouse,
    Quads,
    StraightFlush,
}

impl fmt::Display for HandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::HighCard => "high card",
            Self::Pair => "pair",
            Self::TwoPair => "two pair",
            Self::Trips => "three of a kind",
            Self::Straight => "straight",
            Self::Flush => "flush",
            Self::FullHouse => "full house",
            Self::Quads => "four of a kind",
            Self::StraightFlush => "straight flush",
        };
        f.write_str(repr)
    }
}

/// Comparable strength of a five-card hand.
///
/// Ordering is by category, then lexicographically by `tiebreak`: the values that decide
/// between two hands of the same category, most significant first, with aces as 14.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandRank {
    /// Hand category.
    pub category: HandCategory,
    /// Deciding values, most significant first.
    pub tiebreak: Vec<u8>,
}

fn high_value(card: &Card) -> u8 {
    if card.rank == ACE { 14 } else { card.rank }
}

/// Rank a five-card hand.
pub fn evaluate_five(cards: &[Card; HAND_SIZE]) -> HandRank {
    let mut values: Vec<u8> = cards.iter().map(high_value).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    // (count, value) groups, biggest group first, then highest value.
    let mut groups: Vec<(u8, u8)> = Vec::with_capacity(HAND_SIZE);
    for value in &values {
        match groups.iter_mut().find(|(_, v)| v == value) {
            Some((count, _)) => *count += 1,
            None => groups.push((1, *value)),
        }
    }
    groups.sort_unstable_by(|a, b| b.cmp(a));

    let flush = cards.iter().all(|card| card.suit == cards[0].suit);
    let straight_high = match values.as_slice() {
        [14, 5, 4, 3, 2] => Some(5),
        [high, .., low] if groups.len() == HAND_SIZE && high - low == 4 => Some(*high),
        _ => None,
    };
    let counts: Vec<u8> = groups.iter().map(|(count, _)| *count).collect();
    let by_group: Vec<u8> = groups.iter().map(|(_, value)| *value).collect();

    let (category, tiebreak) = match (straight_high, flush, counts.as_slice()) {
        (Some(high), true, _) => (HandCategory::StraightFlush, vec![high]),
        (_, _, [4, 1]) => (HandCategory::Quads, by_group),
        (_, _, [3, 2]) => (HandCategory::FullHouse, by_group),
        (_, true, _) => (HandCategory::Flush, values),
        (Some(high), false, _) => (HandCategory::Straight, vec![high]),
        (_, _, [3, 1, 1]) => (HandCategory::Trips, by_group),
        (_, _, [2, 2, 1]) => (HandCategory::TwoPair, by_group),
        (_, _, [2, 1, 1, 1]) => (HandCategory::Pair, by_group),
        _ => (HandCategory::HighCard, values),
    };
    HandRank { category, tiebreak }
}

/// Betting phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PokerPhase {
    /// The single betting round is open.
    Betting,
    /// Hands were compared.
    Showdown,
    /// Everyone but one seat folded.
    FoldedOut,
    /// Ended by a control action.
    Aborted,
}

/// One seat at the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokerSeat {
    /// Seat number.
    pub player: PlayerNumber,
    /// Five dealt cards.
    pub hand: Vec<Card>,
    /// Chips behind.
    pub stack: u32,
    /// Chips put in during the betting round, antes excluded.
    pub committed: u32,
    /// Whether the seat gave up the hand.
    pub folded: bool,
    /// Whether the seat acted since the last bet.
    pub acted: bool,
    /// Rank shown at showdown.
    pub shown: Option<HandRank>,
}

impl PokerSeat {
    fn rank(&self) -> Option<HandRank> {
        let cards: &[Card; HAND_SIZE] = self.hand.as_slice().try_into().ok()?;
        Some(evaluate_five(cards))
    }
}

/// Poker snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokerState {
    players: Vec<PlayerNumber>,
    /// Current phase.
    pub phase: PokerPhase,
    /// Seats in turn order.
    pub seats: Vec<PokerSeat>,
    /// Chips in the middle.
    pub pot: u32,
    /// Amount every live seat must have committed to close the round.
    pub current_bet: u32,
    turn_index: usize,
    result: Option<GameResult>,
}

impl PokerState {
    /// Take antes and deal five cards to each seat from `shoe`, round-robin.
    pub fn deal(players: &[PlayerNumber], mut shoe: Shoe) -> Self {
        let mut seats: Vec<PokerSeat> = players
            .iter()
            .map(|player| PokerSeat {
                player: *player,
                hand: Vec::with_capacity(HAND_SIZE),
                stack: STARTING_STACK - ANTE,
                committed: 0,
                folded: false,
                acted: false,
                shown: None,
            })
            .collect();
        for _ in 0..HAND_SIZE {
            for seat in seats.iter_mut() {
                seat.hand.extend(shoe.draw());
            }
        }

        Self {
            players: players.to_vec(),
            phase: PokerPhase::Betting,
            pot: ANTE * seats.len() as u32,
            seats,
            current_bet: 0,
            turn_index: 0,
            result: None,
        }
    }

    fn live(&self) -> impl Iterator<Item = &PokerSeat> {
        self.seats.iter().filter(|seat| !seat.folded)
    }

    fn round_closed(&self) -> bool {
        self.live()
            .all(|seat| seat.acted && seat.committed == self.current_bet)
    }

    fn rotate(&mut self) {
        let len = self.seats.len();
        for step in 1..=len {
            let index = (self.turn_index + step) % len;
            if !self.seats[index].folded {
                self.turn_index = index;
                return;
            }
        }
    }

    fn award(&mut self, winners: &[usize]) {
        if winners.is_empty() {
            return;
        }
        let share = self.pot / winners.len() as u32;
        let mut odd = self.pot % winners.len() as u32;
        for index in winners {
            self.seats[*index].stack += share;
            // Odd chips go to the earliest seat in turn order.
            if odd > 0 {
                self.seats[*index].stack += 1;
                odd -= 1;
            }
        }
        self.pot = 0;
    }

    fn showdown(&mut self) {
        for seat in self.seats.iter_mut().filter(|seat| !seat.folded) {
            seat.shown = seat.rank();
        }
        let best = self.live().filter_map(|seat| seat.shown.clone()).max();
        let winners: Vec<usize> = self
            .seats
            .iter()
            .enumerate()
            .filter(|(_, seat)| !seat.folded && seat.shown.is_some() && seat.shown == best)
            .map(|(index, _)| index)
            .collect();
        self.award(&winners);

        let outcome = match winners.as_slice() {
            [index] => Outcome::Winner {
                player: self.seats[*index].player,
            },
            _ => Outcome::Draw,
        };
        self.finish(PokerPhase::Showdown, outcome, EndReason::Completed);
    }

    fn finish(&mut self, phase: PokerPhase, outcome: Outcome, reason: EndReason) {
        self.phase = phase;
        self.result = Some(GameResult {
            outcome,
            reason,
            stats: self.stats(),
        });
    }

    fn stats(&self) -> Vec<PlayerStat> {
        self.seats
            .iter()
            .map(|seat| {
                let detail = match (&seat.shown, seat.folded) {
                    (_, true) => "folded".to_string(),
                    (Some(rank), false) => rank.category.to_string(),
                    (None, false) => "did not show".to_string(),
                };
                PlayerStat {
                    player: seat.player,
                    score: i64::from(seat.stack),
                    detail,
                }
            })
            .collect()
    }
}

/// Poker reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poker;

impl GameEngine for Poker {
    type State = PokerState;

    const GAME: GameId = GameId::Poker;

    fn init(&self, seed: u64, players: &[PlayerNumber]) -> Self::State {
        PokerState::deal(players, Shoe::shuffled(seed))
    }

    fn apply(
        &self,
        state: &Self::State,
        player: PlayerNumber,
        action: &GameAction,
    ) -> Result<Self::State, EngineRejection> {
        let mut next = state.clone();
        let current_bet = next.current_bet;
        let effective_stack = next.live().map(|seat| seat.stack).min().unwrap_or(0);
        let index = next
            .seats
            .iter()
            .position(|seat| seat.player == player)
            .ok_or(EngineRejection::UnknownPlayer(player))?;
        let seat = &mut next.seats[index];

        match action {
            GameAction::Check => {
                if seat.committed != current_bet {
                    return Err(EngineRejection::Illegal(format!(
                        "cannot check facing a bet of {current_bet}"
                    )));
                }
                seat.acted = true;
            }
            GameAction::Bet { amount } => {
                if current_bet > 0 {
                    return Err(EngineRejection::Illegal(
                        "the betting is already open".into(),
                    ));
                }
                if *amount == 0 || *amount > effective_stack {
                    return Err(EngineRejection::Illegal(format!(
                        "bet must be between 1 and {effective_stack}"
                    )));
                }
                seat.stack -= amount;
                seat.committed = *amount;
                next.pot += amount;
                next.current_bet = *amount;
                for other in next.seats.iter_mut() {
                    other.acted = other.player == player;
                }
            }
            GameAction::Call => {
                let owed = current_bet.saturating_sub(seat.committed);
                if owed == 0 {
                    return Err(EngineRejection::Illegal("there is nothing to call".into()));
                }
                seat.stack -= owed;
                seat.committed = current_bet;
                seat.acted = true;
                next.pot += owed;
            }
            GameAction::Fold => {
                seat.folded = true;
                seat.acted = true;
                let survivors: Vec<usize> = next
                    .seats
                    .iter()
                    .enumerate()
                    .filter(|(_, seat)| !seat.folded)
                    .map(|(index, _)| index)
                    .collect();
                if let [winner] = survivors.as_slice() {
                    let winner = *winner;
                    next.award(&[winner]);
                    let outcome = Outcome::Winner {
                        player: next.seats[winner].player,
                    };
                    next.finish(PokerPhase::FoldedOut, outcome, EndReason::Completed);
                    return Ok(next);
                }
            }
            other => {
                return Err(EngineRejection::Unsupported {
                    game: Self::GAME,
                    action: other.label(),
                });
            }
        }

        if next.round_closed() {
            next.showdown();
        } else {
            next.rotate();
        }
        Ok(next)
    }

    fn players<'a>(&self, state: &'a Self::State) -> &'a [PlayerNumber] {
        &state.players
    }

    fn current_turn(&self, state: &Self::State) -> Option<PlayerNumber> {
        if state.result.is_some() {
            return None;
        }
        state.seats.get(state.turn_index).map(|seat| seat.player)
    }

    fn result<'a>(&self, state: &'a Self::State) -> Option<&'a GameResult> {
        state.result.as_ref()
    }

    fn conclude(&self, state: &Self::State, outcome: Outcome, reason: EndReason) -> Self::State {
        let mut next = state.clone();
        let winners: Vec<usize> = outcome
            .winners(&[])
            .iter()
            .filter_map(|player| next.seats.iter().position(|seat| seat.player == *player))
            .collect();
        next.award(&winners);
        next.finish(PokerPhase::Aborted, outcome, reason);
        next
    }
}

/// Compare two five-card hands.
pub fn compare_hands(a: &[Card; HAND_SIZE], b: &[Card; HAND_SIZE]) -> Ordering {
    evaluate_five(a).cmp(&evaluate_five(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cards::{JACK, KING, QUEEN, Suit};

    fn hand(layout: [(u8, Suit); 5]) -> [Card; 5] {
        layout.map(|(rank, suit)| Card::new(rank, suit))
    }

    fn mixed(ranks: [u8; 5]) -> [Card; 5] {
        let suits = [
            Suit::Clubs,
            Suit::Diamonds,
            Suit::Hearts,
            Suit::Spades,
            Suit::Clubs,
        ];
        let mut index = 0;
        ranks.map(|rank| {
            let card = Card::new(rank, suits[index]);
            index += 1;
            card
        })
    }

    fn suited(ranks: [u8; 5]) -> [Card; 5] {
        ranks.map(|rank| Card::new(rank, Suit::Hearts))
    }

    #[test]
    fn categories_are_recognised() {
        assert_eq!(
            evaluate_five(&mixed([2, 5, 9, JACK, KING])).category,
            HandCategory::HighCard
        );
        assert_eq!(
            evaluate_five(&mixed([2, 2, 9, JACK, KING])).category,
            HandCategory::Pair
        );
        assert_eq!(
            evaluate_five(&mixed([2, 2, 9, 9, KING])).category,
            HandCategory::TwoPair
        );
        assert_eq!(
            evaluate_five(&mixed([9, 9, 9, JACK, KING])).category,
            HandCategory::Trips
        );
        assert_eq!(
            evaluate_five(&mixed([9, 10, JACK, QUEEN, KING])).category,
            HandCategory::Straight
        );
        assert_eq!(
            evaluate_five(&suited([2, 5, 9, JACK, KING])).category,
            HandCategory::Flush
        );
        assert_eq!(
            evaluate_five(&mixed([9, 9, 9, KING, KING])).category,
            HandCategory::FullHouse
        );
        assert_eq!(
            evaluate_five(&mixed([9, 9, 9, 9, KING])).category,
            HandCategory::Quads
        );
        assert_eq!(
            evaluate_five(&suited([10, JACK, QUEEN, KING, ACE])).category,
            HandCategory::StraightFlush
        );
    }

    #[test]
    fn wheel_is_a_five_high_straight() {
        let wheel = evaluate_five(&mixed([ACE, 2, 3, 4, 5]));
        assert_eq!(wheel.category, HandCategory::Straight);
        assert_eq!(wheel.tiebreak, vec![5]);
        let six_high = evaluate_five(&mixed([2, 3, 4, 5, 6]));
        assert!(six_high > wheel);
    }

    #[test]
    fn kickers_break_ties() {
        let a = mixed([ACE, ACE, KING, 7, 3]);
        let b = mixed([ACE, ACE, QUEEN, JACK, 9]);
        assert_eq!(compare_hands(&a, &b), Ordering::Greater);

        let c = hand([
            (10, Suit::Clubs),
            (10, Suit::Hearts),
            (4, Suit::Spades),
            (4, Suit::Clubs),
            (2, Suit::Diamonds),
        ]);
        let d = hand([
            (10, Suit::Diamonds),
            (10, Suit::Spades),
            (4, Suit::Hearts),
            (4, Suit::Diamonds),
            (2, Suit::Hearts),
        ]);
        assert_eq!(compare_hands(&c, &d), Ordering::Equal);
    }

    #[test]
    fn aces_are_high_outside_the_wheel() {
        let aces = evaluate_five(&mixed([ACE, ACE, 2, 3, 4]));
        let kings = evaluate_five(&mixed([KING, KING, QUEEN, JACK, 9]));
        assert!(aces > kings);
    }

    /// Seat 1 gets a pair of kings, seat 2 a queen-high hand.
    fn staged() -> PokerState {
        let seat1 = mixed([KING, KING, 7, 5, 2]);
        let seat2 = mixed([QUEEN, 9, 8, 4, 3]);
        let mut order = Vec::new();
        for index in 0..HAND_SIZE {
            order.push(seat1[index]);
            order.push(seat2[index]);
        }
        PokerState::deal(&[1, 2], Shoe::stacked(order))
    }

    #[test]
    fn check_check_goes_to_showdown() {
        let state = staged();
        assert_eq!(state.pot, 2);
        let state = Poker.apply(&state, 1, &GameAction::Check).unwrap();
        assert_eq!(Poker.current_turn(&state), Some(2));
        let state = Poker.apply(&state, 2, &GameAction::Check).unwrap();

        assert_eq!(state.phase, PokerPhase::Showdown);
        let result = state.result.as_ref().unwrap();
        assert_eq!(result.outcome, Outcome::Winner { player: 1 });
        assert_eq!(result.stats[0].score, 101);
        assert_eq!(result.stats[1].score, 99);
        assert_eq!(result.stats[0].detail, "pair");
    }

    #[test]
    fn bet_and_call_grow_the_pot() {
        let state = staged();
        let state = Poker.apply(&state, 1, &GameAction::Bet { amount: 10 }).unwrap();
        assert!(matches!(
            Poker.apply(&state, 2, &GameAction::Check),
            Err(EngineRejection::Illegal(_))
        ));
        let state = Poker.apply(&state, 2, &GameAction::Call).unwrap();
        assert_eq!(state.phase, PokerPhase::Showdown);
        assert_eq!(state.seats[0].stack, 111);
        assert_eq!(state.seats[1].stack, 89);
    }

    #[test]
    fn check_then_bet_reopens_action_for_the_first_seat() {
        let state = staged();
        let state = Poker.apply(&state, 1, &GameAction::Check).unwrap();
        let state = Poker.apply(&state, 2, &GameAction::Bet { amount: 5 }).unwrap();
        assert_eq!(Poker.current_turn(&state), Some(1));
        assert_eq!(state.phase, PokerPhase::Betting);
    }

    #[test]
    fn folding_hands_the_pot_over() {
        let state = staged();
        let state = Poker.apply(&state, 1, &GameAction::Bet { amount: 20 }).unwrap();
        let state = Poker.apply(&state, 2, &GameAction::Fold).unwrap();
        assert_eq!(state.phase, PokerPhase::FoldedOut);
        assert_eq!(
            state.result.as_ref().unwrap().outcome,
            Outcome::Winner { player: 1 }
        );
        assert_eq!(state.seats[0].stack, 101);
        assert_eq!(state.result.as_ref().unwrap().stats[1].detail, "folded");
    }

    #[test]
    fn oversized_and_repeated_bets_are_rejected() {
        let state = staged();
        assert!(Poker.apply(&state, 1, &GameAction::Bet { amount: 500 }).is_err());
        assert!(Poker.apply(&state, 1, &GameAction::Bet { amount: 0 }).is_err());
        let state = Poker.apply(&state, 1, &GameAction::Bet { amount: 5 }).unwrap();
        assert!(Poker.apply(&state, 2, &GameAction::Bet { amount: 5 }).is_err());
        assert!(Poker.apply(&state, 2, &GameAction::Hit).is_err());
    }

    #[test]
    fn split_pot_is_a_draw() {
        let seat1 = mixed([KING, KING, 7, 5, 2]);
        let seat2 = hand([
            (KING, Suit::Hearts),
            (KING, Suit::Spades),
            (7, Suit::Clubs),
            (5, Suit::Diamonds),
            (2, Suit::Hearts),
        ]);
        let mut order = Vec::new();
        for index in 0..HAND_SIZE {
            order.push(seat1[index]);
            order.push(seat2[index]);
        }
        let state = PokerState::deal(&[1, 2], Shoe::stacked(order));
        let state = Poker.apply(&state, 1, &GameAction::Check).unwrap();
        let state = Poker.apply(&state, 2, &GameAction::Check).unwrap();
        assert_eq!(state.result.as_ref().unwrap().outcome, Outcome::Draw);
        assert_eq!(state.seats[0].stack, 100);
        assert_eq!(state.seats[1].stack, 100);
    }
}
