//! Two-seat blackjack against an automated dealer.
//!
//! Seats act in player-number order. Once the last seat stands or busts, the same transition
//! reveals the dealer's hand, runs the dealer automaton and classifies every seat, so the
//! participant whose action closed the round is the only one computing the dealer's play.

use serde::{Deserialize, Serialize};

use super::{
    EndReason, EngineRejection, GameAction, GameEngine, GameId, GameResult, Outcome,
    PlayerNumber, PlayerStat,
    cards::{Card, Shoe, hand_value, is_bust, is_natural},
};

/// Dealer stands on this total or above.
pub const DEALER_STAND_ON: u8 = 17;

/// Round phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlackjackPhase {
    /// Seats are still acting.
    PlayerTurns,
    /// Dealer has played and every seat is classified.
    Finished,
}

/// How a seat fared against the dealer. Declaration order is the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatOutcome {
    /// Lower total than the dealer, bust, or beaten by a dealer natural.
    Lose,
    /// Same total as the dealer.
    Push,
    /// Higher total than the dealer, or the dealer bust.
    Win,
    /// Two-card 21 against a dealer without one.
    Blackjack,
}

impl SeatOutcome {
    fn label(self) -> &'static str {
        match self {
            SeatOutcome::Lose => "lose",
            SeatOutcome::Push => "push",
            SeatOutcome::Win => "win",
            SeatOutcome::Blackjack => "blackjack",
        }
    }
}

/// One player's hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Owning seat number.
    pub player: PlayerNumber,
    /// Cards held.
    pub hand: Vec<Card>,
    /// Whether the seat has finished acting.
    pub done: bool,
    /// Classification once the dealer has played.
    pub outcome: Option<SeatOutcome>,
}

/// Blackjack snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackjackState {
    players: Vec<PlayerNumber>,
    /// Current phase.
    pub phase: BlackjackPhase,
    /// Player hands in turn order.
    pub seats: Vec<Seat>,
    /// Dealer hand; the second card is the hole card until the round is over.
    pub dealer: Vec<Card>,
    shoe: Shoe,
    current_turn: Option<PlayerNumber>,
    result: Option<GameResult>,
}

impl BlackjackState {
    /// Deal two cards to each seat and the dealer from `shoe`, round-robin.
    pub fn deal(players: &[PlayerNumber], mut shoe: Shoe) -> Self {
        let mut seats: Vec<Seat> = players
            .iter()
            .map(|player| Seat {
                player: *player,
                hand: Vec::with_capacity(4),
                done: false,
                outcome: None,
            })
            .collect();
        let mut dealer = Vec::with_capacity(4);

        for _ in 0..2 {
            for seat in seats.iter_mut() {
                seat.hand.extend(shoe.draw());
            }
            dealer.extend(shoe.draw());
        }
        for seat in seats.iter_mut() {
            seat.done = hand_value(&seat.hand) >= 21;
        }

        let mut state = Self {
            players: players.to_vec(),
            phase: BlackjackPhase::PlayerTurns,
            seats,
            dealer,
            shoe,
            current_turn: None,
            result: None,
        };
        state.advance(None);
        state
    }

    /// Dealer's visible up-card.
    pub fn dealer_up_card(&self) -> Option<Card> {
        self.dealer.first().copied()
    }

    fn seat_mut(&mut self, player: PlayerNumber) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|seat| seat.player == player)
    }

    /// Hand the turn to the next seat still acting after `from`, or settle the round.
    fn advance(&mut self, from: Option<PlayerNumber>) {
        let start = from
            .and_then(|player| self.seats.iter().position(|seat| seat.player == player))
            .map_or(0, |index| index + 1);
        let next = self.seats[start.min(self.seats.len())..]
            .iter()
            .chain(self.seats[..start.min(self.seats.len())].iter())
            .find(|seat| !seat.done)
            .map(|seat| seat.player);

        match next {
            Some(player) => self.current_turn = Some(player),
            None => self.settle(),
        }
    }

    fn settle(&mut self) {
        self.current_turn = None;
        play_dealer(&mut self.dealer, &mut self.shoe, &self.seats);
        for seat in self.seats.iter_mut() {
            seat.outcome = Some(classify(&seat.hand, &self.dealer));
        }
        self.phase = BlackjackPhase::Finished;
        self.result = Some(GameResult {
            outcome: decide(&self.seats),
            reason: EndReason::Completed,
            stats: self.stats(),
        });
    }

    fn stats(&self) -> Vec<PlayerStat> {
        self.seats
            .iter()
            .map(|seat| {
                let total = hand_value(&seat.hand);
                let detail = match seat.outcome {
                    Some(outcome) => format!("{} with {total}", outcome.label()),
                    None => format!("stopped at {total}"),
                };
                PlayerStat {
                    player: seat.player,
                    score: i64::from(total),
                    detail,
                }
            })
            .collect()
    }
}

/// Run the dealer automaton.
///
/// The dealer only draws when at least one seat is still alive, and then keeps drawing until it
/// reaches [`DEALER_STAND_ON`] or the shoe runs dry.
pub fn play_dealer(dealer: &mut Vec<Card>, shoe: &mut Shoe, seats: &[Seat]) {
    if seats.iter().all(|seat| is_bust(&seat.hand)) {
        return;
    }
    while hand_value(dealer) < DEALER_STAND_ON {
        match shoe.draw() {
            Some(card) => dealer.push(card),
            None => break,
        }
    }
}

/// Classify a seat's hand against the dealer's final hand.
pub fn classify(hand: &[Card], dealer: &[Card]) -> SeatOutcome {
    if is_bust(hand) {
        return SeatOutcome::Lose;
    }
    match (is_natural(hand), is_natural(dealer)) {
        (true, false) => return SeatOutcome::Blackjack,
        (false, true) => return SeatOutcome::Lose,
        (true, true) => return SeatOutcome::Push,
        (false, false) => {}
    }
    if is_bust(dealer) {
        return SeatOutcome::Win;
    }
    let (seat_total, dealer_total) = (hand_value(hand), hand_value(dealer));
    match seat_total.cmp(&dealer_total) {
        std::cmp::Ordering::Greater => SeatOutcome::Win,
        std::cmp::Ordering::Equal => SeatOutcome::Push,
        std::cmp::Ordering::Less => SeatOutcome::Lose,
    }
}

/// Pick the match winner among classified seats.
///
/// The best classification wins. Seats sharing it are separated by raw total (a bust counts as
/// zero); a shared push or equal totals are a draw. A lone seat that loses to the dealer loses
/// the match outright.
fn decide(seats: &[Seat]) -> Outcome {
    let Some(best) = seats.iter().filter_map(|seat| seat.outcome).max() else {
        return Outcome::Draw;
    };
    let leaders: Vec<&Seat> = seats
        .iter()
        .filter(|seat| seat.outcome == Some(best))
        .collect();

    if let [leader] = leaders.as_slice() {
        if seats.len() == 1 {
            return match best {
                SeatOutcome::Blackjack | SeatOutcome::Win => Outcome::Winner {
                    player: leader.player,
                },
                SeatOutcome::Push => Outcome::Draw,
                SeatOutcome::Lose => Outcome::AllLose,
            };
        }
        return Outcome::Winner {
            player: leader.player,
        };
    }
    if best == SeatOutcome::Push {
        return Outcome::Draw;
    }

    let effective = |seat: &Seat| {
        let total = hand_value(&seat.hand);
        if total > 21 { 0 } else { total }
    };
    let top = leaders.iter().map(|seat| effective(seat)).max().unwrap_or(0);
    let mut on_top = leaders.iter().filter(|seat| effective(seat) == top);
    match (on_top.next(), on_top.next()) {
        (Some(seat), None) => Outcome::Winner {
            player: seat.player,
        },
        _ => Outcome::Draw,
    }
}

/// Blackjack reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blackjack;

impl GameEngine for Blackjack {
    type State = BlackjackState;

    const GAME: GameId = GameId::Blackjack;

    fn init(&self, seed: u64, players: &[PlayerNumber]) -> Self::State {
        BlackjackState::deal(players, Shoe::shuffled(seed))
    }

    fn apply(
        &self,
        state: &Self::State,
        player: PlayerNumber,
        action: &GameAction,
    ) -> Result<Self::State, EngineRejection> {
        let mut next = state.clone();
        let drawn = match action {
            GameAction::Hit => Some(
                next.shoe
                    .draw()
                    .ok_or_else(|| EngineRejection::Illegal("the shoe is exhausted".into()))?,
            ),
            GameAction::Stand => None,
            other => {
                return Err(EngineRejection::Unsupported {
                    game: Self::GAME,
                    action: other.label(),
                });
            }
        };

        let seat = next
            .seat_mut(player)
            .ok_or(EngineRejection::UnknownPlayer(player))?;
        match drawn {
            Some(card) => {
                seat.hand.push(card);
                seat.done = hand_value(&seat.hand) >= 21;
            }
            None => seat.done = true,
        }
        if seat.done {
            next.advance(Some(player));
        }
        Ok(next)
    }

    fn players<'a>(&self, state: &'a Self::State) -> &'a [PlayerNumber] {
        &state.players
    }

    fn current_turn(&self, state: &Self::State) -> Option<PlayerNumber> {
        state.current_turn
    }

    fn result<'a>(&self, state: &'a Self::State) -> Option<&'a GameResult> {
        state.result.as_ref()
    }

    fn conclude(&self, state: &Self::State, outcome: Outcome, reason: EndReason) -> Self::State {
        let mut next = state.clone();
        next.phase = BlackjackPhase::Finished;
        next.current_turn = None;
        next.result = Some(GameResult {
            outcome,
            reason,
            stats: next.stats(),
        });
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cards::{ACE, JACK, KING, QUEEN, Suit};

    fn card(rank: u8) -> Card {
        Card::new(rank, Suit::Hearts)
    }

    fn hand(ranks: &[u8]) -> Vec<Card> {
        ranks.iter().map(|rank| card(*rank)).collect()
    }

    fn seat(player: PlayerNumber, ranks: &[u8]) -> Seat {
        Seat {
            player,
            hand: hand(ranks),
            done: true,
            outcome: None,
        }
    }

    /// Deal order is seat 1, seat 2, dealer, seat 1, seat 2, dealer, then draws.
    fn staged(order: &[u8]) -> BlackjackState {
        BlackjackState::deal(&[1, 2], Shoe::stacked(hand(order)))
    }

    #[test]
    fn ace_king_against_ace_king_is_a_push() {
        assert_eq!(
            classify(&hand(&[ACE, KING]), &hand(&[ACE, KING])),
            SeatOutcome::Push
        );
    }

    #[test]
    fn classification_ranks_blackjack_over_win_over_push_over_lose() {
        assert!(SeatOutcome::Blackjack > SeatOutcome::Win);
        assert!(SeatOutcome::Win > SeatOutcome::Push);
        assert!(SeatOutcome::Push > SeatOutcome::Lose);
        assert_eq!(
            classify(&hand(&[ACE, QUEEN]), &hand(&[10, 9])),
            SeatOutcome::Blackjack
        );
        assert_eq!(
            classify(&hand(&[10, 9]), &hand(&[ACE, QUEEN])),
            SeatOutcome::Lose
        );
        assert_eq!(
            classify(&hand(&[10, 5]), &hand(&[10, 6, 9])),
            SeatOutcome::Win
        );
        assert_eq!(
            classify(&hand(&[10, 5, 9]), &hand(&[10, 6, 9])),
            SeatOutcome::Lose
        );
    }

    #[test]
    fn dealer_stops_at_seventeen() {
        let mut dealer = hand(&[10, 7]);
        let mut shoe = Shoe::stacked(hand(&[2, 3]));
        play_dealer(&mut dealer, &mut shoe, &[seat(1, &[10, 8])]);
        assert_eq!(dealer.len(), 2);
        assert_eq!(shoe.remaining(), 2);
    }

    #[test]
    fn dealer_draws_below_seventeen() {
        let mut dealer = hand(&[10, 2]);
        let mut shoe = Shoe::stacked(hand(&[3, 4, 9]));
        play_dealer(&mut dealer, &mut shoe, &[seat(1, &[10, 8])]);
        assert_eq!(hand_value(&dealer), 19);
        assert_eq!(shoe.remaining(), 1);
    }

    #[test]
    fn dealer_does_not_draw_when_every_seat_bust() {
        let mut dealer = hand(&[10, 2]);
        let mut shoe = Shoe::stacked(hand(&[5]));
        play_dealer(
            &mut dealer,
            &mut shoe,
            &[seat(1, &[10, 8, 9]), seat(2, &[KING, QUEEN, 2])],
        );
        assert_eq!(dealer.len(), 2);
    }

    #[test]
    fn dealer_stops_when_the_shoe_is_empty() {
        let mut dealer = hand(&[2, 3]);
        let mut shoe = Shoe::stacked(hand(&[2]));
        play_dealer(&mut dealer, &mut shoe, &[seat(1, &[10, 8])]);
        assert_eq!(hand_value(&dealer), 7);
    }

    #[test]
    fn seats_act_in_order_and_the_last_stand_settles() {
        // seat1: 10,6  seat2: 9,8  dealer: 10,7
        let state = staged(&[10, 9, 10, 6, 8, 7, 5]);
        assert_eq!(state.current_turn, Some(1));

        let state = Blackjack.apply(&state, 1, &GameAction::Hit).unwrap();
        // seat1 drew the 5 -> 21 and is done automatically.
        assert_eq!(hand_value(&state.seats[0].hand), 21);
        assert_eq!(state.current_turn, Some(2));

        let state = Blackjack.apply(&state, 2, &GameAction::Stand).unwrap();
        assert_eq!(state.phase, BlackjackPhase::Finished);
        assert_eq!(state.seats[0].outcome, Some(SeatOutcome::Win));
        assert_eq!(state.seats[1].outcome, Some(SeatOutcome::Push));
        let result = state.result.as_ref().unwrap();
        assert_eq!(result.outcome, Outcome::Winner { player: 1 });
        assert_eq!(result.stats[0].score, 21);
    }

    #[test]
    fn same_classification_is_split_by_raw_total() {
        let mut seats = vec![seat(1, &[10, 9]), seat(2, &[10, 8])];
        let dealer = hand(&[10, 6, 8]);
        for seat in seats.iter_mut() {
            seat.outcome = Some(classify(&seat.hand, &dealer));
        }
        assert_eq!(decide(&seats), Outcome::Winner { player: 1 });
    }

    #[test]
    fn shared_push_is_a_draw() {
        let mut seats = vec![seat(1, &[10, 8]), seat(2, &[9, 9])];
        let dealer = hand(&[JACK, 8]);
        for seat in seats.iter_mut() {
            seat.outcome = Some(classify(&seat.hand, &dealer));
        }
        assert_eq!(decide(&seats), Outcome::Draw);
    }

    #[test]
    fn two_busted_seats_draw() {
        let mut seats = vec![seat(1, &[10, 8, 9]), seat(2, &[10, 5, KING])];
        let dealer = hand(&[10, 7]);
        for seat in seats.iter_mut() {
            seat.outcome = Some(classify(&seat.hand, &dealer));
        }
        assert_eq!(decide(&seats), Outcome::Draw);
    }

    #[test]
    fn naturals_are_done_on_the_deal() {
        // seat1: A,K  seat2: 9,5  dealer: 10,7
        let state = staged(&[ACE, 9, 10, KING, 5, 7]);
        assert!(state.seats[0].done);
        assert_eq!(state.current_turn, Some(2));
    }

    #[test]
    fn non_blackjack_actions_are_rejected() {
        let state = Blackjack.init(1, &[1, 2]);
        let turn = state.current_turn.unwrap_or(1);
        assert!(matches!(
            Blackjack.apply(&state, turn, &GameAction::Fold),
            Err(EngineRejection::Unsupported { .. })
        ));
    }
}
