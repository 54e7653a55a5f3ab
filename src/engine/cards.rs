//! Playing cards, the seeded shoe, and blackjack hand arithmetic.
//!
//! The shuffle is driven by a published seed so every participant can reproduce the deck order.
//! It is a fairness aid, not a security property: anyone holding the seed knows the deck.

use std::fmt;

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

/// Card suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    /// ♣
    Clubs,
    /// ♦
    Diamonds,
    /// ♥
    Hearts,
    /// ♠
    Spades,
}

impl Suit {
    /// All suits in deck order.
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];
}

/// Rank of the ace.
pub const ACE: u8 = 1;
/// Rank of the jack.
pub const JACK: u8 = 11;
/// Rank of the queen.
pub const QUEEN: u8 = 12;
/// Rank of the king.
pub const KING: u8 = 13;

/// A single playing card. Ranks run from 1 (ace) to 13 (king).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Card {
    /// 1 = ace, 11 = jack, 12 = queen, 13 = king.
    pub rank: u8,
    /// Card suit.
    pub suit: Suit,
}

impl Card {
    /// Build a card from its rank and suit.
    pub const fn new(rank: u8, suit: Suit) -> Self {
        Self { rank, suit }
    }

    /// Whether this card is an ace.
    pub const fn is_ace(&self) -> bool {
        self.rank == ACE
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rank = match self.rank {
            ACE => "A".to_string(),
            JACK => "J".to_string(),
            QUEEN => "Q".to_string(),
            KING => "K".to_string(),
            other => other.to_string(),
        };
        let suit = match self.suit {
            Suit::Clubs => '♣',
            Suit::Diamonds => '♦',
            Suit::Hearts => '♥',
            Suit::Spades => '♠',
        };
        write!(f, "{rank}{suit}")
    }
}

/// The 52 cards of a standard deck in suit-major order.
pub fn standard_deck() -> Vec<Card> {
    Suit::ALL
        .into_iter()
        .flat_map(|suit| (ACE..=KING).map(move |rank| Card::new(rank, suit)))
        .collect()
}

/// Ordered stack of cards dealt from the top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shoe {
    cards: Vec<Card>,
    next: usize,
}

impl Shoe {
    /// Shuffle a standard deck with the given seed.
    pub fn shuffled(seed: u64) -> Self {
        let mut cards = standard_deck();
        let mut rng = StdRng::seed_from_u64(seed);
        cards.shuffle(&mut rng);
        Self { cards, next: 0 }
    }

    /// Build a shoe that deals `cards` in order. Used to stage specific hands.
    pub fn stacked(cards: Vec<Card>) -> Self {
        Self { cards, next: 0 }
    }

    /// Deal the top card, or `None` once the shoe is exhausted.
    pub fn draw(&mut self) -> Option<Card> {
        let card = self.cards.get(self.next).copied()?;
        self.next += 1;
        Some(card)
    }

    /// Cards left to deal.
    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.next)
    }
}

/// Best blackjack total of a hand.
///
/// Jacks, queens and kings count 10. Every ace starts at 11 and is demoted to 1, one at a time,
/// while the total would otherwise exceed 21.
pub fn hand_value(cards: &[Card]) -> u8 {
    let mut total: u16 = 0;
    let mut soft_aces = 0;
    for card in cards {
        total += match card.rank {
            ACE => {
                soft_aces += 1;
                11
            }
            rank if rank >= 10 => 10,
            rank => u16::from(rank),
        };
    }
    while total > 21 && soft_aces > 0 {
        total -= 10;
        soft_aces -= 1;
    }
    total.min(u16::from(u8::MAX)) as u8
}

/// Total obtained when every ace counts 11, the upper bound of [`hand_value`].
pub fn hard_ceiling(cards: &[Card]) -> u16 {
    cards
        .iter()
        .map(|card| match card.rank {
            ACE => 11,
            rank if rank >= 10 => 10,
            rank => u16::from(rank),
        })
        .sum()
}

/// Two-card 21.
pub fn is_natural(cards: &[Card]) -> bool {
    cards.len() == 2 && hand_value(cards) == 21
}

/// Whether the hand is over 21.
pub fn is_bust(cards: &[Card]) -> bool {
    hand_value(cards) > 21
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cards(ranks: &[u8]) -> Vec<Card> {
        ranks.iter().map(|rank| Card::new(*rank, Suit::Spades)).collect()
    }

    #[test]
    fn overdrawn_stored_shoe_reports_nothing_left() {
        let mut shoe: Shoe = serde_json::from_str(r#"{"cards":[],"next":3}"#).unwrap();
        assert_eq!(shoe.remaining(), 0);
        assert_eq!(shoe.draw(), None);
    }

    #[test]
    fn face_cards_count_ten() {
        assert_eq!(hand_value(&cards(&[JACK, QUEEN])), 20);
        assert_eq!(hand_value(&cards(&[KING, 5])), 15);
    }

    #[test]
    fn aces_demote_one_at_a_time() {
        assert_eq!(hand_value(&cards(&[ACE, KING])), 21);
        assert_eq!(hand_value(&cards(&[ACE, ACE])), 12);
        assert_eq!(hand_value(&cards(&[ACE, ACE, 9])), 21);
        assert_eq!(hand_value(&cards(&[ACE, 6, 9])), 16);
        assert_eq!(hand_value(&cards(&[ACE, ACE, ACE, ACE, KING, 7])), 21);
    }

    #[test]
    fn bust_without_aces_stays_bust() {
        assert_eq!(hand_value(&cards(&[KING, QUEEN, 5])), 25);
        assert!(is_bust(&cards(&[KING, QUEEN, 5])));
    }

    #[test]
    fn naturals_need_exactly_two_cards() {
        assert!(is_natural(&cards(&[ACE, QUEEN])));
        assert!(!is_natural(&cards(&[7, 7, 7])));
    }

    #[test]
    fn seeded_shoes_repeat_and_differ_by_seed() {
        let a = Shoe::shuffled(99);
        let b = Shoe::shuffled(99);
        let c = Shoe::shuffled(100);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.remaining(), 52);
    }

    #[test]
    fn shuffled_shoe_is_a_permutation_of_the_deck() {
        let mut shoe = Shoe::shuffled(3);
        let mut dealt = Vec::new();
        while let Some(card) = shoe.draw() {
            dealt.push(card);
        }
        dealt.sort();
        let mut deck = standard_deck();
        deck.sort();
        assert_eq!(dealt, deck);
        assert_eq!(shoe.draw(), None);
    }
}
