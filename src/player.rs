//! Players and their Elo-style ratings.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::game::Outcome;
use crate::PLAYER_INITIAL_RATING;

const K_FACTOR: f64 = 32.0;
const RATING_DIVISOR: f64 = 400.0;

/// A registered player: a name, fixed for the player's lifetime, and a
/// rating that moves after every finished game. Always held behind an
/// `Arc`, since both a session and the player registry need to keep a
/// reference alive independently.
#[derive(Debug)]
pub struct Player {
    name: String,
    rating: Mutex<i32>,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Arc<Player> {
        Arc::new(Player {
            name: name.into(),
            rating: Mutex::new(PLAYER_INITIAL_RATING),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rating(&self) -> i32 {
        *self.rating.lock()
    }

    /// Updates both players' ratings for a finished game between `first`
    /// (role [`crate::game::Role::First`]) and `second`. Locks whichever of
    /// the two sits at the lower address first, so two games finishing
    /// concurrently between the same pair of players can never deadlock
    /// against each other.
    pub fn post_result(first: &Arc<Player>, second: &Arc<Player>, outcome: Outcome) {
        let (p1, p2, outcome) = if Arc::as_ptr(first) as usize <= Arc::as_ptr(second) as usize {
            (first, second, outcome)
        } else {
            (second, first, outcome.swapped())
        };

        let mut r1 = p1.rating.lock();
        let mut r2 = p2.rating.lock();

        let score1 = match outcome {
            Outcome::Draw => 0.5,
            Outcome::FirstWins => 1.0,
            Outcome::SecondWins => 0.0,
        };
        let expected1 = 1.0 / (1.0 + 10f64.powf((*r2 - *r1) as f64 / RATING_DIVISOR));
        let delta = (K_FACTOR * (score1 - expected1)) as i32;

        *r1 += delta;
        *r2 -= delta;
    }
}
