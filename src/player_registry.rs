//! Tracks every player that has ever logged in, keyed by name, so that
//! logging in twice with the same name returns the same rating rather than
//! starting over.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::player::Player;

#[derive(Default)]
pub struct PlayerRegistry {
    players: Mutex<Vec<Arc<Player>>>,
}

impl PlayerRegistry {
    pub fn new() -> Arc<PlayerRegistry> {
        Arc::new(PlayerRegistry {
            players: Mutex::new(Vec::new()),
        })
    }

    /// Returns the existing player named `name`, or creates and registers a
    /// fresh one at the initial rating.
    pub fn register(&self, name: &str) -> Arc<Player> {
        let mut players = self.players.lock();
        if let Some(existing) = players.iter().find(|p| p.name() == name) {
            return existing.clone();
        }
        let player = Player::new(name);
        players.push(player.clone());
        player
    }

    pub fn len(&self) -> usize {
        self.players.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
