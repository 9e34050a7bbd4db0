//! Cached player projection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived view of client + wallet used to answer "can this client start a
/// new match". Lives only in the cache; may lag the wallet until the next
/// wallet refresh reconciles it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    client_id: Uuid,
    balance: f64,
    in_play: bool,
}

impl Player {
    pub fn new(client_id: Uuid, balance: f64) -> Self {
        Self {
            client_id,
            balance,
            in_play: false,
        }
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn in_play(&self) -> bool {
        self.in_play
    }

    pub fn play_on(&mut self) {
        self.in_play = true;
    }

    pub fn play_off(&mut self) {
        self.in_play = false;
    }
}
