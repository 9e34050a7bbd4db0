//! Client wallet.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A client's balance.
///
/// `credit` and `debit` do not bound-check; callers gate debits behind
/// [`Wallet::has_enough_balance`]. Settlement debits run unchecked so a lost
/// bet is always collected, even if the balance dips negative between the
/// check and the settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    id: Uuid,
    client_id: Uuid,
    balance: f64,
}

impl Wallet {
    /// Open a wallet for a client with an initial balance.
    pub fn new(client_id: Uuid, initial_balance: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            balance: initial_balance,
        }
    }

    /// Rehydrate a wallet from stored state.
    pub fn load(id: Uuid, client_id: Uuid, balance: f64) -> Self {
        Self {
            id,
            client_id,
            balance,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn credit(&mut self, amount: f64) {
        self.balance += amount;
    }

    pub fn debit(&mut self, amount: f64) {
        self.balance -= amount;
    }

    pub fn has_enough_balance(&self, amount: f64) -> bool {
        self.balance >= amount
    }
}
