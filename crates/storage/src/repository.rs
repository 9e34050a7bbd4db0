//! Per-entity repositories over the cache-aside layer.
//!
//! Each repository pairs a [`CacheAside`] instance (its own key prefix, its
//! own lock namespace) with the durable [`Database`]. Services never touch
//! the cache or the database directly; these are the only mutation gateways.

use crate::cache::KeyValueStore;
use crate::cache_aside::CacheAside;
use crate::database::Database;
use crate::error::{Result, StorageError};
use crate::lock::DistributedLock;
use domain::{Client, Match, Player, Wallet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const CLIENT_KEY_PREFIX: &str = "client:";
pub const WALLET_KEY_PREFIX: &str = "wallet:";
pub const PLAYER_KEY_PREFIX: &str = "player:";
pub const MATCH_KEY_PREFIX: &str = "match:";

/// Clients, cached by id. Username lookups go straight to the durable
/// store: they only happen on the login path and are not a hot key.
#[derive(Clone)]
pub struct ClientRepository {
    cache: CacheAside<Client>,
    db: Arc<dyn Database>,
}

impl ClientRepository {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        lock: DistributedLock,
        db: Arc<dyn Database>,
    ) -> Self {
        Self {
            cache: CacheAside::new(store, lock, CLIENT_KEY_PREFIX),
            db,
        }
    }

    /// Register a client together with their wallet. Both rows go to the
    /// durable store inside one save window; the client is cached on
    /// success.
    pub async fn create(&self, client: &Client, wallet: &Wallet) -> Result<()> {
        let db = self.db.clone();
        self.cache
            .save(&client.id().to_string(), client, || async move {
                db.insert_client(client).await?;
                db.insert_wallet(wallet).await
            })
            .await?;
        info!("registered client {} ({})", client.username(), client.id());
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Client> {
        let db = self.db.clone();
        self.cache
            .get_or_load(&id.to_string(), || async move {
                db.find_client(id)
                    .await?
                    .ok_or_else(|| StorageError::ClientNotFound(id.to_string()))
            })
            .await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Client> {
        self.db
            .find_client_by_username(username)
            .await?
            .ok_or_else(|| StorageError::ClientNotFound(username.to_string()))
    }
}

/// Wallets, cached and keyed by the owning client id (the relation is 1:1).
#[derive(Clone)]
pub struct WalletRepository {
    cache: CacheAside<Wallet>,
    db: Arc<dyn Database>,
}

impl WalletRepository {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        lock: DistributedLock,
        db: Arc<dyn Database>,
    ) -> Self {
        Self {
            cache: CacheAside::new(store, lock, WALLET_KEY_PREFIX),
            db,
        }
    }

    pub async fn get(&self, client_id: Uuid) -> Result<Wallet> {
        let db = self.db.clone();
        self.cache
            .get_or_load(&client_id.to_string(), || async move {
                db.find_wallet_by_client(client_id)
                    .await?
                    .ok_or(StorageError::WalletNotFound(client_id))
            })
            .await
    }

    /// Write-through balance update.
    pub async fn update(&self, wallet: &Wallet) -> Result<()> {
        let db = self.db.clone();
        self.cache
            .save(&wallet.client_id().to_string(), wallet, || async move {
                db.update_wallet(wallet).await
            })
            .await
    }

    /// Drop the cached wallet so the next read refetches the durable copy.
    pub async fn invalidate(&self, client_id: Uuid) -> Result<()> {
        self.cache.invalidate(&client_id.to_string()).await
    }
}

/// Player projections. Cache-resident only: the loader composes the client
/// and wallet into a fresh projection, and there is no durable table behind
/// the save path.
#[derive(Clone)]
pub struct PlayerRepository {
    cache: CacheAside<Player>,
    clients: ClientRepository,
    wallets: WalletRepository,
}

impl PlayerRepository {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        lock: DistributedLock,
        clients: ClientRepository,
        wallets: WalletRepository,
    ) -> Self {
        Self {
            cache: CacheAside::new(store, lock, PLAYER_KEY_PREFIX),
            clients,
            wallets,
        }
    }

    /// Cached projection; a miss composes client + wallet with
    /// `in_play = false`. May lag the wallet until the next end-game or
    /// wallet refresh drops it.
    pub async fn get(&self, client_id: Uuid) -> Result<Player> {
        let clients = self.clients.clone();
        let wallets = self.wallets.clone();
        self.cache
            .get_or_load(&client_id.to_string(), || async move {
                let client = clients.get(client_id).await?;
                let wallet = wallets.get(client_id).await?;
                Ok(Player::new(client.id(), wallet.balance()))
            })
            .await
    }

    /// Cache-only write under the player's lock.
    pub async fn set(&self, player: &Player) -> Result<()> {
        self.cache
            .save(&player.client_id().to_string(), player, || async { Ok(()) })
            .await
    }

    /// Reconciliation point: drop the projection so the next read rebuilds
    /// it from the settled wallet.
    pub async fn end_game(&self, client_id: Uuid) -> Result<()> {
        self.cache.invalidate(&client_id.to_string()).await
    }
}

/// Matches, cached by id with write-through updates.
#[derive(Clone)]
pub struct MatchRepository {
    cache: CacheAside<Match>,
    db: Arc<dyn Database>,
}

impl MatchRepository {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        lock: DistributedLock,
        db: Arc<dyn Database>,
    ) -> Self {
        Self {
            cache: CacheAside::new(store, lock, MATCH_KEY_PREFIX),
            db,
        }
    }

    pub async fn create(&self, game: &Match) -> Result<()> {
        let db = self.db.clone();
        self.cache
            .save(&game.id().to_string(), game, || async move {
                db.insert_match(game).await
            })
            .await?;
        info!("created match {}", game.id());
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Match> {
        let db = self.db.clone();
        self.cache
            .get_or_load(&id.to_string(), || async move {
                db.find_match(id).await?.ok_or(StorageError::MatchNotFound(id))
            })
            .await
    }

    pub async fn update(&self, game: &Match) -> Result<()> {
        let db = self.db.clone();
        self.cache
            .save(&game.id().to_string(), game, || async move {
                db.update_match(game).await
            })
            .await
    }

    pub async fn invalidate(&self, id: Uuid) -> Result<()> {
        self.cache.invalidate(&id.to_string()).await
    }
}
