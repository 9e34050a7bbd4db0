//! Durable store behind the cache.
//!
//! Expected tables (migrations are managed outside this repo):
//!
//! ```text
//! clients  (id uuid primary key,
//!           username text unique not null,
//!           password_hash text not null)
//! wallets  (id uuid primary key,
//!           client_id uuid unique not null references clients (id),
//!           balance double precision not null)
//! matches  (id uuid primary key,
//!           creator_id uuid not null,
//!           min_players int not null,
//!           max_players int not null,
//!           game_mode text not null,
//!           status text not null,
//!           players jsonb not null,
//!           choices jsonb not null,
//!           bets jsonb not null,
//!           result text,
//!           current_turn text,
//!           created_at timestamptz not null)
//! ```

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use domain::{Client, GameMode, Match, MatchPlayer, MatchStatus, Parity, Wallet};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Async durable-store operations. The cache layer treats this as the
/// authoritative source; everything here is cache-oblivious.
#[async_trait]
pub trait Database: Send + Sync {
    /// Insert a client; fails with [`StorageError::UsernameTaken`] if the
    /// username is already registered.
    async fn insert_client(&self, client: &Client) -> Result<()>;
    async fn find_client(&self, id: Uuid) -> Result<Option<Client>>;
    async fn find_client_by_username(&self, username: &str) -> Result<Option<Client>>;

    async fn insert_wallet(&self, wallet: &Wallet) -> Result<()>;
    async fn find_wallet_by_client(&self, client_id: Uuid) -> Result<Option<Wallet>>;
    async fn update_wallet(&self, wallet: &Wallet) -> Result<()>;

    async fn insert_match(&self, game: &Match) -> Result<()>;
    async fn find_match(&self, id: Uuid) -> Result<Option<Match>>;
    async fn update_match(&self, game: &Match) -> Result<()>;
}

/// Postgres-backed durable store.
#[derive(Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_client(row: &PgRow) -> Result<Client> {
    Ok(Client::load(
        row.try_get("id")?,
        row.try_get("username")?,
        row.try_get("password_hash")?,
    ))
}

fn row_to_wallet(row: &PgRow) -> Result<Wallet> {
    Ok(Wallet::load(
        row.try_get("id")?,
        row.try_get("client_id")?,
        row.try_get("balance")?,
    ))
}

fn row_to_match(row: &PgRow) -> Result<Match> {
    let game_mode: String = row.try_get("game_mode")?;
    let status: String = row.try_get("status")?;
    let result: Option<String> = row.try_get("result")?;
    let players: serde_json::Value = row.try_get("players")?;
    let choices: serde_json::Value = row.try_get("choices")?;
    let bets: serde_json::Value = row.try_get("bets")?;

    let players: Vec<MatchPlayer> = serde_json::from_value(players)?;
    let choices: HashMap<String, Parity> = serde_json::from_value(choices)?;
    let bets: HashMap<String, f64> = serde_json::from_value(bets)?;
    let result: Option<Parity> = result.map(|r| r.parse()).transpose()?;

    let min_players: i32 = row.try_get("min_players")?;
    let max_players: i32 = row.try_get("max_players")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Match::load(
        row.try_get("id")?,
        row.try_get("creator_id")?,
        min_players as usize,
        max_players as usize,
        game_mode.parse::<GameMode>()?,
        status.parse::<MatchStatus>()?,
        players,
        choices,
        bets,
        result,
        row.try_get("current_turn")?,
        created_at,
    ))
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn insert_client(&self, client: &Client) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO clients (id, username, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (username) DO NOTHING
            "#,
        )
        .bind(client.id())
        .bind(client.username())
        .bind(client.password_hash())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::UsernameTaken(client.username().to_string()));
        }
        Ok(())
    }

    async fn find_client(&self, id: Uuid) -> Result<Option<Client>> {
        let row = sqlx::query("SELECT id, username, password_hash FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_client).transpose()
    }

    async fn find_client_by_username(&self, username: &str) -> Result<Option<Client>> {
        let row =
            sqlx::query("SELECT id, username, password_hash FROM clients WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        row.as_ref().map(row_to_client).transpose()
    }

    async fn insert_wallet(&self, wallet: &Wallet) -> Result<()> {
        sqlx::query("INSERT INTO wallets (id, client_id, balance) VALUES ($1, $2, $3)")
            .bind(wallet.id())
            .bind(wallet.client_id())
            .bind(wallet.balance())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_wallet_by_client(&self, client_id: Uuid) -> Result<Option<Wallet>> {
        let row = sqlx::query("SELECT id, client_id, balance FROM wallets WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_wallet).transpose()
    }

    async fn update_wallet(&self, wallet: &Wallet) -> Result<()> {
        sqlx::query("UPDATE wallets SET balance = $2 WHERE id = $1")
            .bind(wallet.id())
            .bind(wallet.balance())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_match(&self, game: &Match) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO matches
                (id, creator_id, min_players, max_players, game_mode, status,
                 players, choices, bets, result, current_turn, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(game.id())
        .bind(game.creator_id())
        .bind(game.min_players() as i32)
        .bind(game.max_players() as i32)
        .bind(game.game_mode().as_str())
        .bind(game.status().as_str())
        .bind(serde_json::to_value(game.players())?)
        .bind(serde_json::to_value(game.choices())?)
        .bind(serde_json::to_value(game.bets())?)
        .bind(game.result().map(Parity::as_str))
        .bind(game.current_turn())
        .bind(game.created_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_match(&self, id: Uuid) -> Result<Option<Match>> {
        let row = sqlx::query(
            r#"
            SELECT id, creator_id, min_players, max_players, game_mode, status,
                   players, choices, bets, result, current_turn, created_at
            FROM matches WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_match).transpose()
    }

    async fn update_match(&self, game: &Match) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE matches
            SET status = $2, players = $3, choices = $4, bets = $5,
                result = $6, current_turn = $7
            WHERE id = $1
            "#,
        )
        .bind(game.id())
        .bind(game.status().as_str())
        .bind(serde_json::to_value(game.players())?)
        .bind(serde_json::to_value(game.choices())?)
        .bind(serde_json::to_value(game.bets())?)
        .bind(game.result().map(Parity::as_str))
        .bind(game.current_turn())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-memory durable store for tests and single-node development.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    clients: Arc<DashMap<Uuid, Client>>,
    wallets: Arc<DashMap<Uuid, Wallet>>,
    matches: Arc<DashMap<Uuid, Match>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn insert_client(&self, client: &Client) -> Result<()> {
        let taken = self
            .clients
            .iter()
            .any(|existing| existing.username() == client.username());
        if taken {
            return Err(StorageError::UsernameTaken(client.username().to_string()));
        }
        self.clients.insert(client.id(), client.clone());
        Ok(())
    }

    async fn find_client(&self, id: Uuid) -> Result<Option<Client>> {
        Ok(self.clients.get(&id).map(|c| c.clone()))
    }

    async fn find_client_by_username(&self, username: &str) -> Result<Option<Client>> {
        Ok(self
            .clients
            .iter()
            .find(|c| c.username() == username)
            .map(|c| c.clone()))
    }

    async fn insert_wallet(&self, wallet: &Wallet) -> Result<()> {
        // Keyed by client id: the client/wallet relation is 1:1.
        self.wallets.insert(wallet.client_id(), wallet.clone());
        Ok(())
    }

    async fn find_wallet_by_client(&self, client_id: Uuid) -> Result<Option<Wallet>> {
        Ok(self.wallets.get(&client_id).map(|w| w.clone()))
    }

    async fn update_wallet(&self, wallet: &Wallet) -> Result<()> {
        self.wallets.insert(wallet.client_id(), wallet.clone());
        Ok(())
    }

    async fn insert_match(&self, game: &Match) -> Result<()> {
        self.matches.insert(game.id(), game.clone());
        Ok(())
    }

    async fn find_match(&self, id: Uuid) -> Result<Option<Match>> {
        Ok(self.matches.get(&id).map(|m| m.clone()))
    }

    async fn update_match(&self, game: &Match) -> Result<()> {
        self.matches.insert(game.id(), game.clone());
        Ok(())
    }
}
