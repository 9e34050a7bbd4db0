//! Application services.
//!
//! Services orchestrate the repositories and the session manager; they are
//! the only callers of domain transitions and the only place wallet
//! settlement happens. Everything below them is the lock-guarded cache-aside
//! layer, so two requests touching the same match or wallet are serialized
//! per key.

use crate::error::{GatewayError, Result};
use domain::{Client, GameMode, Match, Parity, Wallet, COMPUTER_PLAYER};
use session::SessionManager;
use std::sync::Arc;
use storage::{
    ClientRepository, Database, DistributedLock, KeyValueStore, LockConfig, MatchRepository,
    PlayerRepository, StorageError, WalletRepository,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Registration, balance queries, and wallet reconciliation.
#[derive(Clone)]
pub struct ClientService {
    clients: ClientRepository,
    wallets: WalletRepository,
    players: PlayerRepository,
    starting_balance: f64,
}

impl ClientService {
    pub fn new(
        clients: ClientRepository,
        wallets: WalletRepository,
        players: PlayerRepository,
        starting_balance: f64,
    ) -> Self {
        Self {
            clients,
            wallets,
            players,
            starting_balance,
        }
    }

    /// Register a client; their wallet opens with the starting balance.
    pub async fn register(&self, username: &str, password: &str) -> Result<Client> {
        let client = Client::new(username, password)?;
        let wallet = Wallet::new(client.id(), self.starting_balance);
        self.clients.create(&client, &wallet).await?;
        Ok(client)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Client> {
        Ok(self.clients.get_by_username(username).await?)
    }

    /// Authoritative balance: drops the cached wallet first so the durable
    /// store answers.
    pub async fn balance(&self, client_id: Uuid) -> Result<f64> {
        self.refresh_wallet(client_id).await?;
        let wallet = self.wallets.get(client_id).await?;
        Ok(wallet.balance())
    }

    /// Reconciliation point: drop the cached wallet and the player
    /// projection so the next reads rebuild from the durable store.
    pub async fn refresh_wallet(&self, client_id: Uuid) -> Result<()> {
        self.wallets.invalidate(client_id).await?;
        self.players.end_game(client_id).await?;
        info!("wallet caches refreshed for client {}", client_id);
        Ok(())
    }
}

/// Login and logout against the session manager.
#[derive(Clone)]
pub struct AuthService {
    clients: ClientService,
    sessions: SessionManager,
}

impl AuthService {
    pub fn new(clients: ClientService, sessions: SessionManager) -> Self {
        Self { clients, sessions }
    }

    /// Verify credentials and mint a session token bound to the caller's
    /// origin. Unknown usernames and wrong passwords are indistinguishable
    /// to the caller.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip: &str,
        user_agent: &str,
    ) -> Result<String> {
        let client = match self.clients.get_by_username(username).await {
            Ok(client) => client,
            Err(GatewayError::Storage(StorageError::ClientNotFound(_))) => {
                return Err(GatewayError::InvalidCredentials);
            }
            Err(err) => return Err(err),
        };
        if !client.verify_password(password)? {
            return Err(GatewayError::InvalidCredentials);
        }
        let token = self.sessions.create(client.id(), ip, user_agent).await?;
        info!("client {} logged in", client.id());
        Ok(token)
    }

    /// Revoke the presented session and refresh the client's wallet caches.
    pub async fn logout(&self, client_id: Uuid, token: &str) -> Result<()> {
        self.clients.refresh_wallet(client_id).await?;
        self.sessions.delete(client_id, token).await?;
        info!("client {} logged out", client_id);
        Ok(())
    }
}

/// Match lifecycle orchestration and bet settlement.
#[derive(Clone)]
pub struct MatchService {
    matches: MatchRepository,
    wallets: WalletRepository,
    players: PlayerRepository,
}

impl MatchService {
    pub fn new(
        matches: MatchRepository,
        wallets: WalletRepository,
        players: PlayerRepository,
    ) -> Self {
        Self {
            matches,
            wallets,
            players,
        }
    }

    /// Create a match with the creator as its host. The player projection
    /// gates creation: a client already in play cannot open another match.
    pub async fn create(
        &self,
        client_id: Uuid,
        min_players: usize,
        max_players: usize,
        game_mode: GameMode,
    ) -> Result<Match> {
        let mut player = self.players.get(client_id).await?;
        if player.in_play() {
            return Err(domain::DomainError::PlayerAlreadyInMatch.into());
        }

        let mut game = Match::new(client_id, min_players, max_players, game_mode);
        game.add_player(client_id)?;
        self.matches.create(&game).await?;

        player.play_on();
        self.players.set(&player).await?;
        Ok(game)
    }

    pub async fn get(&self, match_id: Uuid) -> Result<Match> {
        Ok(self.matches.get(match_id).await?)
    }

    pub async fn join(&self, match_id: Uuid, client_id: Uuid) -> Result<Match> {
        let mut game = self.matches.get(match_id).await?;
        game.add_player(client_id)?;
        self.matches.update(&game).await?;

        let mut player = self.players.get(client_id).await?;
        player.play_on();
        self.players.set(&player).await?;
        Ok(game)
    }

    pub async fn leave(&self, match_id: Uuid, client_id: Uuid) -> Result<Match> {
        let mut game = self.matches.get(match_id).await?;
        game.remove_player(client_id)?;
        self.matches.update(&game).await?;

        // Drop the projection rather than rewriting it; the next read
        // rebuilds with in_play = false.
        self.players.end_game(client_id).await?;
        Ok(game)
    }

    /// Record a bet. The balance check happens here, against the cached
    /// wallet; the wallet itself never bound-checks.
    pub async fn place_bet(
        &self,
        match_id: Uuid,
        client_id: Uuid,
        amount: f64,
        parity: Parity,
    ) -> Result<Match> {
        let wallet = self.wallets.get(client_id).await?;
        if !wallet.has_enough_balance(amount) {
            return Err(domain::DomainError::InsufficientBalance.into());
        }

        let mut game = self.matches.get(match_id).await?;
        game.place_bet(&client_id.to_string(), amount, parity);
        self.matches.update(&game).await?;
        Ok(game)
    }

    pub async fn start(&self, match_id: Uuid) -> Result<Match> {
        let mut game = self.matches.get(match_id).await?;
        game.play()?;
        self.matches.update(&game).await?;
        info!("match {} started", match_id);
        Ok(game)
    }

    /// End the match, settling bets exactly once.
    ///
    /// If no result has been drawn yet, draw it, credit winners, debit
    /// non-winners, and drop each member's player projection (the end-match
    /// reconciliation point). A repeated end on an already-resolved match
    /// moves no money. The status transition to `Ended` is skipped when the
    /// match already sits in a terminal state, so a computer-mode `Finished`
    /// is preserved.
    pub async fn end(&self, match_id: Uuid) -> Result<Match> {
        let mut game = self.matches.get(match_id).await?;

        if game.result().is_none() {
            let result = game.resolve();
            let winners = game.winners();
            info!(
                "match {} resolved {} ({} winners)",
                match_id,
                result,
                winners.len()
            );
            for (bettor, amount) in game.bets().clone() {
                // The synthesized opponent has no wallet to settle.
                if bettor == COMPUTER_PLAYER {
                    continue;
                }
                let Ok(player_id) = Uuid::parse_str(&bettor) else {
                    warn!("match {} carries a malformed bettor key {:?}", match_id, bettor);
                    continue;
                };
                let mut wallet = self.wallets.get(player_id).await?;
                if winners.contains_key(&bettor) {
                    wallet.credit(amount);
                } else {
                    // Losses are owed even if the balance dips negative
                    // between the bet-time check and settlement.
                    wallet.debit(amount);
                }
                self.wallets.update(&wallet).await?;
            }
            for member in game.players().to_vec() {
                self.players.end_game(member.player_id).await?;
            }
        }

        if !game.status().is_terminal() {
            game.end();
        }
        self.matches.update(&game).await?;
        Ok(game)
    }
}

/// The service bundle handed to the gateway.
pub struct Services {
    pub auth: AuthService,
    pub clients: ClientService,
    pub matches: MatchService,
}

impl Services {
    /// Wire services over the given stores. Every repository shares one
    /// lock instance so lock keys live in one namespace.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        db: Arc<dyn Database>,
        sessions: SessionManager,
        lock_config: LockConfig,
        starting_balance: f64,
    ) -> Self {
        let lock = DistributedLock::new(store.clone(), lock_config);
        let clients = ClientRepository::new(store.clone(), lock.clone(), db.clone());
        let wallets = WalletRepository::new(store.clone(), lock.clone(), db.clone());
        let players =
            PlayerRepository::new(store.clone(), lock.clone(), clients.clone(), wallets.clone());
        let matches = MatchRepository::new(store, lock, db);

        let client_service =
            ClientService::new(clients, wallets.clone(), players.clone(), starting_balance);
        Self {
            auth: AuthService::new(client_service.clone(), sessions),
            clients: client_service,
            matches: MatchService::new(matches, wallets, players),
        }
    }
}
