//! Realtime gateway for the parity-betting game.
//!
//! The deployable binary of the workspace. It owns:
//! - the HTTP surface (register, login, logout, wallet, health)
//! - the WebSocket endpoint: one read loop per connection, a writer task
//!   draining a bounded channel, keepalive pings with a pong deadline
//! - the action dispatch table (closed enum, one handler per action)
//! - the application services orchestrating repositories and the session
//!   manager
//!
//! ## Architecture
//!
//! ```text
//! WebSocket frame {action, data}
//!         ↓
//! Dispatcher (per-request timeout)
//!         ↓
//! AuthService / ClientService / MatchService
//!         ↓
//! repositories (lock-guarded cache-aside)
//!         ↓
//! Redis cache + Postgres durable store
//! ```

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod ws;

pub use api::create_router;
pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{GatewayError, Result};
pub use protocol::{Action, Envelope, MatchView, Reply};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use service::{AuthService, ClientService, MatchService, Services};
pub use ws::AppState;
