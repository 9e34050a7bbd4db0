//! HTTP surface and routes using axum.
//!
//! Routes:
//! - POST /client - register (unauthenticated)
//! - POST /login - issue a session token (unauthenticated)
//! - POST /logout - revoke the presented session
//! - GET /wallet - authoritative balance (drops the cached wallet first)
//! - GET /ws - WebSocket upgrade
//! - GET /health - liveness check
//!
//! Authenticated routes accept the token via `Authorization: Bearer` or the
//! `?token=` query parameter.

use crate::error::GatewayError;
use crate::ws::{ws_handler, AppState};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use storage::StorageError;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;
use uuid::Uuid;

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/client", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/wallet", get(wallet_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    id: Uuid,
    username: String,
}

/// Register a new client.
/// POST /client
async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state.services.clients.register(&req.username, &req.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: client.id(),
            username: client.username().to_string(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
}

/// Issue a session token bound to the caller's origin.
/// POST /login
async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = state
        .services
        .auth
        .login(
            &req.username,
            &req.password,
            &client_ip(&headers),
            &user_agent(&headers),
        )
        .await?;
    Ok(Json(LoginResponse { token }))
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

/// Revoke the presented session and refresh the client's wallet caches.
/// POST /logout
async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let (client_id, token) = authenticate(&state, &headers, &params).await?;
    state.services.auth.logout(client_id, &token).await?;
    Ok(Json(StatusResponse { status: "ok" }))
}

#[derive(Serialize)]
struct WalletResponse {
    client_id: Uuid,
    balance: f64,
}

/// Authoritative balance, reloaded from the durable store.
/// GET /wallet
async fn wallet_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let (client_id, _) = authenticate(&state, &headers, &params).await?;
    let balance = state.services.clients.balance(client_id).await?;
    Ok(Json(WalletResponse { client_id, balance }))
}

/// Liveness check.
/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(StatusResponse { status: "ok" })
}

// ============================================================================
// Request context helpers
// ============================================================================

/// Validate the presented token against the session store and the caller's
/// origin, returning the client id and the token itself.
async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Result<(Uuid, String), GatewayError> {
    let token = extract_token(headers, params).ok_or(GatewayError::Unauthorized)?;
    let client_id = state
        .sessions
        .validate(&token, &client_ip(headers), &user_agent(headers))
        .await?;
    Ok((client_id, token))
}

/// Token from `Authorization: Bearer <token>` or `?token=`.
pub(crate) fn extract_token(
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Option<String> {
    if let Some(raw) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        if let Some(token) = raw.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    params.get("token").cloned()
}

/// Client IP for session binding: first `X-Forwarded-For` hop, else
/// `X-Real-IP`, else `"unknown"`. The socket peer address is deliberately
/// not used; its ephemeral port would vary per connection and poison the
/// binding.
pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
    {
        return real_ip.trim().to_string();
    }
    "unknown".to_string()
}

pub(crate) fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

// ============================================================================
// Error Handling
// ============================================================================

/// HTTP-boundary wrapper applying the error taxonomy to status codes.
struct ApiError(GatewayError);

impl<E: Into<GatewayError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            GatewayError::Domain(_)
            | GatewayError::Json(_)
            | GatewayError::InvalidAction(_)
            | GatewayError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidCredentials
            | GatewayError::Unauthorized
            | GatewayError::Session(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Storage(
                StorageError::ClientNotFound(_)
                | StorageError::WalletNotFound(_)
                | StorageError::MatchNotFound(_),
            ) => StatusCode::NOT_FOUND,
            GatewayError::Storage(StorageError::UsernameTaken(_)) => StatusCode::CONFLICT,
            GatewayError::Storage(StorageError::LockNotAcquired(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Storage(_) | GatewayError::Timeout | GatewayError::ChannelSend => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if self.0.is_internal() {
            error!("request failed: {}", self.0);
        }
        let body = Json(ErrorResponse {
            error: self.0.client_message(),
        });
        (status, body).into_response()
    }
}
