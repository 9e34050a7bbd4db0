//! Action dispatch for the realtime protocol.
//!
//! One closed match over [`Action`] maps every recognized action to its
//! request type and service call; the compiler enforces that each action has
//! exactly one handler. Every dispatched call runs under the per-request
//! timeout so a stalled downstream (lock contention, slow store) cannot
//! block the connection's read loop; the timeout becomes an error reply,
//! never a connection drop.

use crate::error::{GatewayError, Result};
use crate::protocol::{
    Action, CreateMatchRequest, Envelope, MatchIdRequest, MatchView, PlaceBetRequest, Reply,
};
use crate::service::Services;
use metrics::counter;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

/// Dispatches decoded envelopes to service calls.
#[derive(Clone)]
pub struct Dispatcher {
    services: Arc<Services>,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(services: Arc<Services>, request_timeout: Duration) -> Self {
        Self {
            services,
            request_timeout,
        }
    }

    /// Turn one inbound text frame into exactly one reply frame.
    pub async fn dispatch(&self, client_id: Uuid, raw: &str) -> Reply {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                counter!("gateway_requests_total", "action" => "malformed").increment(1);
                return Reply::failure(format!("malformed envelope: {}", err));
            }
        };
        let Some(action) = Action::parse(&envelope.action) else {
            counter!("gateway_requests_total", "action" => "unknown").increment(1);
            return Reply::failure(format!("invalid action: {}", envelope.action));
        };
        counter!("gateway_requests_total", "action" => action.request_name()).increment(1);
        debug!("client {} requested {}", client_id, action.request_name());

        match tokio::time::timeout(
            self.request_timeout,
            self.run(action, client_id, envelope.data),
        )
        .await
        {
            Ok(Ok(view)) => Reply::ok(action.reply_name(), view),
            Ok(Err(err)) => {
                if err.is_internal() {
                    error!(
                        "{} failed for client {}: {}",
                        action.request_name(),
                        client_id,
                        err
                    );
                }
                counter!("gateway_request_errors_total", "action" => action.request_name())
                    .increment(1);
                Reply::failure(err.client_message())
            }
            Err(_) => {
                counter!("gateway_request_timeouts_total", "action" => action.request_name())
                    .increment(1);
                Reply::failure(GatewayError::Timeout.client_message())
            }
        }
    }

    async fn run(
        &self,
        action: Action,
        client_id: Uuid,
        data: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let matches = &self.services.matches;
        let game = match action {
            Action::CreateMatch => {
                let req: CreateMatchRequest = decode(data)?;
                matches
                    .create(client_id, req.min_players, req.max_players, req.game_mode)
                    .await?
            }
            Action::JoinMatch => {
                let req: MatchIdRequest = decode(data)?;
                matches.join(req.match_id, client_id).await?
            }
            Action::LeaveMatch => {
                let req: MatchIdRequest = decode(data)?;
                matches.leave(req.match_id, client_id).await?
            }
            Action::PlaceBet => {
                let req: PlaceBetRequest = decode(data)?;
                matches
                    .place_bet(req.match_id, client_id, req.amount, req.parity)
                    .await?
            }
            Action::GetMatch => {
                let req: MatchIdRequest = decode(data)?;
                matches.get(req.match_id).await?
            }
            Action::StartMatch => {
                let req: MatchIdRequest = decode(data)?;
                matches.start(req.match_id).await?
            }
            Action::EndMatch => {
                let req: MatchIdRequest = decode(data)?;
                matches.end(req.match_id).await?
            }
        };
        Ok(serde_json::to_value(MatchView::from(&game))?)
    }
}

fn decode<T: DeserializeOwned>(data: serde_json::Value) -> Result<T> {
    serde_json::from_value(data).map_err(|err| GatewayError::InvalidPayload(err.to_string()))
}
