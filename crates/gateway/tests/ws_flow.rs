//! End-to-end flow over HTTP and a live WebSocket connection.
//!
//! Registration and login run through the router directly; the realtime
//! actions run over a real socket against a server bound to an ephemeral
//! port. Both share one `AppState`, so they see the same stores.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use futures::{SinkExt, StreamExt};
use gateway::{create_router, AppState, Config, ConnectionRegistry, Dispatcher, Services};
use serde_json::{json, Value};
use session::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use storage::{LockConfig, MemoryDatabase, MemoryStore};
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use tower::util::ServiceExt;

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn test_router() -> Router {
    let store = Arc::new(MemoryStore::new());
    let db = Arc::new(MemoryDatabase::new());
    let sessions = SessionManager::new(store.clone(), "test-secret", Duration::from_secs(3600));
    let services = Arc::new(Services::new(
        store,
        db,
        sessions.clone(),
        LockConfig::default(),
        1000.0,
    ));
    let dispatcher = Dispatcher::new(services.clone(), Duration::from_secs(5));
    create_router(Arc::new(AppState {
        registry: Arc::new(ConnectionRegistry::new()),
        services,
        sessions,
        dispatcher,
        config: Config::default(),
    }))
}

async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register_and_login(router: &Router, username: &str) -> String {
    let (status, _) = post_json(
        router,
        "/client",
        json!({"username": username, "password": "p@ssword"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post_json(
        router,
        "/login",
        json!({"username": username, "password": "p@ssword"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn serve(router: Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(addr: std::net::SocketAddr, token: &str) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/ws?token={}", addr, token))
        .await
        .unwrap();
    ws
}

async fn request(ws: &mut WsClient, action: &str, data: Value) -> Value {
    ws.send(tungstenite::Message::Text(
        json!({"action": action, "data": data}).to_string().into(),
    ))
    .await
    .unwrap();
    loop {
        match ws.next().await.unwrap().unwrap() {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).unwrap();
            }
            // The server may interleave keepalive pings.
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_realtime_computer_match_over_websocket() {
    let router = test_router();
    let token = register_and_login(&router, "alice").await;
    let addr = serve(router.clone()).await;
    let mut ws = connect(addr, &token).await;

    let reply = request(
        &mut ws,
        "create_match",
        json!({"min_players": 1, "max_players": 1, "game_mode": "computer"}),
    )
    .await;
    assert_eq!(reply["action"], "match_created");
    assert_eq!(reply["data"]["status"], "waiting");
    let match_id = reply["data"]["id"].as_str().unwrap().to_string();

    let reply = request(
        &mut ws,
        "place_bet",
        json!({"match_id": match_id, "amount": 25.0, "parity": "even"}),
    )
    .await;
    assert_eq!(reply["action"], "bet_placed");
    assert_eq!(reply["data"]["status"], "finished");
    assert_eq!(reply["data"]["choices"]["computer"], "odd");

    let reply = request(&mut ws, "end_match", json!({"match_id": match_id})).await;
    assert_eq!(reply["action"], "match_ended");
    assert_eq!(reply["data"]["status"], "finished");
    let result = reply["data"]["result"].as_str().unwrap().to_string();

    // The wallet over HTTP agrees with the drawn result.
    let req = Request::builder()
        .method("GET")
        .uri(format!("/wallet?token={}", token))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let wallet: Value = serde_json::from_slice(&bytes).unwrap();
    let expected = if result == "even" { 1025.0 } else { 975.0 };
    assert_eq!(wallet["balance"].as_f64().unwrap(), expected);

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_two_player_match_over_two_sockets() {
    let router = test_router();
    let alice_token = register_and_login(&router, "alice").await;
    let bob_token = register_and_login(&router, "bob").await;
    let addr = serve(router).await;

    let mut alice = connect(addr, &alice_token).await;
    let mut bob = connect(addr, &bob_token).await;

    let reply = request(
        &mut alice,
        "create_match",
        json!({"min_players": 2, "max_players": 2, "game_mode": "player"}),
    )
    .await;
    let match_id = reply["data"]["id"].as_str().unwrap().to_string();

    let reply = request(&mut bob, "join_match", json!({"match_id": match_id})).await;
    assert_eq!(reply["action"], "match_joined");
    assert_eq!(reply["data"]["players"].as_array().unwrap().len(), 2);

    let reply = request(
        &mut alice,
        "place_bet",
        json!({"match_id": match_id, "amount": 10.0, "parity": "even"}),
    )
    .await;
    assert_eq!(reply["action"], "bet_placed");
    let reply = request(
        &mut bob,
        "place_bet",
        json!({"match_id": match_id, "amount": 10.0, "parity": "odd"}),
    )
    .await;
    assert_eq!(reply["action"], "bet_placed");

    let reply = request(&mut alice, "start_match", json!({"match_id": match_id})).await;
    assert_eq!(reply["data"]["status"], "playing");

    let reply = request(&mut alice, "end_match", json!({"match_id": match_id})).await;
    assert_eq!(reply["data"]["status"], "ended");
    assert!(reply["data"]["result"].is_string());
}

#[tokio::test]
async fn test_unrecognized_and_malformed_frames_get_error_replies() {
    let router = test_router();
    let token = register_and_login(&router, "alice").await;
    let addr = serve(router).await;
    let mut ws = connect(addr, &token).await;

    let reply = request(&mut ws, "shout", json!({})).await;
    assert_eq!(reply["action"], "error");
    assert_eq!(reply["error"], "invalid action: shout");

    let reply = request(&mut ws, "join_match", json!({"match_id": 7})).await;
    assert_eq!(reply["action"], "error");
    assert!(reply["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid payload"));

    // The connection survives bad requests.
    let reply = request(
        &mut ws,
        "create_match",
        json!({"min_players": 1, "max_players": 2, "game_mode": "all"}),
    )
    .await;
    assert_eq!(reply["action"], "match_created");
}

#[tokio::test]
async fn test_upgrade_rejected_without_valid_session() {
    let router = test_router();
    let token = register_and_login(&router, "alice").await;
    let addr = serve(router).await;

    let err = connect_async(format!("ws://{}/ws?token=garbage", addr))
        .await
        .unwrap_err();
    match err {
        tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        other => panic!("expected http rejection, got {:?}", other),
    }

    let err = connect_async(format!("ws://{}/ws", addr)).await.unwrap_err();
    assert!(matches!(err, tungstenite::Error::Http(_)));

    // A real token still upgrades.
    let mut ws = connect(addr, &token).await;
    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_session_is_bound_to_origin_ip() {
    let router = test_router();
    let (status, _) = post_json(
        &router,
        "/client",
        json!({"username": "alice", "password": "p@ssword"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Login as seen from behind a proxy hop.
    let req = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "1.2.3.4")
        .body(Body::from(
            json!({"username": "alice", "password": "p@ssword"}).to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let token = body["token"].as_str().unwrap();

    // The upgrade comes from a different origin, so the session is refused.
    let addr = serve(router).await;
    let err = connect_async(format!("ws://{}/ws?token={}", addr, token))
        .await
        .unwrap_err();
    assert!(matches!(err, tungstenite::Error::Http(_)));
}
