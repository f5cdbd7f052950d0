//! End-to-end webhook ingress tests against a real listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use telegram_receiver::config::{ReceiverConfig, ReceiverMode, SecretToken};
use telegram_receiver::types::Update;
use telegram_receiver::webhook::{WebhookHandler, SECRET_TOKEN_HEADER};
use tokio::sync::mpsc;

const UPDATE_JSON: &str = r#"{"update_id":1,"message":{"message_id":1,"chat":{"id":10,"type":"private"},"from":{"id":5,"first_name":"A"},"date":0,"text":"hi"}}"#;

fn base_config() -> ReceiverConfig {
    ReceiverConfig {
        bot_token: SecretToken::new("123456:ABCdef"),
        mode: ReceiverMode::Webhook,
        ..ReceiverConfig::default()
    }
}

/// Serve `handler` on an ephemeral port and return its address.
async fn spawn_handler(handler: Arc<WebhookHandler>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let app = handler.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve webhook");
    });
    addr
}

fn new_handler(config: &ReceiverConfig, capacity: usize) -> (Arc<WebhookHandler>, mpsc::Receiver<Update>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Arc::new(WebhookHandler::new(config, tx)), rx)
}

async fn post(addr: SocketAddr, secret: Option<&str>, body: &str) -> reqwest::Response {
    let mut request = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .body(body.to_string());
    if let Some(secret) = secret {
        request = request.header(SECRET_TOKEN_HEADER, secret);
    }
    request.send().await.expect("request completes")
}

#[tokio::test]
async fn valid_post_returns_200_and_delivers_update() {
    let mut config = base_config();
    config.webhook.secret = Some("s3cret".to_string());
    let (handler, mut rx) = new_handler(&config, 8);
    let addr = spawn_handler(handler).await;

    let response = post(addr, Some("s3cret"), UPDATE_JSON).await;
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.bytes().await.expect("body").is_empty());

    let update = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("update arrives promptly")
        .expect("channel open");
    assert_eq!(update.update_id, 1);
    let message = update.message.expect("message populated");
    assert_eq!(message.text.as_deref(), Some("hi"));
}

#[tokio::test]
async fn wrong_secret_is_unauthorized() {
    let mut config = base_config();
    config.webhook.secret = Some("s3cret".to_string());
    let (handler, mut rx) = new_handler(&config, 8);
    let addr = spawn_handler(handler).await;

    let response = post(addr, Some("wrong"), UPDATE_JSON).await;
    assert_eq!(response.status().as_u16(), 401);
    assert!(rx.try_recv().is_err(), "rejected update must not reach sink");
}

#[tokio::test]
async fn missing_secret_header_is_unauthorized() {
    let mut config = base_config();
    config.webhook.secret = Some("s3cret".to_string());
    let (handler, _rx) = new_handler(&config, 8);
    let addr = spawn_handler(handler).await;

    let response = post(addr, None, UPDATE_JSON).await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn non_post_method_is_rejected() {
    let mut config = base_config();
    config.webhook.secret = Some("s3cret".to_string());
    let (handler, _rx) = new_handler(&config, 8);
    let addr = spawn_handler(handler).await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/"))
        .header(SECRET_TOKEN_HEADER, "s3cret")
        .send()
        .await
        .expect("request completes");
    assert_eq!(response.status().as_u16(), 405);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let config = base_config();
    let (handler, _rx) = new_handler(&config, 8);
    let addr = spawn_handler(handler).await;

    let response = post(addr, None, "{not json").await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn host_mismatch_is_forbidden() {
    let mut config = base_config();
    config.webhook.allowed_host = Some("bot.example.com".to_string());
    let (handler, _rx) = new_handler(&config, 8);
    let addr = spawn_handler(handler).await;

    // reqwest derives the Host header from the URL, which is 127.0.0.1 here.
    let response = post(addr, None, UPDATE_JSON).await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn matching_host_is_accepted() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let mut config = base_config();
    config.webhook.allowed_host = Some(addr.to_string());
    let (tx, mut rx) = mpsc::channel(8);
    let handler = Arc::new(WebhookHandler::new(&config, tx));
    let app = handler.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve webhook");
    });

    let response = post(addr, None, UPDATE_JSON).await;
    assert_eq!(response.status().as_u16(), 200);
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn burst_is_admitted_then_rate_limited() {
    let mut config = base_config();
    config.rate_limit.requests_per_second = 0.000_001;
    config.rate_limit.burst = 3;
    let (handler, _rx) = new_handler(&config, 16);
    let addr = spawn_handler(handler).await;

    for i in 0..3 {
        let response = post(addr, None, UPDATE_JSON).await;
        assert_eq!(response.status().as_u16(), 200, "request {i} within burst");
    }
    let response = post(addr, None, UPDATE_JSON).await;
    assert_eq!(response.status().as_u16(), 429, "request past burst is shed");
}

#[tokio::test]
async fn full_sink_yields_channel_blocked() {
    let config = base_config();
    // Capacity 1 and no consumer draining.
    let (handler, _rx) = new_handler(&config, 1);
    let addr = spawn_handler(handler).await;

    let first = post(addr, None, UPDATE_JSON).await;
    assert_eq!(first.status().as_u16(), 200);
    let second = post(addr, None, UPDATE_JSON).await;
    assert_eq!(
        second.status().as_u16(),
        503,
        "full sink must not block the response"
    );
}

#[tokio::test]
async fn oversize_body_is_payload_too_large() {
    let mut config = base_config();
    config.webhook.max_body_bytes = 32;
    let (handler, _rx) = new_handler(&config, 8);
    let addr = spawn_handler(handler).await;

    let big = "x".repeat(64);
    let response = post(addr, None, &big).await;
    assert_eq!(response.status().as_u16(), 413);
}

#[tokio::test]
async fn breaker_opens_after_repeated_failures() {
    let config = base_config();
    let (handler, _rx) = new_handler(&config, 8);
    let addr = spawn_handler(handler).await;

    // Three malformed payloads: 3 guarded requests, 100% failing, trips the
    // breaker (>= 3 requests, >= 60% failure ratio).
    for _ in 0..3 {
        let response = post(addr, None, "{not json").await;
        assert_eq!(response.status().as_u16(), 400);
    }

    // With the breaker open even a valid request fast-fails without I/O.
    let response = post(addr, None, UPDATE_JSON).await;
    assert_eq!(response.status().as_u16(), 500);
}

#[tokio::test]
async fn health_probes_answer_ok() {
    let config = base_config();
    let (tx, _rx) = mpsc::channel(8);
    let handler = Arc::new(WebhookHandler::new(&config, tx));
    let state = Arc::new(telegram_receiver::server::ServerState::default());
    let app = telegram_receiver::server::router(&handler, &state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve webhook");
    });

    for probe in ["healthz", "readyz"] {
        let response = reqwest::get(format!("http://{addr}/{probe}"))
            .await
            .expect("probe completes");
        assert_eq!(response.status().as_u16(), 200, "{probe} must be live");
    }
}
