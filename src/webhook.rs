//! Webhook ingress: validation, admission control, circuit breaking,
//! decode, and non-blocking forward onto the update channel.
//!
//! Per request, in order: token-bucket admission (before anything else, and
//! bypassing the breaker), then the breaker-guarded unit of work: host
//! check, constant-time secret check, method check, bounded body read into a
//! pooled buffer, JSON decode, and a non-blocking send to the consumer
//! channel. Each failure kind maps to its own HTTP status; the platform
//! redelivers on any non-2xx, so nothing is retried here.

use std::mem;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::breaker::CircuitBreaker;
use crate::config::ReceiverConfig;
use crate::error::WebhookError;
use crate::limiter::RateLimiter;
use crate::types::Update;

/// Header Telegram uses to echo the configured secret token.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Webhook request handler.
///
/// Holds the per-handler session state: rate-limiter bucket, breaker,
/// and a reusable buffer pool sized to the configured body ceiling. All of
/// it is internally synchronized; one handler serves every concurrent
/// request for the process lifetime.
pub struct WebhookHandler {
    secret: Option<String>,
    allowed_host: Option<String>,
    max_body_bytes: usize,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    buffers: BufferPool,
    updates: mpsc::Sender<Update>,
}

impl WebhookHandler {
    /// Build a handler from configuration. Every tunable is injected; no
    /// process-wide state is involved, so tests can run many independent
    /// handlers.
    pub fn new(config: &ReceiverConfig, updates: mpsc::Sender<Update>) -> Self {
        Self {
            secret: config.webhook.secret.clone(),
            allowed_host: config.webhook.allowed_host.clone(),
            max_body_bytes: config.webhook.max_body_bytes,
            limiter: RateLimiter::new(
                config.rate_limit.requests_per_second,
                config.rate_limit.burst,
            ),
            breaker: CircuitBreaker::new(
                "webhook",
                config.breaker.half_open_max_requests,
                config.breaker.interval(),
                config.breaker.cooldown(),
            ),
            buffers: BufferPool::new(config.webhook.max_body_bytes),
            updates,
        }
    }

    /// Router serving the update endpoint at `/`.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/", any(receive_update))
            .with_state(Arc::clone(self))
    }

    /// Process one inbound request.
    async fn process(&self, request: Request) -> Result<(), WebhookError> {
        // Admission first: cheapest check, sheds load fastest, and rejected
        // requests must not count against the breaker.
        if !self.limiter.try_acquire() {
            return Err(WebhookError::RateLimited);
        }

        if !self.breaker.try_call() {
            return Err(WebhookError::BreakerOpen);
        }

        match self.guarded(request).await {
            Ok(()) => {
                self.breaker.record_success();
                Ok(())
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(err)
            }
        }
    }

    /// The breaker-guarded unit of work: validate, read, decode, forward.
    async fn guarded(&self, request: Request) -> Result<(), WebhookError> {
        if let Some(allowed) = &self.allowed_host {
            let host = request
                .headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if host != allowed {
                return Err(WebhookError::HostMismatch);
            }
        }

        if let Some(secret) = &self.secret {
            let presented = request
                .headers()
                .get(SECRET_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if !constant_time_eq(presented.as_bytes(), secret.as_bytes()) {
                return Err(WebhookError::SecretMismatch);
            }
        }

        if request.method() != Method::POST {
            return Err(WebhookError::MethodNotAllowed);
        }

        // The pooled buffer returns to the pool when the guard drops, on
        // every exit path below.
        let mut buffer = self.buffers.acquire();
        read_body(request.into_body(), buffer.bytes_mut(), self.max_body_bytes).await?;

        let update: Update = serde_json::from_slice(buffer.bytes())?;
        let update_id = update.update_id;

        match self.updates.try_send(update) {
            Ok(()) => {
                info!(update_id, "update forwarded");
                Ok(())
            }
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                Err(WebhookError::ChannelBlocked)
            }
        }
    }
}

/// Axum entry point for the update endpoint.
async fn receive_update(
    State(handler): State<Arc<WebhookHandler>>,
    request: Request,
) -> Response {
    match handler.process(request).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            warn!(error = %err, status = err.status().as_u16(), "webhook request rejected");
            (err.status(), err.to_string()).into_response()
        }
    }
}

/// Read the body stream into `buf`, enforcing a hard byte ceiling.
async fn read_body(body: Body, buf: &mut Vec<u8>, max: usize) -> Result<(), WebhookError> {
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| WebhookError::BodyRead(e.to_string()))?;
        if buf.len().saturating_add(chunk.len()) > max {
            return Err(WebhookError::BodyTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(())
}

/// Compare two byte strings without early exit on mismatch.
///
/// Length is checked first; only the content comparison needs to resist
/// timing analysis.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

// ── Buffer pool ─────────────────────────────────────────────────

/// Pool of reusable body buffers sized to the configured body ceiling.
struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    buffer_capacity: usize,
}

impl BufferPool {
    fn new(buffer_capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            buffer_capacity,
        }
    }

    /// Take a cleared buffer from the pool, or allocate one. The returned
    /// guard puts it back on drop.
    fn acquire(&self) -> PooledBuffer<'_> {
        let buffer = self
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_capacity));
        PooledBuffer { pool: self, buffer }
    }

    fn release(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buffer);
    }
}

/// Scoped buffer lease; returns the buffer to its pool on drop.
struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buffer: Vec<u8>,
}

impl PooledBuffer<'_> {
    fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(mem::take(&mut self.buffer));
    }
}
