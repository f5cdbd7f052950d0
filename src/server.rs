//! Webhook server wiring.
//!
//! Registers the webhook with Telegram when a public URL is configured,
//! serves the update endpoint plus the `/healthz` and `/readyz` probes, and
//! shuts down Kubernetes-style: probes flip to 503 first, a drain delay lets
//! the load balancer stop routing, then open connections are drained.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::BotApi;
use crate::config::ReceiverConfig;
use crate::error::ReceiverError;
use crate::webhook::WebhookHandler;

/// Shutdown visibility for the health probes.
#[derive(Debug, Default)]
pub struct ServerState {
    shutting_down: AtomicBool,
}

impl ServerState {
    /// True once shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

/// Build the full webhook router: update endpoint plus liveness and
/// readiness probes that answer 503 while shutting down.
pub fn router(handler: &Arc<WebhookHandler>, state: &Arc<ServerState>) -> Router {
    let probe = |state: Arc<ServerState>| {
        get(move || {
            let state = Arc::clone(&state);
            async move {
                if state.is_shutting_down() {
                    (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
                } else {
                    (StatusCode::OK, "ok")
                }
            }
        })
    };

    handler
        .router()
        .route("/healthz", probe(Arc::clone(state)))
        .route("/readyz", probe(Arc::clone(state)))
}

/// Run the webhook server until `shutdown` resolves.
///
/// If a public URL is configured, the webhook is registered with Telegram
/// first; a registration failure aborts before binding the listener.
///
/// # Errors
///
/// [`ReceiverError::SetWebhook`] if registration fails,
/// [`ReceiverError::Server`] if binding or serving fails.
pub async fn run_webhook_server(
    config: &ReceiverConfig,
    handler: Arc<WebhookHandler>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ReceiverError> {
    if let Some(url) = &config.webhook.public_url {
        if !config.bot_token.is_empty() {
            info!(url, "registering webhook with telegram");
            let api = BotApi::new(reqwest::Client::new(), config.bot_token.clone());
            api.set_webhook(
                url,
                config.webhook.secret.as_deref(),
                &config.polling.allowed_updates,
            )
            .await
            .map_err(ReceiverError::SetWebhook)?;
            info!("webhook registered");
        }
    }

    let state = Arc::new(ServerState::default());
    let app = router(&handler, &state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhook.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(ReceiverError::Server)?;
    info!(port = config.webhook.port, "webhook server starting");

    let drain_delay = Duration::from_secs(config.webhook.drain_delay_secs);
    let drain_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            drain_state.shutting_down.store(true, Ordering::SeqCst);
            info!(delay = ?drain_delay, "shutdown initiated, starting drain delay");
            tokio::time::sleep(drain_delay).await;
            info!("drain delay complete, shutting down server");
        })
        .await
        .map_err(ReceiverError::Server)?;

    info!("webhook server stopped gracefully");
    Ok(())
}
