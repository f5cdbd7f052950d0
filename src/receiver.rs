//! Receiver facade: one entry point over both delivery modes.
//!
//! Owns the bounded update channel both ingress paths feed, hands the
//! receive half to the consumer once, and dispatches start/stop/health to
//! whichever mode is configured.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{ReceiverConfig, ReceiverMode};
use crate::error::ReceiverError;
use crate::polling::LongPollingClient;
use crate::types::Update;
use crate::webhook::WebhookHandler;

/// Something that receives Telegram updates.
///
/// The trait seam keeps consumers decoupled from the concrete transport and
/// makes mocking straightforward in tests.
#[async_trait]
pub trait UpdateReceiver: Send + Sync {
    /// Begin receiving updates.
    async fn start(&self) -> Result<(), ReceiverError>;
    /// Stop receiving updates; returns once fully stopped.
    async fn stop(&self);
    /// Health signal for external liveness polling.
    fn is_healthy(&self) -> bool;
}

/// Main entry point for receiving Telegram updates.
pub struct Receiver {
    config: ReceiverConfig,
    sender: mpsc::Sender<Update>,
    polling: OnceLock<Arc<LongPollingClient>>,
    webhook: OnceLock<Arc<WebhookHandler>>,
}

impl Receiver {
    /// Validate `config` and create a receiver plus the consumer's receive
    /// half of the update channel.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::InvalidConfig`] if validation fails.
    pub fn new(config: ReceiverConfig) -> Result<(Self, mpsc::Receiver<Update>), ReceiverError> {
        config.validate()?;
        let (sender, receiver) = mpsc::channel(config.channel_capacity);
        Ok((
            Self {
                config,
                sender,
                polling: OnceLock::new(),
                webhook: OnceLock::new(),
            },
            receiver,
        ))
    }

    /// The configuration this receiver was built with.
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// The webhook handler, constructed on first use.
    ///
    /// Mount its router yourself or pass it to
    /// [`crate::server::run_webhook_server`].
    pub fn webhook_handler(&self) -> Arc<WebhookHandler> {
        Arc::clone(self.webhook.get_or_init(|| {
            Arc::new(WebhookHandler::new(&self.config, self.sender.clone()))
        }))
    }

    /// The long-polling client, constructed on first use.
    pub fn polling_client(&self) -> Arc<LongPollingClient> {
        Arc::clone(self.polling.get_or_init(|| {
            Arc::new(LongPollingClient::new(&self.config, self.sender.clone()))
        }))
    }
}

#[async_trait]
impl UpdateReceiver for Receiver {
    async fn start(&self) -> Result<(), ReceiverError> {
        match self.config.mode {
            ReceiverMode::LongPolling => self.polling_client().start().await,
            ReceiverMode::Webhook => {
                // Webhook mode only prepares the handler here; the HTTP
                // server is run by the caller (or run_webhook_server), which
                // controls binding and shutdown.
                let _ = self.webhook_handler();
                info!("webhook handler ready");
                Ok(())
            }
        }
    }

    async fn stop(&self) {
        if let Some(client) = self.polling.get() {
            client.stop().await;
        }
    }

    fn is_healthy(&self) -> bool {
        match self.polling.get() {
            Some(client) => client.is_healthy(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretToken;

    fn config(mode: ReceiverMode) -> ReceiverConfig {
        ReceiverConfig {
            bot_token: SecretToken::new("123456:ABCdef"),
            mode,
            ..ReceiverConfig::default()
        }
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = Receiver::new(ReceiverConfig::default());
        assert!(matches!(result, Err(ReceiverError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn webhook_mode_start_is_synchronous_and_healthy() {
        let (receiver, _updates) =
            Receiver::new(config(ReceiverMode::Webhook)).expect("valid config");
        receiver.start().await.expect("webhook start prepares only");
        assert!(receiver.is_healthy());
        receiver.stop().await;
    }

    #[test]
    fn handler_is_a_singleton_per_receiver() {
        let (receiver, _updates) =
            Receiver::new(config(ReceiverMode::Webhook)).expect("valid config");
        let a = receiver.webhook_handler();
        let b = receiver.webhook_handler();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
