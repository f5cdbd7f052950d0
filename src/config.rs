//! Configuration loading and validation.
//!
//! Loads receiver configuration from `./receiver.toml` (or
//! `$TELEGRAM_CONFIG_PATH`). Environment variables override file values;
//! file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ReceiverError;

// ── Secret token ────────────────────────────────────────────────

/// Bot API token that redacts itself in logs and debug output.
///
/// The raw value is only reachable through [`SecretToken::expose`], which
/// keeps accidental `{:?}`/`{}` formatting from leaking credentials.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretToken(String);

impl SecretToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True if no token was configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken([REDACTED])")
    }
}

impl fmt::Display for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// ── Top-level config ────────────────────────────────────────────

/// How the receiver obtains updates from Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverMode {
    /// Telegram pushes updates to our HTTPS endpoint.
    #[default]
    Webhook,
    /// We pull updates via long-polling getUpdates.
    LongPolling,
}

/// Top-level receiver configuration.
///
/// Path: `./receiver.toml` or `$TELEGRAM_CONFIG_PATH`.
/// Env vars (`TELEGRAM_*`) override file values; file values override
/// defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Bot API token used for outbound calls.
    pub bot_token: SecretToken,
    /// Update delivery mode.
    pub mode: ReceiverMode,
    /// Capacity of the bounded update channel handed to the consumer.
    pub channel_capacity: usize,
    /// Webhook ingress settings (`[webhook]`).
    pub webhook: WebhookConfig,
    /// Long-polling settings (`[polling]`).
    pub polling: PollingConfig,
    /// Poll retry backoff settings (`[retry]`).
    pub retry: RetryConfig,
    /// Webhook admission control settings (`[rate_limit]`).
    pub rate_limit: RateLimitConfig,
    /// Circuit breaker settings shared by both paths (`[breaker]`).
    pub breaker: BreakerConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bot_token: SecretToken::default(),
            mode: ReceiverMode::default(),
            channel_capacity: 100,
            webhook: WebhookConfig::default(),
            polling: PollingConfig::default(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// Webhook ingress settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Local port the webhook server binds.
    pub port: u16,
    /// Public URL registered with Telegram at startup, if set.
    pub public_url: Option<String>,
    /// Secret token Telegram echoes back in each request, if set.
    pub secret: Option<String>,
    /// Only accept requests whose Host header matches, if set.
    pub allowed_host: Option<String>,
    /// Hard ceiling on request body size, in bytes.
    pub max_body_bytes: usize,
    /// Seconds to keep answering probes 503 before draining connections.
    pub drain_delay_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: 8443,
            public_url: None,
            secret: None,
            allowed_host: None,
            max_body_bytes: 1_048_576,
            drain_delay_secs: 5,
        }
    }
}

/// Long-polling settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Server-side long-poll hold time in seconds (0–60).
    pub timeout_secs: u64,
    /// Maximum updates per getUpdates batch (1–100).
    pub limit: u32,
    /// Consecutive errors before the loop stops permanently (0 = unlimited).
    pub max_errors: u32,
    /// Update types to receive; empty means all.
    pub allowed_updates: Vec<String>,
    /// Delete any registered webhook before polling starts.
    pub delete_webhook_on_start: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            limit: 100,
            max_errors: 10,
            allowed_updates: Vec::new(),
            delete_webhook_on_start: false,
        }
    }
}

/// Exponential backoff settings for poll retries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Delay cap, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied per consecutive error.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Initial delay as a [`Duration`].
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Delay cap as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Token-bucket admission control settings for the webhook path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained request rate.
    pub requests_per_second: f64,
    /// Burst capacity.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 20,
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Trial requests admitted while half-open.
    pub half_open_max_requests: u32,
    /// Rolling interval over which closed-state counts are kept, in seconds.
    pub interval_secs: u64,
    /// Cool-down before an open breaker admits trial requests, in seconds.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            half_open_max_requests: 5,
            interval_secs: 120,
            cooldown_secs: 60,
        }
    }
}

impl BreakerConfig {
    /// Rolling interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Cool-down as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

// ── Loading ─────────────────────────────────────────────────────

impl ReceiverConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$TELEGRAM_CONFIG_PATH` or `./receiver.toml`.
    /// If the file does not exist, defaults are used.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from the TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: ReceiverConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(ReceiverConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve the config file path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(p) = env("TELEGRAM_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("receiver.toml")
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests do not have to mutate the process
    /// environment.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("TELEGRAM_BOT_TOKEN") {
            self.bot_token = SecretToken::new(v);
        }
        if let Some(v) = env("TELEGRAM_MODE") {
            match v.to_lowercase().as_str() {
                "webhook" => self.mode = ReceiverMode::Webhook,
                "long_polling" | "polling" => self.mode = ReceiverMode::LongPolling,
                _ => tracing::warn!(var = "TELEGRAM_MODE", value = %v, "ignoring invalid env override"),
            }
        }

        // Numeric overrides share one parse-or-warn path.
        Self::override_parsed(&env, "TELEGRAM_CHANNEL_CAPACITY", &mut self.channel_capacity);
        Self::override_parsed(&env, "TELEGRAM_WEBHOOK_PORT", &mut self.webhook.port);
        Self::override_parsed(
            &env,
            "TELEGRAM_WEBHOOK_MAX_BODY_BYTES",
            &mut self.webhook.max_body_bytes,
        );
        Self::override_parsed(&env, "TELEGRAM_POLL_TIMEOUT_SECS", &mut self.polling.timeout_secs);
        Self::override_parsed(&env, "TELEGRAM_POLL_LIMIT", &mut self.polling.limit);
        Self::override_parsed(&env, "TELEGRAM_POLL_MAX_ERRORS", &mut self.polling.max_errors);

        if let Some(v) = env("TELEGRAM_WEBHOOK_URL") {
            self.webhook.public_url = Some(v);
        }
        if let Some(v) = env("TELEGRAM_WEBHOOK_SECRET") {
            self.webhook.secret = Some(v);
        }
        if let Some(v) = env("TELEGRAM_WEBHOOK_ALLOWED_HOST") {
            self.webhook.allowed_host = Some(v);
        }
        if let Some(v) = env("TELEGRAM_POLL_DELETE_WEBHOOK") {
            match v.parse() {
                Ok(b) => self.polling.delete_webhook_on_start = b,
                Err(_) => tracing::warn!(
                    var = "TELEGRAM_POLL_DELETE_WEBHOOK",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    fn override_parsed<T: std::str::FromStr>(
        env: impl Fn(&str) -> Option<String>,
        key: &'static str,
        target: &mut T,
    ) {
        if let Some(v) = env(key) {
            match v.parse() {
                Ok(parsed) => *target = parsed,
                Err(_) => {
                    tracing::warn!(var = key, value = %v, "ignoring invalid env override");
                }
            }
        }
    }

    // ── Validation ──────────────────────────────────────────────

    /// Validate the configuration for the selected mode.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), ReceiverError> {
        validate_bot_token(&self.bot_token)?;
        if self.channel_capacity == 0 {
            return Err(ReceiverError::InvalidConfig(
                "channel_capacity must be at least 1".into(),
            ));
        }
        match self.mode {
            ReceiverMode::Webhook => self.validate_webhook(),
            ReceiverMode::LongPolling => self.validate_polling(),
        }
    }

    fn validate_webhook(&self) -> Result<(), ReceiverError> {
        if self.webhook.port == 0 {
            return Err(ReceiverError::InvalidConfig(
                "webhook.port must be non-zero".into(),
            ));
        }
        if self.webhook.max_body_bytes == 0 {
            return Err(ReceiverError::InvalidConfig(
                "webhook.max_body_bytes must be non-zero".into(),
            ));
        }
        Ok(())
    }

    fn validate_polling(&self) -> Result<(), ReceiverError> {
        if self.polling.timeout_secs > 60 {
            return Err(ReceiverError::InvalidConfig(
                "polling.timeout_secs must be between 0 and 60".into(),
            ));
        }
        if self.polling.limit < 1 || self.polling.limit > 100 {
            return Err(ReceiverError::InvalidConfig(
                "polling.limit must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }
}

/// Check the token against Telegram's `digits:alphanumeric` shape.
fn validate_bot_token(token: &SecretToken) -> Result<(), ReceiverError> {
    let raw = token.expose();
    if raw.is_empty() {
        return Err(ReceiverError::InvalidConfig(
            "bot_token is required (set via TELEGRAM_BOT_TOKEN)".into(),
        ));
    }
    let valid = raw.split_once(':').is_some_and(|(id, rest)| {
        !id.is_empty()
            && id.bytes().all(|b| b.is_ascii_digit())
            && !rest.is_empty()
            && rest
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    });
    if !valid {
        return Err(ReceiverError::InvalidConfig(
            "bot_token format is invalid (expected 123456789:ABCdef...)".into(),
        ));
    }
    Ok(())
}
