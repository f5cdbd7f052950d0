//! Outbound Telegram Bot API calls.
//!
//! Only the collaborators the receiver itself needs: webhook registration
//! and withdrawal, webhook diagnostics, and the raw getUpdates request the
//! poll loop wraps in its circuit breaker. Everything speaks the common
//! `{ok, result, error_code, description}` envelope.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::SecretToken;
use crate::error::ApiError;

/// Base URL for the Telegram Bot API.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram's default webhook connection cap, sent on registration.
const WEBHOOK_MAX_CONNECTIONS: u32 = 40;

/// Timeout for short (non-polling) API calls.
const API_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra seconds on top of the long-poll hold time so the socket stays open
/// while Telegram holds the request.
const POLL_TIMEOUT_MARGIN_SECS: u64 = 10;

/// Generic Bot API response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded.
    pub ok: bool,
    /// The payload, present on success.
    pub result: Option<T>,
    /// Numeric error code, present on failure.
    pub error_code: Option<i64>,
    /// Human-readable error description, present on failure.
    pub description: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Convert the envelope into a result, mapping `ok: false` to a
    /// structured [`ApiError::Telegram`].
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(ApiError::Telegram {
                code: self.error_code.unwrap_or(0),
                description: self
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}

/// Information about the currently registered webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookInfo {
    /// Registered webhook URL; empty if none is set.
    pub url: String,
    /// Whether a custom certificate was supplied.
    #[serde(default)]
    pub has_custom_certificate: bool,
    /// Updates waiting for delivery.
    #[serde(default)]
    pub pending_update_count: i64,
    /// Resolved IP address of the webhook host.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Unix time of the most recent delivery error.
    #[serde(default)]
    pub last_error_date: Option<i64>,
    /// Description of the most recent delivery error.
    #[serde(default)]
    pub last_error_message: Option<String>,
    /// Configured connection cap.
    #[serde(default)]
    pub max_connections: Option<i64>,
    /// Update-type filter in effect.
    #[serde(default)]
    pub allowed_updates: Option<Vec<String>>,
}

/// Client for the handful of Bot API methods the receiver calls outbound.
#[derive(Debug, Clone)]
pub struct BotApi {
    http: reqwest::Client,
    base_url: String,
    token: SecretToken,
}

impl BotApi {
    /// Create a client against the production API base URL.
    pub fn new(http: reqwest::Client, token: SecretToken) -> Self {
        Self::with_base_url(http, token, TELEGRAM_API_BASE)
    }

    /// Create a client against a custom base URL (used by tests).
    pub fn with_base_url(
        http: reqwest::Client,
        token: SecretToken,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token.expose(), method)
    }

    /// Register `url` as the webhook endpoint.
    pub async fn set_webhook(
        &self,
        url: &str,
        secret: Option<&str>,
        allowed_updates: &[String],
    ) -> Result<(), ApiError> {
        let mut body = json!({
            "url": url,
            "max_connections": WEBHOOK_MAX_CONNECTIONS,
        });
        if let Some(secret) = secret {
            body["secret_token"] = json!(secret);
        }
        if !allowed_updates.is_empty() {
            body["allowed_updates"] = json!(allowed_updates);
        }
        self.call::<serde_json::Value>("setWebhook", &body).await?;
        debug!(url, "webhook registered");
        Ok(())
    }

    /// Withdraw the registered webhook, if any.
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<(), ApiError> {
        let body = json!({ "drop_pending_updates": drop_pending_updates });
        self.call::<serde_json::Value>("deleteWebhook", &body)
            .await?;
        debug!("webhook deleted");
        Ok(())
    }

    /// Fetch diagnostics about the current webhook registration.
    pub async fn get_webhook_info(&self) -> Result<WebhookInfo, ApiError> {
        let info = self
            .call::<WebhookInfo>("getWebhookInfo", &json!({}))
            .await?;
        info.ok_or(ApiError::Telegram {
            code: 0,
            description: "getWebhookInfo returned no result".to_string(),
        })
    }

    /// Issue a getUpdates request and return the raw response body.
    ///
    /// Only the network call and HTTP status check happen here; decoding the
    /// envelope is the caller's concern so that payload failures stay out of
    /// the transport failure domain.
    pub(crate) async fn get_updates_raw(
        &self,
        offset: i64,
        limit: u32,
        timeout_secs: u64,
        allowed_updates: &[String],
    ) -> Result<Vec<u8>, ApiError> {
        let mut request = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("timeout", timeout_secs.to_string()),
            ])
            .timeout(Duration::from_secs(
                timeout_secs.saturating_add(POLL_TIMEOUT_MARGIN_SECS),
            ));
        if !allowed_updates.is_empty() {
            let encoded = serde_json::to_string(allowed_updates).unwrap_or_default();
            request = request.query(&[("allowed_updates", encoded)]);
        }

        let response = request.send().await.map_err(ApiError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        let body = response.bytes().await.map_err(ApiError::Transport)?;
        Ok(body.to_vec())
    }

    /// POST a method call and decode its envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<Option<T>, ApiError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .timeout(API_CALL_TIMEOUT)
            .send()
            .await
            .map_err(ApiError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(ApiError::Transport)?;
        let envelope: ApiResponse<T> = serde_json::from_slice(&bytes).map_err(ApiError::Decode)?;
        envelope.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_success_yields_result() {
        let raw = r#"{"ok":true,"result":[{"update_id":1}]}"#;
        let envelope: ApiResponse<Vec<crate::types::Update>> =
            serde_json::from_str(raw).expect("valid envelope");
        let updates = envelope
            .into_result()
            .expect("ok envelope")
            .expect("result present");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, 1);
    }

    #[test]
    fn envelope_failure_yields_structured_error() {
        let raw = r#"{"ok":false,"error_code":429,"description":"Too Many Requests"}"#;
        let envelope: ApiResponse<Vec<crate::types::Update>> =
            serde_json::from_str(raw).expect("valid envelope");
        match envelope.into_result() {
            Err(ApiError::Telegram { code, description }) => {
                assert_eq!(code, 429);
                assert_eq!(description, "Too Many Requests");
            }
            other => panic!("expected telegram error, got {other:?}"),
        }
    }

    #[test]
    fn envelope_failure_without_fields_uses_placeholders() {
        let raw = r#"{"ok":false}"#;
        let envelope: ApiResponse<serde_json::Value> =
            serde_json::from_str(raw).expect("valid envelope");
        match envelope.into_result() {
            Err(ApiError::Telegram { code, description }) => {
                assert_eq!(code, 0);
                assert_eq!(description, "unknown error");
            }
            other => panic!("expected telegram error, got {other:?}"),
        }
    }

    #[test]
    fn envelope_decodes_payloads_without_a_default() {
        // WebhookInfo has no Default impl; the envelope must not demand one.
        let raw = r#"{"ok":true,"result":{"url":"https://bot.example.com/hook","pending_update_count":2}}"#;
        let envelope: ApiResponse<WebhookInfo> =
            serde_json::from_str(raw).expect("valid envelope");
        let info = envelope
            .into_result()
            .expect("ok envelope")
            .expect("result present");
        assert_eq!(info.url, "https://bot.example.com/hook");
        assert_eq!(info.pending_update_count, 2);
    }

    #[test]
    fn method_url_embeds_token() {
        let api = BotApi::with_base_url(
            reqwest::Client::new(),
            SecretToken::new("123:abc"),
            "http://127.0.0.1:9999",
        );
        assert_eq!(
            api.method_url("getUpdates"),
            "http://127.0.0.1:9999/bot123:abc/getUpdates"
        );
    }
}
