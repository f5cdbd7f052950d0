//! Telegram Bot API update receiver.
//!
//! Ingests update notifications over two transports (webhook push and
//! long-polling pull), normalizes them into typed [`Update`] values, and
//! hands them to the consumer through one bounded channel. The webhook path
//! wraps each request in admission control and a circuit breaker; the
//! polling path retries with backoff behind its own breaker and exposes a
//! health signal instead of raising on sustained failure.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod backoff;
pub mod breaker;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod polling;
pub mod receiver;
pub mod server;
pub mod types;
pub mod webhook;

pub use api::{ApiResponse, BotApi, WebhookInfo};
pub use config::{ReceiverConfig, ReceiverMode, SecretToken};
pub use error::{ApiError, PollError, ReceiverError, WebhookError};
pub use polling::LongPollingClient;
pub use receiver::{Receiver, UpdateReceiver};
pub use types::{Update, UpdatePayload};
pub use webhook::{WebhookHandler, SECRET_TOKEN_HEADER};
