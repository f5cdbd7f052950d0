//! Long-polling client for getUpdates.
//!
//! One background task repeatedly pulls update batches, advances the offset
//! cursor (which doubles as the acknowledgment boundary toward Telegram),
//! and forwards each update to the bounded consumer channel without
//! blocking. Transport failures are retried with exponential backoff and
//! jitter behind a circuit breaker; a configurable run of consecutive errors
//! stops the loop for good, observable only through the health accessors.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::BotApi;
use crate::backoff::BackoffPolicy;
use crate::breaker::CircuitBreaker;
use crate::config::ReceiverConfig;
use crate::error::{ApiError, PollError, ReceiverError};
use crate::types::Update;

/// Session state shared between the poll loop and health-check callers.
///
/// Only the loop task writes `offset` and `consecutive_errors`; health
/// probes read them concurrently, so all three fields are atomics.
#[derive(Debug)]
struct Shared {
    running: AtomicBool,
    offset: AtomicI64,
    consecutive_errors: AtomicU32,
}

/// Long-polling update client.
///
/// `start` spawns the poll loop as an independent task and returns
/// immediately; `stop` signals it and waits for it to exit. Both are safe to
/// call from any task.
pub struct LongPollingClient {
    api: BotApi,
    updates: mpsc::Sender<Update>,
    timeout_secs: u64,
    limit: u32,
    max_errors: u32,
    allowed_updates: Vec<String>,
    delete_webhook_on_start: bool,
    backoff: BackoffPolicy,
    breaker: Arc<CircuitBreaker>,
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LongPollingClient {
    /// Build a client from configuration, forwarding onto `updates`.
    pub fn new(config: &ReceiverConfig, updates: mpsc::Sender<Update>) -> Self {
        Self::with_api(
            config,
            BotApi::new(reqwest::Client::new(), config.bot_token.clone()),
            updates,
        )
    }

    /// Build a client against a custom [`BotApi`] (used by tests to point at
    /// a local mock server).
    pub fn with_api(config: &ReceiverConfig, api: BotApi, updates: mpsc::Sender<Update>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            api,
            updates,
            timeout_secs: config.polling.timeout_secs,
            limit: config.polling.limit,
            max_errors: config.polling.max_errors,
            allowed_updates: config.polling.allowed_updates.clone(),
            delete_webhook_on_start: config.polling.delete_webhook_on_start,
            backoff: BackoffPolicy::new(
                config.retry.initial_delay(),
                config.retry.max_delay(),
                config.retry.backoff_factor,
            ),
            breaker: Arc::new(CircuitBreaker::new(
                "polling",
                config.breaker.half_open_max_requests,
                config.breaker.interval(),
                config.breaker.cooldown(),
            )),
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                offset: AtomicI64::new(0),
                consecutive_errors: AtomicU32::new(0),
            }),
            shutdown_tx,
            shutdown_rx,
            task: Mutex::new(None),
        }
    }

    /// Start polling.
    ///
    /// If configured, first withdraws any existing webhook registration; a
    /// failure there aborts the start and leaves the client idle. On success
    /// the poll loop runs as its own task and this returns immediately.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::AlreadyRunning`] if the client is already running,
    /// [`ReceiverError::DeleteWebhook`] if webhook withdrawal failed.
    pub async fn start(&self) -> Result<(), ReceiverError> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ReceiverError::AlreadyRunning);
        }

        if self.delete_webhook_on_start {
            info!("deleting existing webhook before starting long polling");
            if let Err(err) = self.api.delete_webhook(false).await {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(ReceiverError::DeleteWebhook(err));
            }
        }

        let worker = PollWorker {
            api: self.api.clone(),
            updates: self.updates.clone(),
            timeout_secs: self.timeout_secs,
            limit: self.limit,
            max_errors: self.max_errors,
            allowed_updates: self.allowed_updates.clone(),
            backoff: self.backoff.clone(),
            breaker: Arc::clone(&self.breaker),
            shared: Arc::clone(&self.shared),
            shutdown: self.shutdown_rx.clone(),
        };
        *self.task.lock().await = Some(tokio::spawn(worker.run()));

        info!(
            timeout = self.timeout_secs,
            limit = self.limit,
            max_errors = self.max_errors,
            "long polling started"
        );
        Ok(())
    }

    /// Stop polling.
    ///
    /// Idempotent and safe to call concurrently: every call returns only
    /// after the loop task has exited. In-flight getUpdates requests run to
    /// their own timeout; the loop observes the signal at its next check.
    pub async fn stop(&self) {
        // watch::send overwrites the value; signalling twice is harmless.
        let _ = self.shutdown_tx.send(true);
        // The lock is held across the join so concurrent callers queue
        // behind the first one and none returns before the loop has exited.
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            let _ = handle.await;
            info!("long polling stopped");
        }
    }

    /// True while the poll loop is running.
    pub fn running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Health signal for external liveness polling.
    ///
    /// Running and, unless `max_errors` is 0 (unlimited), under the
    /// consecutive-error ceiling.
    pub fn is_healthy(&self) -> bool {
        if self.max_errors == 0 {
            return self.running();
        }
        self.running() && self.consecutive_errors() < self.max_errors
    }

    /// Current consecutive-error count.
    pub fn consecutive_errors(&self) -> u32 {
        self.shared.consecutive_errors.load(Ordering::SeqCst)
    }

    /// Next update id that will be requested (the acknowledgment cursor).
    pub fn offset(&self) -> i64 {
        self.shared.offset.load(Ordering::SeqCst)
    }
}

/// Everything the poll loop task owns.
struct PollWorker {
    api: BotApi,
    updates: mpsc::Sender<Update>,
    timeout_secs: u64,
    limit: u32,
    max_errors: u32,
    allowed_updates: Vec<String>,
    backoff: BackoffPolicy,
    breaker: Arc<CircuitBreaker>,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
}

impl PollWorker {
    async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                info!("polling stopped due to stop signal");
                break;
            }

            match self.fetch_updates().await {
                Ok(updates) => {
                    self.shared.consecutive_errors.store(0, Ordering::SeqCst);
                    if !self.forward_batch(updates) {
                        break;
                    }
                }
                Err(err) => {
                    let count = self
                        .shared
                        .consecutive_errors
                        .fetch_add(1, Ordering::SeqCst)
                        .saturating_add(1);
                    let delay = self.backoff.delay(count);
                    error!(
                        error = %err,
                        consecutive_errors = count,
                        retry_delay = ?delay,
                        "failed to fetch updates"
                    );

                    if self.max_errors > 0 && count >= self.max_errors {
                        error!(
                            max_errors = self.max_errors,
                            "max consecutive errors exceeded, stopping polling"
                        );
                        break;
                    }

                    tokio::select! {
                        _ = self.shutdown.wait_for(|stop| *stop) => {
                            info!("polling stopped during backoff");
                            break;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Forward one batch, advancing the offset for every update whether or
    /// not it fits in the channel. Returns false if the consumer went away.
    fn forward_batch(&self, updates: Vec<Update>) -> bool {
        for update in updates {
            // The next request's offset acknowledges this id to Telegram, so
            // it must advance even when the channel is full.
            let next = update.update_id.saturating_add(1);
            self.shared.offset.fetch_max(next, Ordering::SeqCst);

            let update_id = update.update_id;
            match self.updates.try_send(update) {
                Ok(()) => debug!(update_id, "update sent to channel"),
                Err(TrySendError::Full(_)) => {
                    warn!(update_id, "updates channel full, dropping update");
                }
                Err(TrySendError::Closed(_)) => {
                    info!("updates channel closed, stopping poll loop");
                    return false;
                }
            }
        }
        true
    }

    /// One getUpdates round trip.
    ///
    /// The breaker wraps only the network call and status check; decoding a
    /// successfully transported response happens outside it, keeping payload
    /// failures out of the transport failure domain.
    async fn fetch_updates(&self) -> Result<Vec<Update>, PollError> {
        if !self.breaker.try_call() {
            return Err(PollError::BreakerOpen);
        }

        let offset = self.shared.offset.load(Ordering::SeqCst);
        let raw = match self
            .api
            .get_updates_raw(offset, self.limit, self.timeout_secs, &self.allowed_updates)
            .await
        {
            Ok(raw) => {
                self.breaker.record_success();
                raw
            }
            Err(err) => {
                self.breaker.record_failure();
                return Err(err.into());
            }
        };

        let envelope: crate::api::ApiResponse<Vec<Update>> =
            serde_json::from_slice(&raw).map_err(ApiError::Decode)?;
        Ok(envelope.into_result()?.unwrap_or_default())
    }
}
