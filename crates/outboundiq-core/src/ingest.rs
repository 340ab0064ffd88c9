//! Ingestion client interface and shipped sinks.
//!
//! The tracking pipeline hands finished [`ApiCall`] records to an
//! [`IngestClient`]. The facade initializes one of the implementations
//! below by default; host applications may supply their own (anything
//! that batches and delivers records) through
//! [`crate::facade::init_with_client`].

use crate::config::TrackingConfig;
use crate::data::ApiCall;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Error type for ingestion operations.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Serialization of a batch failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The delivery request itself failed.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// The endpoint answered with a non-success status.
    #[error("ingestion endpoint rejected batch with status {0}")]
    Rejected(u16),

    /// The client was already shut down.
    #[error("ingestion client is shut down")]
    Closed,
}

/// Result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// A sink for tracking records.
///
/// `track` must be non-blocking (enqueue only); `flush` forces delivery
/// of everything queued; `shutdown` drains and closes.
#[async_trait]
pub trait IngestClient: Send + Sync + 'static {
    /// Enqueue a record. Never blocks and never fails.
    fn track(&self, record: ApiCall);

    /// Force delivery of all queued records.
    async fn flush(&self) -> IngestResult<()>;

    /// Drain and close. Subsequent `track` calls are dropped.
    async fn shutdown(&self) -> IngestResult<()>;

    /// Number of records currently queued.
    fn queued(&self) -> usize {
        0
    }
}

/// Sink that counts and discards. Used when tracking is disabled and
/// as a capture point in tests.
#[derive(Debug, Default)]
pub struct NullIngestClient {
    tracked: AtomicUsize,
}

impl NullIngestClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records received since creation.
    pub fn tracked(&self) -> usize {
        self.tracked.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IngestClient for NullIngestClient {
    fn track(&self, _record: ApiCall) {
        self.tracked.fetch_add(1, Ordering::Relaxed);
    }

    async fn flush(&self) -> IngestResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> IngestResult<()> {
        Ok(())
    }
}

/// Buffered HTTP sink: records accumulate in memory and are POSTed to
/// the configured endpoint as JSON batches.
///
/// Delivery failures are logged and the batch is dropped; there is no
/// retry or persistence here.
pub struct HttpIngestClient {
    config: TrackingConfig,
    buffer: Mutex<Vec<ApiCall>>,
    closed: AtomicBool,
    http: reqwest::Client,
}

impl HttpIngestClient {
    /// Build a sink for the given configuration.
    pub fn new(config: TrackingConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            config,
            buffer: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            http,
        }
    }

    /// The configuration this sink was built with.
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Spawn a background task flushing on the configured cadence.
    ///
    /// No-ops outside a tokio runtime; the facade's submit path flushes
    /// explicitly, so the interval task is an optimization, not a
    /// correctness requirement.
    pub fn spawn_interval_flush(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = Arc::clone(self);
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(client.config.flush_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if client.closed.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = client.flush().await {
                    tracing::warn!("Background flush failed: {}", err);
                }
            }
        });
    }

    fn drain(&self) -> Vec<ApiCall> {
        match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => Vec::new(),
        }
    }

    async fn deliver(&self, batch: &[ApiCall]) -> IngestResult<()> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            // Without a key there is nowhere to deliver; drop silently.
            return Ok(());
        };

        let payload = serde_json::json!({ "calls": batch });
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| IngestError::Delivery(err.to_string()))?;

        if !response.status().is_success() {
            return Err(IngestError::Rejected(response.status().as_u16()));
        }
        if self.config.debug {
            tracing::debug!("Delivered {} tracked call(s)", batch.len());
        }
        Ok(())
    }
}

#[async_trait]
impl IngestClient for HttpIngestClient {
    fn track(&self, record: ApiCall) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!("Dropping record tracked after shutdown");
            return;
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(record);
        }
    }

    async fn flush(&self) -> IngestResult<()> {
        let pending = self.drain();
        if pending.is_empty() {
            return Ok(());
        }
        let mut result = Ok(());
        for batch in pending.chunks(self.config.batch_size.max(1)) {
            if let Err(err) = self.deliver(batch).await {
                tracing::warn!("Dropping batch of {} record(s): {}", batch.len(), err);
                result = Err(err);
            }
        }
        result
    }

    async fn shutdown(&self) -> IngestResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(IngestError::Closed);
        }
        self.flush().await
    }

    fn queued(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}
