//! Tracking configuration with environment variable support.
//!
//! Configuration is read from `OUTBOUNDIQ_`-prefixed environment
//! variables (optionally loaded from a `.env` file via [`load_dotenv`]):
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `OUTBOUNDIQ_API_KEY` | ingestion key; absent disables tracking | (none) |
//! | `OUTBOUNDIQ_ENDPOINT` | ingestion URL | agent default |
//! | `OUTBOUNDIQ_DEBUG` | verbose lifecycle logging | `false` |
//! | `OUTBOUNDIQ_BATCH_SIZE` | records per delivery batch | `10` |
//! | `OUTBOUNDIQ_FLUSH_INTERVAL` | flush cadence, milliseconds | `5000` |
//!
//! A missing api key disables tracking rather than raising: telemetry
//! must never be the reason the host application fails to start.

use serde::Deserialize;
use std::time::Duration;

/// Default ingestion endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://ingest.outboundiq.dev/v1/calls";

/// Environment variable prefix for all recognized options.
pub const ENV_PREFIX: &str = "OUTBOUNDIQ_";

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5_000;

/// Configuration for the tracking client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackingConfig {
    /// Ingestion API key. `None` disables tracking entirely.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Ingestion endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Verbose lifecycle logging.
    #[serde(default)]
    pub debug: bool,

    /// Records accumulated before a delivery batch is considered full.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush cadence in milliseconds.
    #[serde(default = "default_flush_interval")]
    pub flush_interval: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_flush_interval() -> u64 {
    DEFAULT_FLUSH_INTERVAL_MS
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_endpoint(),
            debug: false,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL_MS,
        }
    }
}

impl TrackingConfig {
    /// Read configuration from `OUTBOUNDIQ_*` environment variables.
    ///
    /// Malformed values degrade to defaults with a warning; this path
    /// never fails.
    pub fn from_env() -> Self {
        match envy::prefixed(ENV_PREFIX).from_env() {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    "Invalid OUTBOUNDIQ_* environment configuration, using defaults: {}",
                    err
                );
                Self::default()
            }
        }
    }

    /// Set the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the ingestion endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Enable or disable debug logging.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the flush cadence in milliseconds.
    pub fn flush_interval_ms(mut self, millis: u64) -> Self {
        self.flush_interval = millis;
        self
    }

    /// Send-immediately profile for hosts that may be torn down right
    /// after a response is produced: every record is its own batch.
    pub fn serverless(mut self) -> Self {
        self.batch_size = 1;
        self.flush_interval = 1_000;
        self
    }

    /// Profile for short-lived edge isolates: small batches bound
    /// memory while still amortizing a little delivery overhead.
    pub fn edge(mut self) -> Self {
        self.batch_size = 5;
        self.flush_interval = 1_000;
        self
    }

    /// Flush cadence as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval)
    }

    /// Whether tracking can be enabled with this configuration.
    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Load a `.env` file if one exists. Missing files are not an error.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
