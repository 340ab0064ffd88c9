//! Process-wide tracking client facade.
//!
//! Lazily initializes the ingestion client from configuration and
//! exposes the track/flush surface the adapters use. Initialization
//! happens at most once per process; the first caller wins and later
//! attempts with different configuration are silently ignored.
//!
//! The host framework's plugin model forces a module-level singleton
//! here (a globally installed transport hook cannot carry a handle), so
//! the global lives behind this narrow module. Hosts that can thread a
//! handle explicitly should build their own [`IngestClient`] and
//! install it via [`init_with_client`].
//!
//! A missing API key disables tracking for the process lifetime instead
//! of raising; instrumentation must never be the cause of an
//! application outage.

use crate::config::TrackingConfig;
use crate::data::{ApiCall, UserContext};
use crate::ingest::{HttpIngestClient, IngestClient};
use std::sync::{Arc, OnceLock, RwLock};

/// Callback asked for the ambient identity by externally installed
/// transport hooks.
pub type UserContextResolver = Arc<dyn Fn() -> Option<UserContext> + Send + Sync>;

#[derive(Default)]
struct FacadeState {
    client: Option<Arc<dyn IngestClient>>,
    initialized: bool,
    resolver: Option<UserContextResolver>,
}

fn state() -> &'static RwLock<FacadeState> {
    static STATE: OnceLock<RwLock<FacadeState>> = OnceLock::new();
    STATE.get_or_init(|| RwLock::new(FacadeState::default()))
}

/// Explicit overrides for [`init_edge`], merged over environment
/// defaults. Unset fields keep the environment-derived value.
#[derive(Debug, Clone, Default)]
pub struct EdgeOverrides {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub debug: Option<bool>,
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
}

impl EdgeOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn flush_interval_ms(mut self, millis: u64) -> Self {
        self.flush_interval_ms = Some(millis);
        self
    }

    fn apply(self, mut config: TrackingConfig) -> TrackingConfig {
        if let Some(api_key) = self.api_key {
            config.api_key = Some(api_key);
        }
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size.max(1);
        }
        if let Some(millis) = self.flush_interval_ms {
            config.flush_interval = millis;
        }
        config
    }
}

fn install(client: Arc<HttpIngestClient>, debug: bool) {
    client.spawn_interval_flush();
    if debug {
        tracing::info!(
            endpoint = %client.config().endpoint,
            batch_size = client.config().batch_size,
            "Outbound call tracking initialized"
        );
    }
}

/// Initialize from the environment if not already initialized.
///
/// Returns `true` when a client is available afterwards. Missing
/// `OUTBOUNDIQ_API_KEY` logs a warning and returns `false`: tracking
/// stays disabled, nothing raises. Uses the send-immediately serverless
/// profile (batch size 1, 1s cadence) because the process may be
/// suspended right after the response is produced.
pub fn ensure_initialized() -> bool {
    let mut guard = match state().write() {
        Ok(guard) => guard,
        Err(_) => return false,
    };
    if guard.initialized || guard.client.is_some() {
        guard.initialized = true;
        return true;
    }

    let config = TrackingConfig::from_env();
    if !config.enabled() {
        tracing::warn!(
            "OUTBOUNDIQ_API_KEY is not set; outbound call tracking is disabled"
        );
        return false;
    }

    let config = config.serverless();
    let debug = config.debug;
    let client = Arc::new(HttpIngestClient::new(config));
    install(Arc::clone(&client), debug);
    guard.client = Some(client);
    guard.initialized = true;
    true
}

/// One-shot initializer for edge runtimes.
///
/// `overrides` are merged over environment defaults; the edge profile
/// (batch size 5, 1s cadence) applies underneath both. No-ops when a
/// client was already initialized; the first caller wins.
pub fn init_edge(overrides: EdgeOverrides) {
    let mut guard = match state().write() {
        Ok(guard) => guard,
        Err(_) => return,
    };
    if guard.initialized || guard.client.is_some() {
        tracing::debug!("Tracking already initialized; edge init ignored");
        return;
    }

    let config = overrides.apply(TrackingConfig::from_env().edge());
    if !config.enabled() {
        tracing::warn!(
            "No API key in edge configuration or environment; outbound call tracking is disabled"
        );
        return;
    }

    let debug = config.debug;
    let client = Arc::new(HttpIngestClient::new(config));
    install(Arc::clone(&client), debug);
    guard.client = Some(client);
    guard.initialized = true;
}

/// Install an explicitly constructed client (dependency injection).
///
/// Returns `false` if a client was already installed; the first caller
/// wins and the argument is dropped.
pub fn init_with_client(client: Arc<dyn IngestClient>) -> bool {
    let mut guard = match state().write() {
        Ok(guard) => guard,
        Err(_) => return false,
    };
    if guard.initialized || guard.client.is_some() {
        return false;
    }
    guard.client = Some(client);
    guard.initialized = true;
    true
}

/// The live ingestion client, if tracking is enabled.
pub fn client() -> Option<Arc<dyn IngestClient>> {
    state().read().ok().and_then(|guard| guard.client.clone())
}

/// Enqueue a record. A no-op while tracking is disabled.
pub fn track(record: ApiCall) {
    if let Some(client) = client() {
        client.track(record);
    }
}

/// Force delivery of queued records. Delivery failures are logged and
/// swallowed; they must never surface into the host application.
pub async fn flush() {
    if let Some(client) = client() {
        if let Err(err) = client.flush().await {
            tracing::warn!("Flush failed: {}", err);
        }
    }
}

/// Track one record and await its delivery.
///
/// This is the adapter path: the flush is awaited before control
/// returns because the host runtime may suspend or tear the process
/// down immediately after the response is produced.
pub async fn submit(record: ApiCall) {
    track(record);
    flush().await;
}

/// Drain and close the client, if any.
pub async fn shutdown() {
    if let Some(client) = client() {
        if let Err(err) = client.shutdown().await {
            tracing::warn!("Shutdown flush failed: {}", err);
        }
    }
}

/// Register the callback externally installed transport hooks use to
/// ask for the ambient identity.
pub fn set_user_context_resolver(resolver: UserContextResolver) {
    if let Ok(mut guard) = state().write() {
        guard.resolver = Some(resolver);
    }
}

/// Ask the registered resolver for the ambient identity.
pub fn resolve_user_context() -> Option<UserContext> {
    let resolver = state().read().ok()?.resolver.clone()?;
    resolver()
}

/// Best-effort drain on termination: spawns a task that waits for
/// ctrl-c and shuts the client down before the process exits.
pub fn shutdown_on_terminate() {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    handle.spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Termination signal received; draining tracked calls");
            shutdown().await;
        }
    });
}

/// Drop all facade state. Test hook only.
#[cfg(any(test, feature = "test-util"))]
pub fn reset() {
    if let Ok(mut guard) = state().write() {
        *guard = FacadeState::default();
    }
}
