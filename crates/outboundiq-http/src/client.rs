//! Interceptor-based instrumentation for a shared HTTP client.
//!
//! [`TrackedClient`] is a thin reqwest wrapper with request and
//! response interceptor hooks. [`install_tracking`] registers the
//! tracking pair on an instance: a request interceptor stamps the start
//! instant onto the in-flight call, and a response/error interceptor
//! builds and submits the record, then passes the outcome through
//! unchanged. Installation is additive: interceptors already
//! registered on the instance are never removed or replaced.
//!
//! Request interceptors execute in registration order; response
//! interceptors run in registration order on every outcome.
//!
//! # Example
//!
//! ```ignore
//! use outboundiq_http::client::{install_tracking, CallState, TrackedClient};
//!
//! let mut client = TrackedClient::with_base_url("https://api.example.com");
//! install_tracking(&mut client);
//!
//! let response = client.execute(CallState::new("/v1/users")).await?;
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use outboundiq_core::facade;
use outboundiq_core::normalize::{normalize, CallOutcome, CallSite, CallUrl, HeaderShape, RequestPayload};
use outboundiq_core::sanitize::CaptureLimits;
use outboundiq_core::UserContext;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Error type for tracked client calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The method string is not a valid HTTP method.
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Mutable per-call state traveling from the request interceptors into
/// the paired response/error interceptors.
#[derive(Debug, Clone)]
pub struct CallState {
    /// HTTP verb; `None` defaults to GET.
    pub method: Option<String>,
    /// Target URL, possibly relative to the client's base URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body classification for the record.
    pub body: RequestPayload,
    /// Per-call identity override.
    pub user_context: Option<UserContext>,
    /// Stamped by the tracking request interceptor.
    pub started: Option<Instant>,
    wire_body: Option<Bytes>,
}

impl CallState {
    /// A call to `url` with no explicit method.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            method: None,
            url: url.into(),
            headers: HashMap::new(),
            body: RequestPayload::None,
            user_context: None,
            started: None,
            wire_body: None,
        }
    }

    /// Set the HTTP method.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Send a textual body.
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.wire_body = Some(Bytes::from(body.clone()));
        self.body = RequestPayload::Text(body);
        self
    }

    /// Send raw bytes; recorded as a size placeholder.
    pub fn binary_body(mut self, body: Bytes) -> Self {
        self.body = RequestPayload::Binary(body.len());
        self.wire_body = Some(body);
        self
    }

    /// Attach a per-call identity override.
    pub fn user_context(mut self, user_context: UserContext) -> Self {
        self.user_context = Some(user_context);
        self
    }
}

/// A fully buffered response passed through the interceptor chain
/// unchanged.
#[derive(Debug)]
pub struct ClientResponse {
    status: u16,
    headers: http::HeaderMap,
    body: Bytes,
}

impl ClientResponse {
    /// Numeric response status.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &http::HeaderMap {
        &self.headers
    }

    /// Raw body bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as text (lossy for non-UTF-8 content).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Hook run before a call is issued. May mutate the call state.
pub trait RequestInterceptor: Send + Sync + 'static {
    fn intercept(&self, call: &mut CallState);
}

/// Hook run after a call completes or fails. Observes the outcome but
/// cannot change it; the client re-returns the original result after
/// the chain runs.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync + 'static {
    async fn on_response(&self, call: &CallState, response: &ClientResponse);
    async fn on_error(&self, call: &CallState, error: &ClientError);
}

/// A reqwest wrapper with interceptor hooks and an optional base URL.
#[derive(Clone, Default)]
pub struct TrackedClient {
    base_url: Option<String>,
    http: reqwest::Client,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl TrackedClient {
    /// A client without a base URL; call URLs must be absolute.
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that resolves relative call URLs against `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// The configured base URL, if any.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Append a request interceptor. Existing registrations are kept.
    pub fn add_request_interceptor(&mut self, interceptor: Arc<dyn RequestInterceptor>) {
        self.request_interceptors.push(interceptor);
    }

    /// Append a response interceptor. Existing registrations are kept.
    pub fn add_response_interceptor(&mut self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response_interceptors.push(interceptor);
    }

    /// Number of registered request interceptors.
    pub fn request_interceptor_count(&self) -> usize {
        self.request_interceptors.len()
    }

    /// Number of registered response interceptors.
    pub fn response_interceptor_count(&self) -> usize {
        self.response_interceptors.len()
    }

    /// Resolve a possibly-relative URL against the base URL.
    pub fn resolve_url(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) => CallUrl::Parts {
                base: base.clone(),
                path: url.to_string(),
            }
            .resolve(),
            None => url.to_string(),
        }
    }

    /// Convenience GET.
    pub async fn get(&self, url: impl Into<String>) -> Result<ClientResponse, ClientError> {
        self.execute(CallState::new(url)).await
    }

    /// Issue one call through the interceptor chain.
    ///
    /// The original outcome is always re-returned: a recorded failure
    /// still fails, and an observed response reaches the caller intact.
    pub async fn execute(&self, mut call: CallState) -> Result<ClientResponse, ClientError> {
        for interceptor in &self.request_interceptors {
            interceptor.intercept(&mut call);
        }

        match self.issue(&call).await {
            Ok(response) => {
                for interceptor in &self.response_interceptors {
                    interceptor.on_response(&call, &response).await;
                }
                Ok(response)
            }
            Err(error) => {
                for interceptor in &self.response_interceptors {
                    interceptor.on_error(&call, &error).await;
                }
                Err(error)
            }
        }
    }

    async fn issue(&self, call: &CallState) -> Result<ClientResponse, ClientError> {
        let method = match &call.method {
            Some(m) => http::Method::from_bytes(m.to_uppercase().as_bytes())
                .map_err(|_| ClientError::InvalidMethod(m.clone()))?,
            None => http::Method::GET,
        };
        let url = self.resolve_url(&call.url);

        let mut builder = self.http.request(method, &url);
        for (name, value) in &call.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &call.wire_body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!("Failed to read response body: {}", err);
                Bytes::new()
            }
        };
        Ok(ClientResponse {
            status,
            headers,
            body,
        })
    }
}

/// The tracking interceptor pair.
struct TrackingInterceptor {
    base_url: Option<String>,
    limits: CaptureLimits,
}

impl TrackingInterceptor {
    fn call_site(&self, call: &CallState) -> CallSite {
        let url = match &self.base_url {
            Some(base) => CallUrl::Parts {
                base: base.clone(),
                path: call.url.clone(),
            },
            None => CallUrl::Absolute(call.url.clone()),
        };
        CallSite {
            method: call.method.clone(),
            url,
            request_headers: Some(HeaderShape::Plain(call.headers.clone())),
            request_body: call.body.clone(),
        }
    }

    fn started(call: &CallState) -> Instant {
        // A foreign interceptor may have cleared the stamp; a zero
        // duration beats a lost record.
        call.started.unwrap_or_else(Instant::now)
    }
}

impl RequestInterceptor for TrackingInterceptor {
    fn intercept(&self, call: &mut CallState) {
        facade::ensure_initialized();
        call.started = Some(Instant::now());
    }
}

#[async_trait]
impl ResponseInterceptor for TrackingInterceptor {
    async fn on_response(&self, call: &CallState, response: &ClientResponse) {
        let outcome = CallOutcome::Success {
            status: response.status,
            headers: Some(HeaderShape::Map(response.headers.clone())),
            body: String::from_utf8(response.body.to_vec()).ok(),
        };
        let record = normalize(
            self.call_site(call),
            outcome,
            Self::started(call),
            call.user_context.clone(),
            &self.limits,
        );
        facade::submit(record).await;
    }

    async fn on_error(&self, call: &CallState, error: &ClientError) {
        let record = normalize(
            self.call_site(call),
            CallOutcome::failure(error),
            Self::started(call),
            call.user_context.clone(),
            &self.limits,
        );
        facade::submit(record).await;
    }
}

/// Register the tracking interceptor pair on a client instance.
///
/// Appends to the existing chains; interceptors already present keep
/// running in their registration order.
pub fn install_tracking(client: &mut TrackedClient) {
    install_tracking_with_limits(client, CaptureLimits::new());
}

/// [`install_tracking`] with an explicit capture policy.
pub fn install_tracking_with_limits(client: &mut TrackedClient, limits: CaptureLimits) {
    let interceptor = Arc::new(TrackingInterceptor {
        base_url: client.base_url.clone(),
        limits,
    });
    client.add_request_interceptor(interceptor.clone());
    client.add_response_interceptor(interceptor);
}
