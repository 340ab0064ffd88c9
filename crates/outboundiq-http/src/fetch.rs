//! Tracked fetch: wrap a single outbound HTTP call.
//!
//! [`tracked_fetch`] issues one call and records it on both outcomes.
//! Request headers and body are captured *before* the call is issued so
//! they survive a transport failure; the response body is buffered once
//! and re-exposed on [`FetchResponse`], leaving the caller's
//! consumption unaffected. A failed call is recorded with status 0 and
//! then re-returned unchanged; tracking never suppresses or alters the
//! underlying call's outcome.
//!
//! # Example
//!
//! ```ignore
//! use outboundiq_http::fetch::{tracked_fetch, FetchRequest};
//!
//! let response = tracked_fetch(
//!     FetchRequest::new("https://api.example.com/users")
//!         .method("POST")
//!         .header("content-type", "application/json")
//!         .text_body(r#"{"name":"ada"}"#),
//! )
//! .await?;
//! assert!(response.is_success());
//! ```

use bytes::Bytes;
use outboundiq_core::facade;
use outboundiq_core::normalize::{normalize, CallOutcome, CallSite, CallUrl, HeaderShape, RequestPayload};
use outboundiq_core::sanitize::CaptureLimits;
use outboundiq_core::UserContext;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;

/// Error type for tracked fetch calls.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The method string is not a valid HTTP method.
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Body serialization failed before the call was issued.
    #[error("body serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// One outbound call, described before it is issued.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    method: Option<String>,
    url: String,
    headers: HashMap<String, String>,
    payload: RequestPayload,
    wire_body: Option<Bytes>,
    user_context: Option<UserContext>,
}

impl FetchRequest {
    /// A request with no explicit method (defaults to GET).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            method: None,
            url: url.into(),
            headers: HashMap::new(),
            payload: RequestPayload::None,
            wire_body: None,
            user_context: None,
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

    /// Send a textual body; captured literally (subject to truncation).
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.wire_body = Some(Bytes::from(body.clone()));
        self.payload = RequestPayload::Text(body);
        self
    }

    /// Serialize a value as the JSON body and set the content type.
    pub fn json_body<T: Serialize>(mut self, value: &T) -> Result<Self, FetchError> {
        let body = serde_json::to_string(value)?;
        self.headers
            .entry("content-type".to_string())
            .or_insert_with(|| "application/json".to_string());
        self.wire_body = Some(Bytes::from(body.clone()));
        self.payload = RequestPayload::Text(body);
        Ok(self)
    }

    /// Send URL-encoded form data; recorded as a placeholder, not
    /// verbatim.
    pub fn form_body(mut self, pairs: &[(&str, &str)]) -> Self {
        let encoded = serde_urlencoded::to_string(pairs).unwrap_or_default();
        self.headers
            .entry("content-type".to_string())
            .or_insert_with(|| "application/x-www-form-urlencoded".to_string());
        self.wire_body = Some(Bytes::from(encoded));
        self.payload = RequestPayload::Form;
        self
    }

    /// Send raw bytes; recorded as a size placeholder, not verbatim.
    pub fn binary_body(mut self, body: Bytes) -> Self {
        self.payload = RequestPayload::Binary(body.len());
        self.wire_body = Some(body);
        self
    }

    /// Attach a per-call identity, overriding the ambient request
    /// context for this record.
    pub fn user_context(mut self, user_context: UserContext) -> Self {
        self.user_context = Some(user_context);
        self
    }

    fn call_site(&self) -> CallSite {
        CallSite {
            method: self.method.clone(),
            url: CallUrl::Absolute(self.url.clone()),
            request_headers: Some(HeaderShape::Plain(self.headers.clone())),
            request_body: self.payload.clone(),
        }
    }
}

/// A fully buffered response.
///
/// The body was read once during capture; a read failure leaves it
/// empty rather than failing the call.
#[derive(Debug)]
pub struct FetchResponse {
    status: u16,
    headers: http::HeaderMap,
    body: Bytes,
}

impl FetchResponse {
    /// Numeric response status.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
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

fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(reqwest::Client::new)
}

/// Issue the call and record it, on success and on failure alike.
pub async fn tracked_fetch(request: FetchRequest) -> Result<FetchResponse, FetchError> {
    tracked_fetch_with_limits(request, &CaptureLimits::new()).await
}

/// [`tracked_fetch`] with an explicit capture policy.
pub async fn tracked_fetch_with_limits(
    request: FetchRequest,
    limits: &CaptureLimits,
) -> Result<FetchResponse, FetchError> {
    facade::ensure_initialized();

    // Capture request data before issuing so it survives a failure.
    let site = request.call_site();
    let user_context = request.user_context.clone();
    let started = Instant::now();

    match issue(request).await {
        Ok(response) => {
            let outcome = CallOutcome::Success {
                status: response.status,
                headers: Some(HeaderShape::Map(response.headers.clone())),
                body: String::from_utf8(response.body.to_vec()).ok(),
            };
            let record = normalize(site, outcome, started, user_context, limits);
            facade::submit(record).await;
            Ok(response)
        }
        Err(err) => {
            let record = normalize(
                site,
                CallOutcome::failure(&err),
                started,
                user_context,
                limits,
            );
            facade::submit(record).await;
            Err(err)
        }
    }
}

async fn issue(request: FetchRequest) -> Result<FetchResponse, FetchError> {
    let method = match &request.method {
        Some(m) => http::Method::from_bytes(m.to_uppercase().as_bytes())
            .map_err(|_| FetchError::InvalidMethod(m.clone()))?,
        None => http::Method::GET,
    };

    let mut builder = http_client().request(method, &request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.wire_body {
        builder = builder.body(body);
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
    Ok(FetchResponse {
        status,
        headers,
        body,
    })
}
