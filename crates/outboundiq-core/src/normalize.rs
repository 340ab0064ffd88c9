//! Call normalization: heterogeneous call-site shapes into one record.
//!
//! Outbound calls arrive from several adapter shapes (a wrapped fetch,
//! interceptor hooks on a shared client, the transport patch). Each is
//! expressed as a [`CallSite`] plus a [`CallOutcome`] at the boundary,
//! and [`normalize`] produces the single canonical [`ApiCall`] record.
//! Nothing downstream branches on call-site shape again.

use crate::context;
use crate::data::{ApiCall, UserContext};
use crate::sanitize::CaptureLimits;
use std::collections::HashMap;
use std::time::Instant;

/// Fallback error message for failures that carry no message.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Where the call was addressed.
#[derive(Debug, Clone)]
pub enum CallUrl {
    /// Already absolute.
    Absolute(String),
    /// A client base URL plus a possibly-relative path.
    Parts { base: String, path: String },
}

impl CallUrl {
    /// Resolve to an absolute URL string.
    ///
    /// `Parts` joins base and path with exactly one slash unless the
    /// path is itself already absolute.
    pub fn resolve(&self) -> String {
        match self {
            Self::Absolute(url) => url.clone(),
            Self::Parts { base, path } => {
                if path.starts_with("http://") || path.starts_with("https://") {
                    return path.clone();
                }
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{}/{}", base, path)
            }
        }
    }
}

/// What the caller sent as a request body.
///
/// Structured payloads are recorded as descriptive placeholders rather
/// than serialized verbatim; only text bodies are captured literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
    /// No body.
    None,
    /// A textual body, captured subject to truncation.
    Text(String),
    /// URL-encoded form data.
    Form,
    /// Multipart form data.
    Multipart,
    /// A binary buffer of the given size.
    Binary(usize),
    /// Anything else the adapter could not classify.
    Opaque,
}

impl RequestPayload {
    /// The captured representation, before truncation.
    pub(crate) fn describe(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Text(body) => Some(body.clone()),
            Self::Form => Some("[form data]".to_string()),
            Self::Multipart => Some("[multipart form data]".to_string()),
            Self::Binary(len) => Some(format!("[binary body ({} bytes)]", len)),
            Self::Opaque => Some("[unserializable body]".to_string()),
        }
    }
}

/// The header representations adapters encounter, normalized once here.
///
/// Preference order when a client exposes more than one view:
/// a JSON-serialized view, a native header multimap, a plain mapping.
#[derive(Debug, Clone)]
pub enum HeaderShape {
    /// A JSON object view (string values kept, the rest stringified).
    Json(serde_json::Value),
    /// A native multimap; non-UTF-8 values are skipped.
    Map(http::HeaderMap),
    /// Already a plain mapping.
    Plain(HashMap<String, String>),
}

impl HeaderShape {
    /// Flatten into a plain mapping.
    pub fn into_map(self) -> HashMap<String, String> {
        match self {
            Self::Json(value) => match value {
                serde_json::Value::Object(entries) => entries
                    .into_iter()
                    .map(|(name, v)| {
                        let text = match v {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (name, text)
                    })
                    .collect(),
                _ => HashMap::new(),
            },
            Self::Map(headers) => headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect(),
            Self::Plain(map) => map,
        }
    }
}

/// One outbound call as observed at its call site, captured before the
/// call is issued so request data survives a later transport failure.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// HTTP verb as written at the call site; `None` defaults to GET.
    pub method: Option<String>,
    /// Target URL.
    pub url: CallUrl,
    /// Request headers, if the call site exposed them.
    pub request_headers: Option<HeaderShape>,
    /// Request body classification.
    pub request_body: RequestPayload,
}

/// How the call ended.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    /// A response was received (any status).
    Success {
        status: u16,
        headers: Option<HeaderShape>,
        body: Option<String>,
    },
    /// The transport failed before a response existed.
    Failure { error: String },
}

impl CallOutcome {
    /// Build a failure outcome from any error value.
    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self::Failure {
            error: error.to_string(),
        }
    }
}

/// Produce the canonical tracking record for one completed call.
///
/// `started` is the instant the call was issued; duration is wall-clock
/// elapsed from there. `user_context` is the per-call override; when
/// absent, the ambient request context supplies the identity.
pub fn normalize(
    site: CallSite,
    outcome: CallOutcome,
    started: Instant,
    user_context: Option<UserContext>,
    limits: &CaptureLimits,
) -> ApiCall {
    let method = site
        .method
        .filter(|m| !m.is_empty())
        .map(|m| m.to_uppercase())
        .unwrap_or_else(|| "GET".to_string());
    let url = site.url.resolve();
    let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;

    let request_headers = site
        .request_headers
        .map(|shape| limits.sanitize_headers(&shape.into_map()));
    let request_body = limits.sanitize_body(site.request_body.describe());

    let user_context = user_context.or_else(context::current_user_context);

    match outcome {
        CallOutcome::Success {
            status,
            headers,
            body,
        } => ApiCall {
            method,
            url,
            status_code: status,
            duration_ms,
            request_headers,
            response_headers: headers.map(|shape| limits.sanitize_headers(&shape.into_map())),
            request_body,
            response_body: limits.sanitize_body(body),
            error: None,
            user_context,
        },
        CallOutcome::Failure { error } => ApiCall {
            method,
            url,
            status_code: 0,
            duration_ms,
            request_headers,
            response_headers: None,
            request_body,
            response_body: None,
            error: Some(if error.is_empty() {
                UNKNOWN_ERROR.to_string()
            } else {
                error
            }),
            user_context,
        },
    }
}
