//! Data types for tracked outbound calls.
//!
//! This module defines the identity attached to a request and the
//! canonical record produced for every captured outbound HTTP call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classification of the identity behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    /// No auth signal was present on the request.
    Anonymous,
    /// A session or identity header was present.
    Authenticated,
    /// An authorization header on an API route.
    Api,
}

/// Identity attached to a request and to every call tracked within it.
///
/// Invariant: `kind` is [`ContextKind::Authenticated`] or
/// [`ContextKind::Api`] whenever `user_id` is set; `Anonymous` implies
/// `user_id` is `None`. The constructors below uphold this; values built
/// by custom resolvers are trusted to do the same.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    /// Stable identifier for the user, if one was resolved.
    pub user_id: Option<String>,

    /// Optional application-defined user classification (e.g. "admin").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,

    /// How the identity was classified.
    #[serde(rename = "context")]
    pub kind: ContextKind,

    /// Free-form attributes attached by the resolver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl UserContext {
    /// An anonymous identity (no user id, no auth signal).
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            user_type: None,
            kind: ContextKind::Anonymous,
            metadata: None,
        }
    }

    /// An authenticated identity.
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            user_type: None,
            kind: ContextKind::Authenticated,
            metadata: None,
        }
    }

    /// An API-caller identity (authorization header on an API route).
    pub fn api(user_id: Option<String>) -> Self {
        Self {
            user_id,
            user_type: None,
            kind: ContextKind::Api,
            metadata: None,
        }
    }

    /// Set the application-defined user type.
    pub fn with_user_type(mut self, user_type: impl Into<String>) -> Self {
        self.user_type = Some(user_type.into());
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Whether any user id was resolved.
    pub fn is_identified(&self) -> bool {
        self.user_id.is_some()
    }
}

/// One tracked outbound HTTP call, ready for ingestion.
///
/// Invariant: `status_code == 0` if and only if `error` is set. A zero
/// status marks a transport-level failure where no response was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    /// Upper-cased HTTP verb.
    pub method: String,

    /// Absolute request URL.
    pub url: String,

    /// Response status, or 0 for a transport failure.
    pub status_code: u16,

    /// Wall-clock duration from issuance to completion, in milliseconds.
    pub duration_ms: f64,

    /// Sanitized request headers, if captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HashMap<String, String>>,

    /// Sanitized response headers, if captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HashMap<String, String>>,

    /// Truncated request body, if captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,

    /// Truncated response body, if captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,

    /// Transport error message. Present exactly when `status_code` is 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Identity active when the call was issued.
    pub user_context: Option<UserContext>,
}

impl ApiCall {
    /// Whether this record describes a transport failure.
    pub fn is_failure(&self) -> bool {
        self.status_code == 0
    }
}
