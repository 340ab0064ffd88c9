//! Header redaction and body truncation.
//!
//! Every header value and body string passes through this module before
//! leaving the process. Redaction is a security contract: values of
//! known-sensitive headers are replaced with `"[REDACTED]"` rather than
//! transmitted. Truncation bounds the size of captured payloads.

use std::collections::{HashMap, HashSet};

/// Default maximum captured length for a header value or body string,
/// in characters. Values beyond this are truncated with
/// [`TRUNCATION_SUFFIX`] appended.
pub const MAX_CAPTURE_LEN: usize = 60_000;

/// Suffix appended to truncated values.
pub const TRUNCATION_SUFFIX: &str = "...[truncated]";

/// Replacement for sensitive header values.
pub const REDACTED: &str = "[REDACTED]";

/// Header names whose values never leave the process.
const DEFAULT_REDACTED_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
    "api-key",
    "x-amz-security-token",
];

/// Capture policy: maximum value length and the redaction deny-list.
///
/// ```ignore
/// use outboundiq_core::sanitize::CaptureLimits;
///
/// let limits = CaptureLimits::new()
///     .max_len(10_000)
///     .redact_header("x-internal-secret");
/// ```
#[derive(Debug, Clone)]
pub struct CaptureLimits {
    pub(crate) max_len: usize,
    pub(crate) redacted_headers: HashSet<String>,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureLimits {
    /// Defaults: 60,000-character limit and the built-in deny-list.
    pub fn new() -> Self {
        Self {
            max_len: MAX_CAPTURE_LEN,
            redacted_headers: DEFAULT_REDACTED_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }

    /// Set the maximum captured length in characters.
    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Add a header name to the redaction deny-list (case-insensitive).
    pub fn redact_header(mut self, name: impl Into<String>) -> Self {
        self.redacted_headers.insert(name.into().to_lowercase());
        self
    }

    /// Whether values for this header must be redacted.
    pub fn is_redacted(&self, name: &str) -> bool {
        self.redacted_headers.contains(&name.to_lowercase())
    }

    /// Bound a value to the configured length, appending the truncation
    /// suffix when it was cut. Values at or under the limit are returned
    /// unmodified.
    pub fn truncate(&self, value: &str) -> String {
        if value.chars().count() <= self.max_len {
            return value.to_string();
        }
        let mut out: String = value.chars().take(self.max_len).collect();
        out.push_str(TRUNCATION_SUFFIX);
        out
    }

    /// Apply redaction and truncation to a header mapping.
    pub fn sanitize_headers(&self, headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                let clean = if self.is_redacted(name) {
                    REDACTED.to_string()
                } else {
                    self.truncate(value)
                };
                (name.clone(), clean)
            })
            .collect()
    }

    /// Apply truncation to an optional body string.
    pub fn sanitize_body(&self, body: Option<String>) -> Option<String> {
        body.map(|b| self.truncate(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_value_under_limit_unmodified() {
        let limits = CaptureLimits::new().max_len(10);
        assert_eq!(limits.truncate("short"), "short");
        assert_eq!(limits.truncate("exactly10!"), "exactly10!");
    }

    #[test]
    fn test_value_over_limit_truncated_with_suffix() {
        let limits = CaptureLimits::new().max_len(10);
        let out = limits.truncate("this is longer than ten");
        assert_eq!(out, format!("this is lo{}", TRUNCATION_SUFFIX));
        assert_eq!(out.len(), 10 + TRUNCATION_SUFFIX.len());
    }

    #[test]
    fn test_seventy_thousand_chars_truncate_to_60015() {
        let limits = CaptureLimits::new();
        let body = "x".repeat(70_000);
        let out = limits.truncate(&body);
        assert_eq!(out.len(), 60_015);
        assert!(out.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn test_default_deny_list_is_case_insensitive() {
        let limits = CaptureLimits::new();
        assert!(limits.is_redacted("authorization"));
        assert!(limits.is_redacted("Authorization"));
        assert!(limits.is_redacted("COOKIE"));
        assert!(limits.is_redacted("Set-Cookie"));
        assert!(limits.is_redacted("x-api-key"));
        assert!(!limits.is_redacted("content-type"));
    }

    #[test]
    fn test_sanitize_headers_redacts_and_truncates() {
        let limits = CaptureLimits::new().max_len(5);
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Bearer secret".to_string());
        headers.insert("accept".to_string(), "application/json".to_string());
        headers.insert("x-short".to_string(), "ok".to_string());

        let out = limits.sanitize_headers(&headers);
        assert_eq!(out.get("authorization").unwrap(), REDACTED);
        assert_eq!(out.get("accept").unwrap(), &format!("appli{}", TRUNCATION_SUFFIX));
        assert_eq!(out.get("x-short").unwrap(), "ok");
    }

    #[test]
    fn test_custom_deny_entry() {
        let limits = CaptureLimits::new().redact_header("X-Internal-Secret");
        assert!(limits.is_redacted("x-internal-secret"));
    }

    #[test]
    fn test_truncation_counts_chars_not_bytes() {
        let limits = CaptureLimits::new().max_len(3);
        let out = limits.truncate("ééééé");
        assert_eq!(out.chars().count(), 3 + TRUNCATION_SUFFIX.len());
        assert!(out.starts_with("ééé"));
    }

    proptest! {
        #[test]
        fn prop_truncated_length_is_exact(len in 0usize..200, max in 1usize..100) {
            let limits = CaptureLimits::new().max_len(max);
            let value: String = "a".repeat(len);
            let out = limits.truncate(&value);
            if len <= max {
                prop_assert_eq!(out, value);
            } else {
                prop_assert_eq!(out.len(), max + TRUNCATION_SUFFIX.len());
                prop_assert!(out.ends_with(TRUNCATION_SUFFIX));
            }
        }
    }
}
