//! Middleware context injector.
//!
//! [`wrap`] turns a handler into one that resolves a [`UserContext`]
//! for the incoming request, runs the handler inside a request context
//! scope (so every outbound call made downstream picks the identity up
//! implicitly), and serializes the resolved identity into a response
//! header for cross-boundary handoffs: a downstream handler running in
//! a different execution context recovers it with
//! [`extract_from_header`].
//!
//! Resolver failures are host-application bugs and propagate; a
//! malformed context header on the receiving side is treated as "no
//! context".
//!
//! # Example
//!
//! ```ignore
//! use outboundiq_http::middleware::{handler, wrap, InjectorOptions};
//!
//! let inner = handler(|_req| async {
//!     Ok(http::Response::builder()
//!         .status(200)
//!         .body(http_body_util::Full::new(bytes::Bytes::from("ok")))?)
//! });
//!
//! let wrapped = wrap(
//!     inner,
//!     InjectorOptions::new().exclude_pattern("/health"),
//! );
//! ```

use bytes::Bytes;
use http::header::{HeaderValue, AUTHORIZATION, COOKIE};
use http::{HeaderMap, Method, Request, Uri};
use http_body_util::Full;
use outboundiq_core::context::{self, RequestContext};
use outboundiq_core::{ContextKind, UserContext};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Response header carrying the resolved identity across execution
/// boundaries (e.g. edge middleware to a serverless function).
pub const CONTEXT_HEADER: &str = "x-outboundiq-user-context";

/// Identity headers consulted by the default resolver.
const USER_ID_HEADERS: &[&str] = &["x-user-id", "x-authenticated-user"];

/// Session cookie names of the supported auth providers (Clerk,
/// NextAuth).
const SESSION_COOKIE_NAMES: &[&str] = &[
    "__session",
    "next-auth.session-token",
    "__Secure-next-auth.session-token",
];

/// Boxed error for handler and resolver failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Response type produced by wrapped handlers.
pub type Response = http::Response<Full<Bytes>>;

/// Boxed handler future.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>>;

/// A boxed request handler, shareable across the middleware chain.
pub type Handler = Arc<dyn Fn(Request<Bytes>) -> HandlerFuture + Send + Sync>;

/// Box a closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, BoxError>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// The parts of an incoming request a resolver may inspect.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl InboundRequest {
    fn of<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
        }
    }

    /// Request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// A header value as UTF-8 text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Boxed resolver future.
pub type ResolverFuture = Pin<Box<dyn Future<Output = Result<Option<UserContext>, BoxError>> + Send>>;

/// User-context resolver invoked once per non-excluded request.
pub type ContextResolver = Arc<dyn Fn(InboundRequest) -> ResolverFuture + Send + Sync>;

/// Options for [`wrap`].
#[derive(Clone, Default)]
pub struct InjectorOptions {
    resolver: Option<ContextResolver>,
    exclude_patterns: Vec<String>,
}

impl InjectorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply a custom resolver. Errors it returns propagate to the
    /// caller of the wrapped handler.
    pub fn resolver<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(InboundRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<UserContext>, BoxError>> + Send + 'static,
    {
        self.resolver = Some(Arc::new(move |req| Box::pin(f(req))));
        self
    }

    /// Bypass context handling for paths containing this substring.
    pub fn exclude_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Bypass context handling for paths containing any of these
    /// substrings.
    pub fn exclude_patterns(
        mut self,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.exclude_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.exclude_patterns.iter().any(|p| path.contains(p))
    }
}

/// Wrap a handler with context resolution, scope establishment, and
/// header injection.
///
/// Excluded paths call the inner handler directly. Otherwise the
/// resolver runs (default resolver when none is supplied), a request
/// context scope is established around the inner handler, and on a
/// successful response the resolved identity is serialized into
/// [`CONTEXT_HEADER`].
pub fn wrap(inner: Handler, options: InjectorOptions) -> Handler {
    let options = Arc::new(options);
    Arc::new(move |req: Request<Bytes>| {
        let inner = Arc::clone(&inner);
        let options = Arc::clone(&options);
        Box::pin(async move {
            if options.is_excluded(req.uri().path()) {
                return inner(req).await;
            }

            let view = InboundRequest::of(&req);
            let resolved = match &options.resolver {
                Some(resolver) => resolver(view).await?,
                None => Some(default_user_context(&view)),
            };

            let ctx = RequestContext::new(resolved.clone(), None);
            let mut response = context::scope(ctx, inner(req)).await?;

            if let Some(user_context) = resolved {
                inject_context_header(response.headers_mut(), &user_context);
            }
            Ok(response)
        }) as HandlerFuture
    })
}

/// Serialize an identity into the context header. Serialization or
/// header-value failures are swallowed; propagation is best-effort.
fn inject_context_header(headers: &mut HeaderMap, user_context: &UserContext) {
    let Ok(json) = serde_json::to_string(user_context) else {
        return;
    };
    match HeaderValue::from_str(&json) {
        Ok(value) => {
            headers.insert(CONTEXT_HEADER, value);
        }
        Err(err) => {
            tracing::debug!("Context header not injectable: {}", err);
        }
    }
}

/// Recover an identity previously injected by [`wrap`].
///
/// Returns `None` on a missing header, non-UTF-8 value, or malformed
/// JSON; never errors.
pub fn extract_from_header(headers: &HeaderMap) -> Option<UserContext> {
    let value = headers.get(CONTEXT_HEADER)?;
    let text = value.to_str().ok()?;
    serde_json::from_str(text).ok()
}

/// The built-in resolver.
///
/// - `user_id` from `x-user-id` or `x-authenticated-user`.
/// - Auth signals: either identity header, a known session cookie, or
///   a generic `authorization` header.
/// - `api` when the path is under `/api` and an authorization header is
///   present; otherwise `authenticated` when any signal is present;
///   otherwise `anonymous` (with no user id).
/// - Always attaches `{path, method}` metadata.
pub fn default_user_context(req: &InboundRequest) -> UserContext {
    let user_id = USER_ID_HEADERS.iter().find_map(|name| req.header(name));
    let has_authorization = req.headers.contains_key(AUTHORIZATION);
    let has_session_cookie = has_session_cookie(&req.headers);
    let has_signal = user_id.is_some() || has_authorization || has_session_cookie;

    let kind = if req.path().starts_with("/api") && has_authorization {
        ContextKind::Api
    } else if has_signal {
        ContextKind::Authenticated
    } else {
        ContextKind::Anonymous
    };

    UserContext {
        user_id: match kind {
            ContextKind::Anonymous => None,
            _ => user_id.map(str::to_string),
        },
        user_type: None,
        kind,
        metadata: None,
    }
    .with_metadata("path", req.path())
    .with_metadata("method", req.method.as_str())
}

fn has_session_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.split('=').next())
        .any(|name| SESSION_COOKIE_NAMES.contains(&name.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(method: &str, uri: &str, headers: &[(&str, &str)]) -> InboundRequest {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        InboundRequest {
            method: method.parse().unwrap(),
            uri: uri.parse().unwrap(),
            headers: map,
        }
    }

    fn ok_handler() -> Handler {
        handler(|_req| async {
            Ok(http::Response::builder()
                .status(200)
                .body(Full::new(Bytes::from("ok")))
                .unwrap())
        })
    }

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<Bytes> {
        let mut builder = Request::builder().method("GET").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[test]
    fn test_no_signal_resolves_anonymous() {
        let ctx = default_user_context(&inbound("GET", "/users", &[]));
        assert_eq!(ctx.kind, ContextKind::Anonymous);
        assert!(ctx.user_id.is_none());
    }

    #[test]
    fn test_identity_header_resolves_authenticated() {
        let ctx = default_user_context(&inbound("GET", "/users", &[("x-user-id", "u-1")]));
        assert_eq!(ctx.kind, ContextKind::Authenticated);
        assert_eq!(ctx.user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn test_alternate_identity_header() {
        let ctx =
            default_user_context(&inbound("GET", "/users", &[("x-authenticated-user", "u-2")]));
        assert_eq!(ctx.user_id.as_deref(), Some("u-2"));
        assert_eq!(ctx.kind, ContextKind::Authenticated);
    }

    #[test]
    fn test_session_cookie_resolves_authenticated() {
        for cookie in [
            "__session=abc",
            "next-auth.session-token=abc",
            "__Secure-next-auth.session-token=abc; theme=dark",
            "theme=dark; __session=abc",
        ] {
            let ctx = default_user_context(&inbound("GET", "/users", &[("cookie", cookie)]));
            assert_eq!(ctx.kind, ContextKind::Authenticated, "cookie: {}", cookie);
            assert!(ctx.user_id.is_none());
        }
    }

    #[test]
    fn test_unrelated_cookie_stays_anonymous() {
        let ctx = default_user_context(&inbound("GET", "/users", &[("cookie", "theme=dark")]));
        assert_eq!(ctx.kind, ContextKind::Anonymous);
    }

    #[test]
    fn test_authorization_on_api_path_resolves_api() {
        let ctx = default_user_context(&inbound(
            "GET",
            "/api/data",
            &[("authorization", "Bearer tok")],
        ));
        assert_eq!(ctx.kind, ContextKind::Api);
    }

    #[test]
    fn test_authorization_off_api_path_resolves_authenticated() {
        let ctx = default_user_context(&inbound(
            "GET",
            "/dashboard",
            &[("authorization", "Bearer tok")],
        ));
        assert_eq!(ctx.kind, ContextKind::Authenticated);
    }

    #[test]
    fn test_api_path_without_authorization_is_not_api() {
        let ctx = default_user_context(&inbound("GET", "/api/data", &[("x-user-id", "u-1")]));
        assert_eq!(ctx.kind, ContextKind::Authenticated);
    }

    #[test]
    fn test_metadata_carries_path_and_method() {
        let ctx = default_user_context(&inbound("POST", "/users?x=1", &[]));
        let meta = ctx.metadata.unwrap();
        assert_eq!(meta.get("path"), Some(&serde_json::json!("/users")));
        assert_eq!(meta.get("method"), Some(&serde_json::json!("POST")));
    }

    #[tokio::test]
    async fn test_round_trip_through_response_header() {
        let wrapped = wrap(ok_handler(), InjectorOptions::new());
        let response = wrapped(request("/dashboard", &[("x-user-id", "u-9")]))
            .await
            .unwrap();

        let extracted = extract_from_header(response.headers()).unwrap();
        let expected = default_user_context(&inbound(
            "GET",
            "/dashboard",
            &[("x-user-id", "u-9")],
        ));
        assert_eq!(extracted, expected);
    }

    #[tokio::test]
    async fn test_excluded_path_bypasses_injection() {
        let wrapped = wrap(
            ok_handler(),
            InjectorOptions::new().exclude_pattern("/health"),
        );
        let response = wrapped(request("/health/live", &[])).await.unwrap();
        assert!(response.headers().get(CONTEXT_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_handler_observes_scope() {
        let inner = handler(|_req| async {
            let user = context::current_user_context().expect("scope should be active");
            Ok(http::Response::builder()
                .status(200)
                .body(Full::new(Bytes::from(user.user_id.unwrap_or_default())))
                .unwrap())
        });
        let wrapped = wrap(inner, InjectorOptions::new());
        let response = wrapped(request("/x", &[("x-user-id", "seen")])).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_custom_resolver_error_propagates() {
        let wrapped = wrap(
            ok_handler(),
            InjectorOptions::new().resolver(|_req| async {
                Err::<Option<UserContext>, BoxError>("session store down".into())
            }),
        );
        let result = wrapped(request("/x", &[])).await;
        assert_eq!(result.err().unwrap().to_string(), "session store down");
    }

    #[tokio::test]
    async fn test_custom_resolver_none_skips_header() {
        let wrapped = wrap(
            ok_handler(),
            InjectorOptions::new().resolver(|_req| async { Ok(None) }),
        );
        let response = wrapped(request("/x", &[])).await.unwrap();
        assert!(response.headers().get(CONTEXT_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_custom_resolver_value_is_injected() {
        let wrapped = wrap(
            ok_handler(),
            InjectorOptions::new().resolver(|_req| async {
                Ok(Some(UserContext::authenticated("custom").with_user_type("admin")))
            }),
        );
        let response = wrapped(request("/x", &[])).await.unwrap();
        let extracted = extract_from_header(response.headers()).unwrap();
        assert_eq!(extracted.user_id.as_deref(), Some("custom"));
        assert_eq!(extracted.user_type.as_deref(), Some("admin"));
    }

    #[test]
    fn test_extract_from_malformed_header_is_none() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTEXT_HEADER, "not json".parse().unwrap());
        assert!(extract_from_header(&headers).is_none());

        let empty = HeaderMap::new();
        assert!(extract_from_header(&empty).is_none());
    }
}
