//! Request-scoped context propagation.
//!
//! Associates an implicit "current request" identity with all code
//! executing within that request's asynchronous call tree, without
//! threading a context parameter through every signature. Built on
//! `tokio::task_local!`: everything awaited inside [`scope`] observes
//! the same [`RequestContext`] instance, and sibling scopes are fully
//! isolated from each other.
//!
//! Absence of an active scope is a normal condition everywhere in this
//! module; no function here panics or returns an error for it.
//!
//! # Example
//!
//! ```ignore
//! use outboundiq_core::context::{self, RequestContext};
//! use outboundiq_core::data::UserContext;
//!
//! let ctx = RequestContext::new(Some(UserContext::authenticated("user-1")), None);
//! context::scope(ctx, async {
//!     // Any code awaited here, however deeply nested, sees the context.
//!     let user = context::current_user_context();
//!     assert!(user.is_some());
//! })
//! .await;
//! ```
//!
//! Task-locals do not cross `tokio::spawn`: work handed to a new task
//! must be wrapped in its own [`scope`] call with the same context.

use crate::data::UserContext;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

tokio::task_local! {
    static ACTIVE: Arc<RequestContext>;
}

/// Per-request scope object held by the context store.
///
/// Created once at the start of request handling; every nested
/// asynchronous operation inherits the same instance by reference. The
/// context is dropped when the scope future and everything it spawned
/// into the scope completes; there is no explicit teardown.
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    started: Instant,
    user_context: Mutex<Option<UserContext>>,
    metadata: Option<HashMap<String, serde_json::Value>>,
}

impl RequestContext {
    /// Create a context with a freshly generated request id.
    pub fn new(
        user_context: Option<UserContext>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            request_id: generate_request_id(),
            started: Instant::now(),
            user_context: Mutex::new(user_context),
            metadata,
        })
    }

    /// The generated request id (`req_<timestamp>_<random>`, base36).
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Elapsed wall-clock time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Snapshot of the identity currently attached to this request.
    pub fn user_context(&self) -> Option<UserContext> {
        self.user_context.lock().ok().and_then(|g| g.clone())
    }

    /// Replace the identity in place.
    ///
    /// Supports deferred assignment: a handler may resolve the user
    /// after the scope was entered (e.g. after session decoding).
    pub fn set_user_context(&self, user_context: UserContext) {
        if let Ok(mut guard) = self.user_context.lock() {
            *guard = Some(user_context);
        }
    }

    /// Metadata attached at creation time.
    pub fn metadata(&self) -> Option<&HashMap<String, serde_json::Value>> {
        self.metadata.as_ref()
    }
}

/// Run `fut` with `context` installed as the current request context.
///
/// Everything the future awaits observes the same context through
/// [`current`]; once the future completes, the scope ends. Concurrent
/// scopes never observe each other's context. Note that `tokio::spawn`
/// starts a fresh task without task-locals; re-wrap spawned futures in
/// `scope` to extend the context across the spawn boundary.
pub async fn scope<F>(context: Arc<RequestContext>, fut: F) -> F::Output
where
    F: Future,
{
    ACTIVE.scope(context, fut).await
}

/// The context of the enclosing [`scope`], or `None` outside any scope.
pub fn current() -> Option<Arc<RequestContext>> {
    ACTIVE.try_with(Arc::clone).ok()
}

/// Identity attached to the current request, if any.
pub fn current_user_context() -> Option<UserContext> {
    current().and_then(|ctx| ctx.user_context())
}

/// Attach an identity to the current request.
///
/// Silently does nothing when no scope is active; a missing scope is a
/// normal condition, not an error.
pub fn set_current_user_context(user_context: UserContext) {
    if let Some(ctx) = current() {
        ctx.set_user_context(user_context);
    }
}

/// Generate a request id: `req_<base36 unix millis>_<7-char base36 random>`.
fn generate_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("req_{}_{}", to_base36(millis), random_base36(7))
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

fn random_base36(len: usize) -> String {
    use rand::Rng;
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| DIGITS[rng.gen_range(0..36)] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ContextKind;

    #[test]
    fn test_request_id_format() {
        let ctx = RequestContext::new(None, None);
        let id = ctx.request_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "req");
        assert!(!parts[1].is_empty());
        assert_eq!(parts[2].len(), 7);
        assert!(parts[2].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::new(None, None);
        let b = RequestContext::new(None, None);
        assert_ne!(a.request_id(), b.request_id());
    }

    #[test]
    fn test_base36_round_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_no_context_outside_scope() {
        assert!(current().is_none());
        assert!(current_user_context().is_none());
        // Must not panic without an active scope.
        set_current_user_context(UserContext::anonymous());
    }

    #[tokio::test]
    async fn test_scope_provides_context() {
        let ctx = RequestContext::new(Some(UserContext::authenticated("u1")), None);
        let id = ctx.request_id().to_string();
        scope(ctx, async move {
            let active = current().expect("context should be active");
            assert_eq!(active.request_id(), id);
            assert_eq!(
                current_user_context().unwrap().user_id.as_deref(),
                Some("u1")
            );
        })
        .await;
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_nested_awaits_see_same_instance() {
        async fn deep() -> Option<String> {
            tokio::task::yield_now().await;
            current().map(|c| c.request_id().to_string())
        }

        let ctx = RequestContext::new(None, None);
        let id = ctx.request_id().to_string();
        let seen = scope(ctx, async { deep().await }).await;
        assert_eq!(seen.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_deferred_user_context_assignment() {
        let ctx = RequestContext::new(None, None);
        scope(ctx, async {
            assert!(current_user_context().is_none());
            set_current_user_context(UserContext::authenticated("late"));
            // The same live entry was mutated, not replaced.
            let user = current_user_context().unwrap();
            assert_eq!(user.user_id.as_deref(), Some("late"));
            assert_eq!(user.kind, ContextKind::Authenticated);
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_scopes_are_isolated() {
        async fn simulated_request(user: &str, rounds: usize) {
            let ctx = RequestContext::new(Some(UserContext::authenticated(user)), None);
            let user = user.to_string();
            scope(ctx, async move {
                for _ in 0..rounds {
                    // Interleave with sibling requests at every await point.
                    tokio::task::yield_now().await;
                    let seen = current_user_context().unwrap();
                    assert_eq!(seen.user_id.as_deref(), Some(user.as_str()));
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    let seen = current_user_context().unwrap();
                    assert_eq!(seen.user_id.as_deref(), Some(user.as_str()));
                }
            })
            .await;
        }

        let a = tokio::spawn(simulated_request("alice", 20));
        let b = tokio::spawn(simulated_request("bob", 20));
        let c = tokio::spawn(simulated_request("carol", 20));
        a.await.unwrap();
        b.await.unwrap();
        c.await.unwrap();
    }

    #[tokio::test]
    async fn test_sequential_scopes_do_not_leak() {
        let first = RequestContext::new(Some(UserContext::authenticated("first")), None);
        scope(first, async {}).await;

        let second = RequestContext::new(None, None);
        scope(second, async {
            assert!(current_user_context().is_none());
        })
        .await;
    }
}
