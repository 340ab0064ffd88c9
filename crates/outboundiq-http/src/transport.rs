//! Transport-level integration.
//!
//! Globally patched transports live in the ingestion client, not here;
//! the one thing they need from this crate is a way to ask "what is the
//! current user context?". [`install_context_resolver`] registers the
//! request context store's getter with the facade's resolver registry
//! so the patch can answer that question per call.

use outboundiq_core::{context, facade};
use std::sync::Arc;

/// Register the ambient-context getter with the facade.
///
/// Idempotent: re-registering replaces the callback with an identical
/// one.
pub fn install_context_resolver() {
    facade::set_user_context_resolver(Arc::new(context::current_user_context));
}

#[cfg(test)]
mod tests {
    use super::*;
    use outboundiq_core::context::RequestContext;
    use outboundiq_core::UserContext;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn test_resolver_reads_ambient_context() {
        facade::reset();
        install_context_resolver();

        assert!(facade::resolve_user_context().is_none());

        let ctx = RequestContext::new(Some(UserContext::authenticated("via-patch")), None);
        context::scope(ctx, async {
            let resolved = facade::resolve_user_context().unwrap();
            assert_eq!(resolved.user_id.as_deref(), Some("via-patch"));
        })
        .await;

        assert!(facade::resolve_user_context().is_none());
        facade::reset();
    }
}
