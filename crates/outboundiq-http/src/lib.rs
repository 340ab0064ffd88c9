//! # outboundiq-http
//!
//! HTTP adapters for OutboundIQ. Three call-site shapes feed the core
//! pipeline, all normalized into the same record:
//!
//! - [`fetch::tracked_fetch`]: wrap a single outbound call.
//! - [`client::install_tracking`]: interceptor pair for a shared
//!   [`client::TrackedClient`] instance.
//! - [`transport::install_context_resolver`]: hand the ambient-context
//!   getter to a globally patched transport.
//!
//! Plus the inbound side: [`middleware::wrap`] resolves a per-request
//! identity, establishes the context scope around the handler, and
//! propagates the identity across execution boundaries via a response
//! header ([`middleware::extract_from_header`] recovers it).

pub mod client;
pub mod fetch;
pub mod middleware;
pub mod transport;

pub use client::{install_tracking, CallState, ClientError, ClientResponse, TrackedClient};
pub use fetch::{tracked_fetch, FetchError, FetchRequest, FetchResponse};
pub use middleware::{
    default_user_context, extract_from_header, handler, wrap, ContextResolver, Handler,
    InboundRequest, InjectorOptions, CONTEXT_HEADER,
};
pub use transport::install_context_resolver;
