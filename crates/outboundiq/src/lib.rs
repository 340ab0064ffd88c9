//! # OutboundIQ
//!
//! Outbound HTTP call tracking for Rust web applications.
//!
//! OutboundIQ captures every outbound HTTP call made while handling a
//! request, tags it with the request's user identity, and delivers the
//! records to an ingestion endpoint, with delivery semantics tuned for
//! serverless and edge runtimes that may suspend the process the moment
//! a response is produced.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use outboundiq::prelude::*;
//!
//! // Wrap your handler: identity is resolved per request and made
//! // ambient for everything the handler awaits.
//! let wrapped = wrap(
//!     handler(my_handler),
//!     InjectorOptions::new().exclude_pattern("/health"),
//! );
//!
//! async fn my_handler(
//!     _req: http::Request<bytes::Bytes>,
//! ) -> Result<Response, BoxError> {
//!     // Tracked automatically, tagged with this request's identity.
//!     let data = tracked_fetch(FetchRequest::new("https://api.example.com/data")).await?;
//!     Ok(http::Response::builder()
//!         .status(200)
//!         .body(http_body_util::Full::new(data.bytes().clone()))?)
//! }
//! ```
//!
//! Configuration comes from `OUTBOUNDIQ_*` environment variables; a
//! missing `OUTBOUNDIQ_API_KEY` disables tracking without affecting the
//! host application.
//!
//! ## Crates
//!
//! - `outboundiq-core`: context propagation, normalization,
//!   sanitization, ingestion facade.
//! - `outboundiq-http`: tracked fetch, interceptor client,
//!   middleware injector.
//!
//! This crate re-exports both.

// Re-export core functionality
pub use outboundiq_core::*;

// Re-export the HTTP adapters
pub use outboundiq_http::*;

/// Prelude module - import everything you need with `use outboundiq::prelude::*`
pub mod prelude {
    // Identity and records
    pub use outboundiq_core::{ApiCall, ContextKind, UserContext};

    // Context propagation primitives
    pub use outboundiq_core::context::{
        current, current_user_context, scope, set_current_user_context, RequestContext,
    };

    // Facade surface
    pub use outboundiq_core::facade::{
        ensure_initialized, flush, init_edge, shutdown, shutdown_on_terminate, track,
        EdgeOverrides,
    };

    // Configuration
    pub use outboundiq_core::{load_dotenv, CaptureLimits, TrackingConfig};

    // Call-site wrappers
    pub use outboundiq_http::client::{install_tracking, CallState, TrackedClient};
    pub use outboundiq_http::fetch::{tracked_fetch, FetchRequest, FetchResponse};
    pub use outboundiq_http::middleware::{
        extract_from_header, handler, wrap, BoxError, Handler, InjectorOptions, Response,
    };
    pub use outboundiq_http::transport::install_context_resolver;
}
