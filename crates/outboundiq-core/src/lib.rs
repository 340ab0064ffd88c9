//! # outboundiq-core
//!
//! Core tracking pipeline for OutboundIQ: capture outbound HTTP calls
//! made while handling a request, attach the request's identity to
//! them, and deliver them to an ingestion endpoint.
//!
//! The crate has two load-bearing pieces:
//!
//! - **Request-scoped context propagation** ([`context`]): a
//!   `tokio::task_local!`-backed store that threads a per-request
//!   identity through asynchronous, framework-dispatched code without
//!   explicit parameter passing.
//! - **The call-tracking pipeline** ([`normalize`] + [`sanitize`] +
//!   [`facade`]): heterogeneous call sites are normalized into one
//!   canonical [`data::ApiCall`] record, scrubbed of sensitive headers,
//!   bounded in size, and handed to the ingestion client with the flush
//!   awaited; the host may be a serverless runtime that suspends the
//!   process the moment a response is produced.
//!
//! HTTP-side adapters (tracked fetch, interceptors, middleware) live in
//! the `outboundiq-http` crate; `outboundiq` is the umbrella crate most
//! applications depend on.

pub mod config;
pub mod context;
pub mod data;
pub mod facade;
pub mod ingest;
pub mod normalize;
pub mod sanitize;

pub use config::{load_dotenv, TrackingConfig, DEFAULT_ENDPOINT};
pub use context::RequestContext;
pub use data::{ApiCall, ContextKind, UserContext};
pub use facade::EdgeOverrides;
pub use ingest::{HttpIngestClient, IngestClient, IngestError, NullIngestClient};
pub use normalize::{normalize, CallOutcome, CallSite, CallUrl, HeaderShape, RequestPayload};
pub use sanitize::{CaptureLimits, MAX_CAPTURE_LEN, REDACTED, TRUNCATION_SUFFIX};
