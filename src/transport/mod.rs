//! Outbound transport layer.
//!
//! This module defines the transport boundary — perform one request, return
//! one response or fail — and everything built on top of it:
//!
//! ```text
//! ┌──────────┐     ┌──────────────────────────────────┐     ┌────────────┐
//! │  Client  │────▶│  instrument() decorator chain    │────▶│  base      │
//! │          │◀────│  [in-flight → counter → trace →  │◀────│  transport │
//! │          │     │   sizes → duration]              │     │            │
//! └──────────┘     └──────────────────────────────────┘     └────────────┘
//! ```
//!
//! The chain is purely observational: requests and responses pass through
//! unchanged, and the base transport's error surfaces verbatim.

pub mod direct;
pub mod layers;
pub mod trace;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};

use crate::error::TransportError;

pub use direct::{DirectTransport, TransportConfig, default_transport};
pub use layers::instrument;
pub use trace::HttpTrace;

/// The transport boundary: perform one request, return one response or fail.
///
/// Implementations must be shareable across tasks; the instrumented client
/// issues concurrent requests against one transport. A transport owns the
/// whole exchange — connection establishment, TLS, request/response framing —
/// and reports connection-phase progress through any [`HttpTrace`] carried in
/// the request's extensions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the request and returns the response, or the first error
    /// encountered along the way.
    async fn round_trip(&self, request: Request<Bytes>)
    -> Result<Response<Bytes>, TransportError>;
}
