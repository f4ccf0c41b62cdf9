//! Wiregauge — per-recipient Prometheus instrumentation for outbound HTTP.
//!
//! Wraps an HTTP transport in a chain of observational decorators so that
//! every outgoing request and response emits latency, size, and
//! connection-phase metrics without changing the client's functional
//! behavior. Metrics are partitioned per logical destination ("recipient")
//! through a constant label, so one registry can hold independent streams
//! for every downstream service a process talks to.
//!
//! # Usage
//!
//! ```ignore
//! let meter = ClientMeter::new(Client::new(), registry, "app");
//! let billing = meter.for_recipient("billing")?;
//! let response = billing.execute(request).await?;
//! ```
//!
//! # What gets recorded
//!
//! Per completed request: a `(code, method)` completion count, approximate
//! request size, declared response content length, and per-`method`
//! end-to-end duration. Per connection phase: DNS and TLS handshake timings.
//! At all times: an in-flight gauge bracketing the whole exchange.
//!
//! The decorator chain never retries, recovers, or rewrites anything; the
//! base transport's behavior — and its errors — pass through verbatim.

pub mod client;
pub mod error;
pub mod estimate;
pub mod telemetry;
pub mod transport;

pub use client::{Client, ClientMeter, CookieJar, RedirectPolicy, instrument_client_with_const_labels};
pub use error::{ConfigError, RegistrationError, TransportError};
pub use estimate::approximate_request_size;
pub use telemetry::OutgoingMetrics;
pub use transport::{
    DirectTransport, HttpTrace, Transport, TransportConfig, default_transport, instrument,
};
