//! Metric definitions for outgoing HTTP traffic.
//!
//! The one exported type, [`OutgoingMetrics`], bundles every instrument an
//! instrumented client observes into and registers with a
//! `prometheus::Registry` as a single composite collector.

pub mod outgoing;

pub use outgoing::{DNS_BUCKETS, OutgoingMetrics, SIZE_BUCKETS, TLS_BUCKETS};
