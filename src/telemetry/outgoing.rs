//! The outgoing-request metric set.
//!
//! `OutgoingMetrics` owns the seven instruments recorded by the decorator
//! chain: a completion counter, histograms for request size, response
//! content length, end-to-end duration, DNS phase timing, and TLS phase
//! timing, plus the in-flight gauge. All instruments share one namespace,
//! the `http_outgoing` subsystem, and one constant label set, so the streams
//! of two recipients never collide.

use std::collections::HashMap;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

use crate::error::RegistrationError;

/// Subsystem tag carried by every metric in the set.
pub(crate) const SUBSYSTEM_HTTP_OUTGOING: &str = "http_outgoing";

/// Buckets for the request-size and response-content-length histograms,
/// in bytes.
pub const SIZE_BUCKETS: &[f64] = &[100.0, 1000.0, 2000.0, 5000.0, 10000.0];

/// Buckets for DNS phase timings, in seconds.
pub const DNS_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05];

/// Buckets for TLS handshake phase timings, in seconds.
pub const TLS_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5];

/// Instruments for one instrumented client.
///
/// Created once per factory call and registered exactly once; after that
/// only the instruments' internal state changes, driven by observation
/// calls from in-flight requests. Cloning is cheap — instruments are
/// shared handles — and is how the decorator layers and the registry each
/// hold the same set.
///
/// The contained instruments are individually thread-safe; the set adds no
/// synchronization of its own, so scrapes may run concurrently with
/// observations.
#[derive(Clone)]
pub struct OutgoingMetrics {
    /// Completed requests, by `(code, method)`.
    pub(crate) requests: IntCounterVec,
    /// Approximate request size in bytes, by `(code, method)`.
    pub(crate) request_size: HistogramVec,
    /// Declared response content length in bytes, by `(code, method)`.
    pub(crate) response_content_length: HistogramVec,
    /// End-to-end request latency in seconds, by `(method)`.
    pub(crate) duration: HistogramVec,
    /// DNS phase timings in seconds, by `(event)`.
    pub(crate) dns_duration: HistogramVec,
    /// TLS handshake phase timings in seconds, by `(event)`.
    pub(crate) tls_duration: HistogramVec,
    /// Requests started but not yet finished.
    pub(crate) in_flight: IntGauge,
}

impl OutgoingMetrics {
    /// Defines the full instrument set under `namespace` with the given
    /// constant labels.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when an instrument definition is
    /// invalid (malformed namespace or label name).
    pub fn new(
        namespace: &str,
        const_labels: HashMap<String, String>,
    ) -> Result<Self, RegistrationError> {
        let requests = IntCounterVec::new(
            Opts::new(
                "requests_total",
                "A counter for outgoing requests from the wrapped client.",
            )
            .namespace(namespace)
            .subsystem(SUBSYSTEM_HTTP_OUTGOING)
            .const_labels(const_labels.clone()),
            &["code", "method"],
        )?;

        let request_size = HistogramVec::new(
            HistogramOpts::new("request_size_histogram_bytes", "Request size in bytes.")
                .namespace(namespace)
                .subsystem(SUBSYSTEM_HTTP_OUTGOING)
                .const_labels(const_labels.clone())
                .buckets(SIZE_BUCKETS.to_vec()),
            &["code", "method"],
        )?;

        let response_content_length = HistogramVec::new(
            HistogramOpts::new(
                "response_content_length_histogram",
                "Response content length in bytes.",
            )
            .namespace(namespace)
            .subsystem(SUBSYSTEM_HTTP_OUTGOING)
            .const_labels(const_labels.clone())
            .buckets(SIZE_BUCKETS.to_vec()),
            &["code", "method"],
        )?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "request_duration_histogram_seconds",
                "A histogram of outgoing request latencies.",
            )
            .namespace(namespace)
            .subsystem(SUBSYSTEM_HTTP_OUTGOING)
            .const_labels(const_labels.clone())
            .buckets(prometheus::DEFAULT_BUCKETS.to_vec()),
            &["method"],
        )?;

        let dns_duration = HistogramVec::new(
            HistogramOpts::new("dns_duration_histogram_seconds", "Trace dns latency histogram.")
                .namespace(namespace)
                .subsystem(SUBSYSTEM_HTTP_OUTGOING)
                .const_labels(const_labels.clone())
                .buckets(DNS_BUCKETS.to_vec()),
            &["event"],
        )?;

        let tls_duration = HistogramVec::new(
            HistogramOpts::new("tls_duration_histogram_seconds", "Trace tls latency histogram.")
                .namespace(namespace)
                .subsystem(SUBSYSTEM_HTTP_OUTGOING)
                .const_labels(const_labels.clone())
                .buckets(TLS_BUCKETS.to_vec()),
            &["event"],
        )?;

        let in_flight = IntGauge::with_opts(
            Opts::new(
                "in_flight_requests",
                "A gauge of in-flight outgoing requests for the wrapped client.",
            )
            .namespace(namespace)
            .subsystem(SUBSYSTEM_HTTP_OUTGOING)
            .const_labels(const_labels),
        )?;

        Ok(Self {
            requests,
            request_size,
            response_content_length,
            duration,
            dns_duration,
            tls_duration,
            in_flight,
        })
    }

    /// Registers the whole set with `registry` as one composite collector.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when an identically-labeled set is
    /// already registered under the same namespace and subsystem. A set with
    /// different constant label values registers independently.
    pub fn register(&self, registry: &Registry) -> Result<(), RegistrationError> {
        registry.register(Box::new(self.clone()))?;
        Ok(())
    }
}

impl Collector for OutgoingMetrics {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = Vec::with_capacity(7);
        descs.extend(self.duration.desc());
        descs.extend(self.requests.desc());
        descs.extend(self.dns_duration.desc());
        descs.extend(self.tls_duration.desc());
        descs.extend(self.in_flight.desc());
        descs.extend(self.request_size.desc());
        descs.extend(self.response_content_length.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut families = Vec::with_capacity(7);
        families.extend(self.duration.collect());
        families.extend(self.requests.collect());
        families.extend(self.dns_duration.collect());
        families.extend(self.tls_duration.collect());
        families.extend(self.in_flight.collect());
        families.extend(self.request_size.collect());
        families.extend(self.response_content_length.collect());
        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(recipient: &str) -> HashMap<String, String> {
        HashMap::from([("recipient".to_string(), recipient.to_string())])
    }

    #[test]
    fn describes_one_descriptor_per_instrument() {
        let metrics = OutgoingMetrics::new("app", labels("billing")).expect("valid definitions");
        assert_eq!(metrics.desc().len(), 7);
    }

    #[test]
    fn collects_one_family_per_instrument_in_describe_order() {
        let metrics = OutgoingMetrics::new("app", labels("billing")).expect("valid definitions");
        let families = metrics.collect();
        assert_eq!(families.len(), 7);

        let desc_names: Vec<_> = metrics.desc().iter().map(|d| d.fq_name.clone()).collect();
        let family_names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert_eq!(desc_names, family_names);
    }

    #[test]
    fn metric_names_carry_namespace_and_subsystem() {
        let metrics = OutgoingMetrics::new("app", labels("billing")).expect("valid definitions");
        let names: Vec<_> = metrics.desc().iter().map(|d| d.fq_name.clone()).collect();
        assert!(names.contains(&"app_http_outgoing_requests_total".to_string()));
        assert!(names.contains(&"app_http_outgoing_in_flight_requests".to_string()));
        assert!(names.contains(&"app_http_outgoing_request_duration_histogram_seconds".to_string()));
    }

    #[test]
    fn duplicate_registration_fails_distinct_recipient_succeeds() {
        let registry = Registry::new();

        let first = OutgoingMetrics::new("app", labels("billing")).expect("valid definitions");
        first.register(&registry).expect("first registration");

        let duplicate = OutgoingMetrics::new("app", labels("billing")).expect("valid definitions");
        let err = duplicate
            .register(&registry)
            .expect_err("identical labels must collide");
        assert!(err.is_already_registered());

        let other = OutgoingMetrics::new("app", labels("ledger")).expect("valid definitions");
        other
            .register(&registry)
            .expect("distinct recipient registers independently");
    }

    #[test]
    fn registered_set_is_scrapeable_through_the_registry() {
        let registry = Registry::new();
        let metrics = OutgoingMetrics::new("app", labels("billing")).expect("valid definitions");
        metrics.register(&registry).expect("registration");

        metrics.requests.with_label_values(&["200", "get"]).inc();
        metrics.in_flight.inc();

        let families = registry.gather();
        let counter = families
            .iter()
            .find(|f| f.get_name() == "app_http_outgoing_requests_total")
            .expect("counter family");
        let metric = &counter.get_metric()[0];
        assert_eq!(metric.get_counter().get_value(), 1.0);
        assert!(
            metric
                .get_label()
                .iter()
                .any(|l| l.get_name() == "recipient" && l.get_value() == "billing")
        );

        let gauge = families
            .iter()
            .find(|f| f.get_name() == "app_http_outgoing_in_flight_requests")
            .expect("gauge family");
        assert_eq!(gauge.get_metric()[0].get_gauge().get_value(), 1.0);
    }

    #[test]
    fn negative_content_length_observation_is_recorded_unchanged() {
        // Unknown response lengths observe as -1; the histogram accepts it.
        let metrics = OutgoingMetrics::new("app", labels("billing")).expect("valid definitions");
        let histogram = metrics
            .response_content_length
            .with_label_values(&["200", "get"]);
        histogram.observe(-1.0);
        assert_eq!(histogram.get_sample_count(), 1);
        assert_eq!(histogram.get_sample_sum(), -1.0);
    }

    #[test]
    fn bucket_layouts_match_the_wire_contract() {
        assert_eq!(SIZE_BUCKETS, &[100.0, 1000.0, 2000.0, 5000.0, 10000.0]);
        assert_eq!(DNS_BUCKETS, &[0.005, 0.01, 0.025, 0.05]);
        assert_eq!(TLS_BUCKETS, &[0.05, 0.1, 0.25, 0.5]);
    }
}
