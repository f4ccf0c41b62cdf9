//! The metric decorator chain.
//!
//! [`instrument`] wraps a base transport in six observational layers, each
//! recording one dimension of the request lifecycle. Nesting order is fixed:
//! the in-flight gauge sits outermost so it brackets all other work, and the
//! duration layer sits innermost so it times only the base transport.
//!
//! Every layer passes the request, the response, and any error through
//! unmodified. The in-flight and duration layers record through drop guards,
//! so a caller that drops the composed future mid-request (deadline, task
//! abort) still decrements the gauge and still gets exactly one duration
//! observation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use prometheus::{Histogram, HistogramVec, IntCounterVec, IntGauge};

use crate::error::TransportError;
use crate::estimate::{approximate_request_size, parse_content_length};
use crate::telemetry::OutgoingMetrics;
use crate::transport::Transport;
use crate::transport::trace::{self, HttpTrace};

/// Composes the full decorator chain around `base`.
///
/// The returned transport has the same functional semantics as `base`; it
/// differs only by the observations recorded into `metrics`.
pub fn instrument(base: Arc<dyn Transport>, metrics: &OutgoingMetrics) -> Arc<dyn Transport> {
    let duration = Arc::new(DurationLayer {
        duration: metrics.duration.clone(),
        next: base,
    });
    let response_length = Arc::new(ResponseLengthLayer {
        content_length: metrics.response_content_length.clone(),
        next: duration,
    });
    let request_size = Arc::new(RequestSizeLayer {
        request_size: metrics.request_size.clone(),
        next: response_length,
    });
    let phase_trace = Arc::new(PhaseTraceLayer {
        dns_duration: metrics.dns_duration.clone(),
        tls_duration: metrics.tls_duration.clone(),
        next: request_size,
    });
    let completion = Arc::new(CompletionLayer {
        requests: metrics.requests.clone(),
        next: phase_trace,
    });
    Arc::new(InFlightLayer {
        in_flight: metrics.in_flight.clone(),
        next: completion,
    })
}

fn method_label(request: &Request<Bytes>) -> String {
    request.method().as_str().to_ascii_lowercase()
}

// ─────────────────────────────────────────────────────────────────────────────
// In-flight gauge (outermost)
// ─────────────────────────────────────────────────────────────────────────────

struct InFlightLayer {
    in_flight: IntGauge,
    next: Arc<dyn Transport>,
}

/// Increments on entry, decrements on drop. The decrement runs on every exit
/// path, including cancellation of the enclosing future.
struct InFlightGuard {
    in_flight: IntGauge,
}

impl InFlightGuard {
    fn enter(in_flight: IntGauge) -> Self {
        in_flight.inc();
        Self { in_flight }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.dec();
    }
}

#[async_trait]
impl Transport for InFlightLayer {
    async fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let _guard = InFlightGuard::enter(self.in_flight.clone());
        self.next.round_trip(request).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion counter
// ─────────────────────────────────────────────────────────────────────────────

struct CompletionLayer {
    requests: IntCounterVec,
    next: Arc<dyn Transport>,
}

#[async_trait]
impl Transport for CompletionLayer {
    async fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let method = method_label(&request);
        let result = self.next.round_trip(request).await;
        // Failures carry no status code and are not counted as completions.
        if let Ok(response) = &result {
            self.requests
                .with_label_values(&[response.status().as_str(), &method])
                .inc();
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-phase trace
// ─────────────────────────────────────────────────────────────────────────────

struct PhaseTraceLayer {
    dns_duration: HistogramVec,
    tls_duration: HistogramVec,
    next: Arc<dyn Transport>,
}

#[async_trait]
impl Transport for PhaseTraceLayer {
    async fn round_trip(
        &self,
        mut request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let start = Instant::now();
        let trace = HttpTrace::new()
            .on_dns_start(phase_hook(
                self.dns_duration.with_label_values(&[trace::DNS_START]),
                start,
            ))
            .on_dns_done(phase_hook(
                self.dns_duration.with_label_values(&[trace::DNS_DONE]),
                start,
            ))
            .on_tls_handshake_start(phase_hook(
                self.tls_duration
                    .with_label_values(&[trace::TLS_HANDSHAKE_START]),
                start,
            ))
            .on_tls_handshake_done(phase_hook(
                self.tls_duration
                    .with_label_values(&[trace::TLS_HANDSHAKE_DONE]),
                start,
            ));
        // The chain owns the trace; anything installed upstream is replaced.
        request.extensions_mut().insert(trace);
        self.next.round_trip(request).await
    }
}

fn phase_hook(histogram: Histogram, start: Instant) -> impl Fn() + Send + Sync + 'static {
    move || histogram.observe(start.elapsed().as_secs_f64())
}

// ─────────────────────────────────────────────────────────────────────────────
// Request size
// ─────────────────────────────────────────────────────────────────────────────

struct RequestSizeLayer {
    request_size: HistogramVec,
    next: Arc<dyn Transport>,
}

#[async_trait]
impl Transport for RequestSizeLayer {
    async fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let method = method_label(&request);
        let size = approximate_request_size(&request) as f64;
        let result = self.next.round_trip(request).await;
        if let Ok(response) = &result {
            self.request_size
                .with_label_values(&[response.status().as_str(), &method])
                .observe(size);
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response content length
// ─────────────────────────────────────────────────────────────────────────────

struct ResponseLengthLayer {
    content_length: HistogramVec,
    next: Arc<dyn Transport>,
}

#[async_trait]
impl Transport for ResponseLengthLayer {
    async fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let method = method_label(&request);
        let result = self.next.round_trip(request).await;
        if let Ok(response) = &result {
            // An absent Content-Length observes as -1; existing consumers
            // depend on seeing that sentinel in the stream.
            let length = parse_content_length(response.headers())
                .map(|value| value as f64)
                .unwrap_or(-1.0);
            self.content_length
                .with_label_values(&[response.status().as_str(), &method])
                .observe(length);
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Duration (innermost)
// ─────────────────────────────────────────────────────────────────────────────

struct DurationLayer {
    duration: HistogramVec,
    next: Arc<dyn Transport>,
}

/// Observes elapsed time on drop, which runs once on every exit path:
/// success, failure, or cancellation of the enclosing future.
struct DurationGuard {
    duration: Histogram,
    start: Instant,
}

impl Drop for DurationGuard {
    fn drop(&mut self) {
        self.duration.observe(self.start.elapsed().as_secs_f64());
    }
}

#[async_trait]
impl Transport for DurationLayer {
    async fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let _guard = DurationGuard {
            duration: self.duration.with_label_values(&[&method_label(&request)]),
            start: Instant::now(),
        };
        self.next.round_trip(request).await
    }
}
