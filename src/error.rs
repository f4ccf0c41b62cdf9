//! Error types for the instrumented transport stack.
//!
//! `TransportError` covers everything that can go wrong while performing a
//! single exchange: DNS resolution, TCP connect, TLS handshake, the HTTP
//! exchange itself, timeouts, and malformed requests. Instrumentation layers
//! never produce a `TransportError` of their own; they pass the base
//! transport's error through verbatim.
//!
//! `RegistrationError` covers metric definition and registration failures at
//! client construction time.

use std::io;
use std::time::Duration;

/// Errors produced by a transport while performing one request.
///
/// Each variant maps to a distinct phase of the exchange, so callers can
/// tell a resolution failure from a refused connection or a handshake
/// problem without string matching.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// DNS resolution for the request host failed.
    #[error("DNS resolution failed for {host}: {source}")]
    Dns {
        /// Host name that could not be resolved.
        host: String,
        #[source]
        source: io::Error,
    },

    /// No resolved address accepted a TCP connection.
    #[error("failed to connect to {authority}: {source}")]
    Connect {
        /// `host:port` the transport attempted to reach.
        authority: String,
        #[source]
        source: io::Error,
    },

    /// The TLS handshake with the server failed.
    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        /// Server name presented during the handshake.
        host: String,
        #[source]
        source: io::Error,
    },

    /// The overall exchange exceeded the client's deadline.
    #[error("request timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The redirect chain exceeded the client's configured limit.
    #[error("stopped after {limit} redirects")]
    TooManyRedirects {
        /// Maximum number of redirects the client allows.
        limit: usize,
    },

    /// The HTTP exchange failed after the connection was established.
    #[error("HTTP exchange failed: {0}")]
    Http(#[from] hyper::Error),

    /// The request cannot be sent as constructed (bad scheme, missing host,
    /// unencodable header).
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Human-readable description of the defect.
        reason: String,
    },
}

/// A metric definition or registration was rejected at setup time.
///
/// Surfaced by the client factory when a metric set with identical
/// namespace, subsystem, name, and label values is already registered, or
/// when an instrument definition itself is invalid. Fatal to the factory
/// call; the caller gets no client.
#[derive(Debug, thiserror::Error)]
#[error("metric registration failed: {source}")]
pub struct RegistrationError {
    #[from]
    source: prometheus::Error,
}

impl RegistrationError {
    /// True when the failure was a duplicate registration rather than an
    /// invalid definition.
    pub fn is_already_registered(&self) -> bool {
        matches!(self.source, prometheus::Error::AlreadyReg)
    }
}

/// Invalid configuration read from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable was set to a value of the wrong shape.
    #[error("{variable} must be a positive integer, got '{value}'")]
    InvalidValue {
        /// Name of the offending variable.
        variable: &'static str,
        /// The value as found in the environment.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_messages_name_the_phase() {
        let err = TransportError::Dns {
            host: "api.example.com".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such host"),
        };
        assert!(err.to_string().contains("api.example.com"));

        let err = TransportError::Connect {
            authority: "10.0.0.1:443".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.to_string().contains("10.0.0.1:443"));
    }

    #[test]
    fn registration_error_distinguishes_duplicates() {
        let dup = RegistrationError::from(prometheus::Error::AlreadyReg);
        assert!(dup.is_already_registered());

        let invalid = RegistrationError::from(prometheus::Error::Msg("bad name".to_string()));
        assert!(!invalid.is_already_registered());
    }
}
