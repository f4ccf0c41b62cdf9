//! Connection-phase hooks carried per request.
//!
//! A transport that establishes its own connections reports phase progress
//! by invoking these hooks. The phase-trace decorator layer installs an
//! `HttpTrace` into the request's extensions whose hooks observe
//! elapsed-since-request-start into the DNS and TLS histograms; a base
//! transport that finds no trace simply proceeds silently.

use std::fmt;
use std::sync::Arc;

/// Label value recorded when DNS resolution begins.
pub const DNS_START: &str = "dns_start";
/// Label value recorded when DNS resolution finishes (success or failure).
pub const DNS_DONE: &str = "dns_done";
/// Label value recorded when the TLS handshake begins.
pub const TLS_HANDSHAKE_START: &str = "tls_handshake_start";
/// Label value recorded when the TLS handshake finishes (success or failure).
pub const TLS_HANDSHAKE_DONE: &str = "tls_handshake_done";

type PhaseHook = Arc<dyn Fn() + Send + Sync>;

/// Hooks invoked synchronously at connection-phase boundaries.
///
/// Hooks must not block, retry, or fail — they record a value and return.
/// Each hook captures its own notion of elapsed time, so the transport
/// invoking them carries no clock of its own. Cloning shares the hooks.
#[derive(Clone, Default)]
pub struct HttpTrace {
    dns_start: Option<PhaseHook>,
    dns_done: Option<PhaseHook>,
    tls_handshake_start: Option<PhaseHook>,
    tls_handshake_done: Option<PhaseHook>,
}

impl HttpTrace {
    /// A trace with no hooks installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the DNS-lookup-start hook.
    #[must_use]
    pub fn on_dns_start(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.dns_start = Some(Arc::new(hook));
        self
    }

    /// Installs the DNS-lookup-done hook.
    #[must_use]
    pub fn on_dns_done(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.dns_done = Some(Arc::new(hook));
        self
    }

    /// Installs the TLS-handshake-start hook.
    #[must_use]
    pub fn on_tls_handshake_start(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.tls_handshake_start = Some(Arc::new(hook));
        self
    }

    /// Installs the TLS-handshake-done hook.
    #[must_use]
    pub fn on_tls_handshake_done(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.tls_handshake_done = Some(Arc::new(hook));
        self
    }

    /// Signals that DNS resolution is starting.
    pub fn dns_start(&self) {
        if let Some(hook) = &self.dns_start {
            hook();
        }
    }

    /// Signals that DNS resolution finished.
    pub fn dns_done(&self) {
        if let Some(hook) = &self.dns_done {
            hook();
        }
    }

    /// Signals that the TLS handshake is starting.
    pub fn tls_handshake_start(&self) {
        if let Some(hook) = &self.tls_handshake_start {
            hook();
        }
    }

    /// Signals that the TLS handshake finished.
    pub fn tls_handshake_done(&self) {
        if let Some(hook) = &self.tls_handshake_done {
            hook();
        }
    }
}

impl fmt::Debug for HttpTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTrace")
            .field("dns_start", &self.dns_start.is_some())
            .field("dns_done", &self.dns_done.is_some())
            .field("tls_handshake_start", &self.tls_handshake_start.is_some())
            .field("tls_handshake_done", &self.tls_handshake_done.is_some())
            .finish()
    }
}
