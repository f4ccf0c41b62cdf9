//! The HTTP client and the per-recipient instrumentation factory.
//!
//! [`Client`] bundles a transport with the behavioral settings that survive
//! instrumentation: redirect policy, cookie jar, and overall timeout.
//! [`ClientMeter`] is the public entry point: it derives, from one base
//! client, an independently instrumented client per recipient, each with its
//! own registered metric set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, COOKIE, HOST, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use prometheus::Registry;
use tracing::debug;
use url::Url;

use crate::error::{RegistrationError, TransportError};
use crate::telemetry::OutgoingMetrics;
use crate::transport::{Transport, default_transport, instrument};

/// How the client reacts to 3xx responses carrying a `Location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Follow redirects, up to the given number of hops.
    Limited(usize),
    /// Return redirect responses to the caller unfollowed.
    None,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        RedirectPolicy::Limited(10)
    }
}

/// Cookie storage consulted around each exchange.
///
/// Externally owned; the client only asks for a `Cookie` header before
/// sending and hands over `Set-Cookie` values after receiving.
pub trait CookieJar: Send + Sync {
    /// The `Cookie` header value to attach for `uri`, if any.
    fn cookies(&self, uri: &Uri) -> Option<HeaderValue>;

    /// Stores the `Set-Cookie` values received from `uri`.
    fn set_cookies(&self, uri: &Uri, set_cookie: &[HeaderValue]);
}

/// An outbound HTTP client.
///
/// Cloning shares the transport and cookie jar. The instrumentation factory
/// never mutates a client; it builds new ones around the same settings.
#[derive(Clone, Default)]
pub struct Client {
    transport: Option<Arc<dyn Transport>>,
    redirect: RedirectPolicy,
    jar: Option<Arc<dyn CookieJar>>,
    timeout: Option<Duration>,
}

impl Client {
    /// A client with the default transport, redirect policy, no cookie jar,
    /// and no timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the redirect policy.
    #[must_use]
    pub fn with_redirect(mut self, redirect: RedirectPolicy) -> Self {
        self.redirect = redirect;
        self
    }

    /// Installs a cookie jar.
    #[must_use]
    pub fn with_cookie_jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Sets the overall deadline for one `execute` call, redirects included.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The transport requests go through: the configured one, or the shared
    /// default when none is set.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone().unwrap_or_else(default_transport)
    }

    /// The configured redirect policy.
    pub fn redirect_policy(&self) -> RedirectPolicy {
        self.redirect
    }

    /// The configured overall timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Performs a request, following redirects per the configured policy and
    /// applying the cookie jar around each hop.
    ///
    /// # Errors
    ///
    /// Returns the transport's error verbatim, [`TransportError::Timeout`]
    /// when the overall deadline elapses, or
    /// [`TransportError::TooManyRedirects`] when the redirect limit is hit.
    pub async fn execute(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.execute_inner(request))
                .await
                .map_err(|_| TransportError::Timeout { timeout })?,
            None => self.execute_inner(request).await,
        }
    }

    async fn execute_inner(
        &self,
        mut request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let transport = self.transport();
        let limit = match self.redirect {
            RedirectPolicy::Limited(limit) => limit,
            RedirectPolicy::None => 0,
        };
        let mut hops = 0;

        loop {
            if let Some(jar) = &self.jar {
                if let Some(cookies) = jar.cookies(request.uri()) {
                    request.headers_mut().insert(COOKIE, cookies);
                }
            }

            let uri = request.uri().clone();
            let method = request.method().clone();
            let headers = request.headers().clone();
            let body = request.body().clone();

            let response = transport.round_trip(request).await?;

            if let Some(jar) = &self.jar {
                let set_cookies: Vec<HeaderValue> = response
                    .headers()
                    .get_all(SET_COOKIE)
                    .iter()
                    .cloned()
                    .collect();
                if !set_cookies.is_empty() {
                    jar.set_cookies(&uri, &set_cookies);
                }
            }

            let status = response.status();
            if !is_redirect(status) || self.redirect == RedirectPolicy::None {
                return Ok(response);
            }
            let Some(target) = redirect_target(&response, &uri)? else {
                return Ok(response);
            };
            if hops == limit {
                return Err(TransportError::TooManyRedirects { limit });
            }
            hops += 1;

            debug!(from = %uri, to = %target, status = status.as_u16(), "following redirect");
            request = redirected_request(&method, body, &headers, target, status)?;
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("custom_transport", &self.transport.is_some())
            .field("redirect", &self.redirect)
            .field("cookie_jar", &self.jar.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Resolves the `Location` header against the request URI. `None` when the
/// response carries no `Location`.
fn redirect_target(
    response: &Response<Bytes>,
    base: &Uri,
) -> Result<Option<Uri>, TransportError> {
    let Some(location) = response.headers().get(LOCATION) else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|_| TransportError::InvalidRequest {
            reason: "Location header is not valid UTF-8".to_string(),
        })?;

    let base_url = Url::parse(&base.to_string()).map_err(|_| TransportError::InvalidRequest {
        reason: format!("request URI '{base}' is not resolvable"),
    })?;
    let resolved = base_url
        .join(location)
        .map_err(|_| TransportError::InvalidRequest {
            reason: format!("cannot resolve redirect target '{location}'"),
        })?;
    resolved
        .as_str()
        .parse::<Uri>()
        .map(Some)
        .map_err(|_| TransportError::InvalidRequest {
            reason: format!("redirect target '{resolved}' is not a valid URI"),
        })
}

/// Builds the next request of a redirect chain.
///
/// 303 rewrites to GET and drops the body (HEAD stays HEAD); 301/302 do the
/// same for POST. 307/308 keep method and body. Host, cookie, and
/// content-length headers are recomputed per hop.
fn redirected_request(
    method: &Method,
    body: Bytes,
    headers: &HeaderMap,
    target: Uri,
    status: StatusCode,
) -> Result<Request<Bytes>, TransportError> {
    let code = status.as_u16();
    let rewrite_to_get = (code == 303 && *method != Method::HEAD)
        || ((code == 301 || code == 302) && *method == Method::POST);
    let (method, body) = if rewrite_to_get {
        (Method::GET, Bytes::new())
    } else {
        (method.clone(), body)
    };

    let mut request = Request::builder()
        .method(method)
        .uri(target)
        .body(body)
        .map_err(|e| TransportError::InvalidRequest {
            reason: e.to_string(),
        })?;
    for (name, value) in headers {
        if *name == HOST || *name == COOKIE || *name == CONTENT_LENGTH {
            continue;
        }
        request.headers_mut().append(name, value.clone());
    }
    Ok(request)
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-recipient factory
// ─────────────────────────────────────────────────────────────────────────────

/// Derives instrumented copies of a base client, one per recipient.
///
/// Holds the base client together with the registry and namespace every
/// derived metric set registers under. The registry is injected, never
/// global, so each meter's lifecycle stays independent and testable.
#[derive(Clone)]
pub struct ClientMeter {
    base: Client,
    registry: Registry,
    namespace: String,
}

impl ClientMeter {
    /// Creates a meter deriving from `base`, registering under `namespace`
    /// in `registry`.
    pub fn new(base: Client, registry: Registry, namespace: impl Into<String>) -> Self {
        Self {
            base,
            registry,
            namespace: namespace.into(),
        }
    }

    /// Builds an instrumented client whose metrics carry the constant label
    /// `recipient`.
    ///
    /// Each call produces an independent client and an independently
    /// registered metric set; the base client is never touched.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when a metric set for the same
    /// recipient is already registered in this registry — calling twice for
    /// one recipient against one registry is a caller error.
    pub fn for_recipient(&self, recipient: &str) -> Result<Client, RegistrationError> {
        instrument_client_with_const_labels(
            &self.namespace,
            &self.base,
            &self.registry,
            HashMap::from([("recipient".to_string(), recipient.to_string())]),
        )
    }
}

/// Builds an instrumented copy of `base` whose metric set carries
/// `const_labels`, registered in `registry` under `namespace`.
///
/// The returned client keeps the base client's redirect policy, cookie jar,
/// and timeout; only the transport is replaced.
pub fn instrument_client_with_const_labels(
    namespace: &str,
    base: &Client,
    registry: &Registry,
    const_labels: HashMap<String, String>,
) -> Result<Client, RegistrationError> {
    if let Some(recipient) = const_labels.get("recipient") {
        debug!(namespace, recipient = %recipient, "instrumenting outgoing client");
    }

    let metrics = OutgoingMetrics::new(namespace, const_labels)?;
    metrics.register(registry)?;

    Ok(Client {
        transport: Some(instrument(base.transport(), &metrics)),
        redirect: base.redirect,
        jar: base.jar.clone(),
        timeout: base.timeout,
    })
}
