//! Default base transport.
//!
//! `DirectTransport` performs one exchange per call: resolve the host,
//! connect, handshake TLS for https targets, and drive an HTTP/1.1
//! request/response over the fresh connection. Connection-phase progress is
//! reported through any [`HttpTrace`] carried in the request extensions, so
//! the phase-trace decorator sees DNS and TLS timings from the real
//! boundaries.
//!
//! No pooling, no retries, no redirect logic: one request, one connection.
//! TLS uses rustls with the bundled webpki roots; TLS 1.2+ is enforced by
//! rustls itself.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http::header::HOST;
use http::{HeaderValue, Request, Response, Uri, Version};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::error::{ConfigError, TransportError};
use crate::transport::Transport;
use crate::transport::trace::HttpTrace;

/// Configuration for [`DirectTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-address TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    /// Loads configuration from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WIREGAUGE_CONNECT_TIMEOUT_SECS` | `5` | Per-address TCP connect timeout |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set but does
    /// not parse as a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        const CONNECT_TIMEOUT: &str = "WIREGAUGE_CONNECT_TIMEOUT_SECS";

        let connect_timeout_secs: u64 = match std::env::var(CONNECT_TIMEOUT) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                variable: CONNECT_TIMEOUT,
                value,
            })?,
            Err(_) => 5,
        };

        Ok(Self {
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }
}

/// A transport that opens one fresh connection per request.
pub struct DirectTransport {
    config: TransportConfig,
    tls: TlsConnector,
}

impl DirectTransport {
    /// Builds a transport with the bundled webpki root store.
    pub fn new(config: TransportConfig) -> Self {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    async fn resolve(
        &self,
        host: &str,
        port: u16,
        trace: &HttpTrace,
    ) -> Result<Vec<SocketAddr>, TransportError> {
        // IP literals skip resolution entirely; the DNS hooks never fire.
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        trace.dns_start();
        let resolved = tokio::net::lookup_host((host, port)).await;
        // The done hook fires for failed lookups too.
        trace.dns_done();

        let addrs: Vec<SocketAddr> = resolved
            .map_err(|source| TransportError::Dns {
                host: host.to_string(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Dns {
                host: host.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "lookup returned no addresses"),
            });
        }
        Ok(addrs)
    }

    async fn connect(
        &self,
        host: &str,
        port: u16,
        addrs: &[SocketAddr],
    ) -> Result<TcpStream, TransportError> {
        let mut last_error = None;
        for addr in addrs {
            match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await
            {
                Ok(Ok(stream)) => {
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Ok(Err(source)) => {
                    debug!(%addr, error = %source, "connect attempt failed");
                    last_error = Some(source);
                }
                Err(_) => {
                    debug!(%addr, timeout = ?self.config.connect_timeout, "connect attempt timed out");
                    last_error = Some(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "connect timed out",
                    ));
                }
            }
        }
        Err(TransportError::Connect {
            authority: format!("{host}:{port}"),
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses")),
        })
    }

    async fn handshake_tls(
        &self,
        host: &str,
        stream: TcpStream,
        trace: &HttpTrace,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>, TransportError> {
        let server_name = ServerName::try_from(host.to_string()).map_err(|_| {
            TransportError::InvalidRequest {
                reason: format!("invalid TLS server name '{host}'"),
            }
        })?;

        trace.tls_handshake_start();
        let handshake = self.tls.connect(server_name, stream).await;
        // The done hook fires for failed handshakes too.
        trace.tls_handshake_done();

        handshake.map_err(|source| {
            warn!(host = %host, error = %source, "TLS handshake failed");
            TransportError::Tls {
                host: host.to_string(),
                source,
            }
        })
    }

    async fn exchange<S>(
        &self,
        request: Request<Bytes>,
        stream: S,
    ) -> Result<Response<Bytes>, TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                debug!(%error, "connection task finished with error");
            }
        });

        let response = sender.send_request(into_wire_request(request)?).await?;
        let (parts, body) = response.into_parts();
        let collected = body.collect().await?.to_bytes();
        Ok(Response::from_parts(parts, collected))
    }
}

#[async_trait::async_trait]
impl Transport for DirectTransport {
    async fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        let trace = request
            .extensions()
            .get::<HttpTrace>()
            .cloned()
            .unwrap_or_default();

        let uri = request.uri();
        let https = match uri.scheme_str() {
            Some("http") | None => false,
            Some("https") => true,
            Some(other) => {
                return Err(TransportError::InvalidRequest {
                    reason: format!("unsupported scheme '{other}'"),
                });
            }
        };
        let host = uri
            .host()
            .ok_or_else(|| TransportError::InvalidRequest {
                reason: "request URI has no host".to_string(),
            })?
            .to_string();
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });

        debug!(host = %host, port, https, method = %request.method(), "performing exchange");

        let addrs = self.resolve(&host, port, &trace).await?;
        let stream = self.connect(&host, port, &addrs).await?;

        if https {
            let stream = self.handshake_tls(&host, stream, &trace).await?;
            self.exchange(request, stream).await
        } else {
            self.exchange(request, stream).await
        }
    }
}

/// The shared transport used by clients that set none of their own.
pub fn default_transport() -> Arc<dyn Transport> {
    static DEFAULT: OnceLock<Arc<DirectTransport>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Arc::new(DirectTransport::new(TransportConfig::default())))
        .clone()
}

/// Rewrites an absolute-form request into the origin-form wire shape an
/// HTTP/1.1 peer expects: path-and-query target plus a `Host` header.
fn into_wire_request(request: Request<Bytes>) -> Result<Request<Full<Bytes>>, TransportError> {
    let (mut parts, body) = request.into_parts();

    if let Some(authority) = parts.uri.authority().cloned() {
        if !parts.headers.contains_key(HOST) {
            let value = HeaderValue::from_str(authority.as_str()).map_err(|_| {
                TransportError::InvalidRequest {
                    reason: format!("authority '{authority}' is not a valid Host header"),
                }
            })?;
            parts.headers.insert(HOST, value);
        }
    }

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    parts.uri = target
        .parse::<Uri>()
        .map_err(|_| TransportError::InvalidRequest {
            reason: format!("request target '{target}' is not a valid URI"),
        })?;
    parts.version = Version::HTTP_11;

    Ok(Request::from_parts(parts, Full::new(body)))
}
