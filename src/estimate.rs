//! Approximate wire-size estimation for outgoing requests.
//!
//! The estimate feeds the request-size histogram. It is deliberately an
//! approximation: serialized URI plus method, protocol, headers, host, and
//! declared body length. Framing overhead (CRLFs, header colons) is ignored,
//! as is any form data already reflected in the URI.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST};
use http::{HeaderMap, Request, Version};

/// Computes an approximate byte size for an outgoing request.
///
/// Sums the serialized URI length, method and protocol string lengths, every
/// header name plus every value of that header (multi-valued headers are
/// summed), the host length, and the declared content length when one is
/// known. An unknown length contributes zero. Never fails, even for a
/// minimal empty request.
pub fn approximate_request_size(request: &Request<Bytes>) -> u64 {
    let mut size = request.uri().to_string().len() as u64;

    size += request.method().as_str().len() as u64;
    size += protocol_name(request.version()).len() as u64;

    // One name per distinct header, every value counted.
    for name in request.headers().keys() {
        size += name.as_str().len() as u64;
        for value in request.headers().get_all(name) {
            size += value.as_bytes().len() as u64;
        }
    }

    size += host_len(request) as u64;

    if let Some(length) = declared_request_length(request) {
        size += length;
    }
    size
}

/// Declared length of the request body.
///
/// The `Content-Length` header wins when present and parseable; otherwise a
/// non-empty buffered body supplies its own length. `None` means unknown,
/// which contributes nothing to the estimate.
pub(crate) fn declared_request_length(request: &Request<Bytes>) -> Option<u64> {
    if let Some(length) = parse_content_length(request.headers()) {
        return Some(length);
    }
    if request.body().is_empty() {
        None
    } else {
        Some(request.body().len() as u64)
    }
}

/// Parses a `Content-Length` header out of `headers`, if one is present.
pub(crate) fn parse_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn host_len(request: &Request<Bytes>) -> usize {
    if let Some(host) = request.uri().host() {
        return host.len();
    }
    request
        .headers()
        .get(HOST)
        .map(|value| value.as_bytes().len())
        .unwrap_or(0)
}

fn protocol_name(version: Version) -> &'static str {
    match version {
        v if v == Version::HTTP_09 => "HTTP/0.9",
        v if v == Version::HTTP_10 => "HTTP/1.0",
        v if v == Version::HTTP_2 => "HTTP/2.0",
        v if v == Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn request(uri: &str) -> Request<Bytes> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Bytes::new())
            .expect("valid request")
    }

    #[test]
    fn minimal_request_counts_uri_method_and_protocol() {
        let req = request("/");
        // "/" + "GET" + "HTTP/1.1", no headers, no host, empty body.
        assert_eq!(approximate_request_size(&req), 1 + 3 + 8);
    }

    #[test]
    fn absolute_uri_counts_host_separately() {
        let req = request("http://example.com/path");
        let uri_len = "http://example.com/path".len() as u64;
        let host_len = "example.com".len() as u64;
        assert_eq!(approximate_request_size(&req), uri_len + 3 + 8 + host_len);
    }

    #[test]
    fn header_value_growth_is_monotonic_by_one() {
        let mut req = request("http://example.com/");
        req.headers_mut()
            .insert("x-tenant", "abc".parse().expect("header value"));
        let base = approximate_request_size(&req);

        req.headers_mut()
            .insert("x-tenant", "abcd".parse().expect("header value"));
        assert_eq!(approximate_request_size(&req), base + 1);
    }

    #[test]
    fn multi_valued_headers_count_name_once_values_each() {
        let mut req = request("http://example.com/");
        req.headers_mut()
            .append("accept", "a".parse().expect("header value"));
        let with_one = approximate_request_size(&req);

        req.headers_mut()
            .append("accept", "bb".parse().expect("header value"));
        // Second value adds only its own two bytes, not another "accept".
        assert_eq!(approximate_request_size(&req), with_one + 2);
    }

    #[test]
    fn declared_length_prefers_content_length_header() {
        let mut req = Request::builder()
            .method(Method::POST)
            .uri("http://example.com/upload")
            .body(Bytes::from_static(b"abc"))
            .expect("valid request");
        assert_eq!(declared_request_length(&req), Some(3));

        req.headers_mut()
            .insert(CONTENT_LENGTH, "10".parse().expect("header value"));
        assert_eq!(declared_request_length(&req), Some(10));
    }

    #[test]
    fn unknown_length_contributes_zero() {
        let without_body = request("http://example.com/");
        let mut with_header = request("http://example.com/");
        with_header
            .headers_mut()
            .insert(CONTENT_LENGTH, "0".parse().expect("header value"));

        let header_overhead = "content-length".len() as u64 + 1;
        assert_eq!(
            approximate_request_size(&with_header) - header_overhead,
            approximate_request_size(&without_body)
        );
    }
}
