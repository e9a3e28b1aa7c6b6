//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};

/// An incoming HTTP request with its body fully read.
///
/// This is the raw request every before-hook, decoder and finalizer sees.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            remote_addr: None,
            params: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Header lookup. Values that are not visible ASCII are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The authority from the URI, falling back to the `Host` header.
    pub fn host(&self) -> Option<&str> {
        self.uri.host().or_else(|| self.header("host"))
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_falls_back_to_header() {
        let req = Request::from(
            http::Request::builder()
                .uri("/users")
                .header("host", "example.com")
                .body(Bytes::new())
                .unwrap(),
        );
        assert_eq!(req.host(), Some("example.com"));
        assert_eq!(req.path(), "/users");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::from(
            http::Request::builder()
                .header("X-Trace", "abc")
                .body(Bytes::new())
                .unwrap(),
        );
        assert_eq!(req.header("x-trace"), Some("abc"));
        assert_eq!(req.header("X-TRACE"), Some("abc"));
        assert_eq!(req.header("missing"), None);
    }
}
