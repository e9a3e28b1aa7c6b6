//! Buffered outgoing response.
//!
//! [`Response`] is the [`ResponseWriter`] the router hands to every pipeline.
//! Everything written to it is buffered and turned into one hyper response
//! when the handler returns, so a request always produces exactly one
//! response on the wire.

use bytes::{Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use tracing::warn;

use crate::transport::ResponseWriter;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values used by the built-in encoders.
#[derive(Clone, Copy, Debug)]
pub enum ContentType {
    Json, // application/json
    Text, // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
        }
    }

    pub fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response, assembled in memory.
///
/// # Shortcuts for plain handlers
///
/// ```rust
/// use http::StatusCode;
/// use tsu_kit::Response;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::empty(StatusCode::NO_CONTENT);
/// ```
#[derive(Debug, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    ended: bool,
}

impl Response {
    /// An open response: no status, no headers, no body.
    pub fn new() -> Self {
        Self::default()
    }

    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::finished(StatusCode::OK, ContentType::Json, &body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::finished(StatusCode::OK, ContentType::Text, body.into().as_bytes())
    }

    /// Response with no body.
    pub fn empty(status: StatusCode) -> Self {
        Self { status: Some(status), ended: true, ..Self::default() }
    }

    fn finished(status: StatusCode, content_type: ContentType, body: &[u8]) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, content_type.header_value());
        Self { status: Some(status), headers, body: BytesMut::from(body), ended: true }
    }

    /// The committed status, `200 OK` if none was set.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let status = self.status();
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseWriter for Response {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        match self.status {
            Some(committed) => warn!(%committed, ignored = %status, "superfluous write_header"),
            None => self.status = Some(status),
        }
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.ended {
            return Err(std::io::Error::other("response already terminated"));
        }
        self.status.get_or_insert(StatusCode::OK);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn reset(&mut self) {
        if self.ended {
            return;
        }
        self.status = None;
        self.headers.clear();
        self.body.clear();
    }

    fn end(&mut self) {
        self.ended = true;
    }

    fn is_ended(&self) -> bool {
        self.ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_header_wins() {
        let mut res = Response::new();
        res.write_header(StatusCode::CREATED);
        res.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[test]
    fn write_commits_ok() {
        let mut res = Response::new();
        assert_eq!(res.write(b"hi").unwrap(), 2);
        res.write_header(StatusCode::NOT_FOUND);
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"hi");
    }

    #[test]
    fn writes_after_end_fail() {
        let mut res = Response::new();
        res.write(b"a").unwrap();
        res.end();
        assert!(res.is_ended());
        assert!(res.write(b"b").is_err());
        assert_eq!(res.body(), b"a");
    }

    #[test]
    fn into_inner_carries_status_headers_and_body() {
        let res = Response::text("hello").into_inner();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[test]
    fn shortcuts_are_terminated() {
        assert!(Response::json(b"{}".to_vec()).is_ended());
        assert!(Response::empty(StatusCode::NO_CONTENT).is_ended());
    }

    #[test]
    fn reset_discards_an_open_response() {
        let mut res = Response::new();
        res.headers_mut().insert(header::SET_COOKIE, HeaderValue::from_static("session=abc"));
        res.write_header(StatusCode::CREATED);
        res.write(b"{\"id\":").unwrap();

        res.reset();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().is_empty());
        assert!(res.body().is_empty());

        res.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn reset_leaves_a_terminated_response_alone() {
        let mut res = Response::text("done");
        res.reset();
        assert_eq!(res.body(), b"done");
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }
}
