//! Response interception for finalizers.
//!
//! Finalizers run after the response is written and want to know what was
//! written. [`InterceptingWriter`] sits between the pipeline and the real
//! sink, forwards every call unchanged, and remembers the status code and
//! the number of body bytes that went through it.

use http::header::HeaderMap;
use http::StatusCode;

use crate::transport::ResponseWriter;

/// A pass-through [`ResponseWriter`] that records status and size.
///
/// Built once per request around that request's sink.
pub struct InterceptingWriter<'w> {
    inner: &'w mut dyn ResponseWriter,
    code: Option<StatusCode>,
    written: u64,
}

impl<'w> InterceptingWriter<'w> {
    pub fn new(inner: &'w mut dyn ResponseWriter) -> Self {
        Self { inner, code: None, written: 0 }
    }

    /// The status the client received, `200 OK` if none was set explicitly.
    pub fn code(&self) -> StatusCode {
        self.code.unwrap_or(StatusCode::OK)
    }

    /// Body bytes accepted by the inner writer.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl ResponseWriter for InterceptingWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.code.get_or_insert(status);
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.code.get_or_insert(StatusCode::OK);
        self.written += n as u64;
        Ok(n)
    }

    fn reset(&mut self) {
        if self.inner.is_ended() {
            return;
        }
        self.inner.reset();
        self.code = None;
        self.written = 0;
    }

    fn end(&mut self) {
        self.inner.end();
    }

    fn is_ended(&self) -> bool {
        self.inner.is_ended()
    }
}

#[cfg(test)]
mod tests {
    use http::header::{self, HeaderValue};

    use super::*;
    use crate::response::Response;

    #[test]
    fn records_status_and_size_without_altering_output() {
        let mut res = Response::new();
        {
            let mut iw = InterceptingWriter::new(&mut res);
            iw.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            iw.write_header(StatusCode::ACCEPTED);
            iw.write(b"hello ").unwrap();
            iw.write(b"world").unwrap();
            iw.end();

            assert_eq!(iw.code(), StatusCode::ACCEPTED);
            assert_eq!(iw.written(), 11);
            assert!(iw.is_ended());
        }
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(res.body(), b"hello world");
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn defaults_to_ok() {
        let mut res = Response::new();
        let iw = InterceptingWriter::new(&mut res);
        assert_eq!(iw.code(), StatusCode::OK);
        assert_eq!(iw.written(), 0);
    }

    #[test]
    fn implicit_status_on_first_write() {
        let mut res = Response::new();
        let mut iw = InterceptingWriter::new(&mut res);
        iw.write(b"x").unwrap();
        iw.write_header(StatusCode::IM_A_TEAPOT);
        assert_eq!(iw.code(), StatusCode::OK);
    }

    #[test]
    fn reset_forgets_what_was_recorded() {
        let mut res = Response::new();
        {
            let mut iw = InterceptingWriter::new(&mut res);
            iw.write_header(StatusCode::CREATED);
            iw.write(b"partial").unwrap();
            iw.reset();

            assert_eq!(iw.written(), 0);
            iw.write_header(StatusCode::BAD_GATEWAY);
            iw.write(b"err").unwrap();
            iw.end();
            assert_eq!(iw.code(), StatusCode::BAD_GATEWAY);
            assert_eq!(iw.written(), 3);
        }
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(res.body(), b"err");
    }

    #[test]
    fn failed_writes_are_not_counted() {
        let mut res = Response::new();
        res.end();
        let mut iw = InterceptingWriter::new(&mut res);
        assert!(iw.write(b"late").is_err());
        assert_eq!(iw.written(), 0);
    }
}
