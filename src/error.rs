//! Error types.
//!
//! User code (decoders, endpoints, encoders) fails with a [`BoxError`]; the
//! pipeline tags it with the stage it came from and hands an [`Error`] to the
//! error handler and the error encoder. [`HttpError`] is the error type to
//! return when a failure should carry its own status code or headers.

use std::fmt;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

use crate::transport::{Headerer, StatusCoder};

/// A type-erased error returned by user-supplied functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The pipeline stage an [`Error`] originated in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Before,
    Decode,
    Endpoint,
    After,
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Before => "before",
            Self::Decode => "decode",
            Self::Endpoint => "endpoint",
            Self::After => "after",
            Self::Encode => "encode",
        })
    }
}

/// The error type of tsu-kit.
///
/// `Decode`, `Endpoint` and `Encode` display exactly as the error they wrap,
/// so an error encoder that writes `err.to_string()` writes the message the
/// user produced.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Decode(BoxError),

    #[error(transparent)]
    Endpoint(BoxError),

    #[error(transparent)]
    Encode(BoxError),

    /// A hook, decoder or endpoint panicked.
    #[error("{stage} panicked: {message}")]
    Panic { stage: Stage, message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),
}

impl Error {
    /// The pipeline stage this error came from, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Decode(_) => Some(Stage::Decode),
            Self::Endpoint(_) => Some(Stage::Endpoint),
            Self::Encode(_) => Some(Stage::Encode),
            Self::Panic { stage, .. } => Some(*stage),
            Self::Io(_) | Self::InvalidAddress(_) => None,
        }
    }

    /// The user error wrapped by this error, if any.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Decode(e) | Self::Endpoint(e) | Self::Encode(e) => Some(&**e),
            _ => None,
        }
    }

    /// Capability query: the status code this error asks to be encoded with.
    pub fn status_coder(&self) -> Option<&dyn StatusCoder> {
        self.http_error().map(|e| e as &dyn StatusCoder)
    }

    /// Capability query: headers this error asks to be added to the response.
    pub fn headerer(&self) -> Option<&dyn Headerer> {
        self.http_error().map(|e| e as &dyn Headerer)
    }

    fn http_error(&self) -> Option<&HttpError> {
        self.cause()?.downcast_ref::<HttpError>()
    }
}

// ── HttpError ────────────────────────────────────────────────────────────────

/// An application error with an explicit status code and optional headers.
///
/// ```rust
/// use tsu_kit::{BoxError, HttpError};
///
/// fn parse_id(raw: &str) -> Result<u64, BoxError> {
///     raw.parse().map_err(|_| HttpError::bad_request(format!("bad id `{raw}`")).into())
/// }
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    headers: HeaderMap,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, headers: HeaderMap::new(), message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl StatusCoder for HttpError {
    fn status_code(&self) -> StatusCode {
        self.status
    }
}

impl Headerer for HttpError {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_display_transparently() {
        let err = Error::Decode("InvalidInput".into());
        assert_eq!(err.to_string(), "InvalidInput");
        assert_eq!(err.stage(), Some(Stage::Decode));
    }

    #[test]
    fn panic_names_its_stage() {
        let err = Error::Panic { stage: Stage::Before, message: "boom".into() };
        assert_eq!(err.to_string(), "before panicked: boom");
    }

    #[test]
    fn http_error_exposes_capabilities() {
        let inner = HttpError::not_found("no such user")
            .with_header(HeaderName::from_static("x-reason"), HeaderValue::from_static("gone"));
        let err = Error::Endpoint(inner.into());

        assert_eq!(err.status_coder().map(|s| s.status_code()), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.headerer().map(|h| h.headers().len()), Some(1));
        assert_eq!(err.to_string(), "no such user");
    }

    #[test]
    fn plain_errors_have_no_capabilities() {
        let err = Error::Endpoint("database down".into());
        assert!(err.status_coder().is_none());
        assert!(err.headerer().is_none());
    }
}
