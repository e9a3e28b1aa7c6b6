//! Default encoders.
//!
//! Both encoders always finish by terminating the response, whatever the
//! value or error they are given.

use http::header::{self, HeaderMap};
use http::StatusCode;
use tracing::warn;

use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::response::ContentType;
use crate::transport::{Reply, ResponseWriter};

/// Serializes the response as JSON.
///
/// The status is `200 OK` unless the response reports its own through
/// [`Reply::as_status_coder`]; headers from [`Reply::as_headerer`] are added.
/// A `204 No Content` status writes no body.
pub fn encode_json_response<O: Reply>(
    _ctx: &Context,
    w: &mut dyn ResponseWriter,
    response: &O,
) -> Result<(), BoxError> {
    let body = serde_json::to_vec(response)?;

    w.headers_mut().insert(header::CONTENT_TYPE, ContentType::Json.header_value());
    if let Some(h) = response.as_headerer() {
        append_headers(w, h.headers());
    }
    let code = response.as_status_coder().map_or(StatusCode::OK, |s| s.status_code());

    w.write_header(code);
    if code != StatusCode::NO_CONTENT {
        w.write(&body)?;
    }
    w.end();
    Ok(())
}

/// Writes the error message as plain text.
///
/// The status is `500 Internal Server Error` unless the error carries its own
/// (see [`HttpError`](crate::HttpError)); headers it carries are added.
pub fn default_error_encoder(_ctx: &Context, err: &Error, w: &mut dyn ResponseWriter) {
    w.headers_mut().insert(header::CONTENT_TYPE, ContentType::Text.header_value());
    if let Some(h) = err.headerer() {
        append_headers(w, h.headers());
    }
    let code = err
        .status_coder()
        .map_or(StatusCode::INTERNAL_SERVER_ERROR, |s| s.status_code());

    w.write_header(code);
    if let Err(e) = w.write(err.to_string().as_bytes()) {
        warn!("error body not written: {e}");
    }
    w.end();
}

fn append_headers(w: &mut dyn ResponseWriter, headers: &HeaderMap) {
    for (name, value) in headers {
        w.headers_mut().append(name.clone(), value.clone());
    }
}
