//! HTTP response helpers.
//!
//! Responses travel through the engine fully buffered as `Response<Bytes>`. This
//! module builds the few responses the engine answers with on its own and applies
//! the request's connection semantics to every outgoing response.

use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, Version, header};

use crate::protocol::request::has_token;

const CLOSE: HeaderValue = HeaderValue::from_static("close");
const KEEP_ALIVE: HeaderValue = HeaderValue::from_static("keep-alive");
const TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");

pub fn not_found() -> Response<Bytes> {
    plain(StatusCode::NOT_FOUND, "not found\n")
}

pub fn bad_request() -> Response<Bytes> {
    plain(StatusCode::BAD_REQUEST, "bad request\n")
}

fn plain(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_TYPE, TEXT_PLAIN);
    response
}

/// Aligns `response` with the request it answers and reports whether the connection
/// must close once it has been written.
///
/// The response takes the request's protocol version. A connection that may not be
/// reused, either because of the request or because the handler asked for it, gets an
/// explicit `Connection: close`; a reused HTTP/1.0 connection gets `Connection: keep-alive`.
pub fn prepare_response(response: &mut Response<Bytes>, version: Version, keep_alive: bool) -> bool {
    *response.version_mut() = match version {
        Version::HTTP_10 => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let close = !keep_alive || has_token(response.headers(), &header::CONNECTION, "close");
    if close {
        response.headers_mut().insert(header::CONNECTION, CLOSE);
    } else if version == Version::HTTP_10 {
        response.headers_mut().insert(header::CONNECTION, KEEP_ALIVE);
    }
    close
}
