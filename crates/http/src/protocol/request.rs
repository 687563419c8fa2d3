//! HTTP request header handling.
//!
//! [`RequestHeader`] wraps the standard `http::Request<()>` produced by the header
//! decoder and answers the questions the connection needs before a body is attached:
//! does the request carry a body, may the connection be reused afterwards, and is it
//! asking for a WebSocket upgrade.

use http::request::Parts;
use http::{HeaderMap, HeaderName, Method, Request, Uri, Version, header};

/// Represents an HTTP request header.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Determines if this request requires a body based on its HTTP method.
    ///
    /// Returns false for methods that typically don't have bodies:
    /// - GET
    /// - HEAD
    /// - DELETE
    /// - OPTIONS
    /// - CONNECT
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// Whether the connection may carry another request after this one is answered.
    pub fn keep_alive(&self) -> bool {
        keep_alive(self.version(), self.headers())
    }

    /// Whether this request asks to switch the connection to the WebSocket protocol.
    pub fn is_upgrade(&self) -> bool {
        is_upgrade(self.method(), self.version(), self.headers())
    }
}

/// HTTP/1.1 connections persist unless `Connection: close` is sent, HTTP/1.0
/// connections close unless `Connection: keep-alive` is sent.
pub(crate) fn keep_alive(version: Version, headers: &HeaderMap) -> bool {
    match version {
        Version::HTTP_11 => !has_token(headers, &header::CONNECTION, "close"),
        Version::HTTP_10 => has_token(headers, &header::CONNECTION, "keep-alive"),
        _ => false,
    }
}

pub(crate) fn is_upgrade(method: &Method, version: Version, headers: &HeaderMap) -> bool {
    method == Method::GET
        && version == Version::HTTP_11
        && has_token(headers, &header::CONNECTION, "upgrade")
        && has_token(headers, &header::UPGRADE, "websocket")
}

/// Checks every value of a comma separated header for `token`, ignoring ASCII case.
pub(crate) fn has_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
