//! HTTP request head decoder.
//!
//! Parses the request line and header fields with `httparse` and decides how the
//! body that follows is delimited.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - Only HTTP/1.0 and HTTP/1.1

use bytes::{Buf, BytesMut};
use http::{HeaderName, HeaderValue, Request, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Shortest possible request line, `GET / HTTP/1.1\r\n\r\n` minus the path
const MIN_REQUEST_BYTES: usize = 14;

/// Decoder for HTTP request heads.
///
/// On success the head bytes are consumed from the source buffer, leaving the body
/// (and any pipelined request behind it) in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < MIN_REQUEST_BYTES {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let status = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let body_offset = match status {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(header_size = body_offset, "parsed request head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            _ => return Err(ParseError::InvalidVersion(req.version)),
        };

        let mut builder = Request::builder()
            .method(req.method.ok_or(ParseError::InvalidMethod)?)
            .uri(req.path.ok_or(ParseError::InvalidUri)?)
            .version(version);

        let header_map = builder.headers_mut().ok_or_else(|| ParseError::invalid_header("invalid request line"))?;
        header_map.reserve(req.headers.len());
        for header in req.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
            header_map.append(name, value);
        }

        let header = RequestHeader::from(builder.body(()).map_err(|_e| ParseError::invalid_header("invalid request line"))?);
        let payload_size = parse_payload(&header)?;

        src.advance(body_offset);
        Ok(Some((header, payload_size)))
    }
}

/// Selects how the body is delimited, per RFC 9112 section 6.
///
/// The framing headers are checked for every method; a method without a body that
/// still declares one is rejected rather than leaving the body to be read as the
/// next request.
fn parse_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(http::header::CONTENT_LENGTH);

    let payload_size = match (te_header, cl_header) {
        (None, None) => PayloadSize::new_empty(),

        (Some(te_value), None) => {
            ensure!(is_chunked(te_value), ParseError::invalid_header("transfer-encoding without chunked as final coding"));
            PayloadSize::new_chunked()
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_e| ParseError::invalid_content_length("value can't to_str"))?;

            let length =
                cl_str.trim().parse::<u64>().map_err(|_e| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            PayloadSize::new_length(length)
        }

        (Some(_), Some(_)) => {
            return Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers"));
        }
    };

    ensure!(
        header.need_body() || payload_size.is_empty(),
        ParseError::invalid_body(format!("{} request must not carry a body", header.method()))
    );
    Ok(payload_size)
}

/// Chunked must be the last coding of a request's Transfer-Encoding.
fn is_chunked(value: &HeaderValue) -> bool {
    value.as_bytes().rsplit(|b| *b == b',').next().is_some_and(|coding| coding.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Version};
    use indoc::indoc;

    #[test]
    fn check_is_chunked() {
        assert!(is_chunked(&HeaderValue::from_static("gzip, chunked")));
        assert!(is_chunked(&HeaderValue::from_static("Chunked")));
        assert!(!is_chunked(&HeaderValue::from_static("chunked, gzip")));
        assert!(!is_chunked(&HeaderValue::from_static("gzip")));
    }

    #[test]
    fn leaves_body_in_buffer() {
        let str = indoc! {r"
        POST /agent/7 HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 3

        123"};

        let mut bytes = BytesMut::from(str);
        let (header, payload_size) = HeaderDecoder.decode(&mut bytes).unwrap().unwrap();

        assert_eq!(header.method(), &Method::POST);
        assert_eq!(payload_size, PayloadSize::Length(3));
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r"
        GET /health HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "};

        let mut buf = BytesMut::from(str);
        let (header, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert!(payload_size.is_empty());
        assert!(buf.is_empty());

        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/health");
        assert_eq!(header.uri().query(), None);
        assert_eq!(header.headers().len(), 3);
        assert_eq!(header.headers().get(http::header::USER_AGENT), Some(&HeaderValue::from_static("curl/7.79.1")));
    }

    #[test]
    fn partial_head_waits() {
        let mut buf = BytesMut::from("GET /syncaide.js HTTP/1.1\r\nHost: local");
        assert!(HeaderDecoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 38);
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nX-Fill: ");
        buf.extend_from_slice(&[b'a'; MAX_HEADER_BYTES]);

        let result = HeaderDecoder.decode(&mut buf);
        assert!(matches!(result, Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn both_lengths_are_rejected() {
        let str = indoc! {r"
        POST / HTTP/1.1
        Content-Length: 3
        Transfer-Encoding: chunked

        "};

        let result = HeaderDecoder.decode(&mut BytesMut::from(str));
        assert!(matches!(result, Err(ParseError::InvalidContentLength { .. })));

        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n");
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn bodyless_method_declaring_body_is_rejected() {
        let mut buf = BytesMut::from("GET /health HTTP/1.1\r\nContent-Length: 23\r\n\r\nGET /admin HTTP/1.1\r\n\r\n");
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidBody { .. })));

        let mut buf = BytesMut::from("DELETE /agent/7 HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n");
        assert!(matches!(HeaderDecoder.decode(&mut buf), Err(ParseError::InvalidBody { .. })));
    }

    #[test]
    fn bodyless_method_with_zero_length_is_accepted() {
        let mut buf = BytesMut::from("GET /health HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        let (header, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(header.method(), &Method::GET);
        assert!(payload_size.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        let result = HeaderDecoder.decode(&mut BytesMut::from(&b"\x16\x03\x01\x02\x00\x01\x00\x01\xfc\x03\x03abcdef\r\n\r\n"[..]));
        assert!(matches!(result, Err(ParseError::InvalidHeader { .. })));
    }
}
