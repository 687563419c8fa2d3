//! HTTP response head encoder.
//!
//! Serializes the status line and header fields of a response. The body length is
//! passed alongside the response so the emitted `Content-Length` always agrees with
//! the bytes that follow, whatever the handler put in its header map.

use bytes::{BufMut, BytesMut};
use http::{Response, StatusCode, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::SendError;

/// Initial buffer size reserved for head serialization
const INIT_HEADER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl<B> Encoder<(&Response<B>, usize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (&Response<B>, usize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (response, body_len) = item;
        let status = response.status();

        dst.reserve(INIT_HEADER_SIZE + body_len);
        let version = match response.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };
        write!(FastWrite(dst), "{version} {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;

        for (header_name, header_value) in response.headers() {
            if header_name == header::CONTENT_LENGTH || header_name == header::TRANSFER_ENCODING {
                continue;
            }
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }

        if has_length(status) {
            write!(FastWrite(dst), "content-length: {body_len}\r\n")?;
        } else if body_len > 0 {
            return Err(SendError::invalid_response(format!("status {status} must not carry a body")));
        }

        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Informational, 204 and 304 responses never describe a body length.
fn has_length(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

/// Adapts `BytesMut` to `io::Write` for `write!`; space is reserved up front.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_follows_body() {
        let response = Response::builder().status(StatusCode::OK).header(header::CONTENT_LENGTH, "999").body(()).unwrap();

        let mut dst = BytesMut::new();
        HeaderEncoder.encode((&response, 2), &mut dst).unwrap();

        assert_eq!(&dst[..], &b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\n"[..]);
    }

    #[test]
    fn switching_protocols_has_no_length() {
        let response = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS).header(header::UPGRADE, "websocket").body(()).unwrap();

        let mut dst = BytesMut::new();
        HeaderEncoder.encode((&response, 0), &mut dst).unwrap();

        assert_eq!(&dst[..], &b"HTTP/1.1 101 Switching Protocols\r\nupgrade: websocket\r\n\r\n"[..]);
    }

    #[test]
    fn http10_status_line() {
        let response = Response::builder().version(Version::HTTP_10).status(StatusCode::NOT_FOUND).body(()).unwrap();

        let mut dst = BytesMut::new();
        HeaderEncoder.encode((&response, 0), &mut dst).unwrap();

        assert!(dst.starts_with(b"HTTP/1.0 404 Not Found\r\n"));
    }

    #[test]
    fn http2_is_unsupported() {
        let response = Response::builder().version(Version::HTTP_2).body(()).unwrap();
        assert!(HeaderEncoder.encode((&response, 0), &mut BytesMut::new()).is_err());
    }
}
