//! HTTP request decoder.
//!
//! Operates in two phases: the head is parsed by [`HeaderDecoder`], then the body is
//! gathered by a [`BodyDecoder`] chosen from the head. Only a complete request is
//! yielded, so pipelined requests come out of the buffer one by one, in order.
//!
//! # Example
//!
//! ```
//! use syncaide_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! let request = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(request.uri().path(), "/health");
//! ```

use bytes::{Bytes, BytesMut};
use http::Request;
use tokio_util::codec::Decoder;

use crate::codec::body::BodyDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{ParseError, RequestHeader};

/// The decoder maintains its state through the `pending` field:
/// - `None`: currently parsing a head
/// - `Some(_)`: head parsed, currently gathering its body
#[derive(Debug, Default)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    pending: Option<(RequestHeader, BodyDecoder)>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RequestDecoder {
    type Item = Request<Bytes>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.pending.is_none() {
            let Some((header, payload_size)) = self.header_decoder.decode(src)? else {
                return Ok(None);
            };
            self.pending = Some((header, BodyDecoder::new(payload_size)?));
        }

        let Some((_, body_decoder)) = &mut self.pending else {
            return Ok(None);
        };

        match body_decoder.decode(src)? {
            Some(body) => Ok(self.pending.take().map(|(header, _)| header.body(body))),
            None => Ok(None),
        }
    }
}
