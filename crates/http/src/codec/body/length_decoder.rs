//! Decoder for bodies delimited by `Content-Length`, see
//! [RFC 9112 Section 6.2](https://www.rfc-editor.org/rfc/rfc9112#section-6.2).

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::protocol::ParseError;

/// Waits until the whole fixed-length body is buffered, then yields it in one piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    length: usize,
}

impl LengthDecoder {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Decoder for LengthDecoder {
    type Item = Bytes;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < self.length {
            src.reserve(self.length - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(self.length).freeze()))
    }
}
