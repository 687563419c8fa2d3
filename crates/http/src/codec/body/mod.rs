//! Request body decoding.
//!
//! Request bodies on this server are small, so they are gathered in full before the
//! request is dispatched. [`BodyDecoder`] picks the strategy from the [`PayloadSize`]
//! found in the head and enforces the body size limit.

mod chunked_decoder;
mod length_decoder;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::ensure;
use crate::protocol::{ParseError, PayloadSize};
use chunked_decoder::ChunkedDecoder;
use length_decoder::LengthDecoder;

/// Largest request body accepted
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyDecoder {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    Empty,
}

impl BodyDecoder {
    pub fn new(payload_size: PayloadSize) -> Result<Self, ParseError> {
        match payload_size {
            PayloadSize::Empty => Ok(Self::Empty),
            PayloadSize::Chunked => Ok(Self::Chunked(ChunkedDecoder::new(MAX_BODY_BYTES))),
            PayloadSize::Length(length) => {
                let too_large = || ParseError::too_large_body(length, MAX_BODY_BYTES as u64);
                let length = usize::try_from(length).map_err(|_e| too_large())?;
                ensure!(length <= MAX_BODY_BYTES, too_large());
                Ok(Self::Length(LengthDecoder::new(length)))
            }
        }
    }
}

impl Decoder for BodyDecoder {
    type Item = Bytes;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            Self::Length(decoder) => decoder.decode(src),
            Self::Chunked(decoder) => decoder.decode(src),
            Self::Empty => Ok(Some(Bytes::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_limit_checked_up_front() {
        let result = BodyDecoder::new(PayloadSize::Length(MAX_BODY_BYTES as u64 + 1));
        assert!(matches!(result, Err(ParseError::TooLargeBody { .. })));
    }

    #[test]
    fn empty_body_is_immediate() {
        let mut decoder = BodyDecoder::new(PayloadSize::Empty).unwrap();
        let mut src = BytesMut::from(&b"GET / HTTP/1.1\r\n\r\n"[..]);

        assert!(decoder.decode(&mut src).unwrap().unwrap().is_empty());
        assert_eq!(src.len(), 18);
    }
}
