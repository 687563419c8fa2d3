//! Decoder for `Transfer-Encoding: chunked` bodies, see
//! [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//!
//! Chunks are gathered into a single buffer; chunk extensions and trailer fields are
//! accepted and dropped.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::ensure;
use crate::protocol::ParseError;

/// Longest chunk-size or trailer line accepted before its line ending arrives
const MAX_LINE_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting a `chunk-size [; ext]` line
    Size,
    /// Inside chunk data, with this many bytes left
    Data(usize),
    /// Expecting the line ending after chunk data
    DataEnd,
    /// After the last chunk, skipping trailer fields up to the empty line
    Trailer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    body: BytesMut,
    limit: usize,
}

impl ChunkedDecoder {
    pub fn new(limit: usize) -> Self {
        Self { state: State::Size, body: BytesMut::new(), limit }
    }
}

impl Decoder for ChunkedDecoder {
    type Item = Bytes;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = take_line(src)? else { return Ok(None) };
                    let size = parse_chunk_size(&line)?;

                    let total = self.body.len() + size;
                    ensure!(total <= self.limit, ParseError::too_large_body(total as u64, self.limit as u64));

                    self.state = if size == 0 { State::Trailer } else { State::Data(size) };
                }

                State::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = remaining.min(src.len());
                    self.body.extend_from_slice(&src.split_to(len));
                    self.state = if len == remaining { State::DataEnd } else { State::Data(remaining - len) };
                }

                State::DataEnd => {
                    if src.starts_with(b"\r\n") {
                        src.advance(2);
                    } else if src.starts_with(b"\n") {
                        src.advance(1);
                    } else if src.len() < 2 && src.first().is_none_or(|b| *b == b'\r') {
                        return Ok(None);
                    } else {
                        return Err(ParseError::invalid_body("missing line ending after chunk data"));
                    }
                    self.state = State::Size;
                }

                State::Trailer => {
                    let Some(line) = take_line(src)? else { return Ok(None) };
                    if line.is_empty() {
                        self.state = State::Size;
                        return Ok(Some(self.body.split().freeze()));
                    }
                }
            }
        }
    }
}

/// Splits one line off `src`, without its `\r\n` or bare `\n` ending.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    match src.iter().position(|b| *b == b'\n') {
        Some(end) => {
            let mut line = src.split_to(end + 1);
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }
            Ok(Some(line))
        }
        None => {
            ensure!(src.len() <= MAX_LINE_BYTES, ParseError::invalid_body("chunk line too long"));
            Ok(None)
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, ParseError> {
    let size = line.split(|b| *b == b';').next().unwrap_or_default().trim_ascii();
    ensure!(!size.is_empty(), ParseError::invalid_body("empty chunk size"));

    let size = std::str::from_utf8(size).map_err(|_e| ParseError::invalid_body("chunk size is not ascii"))?;
    usize::from_str_radix(size, 16).map_err(|_e| ParseError::invalid_body(format!("invalid chunk size {size}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_chunks() {
        let mut buffer = BytesMut::from(&b"4\r\nWiki\r\n5;name=value\r\npedia\r\n0\r\n\r\nGET /"[..]);

        let mut decoder = ChunkedDecoder::new(1024);
        let body = decoder.decode(&mut buffer).unwrap().unwrap();

        assert_eq!(&body[..], b"Wikipedia");
        assert_eq!(&buffer[..], b"GET /");
    }

    #[test]
    fn resumes_across_reads() {
        let mut decoder = ChunkedDecoder::new(1024);
        let mut buffer = BytesMut::new();

        for piece in [&b"A\r"[..], b"\n0123", b"456789\r", b"\n0\r\n", b"Expires: never\r\n", b"\r\n"] {
            buffer.extend_from_slice(piece);
            if let Some(body) = decoder.decode(&mut buffer).unwrap() {
                assert_eq!(&body[..], b"0123456789");
                assert!(buffer.is_empty());
                return;
            }
        }
        panic!("body never completed");
    }

    #[test]
    fn rejects_oversized_body() {
        let mut buffer = BytesMut::from(&b"ff\r\n"[..]);
        let result = ChunkedDecoder::new(16).decode(&mut buffer);
        assert!(matches!(result, Err(ParseError::TooLargeBody { .. })));
    }

    #[test]
    fn rejects_bad_size() {
        let mut buffer = BytesMut::from(&b"zz\r\n"[..]);
        assert!(ChunkedDecoder::new(16).decode(&mut buffer).is_err());
    }

    #[test]
    fn rejects_missing_data_terminator() {
        let mut buffer = BytesMut::from(&b"2\r\nabXY"[..]);
        assert!(ChunkedDecoder::new(16).decode(&mut buffer).is_err());
    }
}
