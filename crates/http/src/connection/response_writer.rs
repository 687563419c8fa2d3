use std::io;

use bytes::{Buf, Bytes, BytesMut};
use http::Response;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;

use crate::codec::ResponseEncoder;
use crate::protocol::SendError;

/// Buffers encoded responses and writes them out.
///
/// [`flush`](ResponseWriter::flush) is cancel safe: bytes already accepted by the
/// writer are consumed from the buffer, so a flush dropped mid-way resumes where it
/// stopped the next time it is called.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    writer: W,
    buffer: BytesMut,
    encoder: ResponseEncoder,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn with_capacity(writer: W, buffer_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(buffer_size), encoder: ResponseEncoder::new() }
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Bytes encoded but not yet accepted by the writer.
    pub fn pending(&self) -> usize {
        self.buffer.remaining()
    }

    #[inline]
    pub fn write(&mut self, response: &Response<Bytes>) -> Result<(), SendError> {
        self.encoder.encode(response, &mut self.buffer)
    }

    pub async fn flush(&mut self) -> Result<(), SendError> {
        while self.buffer.has_remaining() {
            if self.writer.write_buf(&mut self.buffer).await? == 0 {
                return Err(SendError::io(io::ErrorKind::WriteZero));
            }
        }
        Ok(self.writer.flush().await?)
    }
}
