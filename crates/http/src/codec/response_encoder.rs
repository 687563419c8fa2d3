use bytes::{BufMut, Bytes, BytesMut};
use http::Response;
use tokio_util::codec::Encoder;

use crate::codec::header::HeaderEncoder;
use crate::protocol::SendError;

/// Encodes a fully buffered response: head, then body.
#[derive(Debug, Default)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<&Response<Bytes>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: &Response<Bytes>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.body();
        self.header_encoder.encode((item, body.len()), dst)?;
        dst.put_slice(body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn head_then_body() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Bytes::from_static(br#"{"status":"ok"}"#))
            .unwrap();

        let mut dst = BytesMut::new();
        ResponseEncoder::new().encode(&response, &mut dst).unwrap();

        let expected = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 15\r\n\r\n{\"status\":\"ok\"}";
        assert_eq!(&dst[..], expected.as_bytes());
    }
}
