//! HTTP head processing: request heads are decoded, response heads encoded.
//!
//! - [`HeaderDecoder`]: parses request line and header fields, enforces size limits and
//!   selects the body framing
//! - [`HeaderEncoder`]: serializes status line and header fields, owning `Content-Length`

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
