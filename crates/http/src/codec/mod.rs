//! Wire codecs.
//!
//! - Request handling: [`RequestDecoder`] yields complete `Request<Bytes>` values, head
//!   parsed via the `header` module and body gathered via the `body` module
//! - Response handling: [`ResponseEncoder`] writes fully buffered `Response<Bytes>` values
//! - Peer telemetry: [`PeerRecord`] is the binary record carried in peer protocol frames
//!
//! WebSocket framing itself is left to `tokio-tungstenite`.

mod body;
mod header;
mod peer_record;
mod request_decoder;
mod response_encoder;

pub use body::MAX_BODY_BYTES;
pub use header::HeaderEncoder;
pub use peer_record::PeerRecord;
pub use peer_record::PeerRecordError;
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
