//! Core HTTP protocol abstractions shared by the codec and the connections.
//!
//! - **Message framing** ([`message`]): [`PayloadSize`] describes how a request
//!   body is delimited on the wire
//! - **Requests** ([`request`]): [`RequestHeader`] wraps a parsed request head and
//!   answers the keep-alive and upgrade questions the connection asks of it
//! - **Responses** ([`response`]): builders for the fixed responses the engine
//!   produces on its own (404, 400) and [`prepare_response`], which stamps the
//!   connection semantics of the request onto a handler's response
//! - **Errors** ([`error`]): one error enum per layer, plus [`ConnectionError`]
//!   which classifies how a connection ended

mod message;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;
pub(crate) use request::{is_upgrade, keep_alive};

mod response;
pub use response::bad_request;
pub use response::not_found;
pub use response::prepare_response;

mod error;
pub use error::ConnectionError;
pub use error::ParseError;
pub use error::SendError;
