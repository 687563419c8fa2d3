use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("body size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeBody { current_size: u64, max_size: u64 },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn too_large_body(current_size: u64, max_size: u64) -> Self {
        Self::TooLargeBody { current_size, max_size }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_response<S: ToString>(str: S) -> Self {
        Self::InvalidResponse { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// How a connection ended when it did not end cleanly.
///
/// Every connection error is absorbed at the connection boundary; [`ConnectionError::log`]
/// applies the logging policy for each class.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The connection task was torn down while an operation was pending.
    #[error("connection cancelled")]
    Cancelled,

    /// Nothing was read or written within the idle window.
    #[error("idle deadline exceeded")]
    TimedOut,

    #[error("{op} failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("websocket {op} failed: {source}")]
    WebSocket {
        op: &'static str,
        #[source]
        source: tungstenite::Error,
    },

    #[error("handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("shutdown failed: {source}")]
    Shutdown {
        #[source]
        source: io::Error,
    },
}

impl ConnectionError {
    pub fn transport(op: &'static str, source: io::Error) -> Self {
        Self::Transport { op, source }
    }

    pub fn websocket(op: &'static str, source: tungstenite::Error) -> Self {
        match source {
            tungstenite::Error::Io(source) => Self::Transport { op, source },
            source => Self::WebSocket { op, source },
        }
    }

    pub fn handshake<S: ToString>(reason: S) -> Self {
        Self::Handshake { reason: reason.to_string() }
    }

    /// Logs the error at the level its class calls for. Cancellation is never reported.
    pub fn log(&self) {
        match self {
            Self::Cancelled => {}
            Self::TimedOut => debug!("connection idle, closed"),
            Self::Shutdown { source } => debug!(cause = %source, "shutdown"),
            Self::Transport { op, source } => warn!(op, cause = %source, "transport error"),
            Self::WebSocket { op, source } => warn!(op, cause = %source, "websocket error"),
            Self::Handshake { reason } => warn!(op = "handshake", cause = %reason, "handshake error"),
        }
    }
}

impl From<SendError> for ConnectionError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => Self::transport("write", source),
            SendError::InvalidResponse { reason } => Self::transport("write", io::Error::new(io::ErrorKind::InvalidData, reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_io_errors_are_transport_errors() {
        let e = ConnectionError::websocket("read", tungstenite::Error::Io(io::ErrorKind::BrokenPipe.into()));
        assert!(matches!(e, ConnectionError::Transport { op: "read", .. }));

        let e = ConnectionError::websocket("read", tungstenite::Error::AttackAttempt);
        assert!(matches!(e, ConnectionError::WebSocket { op: "read", .. }));
    }

    #[test]
    fn send_errors_map_to_write() {
        let e: ConnectionError = SendError::io(io::Error::from(io::ErrorKind::BrokenPipe)).into();
        assert!(matches!(e, ConnectionError::Transport { op: "write", .. }));
    }
}
