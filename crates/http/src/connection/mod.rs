//! Connection state machines.
//!
//! Every accepted socket starts as an [`HttpConnection`]. When a request asks for a
//! WebSocket upgrade the HTTP phase ends with [`Outcome::Upgrade`], and the caller
//! continues with a [`WebSocketConnection`] (or its telemetry flavour,
//! [`PeerConnection`]) over the same transport and deadline supervisor.
//!
//! Each connection runs inside a single task, so its operations never overlap and
//! it needs no locks. Dropping the task cancels whatever operation was pending.

mod http_connection;
mod peer;
mod response_writer;
mod shutdown;
mod websocket;

pub use http_connection::HttpConnection;
pub use peer::{LoggingSink, PeerConnection, PeerHook, TelemetrySink};
pub use response_writer::ResponseWriter;
pub use shutdown::{close_websocket, shutdown_transport};
pub use websocket::{EchoHook, FrameHook, UpgradeParams, WebSocketConnection};

#[cfg(test)]
pub use peer::MockTelemetrySink;


use bytes::{Bytes, BytesMut};
use http::{Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio::time::Instant;

use crate::deadline::{DeadlineSupervisor, Tick};
use crate::protocol::{ConnectionError, prepare_response};
use crate::transport::Transport;

/// How the HTTP phase of a connection ended.
#[derive(Debug)]
pub enum Outcome<S> {
    /// The connection finished and its transport is closed.
    Closed,
    /// A WebSocket upgrade was requested; the connection continues elsewhere.
    Upgrade(Upgrade<S>),
}

/// Everything a WebSocket connection needs to take over from the HTTP phase.
#[derive(Debug)]
pub struct Upgrade<S> {
    pub transport: Transport<S>,
    pub request: Request<Bytes>,
    /// Bytes the HTTP decoder read past the upgrade request.
    pub read_buffer: BytesMut,
    pub supervisor: DeadlineSupervisor,
}

impl<S> Upgrade<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Answers the upgrade request over HTTP instead, then closes the connection.
    pub async fn reject(self, response: Response<Bytes>) -> Result<(), ConnectionError> {
        let Upgrade { mut transport, request, mut supervisor, .. } = self;
        let result = respond(&mut transport, &mut supervisor, &request, response).await;
        if result.is_ok() {
            shutdown_transport(&mut transport, &mut supervisor).await;
        }
        result
    }
}

/// Writes a single closing response under the idle deadline.
async fn respond<S>(
    transport: &mut Transport<S>,
    supervisor: &mut DeadlineSupervisor,
    request: &Request<Bytes>,
    mut response: Response<Bytes>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    prepare_response(&mut response, request.version(), false);
    let mut writer = ResponseWriter::with_capacity(transport, 256);
    writer.write(&response)?;
    with_deadline(supervisor, async { writer.flush().await.map_err(ConnectionError::from) }).await
}

/// Runs `op` against the idle deadline, refreshing it when `op` succeeds.
///
/// Returns [`ConnectionError::TimedOut`] once the deadline passes first; the
/// supervisor has then moved to its shutdown phase.
pub async fn with_deadline<F, T>(supervisor: &mut DeadlineSupervisor, op: F) -> Result<T, ConnectionError>
where
    F: Future<Output = Result<T, ConnectionError>>,
{
    tokio::pin!(op);
    loop {
        select! {
            result = &mut op => {
                if result.is_ok() {
                    supervisor.refresh();
                }
                return result;
            }
            () = supervisor.expired() => match supervisor.tick(Instant::now()) {
                Tick::Timeout | Tick::ShutdownExpired => return Err(ConnectionError::TimedOut),
                Tick::Rearm | Tick::Idle => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::Phase;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, duplex};

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_a_stalled_operation() {
        let mut supervisor = DeadlineSupervisor::new(Duration::from_secs(15));
        let result = with_deadline(&mut supervisor, std::future::pending::<Result<(), ConnectionError>>()).await;

        assert!(matches!(result, Err(ConnectionError::TimedOut)));
        assert_eq!(supervisor.phase(), Phase::ShuttingDown);
    }

    #[tokio::test(start_paused = true)]
    async fn success_refreshes_deadline() {
        let mut supervisor = DeadlineSupervisor::new(Duration::from_secs(15));
        let before = supervisor.deadline();

        tokio::time::advance(Duration::from_secs(5)).await;
        with_deadline(&mut supervisor, async { Ok(()) }).await.unwrap();

        assert!(supervisor.deadline() > before);
    }

    #[tokio::test]
    async fn rejected_upgrade_is_answered_and_closed() {
        let (mut client, server) = duplex(1024);
        let upgrade = Upgrade {
            transport: Transport::plain(server),
            request: Request::get("/nowhere").body(Bytes::new()).unwrap(),
            read_buffer: BytesMut::new(),
            supervisor: DeadlineSupervisor::default(),
        };

        upgrade.reject(crate::protocol::not_found()).await.unwrap();

        let mut received = String::new();
        client.read_to_string(&mut received).await.unwrap();
        assert!(received.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(received.contains("connection: close\r\n"));
    }
}
