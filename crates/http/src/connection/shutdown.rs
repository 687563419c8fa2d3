//! Graceful close sequences.
//!
//! Both sequences enter through [`DeadlineSupervisor::begin_shutdown`], so a second
//! request to close the same connection is a no-op, and both run under the fresh
//! window that call arms. Whatever happens, the supervisor ends up `Closed`.

use std::io;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::trace;

use crate::deadline::{DeadlineSupervisor, Tick};
use crate::protocol::ConnectionError;
use crate::transport::Transport;

/// Closes an HTTP transport: close-notify exchange when encrypted, write-side
/// shutdown when plain.
pub async fn shutdown_transport<S>(transport: &mut Transport<S>, supervisor: &mut DeadlineSupervisor)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !supervisor.begin_shutdown() {
        return;
    }
    trace!(encrypted = transport.is_encrypted(), "shutting down transport");
    bounded(supervisor, transport.shutdown()).await;
}

/// Closes a WebSocket: sends a `Normal` close frame and waits for the peer's reply.
/// An encrypted transport then runs its close-notify exchange as well.
pub async fn close_websocket<S>(ws: &mut WebSocketStream<Transport<S>>, supervisor: &mut DeadlineSupervisor)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !supervisor.begin_shutdown() {
        return;
    }
    trace!("sending close frame");
    bounded(supervisor, async {
        let frame = CloseFrame { code: CloseCode::Normal, reason: Utf8Bytes::from_static("") };
        match ws.close(Some(frame)).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {}
            Err(e) => return Err(into_io(e)),
        }

        while let Some(message) = ws.next().await {
            message.map_err(into_io)?;
        }

        if ws.get_ref().is_encrypted() {
            ws.get_mut().shutdown().await?;
        }
        Ok(())
    })
    .await;
}

async fn bounded<F>(supervisor: &mut DeadlineSupervisor, close: F)
where
    F: Future<Output = io::Result<()>>,
{
    tokio::pin!(close);
    let result = loop {
        select! {
            result = &mut close => break result.map_err(|source| ConnectionError::Shutdown { source }),
            () = supervisor.expired() => {
                if supervisor.tick(Instant::now()) == Tick::ShutdownExpired {
                    break Err(ConnectionError::TimedOut);
                }
            }
        }
    };

    supervisor.finish();
    if let Err(e) = result {
        e.log();
    }
}

fn into_io(e: WsError) -> io::Error {
    match e {
        WsError::Io(e) => e,
        e => io::Error::other(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::Phase;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, duplex};
    use tokio_tungstenite::tungstenite::protocol::Role;

    #[tokio::test]
    async fn plain_shutdown_runs_once() {
        let (mut client, server) = duplex(64);
        let mut transport = Transport::plain(server);
        let mut supervisor = DeadlineSupervisor::default();

        shutdown_transport(&mut transport, &mut supervisor).await;
        assert_eq!(supervisor.phase(), Phase::Closed);
        assert!(supervisor.is_half_closed());

        shutdown_transport(&mut transport, &mut supervisor).await;
        assert_eq!(supervisor.phase(), Phase::Closed);

        let mut buf = Vec::new();
        assert_eq!(client.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_bounded_by_window() {
        let (client, server) = duplex(1024);
        let mut ws = WebSocketStream::from_raw_socket(Transport::plain(server), Role::Server, None).await;
        let mut supervisor = DeadlineSupervisor::new(Duration::from_secs(15));
        let started = Instant::now();

        // the client never answers the close frame
        close_websocket(&mut ws, &mut supervisor).await;

        assert_eq!(supervisor.phase(), Phase::Closed);
        assert!(Instant::now() - started >= Duration::from_secs(15));
        assert!(Instant::now() - started < Duration::from_secs(16));
        drop(client);
    }
}
