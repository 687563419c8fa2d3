//! Byte-stream transport shared by every connection kind.
//!
//! [`Transport`] hides whether a socket is plain or wrapped in TLS: it implements
//! `AsyncRead` and `AsyncWrite` by delegating to the active variant, so the codecs and
//! connections above it read and write without caring which one it is. The variant is
//! chosen once, by [`Transport::handshake`], and never changes.

pub(crate) mod tls;

pub use tls::TlsError;
pub use tls::acceptor_from_pem;
pub use tls::load_acceptor;

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::trace;

use crate::protocol::ConnectionError;

/// Whether the listener decided a socket speaks TLS.
///
/// `Undetermined` is reserved for sniffing the protocol from the first bytes; nothing
/// produces it today and it is handled exactly like `Disabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    #[default]
    Disabled,
    Enabled,
    Undetermined,
}

impl SecurityMode {
    pub fn is_secured(self) -> bool {
        matches!(self, SecurityMode::Enabled)
    }
}

pin_project! {
    #[project = TransportProj]
    pub enum Transport<S> {
        Plain { #[pin] stream: S },
        Encrypted { #[pin] stream: TlsStream<S> },
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn plain(stream: S) -> Self {
        Transport::Plain { stream }
    }

    /// Wraps an accepted socket, running the TLS server handshake when `mode` asks for it.
    pub async fn handshake(stream: S, mode: SecurityMode, acceptor: Option<&TlsAcceptor>) -> Result<Self, ConnectionError> {
        if !mode.is_secured() {
            return Ok(Transport::plain(stream));
        }

        let acceptor = acceptor.ok_or_else(|| ConnectionError::handshake("tls requested but no certificate configured"))?;
        let stream = acceptor.accept(stream).await.map_err(ConnectionError::handshake)?;
        trace!("tls handshake finished");
        Ok(Transport::Encrypted { stream })
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Transport::Encrypted { .. })
    }

    /// The socket underneath any TLS layer.
    pub fn get_ref(&self) -> &S {
        match self {
            Transport::Plain { stream } => stream,
            Transport::Encrypted { stream } => stream.get_ref().0,
        }
    }

    /// Closes the transport.
    ///
    /// Plain sockets shut down their write side. Encrypted sockets send close-notify
    /// and then wait for the peer's own close-notify (or end of stream), discarding
    /// whatever application data is still in flight. The wait is unbounded; callers
    /// race it against their deadline.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain { stream } => stream.shutdown().await,
            Transport::Encrypted { stream } => {
                stream.shutdown().await?;
                let mut discard = [0u8; 1024];
                while stream.read(&mut discard).await? != 0 {}
                Ok(())
            }
        }
    }
}

impl<S> fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Plain { .. } => f.write_str("Transport::Plain"),
            Transport::Encrypted { .. } => f.write_str("Transport::Encrypted"),
        }
    }
}

impl<S> AsyncRead for Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            TransportProj::Plain { stream } => stream.poll_read(cx, buf),
            TransportProj::Encrypted { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl<S> AsyncWrite for Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.project() {
            TransportProj::Plain { stream } => stream.poll_write(cx, buf),
            TransportProj::Encrypted { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            TransportProj::Plain { stream } => stream.poll_flush(cx),
            TransportProj::Encrypted { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            TransportProj::Plain { stream } => stream.poll_shutdown(cx),
            TransportProj::Encrypted { stream } => stream.poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn plain_delegates_io() {
        let (client, server) = duplex(64);
        let mut transport = Transport::handshake(server, SecurityMode::Disabled, None).await.unwrap();
        assert!(!transport.is_encrypted());

        let mut client = client;
        client.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        transport.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        transport.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn undetermined_is_plain() {
        let (_client, server) = duplex(64);
        let transport = Transport::handshake(server, SecurityMode::Undetermined, None).await.unwrap();
        assert!(!transport.is_encrypted());
    }

    #[tokio::test]
    async fn enabled_without_acceptor_fails() {
        let (_client, server) = duplex(64);
        let result = Transport::handshake(server, SecurityMode::Enabled, None).await;
        assert!(matches!(result, Err(ConnectionError::Handshake { .. })));
    }

    #[tokio::test]
    async fn encrypted_round_trip_and_close_notify() {
        let (client, server) = duplex(16 * 1024);
        let acceptor = tls::fixtures::acceptor();
        let server_task = tokio::spawn(async move {
            let mut transport = Transport::handshake(server, SecurityMode::Enabled, Some(&acceptor)).await.unwrap();
            assert!(transport.is_encrypted());

            let mut buf = [0u8; 4];
            transport.read_exact(&mut buf).await.unwrap();
            transport.write_all(&buf).await.unwrap();
            transport.flush().await.unwrap();
            transport.shutdown().await
        });

        let mut client = tls::fixtures::connector().connect(tls::fixtures::server_name(), client).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        client.flush().await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        // only the server's close-notify ends a tls stream without an error
        let mut rest = Vec::new();
        assert_eq!(client.read_to_end(&mut rest).await.unwrap(), 0);

        // and the client's own close-notify ends the server's wait
        client.shutdown().await.unwrap();
        assert!(server_task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn plain_shutdown_signals_eof() {
        let (mut client, server) = duplex(64);
        let mut transport = Transport::plain(server);
        transport.shutdown().await.unwrap();

        let mut buf = Vec::new();
        assert_eq!(client.read_to_end(&mut buf).await.unwrap(), 0);
    }
}
