//! The listener around the connection engine.
//!
//! One tokio task per accepted socket. The task wraps the socket in a
//! [`Transport`], runs the HTTP phase and, when the client upgrades, the
//! WebSocket flavour its path selects. Errors end at the task boundary, where
//! they are logged once.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use syncaide_http::connection::{
    EchoHook, HttpConnection, LoggingSink, Outcome, PeerConnection, PeerHook, TelemetrySink, UpgradeParams, WebSocketConnection,
    with_deadline,
};
use syncaide_http::deadline::DeadlineSupervisor;
use syncaide_http::protocol::{ConnectionError, not_found};
use syncaide_http::transport::{SecurityMode, TlsError, Transport, load_acceptor};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::select;
use tokio::task::{JoinError, JoinSet};
use tokio_rustls::TlsAcceptor;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::endpoints;
use crate::resources::{BundledResources, ResourceError, ResourceStore};
use crate::router::Router;
use crate::upgrade::{UpgradeKind, UpgradeRoutes};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("tls setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("route registration failed: {0}")]
    Route(#[from] matchit::InsertError),

    #[error(transparent)]
    Resources(#[from] ResourceError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

pub struct ServerBuilder {
    config: ServerConfig,
    resources: Option<Arc<dyn ResourceStore>>,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl ServerBuilder {
    fn new(config: ServerConfig) -> Self {
        Self { config, resources: None, sink: None }
    }

    /// Serves assets from `store` instead of loading the configured assets directory.
    #[must_use]
    pub fn resources(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.resources = Some(store);
        self
    }

    /// Where peer telemetry goes; logged by default.
    #[must_use]
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let ServerBuilder { config, resources, sink } = self;
        config.validate()?;

        let acceptor = match &config.tls {
            Some(tls) => Some(load_acceptor(&tls.cert, &tls.key)?),
            None => None,
        };
        let resources = match resources {
            Some(resources) => resources,
            None => Arc::new(BundledResources::load(&config.assets_dir)?),
        };

        let idle_timeout = config.idle_timeout();
        let inner = Inner {
            router: endpoints::routes(resources)?,
            upgrades: UpgradeRoutes::new(&config.websocket_path)?,
            sink: sink.unwrap_or_else(|| Arc::new(LoggingSink)),
            acceptor,
            subprotocol: config.websocket_subprotocol,
            idle_timeout,
            pipeline_capacity: config.pipeline_capacity,
        };
        Ok(Server { address: config.address, inner: Arc::new(inner) })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder").field("config", &self.config).finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct Server {
    address: String,
    inner: Arc<Inner>,
}

/// Shared read-only by every connection task.
struct Inner {
    router: Router,
    upgrades: UpgradeRoutes,
    sink: Arc<dyn TelemetrySink>,
    acceptor: Option<TlsAcceptor>,
    subprotocol: Option<String>,
    idle_timeout: Duration,
    pipeline_capacity: usize,
}

impl Server {
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    pub fn is_secured(&self) -> bool {
        self.inner.acceptor.is_some()
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.address.as_str())
            .await
            .map_err(|source| ServerError::Bind { address: self.address.clone(), source })?;
        info!(address = %self.address, tls = self.is_secured(), "listening");
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Accepts connections from `listener` until `shutdown` resolves.
    ///
    /// Connections in flight at that point are not interrupted; this returns once
    /// each of them has ended on its own deadline.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn(&mut connections, stream, peer),
                    Err(e) => warn!(cause = %e, "failed to accept"),
                },
                Some(joined) = connections.join_next() => reap(joined),
            }
        }

        info!(in_flight = connections.len(), "stopped accepting");
        while let Some(joined) = connections.join_next().await {
            reap(joined);
        }
    }

    fn spawn<S>(&self, connections: &mut JoinSet<()>, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let server = self.clone();
        let task = async move {
            if let Err(e) = server.serve_connection(stream).await {
                e.log();
            }
        };
        connections.spawn(task.instrument(info_span!("connection", %peer)));
    }

    /// Drives one accepted stream through its whole lifetime.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let inner = self.inner.as_ref();
        let mut supervisor = DeadlineSupervisor::new(inner.idle_timeout);
        let mode = if inner.acceptor.is_some() { SecurityMode::Enabled } else { SecurityMode::Disabled };
        let transport = with_deadline(&mut supervisor, Transport::handshake(stream, mode, inner.acceptor.as_ref())).await?;

        let outcome = HttpConnection::new(transport, supervisor).pipeline_capacity(inner.pipeline_capacity).process(&inner.router).await?;
        let Outcome::Upgrade(upgrade) = outcome else {
            return Ok(());
        };

        match inner.upgrades.at(upgrade.request.uri().path()) {
            Some((UpgradeKind::Peer, params)) => {
                let params = UpgradeParams::from_request(&upgrade.request, &params);
                PeerConnection::new(upgrade, params, PeerHook::new(Arc::clone(&inner.sink))).process().await
            }
            Some((UpgradeKind::Echo, params)) => {
                let params = UpgradeParams::from_request(&upgrade.request, &params);
                let connection = WebSocketConnection::new(upgrade, params, EchoHook);
                match &inner.subprotocol {
                    Some(protocol) => connection.subprotocol(protocol.as_str()).process().await,
                    None => connection.process().await,
                }
            }
            None => upgrade.reject(not_found()).await,
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.address)
            .field("tls", &self.is_secured())
            .field("idle_timeout", &self.inner.idle_timeout)
            .field("pipeline_capacity", &self.inner.pipeline_capacity)
            .finish_non_exhaustive()
    }
}

fn reap(joined: Result<(), JoinError>) {
    match joined {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => ConnectionError::Cancelled.log(),
        Err(e) => error!(cause = %e, "connection task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;
    use futures::{SinkExt, StreamExt};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use syncaide_http::codec::PeerRecord;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio_tungstenite::client_async;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::client::generate_key;
    use tokio_tungstenite::tungstenite::http::Request as ClientRequest;

    #[derive(Default)]
    struct Recorded(Mutex<Vec<(Option<String>, PeerRecord)>>);

    impl TelemetrySink for Recorded {
        fn record(&self, params: &UpgradeParams, record: PeerRecord) {
            self.0.lock().unwrap().push((params.param("uid").map(str::to_owned), record));
        }
    }

    fn server(config: ServerConfig, sink: Arc<dyn TelemetrySink>) -> Server {
        Server::builder(config).resources(Arc::new(BundledResources::empty())).telemetry(sink).build().unwrap()
    }

    #[tokio::test]
    async fn health_over_tcp_then_shutdown() {
        let server = server(ServerConfig::default(), Arc::new(LoggingSink));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stopped.await;
                })
                .await;
        });

        let mut client = TcpStream::connect(address).await.unwrap();
        client.write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8(response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.ends_with(r#"{"status":"ok"}"#), "{response}");

        stop.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn miner_upgrade_forwards_telemetry() {
        let sink = Arc::new(Recorded::default());
        let server = server(ServerConfig::default(), Arc::clone(&sink) as Arc<dyn TelemetrySink>);
        let (client, io) = duplex(4096);
        let task = tokio::spawn(async move { server.serve_connection(io).await });

        let (mut ws, _) = client_async("ws://localhost/miner/7f3a", client).await.unwrap();
        let record = PeerRecord::new("10.0.0.5", 42);
        ws.send(Message::binary(record.to_bytes())).await.unwrap();
        assert_eq!(ws.next().await.unwrap().unwrap(), Message::binary(record.to_bytes()));

        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
        assert!(task.await.unwrap().is_ok());

        let recorded = sink.0.lock().unwrap();
        assert_eq!(recorded.as_slice(), &[(Some("7f3a".to_owned()), record)]);
    }

    #[tokio::test]
    async fn echo_path_confirms_configured_subprotocol() {
        let config = ServerConfig { websocket_path: "/echo".to_owned(), websocket_subprotocol: Some("syncaide.v1".to_owned()), ..ServerConfig::default() };
        let server = server(config, Arc::new(LoggingSink));
        let (client, io) = duplex(4096);
        let task = tokio::spawn(async move { server.serve_connection(io).await });

        let request = ClientRequest::get("ws://localhost/echo")
            .header("Host", "localhost")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Protocol", "syncaide.v1")
            .body(())
            .unwrap();
        let (mut ws, response) = client_async(request, client).await.unwrap();
        assert_eq!(response.headers()["sec-websocket-protocol"], "syncaide.v1");

        ws.send(Message::text("ping")).await.unwrap();
        assert_eq!(ws.next().await.unwrap().unwrap(), Message::text("ping"));

        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn unknown_upgrade_path_is_404() {
        let server = server(ServerConfig::default(), Arc::new(LoggingSink));
        let (mut client, io) = duplex(4096);
        let task = tokio::spawn(async move { server.serve_connection(io).await });

        client
            .write_all(
                b"GET /elsewhere HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
                  Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
            )
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8(response).unwrap();

        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");
        assert!(response.to_ascii_lowercase().contains("connection: close\r\n"), "{response}");
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let server = server(ServerConfig { idle_timeout_secs: 2, ..ServerConfig::default() }, Arc::new(LoggingSink));
        let (_client, io) = duplex(64);

        let result = server.serve_connection(io).await;
        assert!(matches!(result, Err(ConnectionError::TimedOut)), "{result:?}");
    }

    #[test]
    fn missing_certificate_fails_build() {
        let config = ServerConfig {
            tls: Some(TlsConfig { cert: PathBuf::from("/nonexistent/cert.pem"), key: PathBuf::from("/nonexistent/key.pem") }),
            ..ServerConfig::default()
        };
        let result = Server::builder(config).resources(Arc::new(BundledResources::empty())).build();
        assert!(matches!(result, Err(ServerError::Tls(TlsError::Io { .. }))));
    }

    #[test]
    fn echo_path_clashing_with_miner_fails_build() {
        let config = ServerConfig { websocket_path: "/miner/{id}".to_owned(), ..ServerConfig::default() };
        let result = Server::builder(config).resources(Arc::new(BundledResources::empty())).build();
        assert!(matches!(result, Err(ServerError::Route(_))));
    }

    #[test]
    fn plain_unless_tls_configured() {
        let server = server(ServerConfig::default(), Arc::new(LoggingSink));
        assert!(!server.is_secured());
        assert_eq!(server.inner.pipeline_capacity, 8);
    }
}
