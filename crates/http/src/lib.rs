//! Connection lifecycle engine for a dual-protocol HTTP and WebSocket endpoint.
//!
//! Every accepted socket is wrapped in a [`transport::Transport`], plain or TLS, and
//! driven by one task through a chain of state machines:
//!
//! ```text
//!   Transport::handshake ──▶ HttpConnection ──Outcome::Upgrade──▶ WebSocketConnection
//!                                 │                                    │
//!                                 └─────────── shutdown ◀──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use tokio::net::TcpListener;
//! use syncaide_http::connection::{EchoHook, HttpConnection, Outcome, UpgradeParams, WebSocketConnection};
//! use syncaide_http::deadline::DeadlineSupervisor;
//! use syncaide_http::handler::{Handler, PathParams, Route, Router, make_handler};
//! use syncaide_http::transport::Transport;
//!
//! struct Hello<H>(H);
//!
//! impl<H: Handler> Router for Hello<H> {
//!     fn at(&self, _request: &Request<Bytes>) -> Option<Route<'_>> {
//!         Some(Route { handler: &self.0, params: PathParams::empty() })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let router = Arc::new(Hello(make_handler(|_req: &Request<Bytes>, _params: &PathParams| {
//!         Response::new(Bytes::from_static(b"hello\n"))
//!     })));
//!
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!         let router = router.clone();
//!         tokio::spawn(async move {
//!             let connection = HttpConnection::new(Transport::plain(stream), DeadlineSupervisor::default());
//!             let result = match connection.process(router.as_ref()).await {
//!                 Ok(Outcome::Upgrade(upgrade)) => {
//!                     let params = UpgradeParams::from_request(&upgrade.request, &PathParams::empty());
//!                     WebSocketConnection::new(upgrade, params, EchoHook).process().await
//!                 }
//!                 Ok(Outcome::Closed) => Ok(()),
//!                 Err(e) => Err(e),
//!             };
//!             if let Err(e) = result {
//!                 e.log();
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! - [`transport`]: plain and TLS sockets behind one `AsyncRead + AsyncWrite` type
//! - [`deadline`]: the per-connection idle deadline
//! - [`pipeline`]: the bounded, ordered response queue behind HTTP pipelining
//! - [`connection`]: the HTTP, WebSocket and peer telemetry state machines, and the
//!   graceful shutdown sequences they end with
//! - [`codec`]: HTTP/1.x request decoding, response encoding and the peer record
//! - [`protocol`]: request/response helpers and error types
//! - [`handler`]: the router and handler traits the application implements
//!
//! # Limits
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - request heads up to 8 KiB with at most 64 headers, bodies up to 64 KiB
//! - responses are fully buffered

pub mod codec;
pub mod connection;
pub mod deadline;
pub mod handler;
pub mod pipeline;
pub mod protocol;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
