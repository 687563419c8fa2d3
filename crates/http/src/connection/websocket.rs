//! WebSocket connections.
//!
//! [`WebSocketConnection`] takes over an [`Upgrade`] from the HTTP phase, answers the
//! opening handshake itself and then echoes every data frame back to the peer with
//! the same text or binary marker. What else happens to a frame is up to its
//! [`FrameHook`].

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::header::{self, HeaderValue};
use http::{Request, Response, StatusCode};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, trace};

use crate::connection::{Upgrade, close_websocket, respond, shutdown_transport, with_deadline};
use crate::deadline::DeadlineSupervisor;
use crate::handler::PathParams;
use crate::protocol::{ConnectionError, bad_request};
use crate::transport::Transport;

const SUPPORTED_VERSION: &str = "13";

/// Invoked for every text or binary frame before it is echoed.
pub trait FrameHook: Send {
    fn on_frame(&mut self, params: &UpgradeParams, payload: &[u8]);
}

/// Echo only.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHook;

impl FrameHook for EchoHook {
    fn on_frame(&mut self, _params: &UpgradeParams, _payload: &[u8]) {}
}

/// Parameters negotiated by the upgrade request, carried into the connection as an
/// opaque JSON object:
///
/// ```json
/// { "path": "/miner/42", "params": { "uid": "42" }, "query": { "threads": "4" } }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeParams(Value);

impl UpgradeParams {
    pub fn from_request(request: &Request<Bytes>, params: &PathParams) -> Self {
        let path_params: Map<String, Value> = params.iter().map(|(k, v)| (k.to_owned(), Value::from(v))).collect();

        let query = request
            .uri()
            .query()
            .map(|query| {
                serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_else(|e| {
                    debug!(cause = %e, "ignoring undecodable query");
                    Vec::new()
                })
            })
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<_, _>>();

        let mut blob = Map::new();
        blob.insert("path".into(), Value::from(request.uri().path()));
        blob.insert("params".into(), Value::Object(path_params));
        blob.insert("query".into(), Value::Object(query));
        Self(Value::Object(blob))
    }

    pub fn path(&self) -> Option<&str> {
        self.0.get("path")?.as_str()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.0.get("params")?.get(name)?.as_str()
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.0.get("query")?.get(name)?.as_str()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for UpgradeParams {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[derive(Debug)]
pub struct WebSocketConnection<S, H> {
    upgrade: Upgrade<S>,
    params: UpgradeParams,
    hook: H,
    subprotocol: Option<String>,
}

impl<S, H> WebSocketConnection<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: FrameHook,
{
    pub fn new(upgrade: Upgrade<S>, params: UpgradeParams, hook: H) -> Self {
        Self { upgrade, params, hook, subprotocol: None }
    }

    /// Accepts clients offering `protocol` and confirms it in the handshake.
    #[must_use]
    pub fn subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = Some(protocol.into());
        self
    }

    pub fn params(&self) -> &UpgradeParams {
        &self.params
    }

    pub async fn process(self) -> Result<(), ConnectionError> {
        let WebSocketConnection { upgrade, params, mut hook, subprotocol } = self;
        let Upgrade { mut transport, request, read_buffer, mut supervisor } = upgrade;

        let response = match accept(&request, subprotocol.as_deref()) {
            Ok(response) => response,
            Err(reason) => {
                let result = respond(&mut transport, &mut supervisor, &request, bad_request()).await;
                if result.is_ok() {
                    shutdown_transport(&mut transport, &mut supervisor).await;
                }
                return Err(ConnectionError::handshake(reason));
            }
        };
        write_handshake(&mut transport, &mut supervisor, response).await?;
        trace!(path = params.path(), "websocket open");

        let mut ws = WebSocketStream::from_partially_read(transport, read_buffer.to_vec(), Role::Server, None).await;
        let result = frame_loop(&mut ws, &mut supervisor, &params, &mut hook).await;

        // a broken transport cannot carry a close frame
        if !matches!(result, Err(ConnectionError::Transport { .. })) {
            close_websocket(&mut ws, &mut supervisor).await;
        }
        result
    }
}

async fn frame_loop<S, H>(
    ws: &mut WebSocketStream<Transport<S>>,
    supervisor: &mut DeadlineSupervisor,
    params: &UpgradeParams,
    hook: &mut H,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: FrameHook,
{
    loop {
        let frame = with_deadline(supervisor, async {
            match ws.next().await {
                Some(Ok(message)) => Ok(Some(message)),
                Some(Err(e)) => Err(ConnectionError::websocket("read", e)),
                None => Ok(None),
            }
        })
        .await?;

        let echo = match frame {
            Some(Message::Text(text)) => {
                hook.on_frame(params, text.as_bytes());
                Message::Text(text)
            }
            Some(Message::Binary(payload)) => {
                hook.on_frame(params, &payload);
                Message::Binary(payload)
            }
            Some(Message::Close(frame)) => {
                trace!(?frame, "close frame received");
                return Ok(());
            }
            Some(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            None => return Ok(()),
        };

        with_deadline(supervisor, async { ws.send(echo).await.map_err(|e| ConnectionError::websocket("write", e)) }).await?;
    }
}

/// Validates the opening handshake and builds the `101` reply.
fn accept(request: &Request<Bytes>, subprotocol: Option<&str>) -> Result<Response<Bytes>, &'static str> {
    let headers = request.headers();
    if headers.get(header::SEC_WEBSOCKET_VERSION).and_then(|v| v.to_str().ok()) != Some(SUPPORTED_VERSION) {
        return Err("unsupported websocket version");
    }
    let key = headers.get(header::SEC_WEBSOCKET_KEY).ok_or("missing websocket key")?;

    let accept = HeaderValue::from_str(&derive_accept_key(key.as_bytes())).map_err(|_e| "invalid websocket key")?;

    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let reply = response.headers_mut();
    reply.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    reply.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    reply.insert(header::SEC_WEBSOCKET_ACCEPT, accept);

    if let Some(protocol) = subprotocol {
        let offered = headers
            .get_all(header::SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|p| p.trim() == protocol);
        if offered {
            let value = HeaderValue::from_str(protocol).map_err(|_e| "invalid subprotocol")?;
            reply.insert(header::SEC_WEBSOCKET_PROTOCOL, value);
        }
    }
    Ok(response)
}

async fn write_handshake<S>(
    transport: &mut Transport<S>,
    supervisor: &mut DeadlineSupervisor,
    response: Response<Bytes>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut writer = crate::connection::ResponseWriter::with_capacity(transport, 256);
    writer.write(&response)?;
    with_deadline(supervisor, async { writer.flush().await.map_err(ConnectionError::from) }).await
}
