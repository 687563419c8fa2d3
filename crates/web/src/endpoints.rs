//! The built-in HTTP endpoints.
//!
//! | path | answer |
//! |------|--------|
//! | `/health` | `{"status":"ok"}` |
//! | `/syncaide.js` | bundled script |
//! | `/syncaide.wasm` | bundled binary |
//! | `/agent/{uid}` | identifiers of the agent's miner endpoint |
//! | `/` | bundled page, debug builds only |
//!
//! A bundled asset that is absent from the store answers `404`.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Request, Response, StatusCode};
use serde::Serialize;
use syncaide_http::handler::{Handler, PathParams};
use syncaide_http::protocol::not_found;

use crate::resources::{self, ResourceStore};
use crate::router::{Router, get};

const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");
const APPLICATION_JAVASCRIPT: HeaderValue = HeaderValue::from_static("application/javascript");
const APPLICATION_WASM: HeaderValue = HeaderValue::from_static("application/wasm");
const TEXT_HTML: HeaderValue = HeaderValue::from_static("text/html; charset=utf-8");

/// Builds the router serving every built-in endpoint.
pub fn routes(store: Arc<dyn ResourceStore>) -> Result<Router, matchit::InsertError> {
    let mut builder = Router::builder()
        .route("/health", get(Health))
        .route("/syncaide.js", get(Asset::new(Arc::clone(&store), resources::SCRIPT, APPLICATION_JAVASCRIPT)))
        .route("/syncaide.wasm", get(Asset::new(Arc::clone(&store), resources::BINARY, APPLICATION_WASM)))
        .route("/agent/{uid}", get(Agent));

    if cfg!(debug_assertions) {
        builder = builder.route("/", get(Asset::new(store, resources::PAGE, TEXT_HTML)));
    }
    builder.build()
}

#[derive(Debug, Clone, Copy)]
pub struct Health;

impl Handler for Health {
    fn call(&self, _request: &Request<Bytes>, _params: &PathParams) -> Response<Bytes> {
        ok(Bytes::from_static(br#"{"status":"ok"}"#), APPLICATION_JSON)
    }
}

/// Serves one named resource from the store.
pub struct Asset {
    store: Arc<dyn ResourceStore>,
    name: &'static str,
    content_type: HeaderValue,
}

impl Asset {
    pub fn new(store: Arc<dyn ResourceStore>, name: &'static str, content_type: HeaderValue) -> Self {
        Self { store, name, content_type }
    }
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset").field("name", &self.name).field("content_type", &self.content_type).finish_non_exhaustive()
    }
}

impl Handler for Asset {
    fn call(&self, _request: &Request<Bytes>, _params: &PathParams) -> Response<Bytes> {
        match self.store.lookup(self.name) {
            Some(content) => ok(content, self.content_type.clone()),
            None => not_found(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AgentInfo<'a> {
    uid: &'a str,
    miner: String,
}

/// Tells an agent where its miner endpoint lives.
#[derive(Debug, Clone, Copy)]
pub struct Agent;

impl Handler for Agent {
    fn call(&self, _request: &Request<Bytes>, params: &PathParams) -> Response<Bytes> {
        let Some(uid) = params.get("uid") else {
            return not_found();
        };
        let info = AgentInfo { uid, miner: format!("/miner/{uid}") };
        match serde_json::to_vec(&info) {
            Ok(body) => ok(Bytes::from(body), APPLICATION_JSON),
            Err(e) => {
                tracing::error!(cause = %e, "agent info not serializable");
                let mut response = Response::new(Bytes::new());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}

fn ok(body: Bytes, content_type: HeaderValue) -> Response<Bytes> {
    let mut response = Response::new(body);
    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    response
}
