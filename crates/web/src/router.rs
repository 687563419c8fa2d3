use std::collections::HashMap;

use bytes::Bytes;
use http::{Method, Request};
use syncaide_http::handler::{self, Handler, Route};
use tracing::trace;

type InnerRouter<T> = matchit::Router<T>;

/// Path router over `matchit`.
///
/// A path may hold one handler per method. Requests whose method has no handler on
/// a known path are treated like unknown paths.
pub struct Router {
    inner_router: InnerRouter<Vec<RouterItem>>,
}

pub struct RouterItem {
    method: Method,
    handler: Box<dyn Handler>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }
}

impl handler::Router for Router {
    fn at(&self, request: &Request<Bytes>) -> Option<Route<'_>> {
        let path = request.uri().path();
        let matched = self
            .inner_router
            .at(path)
            .inspect_err(|e| trace!(path, cause = %e, "no route"))
            .ok()?;

        let item = matched.value.iter().find(|item| item.method == request.method())?;
        Some(Route { handler: item.handler.as_ref(), params: matched.params.iter().collect() })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RouterItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterItem").field("method", &self.method).finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct RouterBuilder {
    data: HashMap<String, Vec<RouterItem>>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn route(mut self, route: impl Into<String>, item: RouterItem) -> Self {
        self.data.entry(route.into()).or_default().push(item);
        self
    }

    pub fn build(self) -> Result<Router, matchit::InsertError> {
        let mut inner_router = InnerRouter::new();
        for (path, items) in self.data {
            inner_router.insert(path, items)?;
        }
        Ok(Router { inner_router })
    }
}

pub fn get<H: Handler + 'static>(handler: H) -> RouterItem {
    RouterItem { method: Method::GET, handler: Box::new(handler) }
}
