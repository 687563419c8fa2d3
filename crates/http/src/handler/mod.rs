//! The boundary between a connection and the application.
//!
//! A connection asks its [`Router`] for a [`Route`] to each request it decodes and
//! calls the matched [`Handler`] synchronously. Unmatched requests are answered with
//! [`not_found`](crate::protocol::not_found) by the connection itself.

use bytes::Bytes;
use http::{Request, Response};

pub trait Handler: Send + Sync {
    fn call(&self, request: &Request<Bytes>, params: &PathParams) -> Response<Bytes>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&Request<Bytes>, &PathParams) -> Response<Bytes> + Send + Sync,
{
    fn call(&self, request: &Request<Bytes>, params: &PathParams) -> Response<Bytes> {
        (self.f)(request, params)
    }
}

pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&Request<Bytes>, &PathParams) -> Response<Bytes> + Send + Sync,
{
    HandlerFn { f }
}

/// Maps a request to the handler that answers it.
pub trait Router: Send + Sync {
    fn at(&self, request: &Request<Bytes>) -> Option<Route<'_>>;
}

pub struct Route<'router> {
    pub handler: &'router dyn Handler,
    pub params: PathParams,
}

impl std::fmt::Debug for Route<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route").field("params", &self.params).finish_non_exhaustive()
    }
}

/// Named segments captured from the request path, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.entries.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for PathParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    struct Single<H>(H);

    impl<H: Handler> Router for Single<H> {
        fn at(&self, request: &Request<Bytes>) -> Option<Route<'_>> {
            let uid = request.uri().path().strip_prefix("/agent/")?;
            Some(Route { handler: &self.0, params: [("uid", uid)].into_iter().collect() })
        }
    }

    #[test]
    fn handler_sees_params() {
        let router = Single(make_handler(|_req: &Request<Bytes>, params: &PathParams| {
            Response::new(Bytes::copy_from_slice(params.get("uid").unwrap_or_default().as_bytes()))
        }));

        let request = Request::get("/agent/7f3a").body(Bytes::new()).unwrap();
        let route = router.at(&request).unwrap();
        let response = route.handler.call(&request, &route.params);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body()[..], b"7f3a");
        assert!(router.at(&Request::get("/health").body(Bytes::new()).unwrap()).is_none());
    }

    #[test]
    fn params_keep_path_order() {
        let params: PathParams = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(params.len(), 2);
        assert_eq!(params.iter().collect::<Vec<_>>(), vec![("a", "1"), ("b", "2")]);
        assert_eq!(params.get("c"), None);
        assert!(PathParams::empty().is_empty());
    }
}
