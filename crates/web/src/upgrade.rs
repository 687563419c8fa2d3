use syncaide_http::handler::PathParams;

pub const MINER_PATH: &str = "/miner/{uid}";

/// The WebSocket flavour an upgrade path leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeKind {
    /// Worker telemetry.
    Peer,
    /// Plain echo.
    Echo,
}

/// Maps upgrade request paths to the connection that serves them.
#[derive(Debug)]
pub struct UpgradeRoutes {
    inner_router: matchit::Router<UpgradeKind>,
}

impl UpgradeRoutes {
    pub fn new(echo_path: &str) -> Result<Self, matchit::InsertError> {
        let mut inner_router = matchit::Router::new();
        inner_router.insert(MINER_PATH, UpgradeKind::Peer)?;
        inner_router.insert(echo_path, UpgradeKind::Echo)?;
        Ok(Self { inner_router })
    }

    pub fn at(&self, path: &str) -> Option<(UpgradeKind, PathParams)> {
        let matched = self.inner_router.at(path).ok()?;
        Some((*matched.value, matched.params.iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miner_and_echo_paths() {
        let routes = UpgradeRoutes::new("/ws").unwrap();

        let (kind, params) = routes.at("/miner/abc").unwrap();
        assert_eq!(kind, UpgradeKind::Peer);
        assert_eq!(params.get("uid"), Some("abc"));

        let (kind, params) = routes.at("/ws").unwrap();
        assert_eq!(kind, UpgradeKind::Echo);
        assert!(params.is_empty());

        assert!(routes.at("/health").is_none());
    }

    #[test]
    fn echo_path_must_not_shadow_miner() {
        assert!(UpgradeRoutes::new(MINER_PATH).is_err());
    }
}
