//! Bundled assets served over HTTP.
//!
//! The store is filled once at startup and only read afterwards, so it is shared
//! between connections behind an `Arc` without locking.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info};

pub const SCRIPT: &str = "syncaide.js";
pub const BINARY: &str = "syncaide.wasm";
pub const PAGE: &str = "syncaide.html";

/// Names loaded by [`BundledResources::load`].
pub const BUNDLED: [&str; 3] = [SCRIPT, BINARY, PAGE];

#[cfg_attr(test, mockall::automock)]
pub trait ResourceStore: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Bytes>;
}

#[derive(Debug, Error)]
#[error("failed to read resource {path:?}: {source}")]
pub struct ResourceError {
    path: PathBuf,
    #[source]
    source: io::Error,
}

#[derive(Debug, Clone, Default)]
pub struct BundledResources {
    resources: HashMap<String, Bytes>,
}

impl BundledResources {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads every bundled asset present in `dir`; missing files are left out.
    pub fn load(dir: &Path) -> Result<Self, ResourceError> {
        let mut resources = HashMap::new();
        for name in BUNDLED {
            let path = dir.join(name);
            match fs::read(&path) {
                Ok(content) => {
                    debug!(name, len = content.len(), "resource loaded");
                    resources.insert(name.to_owned(), Bytes::from(content));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => info!(name, "resource not bundled"),
                Err(source) => return Err(ResourceError { path, source }),
            }
        }
        Ok(Self { resources })
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceStore for BundledResources {
    fn lookup(&self, name: &str) -> Option<Bytes> {
        self.resources.get(name).cloned()
    }
}

impl<K, V> FromIterator<(K, V)> for BundledResources
where
    K: Into<String>,
    V: Into<Bytes>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { resources: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}
