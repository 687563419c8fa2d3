//! Fixtures shared by the benches.

/// A named input fed unchanged to every iteration of a bench.
#[derive(Debug, Copy, Clone)]
pub struct Fixture {
    name: &'static str,
    content: &'static [u8],
}

impl Fixture {
    pub const fn new(name: &'static str, content: &'static [u8]) -> Self {
        Self { name, content }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn content(&self) -> &'static [u8] {
        self.content
    }

    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// A health probe with the few headers a load balancer sends.
pub const SMALL_REQUEST: Fixture = Fixture::new("small_request", include_bytes!("../resources/request/get_small.txt"));

/// A browser fetching the worker binary, cookies and all.
pub const LARGE_REQUEST: Fixture = Fixture::new("large_request", include_bytes!("../resources/request/get_large.txt"));

pub const REQUESTS: [Fixture; 2] = [SMALL_REQUEST, LARGE_REQUEST];
