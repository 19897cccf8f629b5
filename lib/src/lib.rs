//! This library provides the building blocks of a caching HTTP/1.x forward
//! proxy.
//!
//! It handles absolute-form request parsing, LRU response caching and
//! upstream I/O with a blocking, thread-per-connection model: the accept
//! loop hands every client connection to a dedicated worker thread, a
//! counting semaphore caps the number of concurrently active workers, and a
//! shared size-bounded cache serves repeated requests without contacting
//! the origin again.
//!
//! Each client connection carries exactly one request. The proxy rewrites
//! the absolute-form request line (`GET http://host/path HTTP/1.1`) into
//! origin-form (`GET /path HTTP/1.1`), forces `Connection: close`,
//! guarantees a `Host` header, and streams the origin's response back to
//! the client while accumulating it for the cache.
//!
//! To run a proxy, build a [`ProxyConfig`], hand it to
//! [`server::Server::new`] and call [`server::Server::run`]:
//!
//! ```ignore
//! use fouine_lib::{server::Server, ProxyConfig};
//!
//! fn main() {
//!     env_logger::init();
//!     let server = Server::new(ProxyConfig::with_port(8080)).expect("could not bind");
//!     server.run();
//! }
//! ```

pub mod answers;
pub mod cache;
pub mod client;
pub mod parser;
pub mod semaphore;
pub mod server;
pub mod session;
pub mod socket;

use std::net::SocketAddr;

pub use crate::cache::Cache;
pub use crate::server::Server;

/// Size of the per-connection I/O buffers: the client request must fit in
/// one buffer, and cached or forwarded responses are written to the client
/// in chunks of this size.
pub const BUFFER_SIZE: usize = 4096;

/// Tunables of a proxy instance.
///
/// The defaults mirror the traditional sizing of this kind of proxy: up to
/// 400 concurrent clients, a 200 MiB response cache with a 10 MiB cap per
/// cached element.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address of the listening socket.
    pub listen_address: SocketAddr,
    /// Number of admission tokens: at most this many sessions run at once.
    pub max_clients: usize,
    /// Upper bound on the summed accounted size of all cache entries.
    pub max_cache_bytes: usize,
    /// Responses larger than this are forwarded but never cached.
    pub max_element_bytes: usize,
}

impl ProxyConfig {
    /// A default configuration listening on `0.0.0.0:<port>`.
    pub fn with_port(port: u16) -> Self {
        ProxyConfig {
            listen_address: SocketAddr::from(([0, 0, 0, 0], port)),
            ..ProxyConfig::default()
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            listen_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_clients: 400,
            max_cache_bytes: cache::DEFAULT_MAX_CACHE_BYTES,
            max_element_bytes: cache::DEFAULT_MAX_ELEMENT_BYTES,
        }
    }
}
