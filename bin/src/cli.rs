use clap::Parser;

use fouine_lib::cache::{DEFAULT_MAX_CACHE_BYTES, DEFAULT_MAX_ELEMENT_BYTES};

/// caching HTTP/1.x forward proxy
#[derive(Parser, Debug)]
#[command(name = "fouine", version, about)]
pub struct Args {
    /// TCP port to listen on
    pub port: u16,

    /// how many clients may be served concurrently
    #[arg(long = "max-clients", default_value_t = 400)]
    pub max_clients: usize,

    /// total cache size, in bytes
    #[arg(long = "max-cache-bytes", default_value_t = DEFAULT_MAX_CACHE_BYTES)]
    pub max_cache_bytes: usize,

    /// largest cacheable response, in bytes
    #[arg(long = "max-element-bytes", default_value_t = DEFAULT_MAX_ELEMENT_BYTES)]
    pub max_element_bytes: usize,
}
