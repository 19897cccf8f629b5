//! The accept loop: one worker thread per client connection.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::thread;

use log::{error, info};

use crate::cache::Cache;
use crate::semaphore::Semaphore;
use crate::session::Session;
use crate::socket::{server_bind, ServerBindError};
use crate::ProxyConfig;

pub struct Server {
    listener: TcpListener,
    cache: Cache,
    admission: Semaphore,
    config: ProxyConfig,
}

impl Server {
    /// Binds the listening socket eagerly; the accept loop only starts
    /// with [`run`](Server::run).
    pub fn new(config: ProxyConfig) -> Result<Server, ServerBindError> {
        let listener = server_bind(config.listen_address, config.max_clients as i32)?;
        Ok(Server {
            listener,
            cache: Cache::new(config.max_cache_bytes, config.max_element_bytes),
            admission: Semaphore::new(config.max_clients),
            config,
        })
    }

    /// The address actually bound, useful when the configuration asked for
    /// port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts forever. Accept failures are logged and the loop goes on;
    /// admission is taken inside the worker so bursts queue up in the
    /// kernel backlog instead of blocking the accept loop.
    pub fn run(self) {
        info!(
            "accepting connections, {} admission tokens, {} bytes of cache",
            self.config.max_clients, self.config.max_cache_bytes
        );
        loop {
            match self.listener.accept() {
                Ok((frontend, _)) => {
                    let cache = self.cache.clone();
                    let admission = self.admission.clone();
                    let max_element_bytes = self.config.max_element_bytes;
                    thread::spawn(move || {
                        let _token = admission.acquire();
                        Session::new(frontend).run(&cache, max_element_bytes);
                    });
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                }
            }
        }
    }
}
