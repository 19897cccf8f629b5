//! Upstream side: resolve, connect, send the rewritten request, read the
//! origin's response.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use crate::BUFFER_SIZE;

/// Port used when the request target carries none.
pub const DEFAULT_UPSTREAM_PORT: u16 = 80;

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("could not resolve host {host}: {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },
    #[error("no IPv4 address for host {0}")]
    NoIpv4Address(String),
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("could not send the request upstream: {0}")]
    Send(std::io::Error),
    #[error("could not read the upstream response: {0}")]
    Receive(std::io::Error),
    #[error("upstream closed the connection before sending any byte")]
    EmptyResponse,
}

/// A connected upstream origin. Dropping it closes the socket.
pub struct Upstream {
    stream: TcpStream,
}

impl Upstream {
    /// Resolves `host` and connects to its first IPv4 address.
    pub fn connect(host: &str, port: u16) -> Result<Upstream, UpstreamError> {
        let addr = resolve(host, port)?;
        let stream =
            TcpStream::connect(addr).map_err(|source| UpstreamError::Connect { addr, source })?;
        Ok(Upstream { stream })
    }

    /// Writes the serialized request in full.
    pub fn send_request(&mut self, request: &[u8]) -> Result<(), UpstreamError> {
        self.stream.write_all(request).map_err(UpstreamError::Send)
    }

    /// Reads the next chunk of the response. Returns 0 on upstream EOF.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, UpstreamError> {
        loop {
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(UpstreamError::Receive(e)),
            }
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, UpstreamError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| UpstreamError::Resolve {
            host: String::from(host),
            source,
        })?;
    addrs
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| UpstreamError::NoIpv4Address(String::from(host)))
}

/// Fetches the complete response for `request` from `host:port`: connect,
/// send, read until the origin closes. The returned bytes are the raw
/// response, status line and headers included.
pub fn fetch(host: &str, port: u16, request: &[u8]) -> Result<Vec<u8>, UpstreamError> {
    let mut upstream = Upstream::connect(host, port)?;
    upstream.send_request(request)?;

    let mut body = Vec::new();
    let mut chunk = [0u8; BUFFER_SIZE];
    loop {
        let read = upstream.read_chunk(&mut chunk)?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }
    if body.is_empty() {
        return Err(UpstreamError::EmptyResponse);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    #[test]
    fn fetch_reads_the_response_to_the_end() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("could not bind");
        let addr = listener.local_addr().expect("could not read local address");
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("could not accept");
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .expect("could not respond");
        });

        let body = fetch("127.0.0.1", addr.port(), b"GET / HTTP/1.1\r\n\r\n")
            .expect("fetch should succeed");
        assert_eq!(&body[..], b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
    }

    #[test]
    fn upstream_closing_without_bytes_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("could not bind");
        let addr = listener.local_addr().expect("could not read local address");
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("could not accept");
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
        });

        let result = fetch("127.0.0.1", addr.port(), b"GET / HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(UpstreamError::EmptyResponse)));
    }

    #[test]
    fn connection_refused_is_reported() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("could not bind");
            listener
                .local_addr()
                .expect("could not read local address")
                .port()
        };

        let result = Upstream::connect("127.0.0.1", port);
        assert!(matches!(result, Err(UpstreamError::Connect { .. })));
    }

    #[test]
    fn unresolvable_host_is_reported() {
        let result = resolve("host.invalid.", 80);
        assert!(matches!(
            result,
            Err(UpstreamError::Resolve { .. }) | Err(UpstreamError::NoIpv4Address(_))
        ));
    }
}
