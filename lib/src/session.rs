//! Per-connection request handling.
//!
//! One [`Session`] serves exactly one client connection through the
//! READ → DECIDE → (SERVE_CACHED | FORWARD) → CLOSE lifecycle: read the
//! request head, consult the cache on the raw bytes, on a miss rewrite and
//! forward the request upstream, stream the response back while
//! accumulating it, then insert the complete response into the cache.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};

use log::{debug, error, info};
use rusty_ulid::Ulid;

use crate::answers::{answer, Status};
use crate::cache::Cache;
use crate::client::{Upstream, DEFAULT_UPSTREAM_PORT};
use crate::parser::{find_header_end, parse_request, serialize_origin_form, ParseError};
use crate::BUFFER_SIZE;

enum ReadOutcome {
    /// A complete head arrived; holds every byte read from the client.
    Complete(Vec<u8>),
    /// EOF or a full buffer before the head terminator.
    Incomplete,
    /// The client closed without sending anything.
    Disconnected,
    Failed(io::Error),
}

pub struct Session {
    frontend: TcpStream,
    peer: String,
    request_id: Ulid,
}

impl Session {
    pub fn new(frontend: TcpStream) -> Session {
        let peer = frontend
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| String::from("-"));
        Session {
            frontend,
            peer,
            request_id: Ulid::generate(),
        }
    }

    /// Runs the whole lifecycle, then shuts the connection down. Never
    /// panics on I/O errors; everything is handled here.
    pub fn run(mut self, cache: &Cache, max_element_bytes: usize) {
        match self.read_request() {
            ReadOutcome::Complete(raw) => self.dispatch(&raw, cache, max_element_bytes),
            ReadOutcome::Incomplete => {
                info!("{} {} sent an incomplete request head", self.request_id, self.peer);
                self.send_answer(Status::BadRequest);
            }
            ReadOutcome::Disconnected => {
                debug!("{} {} disconnected before sending a request", self.request_id, self.peer);
            }
            ReadOutcome::Failed(e) => {
                error!("{} {} client read error: {}", self.request_id, self.peer, e);
            }
        }
        let _ = self.frontend.shutdown(Shutdown::Both);
    }

    /// Reads from the client until the CRLFCRLF head terminator shows up,
    /// the fixed buffer fills, or the peer closes.
    fn read_request(&mut self) -> ReadOutcome {
        let mut buffer = [0u8; BUFFER_SIZE];
        let mut filled = 0;
        loop {
            if filled == buffer.len() {
                return ReadOutcome::Incomplete;
            }
            match self.frontend.read(&mut buffer[filled..]) {
                Ok(0) => {
                    return if filled == 0 {
                        ReadOutcome::Disconnected
                    } else {
                        ReadOutcome::Incomplete
                    };
                }
                Ok(read) => {
                    filled += read;
                    if find_header_end(&buffer[..filled]).is_some() {
                        return ReadOutcome::Complete(buffer[..filled].to_vec());
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return ReadOutcome::Failed(e),
            }
        }
    }

    fn dispatch(&mut self, raw: &[u8], cache: &Cache, max_element_bytes: usize) {
        if let Some(body) = cache.lookup(raw) {
            match self.serve_cached(&body) {
                Ok(()) => {
                    info!(
                        "{} {} served {} bytes from cache",
                        self.request_id,
                        self.peer,
                        body.len()
                    );
                }
                Err(e) => {
                    error!(
                        "{} {} client write error while serving from cache: {}",
                        self.request_id, self.peer, e
                    );
                }
            }
            return;
        }
        debug!("{} cache miss", self.request_id);
        self.forward(raw, cache, max_element_bytes);
    }

    /// SERVE_CACHED: the body goes out in fixed-size chunks; a write error
    /// ends the session without touching the cache.
    fn serve_cached(&mut self, body: &[u8]) -> io::Result<()> {
        for chunk in body.chunks(BUFFER_SIZE) {
            self.frontend.write_all(chunk)?;
        }
        Ok(())
    }

    fn forward(&mut self, raw: &[u8], cache: &Cache, max_element_bytes: usize) {
        let mut request = match parse_request(raw) {
            Ok(request) => request,
            Err(ParseError::UnsupportedMethod(method)) => {
                info!(
                    "{} {} rejected: only GET is supported, got {}",
                    self.request_id, self.peer, method
                );
                return;
            }
            Err(e) => {
                info!("{} {} rejected: {}", self.request_id, self.peer, e);
                self.send_answer(Status::BadRequest);
                return;
            }
        };

        if !request.version.is_supported() {
            info!(
                "{} {} unsupported version {}",
                self.request_id, self.peer, request.version
            );
            self.send_answer(Status::VersionNotSupported);
            return;
        }

        request.set_header("Connection", "close");
        if request.header("Host").is_none() {
            let host = request.host.clone();
            request.set_header("Host", &host);
        }

        let mut send_buffer = [0u8; BUFFER_SIZE];
        let written = match serialize_origin_form(&request, &mut send_buffer) {
            Ok(written) => written,
            Err(e) => {
                error!("{} could not serialize the upstream request: {}", self.request_id, e);
                self.send_answer(Status::InternalServerError);
                return;
            }
        };

        let port = request.port.unwrap_or(DEFAULT_UPSTREAM_PORT);
        let mut upstream = match Upstream::connect(&request.host, port) {
            Ok(upstream) => upstream,
            Err(e) => {
                error!("{} upstream connect failed: {}", self.request_id, e);
                self.send_answer(Status::InternalServerError);
                return;
            }
        };
        if let Err(e) = upstream.send_request(&send_buffer[..written]) {
            error!("{} upstream send failed: {}", self.request_id, e);
            self.send_answer(Status::InternalServerError);
            return;
        }

        // Stream the response to the client while accumulating it for the
        // cache insert on clean upstream EOF.
        let mut body = Vec::new();
        let mut chunk = [0u8; BUFFER_SIZE];
        loop {
            let read = match upstream.read_chunk(&mut chunk) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => {
                    error!("{} upstream read failed: {}", self.request_id, e);
                    if body.is_empty() {
                        self.send_answer(Status::InternalServerError);
                    }
                    return;
                }
            };
            if let Err(e) = self.frontend.write_all(&chunk[..read]) {
                // No clean upstream EOF was observed, so nothing is cached.
                error!(
                    "{} {} client write failed mid-response: {}",
                    self.request_id, self.peer, e
                );
                return;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        if body.is_empty() {
            info!("{} upstream closed without sending a response", self.request_id);
            self.send_answer(Status::InternalServerError);
            return;
        }

        info!(
            "{} {} {} {}://{}{} -> {} bytes forwarded",
            self.request_id,
            self.peer,
            request.method,
            request.scheme,
            request.host,
            request.path,
            body.len()
        );

        if body.len() <= max_element_bytes {
            if let Err(e) = cache.insert(raw, &body) {
                debug!("{} response not cached: {}", self.request_id, e);
            }
        } else {
            debug!(
                "{} response of {} bytes is above the cache element limit",
                self.request_id,
                body.len()
            );
        }
    }

    fn send_answer(&mut self, status: Status) {
        let payload = answer(status);
        if let Err(e) = self.frontend.write_all(&payload) {
            debug!(
                "{} could not send the {} answer: {}",
                self.request_id,
                status.code(),
                e
            );
        }
    }
}
