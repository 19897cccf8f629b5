use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::BUFFER_SIZE;

/// A mock origin server: accepts connections on a loopback port from its
/// own thread, serves one fixed response per connection and closes, and
/// records every request it received.
pub struct Backend {
    pub name: String,
    pub address: SocketAddr,
    response: String,
    requests: Arc<Mutex<Vec<String>>>,
    requests_received: Arc<AtomicUsize>,
}

impl Backend {
    pub fn start<S1: Into<String>, S2: Into<String>>(name: S1, response: S2) -> Backend {
        let listener = TcpListener::bind("127.0.0.1:0").expect("could not bind the backend");
        let address = listener
            .local_addr()
            .expect("could not read the backend address");
        let response = response.into();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_received = Arc::new(AtomicUsize::new(0));

        {
            let response = response.clone();
            let requests = requests.clone();
            let requests_received = requests_received.clone();
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { continue };
                    serve_one(stream, &response, &requests, &requests_received);
                }
            });
        }

        Backend {
            name: name.into(),
            address,
            response,
            requests,
            requests_received,
        }
    }

    /// Number of requests the backend has answered so far.
    pub fn requests_received(&self) -> usize {
        self.requests_received.load(Ordering::SeqCst)
    }

    /// Raw requests received, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("request log should not be poisoned")
            .clone()
    }

    pub fn response(&self) -> &str {
        &self.response
    }
}

fn serve_one(
    mut stream: TcpStream,
    response: &str,
    requests: &Mutex<Vec<String>>,
    requests_received: &AtomicUsize,
) {
    let mut buf = [0u8; BUFFER_SIZE];
    if let Ok(read) = stream.read(&mut buf) {
        if read > 0 {
            requests_received.fetch_add(1, Ordering::SeqCst);
            requests
                .lock()
                .expect("request log should not be poisoned")
                .push(String::from_utf8_lossy(&buf[..read]).into_owned());
        }
    }
    let _ = stream.write_all(response.as_bytes());
    // the stream drops here, so the proxy observes a clean EOF
}
