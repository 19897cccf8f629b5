use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

use fouine_lib::{ProxyConfig, Server};

use crate::http_utils::{http_ok_response, http_proxy_request};
use crate::mock::Backend;

fn loopback_config() -> ProxyConfig {
    ProxyConfig {
        listen_address: "127.0.0.1:0".parse().expect("should parse"),
        ..ProxyConfig::default()
    }
}

fn start_proxy(config: ProxyConfig) -> SocketAddr {
    let server = Server::new(config).expect("could not bind the proxy");
    let address = server.local_addr().expect("could not read the proxy address");
    thread::spawn(move || server.run());
    address
}

/// Sends one request and reads the connection to EOF.
fn roundtrip(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).expect("could not reach the proxy");
    stream
        .write_all(request)
        .expect("could not send the request");
    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .expect("could not read the response");
    response
}

#[test]
fn forwards_in_origin_form_and_serves_repeats_from_cache() {
    let backend = Backend::start("origin", http_ok_response("hello from the origin"));
    let proxy = start_proxy(loopback_config());
    let request = http_proxy_request(backend.address.to_string(), "/");

    let first = roundtrip(proxy, request.as_bytes());
    assert_eq!(first, backend.response().as_bytes());

    let second = roundtrip(proxy, request.as_bytes());
    assert_eq!(second, backend.response().as_bytes());
    assert_eq!(backend.requests_received(), 1);

    let received = backend.received();
    assert!(received[0].starts_with("GET / HTTP/1.1\r\n"));
    assert!(received[0].contains("Connection: close\r\n"));
    assert!(received[0].contains(&format!("Host: {}\r\n", backend.address)));
}

#[test]
fn different_paths_are_cached_separately() {
    let backend = Backend::start("origin", http_ok_response("same body either way"));
    let proxy = start_proxy(loopback_config());

    let first = roundtrip(
        proxy,
        http_proxy_request(backend.address.to_string(), "/one").as_bytes(),
    );
    let second = roundtrip(
        proxy,
        http_proxy_request(backend.address.to_string(), "/two").as_bytes(),
    );
    assert_eq!(first, backend.response().as_bytes());
    assert_eq!(second, backend.response().as_bytes());
    assert_eq!(backend.requests_received(), 2);
}

#[test]
fn oversized_responses_are_never_cached() {
    let backend = Backend::start("origin", http_ok_response("too big for the element limit"));
    let config = ProxyConfig {
        max_element_bytes: 16,
        ..loopback_config()
    };
    let proxy = start_proxy(config);
    let request = http_proxy_request(backend.address.to_string(), "/");

    let first = roundtrip(proxy, request.as_bytes());
    let second = roundtrip(proxy, request.as_bytes());
    assert_eq!(first, backend.response().as_bytes());
    assert_eq!(second, backend.response().as_bytes());
    assert_eq!(backend.requests_received(), 2);
}

#[test]
fn missing_host_header_is_derived_from_the_target() {
    let backend = Backend::start("origin", http_ok_response("no host needed"));
    let proxy = start_proxy(loopback_config());
    let request = format!("GET http://{}/ HTTP/1.1\r\n\r\n", backend.address);

    let response = roundtrip(proxy, request.as_bytes());
    assert_eq!(response, backend.response().as_bytes());

    let received = backend.received();
    assert!(received[0].contains("Host: 127.0.0.1\r\n"));
    assert!(received[0].contains("Connection: close\r\n"));
}

#[test]
fn malformed_request_gets_400() {
    let proxy = start_proxy(loopback_config());
    let response = roundtrip(proxy, b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
}

#[test]
fn post_is_closed_without_a_reply() {
    let proxy = start_proxy(loopback_config());
    let response = roundtrip(proxy, b"POST http://example.com/ HTTP/1.1\r\n\r\n");
    assert!(response.is_empty());
}

#[test]
fn unsupported_version_gets_505() {
    let proxy = start_proxy(loopback_config());
    let response = roundtrip(proxy, b"GET http://example.com/ HTTP/2.0\r\n\r\n");
    assert!(response.starts_with(b"HTTP/1.1 505 HTTP Version Not Supported\r\n"));
}

#[test]
fn dead_upstream_gets_500() {
    let proxy = start_proxy(loopback_config());
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("could not bind");
        listener.local_addr().expect("should have an address").port()
        // the listener drops here, so the port refuses connections
    };
    let request = http_proxy_request(format!("127.0.0.1:{port}"), "/");

    let response = roundtrip(proxy, request.as_bytes());
    assert!(response.starts_with(b"HTTP/1.1 500 Internal Server Error\r\n"));
}
