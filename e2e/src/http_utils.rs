/// Creates a minimal HTTP/1.1 200 response carrying `content`.
pub fn http_ok_response<S: Into<String>>(content: S) -> String {
    let content = content.into();
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
        content.len(),
        content
    )
}

/// Creates an absolute-form HTTP/1.1 GET request, the shape a client sends
/// to a forward proxy.
pub fn http_proxy_request<S1: Into<String>, S2: Into<String>>(authority: S1, path: S2) -> String {
    let authority = authority.into();
    format!(
        "GET http://{}{} HTTP/1.1\r\nHost: {}\r\nUser-Agent: TestAgent\r\n\r\n",
        authority,
        path.into(),
        authority,
    )
}
