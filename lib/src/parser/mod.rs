//! HTTP/1.x message codec.
//!
//! Parses the head of an absolute-form request
//! (`GET http://host[:port]/path HTTP/1.1`) into a [`Request`], and
//! serializes a [`Request`] back out in origin-form for upstream dispatch.
//! Only the head is parsed; anything past the `CRLF CRLF` terminator is
//! ignored.

use std::fmt;
use std::str;

use nom::{
    bytes::complete::{tag, take_while, take_while1},
    character::{complete::char, is_alphanumeric},
    combinator::opt,
    IResult,
};

/// A request head shorter than this cannot even hold the terminator.
pub const MIN_REQUEST_BYTES: usize = 4;
/// Longest request head the codec accepts.
pub const MAX_REQUEST_BYTES: usize = 65535;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("request size {0} is outside the [4, 65535] window")]
    SizeOutOfBounds(usize),
    #[error("the request head carries no CRLFCRLF terminator")]
    MissingTerminator,
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("unsupported method {0}")]
    UnsupportedMethod(String),
    #[error("request target {0} is not in absolute-form")]
    NotAbsoluteForm(String),
    #[error("request target carries no path")]
    MissingPath,
    #[error("empty host in request target")]
    EmptyHost,
    #[error("invalid port {0}")]
    InvalidPort(String),
    #[error("path must not begin with //")]
    DoubleSlashPath,
    #[error("malformed header line")]
    InvalidHeader,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    #[error("serialized request needs {needed} bytes, the buffer holds {capacity}")]
    Overflow { needed: usize, capacity: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Version {
    V10,
    V11,
    /// Anything else starting with `HTTP/`. Parsed, then refused upstream.
    Other(String),
}

impl Version {
    fn new(s: &str) -> Version {
        match s {
            "HTTP/1.0" => Version::V10,
            "HTTP/1.1" => Version::V11,
            _ => Version::Other(String::from(s)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Version::V10 => "HTTP/1.0",
            Version::V11 => "HTTP/1.1",
            Version::Other(s) => s,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Version::V10 | Version::V11)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    /// Length of the serialized `name: value\r\n` line.
    pub fn serialized_len(&self) -> usize {
        self.name.len() + 2 + self.value.len() + 2
    }
}

/// A parsed request head.
///
/// `headers` keeps the order lines arrived in, with duplicate names
/// collapsed to the last occurrence at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub version: Version,
    pub headers: Vec<Header>,
}

impl Request {
    /// Value of the last header named `name`, exact match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|header| header.name == name)
            .map(|header| header.value.as_str())
    }

    /// Replaces every header named `name` with a single entry appended at
    /// the end.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|header| header.name != name);
        self.headers.push(Header {
            name: String::from(name),
            value: String::from(value),
        });
    }

    /// Exact size of the origin-form serialization.
    pub fn origin_form_len(&self) -> usize {
        let request_line =
            self.method.len() + 1 + self.path.len() + 1 + self.version.as_str().len() + 2;
        let headers: usize = self.headers.iter().map(Header::serialized_len).sum();
        request_line + headers + 2
    }
}

/// Absolute-form rendering, the shape the client sent. Debugging and
/// round-trip checks only; upstream traffic uses [`serialize_origin_form`].
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}://{}", self.method, self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "{} {}\r\n", self.path, self.version)?;
        for header in &self.headers {
            write!(f, "{}: {}\r\n", header.name, header.value)?;
        }
        write!(f, "\r\n")
    }
}

// Primitives
fn is_token_char(i: u8) -> bool {
    is_alphanumeric(i) || b"!#$%&'*+-.^_`|~".contains(&i)
}

fn is_vchar(i: u8) -> bool {
    i > 32 && i <= 126
}

fn is_header_name_char(i: u8) -> bool {
    i != b':' && i != b'\r' && i != b'\n'
}

fn is_header_value_char(i: u8) -> bool {
    i != b'\r' && i != b'\n'
}

fn token(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_token_char)(i)
}

fn vchar_1(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_vchar)(i)
}

fn sp(i: &[u8]) -> IResult<&[u8], char> {
    char(' ')(i)
}

fn crlf(i: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(&b"\r\n"[..])(i)
}

#[derive(Debug, PartialEq)]
struct RequestLine<'a> {
    method: &'a [u8],
    target: &'a [u8],
    version: &'a [u8],
}

fn request_line(i: &[u8]) -> IResult<&[u8], RequestLine> {
    let (i, method) = token(i)?;
    let (i, _) = sp(i)?;
    let (i, target) = vchar_1(i)?;
    let (i, _) = sp(i)?;
    let (i, version) = vchar_1(i)?;
    let (i, _) = crlf(i)?;
    Ok((
        i,
        RequestLine {
            method,
            target,
            version,
        },
    ))
}

#[derive(Debug, PartialEq)]
struct RawHeader<'a> {
    name: &'a [u8],
    value: &'a [u8],
}

fn message_header(i: &[u8]) -> IResult<&[u8], RawHeader> {
    let (i, name) = take_while1(is_header_name_char)(i)?;
    let (i, _) = char(':')(i)?;
    let (i, _) = opt(char(' '))(i)?;
    let (i, value) = take_while(is_header_value_char)(i)?;
    let (i, _) = crlf(i)?;
    Ok((i, RawHeader { name, value }))
}

/// Offset of the `CRLF CRLF` head terminator, if present.
pub fn find_header_end(input: &[u8]) -> Option<usize> {
    input.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Parses an absolute-form request head.
///
/// The whole input must be between [`MIN_REQUEST_BYTES`] and
/// [`MAX_REQUEST_BYTES`] long and contain the head terminator. Only `GET`
/// passes; the version only has to begin with `HTTP/` here, the session
/// decides what to do with unsupported ones.
pub fn parse_request(input: &[u8]) -> Result<Request, ParseError> {
    if input.len() < MIN_REQUEST_BYTES || input.len() > MAX_REQUEST_BYTES {
        return Err(ParseError::SizeOutOfBounds(input.len()));
    }

    let header_end = find_header_end(input).ok_or(ParseError::MissingTerminator)?;
    let head = &input[..header_end + 4];

    let (rest, line) = request_line(head).map_err(|_| ParseError::InvalidRequestLine)?;

    if line.method != b"GET" {
        let method = String::from_utf8_lossy(line.method).into_owned();
        return Err(ParseError::UnsupportedMethod(method));
    }

    let target = str::from_utf8(line.target).map_err(|_| ParseError::InvalidRequestLine)?;
    let version = str::from_utf8(line.version).map_err(|_| ParseError::InvalidRequestLine)?;
    if !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequestLine);
    }

    let (scheme, host, port, path) = parse_target(target)?;

    let mut headers: Vec<Header> = Vec::new();
    let mut rest = rest;
    while rest != b"\r\n" {
        let (remaining, raw) = message_header(rest).map_err(|_| ParseError::InvalidHeader)?;
        let name = str::from_utf8(raw.name).map_err(|_| ParseError::InvalidHeader)?;
        let value = str::from_utf8(raw.value).map_err(|_| ParseError::InvalidHeader)?;
        headers.retain(|header| header.name != name);
        headers.push(Header {
            name: String::from(name),
            value: String::from(value),
        });
        rest = remaining;
    }

    Ok(Request {
        method: String::from("GET"),
        scheme,
        host,
        port,
        path,
        version: Version::new(version),
        headers,
    })
}

/// Splits an absolute-form target into scheme, host, port and normalized
/// path.
fn parse_target(target: &str) -> Result<(String, String, Option<u16>, String), ParseError> {
    let separator = target
        .find("://")
        .ok_or_else(|| ParseError::NotAbsoluteForm(String::from(target)))?;
    let scheme = &target[..separator];
    let rest = &target[separator + 3..];

    let path_start = rest.find('/').ok_or(ParseError::MissingPath)?;
    let authority = &rest[..path_start];
    let path = normalize_path(&rest[path_start..])?;

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| ParseError::InvalidPort(String::from(port)))?;
            if port == 0 {
                return Err(ParseError::InvalidPort(String::from("0")));
            }
            (host, Some(port))
        }
        None => (authority, None),
    };
    if host.is_empty() {
        return Err(ParseError::EmptyHost);
    }

    Ok((String::from(scheme), String::from(host), port, path))
}

fn normalize_path(path: &str) -> Result<String, ParseError> {
    if path.is_empty() {
        Ok(String::from("/"))
    } else if path.starts_with("//") {
        Err(ParseError::DoubleSlashPath)
    } else if !path.starts_with('/') {
        Ok(format!("/{path}"))
    } else {
        Ok(String::from(path))
    }
}

/// Serializes `request` in origin-form: `METHOD SP path SP version CRLF`,
/// the headers, then the terminating CRLF. Fails without writing anything
/// when the buffer is too small.
pub fn serialize_origin_form(request: &Request, buf: &mut [u8]) -> Result<usize, SerializeError> {
    let needed = request.origin_form_len();
    if needed > buf.len() {
        return Err(SerializeError::Overflow {
            needed,
            capacity: buf.len(),
        });
    }

    let mut pos = 0;
    put(buf, &mut pos, request.method.as_bytes());
    put(buf, &mut pos, b" ");
    put(buf, &mut pos, request.path.as_bytes());
    put(buf, &mut pos, b" ");
    put(buf, &mut pos, request.version.as_str().as_bytes());
    put(buf, &mut pos, b"\r\n");
    for header in &request.headers {
        put(buf, &mut pos, header.name.as_bytes());
        put(buf, &mut pos, b": ");
        put(buf, &mut pos, header.value.as_bytes());
        put(buf, &mut pos, b"\r\n");
    }
    put(buf, &mut pos, b"\r\n");
    Ok(pos)
}

fn put(buf: &mut [u8], pos: &mut usize, bytes: &[u8]) {
    buf[*pos..*pos + bytes.len()].copy_from_slice(bytes);
    *pos += bytes.len();
}
