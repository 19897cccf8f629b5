//! Default HTTP answers sent to clients when a request cannot be
//! forwarded.
//!
//! The full taxonomy (400, 403, 404, 500, 501, 505) is rendered as small
//! HTML documents; the session only ever emits 400, 500 and 505. The
//! `Connection: keep-alive` header is kept even though the connection is
//! closed right after the body, for byte compatibility with the historical
//! template.

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
const IMF_FIXDATE: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

const SERVER: &str = concat!("fouine/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    VersionNotSupported,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
            Status::VersionNotSupported => 505,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
            Status::VersionNotSupported => "HTTP Version Not Supported",
        }
    }
}

/// Current time formatted for a `Date` header.
pub fn http_date() -> String {
    OffsetDateTime::now_utc()
        .format(&IMF_FIXDATE)
        .unwrap_or_else(|_| String::from("Thu, 01 Jan 1970 00:00:00 GMT"))
}

/// Renders the complete answer for `status`, headers and HTML body.
pub fn answer(status: Status) -> Vec<u8> {
    let code = status.code();
    let reason = status.reason();
    let body = match status {
        Status::Forbidden => format!(
            "<HTML><HEAD><TITLE>{code} {reason}</TITLE></HEAD>\n\
             <BODY><H1>{code} {reason}</H1><br>Permission Denied\n</BODY></HTML>"
        ),
        _ => format!(
            "<HTML><HEAD><TITLE>{code} {reason}</TITLE></HEAD>\n\
             <BODY><H1>{code} {reason}</H1>\n</BODY></HTML>"
        ),
    };
    format!(
        "HTTP/1.1 {code} {reason}\r\n\
         Content-Length: {length}\r\n\
         Connection: keep-alive\r\n\
         Content-Type: text/html\r\n\
         Date: {date}\r\n\
         Server: {server}\r\n\
         \r\n\
         {body}",
        length = body.len(),
        date = http_date(),
        server = SERVER,
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_head_and_body(answer: &[u8]) -> (String, String) {
        let answer = String::from_utf8(answer.to_vec()).expect("answer should be UTF-8");
        let (head, body) = answer
            .split_once("\r\n\r\n")
            .expect("answer should carry a head terminator");
        (String::from(head), String::from(body))
    }

    fn header_value(head: &str, name: &str) -> String {
        head.lines()
            .find_map(|line| line.strip_prefix(&format!("{name}: ")))
            .map(String::from)
            .unwrap_or_else(|| panic!("no {name} header in {head}"))
    }

    #[test]
    fn content_length_matches_the_body() {
        for status in [
            Status::BadRequest,
            Status::Forbidden,
            Status::NotFound,
            Status::InternalServerError,
            Status::NotImplemented,
            Status::VersionNotSupported,
        ] {
            let (head, body) = split_head_and_body(&answer(status));
            let length: usize = header_value(&head, "Content-Length")
                .parse()
                .expect("Content-Length should be numeric");
            assert_eq!(length, body.len());
        }
    }

    #[test]
    fn status_line_carries_code_and_reason() {
        let (head, body) = split_head_and_body(&answer(Status::BadRequest));
        assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(body.contains("<H1>400 Bad Request</H1>"));
    }

    #[test]
    fn answer_carries_the_template_headers() {
        let (head, _) = split_head_and_body(&answer(Status::InternalServerError));
        assert_eq!(header_value(&head, "Connection"), "keep-alive");
        assert_eq!(header_value(&head, "Content-Type"), "text/html");
        assert!(header_value(&head, "Server").starts_with("fouine/"));
        assert!(header_value(&head, "Date").ends_with(" GMT"));
    }

    #[test]
    fn http_date_is_imf_fixdate_shaped() {
        let date = http_date();
        // e.g. "Sat, 02 Aug 2025 10:00:00 GMT"
        assert_eq!(date.len(), 29);
        assert_eq!(&date[3..5], ", ");
        assert!(date.ends_with(" GMT"));
    }
}
