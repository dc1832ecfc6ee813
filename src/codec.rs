//! HTTP/1.1 wire codec for the one-request-per-connection transport.
//!
//! Deliberately small: a request line, header lines up to the first blank
//! line, then exactly `Content-Length` body bytes. No chunked encoding, no
//! keep-alive, no pipelining.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::headers::Headers;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

/// Largest up-front allocation for a body, whatever `Content-Length` claims.
const BODY_PREALLOC_LIMIT: usize = 64 * 1024;

/// Reads one request from `reader`.
///
/// `Ok(None)` means there is nothing worth answering: the peer closed
/// before sending a request line, the line was blank, it had fewer than
/// three tokens, or the method is not one we know. The caller should drop
/// the connection without writing anything.
///
/// A body shorter than `Content-Length` (peer closed early) is delivered
/// as-is. A missing or unparsable `Content-Length` means no body.
pub(crate) async fn read_request<R>(reader: &mut R) -> io::Result<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    let Some(request_line) = read_line(reader).await? else {
        return Ok(None);
    };
    let Some((method, target, version)) = parse_request_line(&request_line) else {
        debug!(line = %request_line, "dropping connection: unusable request line");
        return Ok(None);
    };

    let mut headers = Headers::new();
    while let Some(line) = read_line(reader).await? {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = parse_header_line(&line) {
            headers.insert(name, value);
        }
    }

    let declared = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let body = read_body(reader, declared).await?;

    Ok(Some(Request::from_parts(method, target, version, headers, body)))
}

/// Writes `response` as HTTP/1.1 and closes the write half.
///
/// `Content-Length` and `Content-Type` are added only when the response does
/// not carry them. `Connection: close` always replaces whatever the response
/// says, since this transport never reuses a connection.
pub(crate) async fn write_response<W>(writer: &mut W, response: &Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut headers = response.wire_headers();
    headers.insert("Connection", "close");

    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status_code(), response.reason());
    for (name, value) in headers.iter() {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    writer.write_all(head.as_bytes()).await?;
    writer.write_all(response.body()).await?;
    writer.flush().await?;
    writer.shutdown().await
}

/// One line without its `\n` or `\r\n`, or `None` at end of stream.
async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn parse_request_line(line: &str) -> Option<(Method, String, String)> {
    let mut tokens: Vec<&str> = line.split(' ').collect();
    while tokens.last().is_some_and(|t| t.is_empty()) {
        tokens.pop();
    }
    if tokens.len() < 3 {
        return None;
    }
    let method = Method::from_token(tokens[0])?;
    Some((method, tokens[1].to_owned(), tokens[2].to_owned()))
}

/// Splits at the first colon. Lines without a name are ignored.
fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    if name.is_empty() {
        return None;
    }
    Some((name.trim(), value.trim()))
}

async fn read_body<R>(reader: &mut R, declared: usize) -> io::Result<Bytes>
where
    R: AsyncBufRead + Unpin,
{
    if declared == 0 {
        return Ok(Bytes::new());
    }
    let mut body = Vec::with_capacity(declared.min(BODY_PREALLOC_LIMIT));
    reader.take(declared as u64).read_to_end(&mut body).await?;
    Ok(Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use tokio::io::BufReader;

    use super::*;
    use crate::status::Status;

    async fn parse(raw: &str) -> Option<Request> {
        let mut reader = BufReader::new(raw.as_bytes());
        read_request(&mut reader).await.expect("in-memory read")
    }

    #[tokio::test]
    async fn parses_request_line_headers_and_body() {
        let req = parse("POST /submit?x=1 HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10\r\n\r\nname=webby")
            .await
            .expect("a request");

        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.target(), "/submit?x=1");
        assert_eq!(req.version(), "HTTP/1.1");
        assert_eq!(req.header("host"), Some("localhost"));
        assert_eq!(&req.body()[..], b"name=webby");
    }

    #[tokio::test]
    async fn accepts_bare_newlines_and_lowercase_methods() {
        let req = parse("get /x HTTP/1.0\nAccept: */*\n\n").await.expect("a request");

        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.version(), "HTTP/1.0");
        assert_eq!(req.header("accept"), Some("*/*"));
        assert!(req.body().is_empty());
    }

    #[tokio::test]
    async fn unusable_request_lines_yield_nothing() {
        assert!(parse("").await.is_none());
        assert!(parse("\r\n").await.is_none());
        assert!(parse("GET /only-two\r\n\r\n").await.is_none());
        assert!(parse("BREW /pot HTTP/1.1\r\n\r\n").await.is_none());
    }

    #[tokio::test]
    async fn odd_header_lines_are_skipped_or_trimmed() {
        let req = parse("GET / HTTP/1.1\r\nnocolon\r\n: anonymous\r\n  X-Pad :  spaced  \r\nX-Empty:\r\n\r\n")
            .await
            .expect("a request");

        assert_eq!(req.headers().len(), 2);
        assert_eq!(req.header("x-pad"), Some("spaced"));
        assert_eq!(req.header("x-empty"), Some(""));
    }

    #[tokio::test]
    async fn repeated_header_keeps_the_last_value() {
        let req = parse("GET / HTTP/1.1\r\nX-Id: 1\r\nx-id: 2\r\n\r\n").await.expect("a request");

        assert_eq!(req.header("X-Id"), Some("2"));
        assert_eq!(req.headers().len(), 1);
    }

    #[tokio::test]
    async fn truncated_body_is_delivered_short() {
        let req = parse("POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await.expect("a request");

        assert_eq!(&req.body()[..], b"abc");
    }

    #[tokio::test]
    async fn bad_content_length_means_no_body() {
        let req = parse("POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\nignored").await.expect("a request");

        assert!(req.body().is_empty());
    }

    #[tokio::test]
    async fn headers_end_at_eof_without_blank_line() {
        let req = parse("GET /eof HTTP/1.1\r\nX-Last: yes").await.expect("a request");

        assert_eq!(req.header("x-last"), Some("yes"));
    }

    #[tokio::test]
    async fn writes_status_line_defaults_and_body() {
        let mut out = Vec::new();
        write_response(&mut out, &Response::text(Status::Ok, "hello")).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.contains("Content-Type: text/plain; charset=UTF-8\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn caller_headers_win_except_connection() {
        let response = Response::json(b"{}".to_vec()).with_header("Connection", "keep-alive");
        let mut out = Vec::new();
        write_response(&mut out, &response).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("content-type: application/json\r\n"));
        assert!(!text.contains("text/plain"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(!text.contains("keep-alive"));
    }

    #[tokio::test]
    async fn custom_reason_phrase_is_written() {
        let response = Response::builder().status(299u16).reason("Fine Enough").no_body();
        let mut out = Vec::new();
        write_response(&mut out, &response).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 299 Fine Enough\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
    }
}
