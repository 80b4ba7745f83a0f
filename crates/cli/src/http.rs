//! Minimal HTTP/1.1 request/response framing for the reference server.
//!
//! Not a framework adapter (that stays out of scope): just enough parsing
//! to turn a `TcpStream` into the pieces `durable_comm::HostAdapter` needs,
//! and enough writing to turn a `HostResponse` back into bytes on the
//! wire. Mirrors the teacher's length-prefixed wire format in shape (one
//! read-then-decode, one encode-then-write) even though the format here
//! is HTTP/1.1, not the teacher's 4-byte length prefix + JSON.

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Maximum request line + header block size before we give up.
const MAX_HEAD_SIZE: usize = 64 * 1024;
/// Maximum request body size.
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("malformed header")]
    MalformedHeader,

    #[error("request head exceeds {MAX_HEAD_SIZE} bytes")]
    HeadTooLarge,

    #[error("request body exceeds {MAX_BODY_SIZE} bytes")]
    BodyTooLarge,

    #[error("connection closed before a full request arrived")]
    ConnectionClosed,
}

/// A parsed HTTP/1.1 request: method, path (with query string split off),
/// headers lowercased by name, and the raw body.
pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub query: std::collections::HashMap<String, String>,
    pub headers: std::collections::HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Read and parse one HTTP/1.1 request off `stream`. Assumes one
/// request per connection (no keep-alive) — adequate for a local
/// reference server driven by the Executor or `curl`.
pub async fn read_request(stream: &mut TcpStream) -> Result<ParsedRequest, HttpError> {
    let mut buf = Vec::with_capacity(4096);
    let head_end = loop {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HttpError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_HEAD_SIZE && find_head_end(&buf).is_none() {
            return Err(HttpError::HeadTooLarge);
        }
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
    };

    let head = std::str::from_utf8(&buf[..head_end]).map_err(|_| HttpError::MalformedRequestLine)?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(HttpError::MalformedRequestLine)?;
    let mut parts = request_line.split(' ');
    let method = parts.next().ok_or(HttpError::MalformedRequestLine)?.to_string();
    let target = parts.next().ok_or(HttpError::MalformedRequestLine)?;
    let (path, query) = split_query(target);

    let mut headers = std::collections::HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or(HttpError::MalformedHeader)?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_SIZE {
        return Err(HttpError::BodyTooLarge);
    }

    let body_start = head_end + 4;
    let mut body = buf[body_start..].to_vec();
    while body.len() < content_length {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HttpError::ConnectionClosed);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(ParsedRequest {
        method,
        path,
        query,
        headers,
        body,
    })
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn split_query(target: &str) -> (String, std::collections::HashMap<String, String>) {
    let mut query = std::collections::HashMap::new();
    let Some((path, query_string)) = target.split_once('?') else {
        return (target.to_string(), query);
    };
    for pair in query_string.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            query.insert(urldecode(k), urldecode(v));
        }
    }
    (path.to_string(), query)
}

fn urldecode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        206 => "Partial Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Write `response` back onto `stream` as an HTTP/1.1 response.
pub async fn write_response(
    stream: &mut TcpStream,
    response: &durable_comm::HostResponse,
) -> Result<(), HttpError> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status,
        reason_phrase(response.status)
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!("content-length: {}\r\n", response.body.len()));
    head.push_str("connection: close\r\n\r\n");

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&response.body).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
