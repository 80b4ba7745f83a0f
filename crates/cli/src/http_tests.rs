use super::*;
use durable_comm::HostResponse;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let connect = TcpStream::connect(addr);
    let (client, server) = tokio::join!(connect, listener.accept());
    (client.expect("connect"), server.expect("accept").0)
}

#[tokio::test]
async fn parses_method_path_query_headers_and_body() {
    let (mut client, mut server) = loopback_pair().await;
    let request = b"POST /api?fnId=my-fn&probe=trust HTTP/1.1\r\n\
        host: localhost\r\n\
        content-length: 13\r\n\
        x-inngest-signature: t=1&s=deadbeef\r\n\
        \r\n\
        {\"a\":\"b b\"}";
    client.write_all(request).await.expect("write");

    let parsed = read_request(&mut server).await.expect("parse");
    assert_eq!(parsed.method, "POST");
    assert_eq!(parsed.path, "/api");
    assert_eq!(parsed.query.get("fnId").map(String::as_str), Some("my-fn"));
    assert_eq!(parsed.query.get("probe").map(String::as_str), Some("trust"));
    assert_eq!(
        parsed.headers.get("x-inngest-signature").map(String::as_str),
        Some("t=1&s=deadbeef")
    );
    assert_eq!(parsed.body, b"{\"a\":\"b b\"}");
}

#[tokio::test]
async fn writes_status_headers_and_body() {
    let (mut client, mut server) = loopback_pair().await;
    let response = HostResponse::json(206, serde_json::json!({"ok": true}))
        .with_header("x-inngest-no-retry", "false");

    let write = write_response(&mut server, &response);
    let mut out = Vec::new();
    let read = client.read_to_end(&mut out);
    let (write_result, read_result) = tokio::join!(write, read);
    write_result.expect("write response");
    read_result.expect("read response");

    let text = String::from_utf8(out).expect("utf8");
    assert!(text.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert!(text.contains("x-inngest-no-retry: false\r\n"));
    assert!(text.ends_with("{\"ok\":true}"));
}

#[tokio::test]
async fn decodes_percent_and_plus_escapes_in_query() {
    let (path, query) = split_query("/api?stepId=a%3Ab&name=a+b");
    assert_eq!(path, "/api");
    assert_eq!(query.get("stepId").map(String::as_str), Some("a:b"));
    assert_eq!(query.get("name").map(String::as_str), Some("a b"));
}
