#![allow(unused_crate_dependencies)]

use std::io::{BufReader, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use tiny_httpd::limits::LimitsConfig;
use tiny_httpd::{HandlerError, Request, Response, ServerConfig, SocketConfig};

#[allow(dead_code)]
mod support;

fn connection_close(version: &str) {
    let (_server, mut client) = support::new_client_to_hello_world_server();

    if version == "1.1" {
        write!(client, "GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n").unwrap();
        thread::sleep(Duration::from_millis(100));

        write!(client, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
    } else {
        write!(client, "GET / HTTP/{version}\r\nHost: localhost\r\n\r\n").unwrap();
    }

    let mut out = String::new();
    let _ = client.read_to_string(&mut out).unwrap();

    assert!(out.ends_with("hello world"), "out: {out}");
    assert_eq!(out.matches("connection: close").count(), 1, "out: {out}");

    client
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    let result = client.read_to_end(&mut Vec::new());
    assert!(
        result.is_ok() && result.unwrap() == 0,
        "server didn't close connection"
    );
}

#[test]
fn connection_close_http_1_0() {
    connection_close("1.0");
}

#[test]
fn connection_close_http_1_1() {
    connection_close("1.1");
}

#[test]
fn keep_alive_pipelining() {
    let (_server, mut client) = support::new_client_to_hello_world_server();

    let requests = "GET /1 HTTP/1.1\r\nHost: localhost\r\n\r\n".repeat(4);
    client.write_all(requests.as_bytes()).unwrap();
    write!(client, "GET /5 HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();

    let responses = support::read_responses(client);
    assert_eq!(responses.len(), 5);
    for response in &responses[..4] {
        assert_eq!(response.status, 200);
        assert!(response.header("connection").is_none());
        assert_eq!(response.text(), "hello world");
    }
    assert_eq!(responses[4].header("connection"), Some("close"));
}

#[test]
fn keep_alive_sequential() {
    let (_server, client) = support::new_client_to_hello_world_server();
    let mut reader = BufReader::new(client);

    for _ in 0..3 {
        write!(reader.get_mut(), "GET / HTTP/1.1\r\n\r\n").unwrap();
        let response = support::read_response(&mut reader, false).unwrap();
        assert_eq!(response.text(), "hello world");
    }
}

#[test]
fn handler_closes_connection() {
    let (_server, mut client) = support::new_one_server_one_client(
        |_rq: &mut Request<'_>| -> Result<Response, HandlerError> {
            Ok(Response::text("bye").with_header(tiny_httpd::HeaderField::CONNECTION, "close"))
        },
    );
    client
        .write_all(b"GET / HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\n\r\n")
        .unwrap();

    let responses = support::read_responses(client);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].text(), "bye");
}

#[test]
fn read_timeout_closes_idle_connection() {
    let timeout = Duration::from_millis(200);
    let (_server, mut client) = support::new_server_client_with_cfg(
        SocketConfig {
            read_timeout: timeout,
            write_timeout: timeout,
            ..SocketConfig::default()
        },
        support::hello_world,
    );

    let now = Instant::now();
    let mut content = Vec::new();
    let _ = client.read_to_end(&mut content).unwrap();
    let elaps = now.elapsed();

    assert!(content.is_empty());
    assert!(
        elaps >= timeout && elaps < Duration::from_secs(2),
        "elaps: {}",
        elaps.as_millis()
    );
}

#[test]
fn read_timeout_after_response() {
    let timeout = Duration::from_millis(200);
    let (_server, mut client) = support::new_server_client_with_cfg(
        SocketConfig {
            read_timeout: timeout,
            ..SocketConfig::default()
        },
        support::hello_world,
    );

    write!(client, "GET / HTTP/1.1\r\n\r\n").unwrap();
    let mut content = String::new();
    let _ = client.read_to_string(&mut content).unwrap();
    assert!(content.ends_with("hello world"), "{content}");
    assert!(!content.contains("connection: close"), "{content}");
}

#[test]
fn partial_request_times_out() {
    let timeout = Duration::from_millis(200);
    let (_server, mut client) = support::new_server_client_with_cfg(
        SocketConfig {
            read_timeout: timeout,
            ..SocketConfig::default()
        },
        support::hello_world,
    );

    write!(client, "GET / HTTP/1.1\r\nHost: loc").unwrap();
    let mut content = Vec::new();
    let _ = client.read_to_end(&mut content).unwrap();
    assert!(content.is_empty(), "{}", String::from_utf8_lossy(&content));
}

#[test]
fn header_too_large() {
    let server = support::new_server(
        ServerConfig {
            limits: LimitsConfig {
                line_buffer_size: 256,
                ..LimitsConfig::default()
            },
            ..ServerConfig::default()
        },
        support::hello_world,
    );
    let mut client = support::connect(&server);

    write!(client, "GET / HTTP/1.1\r\nCookie: {}\r\n\r\n", "a".repeat(300)).unwrap();
    let mut reader = BufReader::new(client);
    let response = support::read_response(&mut reader, false).unwrap();
    assert_eq!(response.status, 431);
    assert_eq!(response.header("connection"), Some("close"));
}

#[test]
fn header_block_too_large() {
    let server = support::new_server(
        ServerConfig {
            limits: LimitsConfig {
                header_limit: 1024,
                ..LimitsConfig::default()
            },
            ..ServerConfig::default()
        },
        support::hello_world,
    );

    let mut client = support::connect(&server);
    let mut head = String::from("GET / HTTP/1.1\r\n");
    for n in 0..60 {
        head.push_str(&format!("x-field-{n:02}: short value\r\n"));
    }
    head.push_str("\r\n");
    client.write_all(head.as_bytes()).unwrap();

    let mut reader = BufReader::new(client);
    let response = support::read_response(&mut reader, false).unwrap();
    assert_eq!(response.status, 431);

    // the same short lines fit the default limit
    let default_server = support::new_server(ServerConfig::default(), support::hello_world);
    let mut client = support::connect(&default_server);
    client.write_all(head.as_bytes()).unwrap();
    let mut reader = BufReader::new(client);
    let response = support::read_response(&mut reader, false).unwrap();
    assert_eq!(response.status, 200);
}

#[test]
fn malformed_request() {
    let (_server, mut client) = support::new_client_to_hello_world_server();
    client
        .write_all(b"GET / HTTP/1.1\r\nno colon here\r\n\r\n")
        .unwrap();

    let mut reader = BufReader::new(client);
    let response = support::read_response(&mut reader, false).unwrap();
    assert_eq!(response.status, 400);
    assert_eq!(response.header("connection"), Some("close"));
    assert!(support::read_response(&mut reader, false).is_none());
}

#[test]
fn illegal_http_version() {
    let (_server, mut client) = support::new_client_to_hello_world_server();
    client.write_all(b"GET / FTP/1.1\r\n\r\n").unwrap();

    let mut reader = BufReader::new(client);
    let response = support::read_response(&mut reader, false).unwrap();
    assert_eq!(response.status, 400);
    assert_eq!(
        response.text(),
        "BAD REQUEST: Syntax error. Illegal HTTP version FTP/1.1."
    );
}

#[test]
fn other_http_version_closes() {
    let (_server, mut client) = support::new_client_to_hello_world_server();
    client.write_all(b"GET / HTTP/1.2\r\n\r\n").unwrap();

    let responses = support::read_responses(client);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, 200);
    assert_eq!(responses[0].header("connection"), Some("close"));
}

#[test]
fn client_disconnect_mid_session() {
    let (server, mut client) = support::new_client_to_hello_world_server();
    write!(client, "GET / HTTP/1.1\r\n").unwrap();
    drop(client);

    let start = Instant::now();
    while server.num_sessions() > 0 {
        assert!(start.elapsed() < Duration::from_secs(3), "session not ended");
        thread::sleep(Duration::from_millis(10));
    }

    let mut client = support::connect(&server);
    write!(client, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
    let responses = support::read_responses(client);
    assert_eq!(responses[0].text(), "hello world");
}
