use std::io::{BufRead, BufReader, Read};
use std::net::TcpStream;
use std::time::Duration;

use tiny_httpd::{
    ConfigListenAddr, Handler, HandlerError, Method, Request, Response, Server, ServerConfig,
    SocketConfig,
};

/// Creates a [`TcpStream`] Client for first `addr`
#[cfg(feature = "socket2")]
pub(crate) fn create_client<A>(
    addr: A,
    timeout: Option<Duration>,
    keep_alive_idle: Option<Duration>,
) -> TcpStream
where
    A: std::net::ToSocketAddrs,
{
    let addr = addr.to_socket_addrs().unwrap().next().unwrap();
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        None,
    )
    .unwrap();

    if timeout.is_some() {
        socket.set_read_timeout(timeout).unwrap();
        socket.set_write_timeout(timeout).unwrap();
    }
    if let Some(keep_alive_idle) = keep_alive_idle {
        socket
            .set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(keep_alive_idle))
            .unwrap();
    }
    socket.connect(&addr.into()).unwrap();
    socket.into()
}

/// Creates a [`TcpStream`] Client for first `addr`
///
/// `keep_alive_idle` is ignored here, because not supported
#[cfg(not(feature = "socket2"))]
pub(crate) fn create_client<A>(
    addr: A,
    timeout: Option<Duration>,
    _keep_alive_idle: Option<Duration>,
) -> TcpStream
where
    A: std::net::ToSocketAddrs,
{
    let addr = addr.to_socket_addrs().unwrap().next().unwrap();

    let stream = if let Some(timeout) = timeout {
        TcpStream::connect_timeout(&addr, timeout)
    } else {
        TcpStream::connect(addr)
    }
    .unwrap();

    stream.set_nodelay(true).unwrap();
    if timeout.is_some() {
        stream.set_read_timeout(timeout).unwrap();
        stream.set_write_timeout(timeout).unwrap();
    }

    stream
}

/// Starts a server on an ephemeral port of localhost
pub(crate) fn new_server<H>(config: ServerConfig, handler: H) -> Server
where
    H: Handler + 'static,
{
    let server = Server::new(
        ServerConfig {
            addr: ConfigListenAddr::from_socket_addrs("127.0.0.1:0").unwrap(),
            ..config
        },
        handler,
    );
    server.start().unwrap();
    server
}

/// Connects a client with a 3s timeout to `server`
pub(crate) fn connect(server: &Server) -> TcpStream {
    let addr = server.local_addr().unwrap().to_ip().unwrap();
    create_client(addr, Some(Duration::from_secs(3)), None)
}

/// Creates a server with `handler` and a client connected to the server.
pub(crate) fn new_one_server_one_client<H>(handler: H) -> (Server, TcpStream)
where
    H: Handler + 'static,
{
    let server = new_server(ServerConfig::default(), handler);
    let client = connect(&server);
    (server, client)
}

/// Creates a server with [`SocketConfig`] and a client connected to the server.
pub(crate) fn new_server_client_with_cfg<H>(
    socket_config: SocketConfig,
    handler: H,
) -> (Server, TcpStream)
where
    H: Handler + 'static,
{
    let server = new_server(
        ServerConfig {
            socket_config,
            ..ServerConfig::default()
        },
        handler,
    );
    let client = connect(&server);
    (server, client)
}

/// Handler answering every request with "hello world"
pub(crate) fn hello_world(_rq: &mut Request<'_>) -> Result<Response, HandlerError> {
    Ok(Response::text("hello world"))
}

/// Handler responding to `POST` with the data sent before, to all other
/// methods with _405_
pub(crate) fn echo(rq: &mut Request<'_>) -> Result<Response, HandlerError> {
    if rq.method() != Method::Post {
        return Err(Response::empty(405).into());
    }
    let content_type = rq.content_type();
    let mut data = Vec::new();
    if let Some(body) = rq.body() {
        let _ = body.read_to_end(&mut data)?;
    }
    let response = Response::bytes(data);
    Ok(match content_type {
        Some(content_type) => response.with_content_type(content_type),
        None => response,
    })
}

/// Creates a "hello world" server with a client connected to the server.
pub(crate) fn new_client_to_hello_world_server() -> (Server, TcpStream) {
    new_one_server_one_client(hello_world)
}

/// Creates an "echo" server with a client connected to the server.
///
/// Server responds with data sent before.
pub(crate) fn new_client_to_echo_server() -> (Server, TcpStream) {
    new_one_server_one_client(echo)
}

/// A response as received by a client
#[derive(Debug)]
pub(crate) struct ClientResponse {
    pub(crate) status: u16,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl ClientResponse {
    /// First value of header `name`, compared case-insensitive
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    }

    pub(crate) fn is_gzip(&self) -> bool {
        self.header("content-encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
    }

    /// Body with content encoding removed
    pub(crate) fn decoded_body(&self) -> Vec<u8> {
        if self.is_gzip() {
            let mut data = Vec::new();
            let _ = flate2::read::GzDecoder::new(&self.body[..])
                .read_to_end(&mut data)
                .unwrap();
            data
        } else {
            self.body.clone()
        }
    }

    pub(crate) fn text(&self) -> String {
        String::from_utf8(self.decoded_body()).unwrap()
    }
}

/// Reads one response from `reader`
///
/// Bodies are framed by `Content-Length` or chunked transfer-encoding, without
/// both the body lasts until the connection is closed. With `head` there is
/// never a body.
pub(crate) fn read_response<R: BufRead>(reader: &mut R, head: bool) -> Option<ClientResponse> {
    let mut line = String::new();
    if reader.read_line(&mut line).unwrap() == 0 {
        return None;
    }
    let mut parts = line.trim_end().splitn(3, ' ');
    assert_eq!(parts.next(), Some("HTTP/1.1"), "status line: {line}");
    let status = parts.next().unwrap().parse().unwrap();

    let mut headers = Vec::new();
    loop {
        line.clear();
        let _ = reader.read_line(&mut line).unwrap();
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        let (name, value) = header.split_once(':').unwrap();
        headers.push((name.to_string(), value.trim().to_string()));
    }

    let mut response = ClientResponse {
        status,
        headers,
        body: Vec::new(),
    };
    if head {
        return Some(response);
    }
    if response.is_chunked() {
        let _ = chunked_transfer::Decoder::new(reader)
            .read_to_end(&mut response.body)
            .unwrap();
    } else if let Some(length) = response.header("content-length") {
        let length = length.parse().unwrap();
        response.body.resize(length, 0);
        reader.read_exact(&mut response.body).unwrap();
    } else {
        let _ = reader.read_to_end(&mut response.body).unwrap();
    }
    Some(response)
}

/// Reads all responses until the server closes the connection
pub(crate) fn read_responses(client: TcpStream) -> Vec<ClientResponse> {
    let mut reader = BufReader::new(client);
    let mut responses = Vec::new();
    while let Some(response) = read_response(&mut reader, false) {
        responses.push(response);
    }
    responses
}
