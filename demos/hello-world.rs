#![allow(missing_docs, unused_crate_dependencies)]

use tiny_httpd::{HandlerError, Request, Response, Server};

fn main() {
    let server = Server::http(
        "0.0.0.0:9975",
        |_rq: &mut Request<'_>| -> Result<Response, HandlerError> {
            Ok(Response::text("hello world"))
        },
    )
    .unwrap();
    let port = server.local_addr().unwrap().to_ip().unwrap().port();
    println!("Now listening on http://localhost:{port}/");

    server.await_termination();
}
