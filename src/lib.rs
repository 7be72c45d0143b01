//! # Simple usage
//!
//! ## Creating the server
//!
//! A [`Server`] is created from a [`ServerConfig`] and a [`Handler`]. Every
//! request of every connection is passed to the handler, which answers it
//! with a [`Response`].
//!
//! The easiest way to get a running server is `Server::http()`:
//!
//! ```no_run
//! use tiny_httpd::{HandlerError, Request, Response, Server};
//!
//! let server = Server::http("0.0.0.0:8000", |rq: &mut Request<'_>| -> Result<Response, HandlerError> {
//!     Ok(Response::text(format!("hello from {}", rq.path())))
//! })
//! .unwrap();
//!
//! server.await_termination();
//! ```
//!
//! A newly-created `Server` with `http()` is already listening. With
//! [`Server::new`] the server waits for [`Server::start`], which accepts the
//! connections on a dedicated thread, or [`Server::run`], which accepts them
//! on the calling thread.
//!
//! ## Handling requests
//!
//! The [`Request`] borrows the connection while the handler runs. Its body
//! is read from [`Request::body`]; whatever the handler leaves unread is
//! skipped after the response was written.
//!
//! ```no_run
//! use std::io::Read;
//! use tiny_httpd::{Handler, HandlerError, Method, Request, Response, Server, ServerConfig};
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     fn handle(&self, rq: &mut Request<'_>) -> Result<Response, HandlerError> {
//!         if rq.method() != Method::Post {
//!             return Err(Response::empty(405).into());
//!         }
//!         let mut content = Vec::new();
//!         if let Some(body) = rq.body() {
//!             let _ = body.read_to_end(&mut content)?;
//!         }
//!         Ok(Response::bytes(content).with_content_type("application/octet-stream"))
//!     }
//! }
//!
//! let server = Server::new(ServerConfig::default(), Echo);
//! server.run().unwrap();
//! ```
//!
//! ## Stopping
//!
//! [`Server::stop`] stops accepting connections and closes the open ones.
//! [`Server::await_termination`] waits until all of this is done. Dropping
//! the `Server` does both.
//!
//! ## Responses
//!
//! Responses are built by value. Bodies of known length are sent with
//! `Content-Length`, streams of unknown length chunked. Clients sending
//! `Accept-Encoding: gzip` get compressible content types compressed.
//!
//! ```
//! use tiny_httpd::{HeaderField, Response};
//!
//! let response = Response::text("{\"ok\":true}")
//!     .with_content_type("application/json")
//!     .with_header(HeaderField::new("x-api").unwrap(), "1");
//! assert_eq!(response.content_length(), Some(11));
//! ```

pub use common::{limits, HeaderError, HeaderField, HeaderMap, Method, Status, StatusCode};
pub use handler::{BoxError, DefaultHandler, Handler, HandlerError};
pub use request::{BodyKind, Request, RequestBody};
pub use response::{Body, Response, ResponseError, StreamBody};
pub use scheduler::{Scheduler, Task, ThreadPerTask};
pub use server::{Server, ServerError, ServerState};
pub use server_config::ServerConfig;
pub use socket_config::SocketConfig;
pub use socket_listener::{ConfigListenAddr, ListenAddr};
#[cfg(feature = "ssl-rustls")]
pub use ssl::SslConfig;
pub use util::TaskPool;

use connection_stream::ConnectionStream;

mod common;
mod connection_stream;
mod handler;
mod log;
mod registry;
mod request;
mod request_reader;
pub mod response;
mod scheduler;
mod server;
mod server_config;
mod session;
mod socket_config;
mod socket_listener;
pub mod ssl;
mod util;
