//! Request/response loop of one connection

use std::io::{BufWriter, Read, Write};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::common::limits::{CompressionConfig, LimitsConfig};
use crate::common::{HeaderField, Method};
use crate::handler::{BoxError, Handler, HandlerError, HandlerPanic};
use crate::log;
use crate::request::Request;
use crate::request_reader::{read_request, ReadError};
use crate::response::{accepts_gzip, write_response, Response, ResponseError, WriteContext};
use crate::util::ByteReader;

/// Settings shared by all sessions of a server
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SessionConfig {
    pub(crate) limits: LimitsConfig,
    pub(crate) compression: CompressionConfig,
}

/// A `Session` serves the requests of one connection, one after the other
///
/// The connection is read through the [`ByteReader`] and written through a
/// separate buffered writer, usually a clone of the same socket. The loop
/// ends when the client closes the connection, a read times out, a request
/// is malformed, any side asks for `Connection: close` or writing fails.
pub(crate) struct Session<R, W>
where
    R: Read,
    W: Write,
{
    reader: ByteReader<R>,
    writer: BufWriter<W>,
    handler: Arc<dyn Handler>,
    config: SessionConfig,
    addrs: (Option<SocketAddr>, Option<SocketAddr>),
}

impl<R, W> Session<R, W>
where
    R: Read,
    W: Write,
{
    pub(crate) fn new(
        reader: R,
        writer: W,
        handler: Arc<dyn Handler>,
        config: SessionConfig,
        addrs: (Option<SocketAddr>, Option<SocketAddr>),
    ) -> Self {
        Self {
            reader: ByteReader::with_capacity(config.limits.effective_line_buffer_size(), reader),
            writer: BufWriter::with_capacity(config.limits.output_buffer_size, writer),
            handler,
            config,
            addrs,
        }
    }

    /// Serves requests until the connection ends
    pub(crate) fn run(mut self) {
        log::debug!("session open [{:?}]", self.addrs.0);
        while self.serve_next() {}
        if let Err(err) = self.writer.flush() {
            log::debug!("flush at session end: {err}");
            let _ = err;
        }
        self.reader.close();
        log::debug!("session closed [{:?}]", self.addrs.0);
    }

    /// Reads and answers one request, `true` if the connection stays open
    fn serve_next(&mut self) -> bool {
        let Self {
            reader,
            writer,
            handler,
            config,
            addrs,
        } = self;
        let handler = handler.as_ref();

        let mut request = match read_request(reader, config.limits.header_limit, *addrs) {
            Ok(request) => request,
            Err(ReadError::ConnectionClosed) => {
                log::debug!("connection closed by client");
                return false;
            }
            Err(ReadError::Timeout(err)) => {
                log::debug!("idle connection timed out: {err}");
                let _ = err;
                return false;
            }
            Err(ReadError::Malformed(response)) => {
                log::debug!("malformed request: {response}");
                send_final(writer, &response, config);
                return false;
            }
            Err(ReadError::Io(err)) => {
                let response = handler.handle_recoverable_error(None, &err);
                send_final(writer, &response, config);
                return false;
            }
        };

        let response = match call_handler(handler, &mut request) {
            Ok(response) => response,
            Err(err) => {
                handler.handle_unrecoverable_error(Some(&request), err.as_ref());
                return false;
            }
        };
        if !response.is_available() {
            handler.handle_unrecoverable_error(Some(&request), &ResponseError::Consumed);
            return false;
        }

        let keep_alive = request.is_keep_alive() && !asks_close(&response);
        let ctx = WriteContext {
            head_only: request.method() == Method::Head,
            keep_alive,
            accept_gzip: accepts_gzip(request.headers()),
            compression: &config.compression,
            transfer_buffer_size: config.limits.transfer_buffer_size,
        };
        if let Err(err) = write_response(writer, &response, &ctx) {
            log::warn!("writing response to {request} failed: {err}");
            let _ = err;
            response.close();
            return false;
        }
        response.close();

        if let Err(err) = request.finish() {
            log::debug!("skipping request body failed: {err}");
            let _ = err;
            return false;
        }

        keep_alive
    }
}

impl<R, W> std::fmt::Debug for Session<R, W>
where
    R: Read,
    W: Write,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("addrs", &self.addrs)
            .finish_non_exhaustive()
    }
}

fn asks_close(response: &Response) -> bool {
    response
        .headers()
        .first(&HeaderField::CONNECTION)
        .map_or(false, |value| value.trim().eq_ignore_ascii_case("close"))
}

/// Runs the handler, translating recoverable failures and panics into a response
fn call_handler(handler: &dyn Handler, request: &mut Request<'_>) -> Result<Response, BoxError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request)));
    let err: BoxError = match outcome {
        Ok(Ok(response) | Err(HandlerError::Respond(response))) => return Ok(response),
        Ok(Err(HandlerError::Recoverable(err))) => err,
        Ok(Err(HandlerError::Unrecoverable(err))) => return Err(err),
        Err(payload) => Box::new(HandlerPanic::from_payload(payload.as_ref())),
    };
    Ok(handler.handle_recoverable_error(Some(&*request), err.as_ref()))
}

/// Best effort response before the connection is closed
fn send_final<W: Write>(writer: &mut W, response: &Response, config: &SessionConfig) {
    let ctx = WriteContext {
        head_only: false,
        keep_alive: false,
        accept_gzip: false,
        compression: &config.compression,
        transfer_buffer_size: config.limits.transfer_buffer_size,
    };
    if let Err(err) = write_response(writer, response, &ctx) {
        log::debug!("error response not sent: {err}");
        let _ = err;
    }
    response.close();
}
