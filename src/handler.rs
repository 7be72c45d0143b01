//! [`Handler`] answering the requests of all connections

use std::error::Error;
use std::io;

use crate::log;
use crate::request::Request;
use crate::response::{default_page, internal_server_error, Response};

/// Error type of the [`Handler`] hooks
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A `Handler` is called for every request of every connection
///
/// The handler is shared by all sessions, so it is called concurrently from
/// the threads of the [`Scheduler`](crate::Scheduler).
///
/// Only [`handle`](Handler::handle) is required. The error hooks have
/// defaults that log the error.
///
/// A closure `Fn(&mut Request<'_>) -> Result<Response, HandlerError>` is a
/// handler too:
///
/// ```
/// # use tiny_httpd::{HandlerError, Request, Response};
/// let handler = |rq: &mut Request<'_>| -> Result<Response, HandlerError> {
///     Ok(Response::text(format!("hello {}", rq.path())))
/// };
/// # let _ = handler;
/// ```
pub trait Handler: Send + Sync {
    /// Answers `request`
    ///
    /// The request body can be read from [`Request::body`]. Bytes left unread
    /// are skipped after the response is written.
    ///
    /// # Errors
    ///
    /// - [`HandlerError::Respond`] sends the carried response
    /// - [`HandlerError::Recoverable`] goes to [`handle_recoverable_error`](Handler::handle_recoverable_error)
    /// - [`HandlerError::Unrecoverable`] goes to [`handle_unrecoverable_error`](Handler::handle_unrecoverable_error)
    ///   and closes the connection without response
    ///
    fn handle(&self, request: &mut Request<'_>) -> Result<Response, HandlerError>;

    /// Creates the response for an error the connection survives
    ///
    /// `request` is `None` if the error happened before a request was read.
    /// By default logs a warning and answers
    /// [`internal_server_error`](crate::response::internal_server_error).
    fn handle_recoverable_error(
        &self,
        request: Option<&Request<'_>>,
        err: &(dyn Error + Send + Sync + 'static),
    ) -> Response {
        if let Some(request) = request {
            log::warn!("error handling {request}: {err}");
            let _ = request;
        } else {
            log::warn!("error reading request: {err}");
        }
        let _ = err;
        internal_server_error()
    }

    /// Called before the connection is closed because of `err`
    ///
    /// `request` is the request whose handling failed.
    fn handle_unrecoverable_error(
        &self,
        request: Option<&Request<'_>>,
        err: &(dyn Error + Send + Sync + 'static),
    ) {
        if let Some(request) = request {
            log::error!("closing connection after {request}: {err}");
            let _ = request;
        } else {
            log::error!("closing connection: {err}");
        }
        let _ = err;
    }
}

impl<F> Handler for F
where
    F: Fn(&mut Request<'_>) -> Result<Response, HandlerError> + Send + Sync,
{
    #[inline]
    fn handle(&self, request: &mut Request<'_>) -> Result<Response, HandlerError> {
        self(request)
    }
}

/// Answers every request with a _404 Not Found_ page
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHandler;

impl Handler for DefaultHandler {
    fn handle(&self, _request: &mut Request<'_>) -> Result<Response, HandlerError> {
        Ok(default_page())
    }
}

/// Failure of [`Handler::handle`]
#[derive(Debug)]
pub enum HandlerError {
    /// Send this response instead
    Respond(Response),
    /// Answered with the response of [`Handler::handle_recoverable_error`]
    Recoverable(BoxError),
    /// Closes the connection after [`Handler::handle_unrecoverable_error`]
    Unrecoverable(BoxError),
}

impl HandlerError {
    /// Wraps `err` as [`HandlerError::Recoverable`]
    pub fn recoverable<E: Into<BoxError>>(err: E) -> Self {
        HandlerError::Recoverable(err.into())
    }

    /// Wraps `err` as [`HandlerError::Unrecoverable`]
    pub fn unrecoverable<E: Into<BoxError>>(err: E) -> Self {
        HandlerError::Unrecoverable(err.into())
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::Respond(response) => write!(f, "responding {}", response.status()),
            HandlerError::Recoverable(err) | HandlerError::Unrecoverable(err) => write!(f, "{err}"),
        }
    }
}

impl Error for HandlerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            HandlerError::Respond(_) => None,
            HandlerError::Recoverable(err) | HandlerError::Unrecoverable(err) => Some(err.as_ref()),
        }
    }
}

impl From<io::Error> for HandlerError {
    fn from(err: io::Error) -> Self {
        HandlerError::Recoverable(Box::new(err))
    }
}

impl From<Response> for HandlerError {
    fn from(response: Response) -> Self {
        HandlerError::Respond(response)
    }
}

/// Error passed to the hooks when a handler panicked
#[derive(Debug)]
pub(crate) struct HandlerPanic(pub(crate) String);

impl std::fmt::Display for HandlerPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler panicked: {}", self.0)
    }
}

impl Error for HandlerPanic {}

impl HandlerPanic {
    pub(crate) fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown payload".to_string());
        HandlerPanic(message)
    }
}
