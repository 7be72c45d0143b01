//! Reusable standard [`Response`](super::Response)

use lazy_static::lazy_static;

use crate::common::{HeaderField, Status};

use super::Response;

const PLAIN_TEXT: &str = "text/plain";

lazy_static! {
    static ref CACHE_404: Response = Response::new(Status::NOT_FOUND)
        .with_content_type("text/html")
        .with_text("<html><head><title>404 Not Found</title></head><body><h1>Not Found</h1></body></html>")
        .frozen();
    static ref CACHE_431: Response = Response::new(Status::REQUEST_HEADER_FIELDS_TOO_LARGE)
        .with_content_type(PLAIN_TEXT)
        .with_text("REQUEST HEADER FIELDS TOO LARGE")
        .with_header(HeaderField::CONNECTION, "close")
        .frozen();
    static ref CACHE_500: Response = Response::new(Status::INTERNAL_SERVER_ERROR)
        .with_content_type(PLAIN_TEXT)
        .with_text("SERVER INTERNAL ERROR")
        .frozen();
}

impl Response {
    /// Freezes a response built from reusable bodies only
    fn frozen(self) -> Response {
        debug_assert!(self.body().is_reusable());
        self.freeze().unwrap_or_else(|err| unreachable!("{err}"))
    }
}

/// _400 Bad Request_ with `message` as plain text, closing the connection
pub(crate) fn bad_request<M: Into<String>>(message: M) -> Response {
    Response::new(Status::BAD_REQUEST)
        .with_content_type(PLAIN_TEXT)
        .with_header(HeaderField::CONNECTION, "close")
        .with_text(message.into())
}

/// _501 Not Implemented_ with `message` as plain text, closing the connection
pub(crate) fn not_implemented<M: Into<String>>(message: M) -> Response {
    Response::new(Status::NOT_IMPLEMENTED)
        .with_content_type(PLAIN_TEXT)
        .with_header(HeaderField::CONNECTION, "close")
        .with_text(message.into())
}

/// _431 Request Header Fields Too Large_
pub(crate) fn header_fields_too_large() -> Response {
    CACHE_431.clone()
}

/// _500 Internal Server Error_ with the plain text body `SERVER INTERNAL ERROR`
///
/// This is the response of the default recoverable error hook of a
/// [`Handler`](crate::Handler).
#[must_use]
pub fn internal_server_error() -> Response {
    CACHE_500.clone()
}

/// _404 Not Found_ page answered by the [`DefaultHandler`](crate::DefaultHandler)
pub(crate) fn default_page() -> Response {
    CACHE_404.clone()
}
