//! `response` module
//!
//! See [`Response`]

use std::{
    borrow::Cow,
    io::Read,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use crate::common::{HeaderField, HeaderMap, Status, StatusCode};
use crate::log;
use crate::util::header_parameter;

pub use self::standard::internal_server_error;
pub(crate) use self::standard::{bad_request, default_page, header_fields_too_large, not_implemented};
pub(crate) use self::writer::{accepts_gzip, write_response, WriteContext};

mod date_header;
mod standard;
mod transfer_encoding;
mod writer;

/// Body of a [`Response`]
///
/// Every variant except [`Body::Stream`] can be sent any number of times.
#[derive(Clone, Default)]
pub enum Body {
    /// No body, sent with `Content-Length: 0`
    #[default]
    Empty,
    /// Raw bytes
    Bytes(Arc<[u8]>),
    /// Text, encoded with the `charset` of the `Content-Type` header or UTF-8
    Text(Arc<str>),
    /// One-shot reader
    Stream(StreamBody),
    /// File opened when the response is written
    File(PathBuf),
}

impl Body {
    /// `true` if the body can be sent more than once
    #[must_use]
    pub fn is_reusable(&self) -> bool {
        !matches!(self, Body::Stream(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            Body::Empty => "empty",
            Body::Bytes(_) => "bytes",
            Body::Text(_) => "text",
            Body::Stream(_) => "stream",
            Body::File(_) => "file",
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Body::Text(text) => write!(f, "Text({} chars)", text.chars().count()),
            Body::Stream(stream) => write!(f, "Stream(available={})", stream.is_available()),
            Body::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Reader of a [`Body::Stream`], taken out by the first write of the response
///
/// Clones share the reader.
#[derive(Clone)]
pub struct StreamBody {
    reader: Arc<Mutex<Option<Box<dyn Read + Send>>>>,
}

impl StreamBody {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader: Arc::new(Mutex::new(Some(reader))),
        }
    }

    /// `false` once the reader was taken or closed
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn take(&self) -> Option<Box<dyn Read + Send>> {
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Failures of [`Response`] handling
#[derive(Debug)]
pub enum ResponseError {
    /// Body of the response was already sent or closed
    Consumed,
    /// Reason phrase is not printable ASCII
    InvalidReason(String),
    /// A response with a [`Body::Stream`] can not be frozen
    NotReusable,
}

impl std::error::Error for ResponseError {}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseError::Consumed => f.write_str("response body already consumed"),
            ResponseError::InvalidReason(reason) => write!(f, "invalid reason phrase: {reason:?}"),
            ResponseError::NotReusable => f.write_str("stream body can not be frozen"),
        }
    }
}

/// Object representing an HTTP response to be written for a `Request`.
///
/// `Response` is built by value: every `with_*` method consumes the response
/// and returns the modified one.
///
/// Some headers have special behaviors:
///
///  - `Content-Length`: setting it is equivalent to [`Response::with_content_length`],
///     the header itself is written by the engine.
///  - `Transfer-Encoding`: managed by the engine, trying to set it has no effect.
///  - `Content-Encoding`: if set, the body is passed through and never compressed.
///
/// A [frozen](Response::freeze) response can be stored in a `static` and cloned
/// for every request. Clones share the header map until one of them changes it.
///
/// ```
/// # use tiny_httpd::{HeaderField, Response};
/// let hello = Response::text("hi").freeze().unwrap();
///
/// let copy = hello.clone().with_header(HeaderField::new("x-request").unwrap(), "1");
/// assert!(!copy.is_frozen());
/// assert!(!hello.headers().contains(&HeaderField::new("x-request").unwrap()));
/// ```
#[derive(Clone)]
pub struct Response {
    status: Status,
    headers: Arc<HeaderMap>,
    headers_shared: bool,
    body: Body,
    content_length: Option<u64>,
    frozen: bool,
}

impl Response {
    /// Response without body
    #[must_use]
    pub fn new<S: Into<Status>>(status: S) -> Self {
        Self {
            status: status.into(),
            headers: Arc::new(HeaderMap::new()),
            headers_shared: false,
            body: Body::Empty,
            content_length: None,
            frozen: false,
        }
    }

    /// Response without body and the registered reason phrase of `code`
    #[must_use]
    pub fn empty<C: Into<StatusCode>>(code: C) -> Self {
        Self::new(Status::new(code))
    }

    /// _200 OK_ with `text` as `text/plain; charset=utf-8` body
    #[must_use]
    pub fn text<T: Into<Arc<str>>>(text: T) -> Self {
        Self::new(Status::OK)
            .with_header(HeaderField::CONTENT_TYPE, "text/plain; charset=utf-8")
            .with_text(text)
    }

    /// _200 OK_ with `html` as `text/html; charset=utf-8` body
    #[must_use]
    pub fn html<T: Into<Arc<str>>>(html: T) -> Self {
        Self::new(Status::OK)
            .with_header(HeaderField::CONTENT_TYPE, "text/html; charset=utf-8")
            .with_text(html)
    }

    /// _200 OK_ with raw `bytes` body
    #[must_use]
    pub fn bytes<B: Into<Arc<[u8]>>>(bytes: B) -> Self {
        Self::new(Status::OK).with_bytes(bytes)
    }

    /// _200 OK_ with body copied from `reader`
    ///
    /// With unknown `length` the body is sent chunked.
    #[must_use]
    pub fn stream<R>(reader: R, length: Option<u64>) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::new(Status::OK).with_stream(reader, length)
    }

    /// _200 OK_ with the content of the file at `path`
    #[must_use]
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(Status::OK).with_file(path)
    }

    /// Changes the status
    #[must_use]
    pub fn with_status<S: Into<Status>>(mut self, status: S) -> Self {
        self.thaw();
        self.status = status.into();
        self
    }

    /// Replaces all values of `field` by `value`
    #[must_use]
    pub fn with_header<V: Into<String>>(mut self, field: HeaderField, value: V) -> Self {
        let value = value.into();
        if self.special_header(&field, &value) {
            return self;
        }
        self.headers_mut().insert(field, value);
        self
    }

    /// Adds `value` to the values of `field`
    #[must_use]
    pub fn add_header<V: Into<String>>(mut self, field: HeaderField, value: V) -> Self {
        let value = value.into();
        if self.special_header(&field, &value) {
            return self;
        }
        self.headers_mut().add(field, value);
        self
    }

    /// Removes all values of `field`
    #[must_use]
    pub fn remove_header(mut self, field: &HeaderField) -> Self {
        if *field == HeaderField::CONTENT_LENGTH {
            self.thaw();
            self.content_length = None;
        } else if self.headers.contains(field) {
            let _ = self.headers_mut().remove(field);
        }
        self
    }

    /// Sets the `Content-Type` header
    #[must_use]
    pub fn with_content_type<V: Into<String>>(self, value: V) -> Self {
        self.with_header(HeaderField::CONTENT_TYPE, value)
    }

    /// Replaces the body by `text`
    #[must_use]
    pub fn with_text<T: Into<Arc<str>>>(self, text: T) -> Self {
        self.with_body(Body::Text(text.into()), None)
    }

    /// Replaces the body by `bytes`
    #[must_use]
    pub fn with_bytes<B: Into<Arc<[u8]>>>(self, bytes: B) -> Self {
        self.with_body(Body::Bytes(bytes.into()), None)
    }

    /// Replaces the body by `reader` which provides `length` bytes, if known
    #[must_use]
    pub fn with_stream<R>(self, reader: R, length: Option<u64>) -> Self
    where
        R: Read + Send + 'static,
    {
        self.with_body(Body::Stream(StreamBody::new(Box::new(reader))), length)
    }

    /// Replaces the body by the content of the file at `path`
    #[must_use]
    pub fn with_file<P: Into<PathBuf>>(self, path: P) -> Self {
        self.with_body(Body::File(path.into()), None)
    }

    /// Replaces the body
    ///
    /// `content_length` is only used for [`Body::Stream`], the length of the
    /// other variants is determined from the content.
    #[must_use]
    pub fn with_body(mut self, body: Body, content_length: Option<u64>) -> Self {
        self.thaw();
        self.close();
        self.content_length = match body {
            Body::Stream(_) => content_length,
            _ => None,
        };
        self.body = body;
        self
    }

    /// Declares the length of a [`Body::Stream`]
    #[must_use]
    pub fn with_content_length(mut self, length: Option<u64>) -> Self {
        self.thaw();
        if let Body::Stream(_) = self.body {
            self.content_length = length;
        }
        self
    }

    /// Marks the response immutable, so it can be shared between requests
    ///
    /// # Errors
    ///
    /// - [`ResponseError::NotReusable`] for a [`Body::Stream`]
    ///
    pub fn freeze(mut self) -> Result<Self, ResponseError> {
        if !self.body.is_reusable() {
            return Err(ResponseError::NotReusable);
        }
        self.frozen = true;
        Ok(self)
    }

    /// Drops the reader of a [`Body::Stream`]
    pub fn close(&self) {
        if let Body::Stream(stream) = &self.body {
            drop(stream.take());
        }
    }

    /// Status of the response
    #[must_use]
    #[inline]
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Headers set on the response
    #[must_use]
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body of the response
    #[must_use]
    #[inline]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Length of the body in bytes, `None` if only known while writing
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        match &self.body {
            Body::Empty => Some(0),
            Body::Bytes(bytes) => Some(bytes.len() as u64),
            Body::Text(text) => Some(self.encode_text(text).len() as u64),
            Body::Stream(_) => self.content_length,
            Body::File(_) => None,
        }
    }

    /// `true` if frozen by [`Response::freeze`]
    #[must_use]
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// `false` if the body is a stream which was already sent or closed
    #[must_use]
    pub fn is_available(&self) -> bool {
        match &self.body {
            Body::Stream(stream) => stream.is_available(),
            _ => true,
        }
    }

    /// Encodes `text` with the charset declared in `Content-Type`
    pub(crate) fn encode_text<'t>(&self, text: &'t str) -> Cow<'t, [u8]> {
        let charset = self
            .headers
            .first(&HeaderField::CONTENT_TYPE)
            .and_then(|content_type| header_parameter(content_type, "charset"));
        match charset {
            Some(charset) => encode_text(text, &charset),
            None => Cow::Borrowed(text.as_bytes()),
        }
    }

    /// A mutation of a frozen response yields an unfrozen one which still shares the headers
    fn thaw(&mut self) {
        if self.frozen {
            self.frozen = false;
            self.headers_shared = true;
        }
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.thaw();
        if self.headers_shared {
            self.headers = Arc::new(HeaderMap::clone(&self.headers));
            self.headers_shared = false;
        }
        Arc::make_mut(&mut self.headers)
    }

    /// Handles headers which are not stored in the map, `true` if handled
    fn special_header(&mut self, field: &HeaderField, value: &str) -> bool {
        if *field == HeaderField::CONTENT_LENGTH {
            match value.trim().parse::<u64>() {
                Ok(length) => {
                    self.thaw();
                    if let Body::Stream(_) = self.body {
                        self.content_length = Some(length);
                    }
                }
                Err(err) => {
                    log::debug!("ignore invalid content-length {value:?}: {err}");
                    let _ = err;
                }
            }
            true
        } else if *field == HeaderField::TRANSFER_ENCODING {
            log::debug!("ignore transfer-encoding {value:?} set by response");
            true
        } else {
            false
        }
    }
}

/// Encodes `text` in `charset`, unmappable characters become `?`
///
/// Only UTF-8, ISO-8859-1 and US-ASCII are known, others fall back to UTF-8.
pub(crate) fn encode_text<'t>(text: &'t str, charset: &str) -> Cow<'t, [u8]> {
    let max = match charset.to_ascii_lowercase().as_str() {
        "iso-8859-1" | "latin1" | "iso8859-1" | "l1" => 0xff,
        "us-ascii" | "ascii" => 0x7f,
        _ => return Cow::Borrowed(text.as_bytes()),
    };
    if text.is_ascii() {
        return Cow::Borrowed(text.as_bytes());
    }

    Cow::Owned(
        text.chars()
            .map(|ch| match u32::from(ch) {
                code if code <= max => u8::try_from(code).unwrap_or(b'?'),
                _ => b'?',
            })
            .collect(),
    )
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("content_length", &self.content_length)
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Response{{status={}, headers={}, body={}",
            self.status,
            self.headers,
            self.body.kind()
        )?;
        if let Some(length) = self.content_length() {
            write!(f, ", length={length}")?;
        }
        f.write_str("}")
    }
}
