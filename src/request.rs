use std::io::{self, Read};
use std::net::SocketAddr;

use http::Uri;

use crate::common::{HeaderField, HeaderMap, Method};
use crate::util::{media_type, BoundaryReader, BoundedReader, ByteReader};

/// Represents an HTTP request made by a client.
///
/// A `Request` is created by the engine for every request read from a
/// connection and handed to the [`Handler`](crate::Handler). It borrows the
/// connection, so the body can only be read while the handler runs.
///
/// Body bytes not read by the handler are skipped after the response was
/// written, so the next request on a keep-alive connection starts at the
/// right position.
pub struct Request<'a> {
    method: Method,
    target: String,
    uri: Uri,
    version: String,
    headers: HeaderMap,
    body: Option<RequestBody<'a>>,
    body_size: Option<u64>,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
}

impl<'a> Request<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: Method,
        target: String,
        uri: Uri,
        version: String,
        headers: HeaderMap,
        body: Option<RequestBody<'a>>,
        body_size: Option<u64>,
        addrs: (Option<SocketAddr>, Option<SocketAddr>),
    ) -> Self {
        Self {
            method,
            target,
            uri,
            version,
            headers,
            body,
            body_size,
            remote_addr: addrs.0,
            local_addr: addrs.1,
        }
    }

    /// Method of the request line
    #[must_use]
    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Request target exactly as sent, e.g. `/search?q=rust`
    #[must_use]
    #[inline]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The target parsed as URI
    #[must_use]
    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Path component of the target, not percent-decoded
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Query component of the target, not decoded
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Protocol version following `HTTP/`, e.g. `1.1`
    #[must_use]
    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// All request headers
    #[must_use]
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of header `field`
    #[must_use]
    pub fn header(&self, field: &HeaderField) -> Option<&str> {
        self.headers.first(field)
    }

    /// Media type of the `Content-Type` header, lowercased and without parameters
    #[must_use]
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .first(&HeaderField::CONTENT_TYPE)
            .map(media_type)
    }

    /// Declared size of the body, `None` if only the end of the body marks its size
    #[must_use]
    #[inline]
    pub fn body_size(&self) -> Option<u64> {
        self.body_size
    }

    /// Reader of the body, `None` for requests without body
    #[inline]
    pub fn body(&mut self) -> Option<&mut RequestBody<'a>> {
        self.body.as_mut()
    }

    /// Address of the client, `None` for unix sockets
    #[must_use]
    #[inline]
    pub fn remote_addr(&self) -> Option<&SocketAddr> {
        self.remote_addr.as_ref()
    }

    /// Address the connection was accepted on, `None` for unix sockets
    #[must_use]
    #[inline]
    pub fn local_addr(&self) -> Option<&SocketAddr> {
        self.local_addr.as_ref()
    }

    /// `true` if the client allows to reuse the connection
    ///
    /// Only `HTTP/1.1` requests without `Connection: close` keep the connection.
    #[must_use]
    pub fn is_keep_alive(&self) -> bool {
        self.version == "1.1"
            && !self
                .headers
                .first(&HeaderField::CONNECTION)
                .map_or(false, |value| value.trim().eq_ignore_ascii_case("close"))
    }

    /// Skips the unread rest of the body
    ///
    /// # Errors
    ///
    /// - `io::Error` if the connection fails or ends before the end of the body
    ///
    pub fn finish(&mut self) -> io::Result<()> {
        match self.body.as_mut() {
            Some(body) => body.finish(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("body_size", &self.body_size)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} HTTP/{}", self.method, self.target, self.version)
    }
}

/// How the end of a [`RequestBody`] is determined
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BodyKind {
    /// Exactly `Content-Length` bytes
    Bounded,
    /// Raw `multipart/form-data` up to the closing boundary
    Multipart,
    /// `Transfer-Encoding: chunked`, decoded
    Chunked,
}

/// Body reader bound to the connection
pub(crate) trait BodySource: Read {
    fn finish(&mut self) -> io::Result<()>;
}

impl<R: Read> BodySource for BoundedReader<'_, R> {
    fn finish(&mut self) -> io::Result<()> {
        BoundedReader::finish(self)
    }
}

impl<R: Read> BodySource for BoundaryReader<'_, R> {
    fn finish(&mut self) -> io::Result<()> {
        BoundaryReader::finish(self)
    }
}

/// Decoded chunked body, the trailer is consumed by the decoder
pub(crate) struct ChunkedBody<'a, R>
where
    R: Read,
{
    decoder: chunked_transfer::Decoder<&'a mut ByteReader<R>>,
    done: bool,
}

impl<'a, R> ChunkedBody<'a, R>
where
    R: Read,
{
    pub(crate) fn new(reader: &'a mut ByteReader<R>) -> Self {
        Self {
            decoder: chunked_transfer::Decoder::new(reader),
            done: false,
        }
    }
}

impl<R: Read> Read for ChunkedBody<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done {
            return Ok(0);
        }
        let n = self.decoder.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.done = true;
        }
        Ok(n)
    }
}

impl<R: Read> BodySource for ChunkedBody<'_, R> {
    fn finish(&mut self) -> io::Result<()> {
        let _ = io::copy(self, &mut io::sink())?;
        Ok(())
    }
}

impl<R: Read> Drop for ChunkedBody<'_, R> {
    fn drop(&mut self) {
        if !self.done {
            let _ = BodySource::finish(self);
        }
    }
}

/// Body of a [`Request`]
///
/// Reading ends at the end of the body, never beyond. Dropping the reader
/// skips the unread rest.
pub struct RequestBody<'a> {
    kind: BodyKind,
    source: Box<dyn BodySource + 'a>,
}

impl<'a> RequestBody<'a> {
    pub(crate) fn new<S>(kind: BodyKind, source: S) -> Self
    where
        S: BodySource + 'a,
    {
        Self {
            kind,
            source: Box::new(source),
        }
    }

    /// How the end of the body is determined
    #[must_use]
    #[inline]
    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    /// Skips the unread rest of the body
    ///
    /// # Errors
    ///
    /// - `io::Error` if the connection fails or ends before the end of the body
    ///
    pub fn finish(&mut self) -> io::Result<()> {
        self.source.finish()
    }
}

impl Read for RequestBody<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.source.read(buf)
    }
}

impl std::fmt::Debug for RequestBody<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
