//! Parsing of the request head from a [`ByteReader`]

use std::io::{self, Read};
use std::net::SocketAddr;

use http::Uri;

use crate::common::{value_byte_range_check, HeaderField, HeaderMap, Method};
use crate::log;
use crate::request::{BodyKind, ChunkedBody, Request, RequestBody};
use crate::response::{bad_request, header_fields_too_large, not_implemented};
use crate::util::{header_parameter, media_type, BoundaryReader, BoundedReader, ByteReader, LineError, BOUNDARY_MAX_LEN};
use crate::Response;

/// Failure of [`read_request`]
#[derive(Debug)]
pub(crate) enum ReadError {
    /// The client closed the connection before sending a byte of the next request
    ConnectionClosed,
    /// Read timeout of the socket expired
    Timeout(io::Error),
    Io(io::Error),
    /// Protocol error, answered with the carried response
    Malformed(Response),
}

impl std::error::Error for ReadError {}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::ConnectionClosed => f.write_str("connection closed"),
            ReadError::Timeout(err) => write!(f, "timeout: {err}"),
            ReadError::Io(err) => write!(f, "{err}"),
            ReadError::Malformed(response) => write!(f, "malformed request: {}", response.status()),
        }
    }
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> Self {
        if is_timeout(&err) {
            ReadError::Timeout(err)
        } else {
            ReadError::Io(err)
        }
    }
}

/// `true` for the errors of an expired socket timeout
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

const UNEXPECTED_END: &str = "BAD REQUEST: Unexpected end of request.";
const INVALID_HEADER: &str = "BAD REQUEST: Invalid header line.";

#[inline]
fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn trim_blank(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !is_blank(*first) {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !is_blank(*last) {
            break;
        }
        bytes = rest;
    }
    bytes
}

/// Splits off the next token, returns it and the rest after the separating blanks
fn next_token(line: &[u8]) -> (&[u8], &[u8]) {
    let end = line.iter().position(|&b| is_blank(b)).unwrap_or(line.len());
    let (token, rest) = line.split_at(end);
    let rest_start = rest.iter().position(|&b| !is_blank(b)).unwrap_or(rest.len());
    (token, &rest[rest_start..])
}

#[derive(Debug)]
struct StartLine {
    method: Method,
    target: String,
    uri: Uri,
    version: String,
}

/// Parses `METHOD target HTTP/version`, `None` for a blank line
fn parse_start_line(line: &[u8]) -> Option<Result<StartLine, Response>> {
    let line = trim_blank(line);
    if line.is_empty() {
        return None;
    }
    Some(parse_start_tokens(line))
}

fn parse_start_tokens(line: &[u8]) -> Result<StartLine, Response> {
    let (method, rest) = next_token(line);
    if rest.is_empty() {
        return Err(bad_request("BAD REQUEST: Syntax error."));
    }
    let method = Method::lookup(method).ok_or_else(|| {
        bad_request(format!(
            "BAD REQUEST: Syntax error. HTTP verb {} unhandled.",
            String::from_utf8_lossy(method)
        ))
    })?;

    let (target, rest) = next_token(rest);
    let illegal_uri = || bad_request("BAD REQUEST: Syntax error. Illegal URI.");
    let target = std::str::from_utf8(target).map_err(|_| illegal_uri())?;
    let uri = target.parse::<Uri>().map_err(|err| {
        log::debug!("illegal uri {target:?}: {err}");
        let _ = err;
        illegal_uri()
    })?;

    if rest.is_empty() {
        return Err(bad_request("BAD REQUEST: Syntax error. Missing HTTP version."));
    }
    let version = String::from_utf8_lossy(rest);
    let version = match version.strip_prefix("HTTP/") {
        Some(version) if !version.is_empty() => version.to_string(),
        _ => {
            return Err(bad_request(format!(
                "BAD REQUEST: Syntax error. Illegal HTTP version {version}."
            )))
        }
    };

    Ok(StartLine {
        method,
        target: target.to_string(),
        uri,
        version,
    })
}

/// Adds the header of `line` to `headers`, `Ok(false)` for the blank line ending the head
fn parse_header_line(line: &[u8], headers: &mut HeaderMap) -> Result<bool, Response> {
    let line = trim_blank(line);
    if line.is_empty() {
        return Ok(false);
    }

    let name_end = line
        .iter()
        .position(|&b| b == b':' || is_blank(b))
        .unwrap_or(line.len());
    let (name, rest) = line.split_at(name_end);
    let rest = trim_blank(rest);
    let value = match rest {
        [b':', value @ ..] => trim_blank(value),
        _ => return Err(bad_request(INVALID_HEADER)),
    };

    let field = HeaderField::from_bytes(name).map_err(|err| {
        log::debug!("invalid header name {:?}: {err}", String::from_utf8_lossy(name));
        let _ = err;
        bad_request(INVALID_HEADER)
    })?;
    let value = std::str::from_utf8(value)
        .ok()
        .filter(|value| value_byte_range_check(value.as_bytes()).is_ok())
        .ok_or_else(|| bad_request(INVALID_HEADER))?;

    headers.add(field, value);
    Ok(true)
}

fn line_error(err: LineError) -> ReadError {
    match err {
        LineError::TooLong => ReadError::Malformed(header_fields_too_large()),
        LineError::Eof { .. } => ReadError::Malformed(bad_request(UNEXPECTED_END)),
        LineError::Io(err) => ReadError::from(err),
    }
}

/// Takes `len` bytes of the head budget `rest`
fn charge_head(rest: &mut usize, len: usize) -> Result<(), ReadError> {
    *rest = rest
        .checked_sub(len)
        .ok_or_else(|| ReadError::Malformed(header_fields_too_large()))?;
    Ok(())
}

/// Reads the head of the next request and sets up the reader of its body
///
/// Blank lines in front of the request line are skipped. The request line
/// and all header lines together may take `head_limit` bytes.
///
/// # Errors
///
/// - [`ReadError::ConnectionClosed`] at the end of stream before the request line
/// - [`ReadError::Malformed`] with the response to send for protocol errors
/// - [`ReadError::Timeout`] or [`ReadError::Io`] for failures of the connection
///
pub(crate) fn read_request<'a, R>(
    reader: &'a mut ByteReader<R>,
    head_limit: usize,
    addrs: (Option<SocketAddr>, Option<SocketAddr>),
) -> Result<Request<'a>, ReadError>
where
    R: Read,
{
    let mut head_rest = head_limit;

    let start = loop {
        match reader.read_line(|line| (line.len(), parse_start_line(line))) {
            Ok((len, Some(start))) => {
                charge_head(&mut head_rest, len)?;
                break start.map_err(ReadError::Malformed)?;
            }
            Ok((_, None)) => {}
            Err(LineError::Eof { partial: false }) => return Err(ReadError::ConnectionClosed),
            Err(err) => return Err(line_error(err)),
        }
    };

    let mut headers = HeaderMap::new();
    loop {
        let parsed = reader.read_line(|line| {
            charge_head(&mut head_rest, line.len())?;
            parse_header_line(line, &mut headers).map_err(ReadError::Malformed)
        });
        match parsed {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => break,
            Ok(Err(err)) => return Err(err),
            Err(err) => return Err(line_error(err)),
        }
    }

    log::debug!("{} {} HTTP/{}", start.method, start.target, start.version);

    let (kind, body_size) = body_framing(start.method, &headers)?;
    let body = match kind {
        Some(Framing::Chunked) => Some(RequestBody::new(BodyKind::Chunked, ChunkedBody::new(reader))),
        Some(Framing::Multipart(boundary)) => Some(RequestBody::new(
            BodyKind::Multipart,
            BoundaryReader::new(reader, &boundary),
        )),
        Some(Framing::Length(length)) => Some(RequestBody::new(
            BodyKind::Bounded,
            BoundedReader::new(reader, length),
        )),
        None => None,
    };

    Ok(Request::new(
        start.method,
        start.target,
        start.uri,
        start.version,
        headers,
        body,
        body_size,
        addrs,
    ))
}

enum Framing {
    Chunked,
    Multipart(String),
    Length(u64),
}

/// Determines how the body ends and its declared size
fn body_framing(method: Method, headers: &HeaderMap) -> Result<(Option<Framing>, Option<u64>), ReadError> {
    let content_length = match headers.first(&HeaderField::CONTENT_LENGTH) {
        Some(value) => Some(value.trim().parse::<u64>().map_err(|_| {
            ReadError::Malformed(bad_request("BAD REQUEST: Invalid Content-Length."))
        })?),
        None => None,
    };

    if let Some(values) = headers.get(&HeaderField::TRANSFER_ENCODING) {
        let coding = values
            .last()
            .and_then(|value| value.rsplit(',').next())
            .map(|coding| coding.trim().to_ascii_lowercase())
            .unwrap_or_default();
        match coding.as_str() {
            "chunked" => return Ok((Some(Framing::Chunked), None)),
            "identity" | "" => {}
            _ => {
                return Err(ReadError::Malformed(not_implemented(format!(
                    "NOT IMPLEMENTED: Transfer-Encoding {coding} unsupported."
                ))))
            }
        }
    }

    if let Some(content_type) = headers.first(&HeaderField::CONTENT_TYPE) {
        if media_type(content_type) == "multipart/form-data" {
            let boundary = header_parameter(content_type, "boundary")
                .filter(|boundary| !boundary.is_empty() && boundary.len() <= BOUNDARY_MAX_LEN);
            return match boundary {
                Some(boundary) if method == Method::Post => {
                    Ok((Some(Framing::Multipart(boundary)), content_length))
                }
                _ => Err(ReadError::Malformed(bad_request(
                    "BAD REQUEST: Invalid Content-Type.",
                ))),
            };
        }
    }

    let length = content_length.unwrap_or(0);
    Ok((
        (length > 0).then_some(Framing::Length(length)),
        Some(length),
    ))
}
