use std::{
    borrow::Cow,
    cell::Cell,
    fs::File,
    io::{self, Read, Write},
};

use flate2::{write::GzEncoder, Compression};

use crate::common::{limits::CompressionConfig, HeaderField, HeaderMap};
use crate::log;
use crate::util::{media_type, parse_header_value};

use super::{
    date_header,
    transfer_encoding::{ChunkSink, TransferEncoding},
    Body, Response, ResponseError,
};

/// Request dependent parameters for writing one [`Response`]
#[derive(Debug)]
pub(crate) struct WriteContext<'a> {
    /// Request method was `HEAD`
    pub(crate) head_only: bool,
    /// Connection stays open after this response
    pub(crate) keep_alive: bool,
    /// Client accepts `gzip` content coding
    pub(crate) accept_gzip: bool,
    pub(crate) compression: &'a CompressionConfig,
    pub(crate) transfer_buffer_size: usize,
}

/// `true` if one of the `Accept-Encoding` values lists `gzip` with a quality above 0
pub(crate) fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(&HeaderField::ACCEPT_ENCODING)
        .map_or(false, |values| {
            values.iter().any(|value| {
                parse_header_value(value).iter().any(|(coding, q)| {
                    (coding.eq_ignore_ascii_case("gzip") || coding.eq_ignore_ascii_case("x-gzip"))
                        && *q > 0.0
                })
            })
        })
}

/// Opened body of a response
enum Source<'r> {
    None,
    Data(Cow<'r, [u8]>),
    Reader(Box<dyn Read + Send>, Option<u64>),
}

impl<'r> Source<'r> {
    fn open(response: &'r Response) -> io::Result<Source<'r>> {
        Ok(match response.body() {
            Body::Empty => Source::None,
            Body::Bytes(bytes) => Source::Data(Cow::Borrowed(&bytes[..])),
            Body::Text(text) => Source::Data(response.encode_text(text)),
            Body::Stream(stream) => match stream.take() {
                Some(reader) => Source::Reader(reader, response.content_length()),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        ResponseError::Consumed,
                    ))
                }
            },
            Body::File(path) => {
                let file = File::open(path)?;
                let length = file.metadata()?.len();
                Source::Reader(Box::new(file), Some(length))
            }
        })
    }

    fn length(&self) -> Option<u64> {
        match self {
            Source::None => Some(0),
            Source::Data(data) => Some(data.len() as u64),
            Source::Reader(_, length) => *length,
        }
    }

    /// Copies the body to `writer`, exactly the known length or up to EOF
    fn copy_to<W: Write + ?Sized>(&mut self, writer: &mut W, buf_size: usize) -> io::Result<u64> {
        match self {
            Source::None => Ok(0),
            Source::Data(data) => {
                writer.write_all(data)?;
                Ok(data.len() as u64)
            }
            Source::Reader(reader, length) => copy_body(reader, writer, *length, buf_size),
        }
    }
}

fn copy_body<R, W>(reader: &mut R, writer: &mut W, length: Option<u64>, buf_size: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; buf_size.max(1)];
    let mut written = 0u64;
    loop {
        let want = match length {
            Some(length) if written >= length => return Ok(written),
            #[allow(clippy::cast_possible_truncation)]
            Some(length) => buf.len().min((length - written).min(usize::MAX as u64) as usize),
            None => buf.len(),
        };
        let n = match reader.read(&mut buf[..want]) {
            Ok(0) => {
                return match length {
                    Some(length) => Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("body ended after {written} of {length} bytes"),
                    )),
                    None => Ok(written),
                };
            }
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buf[..n])?;
        written += n as u64;
    }
}

fn is_compressible(content_type: &str) -> bool {
    let media_type = media_type(content_type);
    media_type.starts_with("text/") || media_type == "application/json"
}

/// Chooses how the body of `response` goes over the wire
///
/// Compressing into memory already consumes `source`.
fn choose_transfer_encoding(
    response: &Response,
    source: &mut Source<'_>,
    ctx: &WriteContext<'_>,
) -> io::Result<TransferEncoding> {
    if let Source::None = source {
        return Ok(TransferEncoding::Empty);
    }
    let length = source.length();
    let compression = ctx.compression;

    let gzip = compression.enabled
        && ctx.accept_gzip
        && length != Some(0)
        && !response.headers().contains(&HeaderField::CONTENT_ENCODING)
        && response
            .headers()
            .first(&HeaderField::CONTENT_TYPE)
            .map_or(false, is_compressible)
        && length.map_or(true, |length| length > compression.min_size);

    Ok(match length {
        Some(length) if gzip && length < compression.in_memory_limit => {
            #[allow(clippy::cast_possible_truncation)]
            let mut encoder = GzEncoder::new(Vec::with_capacity(length as usize / 2), Compression::default());
            let _ = source.copy_to(&mut encoder, ctx.transfer_buffer_size)?;
            let data = encoder.finish()?;
            log::trace!("gzip in memory {length} -> {} bytes", data.len());
            TransferEncoding::GzipBuffered(data)
        }
        _ if gzip => TransferEncoding::GzipChunked,
        Some(length) => TransferEncoding::Identity(length),
        None => TransferEncoding::Chunked,
    })
}

fn write_status_line<W: Write>(writer: &mut W, response: &Response) -> io::Result<()> {
    let status = response.status();
    write!(
        writer,
        "HTTP/1.1 {} {}\r\n",
        status.code().0,
        status.reason().unwrap_or_default()
    )
}

/// Writes `response` as one complete HTTP/1.1 message
///
/// # Errors
///
/// - `io::ErrorKind::Other` with [`ResponseError::Consumed`] if the stream body was already taken
/// - `io::ErrorKind::UnexpectedEof` if a body ends before its declared length
/// - any error of `writer` or of reading the body
///
/// After an error the state of the output is undefined. A chunked body is
/// never terminated after a failure.
pub(crate) fn write_response<W: Write>(
    writer: &mut W,
    response: &Response,
    ctx: &WriteContext<'_>,
) -> io::Result<()> {
    let bodyless = response.status().code().is_bodyless();

    let mut source = if bodyless {
        response.close();
        Source::None
    } else {
        Source::open(response)?
    };
    let encoding = if bodyless {
        TransferEncoding::Empty
    } else {
        choose_transfer_encoding(response, &mut source, ctx)?
    };

    write_status_line(writer, response)?;

    let headers = response.headers();
    if !headers.contains(&HeaderField::DATE) {
        writer.write_all(b"date: ")?;
        writer.write_all(date_header::current().as_bytes())?;
        writer.write_all(b"\r\n")?;
    }
    headers.write_to(writer)?;
    if !ctx.keep_alive && !headers.contains(&HeaderField::CONNECTION) {
        writer.write_all(b"connection: close\r\n")?;
    }
    if encoding.is_gzip() {
        writer.write_all(b"content-encoding: gzip\r\n")?;
    }
    if !bodyless {
        match encoding.content_length() {
            Some(length) => write!(writer, "content-length: {length}\r\n")?,
            None if !ctx.head_only => writer.write_all(b"transfer-encoding: chunked\r\n")?,
            None => {}
        }
    }
    writer.write_all(b"\r\n")?;

    if ctx.head_only || bodyless {
        return writer.flush();
    }

    let buf_size = ctx.transfer_buffer_size;
    match encoding {
        TransferEncoding::Empty => {}
        TransferEncoding::Identity(_) => {
            let _ = source.copy_to(writer, buf_size)?;
        }
        TransferEncoding::GzipBuffered(data) => writer.write_all(&data)?,
        TransferEncoding::Chunked => {
            let poisoned = Cell::new(false);
            let mut encoder =
                chunked_transfer::Encoder::with_chunks_size(ChunkSink::new(writer, &poisoned), buf_size);
            let result = source
                .copy_to(&mut encoder, buf_size)
                .and_then(|_| encoder.flush());
            if result.is_err() {
                poisoned.set(true);
            }
            drop(encoder);
            result?;
        }
        TransferEncoding::GzipChunked => {
            let poisoned = Cell::new(false);
            let encoder =
                chunked_transfer::Encoder::with_chunks_size(ChunkSink::new(writer, &poisoned), buf_size);
            let mut gzip = GzEncoder::new(encoder, Compression::default());
            let result = source
                .copy_to(&mut gzip, buf_size)
                .and_then(|_| gzip.try_finish())
                .and_then(|()| gzip.get_mut().flush());
            if result.is_err() {
                poisoned.set(true);
            }
            drop(gzip);
            result?;
        }
    }

    writer.flush()
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, Read, Write};

    use flate2::read::GzDecoder;

    use super::{accepts_gzip, write_response, WriteContext};
    use crate::common::limits::CompressionConfig;
    use crate::{HeaderField, HeaderMap, Response};

    fn context(compression: &CompressionConfig) -> WriteContext<'_> {
        WriteContext {
            head_only: false,
            keep_alive: true,
            accept_gzip: false,
            compression,
            transfer_buffer_size: 16,
        }
    }

    fn split(out: &[u8]) -> (String, Vec<u8>) {
        let pos = out
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("end of head");
        (
            String::from_utf8(out[..pos + 2].to_vec()).unwrap(),
            out[pos + 4..].to_vec(),
        )
    }

    fn dechunk(body: &[u8]) -> Vec<u8> {
        let mut decoded = Vec::new();
        chunked_transfer::Decoder::new(body)
            .read_to_end(&mut decoded)
            .unwrap();
        decoded
    }

    fn gunzip(body: &[u8]) -> Vec<u8> {
        let mut decoded = Vec::new();
        GzDecoder::new(body).read_to_end(&mut decoded).unwrap();
        decoded
    }

    fn write(response: &Response, ctx: &WriteContext<'_>) -> (String, Vec<u8>) {
        let mut out = Vec::new();
        write_response(&mut out, response, ctx).unwrap();
        split(&out)
    }

    #[test]
    fn fixed_length_test() {
        let compression = CompressionConfig::default();
        let response = Response::text("hi").freeze().unwrap();
        let (head, body) = write(&response, &context(&compression));

        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
        assert!(head.contains("\r\ndate: "), "{head}");
        assert!(head.contains("\r\ncontent-type: text/plain; charset=utf-8\r\n"), "{head}");
        assert!(head.contains("\r\ncontent-length: 2\r\n"), "{head}");
        assert!(!head.contains("transfer-encoding"), "{head}");
        assert_eq!(body, b"hi");

        // frozen response can be written again
        let (_, body) = write(&response, &context(&compression));
        assert_eq!(body, b"hi");
    }

    #[test]
    fn chunked_stream_test() {
        let compression = CompressionConfig::default();
        let data: Vec<u8> = (0..200u8).collect();
        let response = Response::stream(Cursor::new(data.clone()), None);
        let (head, body) = write(&response, &context(&compression));

        assert!(head.contains("\r\ntransfer-encoding: chunked\r\n"), "{head}");
        assert!(!head.contains("content-length"), "{head}");
        assert!(body.ends_with(b"0\r\n\r\n"));
        assert_eq!(dechunk(&body), data);
        assert!(!response.is_available());
    }

    #[test]
    fn declared_length_stream_test() {
        let compression = CompressionConfig::default();
        let response = Response::stream(Cursor::new(b"abcdefgh".to_vec()), Some(5));
        let (head, body) = write(&response, &context(&compression));
        assert!(head.contains("\r\ncontent-length: 5\r\n"), "{head}");
        assert_eq!(body, b"abcde");
    }

    #[test]
    fn early_eof_test() {
        let compression = CompressionConfig::default();
        let response = Response::stream(Cursor::new(b"abc".to_vec()), Some(10));
        let mut out = Vec::new();
        let err = write_response(&mut out, &response, &context(&compression)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn consumed_stream_test() {
        let compression = CompressionConfig::default();
        let response = Response::stream(Cursor::new(b"abc".to_vec()), None);
        response.close();
        let mut out = Vec::new();
        assert!(write_response(&mut out, &response, &context(&compression)).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn gzip_chunked_test() {
        let compression = CompressionConfig::default();
        let html = "<html><body>hello hello hello hello</body></html>".repeat(10);
        let response = Response::stream(Cursor::new(html.clone().into_bytes()), None)
            .with_content_type("text/html");
        let mut ctx = context(&compression);
        ctx.accept_gzip = true;
        let (head, body) = write(&response, &ctx);

        assert!(head.contains("\r\ntransfer-encoding: chunked\r\n"), "{head}");
        assert!(head.contains("\r\ncontent-encoding: gzip\r\n"), "{head}");
        assert_eq!(gunzip(&dechunk(&body)), html.as_bytes());
    }

    #[test]
    fn gzip_in_memory_test() {
        let compression = CompressionConfig::default();
        let text = "some json like text ".repeat(20);
        let response = Response::text(text.clone()).with_content_type("application/json");
        let mut ctx = context(&compression);
        ctx.accept_gzip = true;
        let (head, body) = write(&response, &ctx);

        assert!(head.contains("\r\ncontent-encoding: gzip\r\n"), "{head}");
        assert!(head.contains(&format!("\r\ncontent-length: {}\r\n", body.len())), "{head}");
        assert!(!head.contains("transfer-encoding"), "{head}");
        assert_eq!(gunzip(&body), text.as_bytes());
    }

    #[test]
    fn gzip_not_applied_test() {
        let compression = CompressionConfig::default();
        let mut ctx = context(&compression);
        ctx.accept_gzip = true;

        // below min size
        let (head, _) = write(&Response::text("tiny"), &ctx);
        assert!(!head.contains("content-encoding"), "{head}");

        // exactly min size
        let (head, body) = write(&Response::text("0123456789abcdef"), &ctx);
        assert!(!head.contains("content-encoding"), "{head}");
        assert_eq!(body, b"0123456789abcdef");

        let (head, body) = write(&Response::text("0123456789abcdefg"), &ctx);
        assert!(head.contains("\r\ncontent-encoding: gzip\r\n"), "{head}");
        assert_eq!(gunzip(&body), b"0123456789abcdefg");

        // not compressible
        let response = Response::bytes(vec![7u8; 100]).with_content_type("image/png");
        let (head, body) = write(&response, &ctx);
        assert!(!head.contains("content-encoding"), "{head}");
        assert_eq!(body, vec![7u8; 100]);

        // encoded by the application
        let response = Response::text("x".repeat(100))
            .with_header(HeaderField::CONTENT_ENCODING, "identity");
        let (head, _) = write(&response, &ctx);
        assert!(head.contains("\r\ncontent-encoding: identity\r\n"), "{head}");
        assert!(!head.contains("gzip"), "{head}");

        // disabled
        let disabled = CompressionConfig {
            enabled: false,
            ..CompressionConfig::default()
        };
        let mut ctx = context(&disabled);
        ctx.accept_gzip = true;
        let (head, _) = write(&Response::text("y".repeat(100)), &ctx);
        assert!(!head.contains("content-encoding"), "{head}");
    }

    #[test]
    fn head_test() {
        let compression = CompressionConfig::default();
        let mut ctx = context(&compression);
        ctx.head_only = true;

        let (head, body) = write(&Response::text("hello"), &ctx);
        assert!(head.contains("\r\ncontent-length: 5\r\n"), "{head}");
        assert!(body.is_empty());

        let (head, body) = write(&Response::stream(Cursor::new(vec![1, 2, 3]), None), &ctx);
        assert!(!head.contains("transfer-encoding"), "{head}");
        assert!(body.is_empty());
    }

    #[test]
    fn bodyless_status_test() {
        let compression = CompressionConfig::default();
        let (head, body) = write(&Response::text("ignored").with_status(204), &context(&compression));
        assert!(head.starts_with("HTTP/1.1 204 No Content\r\n"), "{head}");
        assert!(!head.contains("content-length"), "{head}");
        assert!(body.is_empty());

        let (head, _) = write(&Response::empty(304), &context(&compression));
        assert!(!head.contains("content-length"), "{head}");
    }

    #[test]
    fn connection_close_test() {
        let compression = CompressionConfig::default();
        let mut ctx = context(&compression);
        ctx.keep_alive = false;
        let (head, _) = write(&Response::text("hi"), &ctx);
        assert!(head.contains("\r\nconnection: close\r\n"), "{head}");

        // a connection header of the response is kept as is
        let response = Response::text("hi").with_header(HeaderField::CONNECTION, "Close");
        let (head, _) = write(&response, &ctx);
        assert!(head.contains("\r\nconnection: Close\r\n"), "{head}");
        assert_eq!(head.matches("connection:").count(), 1, "{head}");

        let response = Response::text("hi").with_header(HeaderField::CONNECTION, "upgrade");
        let (head, _) = write(&response, &ctx);
        assert!(head.contains("\r\nconnection: upgrade\r\n"), "{head}");
        assert!(!head.contains("connection: close"), "{head}");
    }

    #[test]
    fn status_line_test() {
        let compression = CompressionConfig::default();
        let (head, _) = write(&Response::empty(599), &context(&compression));
        assert!(head.starts_with("HTTP/1.1 599 \r\n"), "{head}");

        let response = Response::empty(200).with_header(HeaderField::DATE, "yesterday");
        let (head, _) = write(&response, &context(&compression));
        assert_eq!(head.matches("date:").count(), 1, "{head}");
        assert!(head.contains("\r\ndate: yesterday\r\n"), "{head}");
        assert!(head.contains("\r\ncontent-length: 0\r\n"), "{head}");
    }

    #[test]
    fn file_body_test() {
        let compression = CompressionConfig::default();
        let path = std::env::temp_dir().join(format!("tiny-httpd-writer-{}", std::process::id()));
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"file content")
            .unwrap();
        let response = Response::file(&path);
        let (head, body) = write(&response, &context(&compression));
        std::fs::remove_file(&path).unwrap();

        assert!(head.contains("\r\ncontent-length: 12\r\n"), "{head}");
        assert_eq!(body, b"file content");
    }

    #[test]
    fn accepts_gzip_test() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_gzip(&headers));
        headers.insert(HeaderField::ACCEPT_ENCODING, "deflate, gzip;q=0.5");
        assert!(accepts_gzip(&headers));
        headers.insert(HeaderField::ACCEPT_ENCODING, "gzip;q=0, br");
        assert!(!accepts_gzip(&headers));
        headers.insert(HeaderField::ACCEPT_ENCODING, "identity");
        headers.add(HeaderField::ACCEPT_ENCODING, "GZIP");
        assert!(accepts_gzip(&headers));
    }
}
