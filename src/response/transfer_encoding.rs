use std::io::{self, Write};

/// How the body of a message is framed on the wire
#[derive(Debug, Clone, Eq, PartialEq)]
pub(super) enum TransferEncoding {
    /// No body at all
    Empty,
    /// Exactly the given number of bytes after `Content-Length`
    Identity(u64),
    /// Chunks of unknown total size
    Chunked,
    /// Body compressed in memory, sent with `Content-Length`
    GzipBuffered(Vec<u8>),
    /// Body compressed while streaming, sent chunked
    GzipChunked,
}

impl TransferEncoding {
    /// Value of `Content-Length` if the size is known
    pub(super) fn content_length(&self) -> Option<u64> {
        match self {
            TransferEncoding::Empty => Some(0),
            TransferEncoding::Identity(length) => Some(*length),
            TransferEncoding::GzipBuffered(data) => Some(data.len() as u64),
            TransferEncoding::Chunked | TransferEncoding::GzipChunked => None,
        }
    }

    pub(super) fn is_gzip(&self) -> bool {
        matches!(
            self,
            TransferEncoding::GzipBuffered(_) | TransferEncoding::GzipChunked
        )
    }
}

/// Writer passed to the chunk encoder
///
/// `chunked_transfer::Encoder` writes the final zero size chunk in its
/// destructor. After a failure the sink is poisoned, so a broken body is never
/// terminated like a complete one.
pub(super) struct ChunkSink<'a, W>
where
    W: Write,
{
    inner: &'a mut W,
    poisoned: &'a std::cell::Cell<bool>,
}

impl<'a, W> ChunkSink<'a, W>
where
    W: Write,
{
    pub(super) fn new(inner: &'a mut W, poisoned: &'a std::cell::Cell<bool>) -> Self {
        Self { inner, poisoned }
    }
}

impl<W> Write for ChunkSink<'_, W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.poisoned.get() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "chunked body aborted",
            ));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.poisoned.get() {
            return Ok(());
        }
        self.inner.flush()
    }
}
