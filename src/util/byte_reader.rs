use std::io::{self, BufRead, Read};

use crate::common::limits::{LINE_BUFFER_SIZE_DEFAULT, LINE_BUFFER_SIZE_MIN};

/// Outcome of [`ByteReader::fill_more`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Fill {
    /// `n` more bytes are buffered
    Read(usize),
    /// The source reported end of stream
    Eof,
    /// The buffer holds `capacity` unconsumed bytes and can not take more
    Full,
}

/// Failure of [`ByteReader::read_line`]
#[derive(Debug)]
pub(crate) enum LineError {
    /// No line terminator within the buffer capacity
    TooLong,
    /// End of stream, `partial` is `true` if bytes of an unterminated line were buffered
    Eof { partial: bool },
    Io(io::Error),
}

impl From<io::Error> for LineError {
    fn from(err: io::Error) -> Self {
        LineError::Io(err)
    }
}

/// Buffered reader over a connection
///
/// The buffer is allocated once with a fixed capacity and reused for the whole
/// connection. Lines are handed out as slices of the buffer. When a line spans
/// the end of the buffer, the unconsumed bytes are shifted to the front before
/// more is read.
pub(crate) struct ByteReader<R> {
    source: R,
    buf: Box<[u8]>,
    pos: usize,
    limit: usize,
    closed: bool,
}

impl<R> ByteReader<R>
where
    R: Read,
{
    /// Reader with a buffer of [`LINE_BUFFER_SIZE_DEFAULT`] bytes
    #[allow(dead_code)]
    pub(crate) fn new(source: R) -> Self {
        Self::with_capacity(LINE_BUFFER_SIZE_DEFAULT, source)
    }

    /// Reader with a buffer of `capacity` bytes, at least [`LINE_BUFFER_SIZE_MIN`]
    pub(crate) fn with_capacity(capacity: usize, source: R) -> Self {
        Self {
            source,
            buf: vec![0; capacity.max(LINE_BUFFER_SIZE_MIN)].into_boxed_slice(),
            pos: 0,
            limit: 0,
            closed: false,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Unconsumed buffered bytes
    #[inline]
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.buf[self.pos..self.limit]
    }

    #[inline]
    pub(crate) fn has_buffered(&self) -> bool {
        self.pos < self.limit
    }

    /// Marks `n` buffered bytes as consumed
    #[inline]
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.limit);
        self.pos = (self.pos + n).min(self.limit);
    }

    /// Reads more bytes from the source behind the buffered ones
    ///
    /// The unconsumed bytes are moved to the front of the buffer if there is
    /// no space left behind them.
    pub(crate) fn fill_more(&mut self) -> io::Result<Fill> {
        if self.closed {
            return Ok(Fill::Eof);
        }

        if self.pos == self.limit {
            self.pos = 0;
            self.limit = 0;
        } else if self.limit == self.buf.len() {
            if self.pos == 0 {
                return Ok(Fill::Full);
            }
            self.buf.copy_within(self.pos..self.limit, 0);
            self.limit -= self.pos;
            self.pos = 0;
        }

        loop {
            match self.source.read(&mut self.buf[self.limit..]) {
                Ok(0) => return Ok(Fill::Eof),
                Ok(n) => {
                    self.limit += n;
                    return Ok(Fill::Read(n));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Reads one line terminated by `\n` or `\r\n` and hands it without
    /// terminator to `parse`
    ///
    /// The line is only consumed after `parse` returns.
    pub(crate) fn read_line<T, F>(&mut self, parse: F) -> Result<T, LineError>
    where
        F: FnOnce(&[u8]) -> T,
    {
        let mut scanned = 0;
        loop {
            if let Some(offset) = self.buf[self.pos + scanned..self.limit]
                .iter()
                .position(|&b| b == b'\n')
            {
                let line_feed = self.pos + scanned + offset;
                let mut end = line_feed;
                if end > self.pos && self.buf[end - 1] == b'\r' {
                    end -= 1;
                }

                let value = parse(&self.buf[self.pos..end]);
                self.pos = line_feed + 1;
                return Ok(value);
            }

            scanned = self.limit - self.pos;
            match self.fill_more()? {
                Fill::Read(_) => {}
                Fill::Eof => {
                    return Err(LineError::Eof {
                        partial: self.has_buffered(),
                    })
                }
                Fill::Full => return Err(LineError::TooLong),
            }
        }
    }

    /// Next byte or `None` at end of stream
    #[allow(dead_code)]
    pub(crate) fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if !self.has_buffered() && self.fill_more()? == Fill::Eof {
            return Ok(None);
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }

    /// Skips exactly `n` bytes, blocking until they arrived
    ///
    /// # Errors
    ///
    /// `io::ErrorKind::UnexpectedEof` if the stream ends before
    pub(crate) fn force_skip(&mut self, mut n: u64) -> io::Result<()> {
        while n > 0 {
            if !self.has_buffered() && self.fill_more()? == Fill::Eof {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended with {n} bytes left to skip"),
                ));
            }
            let available = self.limit - self.pos;
            #[allow(clippy::cast_possible_truncation)]
            let skip = if n < available as u64 {
                n as usize
            } else {
                available
            };
            self.pos += skip;
            n -= skip as u64;
        }
        Ok(())
    }

    /// Discards buffered bytes, later reads report end of stream
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.pos = 0;
        self.limit = 0;
    }

    #[allow(dead_code)]
    pub(crate) fn get_ref(&self) -> &R {
        &self.source
    }
}

impl<R> Read for ByteReader<R>
where
    R: Read,
{
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        if !self.has_buffered() {
            if self.closed {
                return Ok(0);
            }
            // nothing to gain from copying through the buffer
            if out.len() >= self.buf.len() {
                self.pos = 0;
                self.limit = 0;
                return self.source.read(out);
            }
            if self.fill_more()? == Fill::Eof {
                return Ok(0);
            }
        }

        let n = out.len().min(self.limit - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl<R> BufRead for ByteReader<R>
where
    R: Read,
{
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if !self.has_buffered() {
            let _ = self.fill_more()?;
        }
        Ok(self.buffered())
    }

    fn consume(&mut self, amt: usize) {
        self.advance(amt);
    }
}

impl<R> std::fmt::Debug for ByteReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteReader")
            .field("capacity", &self.buf.len())
            .field("pos", &self.pos)
            .field("limit", &self.limit)
            .field("closed", &self.closed)
            .finish()
    }
}
