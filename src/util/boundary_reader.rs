use std::io::{self, Read};

use super::{ByteReader, Fill};

/// Longest boundary allowed by [RFC 2046](https://www.rfc-editor.org/rfc/rfc2046#section-5.1.1)
pub(crate) const BOUNDARY_MAX_LEN: usize = 70;

/// A `Reader` over a raw `multipart/form-data` body
///
/// Yields the body bytes up to the closing delimiter `\r\n--<boundary>--`,
/// which is consumed but not returned. A body without parts starts directly
/// with `--<boundary>--`. The delimiter is searched in the buffer
/// of the [`ByteReader`]; a partial match at the end of the buffered bytes is
/// kept until enough bytes arrived to decide.
pub(crate) struct BoundaryReader<'a, R>
where
    R: Read,
{
    reader: &'a mut ByteReader<R>,
    terminator: Vec<u8>,
    /// Bytes past the start of the body were seen
    started: bool,
    done: bool,
}

impl<'a, R> BoundaryReader<'a, R>
where
    R: Read,
{
    /// `boundary` must not be longer than [`BOUNDARY_MAX_LEN`]
    pub(crate) fn new(reader: &'a mut ByteReader<R>, boundary: &str) -> Self {
        debug_assert!(boundary.len() <= BOUNDARY_MAX_LEN);
        let mut terminator = Vec::with_capacity(boundary.len() + 6);
        terminator.extend_from_slice(b"\r\n--");
        terminator.extend_from_slice(boundary.as_bytes());
        terminator.extend_from_slice(b"--");

        Self {
            reader,
            terminator,
            started: false,
            done: false,
        }
    }

    /// Skips to the end of the closing delimiter if not reached yet
    ///
    /// # Errors
    ///
    /// `io::ErrorKind::UnexpectedEof` if the connection ends before
    pub(crate) fn finish(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; 256];
        while self.read(&mut scratch)? > 0 {}
        Ok(())
    }

    /// Matches the terminator without the leading CRLF at the start of the body
    ///
    /// `Some(true)` for a full match, `Some(false)` if the buffered bytes are
    /// too few to decide.
    fn scan_empty_body(&self) -> Option<bool> {
        let bare = &self.terminator[2..];
        let buffered = self.reader.buffered();
        let len = buffered.len().min(bare.len());
        (buffered[..len] == bare[..len]).then_some(len == bare.len())
    }

    /// Searches the buffered bytes for the terminator
    ///
    /// Returns the offset of the first full or partial (cut off by the end
    /// of the buffered bytes) match and whether it is a full match.
    fn scan(&self) -> Option<(usize, bool)> {
        let buffered = self.reader.buffered();
        let first = self.terminator[0];

        let mut offset = 0;
        while let Some(found) = buffered[offset..].iter().position(|&b| b == first) {
            let start = offset + found;
            let candidate = &buffered[start..];
            let len = candidate.len().min(self.terminator.len());
            if candidate[..len] == self.terminator[..len] {
                return Some((start, len == self.terminator.len()));
            }
            offset = start + 1;
        }
        None
    }
}

impl<R> Read for BoundaryReader<'_, R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.reader.has_buffered() {
                self.need_more()?;
                continue;
            }

            if !self.started {
                match self.scan_empty_body() {
                    Some(true) => {
                        let len = self.terminator.len() - 2;
                        self.reader.advance(len);
                        self.done = true;
                        return Ok(0);
                    }
                    Some(false) => {
                        self.need_more()?;
                        continue;
                    }
                    None => self.started = true,
                }
            }

            let available = match self.scan() {
                Some((0, true)) => {
                    let len = self.terminator.len();
                    self.reader.advance(len);
                    self.done = true;
                    return Ok(0);
                }
                Some((0, false)) => {
                    self.need_more()?;
                    continue;
                }
                Some((start, _)) => start,
                None => self.reader.buffered().len(),
            };

            let n = available.min(buf.len());
            buf[..n].copy_from_slice(&self.reader.buffered()[..n]);
            self.reader.advance(n);
            return Ok(n);
        }
    }
}

impl<R> BoundaryReader<'_, R>
where
    R: Read,
{
    fn need_more(&mut self) -> io::Result<()> {
        match self.reader.fill_more()? {
            Fill::Read(_) => Ok(()),
            Fill::Eof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "multipart body ended before closing boundary",
            )),
            // a partial terminator is shorter than the buffer
            Fill::Full => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "multipart boundary does not fit in buffer",
            )),
        }
    }
}

impl<R> Drop for BoundaryReader<'_, R>
where
    R: Read,
{
    fn drop(&mut self) {
        if !self.done {
            let _ = self.finish();
        }
    }
}

impl<R> std::fmt::Debug for BoundaryReader<'_, R>
where
    R: Read,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryReader")
            .field("terminator", &String::from_utf8_lossy(&self.terminator))
            .field("started", &self.started)
            .field("done", &self.done)
            .finish()
    }
}
