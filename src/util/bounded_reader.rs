use std::io::{self, Read};

use super::ByteReader;

/// A `Reader` that reads exactly the number of bytes from a [`ByteReader`].
///
/// If the limit is reached, it returns EOF. Bytes not read until [`BoundedReader::finish`]
/// or the destructor are skipped, so the connection stays positioned at the
/// start of the next request.
pub(crate) struct BoundedReader<'a, R>
where
    R: Read,
{
    reader: &'a mut ByteReader<R>,
    remaining: u64,
}

impl<'a, R> BoundedReader<'a, R>
where
    R: Read,
{
    pub(crate) fn new(reader: &'a mut ByteReader<R>, size: u64) -> Self {
        Self {
            reader,
            remaining: size,
        }
    }

    /// Number of bytes not read yet
    #[inline]
    pub(crate) fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Skips the unread rest
    ///
    /// # Errors
    ///
    /// `io::ErrorKind::UnexpectedEof` if the connection ends before
    pub(crate) fn finish(&mut self) -> io::Result<()> {
        let remaining = std::mem::take(&mut self.remaining);
        self.reader.force_skip(remaining)
    }
}

impl<R> Read for BoundedReader<'_, R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        #[allow(clippy::cast_possible_truncation)]
        let len = if (buf.len() as u64) < self.remaining {
            buf.len()
        } else {
            self.remaining as usize
        };

        let n = self.reader.read(&mut buf[..len])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("body ended with {} bytes missing", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl<R> Drop for BoundedReader<'_, R>
where
    R: Read,
{
    fn drop(&mut self) {
        if self.remaining > 0 {
            let _ = self.finish();
        }
    }
}

impl<R> std::fmt::Debug for BoundedReader<'_, R>
where
    R: Read,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedReader")
            .field("remaining", &self.remaining)
            .finish()
    }
}
