//! Limits used in `Session` and [`Request`] handling
//!
//! [`Request`]: crate::Request
//!

/// Default value for the size of the per connection line buffer
pub const LINE_BUFFER_SIZE_DEFAULT: usize = 8192;
/// Smallest accepted size of the line buffer
pub const LINE_BUFFER_SIZE_MIN: usize = 80;
/// Default value for the size of the whole request head
pub const HEADER_LIMIT_DEFAULT: usize = 8192;
/// Default value for the size of the per connection output buffer
pub const OUTPUT_BUFFER_SIZE_DEFAULT: usize = 1024;
/// Default value for the size of the buffer used to copy response bodies
pub const TRANSFER_BUFFER_SIZE_DEFAULT: usize = 8192;

/// Default smallest body size in bytes which gets compressed
pub const COMPRESSION_MIN_SIZE_DEFAULT: u64 = 16;
/// Default limit in bytes below which a body of known size is compressed in memory
pub const COMPRESSION_IN_MEMORY_LIMIT_DEFAULT: u64 = 8192;

/// [`LimitsConfig`] for buffer sizes
///
/// # Defaults
///
/// `line_buffer_size`: 8192
/// `header_limit`: 8192
/// `output_buffer_size`: 1024
/// `transfer_buffer_size`: 8192
///
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LimitsConfig {
    /// Capacity of the buffer the request head is parsed from.
    /// A request line or header line must fit in it, otherwise the request
    /// is answered with _431 Request Header Fields Too Large_.
    pub line_buffer_size: usize,
    /// Limit for the request line and all header lines together,
    /// a larger head is answered with _431 Request Header Fields Too Large_
    pub header_limit: usize,
    /// Capacity of the buffered writer of a connection
    pub output_buffer_size: usize,
    /// Size of the buffer used to copy stream and file bodies
    pub transfer_buffer_size: usize,
}

impl LimitsConfig {
    /// `line_buffer_size` raised to the minimum of [`LINE_BUFFER_SIZE_MIN`]
    #[must_use]
    #[inline]
    pub(crate) fn effective_line_buffer_size(&self) -> usize {
        self.line_buffer_size.max(LINE_BUFFER_SIZE_MIN)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            line_buffer_size: LINE_BUFFER_SIZE_DEFAULT,
            header_limit: HEADER_LIMIT_DEFAULT,
            output_buffer_size: OUTPUT_BUFFER_SIZE_DEFAULT,
            transfer_buffer_size: TRANSFER_BUFFER_SIZE_DEFAULT,
        }
    }
}

/// [`CompressionConfig`] for gzip `Content-Encoding` of responses
///
/// # Defaults
///
/// `enabled`: true
/// `min_size`: 16
/// `in_memory_limit`: 8192
///
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CompressionConfig {
    /// Compress eligible responses for clients accepting gzip
    pub enabled: bool,
    /// Bodies of known size up to this are sent uncompressed
    pub min_size: u64,
    /// Bodies of known size below this are compressed in memory and sent
    /// with `Content-Length`, larger ones are streamed chunked
    pub in_memory_limit: u64,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: COMPRESSION_MIN_SIZE_DEFAULT,
            in_memory_limit: COMPRESSION_IN_MEMORY_LIMIT_DEFAULT,
        }
    }
}
