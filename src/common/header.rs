use std::{
    borrow::Cow,
    convert::TryFrom,
    hash::{Hash, Hasher},
    str::FromStr,
};

use ascii::AsAsciiStrError;

/// Maximum length of a header field name in bytes
pub const HEADER_FIELD_MAX_LEN: usize = 80;

/// Canonical name of a header field (eg. `content-type`, `content-length`, etc.)
///
/// The name is always stored ASCII-lowercased, so comparison and hashing work
/// on the raw bytes and are case-insensitive by construction. The stored bytes
/// are exactly what is written on the wire.
///
/// ```
/// # use tiny_httpd::HeaderField;
/// let field = HeaderField::new("Content-Type").unwrap();
/// assert_eq!(field, HeaderField::CONTENT_TYPE);
/// assert_eq!(field.as_str(), "content-type");
/// ```
#[derive(Clone)]
pub struct HeaderField {
    name: Cow<'static, str>,
    hash: u32,
}

/// Well-known fields
#[allow(missing_docs)]
impl HeaderField {
    pub const ACCEPT_ENCODING: HeaderField = HeaderField::from_static("accept-encoding");
    pub const ALLOW: HeaderField = HeaderField::from_static("allow");
    pub const CONNECTION: HeaderField = HeaderField::from_static("connection");
    pub const CONTENT_ENCODING: HeaderField = HeaderField::from_static("content-encoding");
    pub const CONTENT_LENGTH: HeaderField = HeaderField::from_static("content-length");
    pub const CONTENT_RANGE: HeaderField = HeaderField::from_static("content-range");
    pub const CONTENT_TYPE: HeaderField = HeaderField::from_static("content-type");
    pub const DATE: HeaderField = HeaderField::from_static("date");
    pub const HOST: HeaderField = HeaderField::from_static("host");
    pub const IF_MODIFIED_SINCE: HeaderField = HeaderField::from_static("if-modified-since");
    pub const LAST_MODIFIED: HeaderField = HeaderField::from_static("last-modified");
    pub const LOCATION: HeaderField = HeaderField::from_static("location");
    pub const RANGE: HeaderField = HeaderField::from_static("range");
    pub const SERVER: HeaderField = HeaderField::from_static("server");
    pub const TRANSFER_ENCODING: HeaderField = HeaderField::from_static("transfer-encoding");
}

impl HeaderField {
    /// Creates a [`HeaderField`] from any casing of a valid field name
    ///
    /// # Errors
    ///
    /// - [`HeaderError::FieldLength`] if `name` is empty or longer than 80 bytes
    /// - [`HeaderError::FieldRange`] if `name` contains a byte which is no token character
    ///
    pub fn new(name: &str) -> Result<HeaderField, HeaderError> {
        Self::from_bytes(name.as_bytes())
    }

    /// Creates a [`HeaderField`] from raw `bytes`, see [`HeaderField::new`]
    ///
    /// # Errors
    ///
    /// - [`HeaderError`] if `bytes` are no valid field name
    ///
    pub fn from_bytes(bytes: &[u8]) -> Result<HeaderField, HeaderError> {
        if bytes.is_empty() || bytes.len() > HEADER_FIELD_MAX_LEN {
            return Err(HeaderError::FieldLength(bytes.len()));
        }
        field_byte_range_check(bytes)?;

        let name: String = bytes
            .iter()
            .map(|b| char::from(b.to_ascii_lowercase()))
            .collect();
        let hash = hash_bytes(name.as_bytes());

        Ok(HeaderField {
            name: Cow::Owned(name),
            hash,
        })
    }

    /// Creates a constant [`HeaderField`]
    ///
    /// # Panics
    ///
    /// If `name` is not lowercase, empty, too long or contains non-token bytes.
    /// In a `const` context this is a compile error.
    #[must_use]
    pub const fn from_static(name: &'static str) -> HeaderField {
        let bytes = name.as_bytes();
        assert!(
            !bytes.is_empty() && bytes.len() <= HEADER_FIELD_MAX_LEN,
            "invalid header field length"
        );
        let mut i = 0;
        while i < bytes.len() {
            assert!(
                is_token_byte(bytes[i]) && !bytes[i].is_ascii_uppercase(),
                "header field must be a lowercase token"
            );
            i += 1;
        }

        HeaderField {
            name: Cow::Borrowed(name),
            hash: hash_bytes(bytes),
        }
    }

    /// Get [`HeaderField`] as `&str`
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Get [`HeaderField`] as the bytes written on the wire
    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.name.as_bytes()
    }

    #[inline]
    pub(crate) fn hash_code(&self) -> u32 {
        self.hash
    }
}

/// Multiplicative hash over the canonical bytes
#[allow(clippy::cast_lossless)]
const fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 1;
    let mut i = 0;
    while i < bytes.len() {
        hash = hash.wrapping_mul(31).wrapping_add(bytes[i] as u32);
        i += 1;
    }
    hash
}

impl PartialEq for HeaderField {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.name.as_bytes() == other.name.as_bytes()
    }
}

impl Eq for HeaderField {}

impl Hash for HeaderField {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash);
    }
}

impl std::fmt::Debug for HeaderField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HeaderField").field(&self.as_str()).finish()
    }
}

impl std::fmt::Display for HeaderField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for HeaderField {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for HeaderField {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for HeaderField {
    type Error = HeaderError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&[u8]> for HeaderField {
    type Error = HeaderError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

/// Token characters as defined in [RFC9110](https://datatracker.ietf.org/doc/html/rfc9110#name-tokens)
#[inline]
pub(crate) const fn is_token_byte(b: u8) -> bool {
    matches!(b,
        b'a'..=b'z'
        | b'A'..=b'Z'
        | b'0'..=b'9'
        | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*'
        | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

/// Checks `bytes` for valid token characters of field names
#[inline]
fn field_byte_range_check(bytes: &[u8]) -> Result<(), HeaderError> {
    match bytes.iter().position(|&b| !is_token_byte(b)) {
        Some(pos) => Err(HeaderError::FieldRange(bytes[pos])),
        None => Ok(()),
    }
}

/// Checks `bytes` for valid field value characters
/// (`VCHAR`, `obs-text`, `SP` and `HTAB`)
#[inline]
pub(crate) fn value_byte_range_check(bytes: &[u8]) -> Result<(), HeaderError> {
    match bytes
        .iter()
        .position(|&b| !(b == b'\t' || b == b' ' || (0x21..=0x7e).contains(&b) || b >= 0x80))
    {
        Some(pos) => Err(HeaderError::ValueRange(bytes[pos])),
        None => Ok(()),
    }
}

/// Header was not accepted
#[derive(Debug)]
pub enum HeaderError {
    /// Value is not completly in ASCII range
    Ascii(AsAsciiStrError),
    /// Field name is empty or longer than [`HEADER_FIELD_MAX_LEN`]
    FieldLength(usize),
    /// Field name contains a byte which is no token character
    FieldRange(u8),
    /// Provided data is no valid header line
    Format,
    /// It is not possible to change the specific header
    NonModifiable(HeaderField),
    /// Field value contains a control character
    ValueRange(u8),
}

impl std::error::Error for HeaderError {}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderError::Ascii(err) => write!(f, "header value not ascii: {err}"),
            HeaderError::FieldLength(len) => write!(f, "header field length {len} out of range"),
            HeaderError::FieldRange(b) => write!(f, "illegal byte 0x{b:02x} in header field"),
            HeaderError::Format => f.write_str("invalid header line"),
            HeaderError::NonModifiable(field) => write!(f, "header {field} is not modifiable"),
            HeaderError::ValueRange(b) => write!(f, "illegal byte 0x{b:02x} in header value"),
        }
    }
}

impl From<AsAsciiStrError> for HeaderError {
    fn from(err: AsAsciiStrError) -> Self {
        HeaderError::Ascii(err)
    }
}
