pub use header::{HeaderError, HeaderField, HEADER_FIELD_MAX_LEN};
pub(crate) use header::{is_token_byte, value_byte_range_check};
pub use header_map::HeaderMap;
pub use method::Method;
pub use status_code::{Status, StatusCode};

mod header;
mod header_map;
pub mod limits;
mod method;
mod status_code;
