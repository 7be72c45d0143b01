use std::borrow::Cow;

use crate::ResponseError;

/// Numeric status code of a response
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StatusCode(pub u16);

impl StatusCode {
    /// Returns the registered reason phrase for this status code.
    /// For example the status code 404 corresponds to "Not Found".
    ///
    /// Codes without registration have no reason phrase.
    #[must_use]
    pub fn reason_phrase(self) -> Option<&'static str> {
        match self.0 {
            100 => Some("Continue"),
            101 => Some("Switching Protocols"),
            102 => Some("Processing"),
            103 => Some("Early Hints"),

            200 => Some("OK"),
            201 => Some("Created"),
            202 => Some("Accepted"),
            203 => Some("Non-Authoritative Information"),
            204 => Some("No Content"),
            205 => Some("Reset Content"),
            206 => Some("Partial Content"),
            207 => Some("Multi-Status"),
            208 => Some("Already Reported"),
            226 => Some("IM Used"),

            300 => Some("Multiple Choices"),
            301 => Some("Moved Permanently"),
            302 => Some("Found"),
            303 => Some("See Other"),
            304 => Some("Not Modified"),
            305 => Some("Use Proxy"),
            307 => Some("Temporary Redirect"),
            308 => Some("Permanent Redirect"),

            400 => Some("Bad Request"),
            401 => Some("Unauthorized"),
            402 => Some("Payment Required"),
            403 => Some("Forbidden"),
            404 => Some("Not Found"),
            405 => Some("Method Not Allowed"),
            406 => Some("Not Acceptable"),
            407 => Some("Proxy Authentication Required"),
            408 => Some("Request Timeout"),
            409 => Some("Conflict"),
            410 => Some("Gone"),
            411 => Some("Length Required"),
            412 => Some("Precondition Failed"),
            413 => Some("Content Too Large"),
            414 => Some("URI Too Long"),
            415 => Some("Unsupported Media Type"),
            416 => Some("Range Not Satisfiable"),
            417 => Some("Expectation Failed"),
            421 => Some("Misdirected Request"),
            422 => Some("Unprocessable Content"),
            423 => Some("Locked"),
            424 => Some("Failed Dependency"),
            425 => Some("Too Early"),
            426 => Some("Upgrade Required"),
            428 => Some("Precondition Required"),
            429 => Some("Too Many Requests"),
            431 => Some("Request Header Fields Too Large"),
            451 => Some("Unavailable For Legal Reasons"),

            500 => Some("Internal Server Error"),
            501 => Some("Not Implemented"),
            502 => Some("Bad Gateway"),
            503 => Some("Service Unavailable"),
            504 => Some("Gateway Timeout"),
            505 => Some("HTTP Version Not Supported"),
            506 => Some("Variant Also Negotiates"),
            507 => Some("Insufficient Storage"),
            508 => Some("Loop Detected"),
            510 => Some("Not Extended"),
            511 => Some("Network Authentication Required"),
            _ => None,
        }
    }

    /// `true` for 1xx, 204 and 304, which never carry a message body
    #[must_use]
    pub fn is_bodyless(self) -> bool {
        (100..200).contains(&self.0) || self.0 == 204 || self.0 == 304
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! status_code_from {
    ( $($ty:ty),+ ) => {
        $(
            impl From<$ty> for StatusCode {
                fn from(in_code: $ty) -> StatusCode {
                    #[allow(clippy::cast_lossless, clippy::cast_sign_loss, clippy::cast_possible_truncation, trivial_numeric_casts)]
                    StatusCode(in_code as u16)
                }
            }

            impl From<$ty> for Status {
                fn from(in_code: $ty) -> Status {
                    Status::new(in_code)
                }
            }
        )+
    };
}

status_code_from!(i8, u8, i16, u16, i32, u32);

impl AsRef<u16> for StatusCode {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl PartialEq<u16> for StatusCode {
    fn eq(&self, other: &u16) -> bool {
        &self.0 == other
    }
}

impl PartialEq<StatusCode> for u16 {
    fn eq(&self, other: &StatusCode) -> bool {
        self == &other.0
    }
}

impl PartialOrd<u16> for StatusCode {
    fn partial_cmp(&self, other: &u16) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

impl PartialOrd<StatusCode> for u16 {
    fn partial_cmp(&self, other: &StatusCode) -> Option<std::cmp::Ordering> {
        self.partial_cmp(&other.0)
    }
}

/// Status of a response: code with optional reason phrase
///
/// [`Status::new`] takes the reason phrase from the registry of common codes,
/// [`Status::with_reason`] allows any phrase.
///
/// ```
/// # use tiny_httpd::Status;
/// assert_eq!(Status::new(404).to_string(), "404 Not Found");
/// assert_eq!(Status::new(599).reason(), None);
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Status {
    code: StatusCode,
    reason: Option<Cow<'static, str>>,
}

#[allow(missing_docs)]
impl Status {
    pub const OK: Status = Status::registered(200, "OK");
    pub const NO_CONTENT: Status = Status::registered(204, "No Content");
    pub const BAD_REQUEST: Status = Status::registered(400, "Bad Request");
    pub const NOT_FOUND: Status = Status::registered(404, "Not Found");
    pub const REQUEST_HEADER_FIELDS_TOO_LARGE: Status =
        Status::registered(431, "Request Header Fields Too Large");
    pub const INTERNAL_SERVER_ERROR: Status = Status::registered(500, "Internal Server Error");
    pub const NOT_IMPLEMENTED: Status = Status::registered(501, "Not Implemented");

    const fn registered(code: u16, reason: &'static str) -> Status {
        Status {
            code: StatusCode(code),
            reason: Some(Cow::Borrowed(reason)),
        }
    }
}

impl Status {
    /// Status with the registered reason phrase of `code`
    #[must_use]
    pub fn new<C: Into<StatusCode>>(code: C) -> Status {
        let code = code.into();
        Status {
            code,
            reason: code.reason_phrase().map(Cow::Borrowed),
        }
    }

    /// Status with a custom reason phrase
    ///
    /// # Errors
    ///
    /// - [`ResponseError::InvalidReason`] if `reason` is not printable ASCII
    ///
    pub fn with_reason<C, R>(code: C, reason: R) -> Result<Status, ResponseError>
    where
        C: Into<StatusCode>,
        R: Into<Cow<'static, str>>,
    {
        let reason = reason.into();
        if !reason
            .bytes()
            .all(|b| b == b'\t' || (0x20..0x7f).contains(&b))
        {
            return Err(ResponseError::InvalidReason(reason.into_owned()));
        }

        Ok(Status {
            code: code.into(),
            reason: Some(reason),
        })
    }

    /// Numeric code
    #[must_use]
    #[inline]
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// Reason phrase, if any
    #[must_use]
    #[inline]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Status::new(code)
    }
}


impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} {reason}", self.code),
            None => write!(f, "{}", self.code),
        }
    }
}
