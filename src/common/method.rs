use std::{fmt, str::FromStr};

use lazy_static::lazy_static;

/// HTTP request methods
///
/// As per [RFC 9110](https://www.rfc-editor.org/rfc/rfc9110#section-9),
/// [RFC 5789](https://tools.ietf.org/html/rfc5789) and the WebDAV / GENA extensions.
/// Any other verb is rejected by the request parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `PUT`
    Put,
    /// `POST`
    Post,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `TRACE`
    Trace,
    /// `CONNECT`
    Connect,
    /// `PATCH`
    Patch,
    /// `PROPFIND`
    Propfind,
    /// `PROPPATCH`
    Proppatch,
    /// `MKCOL`
    Mkcol,
    /// `MOVE`
    Move,
    /// `COPY`
    Copy,
    /// `LOCK`
    Lock,
    /// `UNLOCK`
    Unlock,
    /// `NOTIFY`
    Notify,
    /// `SUBSCRIBE`
    Subscribe,
}

const ALL_METHODS: [Method; 18] = [
    Method::Get,
    Method::Put,
    Method::Post,
    Method::Delete,
    Method::Head,
    Method::Options,
    Method::Trace,
    Method::Connect,
    Method::Patch,
    Method::Propfind,
    Method::Proppatch,
    Method::Mkcol,
    Method::Move,
    Method::Copy,
    Method::Lock,
    Method::Unlock,
    Method::Notify,
    Method::Subscribe,
];

/// Longest method name
const METHOD_MAX_LEN: usize = 9;

lazy_static! {
    /// Methods grouped by the length of their name
    static ref METHOD_LOOKUP: [Vec<Method>; METHOD_MAX_LEN + 1] = {
        let mut table: [Vec<Method>; METHOD_MAX_LEN + 1] = Default::default();
        for method in ALL_METHODS {
            table[method.as_str().len()].push(method);
        }
        table
    };
}

impl Method {
    /// enum [Method] names as `&str`
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Patch => "PATCH",
            Method::Propfind => "PROPFIND",
            Method::Proppatch => "PROPPATCH",
            Method::Mkcol => "MKCOL",
            Method::Move => "MOVE",
            Method::Copy => "COPY",
            Method::Lock => "LOCK",
            Method::Unlock => "UNLOCK",
            Method::Notify => "NOTIFY",
            Method::Subscribe => "SUBSCRIBE",
        }
    }

    /// Looks up the method with the exact (case-sensitive) name `bytes`
    #[must_use]
    pub fn lookup(bytes: &[u8]) -> Option<Method> {
        METHOD_LOOKUP
            .get(bytes.len())?
            .iter()
            .find(|method| method.as_str().as_bytes() == bytes)
            .copied()
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Method, ()> {
        Method::lookup(s.as_bytes()).ok_or(())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(self.as_str())
    }
}
