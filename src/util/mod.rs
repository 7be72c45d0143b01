use std::str::FromStr;

pub(crate) use boundary_reader::{BoundaryReader, BOUNDARY_MAX_LEN};
pub(crate) use bounded_reader::BoundedReader;
pub(crate) use byte_reader::{ByteReader, Fill, LineError};
pub(crate) use registration::Registration;
pub use task_pool::TaskPool;

mod boundary_reader;
mod bounded_reader;
mod byte_reader;
mod registration;
mod task_pool;

/// Parses a the value of a header.
/// Suitable for `Accept-*`, `TE`, etc.
///
/// For example with `text/plain, image/png; q=1.5` this function would
/// return `[ ("text/plain", 1.0), ("image/png", 1.5) ]`
pub(crate) fn parse_header_value(input: &str) -> Vec<(&str, f32)> {
    input
        .split(',')
        .filter_map(|elem| {
            let mut params = elem.split(';');

            let t = params.next()?;

            let mut value = 1.0_f32;

            for p in params {
                if p.trim_start().starts_with("q=") {
                    if let Ok(val) = f32::from_str(p.trim_start()[2..].trim()) {
                        value = val;
                        break;
                    }
                }
            }

            Some((t.trim(), value))
        })
        .collect()
}

/// Media type of a `Content-Type` value, lowercased and without parameters
pub(crate) fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Value of parameter `name` of a `Content-Type` like header value
///
/// Parameters are `;` separated `key=value` pairs, values may be quoted
/// strings with `\` escapes. Keys compare case-insensitive.
pub(crate) fn header_parameter(input: &str, name: &str) -> Option<String> {
    let mut rest = input.split_once(';')?.1;

    loop {
        let (key, after_key) = rest.split_once('=')?;
        let key = key.trim();
        let after_key = after_key.trim_start();

        let (value, after_value) = if let Some(quoted) = after_key.strip_prefix('"') {
            let mut value = String::new();
            let mut chars = quoted.char_indices();
            let mut end = None;
            while let Some((idx, ch)) = chars.next() {
                match ch {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        end = Some(idx + 1);
                        break;
                    }
                    _ => value.push(ch),
                }
            }
            let after = end.map_or("", |end| &quoted[end..]);
            (value, after.split_once(';').map_or("", |(_, next)| next))
        } else {
            match after_key.split_once(';') {
                Some((value, next)) => (value.trim().to_string(), next),
                None => (after_key.trim().to_string(), ""),
            }
        };

        if key.eq_ignore_ascii_case(name) {
            return Some(value);
        }
        if after_value.is_empty() {
            return None;
        }
        rest = after_value;
    }
}

/// A `Reader` which returns at most `chunk` bytes per read
#[cfg(test)]
pub(crate) struct SlowReader<'a> {
    data: &'a [u8],
    chunk: usize,
}

#[cfg(test)]
impl<'a> SlowReader<'a> {
    pub(crate) fn new(data: &'a [u8], chunk: usize) -> Self {
        Self { data, chunk }
    }
}

#[cfg(test)]
impl std::io::Read for SlowReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.chunk).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}
