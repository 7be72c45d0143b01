//! Multimap from [`HeaderField`] to one or many values

use std::io::{self, Write};

use ascii::AsciiStr;

use super::{value_byte_range_check, HeaderField};

/// Slot marker of the probe table for a free slot
const EMPTY: u32 = u32::MAX;

/// Table sizes with their fill thresholds, the larger ones are primes
/// with a load factor of 0.75
const CAPACITIES: &[(usize, usize)] = &[
    (13, 10),
    (29, 24),
    (67, 54),
    (127, 95),
    (269, 201),
    (541, 405),
    (1091, 818),
    (2287, 1715),
    (4583, 3437),
    (9199, 6899),
];

/// Value(s) of one header field
///
/// Most fields carry exactly one value, so the list is only allocated when a
/// second value is added.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Values {
    Single(String),
    Multi(Vec<String>),
}

impl Values {
    fn as_slice(&self) -> &[String] {
        match self {
            Values::Single(value) => std::slice::from_ref(value),
            Values::Multi(values) => values,
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Values::Single(first) => {
                let first = std::mem::take(first);
                *self = Values::Multi(vec![first, value]);
            }
            Values::Multi(values) => values.push(value),
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    field: HeaderField,
    values: Values,
}

/// Open-addressing hash map from [`HeaderField`] to its value(s)
///
/// Fields keep the order of their first insertion, which is also the order
/// of [`HeaderMap::iter`] and of the serialized form.
///
/// ```
/// # use tiny_httpd::{HeaderField, HeaderMap};
/// let mut headers = HeaderMap::new();
/// headers.add(HeaderField::new("X-Tag").unwrap(), "a");
/// headers.add(HeaderField::new("x-tag").unwrap(), "b");
/// assert_eq!(headers.first(&HeaderField::new("X-TAG").unwrap()), Some("a"));
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct HeaderMap {
    entries: Vec<Entry>,
    // linear probing table with indices into `entries`
    slots: Box<[u32]>,
    threshold: usize,
}

impl HeaderMap {
    /// Creates an empty map, nothing is allocated before the first insert
    #[must_use]
    pub fn new() -> HeaderMap {
        HeaderMap::default()
    }

    /// Number of distinct fields
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if there is no field
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` if `field` has at least one value
    #[must_use]
    pub fn contains(&self, field: &HeaderField) -> bool {
        self.find(field).is_some()
    }

    /// First value of `field`
    #[must_use]
    pub fn first(&self, field: &HeaderField) -> Option<&str> {
        self.get(field)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values of `field` in insertion order
    #[must_use]
    pub fn get(&self, field: &HeaderField) -> Option<&[String]> {
        self.find(field)
            .map(|idx| self.entries[idx].values.as_slice())
    }

    /// Appends `value` to the values of `field`
    pub fn add<V: Into<String>>(&mut self, field: HeaderField, value: V) {
        match self.find(&field) {
            Some(idx) => self.entries[idx].values.push(value.into()),
            None => self.push_entry(field, Values::Single(value.into())),
        }
    }

    /// Replaces all values of `field` by `value`
    pub fn insert<V: Into<String>>(&mut self, field: HeaderField, value: V) {
        match self.find(&field) {
            Some(idx) => self.entries[idx].values = Values::Single(value.into()),
            None => self.push_entry(field, Values::Single(value.into())),
        }
    }

    /// Replaces all values of `field` by `values`, an empty list removes the field
    pub fn insert_all<I, V>(&mut self, field: HeaderField, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
        let values = match values.len() {
            0 => {
                let _ = self.remove(&field);
                return;
            }
            1 => Values::Single(values.remove(0)),
            _ => Values::Multi(values),
        };

        match self.find(&field) {
            Some(idx) => self.entries[idx].values = values,
            None => self.push_entry(field, values),
        }
    }

    /// Removes `field` and returns its values
    pub fn remove(&mut self, field: &HeaderField) -> Option<Vec<String>> {
        let idx = self.find(field)?;
        let entry = self.entries.remove(idx);
        self.rebuild_slots(self.slots.len());

        Some(match entry.values {
            Values::Single(value) => vec![value],
            Values::Multi(values) => values,
        })
    }

    /// Iterates over all `(field, value)` pairs, fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderField, &str)> {
        self.entries.iter().flat_map(|entry| {
            entry
                .values
                .as_slice()
                .iter()
                .map(move |value| (&entry.field, value.as_str()))
        })
    }

    /// Iterates over the distinct fields in insertion order
    pub fn fields(&self) -> impl Iterator<Item = &HeaderField> {
        self.entries.iter().map(|entry| &entry.field)
    }

    /// Writes every value as `field: value\r\n` line
    ///
    /// # Errors
    ///
    /// - `io::ErrorKind::InvalidData` if a value is not ASCII or contains control characters
    /// - any error of `writer`
    ///
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (field, value) in self.iter() {
            let value = AsciiStr::from_ascii(value)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            value_byte_range_check(value.as_bytes())
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

            writer.write_all(field.as_bytes())?;
            writer.write_all(b": ")?;
            writer.write_all(value.as_bytes())?;
            writer.write_all(b"\r\n")?;
        }
        Ok(())
    }

    fn find(&self, field: &HeaderField) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        match self.probe(field) {
            Ok(slot) => Some(self.slots[slot] as usize),
            Err(_) => None,
        }
    }

    /// Linear probing, `Ok` is the slot holding `field`, `Err` the free slot for it
    fn probe(&self, field: &HeaderField) -> Result<usize, usize> {
        let cap = self.slots.len();
        let mut slot = field.hash_code() as usize % cap;
        loop {
            match self.slots[slot] {
                EMPTY => return Err(slot),
                idx if self.entries[idx as usize].field == *field => return Ok(slot),
                _ => {
                    slot += 1;
                    if slot == cap {
                        slot = 0;
                    }
                }
            }
        }
    }

    fn push_entry(&mut self, field: HeaderField, values: Values) {
        if self.entries.len() >= self.threshold {
            self.grow();
        }

        let slot = match self.probe(&field) {
            Ok(slot) | Err(slot) => slot,
        };
        #[allow(clippy::cast_possible_truncation)]
        {
            self.slots[slot] = self.entries.len() as u32;
        }
        self.entries.push(Entry { field, values });
    }

    fn grow(&mut self) {
        let size = self.entries.len();
        let (capacity, threshold) = CAPACITIES
            .iter()
            .copied()
            .find(|&(_, threshold)| size < threshold)
            .unwrap_or_else(|| {
                let capacity = size * 2 + 1;
                (capacity, capacity / 4 * 3)
            });

        self.threshold = threshold;
        self.rebuild_slots(capacity);
    }

    fn rebuild_slots(&mut self, capacity: usize) {
        self.slots = vec![EMPTY; capacity].into_boxed_slice();
        for idx in 0..self.entries.len() {
            if let Err(slot) = self.probe(&self.entries[idx].field) {
                #[allow(clippy::cast_possible_truncation)]
                {
                    self.slots[slot] = idx as u32;
                }
            }
        }
    }
}

impl PartialEq for HeaderMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|entry| other.get(&entry.field) == Some(entry.values.as_slice()))
    }
}

impl Eq for HeaderMap {}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = (&'a HeaderField, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a HeaderField, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl std::fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (n, entry) in self.entries.iter().enumerate() {
            if n > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}=", entry.field)?;
            match &entry.values {
                Values::Single(value) => write!(f, "{value}")?,
                Values::Multi(values) => write!(f, "{values:?}")?,
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::HeaderMap;
    use crate::HeaderField;

    fn field(name: &str) -> HeaderField {
        HeaderField::new(name).unwrap()
    }

    #[test]
    fn add_and_first_test() {
        let mut headers = HeaderMap::new();
        assert!(headers.is_empty());
        assert_eq!(headers.first(&HeaderField::HOST), None);

        headers.add(field("Host"), "localhost");
        headers.add(field("Accept"), "text/html");
        headers.add(field("ACCEPT"), "application/json");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.first(&HeaderField::HOST), Some("localhost"));
        assert_eq!(headers.first(&field("accept")), Some("text/html"));
        assert_eq!(
            headers.get(&field("accept")).unwrap(),
            &["text/html".to_string(), "application/json".to_string()]
        );
    }

    #[test]
    fn insert_replaces_test() {
        let mut headers = HeaderMap::new();
        headers.add(field("x-a"), "1");
        headers.add(field("x-a"), "2");
        headers.insert(field("X-A"), "3");
        assert_eq!(headers.get(&field("x-a")).unwrap(), &["3".to_string()]);

        headers.insert_all(field("x-a"), ["4", "5"]);
        assert_eq!(headers.get(&field("x-a")).unwrap().len(), 2);

        headers.insert_all(field("x-a"), Vec::<String>::new());
        assert!(!headers.contains(&field("x-a")));
    }

    #[test]
    fn remove_keeps_order_test() {
        let mut headers = HeaderMap::new();
        for n in 0..40 {
            headers.add(field(&format!("x-header-{n}")), n.to_string());
        }
        assert_eq!(headers.len(), 40);

        assert_eq!(
            headers.remove(&field("X-Header-7")),
            Some(vec!["7".to_string()])
        );
        assert_eq!(headers.remove(&field("x-header-7")), None);
        assert_eq!(headers.len(), 39);

        for n in (0..40).filter(|n| *n != 7) {
            let name = format!("x-header-{n}");
            assert_eq!(headers.first(&field(&name)), Some(n.to_string().as_str()));
        }

        let order: Vec<&str> = headers.fields().map(HeaderField::as_str).take(9).collect();
        assert_eq!(
            order,
            [
                "x-header-0",
                "x-header-1",
                "x-header-2",
                "x-header-3",
                "x-header-4",
                "x-header-5",
                "x-header-6",
                "x-header-8",
                "x-header-9"
            ]
        );
    }

    #[test]
    fn grow_beyond_table_test() {
        let mut headers = HeaderMap::new();
        for n in 0..10_000 {
            headers.insert(field(&format!("h{n}")), "v");
        }
        assert_eq!(headers.len(), 10_000);
        assert!(headers.contains(&field("h9999")));
        assert!(headers.contains(&field("h0")));
    }

    #[test]
    fn write_to_test() {
        let mut headers = HeaderMap::new();
        headers.add(HeaderField::CONTENT_TYPE, "text/plain");
        headers.add(field("Set-Cookie"), "a=1");
        headers.add(field("set-cookie"), "b=2");

        let mut out = Vec::new();
        headers.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "content-type: text/plain\r\nset-cookie: a=1\r\nset-cookie: b=2\r\n"
        );
    }

    #[test]
    fn write_to_rejects_injection_test() {
        let mut headers = HeaderMap::new();
        headers.add(field("x-evil"), "a\r\nset-cookie: b");
        let err = headers.write_to(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

        let mut headers = HeaderMap::new();
        headers.add(field("x-name"), "grüße");
        assert!(headers.write_to(&mut Vec::new()).is_err());
    }

    #[test]
    fn clone_is_independent_test() {
        let mut proto = HeaderMap::new();
        proto.add(HeaderField::CONTENT_TYPE, "text/plain");
        let mut copy = proto.clone();
        copy.add(field("x-extra"), "1");
        assert_eq!(proto.len(), 1);
        assert_eq!(copy.len(), 2);
        assert_ne!(proto, copy);
    }
}
