use std::{
    sync::{PoisonError, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use httpdate::HttpDate;
use lazy_static::lazy_static;

/// Fixed length date and time in bytes e.g. Mon, 29 Jan 2024 22:13:01 GMT
const DATE_TIME_LEN: usize = 29;

lazy_static! {
    /// Second of the cached value and the formatted date
    static ref DATE_TIME: RwLock<(u64, String)> = RwLock::new((0, String::new()));
}

/// Current time as IMF-fixdate for the `Date` header
///
/// The formatted value is cached and recomputed at most once per second.
pub(super) fn current() -> String {
    let now = SystemTime::now();
    let second = now
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());

    {
        let cached = DATE_TIME.read().unwrap_or_else(PoisonError::into_inner);
        if cached.0 == second && !cached.1.is_empty() {
            return cached.1.clone();
        }
    }

    let formatted = HttpDate::from(now).to_string();
    debug_assert_eq!(formatted.len(), DATE_TIME_LEN);

    let mut cached = DATE_TIME.write().unwrap_or_else(PoisonError::into_inner);
    if cached.0 < second {
        *cached = (second, formatted.clone());
    }
    formatted
}
