//! Parsing helpers for site-local sizes, numbers and timestamps.
//!
//! Tracker pages render quantities for humans: `1.5 GiB`, `1,234`,
//! `2024-01-02 12:00:00` in the site's own timezone, or `3天前`. These
//! helpers turn them into canonical byte counts, `f64` values and Unix epochs.

mod number;
mod size;
mod time;

pub use number::{format_number, parse_number};
pub use size::{format_size, parse_size};
pub use time::{now_unix, parse_time, parse_time_at, parse_timezone};

use regex::Regex;

/// Compiles a regex that is known to be valid at compile time.
///
/// # Panics
///
/// Panics if `pattern` is not a valid regex; only used with literal patterns.
#[must_use]
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}
