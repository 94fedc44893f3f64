use std::sync::LazyLock;

use regex::Regex;

use super::{compile_static_regex, parse_number};

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?i)([-+]?\d[\d,.\s]*)\s*(bytes?|[kmgtpe]i?b|[kmgtpe])?\b")
});

/// Parses a human-readable size (`1.5 GB`, `700 MiB`, `1,024 KB`) into bytes.
///
/// Tracker sites use binary multiples for both `GB` and `GiB`, so every unit
/// step is 1024. A bare number is taken as bytes.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_size(input: &str) -> Option<i64> {
    let caps = SIZE_RE.captures(input.trim())?;
    let value = parse_number(caps.get(1)?.as_str())?;
    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    let exponent = match unit.chars().next() {
        None | Some('b') => 0,
        Some('k') => 1,
        Some('m') => 2,
        Some('g') => 3,
        Some('t') => 4,
        Some('p') => 5,
        Some('e') => 6,
        Some(_) => return None,
    };

    Some((value * 1024f64.powi(exponent)).round() as i64)
}

const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Formats a byte count with binary units and two decimals (`1.50 GiB`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: i64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
