use std::sync::LazyLock;

use regex::Regex;

use super::compile_static_regex;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"[-+]?\d[\d,.'\u{a0} ]*"));

/// Parses a locale-formatted number, returning `None` when no digits are present.
///
/// Grouping separators (`,`, `.`, space, apostrophe) are tolerated. When both
/// `,` and `.` appear, whichever comes last is the decimal separator. A lone
/// comma followed by exactly three digits is read as grouping (`1,234`),
/// otherwise as a decimal comma (`1,5`).
#[must_use]
pub fn parse_number(input: &str) -> Option<f64> {
    let raw = NUMBER_RE.find(input)?.as_str();
    let compact: String = raw
        .trim_end_matches(|c: char| matches!(c, ',' | '.' | ' ' | '\'' | '\u{a0}'))
        .chars()
        .filter(|c| !matches!(c, ' ' | '\'' | '\u{a0}'))
        .collect();

    let last_comma = compact.rfind(',');
    let last_dot = compact.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(comma), None) => {
            let single = compact.matches(',').count() == 1;
            if single && compact.len() - comma - 1 != 3 {
                compact.replace(',', ".")
            } else {
                compact.replace(',', "")
            }
        }
        (None, Some(_)) if compact.matches('.').count() > 1 => compact.replace('.', ""),
        _ => compact,
    };

    normalized.parse::<f64>().ok()
}

/// Formats a parsed number back into a canonical string.
///
/// Whole values print without a fractional part so downstream integer parses succeed.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
