use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use super::compile_static_regex;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

static RELATIVE_PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(concat!(
        r"(?i)(\d+)\s*",
        r"(seconds?|secs?|minutes?|mins?|hours?|hrs?|days?|weeks?|months?|years?",
        r"|秒|分钟|分|小时|时|天|日|周|月|年)",
    ))
});

static TIMEZONE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^(?:UTC|GMT)?\s*([+-])(\d{1,2}):?(\d{2})?$"));

/// Returns the current Unix timestamp in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Parses a timezone designation such as `+08:00`, `+0800`, `UTC+8` or `UTC`.
#[must_use]
pub fn parse_timezone(input: &str) -> Option<FixedOffset> {
    let trimmed = input.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("utc")
        || trimmed.eq_ignore_ascii_case("z")
    {
        return FixedOffset::east_opt(0);
    }
    let caps = TIMEZONE_RE.captures(trimmed)?;
    let hours: i32 = caps.get(2)?.as_str().parse().ok()?;
    let minutes: i32 = caps
        .get(3)
        .map_or(Ok(0), |m| m.as_str().parse())
        .ok()?;
    let seconds = hours * 3600 + minutes * 60;
    if caps.get(1)?.as_str() == "-" {
        FixedOffset::west_opt(seconds)
    } else {
        FixedOffset::east_opt(seconds)
    }
}

/// Parses a site-local timestamp into a Unix epoch using the current time for relative forms.
#[must_use]
pub fn parse_time(input: &str, offset: FixedOffset) -> Option<i64> {
    parse_time_at(input, offset, now_unix())
}

/// Parses a site-local timestamp into a Unix epoch.
///
/// Accepted forms: Unix seconds or milliseconds, RFC 3339, common
/// `YYYY-MM-DD HH:MM[:SS]` layouts interpreted in `offset`, bare dates
/// (midnight), and relative ages such as `3 days ago` or `1天2时前`
/// measured back from `now`.
#[must_use]
pub fn parse_time_at(input: &str, offset: FixedOffset, now: i64) -> Option<i64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        let value: i64 = trimmed.parse().ok()?;
        return Some(if trimmed.len() >= 13 { value / 1000 } else { value });
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.timestamp());
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return local_to_epoch(&naive, offset);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return local_to_epoch(&date.and_hms_opt(0, 0, 0)?, offset);
        }
    }

    parse_relative(trimmed, now)
}

fn local_to_epoch(naive: &NaiveDateTime, offset: FixedOffset) -> Option<i64> {
    offset
        .from_local_datetime(naive)
        .single()
        .map(|dt| dt.timestamp())
}

fn parse_relative(input: &str, now: i64) -> Option<i64> {
    let lower = input.to_lowercase();
    if !(lower.ends_with("ago") || lower.ends_with('前')) {
        return None;
    }

    let mut total: i64 = 0;
    let mut matched = false;
    for caps in RELATIVE_PART_RE.captures_iter(&lower) {
        let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = caps.get(2)?.as_str();
        total = total.checked_add(amount.checked_mul(unit_seconds(unit)?)?)?;
        matched = true;
    }

    if matched { now.checked_sub(total) } else { None }
}

fn unit_seconds(unit: &str) -> Option<i64> {
    let seconds = match unit {
        "秒" => 1,
        "分钟" | "分" => 60,
        "小时" | "时" => 3600,
        "天" | "日" => 86_400,
        "周" => 7 * 86_400,
        "月" => 30 * 86_400,
        "年" => 365 * 86_400,
        u if u.starts_with("sec") => 1,
        u if u.starts_with("min") => 60,
        u if u.starts_with('h') => 3600,
        u if u.starts_with('d') => 86_400,
        u if u.starts_with('w') => 7 * 86_400,
        u if u.starts_with("mo") => 30 * 86_400,
        u if u.starts_with('y') => 365 * 86_400,
        _ => return None,
    };
    Some(seconds)
}
