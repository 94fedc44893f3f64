use serde::Serialize;

use super::DiscountLevel;

/// Outcome of a download-feasibility check.
///
/// Times are in seconds. `margin_secs` is only meaningful when the discount
/// window constrains the download; it is 0 for unconstrained cases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Feasibility {
    /// Whether the download finishes before the discount expires.
    pub can_complete: bool,
    /// Estimated transfer time from the full size and rate (0 when the rate is unknown).
    pub estimated_time_secs: f64,
    /// Seconds until the discount ends (0 for permanent or absent discounts).
    pub time_remaining_secs: i64,
    /// Bytes counted against the download quota.
    pub effective_size: i64,
    /// `time_remaining - estimated_time`.
    pub margin_secs: f64,
}

/// Decides whether a download can complete inside its discount window.
///
/// The transfer estimate uses the full `size_bytes`, not the quota-adjusted
/// effective size: the bytes still have to cross the wire.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn check_feasibility(
    size_bytes: i64,
    speed_bps: f64,
    level: DiscountLevel,
    end_time: i64,
    now: i64,
) -> Feasibility {
    let estimated_time_secs = if speed_bps > 0.0 {
        size_bytes as f64 / speed_bps
    } else {
        0.0
    };
    let effective_size = (size_bytes as f64 * level.download_ratio()).round() as i64;

    let unconstrained = Feasibility {
        can_complete: true,
        estimated_time_secs,
        time_remaining_secs: 0,
        effective_size,
        margin_secs: 0.0,
    };

    if level == DiscountLevel::None {
        return Feasibility {
            effective_size: size_bytes,
            ..unconstrained
        };
    }
    if level.download_ratio() == 0.0 || end_time == 0 {
        return unconstrained;
    }

    let time_remaining_secs = end_time - now;
    if time_remaining_secs <= 0 || speed_bps <= 0.0 {
        return Feasibility {
            can_complete: false,
            time_remaining_secs,
            margin_secs: time_remaining_secs as f64 - estimated_time_secs,
            ..unconstrained
        };
    }

    let margin_secs = time_remaining_secs as f64 - estimated_time_secs;
    Feasibility {
        can_complete: margin_secs >= 0.0,
        time_remaining_secs,
        margin_secs,
        ..unconstrained
    }
}
