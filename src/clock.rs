//! Game clock arithmetic
//!
//! Period clocks count down; everything downstream works on a single
//! elapsed-seconds value that increases across periods and overtimes.

use regex::Regex;
use std::sync::OnceLock;

pub const REGULATION_PERIODS: u8 = 4;
pub const REGULATION_PERIOD_SECONDS: f64 = 720.0;
pub const OVERTIME_PERIOD_SECONDS: f64 = 300.0;

/// Length of a period in seconds (periods are 1-based, 5+ are overtime)
pub fn period_length(period: u8) -> f64 {
    if period > REGULATION_PERIODS {
        OVERTIME_PERIOD_SECONDS
    } else {
        REGULATION_PERIOD_SECONDS
    }
}

/// Elapsed seconds at the start of a period
pub fn period_start_elapsed(period: u8) -> f64 {
    let period = period.max(1);
    let regulation = (period - 1).min(REGULATION_PERIODS) as f64;
    let overtime = (period - 1).saturating_sub(REGULATION_PERIODS) as f64;
    regulation * REGULATION_PERIOD_SECONDS + overtime * OVERTIME_PERIOD_SECONDS
}

/// Elapsed seconds at the end of a period
pub fn period_end_elapsed(period: u8) -> f64 {
    period_start_elapsed(period) + period_length(period)
}

/// Clamp a countdown clock into `[0, period_length]`, reporting whether it moved
pub fn clamp_clock(period: u8, clock: f64) -> (f64, bool) {
    let length = period_length(period);
    if clock.is_nan() {
        return (length, true);
    }
    let clamped = clock.clamp(0.0, length);
    (clamped, clamped != clock)
}

/// Convert a period and countdown clock to elapsed game seconds
pub fn elapsed_seconds(period: u8, clock: f64) -> f64 {
    period_start_elapsed(period) + (period_length(period) - clock)
}

/// Convert elapsed game seconds back to a countdown clock within `period`
pub fn clock_at(period: u8, elapsed: f64) -> f64 {
    period_end_elapsed(period) - elapsed
}

/// Period that contains an elapsed time; boundaries belong to the earlier period
pub fn period_at(elapsed: f64) -> u8 {
    let mut period = 1u8;
    while elapsed > period_end_elapsed(period) && period < u8::MAX {
        period += 1;
    }
    period
}

fn minutes_seconds_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{1,2}(?:\.\d+)?)$").expect("valid regex"))
}

fn iso_duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^PT(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?$").expect("valid regex")
    })
}

/// Parse a clock string into seconds remaining
///
/// Accepts `MM:SS`, `M:SS.s`, plain seconds (`45.3`) and the ISO-8601
/// duration form used by the NBA live feed (`PT11M32.00S`).
pub fn parse_clock(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = minutes_seconds_re().captures(text) {
        let minutes: f64 = caps[1].parse().ok()?;
        let seconds: f64 = caps[2].parse().ok()?;
        return Some(minutes * 60.0 + seconds);
    }

    if let Some(caps) = iso_duration_re().captures(text) {
        if caps.get(1).is_none() && caps.get(2).is_none() {
            return None;
        }
        let minutes: f64 = caps.get(1).map_or(Some(0.0), |m| m.as_str().parse().ok())?;
        let seconds: f64 = caps.get(2).map_or(Some(0.0), |m| m.as_str().parse().ok())?;
        return Some(minutes * 60.0 + seconds);
    }

    text.parse::<f64>().ok().filter(|s| s.is_finite())
}
