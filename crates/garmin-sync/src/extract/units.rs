//! Unit and value normalization helpers.
//!
//! Pure functions, no state. Conversions never raise on missing or zero
//! input. Rounding is applied at the export boundary (schema projection),
//! not here, so aggregation keeps full precision.

use chrono::DateTime;

/// Seconds to minutes. `None` stays `None`.
pub fn minutes_from_seconds(secs: Option<f64>) -> Option<f64> {
    secs.map(|s| s / 60.0)
}

/// Grams to kilograms. `None` stays `None`.
pub fn kg_from_grams(grams: Option<f64>) -> Option<f64> {
    grams.map(|g| g / 1000.0)
}

/// Format a speed in meters per second as a "M:SS" pace per kilometer.
///
/// Returns an empty string when the speed is missing or non-positive so
/// the value lands as an empty cell rather than a bogus pace.
pub fn pace_string_from_speed(speed_mps: Option<f64>) -> String {
    let speed = match speed_mps {
        Some(s) if s > 0.0 => s,
        _ => return String::new(),
    };
    let secs_per_km = 1000.0 / speed;
    let minutes = (secs_per_km / 60.0).floor() as u64;
    let seconds = (secs_per_km - minutes as f64 * 60.0).round() as u64;
    // Rounding seconds can carry into the next minute (e.g. 299.7s).
    if seconds == 60 {
        format!("{}:00", minutes + 1)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Format a decimal minutes-per-km pace as "M:SS".
pub fn pace_string_from_decimal_minutes(pace_min_per_km: f64) -> String {
    if pace_min_per_km <= 0.0 {
        return String::new();
    }
    let minutes = pace_min_per_km.floor() as u64;
    let seconds = ((pace_min_per_km - minutes as f64) * 60.0).round() as u64;
    if seconds == 60 {
        format!("{}:00", minutes + 1)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Convert an epoch-milliseconds timestamp to a "HH:MM" clock string.
///
/// The upstream "Local" timestamps are already shifted to the user's wall
/// clock, so the millis are formatted as-is without timezone conversion.
pub fn clock_from_epoch_millis(ms: Option<i64>) -> Option<String> {
    let ms = ms?;
    let dt = DateTime::from_timestamp_millis(ms)?;
    Some(dt.format("%H:%M").to_string())
}

/// Parse "HH:MM" into minutes since midnight.
pub fn minutes_since_midnight(clock: &str) -> Option<f64> {
    let (h, m) = clock.split_once(':')?;
    let h: f64 = h.trim().parse().ok()?;
    let m: f64 = m.trim().parse().ok()?;
    if !(0.0..24.0).contains(&h) || !(0.0..60.0).contains(&m) {
        return None;
    }
    Some(h * 60.0 + m)
}

/// Format minutes since midnight (normalized into [0, 1440)) as "HH:MM".
pub fn clock_from_minutes(minutes: f64) -> String {
    let total = minutes.rem_euclid(1440.0).round() as u64 % 1440;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Round to 1 decimal place.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Round to 2 decimal places.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
