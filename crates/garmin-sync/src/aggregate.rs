//! Monthly aggregation over daily records.
//!
//! Numeric fields average over present values only. Clock-time fields use
//! circular averaging so times straddling midnight do not average to noon.
//! Status labels are replaced with a fixed marker rather than picking an
//! arbitrary day's value.

use chrono::{Datelike, NaiveDate};

use crate::extract::units::{clock_from_minutes, minutes_since_midnight};
use crate::model::{DailyRecord, MonthlyRecord};

/// Marker written into non-numeric status fields of a monthly aggregate.
pub const MONTHLY_MARKER: &str = "Monthly Avg";

/// Aggregate one month of daily records. Returns `None` for empty input.
pub fn aggregate(records: &[DailyRecord], month_anchor: NaiveDate) -> Option<MonthlyRecord> {
    if records.is_empty() {
        return None;
    }

    let month = NaiveDate::from_ymd_opt(month_anchor.year(), month_anchor.month(), 1)
        .unwrap_or(month_anchor);

    let mut avg = DailyRecord::date_only(month);

    macro_rules! mean_field {
        ($($field:ident),+ $(,)?) => {
            $(avg.$field = mean(records.iter().filter_map(|r| r.$field));)+
        };
    }

    mean_field!(
        sleep_score,
        sleep_need_min,
        sleep_efficiency_pct,
        sleep_length_min,
        deep_sleep_min,
        light_sleep_min,
        rem_sleep_min,
        awake_min,
        restless_moments,
        overnight_respiration,
        overnight_pulse_ox,
        weight_kg,
        bmi,
        body_fat_pct,
        skeletal_muscle_kg,
        bone_mass_kg,
        body_water_pct,
        visceral_fat,
        resting_heart_rate,
        bp_systolic,
        bp_diastolic,
        overnight_hrv_ms,
        average_stress,
        rest_stress_min,
        low_stress_min,
        medium_stress_min,
        high_stress_min,
        body_battery_max,
        body_battery_min,
        vo2max_running,
        vo2max_cycling,
        training_load,
        lactate_threshold_hr,
        steps,
        floors_climbed,
        active_calories,
        resting_calories,
        intensity_minutes,
    );

    // Sleep starts cluster around midnight; values before noon are treated
    // as having wrapped past midnight. End times average plainly.
    avg.sleep_start = circular_clock_mean(
        records.iter().filter_map(|r| r.sleep_start.as_deref()),
        true,
    );
    avg.sleep_end = circular_clock_mean(
        records.iter().filter_map(|r| r.sleep_end.as_deref()),
        false,
    );

    if records.iter().any(|r| r.hrv_status.is_some()) {
        avg.hrv_status = Some(MONTHLY_MARKER.to_string());
    }
    if records.iter().any(|r| r.training_status.is_some()) {
        avg.training_status = Some(MONTHLY_MARKER.to_string());
    }
    if records.iter().any(|r| r.lactate_threshold_pace.is_some()) {
        avg.lactate_threshold_pace = Some(MONTHLY_MARKER.to_string());
    }

    Some(MonthlyRecord {
        month,
        days: records.len(),
        record: avg,
    })
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values {
        sum += v;
        n += 1;
    }
    (n > 0).then(|| sum / n as f64)
}

/// Average "HH:MM" strings as minutes since midnight. With `shift_am`,
/// values before 12:00 are shifted by +1440 before averaging and the
/// result is normalized back into [0, 1440).
fn circular_clock_mean<'a>(
    clocks: impl Iterator<Item = &'a str>,
    shift_am: bool,
) -> Option<String> {
    let minutes: Vec<f64> = clocks
        .filter_map(minutes_since_midnight)
        .map(|m| {
            if shift_am && m < 720.0 {
                m + 1440.0
            } else {
                m
            }
        })
        .collect();
    let avg = mean(minutes.into_iter())?;
    Some(clock_from_minutes(avg))
}
