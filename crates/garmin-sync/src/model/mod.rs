//! Canonical records produced by extraction and consumed by the
//! mapping/upsert layers.
//!
//! Every scalar field is independently optional: `None` means the upstream
//! source did not return the value for that date, and it must surface as an
//! empty cell in exports, never as zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One calendar date's worth of normalized health metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: Option<NaiveDate>,

    // Sleep
    pub sleep_score: Option<f64>,
    pub sleep_need_min: Option<f64>,
    pub sleep_efficiency_pct: Option<f64>,
    pub sleep_length_min: Option<f64>,
    /// Local clock time, "HH:MM"
    pub sleep_start: Option<String>,
    /// Local clock time, "HH:MM"
    pub sleep_end: Option<String>,
    pub deep_sleep_min: Option<f64>,
    pub light_sleep_min: Option<f64>,
    pub rem_sleep_min: Option<f64>,
    pub awake_min: Option<f64>,
    /// Count of restless moments overnight.
    pub restless_moments: Option<f64>,
    pub overnight_respiration: Option<f64>,
    pub overnight_pulse_ox: Option<f64>,

    // Body composition
    pub weight_kg: Option<f64>,
    pub bmi: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub skeletal_muscle_kg: Option<f64>,
    pub bone_mass_kg: Option<f64>,
    pub body_water_pct: Option<f64>,
    pub visceral_fat: Option<f64>,

    // Cardiovascular
    pub resting_heart_rate: Option<f64>,
    pub bp_systolic: Option<f64>,
    pub bp_diastolic: Option<f64>,
    pub overnight_hrv_ms: Option<f64>,
    pub hrv_status: Option<String>,

    // Stress / recovery
    pub average_stress: Option<f64>,
    pub rest_stress_min: Option<f64>,
    pub low_stress_min: Option<f64>,
    pub medium_stress_min: Option<f64>,
    pub high_stress_min: Option<f64>,
    pub body_battery_max: Option<f64>,
    pub body_battery_min: Option<f64>,

    // Training
    pub vo2max_running: Option<f64>,
    pub vo2max_cycling: Option<f64>,
    pub training_load: Option<f64>,
    pub lactate_threshold_hr: Option<f64>,
    /// "M:SS" per km
    pub lactate_threshold_pace: Option<String>,
    pub training_status: Option<String>,

    // Daily activity totals
    pub steps: Option<f64>,
    pub floors_climbed: Option<f64>,
    pub active_calories: Option<f64>,
    pub resting_calories: Option<f64>,
    pub intensity_minutes: Option<f64>,

    pub activities: Vec<ActivityEntry>,
}

impl DailyRecord {
    /// Degraded record carrying only the date. Used when a whole day's
    /// fetch fails: the day is never silently skipped.
    pub fn date_only(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Default::default()
        }
    }
}

/// One discrete exercise session.
///
/// Identified by the source-assigned `activity_id` for the whole persisted
/// history; created once when first observed and never rewritten.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub activity_id: i64,
    pub date: NaiveDate,
    /// Local clock time, "HH:MM"
    pub start_time: Option<String>,
    pub activity_type: Option<String>,
    pub name: Option<String>,
    pub distance_km: Option<f64>,
    pub duration_min: Option<f64>,
    /// "M:SS" per km
    pub avg_pace: Option<String>,
    pub avg_hr: Option<f64>,
    pub max_hr: Option<f64>,
    pub calories: Option<f64>,
    pub avg_cadence: Option<f64>,
    pub elevation_gain_m: Option<f64>,
    pub elevation_loss_m: Option<f64>,
    pub aerobic_te: Option<f64>,
    pub anaerobic_te: Option<f64>,
    pub avg_power_w: Option<f64>,
    /// Minutes spent in HR zones 1-5. Zero-filled when the per-activity
    /// detail fetch failed; structural fields above are always preserved.
    pub zone_minutes: [f64; 5],
    pub ground_contact_ms: Option<f64>,
    pub vertical_oscillation_cm: Option<f64>,
    pub stride_length_m: Option<f64>,
}

/// Derived average over one calendar month of daily records.
///
/// The inner record holds field-wise means (circular means for clock
/// times), `"Monthly Avg"` for status labels, and no activities. Never
/// persisted incrementally; regenerated wholesale per month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyRecord {
    /// First day of the month this aggregate covers.
    pub month: NaiveDate,
    /// Number of daily records the averages were computed from.
    pub days: usize,
    pub record: DailyRecord,
}
