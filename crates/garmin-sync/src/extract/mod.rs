//! Field extraction: raw multi-section payloads -> one `DailyRecord`.
//!
//! Every section is optional; a missing section yields `None` for all the
//! fields it would have populated and extraction of sibling fields
//! continues. Extraction itself cannot fail — a day whose entire fetch
//! failed is fed an empty bundle and degrades to a date-only record.

pub mod search;
pub mod units;

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use crate::model::{ActivityEntry, DailyRecord};
use search::{find_first_number, first_entry, resolve_scalar, value_to_f64};
use units::{clock_from_epoch_millis, kg_from_grams, pace_string_from_decimal_minutes,
    pace_string_from_speed};

/// Priority-ordered key chain for acute training load. The upstream nests
/// the value at different depths across firmware generations, so the
/// whole payload tree is searched per key.
const TRAINING_LOAD_KEYS: &[&str] = &[
    "dailyTrainingLoadAcute",
    "acuteLoad",
    "sevenDayLoad",
    "timeInZoneLoad",
];

/// Lactate-threshold speeds below this are assumed to be reported in the
/// wrong unit scale and corrected by x10 (known upstream inconsistency).
const LACTATE_SPEED_SANITY_FLOOR: f64 = 1.0;

/// Raw per-day payload sections, each independently optional.
///
/// Secondary round-trips (steps fallback, lactate endpoints, per-activity
/// detail) are resolved by the fetch phase and carried here so extraction
/// stays pure.
#[derive(Debug, Default)]
pub struct SectionBundle {
    pub summary: Option<Value>,
    pub sleep: Option<Value>,
    pub body_stats: Option<Value>,
    pub training_status: Option<Value>,
    pub hrv: Option<Value>,
    pub blood_pressure: Option<Value>,
    pub activities: Option<Value>,
    /// Dedicated steps endpoint, fetched regardless of summary success.
    pub steps_fallback: Option<Value>,
    /// "Latest value" lactate-threshold endpoint.
    pub lactate_latest: Option<Value>,
    /// Date-ranged lactate-threshold endpoint.
    pub lactate_ranged: Option<Value>,
    /// Per-activity HR-zone detail payloads, keyed by activity id.
    pub activity_details: HashMap<i64, Value>,
}

impl SectionBundle {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.sleep.is_none()
            && self.body_stats.is_none()
            && self.training_status.is_none()
            && self.hrv.is_none()
            && self.blood_pressure.is_none()
            && self.activities.is_none()
            && self.steps_fallback.is_none()
    }
}

/// Extract one canonical record for `date` from a section bundle.
pub fn extract(bundle: &SectionBundle, date: NaiveDate) -> DailyRecord {
    let mut rec = DailyRecord::date_only(date);

    extract_sleep(bundle.sleep.as_ref(), &mut rec);
    extract_body(bundle.body_stats.as_ref(), &mut rec);
    extract_hrv(bundle.hrv.as_ref(), &mut rec);
    extract_summary(bundle.summary.as_ref(), &mut rec);
    extract_training(bundle.training_status.as_ref(), &mut rec);
    extract_blood_pressure(bundle.blood_pressure.as_ref(), &mut rec);
    extract_lactate(
        bundle.lactate_latest.as_ref(),
        bundle.lactate_ranged.as_ref(),
        date,
        &mut rec,
    );

    if rec.steps.is_none() {
        rec.steps = steps_from_fallback(bundle.steps_fallback.as_ref());
    }

    rec.activities = extract_activities(
        bundle.activities.as_ref(),
        &bundle.activity_details,
        date,
    );

    rec
}

fn get_f64(obj: &Value, key: &str) -> Option<f64> {
    obj.get(key).and_then(value_to_f64)
}

fn extract_sleep(sleep: Option<&Value>, rec: &mut DailyRecord) {
    let dto = match sleep.and_then(|v| v.get("dailySleepDTO").or(Some(v))) {
        Some(dto) if !dto.is_null() => dto,
        _ => return,
    };

    rec.sleep_score = dto
        .get("sleepScores")
        .and_then(|v| v.get("overall"))
        .and_then(|v| v.get("value"))
        .and_then(value_to_f64);

    // sleepNeed arrives as a scalar or as {"actual": x} depending on
    // firmware generation.
    rec.sleep_need_min = dto.get("sleepNeed").and_then(resolve_scalar);

    rec.overnight_respiration = get_f64(dto, "averageRespirationValue");
    rec.overnight_pulse_ox = get_f64(dto, "averageSpO2Value");

    let total_secs = get_f64(dto, "sleepTimeSeconds");
    rec.sleep_length_min = units::minutes_from_seconds(total_secs);
    rec.deep_sleep_min = units::minutes_from_seconds(get_f64(dto, "deepSleepSeconds"));
    rec.light_sleep_min = units::minutes_from_seconds(get_f64(dto, "lightSleepSeconds"));
    rec.rem_sleep_min = units::minutes_from_seconds(get_f64(dto, "remSleepSeconds"));
    rec.awake_min = units::minutes_from_seconds(get_f64(dto, "awakeSleepSeconds"));
    rec.restless_moments = get_f64(dto, "restlessMomentsCount");

    if let Some(total) = total_secs.filter(|t| *t > 0.0) {
        let awake = get_f64(dto, "awakeSleepSeconds").unwrap_or(0.0);
        rec.sleep_efficiency_pct = Some(((total - awake) / total * 100.0).round());
    }

    rec.sleep_start = clock_from_epoch_millis(
        dto.get("sleepStartTimestampLocal").and_then(|v| v.as_i64()),
    );
    rec.sleep_end = clock_from_epoch_millis(
        dto.get("sleepEndTimestampLocal").and_then(|v| v.as_i64()),
    );
}

fn extract_body(stats: Option<&Value>, rec: &mut DailyRecord) {
    let stats = match stats {
        Some(s) => s,
        None => return,
    };
    rec.weight_kg = kg_from_grams(get_f64(stats, "weight"));
    rec.bmi = get_f64(stats, "bmi");
    rec.body_fat_pct = get_f64(stats, "bodyFat");
    rec.skeletal_muscle_kg = kg_from_grams(get_f64(stats, "muscleMass"));
    rec.bone_mass_kg = kg_from_grams(get_f64(stats, "boneMass"));
    rec.body_water_pct = get_f64(stats, "bodyWater");
    rec.visceral_fat = get_f64(stats, "visceralFat");
}

fn extract_hrv(hrv: Option<&Value>, rec: &mut DailyRecord) {
    let summary = match hrv.and_then(|v| v.get("hrvSummary")) {
        Some(s) => s,
        None => return,
    };
    rec.overnight_hrv_ms = get_f64(summary, "lastNightAvg");
    rec.hrv_status = summary
        .get("status")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
}

fn extract_summary(summary: Option<&Value>, rec: &mut DailyRecord) {
    let summary = match summary {
        Some(s) => s,
        None => return,
    };

    rec.active_calories = get_f64(summary, "activeKilocalories");
    rec.resting_calories = get_f64(summary, "bmrKilocalories");
    rec.resting_heart_rate = get_f64(summary, "restingHeartRate");
    rec.average_stress = get_f64(summary, "averageStressLevel").filter(|v| *v >= 0.0);
    rec.steps = get_f64(summary, "totalSteps");

    // Vigorous minutes count double toward the weekly intensity goal.
    let moderate = get_f64(summary, "moderateIntensityMinutes");
    let vigorous = get_f64(summary, "vigorousIntensityMinutes");
    if moderate.is_some() || vigorous.is_some() {
        rec.intensity_minutes =
            Some(moderate.unwrap_or(0.0) + 2.0 * vigorous.unwrap_or(0.0));
    }

    rec.rest_stress_min = units::minutes_from_seconds(get_f64(summary, "restStressDuration"));
    rec.low_stress_min = units::minutes_from_seconds(get_f64(summary, "lowStressDuration"));
    rec.medium_stress_min =
        units::minutes_from_seconds(get_f64(summary, "mediumStressDuration"));
    rec.high_stress_min = units::minutes_from_seconds(get_f64(summary, "highStressDuration"));

    rec.body_battery_max = get_f64(summary, "bodyBatteryHighestValue");
    rec.body_battery_min = get_f64(summary, "bodyBatteryLowestValue");

    // Floors may arrive under either key, and as float or string.
    rec.floors_climbed = summary
        .get("floorsAscended")
        .or_else(|| summary.get("floorsClimbed"))
        .and_then(value_to_f64)
        .map(|v| v.round());
}

fn extract_training(status: Option<&Value>, rec: &mut DailyRecord) {
    let status = match status {
        Some(s) => s,
        None => return,
    };

    let vo2 = status.get("mostRecentVO2Max");
    rec.vo2max_running = vo2
        .and_then(|v| v.get("generic"))
        .and_then(|v| v.get("vo2MaxValue"))
        .and_then(value_to_f64);
    rec.vo2max_cycling = vo2
        .and_then(|v| v.get("cycling"))
        .and_then(|v| v.get("vo2MaxValue"))
        .and_then(value_to_f64);

    rec.training_load = find_first_number(status, TRAINING_LOAD_KEYS);

    // latestTrainingStatusData is keyed by device id; any entry carries
    // the phrase.
    rec.training_status = status
        .get("mostRecentTrainingStatus")
        .and_then(|v| v.get("latestTrainingStatusData"))
        .and_then(|v| v.as_object())
        .and_then(|map| {
            map.values().find_map(|entry| {
                entry
                    .get("trainingStatusFeedbackPhrase")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            })
        });
}

fn extract_blood_pressure(bp: Option<&Value>, rec: &mut DailyRecord) {
    let bp = match bp {
        Some(b) => b,
        None => return,
    };

    let mut systolic = Vec::new();
    let mut diastolic = Vec::new();
    collect_bp_readings(bp, &mut systolic, &mut diastolic);

    rec.bp_systolic = mean_nonempty(&systolic).map(|m| m.round());
    rec.bp_diastolic = mean_nonempty(&diastolic).map(|m| m.round());
}

/// The blood-pressure payload has shipped in three shapes: a flat list of
/// readings, a list under `userDailyBloodPressureDTOList`, and nested
/// `measurementSummaries[].measurements[]`. All readings for the day are
/// averaged; zero/missing readings are excluded.
fn collect_bp_readings(bp: &Value, systolic: &mut Vec<f64>, diastolic: &mut Vec<f64>) {
    let readings: Vec<&Value> = if let Some(list) = bp.as_array() {
        list.iter().collect()
    } else if let Some(list) = bp
        .get("userDailyBloodPressureDTOList")
        .and_then(|v| v.as_array())
    {
        list.iter().collect()
    } else if let Some(summaries) = bp.get("measurementSummaries").and_then(|v| v.as_array()) {
        summaries
            .iter()
            .filter_map(|s| s.get("measurements").and_then(|m| m.as_array()))
            .flatten()
            .collect()
    } else {
        Vec::new()
    };

    for reading in readings {
        if let Some(s) = get_f64(reading, "systolic").filter(|v| *v > 0.0) {
            systolic.push(s);
        }
        if let Some(d) = get_f64(reading, "diastolic").filter(|v| *v > 0.0) {
            diastolic.push(d);
        }
    }
}

fn mean_nonempty(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn extract_lactate(
    latest: Option<&Value>,
    ranged: Option<&Value>,
    date: NaiveDate,
    rec: &mut DailyRecord,
) {
    // Policy: latest-value endpoint first, then the ranged endpoint's last
    // entry whose internal date matches the target date.
    let entry = latest
        .and_then(first_entry)
        .filter(|e| get_f64(e, "heartRate").is_some() || get_f64(e, "speed").is_some())
        .or_else(|| ranged_entry_for_date(ranged, date));

    let entry = match entry {
        Some(e) => e,
        None => return,
    };

    rec.lactate_threshold_hr = get_f64(entry, "heartRate").or_else(|| get_f64(entry, "value"));

    if let Some(mut speed) = get_f64(entry, "speed") {
        if speed > 0.0 && speed < LACTATE_SPEED_SANITY_FLOOR {
            debug!(speed, "lactate speed below sanity floor, applying x10 correction");
            speed *= 10.0;
        }
        let pace = pace_string_from_speed(Some(speed));
        if !pace.is_empty() {
            rec.lactate_threshold_pace = Some(pace);
        }
    }
}

fn ranged_entry_for_date<'a>(ranged: Option<&'a Value>, date: NaiveDate) -> Option<&'a Value> {
    let list = ranged?.as_array()?;
    let date_str = date.to_string();
    list.iter().rev().find(|entry| {
        entry
            .get("calendarDate")
            .or_else(|| entry.get("date"))
            .and_then(|v| v.as_str())
            .map(|s| s.starts_with(&date_str))
            .unwrap_or(false)
    })
}

fn steps_from_fallback(steps: Option<&Value>) -> Option<f64> {
    let steps = steps?;
    // Either a daily object with a total, or a list of interval entries
    // whose step counts are summed.
    if let Some(total) = get_f64(steps, "totalSteps") {
        return Some(total);
    }
    let intervals = steps.as_array()?;
    let mut sum = 0.0;
    let mut seen = false;
    for interval in intervals {
        if let Some(v) = get_f64(interval, "steps") {
            sum += v;
            seen = true;
        }
    }
    seen.then_some(sum)
}

/// Ids present in an activity-list payload, used by the fetch phase to
/// decide which per-activity detail calls to make.
pub fn activity_ids(activities: Option<&Value>) -> Vec<i64> {
    activities
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|raw| raw.get("activityId").and_then(|v| v.as_i64()))
                .collect()
        })
        .unwrap_or_default()
}

fn extract_activities(
    activities: Option<&Value>,
    details: &HashMap<i64, Value>,
    date: NaiveDate,
) -> Vec<ActivityEntry> {
    let list = match activities.and_then(|v| v.as_array()) {
        Some(l) => l,
        None => return Vec::new(),
    };

    list.iter()
        .filter_map(|raw| parse_activity(raw, details, date))
        .collect()
}

fn parse_activity(
    raw: &Value,
    details: &HashMap<i64, Value>,
    date: NaiveDate,
) -> Option<ActivityEntry> {
    // No usable id means the row can never be upserted; skip it.
    let activity_id = raw.get("activityId").and_then(|v| v.as_i64())?;

    let mut entry = ActivityEntry {
        activity_id,
        date,
        ..Default::default()
    };

    entry.name = raw
        .get("activityName")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    entry.activity_type = raw
        .get("activityType")
        .and_then(|v| v.get("typeKey"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    entry.start_time = raw
        .get("startTimeLocal")
        .and_then(|v| v.as_str())
        .and_then(|s| s.split([' ', 'T']).nth(1))
        .map(|t| t.chars().take(5).collect());

    let dist_km = get_f64(raw, "distance").map(|m| m / 1000.0);
    let dur_min = get_f64(raw, "duration").map(|s| s / 60.0);
    entry.distance_km = dist_km;
    entry.duration_min = dur_min;

    if let (Some(d), Some(t)) = (dist_km, dur_min) {
        if d > 0.0 && t > 0.0 {
            entry.avg_pace = Some(pace_string_from_decimal_minutes(t / d));
        }
    }

    entry.avg_hr = get_f64(raw, "averageHR");
    entry.max_hr = get_f64(raw, "maxHR");
    entry.calories = get_f64(raw, "calories");
    entry.avg_cadence = get_f64(raw, "averageRunningCadenceInStepsPerMinute")
        .or_else(|| get_f64(raw, "averageBikingCadenceInRevPerMinute"));
    entry.elevation_gain_m = get_f64(raw, "elevationGain");
    entry.elevation_loss_m = get_f64(raw, "elevationLoss");
    entry.aerobic_te = get_f64(raw, "aerobicTrainingEffect");
    entry.anaerobic_te = get_f64(raw, "anaerobicTrainingEffect");
    entry.avg_power_w = get_f64(raw, "avgPower").or_else(|| get_f64(raw, "averageRunningPower"));
    entry.ground_contact_ms = get_f64(raw, "avgGroundContactTime");
    entry.vertical_oscillation_cm = get_f64(raw, "avgVerticalOscillation");
    // Stride is reported in centimeters.
    entry.stride_length_m = get_f64(raw, "avgStrideLength").map(|cm| cm / 100.0);

    // Zone minutes stay zero-filled when the detail fetch failed; the
    // structural fields above are kept either way.
    if let Some(zones) = details.get(&activity_id) {
        entry.zone_minutes = parse_zone_minutes(zones);
    }

    Some(entry)
}

fn parse_zone_minutes(zones: &Value) -> [f64; 5] {
    let mut minutes = [0.0; 5];
    if let Some(list) = zones.as_array() {
        for z in list {
            let num = z.get("zoneNumber").and_then(|v| v.as_i64()).unwrap_or(0);
            if (1..=5).contains(&num) {
                let secs = get_f64(z, "secsInZone").unwrap_or(0.0);
                minutes[(num - 1) as usize] = secs / 60.0;
            }
        }
    }
    minutes
}
