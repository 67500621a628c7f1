//! Header/field mapping tables for the destination tabs.
//!
//! One immutable `Schema` value is the single source of truth for column
//! ordering and header-to-field association. Both the projection step and
//! the upsert engine consult it, so they cannot diverge. The key column is
//! always column 0 (date, activity id, or month).

use chrono::NaiveDate;

use crate::extract::units::{round1, round2};
use crate::model::{ActivityEntry, DailyRecord, MonthlyRecord};

/// Destination tabs. Each maps to one sheet/file in a destination store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Sleep,
    Stress,
    BodyComposition,
    BloodPressure,
    ActivitySummary,
    DailySummary,
    Activities,
    MonthlyAverages,
}

impl Tab {
    /// Tabs holding per-day records, in dispatch order.
    pub const DAILY: [Tab; 6] = [
        Tab::Sleep,
        Tab::Stress,
        Tab::BodyComposition,
        Tab::BloodPressure,
        Tab::ActivitySummary,
        Tab::DailySummary,
    ];

    /// File name for flat-file destinations.
    pub fn file_name(&self) -> &'static str {
        match self {
            Tab::Sleep => "garmin_sleep.csv",
            Tab::Stress => "garmin_stress.csv",
            Tab::BodyComposition => "garmin_body_composition.csv",
            Tab::BloodPressure => "garmin_blood_pressure.csv",
            Tab::ActivitySummary => "garmin_activity_summary.csv",
            Tab::DailySummary => "general_summary.csv",
            Tab::Activities => "garmin_activities_list.csv",
            Tab::MonthlyAverages => "garmin_monthly_averages.csv",
        }
    }

    /// Tabs representing finalized daily aggregates must not show values
    /// for the current, not-yet-complete day.
    pub fn historical_only(&self) -> bool {
        matches!(self, Tab::Stress | Tab::ActivitySummary)
    }
}

/// Rendered cell value. `Empty` is the explicit representation of a
/// missing upstream value; it must never be coerced to zero.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Int(i64),
    /// Float rounded to 1 decimal at this export boundary.
    F1(f64),
    /// Float rounded to 2 decimals at this export boundary.
    F2(f64),
    Text(String),
}

impl Cell {
    pub fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Int(v) => v.to_string(),
            Cell::F1(v) => format!("{}", round1(*v)),
            Cell::F2(v) => format!("{}", round2(*v)),
            Cell::Text(s) => s.clone(),
        }
    }

    fn int(v: Option<f64>) -> Cell {
        v.map(|x| Cell::Int(x.round() as i64)).unwrap_or(Cell::Empty)
    }

    fn f1(v: Option<f64>) -> Cell {
        v.map(Cell::F1).unwrap_or(Cell::Empty)
    }

    fn f2(v: Option<f64>) -> Cell {
        v.map(Cell::F2).unwrap_or(Cell::Empty)
    }

    fn text(v: Option<&str>) -> Cell {
        match v {
            Some(s) if !s.is_empty() => Cell::Text(s.to_string()),
            _ => Cell::Empty,
        }
    }
}

/// Canonical daily-record fields addressable from the mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Date,
    Month,
    MonthDays,
    SleepScore,
    SleepNeedMin,
    SleepEfficiencyPct,
    SleepLengthMin,
    SleepStart,
    SleepEnd,
    DeepSleepMin,
    LightSleepMin,
    RemSleepMin,
    AwakeMin,
    RestlessMoments,
    OvernightRespiration,
    OvernightPulseOx,
    WeightKg,
    Bmi,
    BodyFatPct,
    SkeletalMuscleKg,
    BoneMassKg,
    BodyWaterPct,
    VisceralFat,
    RestingHeartRate,
    BpSystolic,
    BpDiastolic,
    OvernightHrvMs,
    HrvStatus,
    AverageStress,
    RestStressMin,
    LowStressMin,
    MediumStressMin,
    HighStressMin,
    BodyBatteryMax,
    BodyBatteryMin,
    Vo2maxRunning,
    Vo2maxCycling,
    TrainingLoad,
    LactateThresholdHr,
    LactateThresholdPace,
    TrainingStatus,
    Steps,
    FloorsClimbed,
    ActiveCalories,
    RestingCalories,
    IntensityMinutes,
}

impl Field {
    pub fn cell(&self, rec: &DailyRecord) -> Cell {
        match self {
            Field::Date => rec
                .date
                .map(|d| Cell::Text(d.to_string()))
                .unwrap_or(Cell::Empty),
            Field::Month => rec
                .date
                .map(|d| Cell::Text(d.format("%Y-%m").to_string()))
                .unwrap_or(Cell::Empty),
            // Only meaningful through monthly projection, which overrides it.
            Field::MonthDays => Cell::Empty,
            Field::SleepScore => Cell::int(rec.sleep_score),
            Field::SleepNeedMin => Cell::int(rec.sleep_need_min),
            Field::SleepEfficiencyPct => Cell::int(rec.sleep_efficiency_pct),
            Field::SleepLengthMin => Cell::int(rec.sleep_length_min),
            Field::SleepStart => Cell::text(rec.sleep_start.as_deref()),
            Field::SleepEnd => Cell::text(rec.sleep_end.as_deref()),
            Field::DeepSleepMin => Cell::int(rec.deep_sleep_min),
            Field::LightSleepMin => Cell::int(rec.light_sleep_min),
            Field::RemSleepMin => Cell::int(rec.rem_sleep_min),
            Field::AwakeMin => Cell::int(rec.awake_min),
            Field::RestlessMoments => Cell::int(rec.restless_moments),
            Field::OvernightRespiration => Cell::f1(rec.overnight_respiration),
            Field::OvernightPulseOx => Cell::int(rec.overnight_pulse_ox),
            Field::WeightKg => Cell::f2(rec.weight_kg),
            Field::Bmi => Cell::f1(rec.bmi),
            Field::BodyFatPct => Cell::f1(rec.body_fat_pct),
            Field::SkeletalMuscleKg => Cell::f2(rec.skeletal_muscle_kg),
            Field::BoneMassKg => Cell::f2(rec.bone_mass_kg),
            Field::BodyWaterPct => Cell::f1(rec.body_water_pct),
            Field::VisceralFat => Cell::int(rec.visceral_fat),
            Field::RestingHeartRate => Cell::int(rec.resting_heart_rate),
            Field::BpSystolic => Cell::int(rec.bp_systolic),
            Field::BpDiastolic => Cell::int(rec.bp_diastolic),
            Field::OvernightHrvMs => Cell::int(rec.overnight_hrv_ms),
            Field::HrvStatus => Cell::text(rec.hrv_status.as_deref()),
            Field::AverageStress => Cell::int(rec.average_stress),
            Field::RestStressMin => Cell::int(rec.rest_stress_min),
            Field::LowStressMin => Cell::int(rec.low_stress_min),
            Field::MediumStressMin => Cell::int(rec.medium_stress_min),
            Field::HighStressMin => Cell::int(rec.high_stress_min),
            Field::BodyBatteryMax => Cell::int(rec.body_battery_max),
            Field::BodyBatteryMin => Cell::int(rec.body_battery_min),
            Field::Vo2maxRunning => Cell::f1(rec.vo2max_running),
            Field::Vo2maxCycling => Cell::f1(rec.vo2max_cycling),
            Field::TrainingLoad => Cell::int(rec.training_load),
            Field::LactateThresholdHr => Cell::int(rec.lactate_threshold_hr),
            Field::LactateThresholdPace => Cell::text(rec.lactate_threshold_pace.as_deref()),
            Field::TrainingStatus => Cell::text(rec.training_status.as_deref()),
            Field::Steps => Cell::int(rec.steps),
            Field::FloorsClimbed => Cell::int(rec.floors_climbed),
            Field::ActiveCalories => Cell::int(rec.active_calories),
            Field::RestingCalories => Cell::int(rec.resting_calories),
            Field::IntensityMinutes => Cell::int(rec.intensity_minutes),
        }
    }

    /// Apply a rendered cell back onto a record. Inverse of `cell` up to
    /// export rounding; empty cells leave the field untouched. Used when
    /// re-reading persisted rows for aggregation.
    pub fn apply(&self, rec: &mut DailyRecord, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        let num = raw.parse::<f64>().ok();
        let text = || Some(raw.to_string());
        match self {
            Field::Date => rec.date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
            Field::Month | Field::MonthDays => {}
            Field::SleepScore => rec.sleep_score = num,
            Field::SleepNeedMin => rec.sleep_need_min = num,
            Field::SleepEfficiencyPct => rec.sleep_efficiency_pct = num,
            Field::SleepLengthMin => rec.sleep_length_min = num,
            Field::SleepStart => rec.sleep_start = text(),
            Field::SleepEnd => rec.sleep_end = text(),
            Field::DeepSleepMin => rec.deep_sleep_min = num,
            Field::LightSleepMin => rec.light_sleep_min = num,
            Field::RemSleepMin => rec.rem_sleep_min = num,
            Field::AwakeMin => rec.awake_min = num,
            Field::RestlessMoments => rec.restless_moments = num,
            Field::OvernightRespiration => rec.overnight_respiration = num,
            Field::OvernightPulseOx => rec.overnight_pulse_ox = num,
            Field::WeightKg => rec.weight_kg = num,
            Field::Bmi => rec.bmi = num,
            Field::BodyFatPct => rec.body_fat_pct = num,
            Field::SkeletalMuscleKg => rec.skeletal_muscle_kg = num,
            Field::BoneMassKg => rec.bone_mass_kg = num,
            Field::BodyWaterPct => rec.body_water_pct = num,
            Field::VisceralFat => rec.visceral_fat = num,
            Field::RestingHeartRate => rec.resting_heart_rate = num,
            Field::BpSystolic => rec.bp_systolic = num,
            Field::BpDiastolic => rec.bp_diastolic = num,
            Field::OvernightHrvMs => rec.overnight_hrv_ms = num,
            Field::HrvStatus => rec.hrv_status = text(),
            Field::AverageStress => rec.average_stress = num,
            Field::RestStressMin => rec.rest_stress_min = num,
            Field::LowStressMin => rec.low_stress_min = num,
            Field::MediumStressMin => rec.medium_stress_min = num,
            Field::HighStressMin => rec.high_stress_min = num,
            Field::BodyBatteryMax => rec.body_battery_max = num,
            Field::BodyBatteryMin => rec.body_battery_min = num,
            Field::Vo2maxRunning => rec.vo2max_running = num,
            Field::Vo2maxCycling => rec.vo2max_cycling = num,
            Field::TrainingLoad => rec.training_load = num,
            Field::LactateThresholdHr => rec.lactate_threshold_hr = num,
            Field::LactateThresholdPace => rec.lactate_threshold_pace = text(),
            Field::TrainingStatus => rec.training_status = text(),
            Field::Steps => rec.steps = num,
            Field::FloorsClimbed => rec.floors_climbed = num,
            Field::ActiveCalories => rec.active_calories = num,
            Field::RestingCalories => rec.resting_calories = num,
            Field::IntensityMinutes => rec.intensity_minutes = num,
        }
    }
}

/// Activity-list fields, projected per `ActivityEntry` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityField {
    ActivityId,
    Date,
    Time,
    Type,
    Name,
    DistanceKm,
    DurationMin,
    AvgPace,
    AvgHr,
    MaxHr,
    Calories,
    AvgCadence,
    ElevationGainM,
    ElevationLossM,
    AerobicTe,
    AnaerobicTe,
    AvgPowerW,
    GroundContactMs,
    VerticalOscillationCm,
    StrideLengthM,
    Zone1Min,
    Zone2Min,
    Zone3Min,
    Zone4Min,
    Zone5Min,
}

impl ActivityField {
    pub fn cell(&self, act: &ActivityEntry) -> Cell {
        match self {
            ActivityField::ActivityId => Cell::Int(act.activity_id),
            ActivityField::Date => Cell::Text(act.date.to_string()),
            ActivityField::Time => Cell::text(act.start_time.as_deref()),
            ActivityField::Type => Cell::text(act.activity_type.as_deref()),
            ActivityField::Name => Cell::text(act.name.as_deref()),
            ActivityField::DistanceKm => Cell::f2(act.distance_km),
            ActivityField::DurationMin => Cell::f1(act.duration_min),
            ActivityField::AvgPace => Cell::text(act.avg_pace.as_deref()),
            ActivityField::AvgHr => Cell::int(act.avg_hr),
            ActivityField::MaxHr => Cell::int(act.max_hr),
            ActivityField::Calories => Cell::int(act.calories),
            ActivityField::AvgCadence => Cell::int(act.avg_cadence),
            ActivityField::ElevationGainM => Cell::int(act.elevation_gain_m),
            ActivityField::ElevationLossM => Cell::int(act.elevation_loss_m),
            ActivityField::AerobicTe => Cell::f1(act.aerobic_te),
            ActivityField::AnaerobicTe => Cell::f1(act.anaerobic_te),
            ActivityField::AvgPowerW => Cell::int(act.avg_power_w),
            ActivityField::GroundContactMs => Cell::f1(act.ground_contact_ms),
            ActivityField::VerticalOscillationCm => Cell::f2(act.vertical_oscillation_cm),
            ActivityField::StrideLengthM => Cell::f2(act.stride_length_m),
            ActivityField::Zone1Min => Cell::F2(act.zone_minutes[0]),
            ActivityField::Zone2Min => Cell::F2(act.zone_minutes[1]),
            ActivityField::Zone3Min => Cell::F2(act.zone_minutes[2]),
            ActivityField::Zone4Min => Cell::F2(act.zone_minutes[3]),
            ActivityField::Zone5Min => Cell::F2(act.zone_minutes[4]),
        }
    }
}

/// One column: a human-readable header bound to a canonical field.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub header: &'static str,
    pub field: Field,
}

const fn col(header: &'static str, field: Field) -> Column {
    Column { header, field }
}

const SLEEP_COLUMNS: &[Column] = &[
    col("Date", Field::Date),
    col("Sleep Score", Field::SleepScore),
    col("Sleep Need (min)", Field::SleepNeedMin),
    col("Sleep Efficiency (%)", Field::SleepEfficiencyPct),
    col("Sleep Duration (min)", Field::SleepLengthMin),
    col("Sleep Start", Field::SleepStart),
    col("Sleep End", Field::SleepEnd),
    col("Deep Sleep (min)", Field::DeepSleepMin),
    col("Light Sleep (min)", Field::LightSleepMin),
    col("REM Sleep (min)", Field::RemSleepMin),
    col("Awake Time (min)", Field::AwakeMin),
    col("Restlessness (x)", Field::RestlessMoments),
    col("Avg Respiration (brpm)", Field::OvernightRespiration),
    col("Avg SpO2 (%)", Field::OvernightPulseOx),
    col("Overnight HRV (ms)", Field::OvernightHrvMs),
    col("HRV Status", Field::HrvStatus),
    col("Overnight Resting Heart Rate (bpm)", Field::RestingHeartRate),
];

const STRESS_COLUMNS: &[Column] = &[
    col("Date", Field::Date),
    col("Stress Score", Field::AverageStress),
    col("Rest Stress (min)", Field::RestStressMin),
    col("Low Stress (min)", Field::LowStressMin),
    col("Medium Stress (min)", Field::MediumStressMin),
    col("High Stress (min)", Field::HighStressMin),
    col("Body Battery Max", Field::BodyBatteryMax),
    col("Body Battery Min", Field::BodyBatteryMin),
];

const BODY_COMP_COLUMNS: &[Column] = &[
    col("Date", Field::Date),
    col("Weight (kg)", Field::WeightKg),
    col("BMI", Field::Bmi),
    col("Body Fat (%)", Field::BodyFatPct),
    col("Skeletal Muscle (kg)", Field::SkeletalMuscleKg),
    col("Bone Mass (kg)", Field::BoneMassKg),
    col("Body Water (%)", Field::BodyWaterPct),
    col("Visceral Fat", Field::VisceralFat),
];

const BP_COLUMNS: &[Column] = &[
    col("Date", Field::Date),
    col("BP Systolic", Field::BpSystolic),
    col("BP Diastolic", Field::BpDiastolic),
];

const ACTIVITY_SUMMARY_COLUMNS: &[Column] = &[
    col("Date", Field::Date),
    col("Steps", Field::Steps),
    col("Floors Climbed", Field::FloorsClimbed),
    col("Active Calories", Field::ActiveCalories),
    col("Resting Calories", Field::RestingCalories),
    col("Intensity Minutes", Field::IntensityMinutes),
    col("Training Status", Field::TrainingStatus),
    col("Training Load", Field::TrainingLoad),
    col("VO2 Max (Run)", Field::Vo2maxRunning),
    col("VO2 Max (Cycle)", Field::Vo2maxCycling),
    col("Lactate Threshold HR", Field::LactateThresholdHr),
    col("Lactate Threshold Pace", Field::LactateThresholdPace),
];

const DAILY_SUMMARY_COLUMNS: &[Column] = &[
    col("Date", Field::Date),
    col("Weight (kg)", Field::WeightKg),
    col("BMI", Field::Bmi),
    col("Body Fat (%)", Field::BodyFatPct),
    col("Sleep Score", Field::SleepScore),
    col("Sleep Duration (min)", Field::SleepLengthMin),
    col("Sleep Efficiency (%)", Field::SleepEfficiencyPct),
    col("Resting HR", Field::RestingHeartRate),
    col("Average Stress", Field::AverageStress),
    col("Overnight HRV (ms)", Field::OvernightHrvMs),
    col("HRV Status", Field::HrvStatus),
    col("VO2 Max (Run)", Field::Vo2maxRunning),
    col("Training Status", Field::TrainingStatus),
    col("BP Systolic", Field::BpSystolic),
    col("BP Diastolic", Field::BpDiastolic),
    col("Active Calories", Field::ActiveCalories),
    col("Resting Calories", Field::RestingCalories),
    col("Intensity Minutes", Field::IntensityMinutes),
    col("Steps", Field::Steps),
    col("Floors Climbed", Field::FloorsClimbed),
];

const MONTHLY_COLUMNS: &[Column] = &[
    col("Month", Field::Month),
    col("Days", Field::MonthDays),
    col("Sleep Score", Field::SleepScore),
    col("Sleep Duration (min)", Field::SleepLengthMin),
    col("Sleep Start", Field::SleepStart),
    col("Sleep End", Field::SleepEnd),
    col("Weight (kg)", Field::WeightKg),
    col("Body Fat (%)", Field::BodyFatPct),
    col("Resting HR", Field::RestingHeartRate),
    col("Average Stress", Field::AverageStress),
    col("Overnight HRV (ms)", Field::OvernightHrvMs),
    col("HRV Status", Field::HrvStatus),
    col("VO2 Max (Run)", Field::Vo2maxRunning),
    col("Training Status", Field::TrainingStatus),
    col("Steps", Field::Steps),
    col("Active Calories", Field::ActiveCalories),
    col("Intensity Minutes", Field::IntensityMinutes),
];

const ACTIVITY_COLUMNS: &[(&str, ActivityField)] = &[
    ("Activity ID", ActivityField::ActivityId),
    ("Date", ActivityField::Date),
    ("Time", ActivityField::Time),
    ("Type", ActivityField::Type),
    ("Name", ActivityField::Name),
    ("Distance (km)", ActivityField::DistanceKm),
    ("Duration (min)", ActivityField::DurationMin),
    ("Avg Pace (min/km)", ActivityField::AvgPace),
    ("Avg HR", ActivityField::AvgHr),
    ("Max HR", ActivityField::MaxHr),
    ("Calories", ActivityField::Calories),
    ("Avg Cadence (spm)", ActivityField::AvgCadence),
    ("Elevation Gain (m)", ActivityField::ElevationGainM),
    ("Elevation Loss (m)", ActivityField::ElevationLossM),
    ("Aerobic TE", ActivityField::AerobicTe),
    ("Anaerobic TE", ActivityField::AnaerobicTe),
    ("Avg Power", ActivityField::AvgPowerW),
    ("GCT (ms)", ActivityField::GroundContactMs),
    ("Vert Osc (cm)", ActivityField::VerticalOscillationCm),
    ("Stride Len (m)", ActivityField::StrideLengthM),
    ("Zone 1 (min)", ActivityField::Zone1Min),
    ("Zone 2 (min)", ActivityField::Zone2Min),
    ("Zone 3 (min)", ActivityField::Zone3Min),
    ("Zone 4 (min)", ActivityField::Zone4Min),
    ("Zone 5 (min)", ActivityField::Zone5Min),
];

/// Frozen mapping configuration, passed explicitly to the extractor
/// projection and the upsert engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Schema;

impl Schema {
    pub fn v1() -> Self {
        Schema
    }

    pub fn columns(&self, tab: Tab) -> &'static [Column] {
        match tab {
            Tab::Sleep => SLEEP_COLUMNS,
            Tab::Stress => STRESS_COLUMNS,
            Tab::BodyComposition => BODY_COMP_COLUMNS,
            Tab::BloodPressure => BP_COLUMNS,
            Tab::ActivitySummary => ACTIVITY_SUMMARY_COLUMNS,
            Tab::DailySummary => DAILY_SUMMARY_COLUMNS,
            Tab::MonthlyAverages => MONTHLY_COLUMNS,
            Tab::Activities => unreachable!("activities use activity_headers()"),
        }
    }

    pub fn headers(&self, tab: Tab) -> Vec<String> {
        if tab == Tab::Activities {
            return self.activity_headers();
        }
        self.columns(tab).iter().map(|c| c.header.to_string()).collect()
    }

    pub fn activity_headers(&self) -> Vec<String> {
        ACTIVITY_COLUMNS.iter().map(|(h, _)| h.to_string()).collect()
    }

    /// Reverse lookup: header text -> canonical field for a tab.
    pub fn field_for_header(&self, tab: Tab, header: &str) -> Option<Field> {
        self.columns(tab)
            .iter()
            .find(|c| c.header == header)
            .map(|c| c.field)
    }

    /// Project a daily record into a tab's ordered row of rendered cells.
    pub fn daily_row(&self, tab: Tab, rec: &DailyRecord) -> Vec<String> {
        self.columns(tab)
            .iter()
            .map(|c| c.field.cell(rec).render())
            .collect()
    }

    /// Project an activity entry into the activities row layout.
    pub fn activity_row(&self, act: &ActivityEntry) -> Vec<String> {
        ACTIVITY_COLUMNS
            .iter()
            .map(|(_, f)| f.cell(act).render())
            .collect()
    }

    /// Project a monthly aggregate into the monthly-averages row layout.
    pub fn monthly_row(&self, monthly: &MonthlyRecord) -> Vec<String> {
        self.columns(Tab::MonthlyAverages)
            .iter()
            .map(|c| match c.field {
                Field::Month => monthly.month.format("%Y-%m").to_string(),
                Field::MonthDays => monthly.days.to_string(),
                field => field.cell(&monthly.record).render(),
            })
            .collect()
    }
}
