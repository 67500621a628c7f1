//! Sync orchestration: fetch, extract, dispatch, aggregate, prune.
//!
//! The day loop is sequential so rate limiting stays predictable; within a
//! day the section fetches fan out concurrently. A failed section degrades
//! to `None` and the day still produces a record. Only auth-class errors
//! abort the run mid-flight; a window where every single day fetched
//! nothing still persists its date-only rows but fails the run, so a
//! scheduled sync does not report success on a dead upstream.

pub mod rate_limiter;

use chrono::{Datelike, Days, Local, NaiveDate};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::aggregate::aggregate;
use crate::client::{GarminClient, OAuth2Token};
use crate::config::{DEFAULT_ACTIVITY_RETENTION_DAYS, DEFAULT_HEALTH_RETENTION_DAYS};
use crate::error::{Result, SyncError};
use crate::extract::{activity_ids, extract, SectionBundle};
use crate::model::{ActivityEntry, DailyRecord};
use crate::schema::{Field, Schema, Tab};
use crate::store::TabStore;
use crate::upsert::{normalize_date_key, UpsertEngine};
use rate_limiter::RateLimiter;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Records on or after this date are "live": tabs holding finalized
    /// daily aggregates skip them.
    pub today: NaiveDate,
    pub health_retention_days: u32,
    pub activity_retention_days: u32,
    pub prune: bool,
}

impl SyncOptions {
    pub fn window(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from,
            to,
            today: Local::now().date_naive(),
            health_retention_days: DEFAULT_HEALTH_RETENTION_DAYS,
            activity_retention_days: DEFAULT_ACTIVITY_RETENTION_DAYS,
            prune: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncStats {
    pub days_synced: usize,
    /// Days whose whole fetch failed and landed as date-only records.
    pub days_degraded: usize,
    pub rows_updated: usize,
    pub rows_appended: usize,
    pub activities_appended: usize,
    pub tabs_failed: usize,
    pub rows_pruned: usize,
}

/// Run a full sync over the option window.
pub async fn run_sync(
    client: &GarminClient,
    token: &OAuth2Token,
    store: &mut dyn TabStore,
    options: &SyncOptions,
) -> Result<SyncStats> {
    if options.from > options.to {
        return Err(SyncError::config(format!(
            "sync window start {} is after end {}",
            options.from, options.to
        )));
    }

    let display_name = client.display_name(token).await?;
    info!(from = %options.from, to = %options.to, "starting sync");

    let mut limiter = RateLimiter::new();
    let mut stats = SyncStats::default();

    // Lactate endpoints are not per-day; fetch once and share across days.
    limiter.wait().await;
    let lactate_latest = degrade(
        "lactate_latest",
        client.lactate_threshold_latest(token).await,
        &mut limiter,
    )?;
    let lactate_ranged = degrade(
        "lactate_range",
        client
            .lactate_threshold_range(token, &options.from.to_string(), &options.to.to_string())
            .await,
        &mut limiter,
    )?;

    let mut records: Vec<DailyRecord> = Vec::new();
    let mut date = options.from;
    while date <= options.to {
        if limiter.should_pause() {
            warn!(%date, "giving up after repeated rate limiting");
            return Err(SyncError::RateLimited);
        }
        limiter.wait().await;

        let mut bundle =
            fetch_day(client, token, &display_name, &mut limiter, date).await?;
        bundle.lactate_latest = lactate_latest.clone();
        bundle.lactate_ranged = lactate_ranged.clone();

        if bundle.is_empty() {
            stats.days_degraded += 1;
            warn!(%date, "no sections fetched, keeping date-only record");
        }
        records.push(extract(&bundle, date));
        stats.days_synced += 1;

        date = date
            .succ_opt()
            .ok_or_else(|| SyncError::config("date out of range"))?;
    }

    dispatch(store, &records, options.today, &mut stats)?;
    refresh_monthly_for_window(store, options.from, options.to)?;

    if options.prune {
        stats.rows_pruned = prune_all(
            store,
            options.today,
            options.health_retention_days,
            options.activity_retention_days,
        )?;
    }

    if stats.days_synced > 0 && stats.days_degraded == stats.days_synced {
        return Err(SyncError::NoData(format!(
            "every day in {}..{} fetched no sections",
            options.from, options.to
        )));
    }

    info!(
        days = stats.days_synced,
        updated = stats.rows_updated,
        appended = stats.rows_appended,
        activities = stats.activities_appended,
        "sync finished"
    );
    Ok(stats)
}

/// Fetch all of one day's sections, concurrently, each degrading to `None`
/// on non-fatal failure.
async fn fetch_day(
    client: &GarminClient,
    token: &OAuth2Token,
    display_name: &str,
    limiter: &mut RateLimiter,
    date: NaiveDate,
) -> Result<SectionBundle> {
    let date_str = date.to_string();

    let (summary, sleep, body_stats, training_status, hrv, blood_pressure, activities, steps) = tokio::join!(
        client.daily_summary(token, display_name, &date_str),
        client.sleep(token, display_name, &date_str),
        client.body_composition(token, &date_str),
        client.training_status(token, &date_str),
        client.hrv(token, &date_str),
        client.blood_pressure(token, &date_str),
        client.activities_for_date(token, &date_str),
        client.steps_range(token, &date_str),
    );

    let mut bundle = SectionBundle {
        summary: degrade("summary", summary, limiter)?,
        sleep: degrade("sleep", sleep, limiter)?,
        body_stats: degrade("body_composition", body_stats, limiter)?,
        training_status: degrade("training_status", training_status, limiter)?,
        hrv: degrade("hrv", hrv, limiter)?,
        blood_pressure: degrade("blood_pressure", blood_pressure, limiter)?,
        activities: degrade("activities", activities, limiter)?,
        steps_fallback: degrade("steps", steps, limiter)?,
        ..Default::default()
    };

    // Per-activity zone detail, sequential behind the limiter.
    for id in activity_ids(bundle.activities.as_ref()) {
        if limiter.should_pause() {
            break;
        }
        limiter.wait().await;
        let zones = degrade(
            "activity_hr_zones",
            client.activity_hr_zones(token, id).await,
            limiter,
        )?;
        if let Some(zones) = zones {
            bundle.activity_details.insert(id, zones);
        }
    }

    Ok(bundle)
}

/// Collapse a section result: fatal errors propagate, everything else
/// degrades to `None` with a log line.
fn degrade(
    section: &str,
    result: Result<Value>,
    limiter: &mut RateLimiter,
) -> Result<Option<Value>> {
    match result {
        Ok(value) => {
            limiter.on_success();
            Ok(Some(value))
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(SyncError::RateLimited) => {
            limiter.on_rate_limit();
            warn!(section, backoff = ?limiter.current_backoff(), "rate limited");
            Ok(None)
        }
        // 404 just means no data recorded for the day.
        Err(SyncError::NotFound(_)) => Ok(None),
        Err(e) => {
            warn!(section, error = %e, "section fetch failed");
            Ok(None)
        }
    }
}

/// Write records into the daily tabs and the activities tab. One failed
/// sink never blocks the others.
fn dispatch(
    store: &mut dyn TabStore,
    records: &[DailyRecord],
    today: NaiveDate,
    stats: &mut SyncStats,
) -> Result<()> {
    let upsert = UpsertEngine::new(Schema::v1());

    for tab in Tab::DAILY {
        let subset: Vec<DailyRecord> = if tab.historical_only() {
            records
                .iter()
                .filter(|r| r.date.map(|d| d < today).unwrap_or(false))
                .cloned()
                .collect()
        } else {
            records.to_vec()
        };
        match upsert.upsert_daily(store, tab, &subset) {
            Ok(s) => {
                stats.rows_updated += s.updated;
                stats.rows_appended += s.appended;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(?tab, error = %e, "tab upsert failed");
                stats.tabs_failed += 1;
            }
        }
    }

    let activities: Vec<ActivityEntry> = records
        .iter()
        .flat_map(|r| r.activities.iter().cloned())
        .collect();
    match upsert.upsert_activities(store, &activities) {
        Ok(s) => stats.activities_appended += s.appended,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            error!(error = %e, "activities upsert failed");
            stats.tabs_failed += 1;
        }
    }

    Ok(())
}

/// Recompute the monthly-averages row for every month the window touches.
fn refresh_monthly_for_window(
    store: &mut dyn TabStore,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<()> {
    let mut month = from.with_day(1).unwrap_or(from);
    while month <= to {
        if let Err(e) = refresh_monthly(store, month) {
            if e.is_fatal() {
                return Err(e);
            }
            error!(%month, error = %e, "monthly refresh failed");
        }
        month = next_month(month);
    }
    Ok(())
}

/// Rebuild one month's aggregate from the rows already persisted in the
/// daily tabs. Returns the number of days that contributed, or `None`
/// when the month holds no rows.
pub fn refresh_monthly(store: &mut dyn TabStore, month: NaiveDate) -> Result<Option<usize>> {
    let records = read_month_records(store, month)?;
    let Some(monthly) = aggregate(&records, month) else {
        return Ok(None);
    };
    let days = monthly.days;
    let upsert = UpsertEngine::new(Schema::v1());
    upsert.upsert_monthly(store, &[monthly])?;
    Ok(Some(days))
}

/// Reassemble daily records for one month from the persisted tabs. The
/// mapping table runs in reverse here; cells beyond export rounding are
/// all the precision the aggregate gets.
fn read_month_records(store: &dyn TabStore, month: NaiveDate) -> Result<Vec<DailyRecord>> {
    let schema = Schema::v1();
    let start = month.with_day(1).unwrap_or(month);
    let end = next_month(start);

    let mut by_date: std::collections::BTreeMap<NaiveDate, DailyRecord> =
        std::collections::BTreeMap::new();

    for tab in Tab::DAILY {
        let rows = store.read_rows(tab)?;
        let columns = schema.columns(tab);
        for row in rows.iter().skip(1) {
            let Some(date) = row.first().and_then(|s| normalize_date_key(s)) else {
                continue;
            };
            if date < start || date >= end {
                continue;
            }
            let rec = by_date
                .entry(date)
                .or_insert_with(|| DailyRecord::date_only(date));
            for (column, cell) in columns.iter().zip(row) {
                if column.field == Field::Date {
                    continue;
                }
                column.field.apply(rec, cell);
            }
        }
    }

    Ok(by_date.into_values().collect())
}

/// Drop rows that have aged out of retention across all tabs.
pub fn prune_all(
    store: &mut dyn TabStore,
    today: NaiveDate,
    health_retention_days: u32,
    activity_retention_days: u32,
) -> Result<usize> {
    let upsert = UpsertEngine::new(Schema::v1());
    let health_cutoff = today
        .checked_sub_days(Days::new(health_retention_days as u64))
        .ok_or_else(|| SyncError::config("retention window out of range"))?;
    let activity_cutoff = today
        .checked_sub_days(Days::new(activity_retention_days as u64))
        .ok_or_else(|| SyncError::config("retention window out of range"))?;

    let mut removed = 0;
    for tab in Tab::DAILY {
        removed += upsert.prune(store, tab, health_cutoff)?;
    }
    removed += upsert.prune(store, Tab::Activities, activity_cutoff)?;
    Ok(removed)
}

fn next_month(month: NaiveDate) -> NaiveDate {
    let (y, m) = if month.month() == 12 {
        (month.year() + 1, 1)
    } else {
        (month.year(), month.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(month)
}
