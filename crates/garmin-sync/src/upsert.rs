//! Idempotent upsert of projected rows into tab stores.
//!
//! Existing rows are matched by the key column (column 0) after
//! normalization, so a re-sync updates rows in place instead of appending
//! duplicates. Each tab receives at most one batched update and one
//! batched append per pass.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Days, NaiveDate};
use tracing::debug;

use crate::error::Result;
use crate::model::{ActivityEntry, DailyRecord, MonthlyRecord};
use crate::schema::{Schema, Tab};
use crate::store::{Row, TabStore};

/// Spreadsheet serial dates count days from this epoch.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Bare numbers below this are not plausible date serials (20000 is
/// mid-2014); they are treated as unparseable keys and left alone.
const SERIAL_FLOOR: f64 = 20000.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertStats {
    pub updated: usize,
    pub appended: usize,
}

pub struct UpsertEngine {
    schema: Schema,
}

impl UpsertEngine {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Upsert daily records into one tab, keyed by date.
    pub fn upsert_daily(
        &self,
        store: &mut dyn TabStore,
        tab: Tab,
        records: &[DailyRecord],
    ) -> Result<UpsertStats> {
        let header = self.schema.headers(tab);
        store.write_header_if_absent(tab, &header)?;

        let rows = store.read_rows(tab)?;
        let index = date_key_index(&rows);

        let mut updates: Vec<(usize, Row)> = Vec::new();
        let mut appends: Vec<Row> = Vec::new();

        for rec in records {
            let Some(date) = rec.date else { continue };
            let row = self.schema.daily_row(tab, rec);
            match index.get(&date) {
                Some(idx) => updates.push((*idx, row)),
                None => {
                    // A date repeated within one batch updates its own append.
                    if let Some(prev) = appends
                        .iter()
                        .position(|r| normalize_date_key(&r[0]) == Some(date))
                    {
                        appends[prev] = row;
                    } else {
                        appends.push(row);
                    }
                }
            }
        }

        let stats = UpsertStats {
            updated: updates.len(),
            appended: appends.len(),
        };
        store.update_rows(tab, &updates)?;
        store.append_rows(tab, &appends)?;
        debug!(?tab, updated = stats.updated, appended = stats.appended, "upsert");
        Ok(stats)
    }

    /// Append activities not yet present, keyed by activity id. Existing
    /// rows are never rewritten; a logged activity is treated as final.
    pub fn upsert_activities(
        &self,
        store: &mut dyn TabStore,
        activities: &[ActivityEntry],
    ) -> Result<UpsertStats> {
        let header = self.schema.activity_headers();
        store.write_header_if_absent(Tab::Activities, &header)?;

        let rows = store.read_rows(Tab::Activities)?;
        let mut known: HashSet<i64> = rows
            .iter()
            .skip(1)
            .filter_map(|r| r.first().and_then(|s| s.trim().parse().ok()))
            .collect();

        let mut appends: Vec<Row> = Vec::new();
        for act in activities {
            if known.insert(act.activity_id) {
                appends.push(self.schema.activity_row(act));
            }
        }

        let stats = UpsertStats {
            updated: 0,
            appended: appends.len(),
        };
        store.append_rows(Tab::Activities, &appends)?;
        Ok(stats)
    }

    /// Upsert monthly aggregates, keyed by "YYYY-MM" month.
    pub fn upsert_monthly(
        &self,
        store: &mut dyn TabStore,
        monthly: &[MonthlyRecord],
    ) -> Result<UpsertStats> {
        let tab = Tab::MonthlyAverages;
        let header = self.schema.headers(tab);
        store.write_header_if_absent(tab, &header)?;

        let rows = store.read_rows(tab)?;
        let mut index: HashMap<NaiveDate, usize> = HashMap::new();
        for (i, row) in rows.iter().enumerate().skip(1) {
            if let Some(month) = row.first().and_then(|s| normalize_month_key(s)) {
                // Keep-last on duplicate keys already present in the tab.
                index.insert(month, i);
            }
        }

        let mut updates: Vec<(usize, Row)> = Vec::new();
        let mut appends: Vec<Row> = Vec::new();
        for m in monthly {
            let row = self.schema.monthly_row(m);
            match index.get(&m.month) {
                Some(idx) => updates.push((*idx, row)),
                None => appends.push(row),
            }
        }

        let stats = UpsertStats {
            updated: updates.len(),
            appended: appends.len(),
        };
        store.update_rows(tab, &updates)?;
        store.append_rows(tab, &appends)?;
        Ok(stats)
    }

    /// Drop rows older than `cutoff`. The header and rows whose date cell
    /// does not parse are retained. Returns the number removed.
    pub fn prune(&self, store: &mut dyn TabStore, tab: Tab, cutoff: NaiveDate) -> Result<usize> {
        // The activities tab is keyed by id; its date sits one column over.
        let date_col = if tab == Tab::Activities { 1 } else { 0 };
        let rows = store.read_rows(tab)?;
        if rows.is_empty() {
            return Ok(0);
        }
        let mut kept: Vec<Row> = Vec::with_capacity(rows.len());
        kept.push(rows[0].clone());
        let mut removed = 0;
        for row in rows.into_iter().skip(1) {
            match row.get(date_col).and_then(|s| normalize_date_key(s)) {
                Some(date) if date < cutoff => removed += 1,
                _ => kept.push(row),
            }
        }
        if removed > 0 {
            store.rewrite(tab, &kept)?;
            debug!(?tab, removed, "pruned rows");
        }
        Ok(removed)
    }
}

/// Map existing rows by normalized date key. On duplicate keys the last
/// row wins, so stale duplicates are overwritten rather than multiplied.
fn date_key_index(rows: &[Row]) -> HashMap<NaiveDate, usize> {
    let mut index = HashMap::new();
    for (i, row) in rows.iter().enumerate().skip(1) {
        if let Some(date) = row.first().and_then(|s| normalize_date_key(s)) {
            index.insert(date, i);
        }
    }
    index
}

/// Normalize a key cell to a date. Accepts ISO dates, slash formats, and
/// bare spreadsheet serial numbers (days since 1899-12-30), which some
/// destinations substitute for the date text they were given.
pub fn normalize_date_key(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(serial) = raw.parse::<f64>() {
        if serial >= SERIAL_FLOOR {
            let (y, m, d) = SERIAL_EPOCH;
            return NaiveDate::from_ymd_opt(y, m, d)?
                .checked_add_days(Days::new(serial.trunc() as u64));
        }
        return None;
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }
    None
}

/// Normalize a month key to the first day of the month.
pub fn normalize_month_key(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d") {
        return Some(date);
    }
    normalize_date_key(raw).and_then(|d| d.with_day(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn rec(day: u32, stress: f64) -> DailyRecord {
        let mut r = DailyRecord::date_only(d(day));
        r.average_stress = Some(stress);
        r
    }

    #[test]
    fn test_normalize_date_key_formats() {
        assert_eq!(normalize_date_key("2024-03-01"), Some(d(1)));
        assert_eq!(normalize_date_key(" 2024-03-01 "), Some(d(1)));
        assert_eq!(normalize_date_key("03/01/2024"), Some(d(1)));
        assert_eq!(normalize_date_key("2024/03/01"), Some(d(1)));
        assert_eq!(normalize_date_key("garbage"), None);
        assert_eq!(normalize_date_key(""), None);
    }

    #[test]
    fn test_normalize_serial_number_key() {
        // 45352 days after 1899-12-30 is 2024-03-01.
        assert_eq!(normalize_date_key("45352"), Some(d(1)));
        // Datetime serials carry a fraction; the day part wins.
        assert_eq!(normalize_date_key("45352.75"), Some(d(1)));
        // Small numbers are not plausible dates.
        assert_eq!(normalize_date_key("35"), None);
    }

    #[test]
    fn test_upsert_appends_then_updates() {
        let engine = UpsertEngine::new(Schema::v1());
        let mut store = MemoryStore::new();

        let stats = engine
            .upsert_daily(&mut store, Tab::Stress, &[rec(1, 30.0), rec(2, 40.0)])
            .unwrap();
        assert_eq!(stats, UpsertStats { updated: 0, appended: 2 });

        // Re-sync with one changed value: both rows update, nothing appends.
        let stats = engine
            .upsert_daily(&mut store, Tab::Stress, &[rec(1, 35.0), rec(2, 40.0)])
            .unwrap();
        assert_eq!(stats, UpsertStats { updated: 2, appended: 0 });

        let rows = store.rows(Tab::Stress);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][1], "35");
    }

    #[test]
    fn test_upsert_matches_serial_rendered_keys() {
        let engine = UpsertEngine::new(Schema::v1());
        let mut store = MemoryStore::new();
        let header = Schema::v1().headers(Tab::Stress);
        let mut serial_row: Row = vec!["45352".to_string()];
        serial_row.resize(header.len(), String::new());
        store.rewrite(Tab::Stress, &[header, serial_row]).unwrap();

        let stats = engine
            .upsert_daily(&mut store, Tab::Stress, &[rec(1, 50.0)])
            .unwrap();
        assert_eq!(stats, UpsertStats { updated: 1, appended: 0 });
        assert_eq!(store.rows(Tab::Stress).len(), 2);
    }

    #[test]
    fn test_duplicate_existing_keys_keep_last() {
        let engine = UpsertEngine::new(Schema::v1());
        let mut store = MemoryStore::new();
        let header = Schema::v1().headers(Tab::Stress);
        let width = header.len();
        let mk = |key: &str| {
            let mut r: Row = vec![key.to_string()];
            r.resize(width, String::new());
            r
        };
        store
            .rewrite(
                Tab::Stress,
                &[header, mk("2024-03-01"), mk("2024-03-01")],
            )
            .unwrap();

        engine
            .upsert_daily(&mut store, Tab::Stress, &[rec(1, 44.0)])
            .unwrap();
        let rows = store.rows(Tab::Stress);
        // Last duplicate got the update, first is untouched.
        assert_eq!(rows[1][1], "");
        assert_eq!(rows[2][1], "44");
    }

    #[test]
    fn test_activities_append_once() {
        let engine = UpsertEngine::new(Schema::v1());
        let mut store = MemoryStore::new();
        let act = |id: i64, name: &str| ActivityEntry {
            activity_id: id,
            date: d(1),
            name: Some(name.to_string()),
            ..Default::default()
        };

        let stats = engine
            .upsert_activities(&mut store, &[act(1, "Run"), act(2, "Ride")])
            .unwrap();
        assert_eq!(stats.appended, 2);

        // Known ids are skipped even if the payload changed.
        let stats = engine
            .upsert_activities(&mut store, &[act(1, "Renamed"), act(3, "Swim")])
            .unwrap();
        assert_eq!(stats.appended, 1);

        let rows = store.rows(Tab::Activities);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1][4], "Run");
    }

    #[test]
    fn test_monthly_upsert_by_month_key() {
        let engine = UpsertEngine::new(Schema::v1());
        let mut store = MemoryStore::new();
        let monthly = MonthlyRecord {
            month: d(1),
            days: 10,
            record: rec(1, 33.0),
        };

        engine.upsert_monthly(&mut store, &[monthly.clone()]).unwrap();
        let stats = engine.upsert_monthly(&mut store, &[monthly]).unwrap();
        assert_eq!(stats, UpsertStats { updated: 1, appended: 0 });
        assert_eq!(store.rows(Tab::MonthlyAverages).len(), 2);
        assert_eq!(store.rows(Tab::MonthlyAverages)[1][0], "2024-03");
    }

    #[test]
    fn test_prune_retains_header_and_unparseable() {
        let engine = UpsertEngine::new(Schema::v1());
        let mut store = MemoryStore::new();
        let mk = |key: &str| vec![key.to_string()];
        store
            .rewrite(
                Tab::Sleep,
                &[
                    mk("Date"),
                    mk("2023-01-01"),
                    mk("2024-03-01"),
                    mk("not-a-date"),
                ],
            )
            .unwrap();

        let removed = engine.prune(&mut store, Tab::Sleep, d(1)).unwrap();
        assert_eq!(removed, 1);
        let rows = store.rows(Tab::Sleep);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][0], "not-a-date");
    }

    #[test]
    fn test_prune_activities_by_date_column() {
        let engine = UpsertEngine::new(Schema::v1());
        let mut store = MemoryStore::new();
        let old = ActivityEntry {
            activity_id: 900_000_001,
            date: NaiveDate::from_ymd_opt(2023, 1, 5).unwrap(),
            ..Default::default()
        };
        let recent = ActivityEntry {
            activity_id: 900_000_002,
            date: d(1),
            ..Default::default()
        };
        engine
            .upsert_activities(&mut store, &[old, recent])
            .unwrap();

        let removed = engine.prune(&mut store, Tab::Activities, d(1)).unwrap();
        assert_eq!(removed, 1);
        // The large numeric id in column 0 must not be read as a date.
        let rows = store.rows(Tab::Activities);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "900000002");
    }

    #[test]
    fn test_prune_noop_leaves_store_untouched() {
        let engine = UpsertEngine::new(Schema::v1());
        let mut store = MemoryStore::new();
        store
            .rewrite(Tab::Sleep, &[vec!["Date".to_string()]])
            .unwrap();
        let removed = engine.prune(&mut store, Tab::Sleep, d(1)).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_month_key_normalization() {
        assert_eq!(
            normalize_month_key("2024-03"),
            Some(d(1))
        );
        let from_date = normalize_month_key("2024-03-15").unwrap();
        assert_eq!(from_date.day(), 1);
    }
}
