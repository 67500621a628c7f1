//! Destination stores for tab-shaped rows.
//!
//! A destination is a set of named tabs, each a grid of string cells with a
//! header row. `CsvFolderStore` maps each tab to one CSV file in a folder
//! and writes atomically (temp file + rename), so readers never observe a
//! half-written file. `MemoryStore` backs tests.
//!
//! The upsert engine batches its work so each tab sees at most one
//! `update_rows` and one `append_rows` call per sync pass.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::schema::Tab;

/// A grid row. Row 0 of a tab is the header.
pub type Row = Vec<String>;

/// Tab-shaped destination store. Row indices are 0-based over the whole
/// grid, header included.
pub trait TabStore {
    /// Read all rows of a tab. A missing tab reads as empty.
    fn read_rows(&self, tab: Tab) -> Result<Vec<Row>>;

    /// Ensure the tab exists and starts with the given header row. An
    /// existing non-empty tab is left untouched.
    fn write_header_if_absent(&mut self, tab: Tab, header: &[String]) -> Result<()>;

    /// Overwrite existing rows in place, one batch per sync pass.
    fn update_rows(&mut self, tab: Tab, updates: &[(usize, Row)]) -> Result<()>;

    /// Append new rows after the last existing row, one batch per pass.
    fn append_rows(&mut self, tab: Tab, rows: &[Row]) -> Result<()>;

    /// Replace the whole tab (used by pruning).
    fn rewrite(&mut self, tab: Tab, rows: &[Row]) -> Result<()>;
}

/// One CSV file per tab inside a folder.
pub struct CsvFolderStore {
    dir: PathBuf,
}

impl CsvFolderStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| SyncError::store(format!("failed to create output dir: {}", e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn tab_path(&self, tab: Tab) -> PathBuf {
        self.dir.join(tab.file_name())
    }

    fn load(&self, tab: Tab) -> Result<Vec<Row>> {
        let path = self.tab_path(tab);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| SyncError::store(format!("failed to read {}: {}", path.display(), e)))?;
        Ok(parse_csv(&text))
    }

    fn save(&self, tab: Tab, rows: &[Row]) -> Result<()> {
        let path = self.tab_path(tab);
        let tmp = path.with_extension("csv.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(|e| {
                SyncError::store(format!("failed to create {}: {}", tmp.display(), e))
            })?;
            for row in rows {
                writeln!(file, "{}", encode_csv_row(row))
                    .map_err(|e| SyncError::store(format!("failed to write row: {}", e)))?;
            }
            file.flush()
                .map_err(|e| SyncError::store(format!("failed to flush: {}", e)))?;
        }
        fs::rename(&tmp, &path).map_err(|e| {
            SyncError::store(format!("failed to replace {}: {}", path.display(), e))
        })
    }
}

impl TabStore for CsvFolderStore {
    fn read_rows(&self, tab: Tab) -> Result<Vec<Row>> {
        self.load(tab)
    }

    fn write_header_if_absent(&mut self, tab: Tab, header: &[String]) -> Result<()> {
        let rows = self.load(tab)?;
        if rows.is_empty() {
            self.save(tab, &[header.to_vec()])?;
        }
        Ok(())
    }

    fn update_rows(&mut self, tab: Tab, updates: &[(usize, Row)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut rows = self.load(tab)?;
        for (idx, row) in updates {
            if *idx >= rows.len() {
                return Err(SyncError::store(format!(
                    "update index {} out of range for {:?} ({} rows)",
                    idx,
                    tab,
                    rows.len()
                )));
            }
            rows[*idx] = row.clone();
        }
        self.save(tab, &rows)
    }

    fn append_rows(&mut self, tab: Tab, new_rows: &[Row]) -> Result<()> {
        if new_rows.is_empty() {
            return Ok(());
        }
        let mut rows = self.load(tab)?;
        rows.extend(new_rows.iter().cloned());
        self.save(tab, &rows)
    }

    fn rewrite(&mut self, tab: Tab, rows: &[Row]) -> Result<()> {
        self.save(tab, rows)
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tabs: HashMap<Tab, Vec<Row>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, tab: Tab) -> &[Row] {
        self.tabs.get(&tab).map(|r| r.as_slice()).unwrap_or(&[])
    }
}

impl TabStore for MemoryStore {
    fn read_rows(&self, tab: Tab) -> Result<Vec<Row>> {
        Ok(self.tabs.get(&tab).cloned().unwrap_or_default())
    }

    fn write_header_if_absent(&mut self, tab: Tab, header: &[String]) -> Result<()> {
        let rows = self.tabs.entry(tab).or_default();
        if rows.is_empty() {
            rows.push(header.to_vec());
        }
        Ok(())
    }

    fn update_rows(&mut self, tab: Tab, updates: &[(usize, Row)]) -> Result<()> {
        let rows = self.tabs.entry(tab).or_default();
        for (idx, row) in updates {
            if *idx >= rows.len() {
                return Err(SyncError::store(format!(
                    "update index {} out of range",
                    idx
                )));
            }
            rows[*idx] = row.clone();
        }
        Ok(())
    }

    fn append_rows(&mut self, tab: Tab, new_rows: &[Row]) -> Result<()> {
        self.tabs
            .entry(tab)
            .or_default()
            .extend(new_rows.iter().cloned());
        Ok(())
    }

    fn rewrite(&mut self, tab: Tab, rows: &[Row]) -> Result<()> {
        self.tabs.insert(tab, rows.to_vec());
        Ok(())
    }
}

/// Quote a field per RFC 4180 when it holds a comma, quote, or newline.
fn encode_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn encode_csv_row(row: &[String]) -> String {
    row.iter()
        .map(|f| encode_csv_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Minimal RFC 4180 reader handling quoted fields, escaped quotes, and
/// newlines inside quotes. Trailing empty line is not a row.
fn parse_csv(text: &str) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut row: Row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut field));
            }
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_csv_round_trip_with_quoting() {
        let original = vec![
            row(&["Date", "Name", "Notes"]),
            row(&["2024-03-01", "Morning Run, easy", "said \"ok\""]),
            row(&["2024-03-02", "", "line\nbreak"]),
        ];
        let text = original
            .iter()
            .map(|r| encode_csv_row(r))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(parse_csv(&text), original);
    }

    #[test]
    fn test_parse_csv_ignores_trailing_newline() {
        assert_eq!(parse_csv("a,b\n"), vec![row(&["a", "b"])]);
        assert_eq!(parse_csv(""), Vec::<Row>::new());
    }

    #[test]
    fn test_missing_tab_reads_empty() {
        let temp = TempDir::new().unwrap();
        let store = CsvFolderStore::open(temp.path()).unwrap();
        assert!(store.read_rows(Tab::Sleep).unwrap().is_empty());
    }

    #[test]
    fn test_header_written_once() {
        let temp = TempDir::new().unwrap();
        let mut store = CsvFolderStore::open(temp.path()).unwrap();
        let header = row(&["Date", "Sleep Score"]);

        store.write_header_if_absent(Tab::Sleep, &header).unwrap();
        store
            .append_rows(Tab::Sleep, &[row(&["2024-03-01", "80"])])
            .unwrap();
        // Second call must not reset the tab.
        store.write_header_if_absent(Tab::Sleep, &header).unwrap();

        let rows = store.read_rows(Tab::Sleep).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], header);
    }

    #[test]
    fn test_update_and_append() {
        let temp = TempDir::new().unwrap();
        let mut store = CsvFolderStore::open(temp.path()).unwrap();
        store
            .rewrite(
                Tab::Stress,
                &[row(&["Date", "Stress Score"]), row(&["2024-03-01", "30"])],
            )
            .unwrap();

        store
            .update_rows(Tab::Stress, &[(1, row(&["2024-03-01", "35"]))])
            .unwrap();
        store
            .append_rows(Tab::Stress, &[row(&["2024-03-02", "40"])])
            .unwrap();

        let rows = store.read_rows(Tab::Stress).unwrap();
        assert_eq!(rows[1][1], "35");
        assert_eq!(rows[2][0], "2024-03-02");
    }

    #[test]
    fn test_update_out_of_range_is_error() {
        let temp = TempDir::new().unwrap();
        let mut store = CsvFolderStore::open(temp.path()).unwrap();
        let err = store
            .update_rows(Tab::Sleep, &[(5, row(&["x"]))])
            .unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let mut store = CsvFolderStore::open(temp.path()).unwrap();
        store
            .rewrite(Tab::Sleep, &[row(&["Date"]), row(&["2024-03-01"])])
            .unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }
}
