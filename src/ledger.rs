//! The historical ledger: CSV persistence, reconciliation and backups.
//!
//! Rows read from disk keep their original cell text. Only rows produced by
//! a run are formatted from numbers, so rewriting the ledger leaves history
//! it did not replace exactly as it was.

use crate::error::{Result, TradeHistoryError};
use crate::schema::*;
use crate::utils::{coerce_numeric, format_count};
use chrono::Local;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub(crate) const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Cell text of a row as read from disk, in `LEDGER_COLUMNS` order.
type SourceCells = Vec<String>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    records: Vec<TradeRecord>,
    source: Vec<Option<SourceCells>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub removed: usize,
    pub appended: usize,
    pub total: usize,
}

impl Ledger {
    pub fn new(records: Vec<TradeRecord>) -> Self {
        let source = vec![None; records.len()];
        Self { records, source }
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn years(&self) -> BTreeSet<i32> {
        self.records.iter().map(|r| r.year).collect()
    }

    /// Rows matching one (year, month, direction) generation.
    pub fn count_period(&self, year: i32, month: u32, direction: Direction) -> usize {
        self.records
            .iter()
            .filter(|r| r.period() == (year, month, direction))
            .count()
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TradeHistoryError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Ledger file not found: {}", path.display()),
            )));
        }
        let ledger = Self::from_reader(fs::File::open(path)?)?;
        info!(
            "Read {}: {} records",
            path.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
            format_count(ledger.len())
        );
        info!("Years in ledger: {:?}", ledger.years());
        Ok(ledger)
    }

    /// Parses a ledger. Numeric cells are coerced for aggregation; the text
    /// each row was read with is what gets written back.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let content = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();

        let missing: Vec<String> = REQUIRED_LEDGER_COLUMNS
            .iter()
            .filter(|c| !index.contains_key(*c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(TradeHistoryError::MissingLedgerColumns(missing));
        }

        let mut records = Vec::new();
        let mut source: Vec<Option<SourceCells>> = Vec::new();
        let mut coerced = 0usize;

        for result in csv_reader.records() {
            let row = result?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            let field = |name: &str| cell(&row, &index, name).trim();

            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }

            let year = parse_integer(field("Year"), "Year", line)? as i32;
            let month = parse_integer(field("Month"), "Month", line)? as u32;
            if !(1..=12).contains(&month) {
                return Err(TradeHistoryError::LedgerParse {
                    line,
                    details: format!("Month {} outside 1-12", month),
                });
            }
            let direction =
                Direction::parse(field("Direction")).map_err(|e| TradeHistoryError::LedgerParse {
                    line,
                    details: e.to_string(),
                })?;

            let mut number = |name: &str| {
                let parsed = coerce_numeric(field(name));
                if parsed.was_coerced {
                    coerced += 1;
                }
                parsed.value
            };
            let value = number("Value");
            let quantity = number("Quantity");
            let revenue = match field("Revenue") {
                "" => None,
                _ => Some(number("Revenue")),
            };

            let unit = match field("Unit") {
                "" => DEFAULT_UNIT.to_string(),
                u => u.to_string(),
            };

            records.push(TradeRecord {
                year,
                month,
                direction,
                commodity_code: field("HS_Code").to_string(),
                country: field("Country").to_string(),
                value,
                quantity,
                unit,
                revenue,
            });
            source.push(Some(
                LEDGER_COLUMNS
                    .iter()
                    .map(|name| cell(&row, &index, name).to_string())
                    .collect(),
            ));
        }

        if coerced > 0 {
            debug!("Coerced {} non-numeric ledger cells to zero for aggregation", coerced);
        }

        Ok(Self { records, source })
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_rows(&self.records, &self.source, fs::File::create(path)?)?;
        log_saved(path, "Updated ledger", self.len())
    }
}

fn cell<'r>(row: &'r csv::StringRecord, index: &HashMap<&str, usize>, name: &str) -> &'r str {
    index
        .get(name)
        .and_then(|&i| row.get(i))
        .unwrap_or("")
}

fn parse_integer(raw: &str, column: &str, line: u64) -> Result<i64> {
    raw.parse::<i64>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && v.fract() == 0.0)
                .map(|v| v as i64)
        })
        .ok_or_else(|| TradeHistoryError::LedgerParse {
            line,
            details: format!("{} '{}' is not an integer", column, raw),
        })
}

fn format_record(r: &TradeRecord) -> SourceCells {
    vec![
        r.year.to_string(),
        r.month.to_string(),
        r.direction.code().to_string(),
        r.commodity_code.clone(),
        r.country.clone(),
        r.value.to_string(),
        r.quantity.to_string(),
        r.unit.clone(),
        r.revenue.map(|v| v.to_string()).unwrap_or_default(),
    ]
}

/// Writes records in ledger column order. Revenue is included only when any
/// Import row is present, and left blank on Export rows.
pub fn write_records<W: Write>(records: &[TradeRecord], writer: W) -> Result<()> {
    write_rows(records, &[], writer)
}

/// Rows with source cells are written from that text, the rest from their
/// values.
fn write_rows<W: Write>(
    records: &[TradeRecord],
    source: &[Option<SourceCells>],
    mut writer: W,
) -> Result<()> {
    writer.write_all(UTF8_BOM)?;
    let columns = ledger_columns(records);

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(columns)?;

    for (idx, record) in records.iter().enumerate() {
        match source.get(idx).and_then(Option::as_ref) {
            Some(cells) => csv_writer.write_record(cells.iter().take(columns.len()))?,
            None => csv_writer.write_record(format_record(record).iter().take(columns.len()))?,
        }
    }

    csv_writer.flush()?;
    Ok(())
}

fn log_saved(path: &Path, description: &str, count: usize) -> Result<()> {
    let size_mb = fs::metadata(path)?.len() as f64 / 1024.0 / 1024.0;
    info!(
        "Saved {} to {} ({} records, {:.2} MB)",
        description,
        path.display(),
        format_count(count),
        size_mb
    );
    Ok(())
}

pub fn write_records_csv(records: &[TradeRecord], path: &Path, description: &str) -> Result<()> {
    write_records(records, fs::File::create(path)?)?;
    log_saved(path, description, records.len())
}

/// Appends `new_rows` to the ledger. In replace mode every ledger row sharing
/// a (year, month, direction) with `new_rows` is removed first.
pub fn reconcile(
    ledger: &Ledger,
    new_rows: &[TradeRecord],
    replace_existing: bool,
) -> (Ledger, ReconcileSummary) {
    let periods: BTreeSet<(i32, u32, Direction)> = if replace_existing {
        new_rows.iter().map(TradeRecord::period).collect()
    } else {
        BTreeSet::new()
    };

    for &(year, month, direction) in &periods {
        let count = ledger.count_period(year, month, direction);
        if count > 0 {
            info!(
                "Removed {} {} records for Year={}, Month={}",
                format_count(count),
                direction,
                year,
                month
            );
        }
    }

    let (mut records, mut source): (Vec<TradeRecord>, Vec<Option<SourceCells>>) = ledger
        .records
        .iter()
        .zip(&ledger.source)
        .filter(|(r, _)| !periods.contains(&r.period()))
        .map(|(r, cells)| (r.clone(), cells.clone()))
        .unzip();

    let removed = ledger.len() - records.len();
    let before = records.len();
    records.extend(new_rows.iter().cloned());
    source.resize(records.len(), None);

    let summary = ReconcileSummary {
        removed,
        appended: new_rows.len(),
        total: records.len(),
    };
    info!(
        "Appended {} new records ({} -> {})",
        format_count(summary.appended),
        format_count(before),
        format_count(summary.total)
    );

    (Ledger { records, source }, summary)
}

/// Copies `path` to `<stem>_backup_<timestamp>.csv` beside it and keeps only
/// the `keep` most recent backups. A missing file is skipped with a warning.
pub fn backup_file(path: &Path, keep: usize) -> Result<Option<PathBuf>> {
    if !path.exists() {
        warn!("Cannot back up {}: file not found", path.display());
        return Ok(None);
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("ledger");
    let timestamp = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();

    let mut backup_path = parent.join(format!("{}_backup_{}.csv", stem, timestamp));
    let mut suffix = 1;
    while backup_path.exists() {
        backup_path = parent.join(format!("{}_backup_{}_{}.csv", stem, timestamp, suffix));
        suffix += 1;
    }

    fs::copy(path, &backup_path)?;
    info!("Created backup: {}", backup_path.display());

    let pattern = format!(
        "{}/{}_backup_*.csv",
        glob::Pattern::escape(&parent.to_string_lossy()),
        glob::Pattern::escape(stem)
    );
    let mut backups: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in glob::glob(&pattern)? {
        let backup = entry.map_err(glob::GlobError::into_error)?;
        backups.push((fs::metadata(&backup)?.modified()?, backup));
    }
    backups.sort_by(|a, b| b.cmp(a));

    for (_, old) in backups.into_iter().skip(keep) {
        fs::remove_file(&old)?;
        info!("Removed old backup: {}", old.display());
    }

    Ok(Some(backup_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(year: i32, month: u32, direction: Direction, code: &str, value: f64) -> TradeRecord {
        TradeRecord {
            year,
            month,
            direction,
            commodity_code: code.to_string(),
            country: "IN".to_string(),
            value,
            quantity: 1.0,
            unit: "kg".to_string(),
            revenue: direction.carries_revenue().then_some(value / 10.0),
        }
    }

    fn sample_ledger() -> Ledger {
        Ledger::new(vec![
            record(2081, 4, Direction::Import, "1001", 100.0),
            record(2081, 5, Direction::Import, "1001", 50.0),
            record(2081, 5, Direction::Export, "2001", 70.0),
        ])
    }

    #[test]
    fn test_reconcile_replace_is_idempotent() {
        let ledger = sample_ledger();
        let new_rows = vec![
            record(2081, 6, Direction::Import, "1001", 250.0),
            record(2081, 6, Direction::Import, "1002", 10.0),
        ];

        let (once, first) = reconcile(&ledger, &new_rows, true);
        let (twice, second) = reconcile(&once, &new_rows, true);

        assert_eq!(first.removed, 0);
        assert_eq!(second.removed, 2);
        assert_eq!(twice.count_period(2081, 6, Direction::Import), 2);
        assert_eq!(twice.len(), ledger.len() + new_rows.len());
        assert_eq!(twice, once);
    }

    #[test]
    fn test_reconcile_replace_only_touches_matching_direction() {
        let ledger = sample_ledger();
        let new_rows = vec![record(2081, 5, Direction::Import, "1001", 60.0)];
        let (updated, summary) = reconcile(&ledger, &new_rows, true);

        assert_eq!(summary.removed, 1);
        assert_eq!(updated.count_period(2081, 5, Direction::Export), 1);
        assert_eq!(updated.count_period(2081, 5, Direction::Import), 1);
        assert_eq!(updated.len(), 3);
    }

    #[test]
    fn test_reconcile_append_mode_duplicates() {
        let ledger = sample_ledger();
        let new_rows = vec![record(2081, 5, Direction::Import, "1001", 60.0)];
        let (updated, summary) = reconcile(&ledger, &new_rows, false);
        assert_eq!(summary.removed, 0);
        assert_eq!(updated.count_period(2081, 5, Direction::Import), 2);
    }

    #[test]
    fn test_csv_round_trip_keeps_column_order() {
        let ledger = sample_ledger();
        let mut buffer = Vec::new();
        write_records(ledger.records(), &mut buffer).unwrap();

        let text = String::from_utf8(buffer.clone()).unwrap();
        let header = text.trim_start_matches('\u{feff}').lines().next().unwrap();
        assert_eq!(
            header,
            "Year,Month,Direction,HS_Code,Country,Value,Quantity,Unit,Revenue"
        );
        assert!(text.lines().any(|l| l == "2081,5,E,2001,IN,70,1,kg,"));

        let back = Ledger::from_reader(buffer.as_slice()).unwrap();
        assert_eq!(back.records(), ledger.records());
    }

    #[test]
    fn test_untouched_rows_are_written_back_verbatim() {
        let csv = "Year,Month,Direction,HS_Code,Country,Value,Quantity,Unit,Revenue\n\
                   2080,7,I,9999,CN,12.50,,,\n\
                   2080,8,E,8888,US,n/a,3,kg,\n\
                   2081,4,I,1001,IN,\"1,200\",2.0,kg,7\n";
        let ledger = Ledger::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(ledger.records()[0].quantity, 0.0);
        assert_eq!(ledger.records()[0].unit, DEFAULT_UNIT);
        assert_eq!(ledger.records()[1].value, 0.0);
        assert_eq!(ledger.records()[2].value, 1200.0);

        let new_rows = vec![record(2081, 4, Direction::Export, "2001", 70.0)];
        let (updated, summary) = reconcile(&ledger, &new_rows, true);
        assert_eq!(summary.removed, 0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.csv");
        updated.write_csv(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(
            lines,
            vec![
                "Year,Month,Direction,HS_Code,Country,Value,Quantity,Unit,Revenue",
                "2080,7,I,9999,CN,12.50,,,",
                "2080,8,E,8888,US,n/a,3,kg,",
                "2081,4,I,1001,IN,\"1,200\",2.0,kg,7",
                "2081,4,E,2001,IN,70,1,kg,",
            ]
        );
    }

    #[test]
    fn test_replaced_rows_lose_their_source_text() {
        let csv = "Year,Month,Direction,HS_Code,Country,Value\n\
                   2081,5,I,1001,IN,50.00\n";
        let ledger = Ledger::from_reader(csv.as_bytes()).unwrap();
        let new_rows = vec![record(2081, 5, Direction::Import, "1001", 60.0)];
        let (updated, _) = reconcile(&ledger, &new_rows, true);

        let mut buffer = Vec::new();
        write_rows(updated.records(), &updated.source, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(!text.contains("50.00"));
        assert!(text.lines().any(|l| l == "2081,5,I,1001,IN,60,1,kg,6"));
    }

    #[test]
    fn test_export_only_output_has_no_revenue_column() {
        let records = vec![record(2081, 5, Direction::Export, "2001", 70.0)];
        let mut buffer = Vec::new();
        write_records(&records, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(!text.contains("Revenue"));
    }

    #[test]
    fn test_missing_columns_are_reported() {
        let csv = "Year,Month,HS_Code,Value\n2081,4,1001,10\n";
        match Ledger::from_reader(csv.as_bytes()) {
            Err(TradeHistoryError::MissingLedgerColumns(cols)) => {
                assert_eq!(cols, vec!["Direction".to_string(), "Country".to_string()]);
            }
            other => panic!("expected MissingLedgerColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_columns_default() {
        let csv = "\u{feff}Year,Month,Direction,HS_Code,Country,Value\n\
                   2081.0,4,Import,1001,IN,1,234\n\
                   2081,5,E,2001,US,abc\n";
        let ledger = Ledger::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(ledger.len(), 2);
        let first = &ledger.records()[0];
        assert_eq!(first.year, 2081);
        assert_eq!(first.direction, Direction::Import);
        assert_eq!(first.value, 1.0);
        assert_eq!(first.unit, DEFAULT_UNIT);
        assert_eq!(first.quantity, 0.0);
        assert_eq!(first.revenue, None);
        assert_eq!(ledger.records()[1].value, 0.0);
    }

    #[test]
    fn test_bad_direction_reports_line() {
        let csv = "Year,Month,Direction,HS_Code,Country,Value\n2081,4,X,1001,IN,1\n";
        assert!(matches!(
            Ledger::from_reader(csv.as_bytes()),
            Err(TradeHistoryError::LedgerParse { line: 2, .. })
        ));
    }

    #[test]
    fn test_backup_prunes_old_copies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.csv");
        fs::write(&path, "Year\n").unwrap();

        for i in 0..4 {
            let stale = dir.path().join(format!("done_backup_2000010{}_000000.csv", i));
            fs::write(&stale, "old").unwrap();
        }

        let backup = backup_file(&path, 2).unwrap().unwrap();
        assert!(backup.exists());

        let remaining = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("done_backup_"))
            .count();
        assert_eq!(remaining, 2);
    }

    #[test]
    fn test_backups_in_quick_succession_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.csv");
        fs::write(&path, "first").unwrap();
        let first = backup_file(&path, 5).unwrap().unwrap();
        fs::write(&path, "second").unwrap();
        let second = backup_file(&path, 5).unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "first");
        assert_eq!(fs::read_to_string(&second).unwrap(), "second");
    }

    #[test]
    fn test_backup_pruning_ignores_other_stems() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.csv");
        fs::write(&path, "Year\n").unwrap();
        let other = dir.path().join("updateddone_backup_20000101_000000.csv");
        fs::write(&other, "other").unwrap();

        backup_file(&path, 0).unwrap();
        assert!(other.exists());
    }

    #[test]
    fn test_backup_of_missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(backup_file(&dir.path().join("absent.csv"), 5).unwrap().is_none());
    }
}
