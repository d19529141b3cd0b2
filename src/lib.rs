//! # Trade History Builder
//!
//! A library for converting cumulative fiscal-year-to-date trade tables into
//! monthly increments and reconciling them into a historical ledger.
//!
//! ## Core Concepts
//!
//! - **Cumulative Data**: Totals from the fiscal year start (month 4) through the reporting month
//! - **Ledger**: The durable history of monthly records, one generation per (year, month, direction)
//! - **Window**: Ledger rows that sum to "cumulative through the previous month"
//! - **Monthly Delta**: Current cumulative minus previous cumulative, per commodity and country
//! - **Replace Mode**: Re-running a month replaces its rows instead of duplicating them
//!
//! ## Example
//!
//! ```rust,ignore
//! use trade_history_builder::*;
//! use std::path::Path;
//!
//! let processor = TradeHistoryProcessor::new(PipelineConfig::default())?;
//! let report = processor.run(Path::new("data/FTS_uptoAsoj_208283.xlsx"), Path::new("data/done.csv"))?;
//!
//! println!(
//!     "{} monthly rows for {}/{}, ledger now {} rows",
//!     report.monthly_rows, report.metadata.year, report.metadata.target_month, report.reconcile.total
//! );
//! ```

pub mod calendar;
pub mod columns;
pub mod composer;
pub mod config;
pub mod country;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metadata;
pub mod reader;
pub mod schema;
pub mod utils;
pub mod window;

pub use calendar::{
    month_name, previous_fiscal_month, MonthNameResolver, MonthNameStrategy, FISCAL_START_MONTH,
};
pub use columns::{CanonicalField, ColumnMap};
pub use composer::{combine_cumulative, validate_monthly, CumulativeTableRow, MonthlyTable};
pub use config::PipelineConfig;
pub use country::CountryResolver;
pub use engine::{CumulativeSnapshot, DeltaCalculator};
pub use error::{Result, TradeHistoryError};
pub use ledger::{backup_file, reconcile, Ledger, ReconcileSummary};
pub use metadata::MetadataExtractor;
pub use reader::{open_source, Cell, CumulativeReader, DelimitedDocument, SourceDocument, Workbook};
pub use schema::*;
pub use utils::*;
pub use window::{previous_cumulative_window, select_window, WindowRule};

use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Cumulative tables read from one source document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CumulativeInput {
    pub import: Option<Vec<CumulativeRow>>,
    pub export: Option<Vec<CumulativeRow>>,
}

impl CumulativeInput {
    pub fn get(&self, direction: Direction) -> Option<&[CumulativeRow]> {
        match direction {
            Direction::Import => self.import.as_deref(),
            Direction::Export => self.export.as_deref(),
        }
    }
}

/// In-memory result of one period: the monthly table and the reconciled ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodOutcome {
    pub monthly: MonthlyTable,
    pub ledger: Ledger,
    pub summary: ReconcileSummary,
    pub unresolved_countries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub metadata: FiscalMetadata,
    pub monthly_rows: usize,
    pub import_rows: usize,
    pub export_rows: usize,
    pub reconcile: ReconcileSummary,
    pub unresolved_countries: usize,
    pub monthly_path: PathBuf,
    pub ledger_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub cumulative_path: Option<PathBuf>,
}

pub struct TradeHistoryProcessor {
    config: PipelineConfig,
    extractor: MetadataExtractor,
}

impl TradeHistoryProcessor {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            extractor: MetadataExtractor::new()?,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full run against files. Nothing is written unless metadata, source
    /// tables and ledger all load; the monthly file is written first, then the
    /// input ledger is backed up, then the reconciled ledger is written.
    pub fn run(&self, source_path: &Path, ledger_path: &Path) -> Result<RunReport> {
        info!("Processing trade source: {}", source_path.display());

        let mut document = open_source(source_path, self.config.header_scan_rows)?;
        let header = document.header_text(self.config.header_scan_rows)?;
        let metadata = self.extractor.extract(&header, document.file_stem())?;

        let input = self.read_cumulative(document.as_mut())?;

        let ledger = Ledger::read_csv(ledger_path)?;
        let (monthly, unresolved_countries) = compute_monthly(&metadata, &input, &ledger)?;

        let out_dir = ledger_path.parent().unwrap_or_else(|| Path::new("."));
        let monthly_path = out_dir.join(&self.config.monthly_file_name);
        monthly.write_csv(&monthly_path)?;

        let cumulative_path = match &self.config.cumulative_file_name {
            Some(name) => {
                let rows = combine_cumulative(
                    input.get(Direction::Import),
                    input.get(Direction::Export),
                )?;
                let path = out_dir.join(name);
                composer::write_cumulative_csv(&rows, &path)?;
                Some(path)
            }
            None => None,
        };

        let backup_path = backup_file(ledger_path, self.config.backup_count)?;

        let (updated, summary) =
            reconcile(&ledger, &monthly.records, self.config.replace_existing);
        let output_path = out_dir.join(&self.config.ledger_output_name);
        updated.write_csv(&output_path)?;

        let report = RunReport {
            metadata,
            monthly_rows: monthly.len(),
            import_rows: count_direction(&monthly, Direction::Import),
            export_rows: count_direction(&monthly, Direction::Export),
            reconcile: summary,
            unresolved_countries,
            monthly_path,
            ledger_path: output_path,
            backup_path,
            cumulative_path,
        };
        debug!("Run report: {:?}", report);
        Ok(report)
    }

    pub fn read_cumulative(&self, document: &mut dyn SourceDocument) -> Result<CumulativeInput> {
        let reader = CumulativeReader::new(self.config.header_scan_rows);
        let import = reader.read(
            document,
            Direction::Import,
            self.config.keywords(Direction::Import),
        )?;
        let export = reader.read(
            document,
            Direction::Export,
            self.config.keywords(Direction::Export),
        )?;

        if import.is_none() && export.is_none() {
            return Err(TradeHistoryError::NoSourceData(
                "failed to read import and export data".to_string(),
            ));
        }

        Ok(CumulativeInput { import, export })
    }
}

fn count_direction(monthly: &MonthlyTable, direction: Direction) -> usize {
    monthly
        .records
        .iter()
        .filter(|r| r.direction == direction)
        .count()
}

/// Window selection, per-direction deltas and composition, without touching
/// the ledger. Returns the monthly table and the number of countries the
/// resolver could not map.
pub fn compute_monthly(
    metadata: &FiscalMetadata,
    input: &CumulativeInput,
    ledger: &Ledger,
) -> Result<(MonthlyTable, usize)> {
    if input.import.is_none() && input.export.is_none() {
        return Err(TradeHistoryError::NoSourceData(
            "no import or export table supplied".to_string(),
        ));
    }

    let window = previous_cumulative_window(ledger.records(), metadata)?;
    if window.is_empty() {
        warn!(
            "No ledger data for Year={} through Month={}",
            metadata.year, metadata.previous_month
        );
    }

    let calculator = DeltaCalculator::new(metadata.year, metadata.target_month);
    let mut resolver = CountryResolver::default();
    let mut per_direction = Vec::with_capacity(2);

    for direction in Direction::ALL {
        let deltas = match input.get(direction) {
            Some(rows) => calculator.delta(rows, &window, direction, &mut resolver),
            None => Vec::new(),
        };
        if deltas.is_empty() {
            warn!("{}", TradeHistoryError::EmptyDeltaResult(direction));
        }
        per_direction.push(deltas);
    }

    let export = per_direction.pop().unwrap_or_default();
    let import = per_direction.pop().unwrap_or_default();

    let combined = MonthlyTable::combine(import, export)?;
    let monthly = MonthlyTable {
        records: validate_monthly(combined.records),
    };

    if resolver.unresolved_count() > 0 {
        warn!(
            "{} country names could not be mapped to ISO-2 codes",
            resolver.unresolved_count()
        );
    }

    Ok((monthly, resolver.unresolved_count()))
}

/// In-memory equivalent of a run from the point the source has been read.
pub fn process_period(
    metadata: &FiscalMetadata,
    import: Option<&[CumulativeRow]>,
    export: Option<&[CumulativeRow]>,
    ledger: &Ledger,
    replace_existing: bool,
) -> Result<PeriodOutcome> {
    let input = CumulativeInput {
        import: import.map(<[CumulativeRow]>::to_vec),
        export: export.map(<[CumulativeRow]>::to_vec),
    };
    let (monthly, unresolved_countries) = compute_monthly(metadata, &input, ledger)?;
    let (ledger, summary) = reconcile(ledger, &monthly.records, replace_existing);

    Ok(PeriodOutcome {
        monthly,
        ledger,
        summary,
        unresolved_countries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(target_month: u32) -> FiscalMetadata {
        FiscalMetadata {
            year: 2081,
            start_month: 4,
            end_month: target_month,
            target_month,
            previous_month: previous_fiscal_month(target_month),
        }
    }

    fn ledger_row(month: u32, direction: Direction, value: f64) -> TradeRecord {
        TradeRecord {
            year: 2081,
            month,
            direction,
            commodity_code: "1001".to_string(),
            country: "IN".to_string(),
            value,
            quantity: 0.0,
            unit: "kg".to_string(),
            revenue: direction.carries_revenue().then_some(0.0),
        }
    }

    fn cumulative(code: &str, country: &str, value: f64) -> CumulativeRow {
        CumulativeRow {
            commodity_code: code.to_string(),
            description: None,
            country: country.to_string(),
            value,
            quantity: 0.0,
            unit: "kg".to_string(),
            revenue: Some(0.0),
        }
    }

    #[test]
    fn test_process_period_subtracts_window() {
        let ledger = Ledger::new(vec![
            ledger_row(4, Direction::Import, 100.0),
            ledger_row(5, Direction::Import, 50.0),
        ]);
        let import = vec![cumulative("1001", "India", 400.0)];

        let outcome = process_period(&metadata(6), Some(import.as_slice()), None, &ledger, true).unwrap();

        assert_eq!(outcome.monthly.len(), 1);
        let row = &outcome.monthly.records[0];
        assert_eq!((row.year, row.month, row.direction), (2081, 6, Direction::Import));
        assert_eq!(row.value, 250.0);
        assert_eq!(outcome.summary.appended, 1);
        assert_eq!(outcome.ledger.len(), 3);
    }

    #[test]
    fn test_process_period_twice_keeps_one_generation() {
        let ledger = Ledger::new(vec![ledger_row(4, Direction::Import, 100.0)]);
        let import = vec![
            cumulative("1001", "IN", 300.0),
            cumulative("1002", "CN", 20.0),
        ];

        let first = process_period(&metadata(5), Some(import.as_slice()), None, &ledger, true).unwrap();
        let second =
            process_period(&metadata(5), Some(import.as_slice()), None, &first.ledger, true).unwrap();

        assert_eq!(second.ledger.count_period(2081, 5, Direction::Import), 2);
        assert_eq!(second.ledger, first.ledger);
    }

    #[test]
    fn test_process_period_requires_some_source() {
        let result = process_period(&metadata(6), None, None, &Ledger::default(), true);
        assert!(matches!(result, Err(TradeHistoryError::NoSourceData(_))));
    }

    #[test]
    fn test_process_period_nothing_moved() {
        let ledger = Ledger::new(vec![ledger_row(4, Direction::Import, 100.0)]);
        let import = vec![cumulative("1001", "IN", 100.0)];
        let result = process_period(&metadata(5), Some(import.as_slice()), None, &ledger, true);
        assert!(matches!(result, Err(TradeHistoryError::NothingToCombine)));
    }

    #[test]
    fn test_processor_rejects_invalid_config() {
        let config = PipelineConfig {
            header_scan_rows: 0,
            ..Default::default()
        };
        assert!(TradeHistoryProcessor::new(config).is_err());
    }
}
