use crate::error::{Result, TradeHistoryError};
use crate::ledger::{write_records_csv, UTF8_BOM};
use crate::schema::*;
use crate::utils::format_count;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Combined monthly rows for one run, imports first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyTable {
    pub records: Vec<TradeRecord>,
}

impl MonthlyTable {
    /// Fails with `NothingToCombine` when both directions are empty.
    pub fn combine(import: Vec<TradeRecord>, export: Vec<TradeRecord>) -> Result<Self> {
        if import.is_empty() && export.is_empty() {
            return Err(TradeHistoryError::NothingToCombine);
        }

        let mut records = import;
        records.extend(export);
        info!("Combined {} records", format_count(records.len()));
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_records_csv(&self.records, path, "Monthly data")
    }
}

/// Drops rows without a commodity code or country before they are written.
pub fn validate_monthly(records: Vec<TradeRecord>) -> Vec<TradeRecord> {
    let initial = records.len();
    let valid: Vec<TradeRecord> = records
        .into_iter()
        .filter(|r| !r.commodity_code.trim().is_empty() && !r.country.trim().is_empty())
        .collect();

    if valid.len() != initial {
        warn!("Removed {} invalid records", initial - valid.len());
    }
    info!("Validated: {} records", format_count(valid.len()));
    valid
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeTableRow {
    #[serde(rename = "HS_Code")]
    pub commodity_code: String,
    #[serde(rename = "Commodity")]
    pub description: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "Direction")]
    pub direction: Direction,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
    #[serde(rename = "Unit")]
    pub unit: String,
    #[serde(rename = "Revenue")]
    pub revenue: Option<f64>,
}

/// Direction-tagged union of both cumulative tables as read from the source.
pub fn combine_cumulative(
    import: Option<&[CumulativeRow]>,
    export: Option<&[CumulativeRow]>,
) -> Result<Vec<CumulativeTableRow>> {
    let tagged = [(Direction::Import, import), (Direction::Export, export)];
    let rows: Vec<CumulativeTableRow> = tagged
        .into_iter()
        .filter_map(|(direction, rows)| rows.map(|rows| (direction, rows)))
        .flat_map(|(direction, rows)| {
            rows.iter().map(move |row| CumulativeTableRow {
                commodity_code: row.commodity_code.clone(),
                description: row.description.clone().unwrap_or_default(),
                country: row.country.clone(),
                direction,
                value: row.value,
                quantity: row.quantity,
                unit: row.unit.clone(),
                revenue: row.revenue,
            })
        })
        .collect();

    if rows.is_empty() {
        return Err(TradeHistoryError::NothingToCombine);
    }

    info!("Created cumulative table: {} records", format_count(rows.len()));
    Ok(rows)
}

/// Written with the same UTF-8 BOM as the monthly and ledger files.
pub fn write_cumulative_csv(rows: &[CumulativeTableRow], path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM)?;
    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(
        "Saved cumulative data to {} ({} records)",
        path.display(),
        format_count(rows.len())
    );
    Ok(())
}
