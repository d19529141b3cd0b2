use crate::error::{Result, TradeHistoryError};
use crate::reader::DEFAULT_HEADER_SCAN_ROWS;
use crate::schema::Direction;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    /// Case-insensitive substrings identifying the import sheet.
    pub import_sheet_keywords: Vec<String>,

    /// Case-insensitive substrings identifying the export sheet.
    pub export_sheet_keywords: Vec<String>,

    /// Rows scanned for header text and for the column header row.
    pub header_scan_rows: usize,

    /// Monthly-only output, written beside the ledger.
    pub monthly_file_name: String,

    /// Reconciled ledger output, written beside the input ledger.
    pub ledger_output_name: String,

    /// When set, the combined cumulative snapshot is also written.
    pub cumulative_file_name: Option<String>,

    /// Delete existing rows for each (year, month, direction) before appending.
    pub replace_existing: bool,

    /// Timestamped ledger backups to keep.
    pub backup_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            import_sheet_keywords: vec!["4".into(), "import".into(), "table 4".into()],
            export_sheet_keywords: vec!["6".into(), "export".into(), "table 6".into()],
            header_scan_rows: DEFAULT_HEADER_SCAN_ROWS,
            monthly_file_name: "month.csv".to_string(),
            ledger_output_name: "updateddone.csv".to_string(),
            cumulative_file_name: None,
            replace_existing: true,
            backup_count: 5,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn keywords(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Import => &self.import_sheet_keywords,
            Direction::Export => &self.export_sheet_keywords,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for direction in Direction::ALL {
            let keywords = self.keywords(direction);
            if keywords.is_empty() || keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(TradeHistoryError::ConfigError(format!(
                    "{} sheet keywords must not be empty",
                    direction
                )));
            }
        }

        if self.header_scan_rows == 0 {
            return Err(TradeHistoryError::ConfigError(
                "header_scan_rows must be at least 1".to_string(),
            ));
        }

        for name in [&self.monthly_file_name, &self.ledger_output_name] {
            if name.trim().is_empty() {
                return Err(TradeHistoryError::ConfigError(
                    "output file names must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&schemars::schema_for!(PipelineConfig))
    }
}
