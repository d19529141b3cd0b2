use crate::error::{Result, TradeHistoryError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column order of both serialized artifacts. Downstream consumers key off
/// position, so this order is a compatibility surface.
pub static LEDGER_COLUMNS: [&str; 9] = [
    "Year",
    "Month",
    "Direction",
    "HS_Code",
    "Country",
    "Value",
    "Quantity",
    "Unit",
    "Revenue",
];

/// Column set for a batch of records: `Revenue` is written only when an
/// Import row is present.
pub fn ledger_columns<'a>(
    records: impl IntoIterator<Item = &'a TradeRecord>,
) -> &'static [&'static str] {
    if records.into_iter().any(|r| r.direction.carries_revenue()) {
        &LEDGER_COLUMNS
    } else {
        &LEDGER_COLUMNS[..LEDGER_COLUMNS.len() - 1]
    }
}

/// Columns the window selector cannot work without.
pub const REQUIRED_LEDGER_COLUMNS: [&str; 6] =
    ["Year", "Month", "Direction", "HS_Code", "Country", "Value"];

pub const DEFAULT_UNIT: &str = "pcs";
pub const UNKNOWN_COUNTRY: &str = "Unknown";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema)]
pub enum Direction {
    #[serde(rename = "I")]
    #[schemars(description = "Goods entering the country. Import rows also carry customs revenue.")]
    Import,

    #[serde(rename = "E")]
    #[schemars(description = "Goods leaving the country.")]
    Export,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Import, Direction::Export];

    pub fn code(self) -> &'static str {
        match self {
            Direction::Import => "I",
            Direction::Export => "E",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Import => "import",
            Direction::Export => "export",
        }
    }

    pub fn carries_revenue(self) -> bool {
        matches!(self, Direction::Import)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "i" | "import" => Ok(Direction::Import),
            "e" | "export" => Ok(Direction::Export),
            _ => Err(TradeHistoryError::InvalidDirection(raw.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `commodity_code|country`, unique within one aggregation scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey {
    pub commodity_code: String,
    pub country: String,
}

impl CompositeKey {
    pub fn new(commodity_code: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            commodity_code: commodity_code.into(),
            country: country.into(),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.commodity_code, self.country)
    }
}

/// One monthly record, both in the ledger and in freshly computed deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TradeRecord {
    #[serde(rename = "Year")]
    #[schemars(description = "Fiscal year (e.g. 2082), not the Gregorian year")]
    pub year: i32,

    #[serde(rename = "Month")]
    #[schemars(description = "Fiscal month 1-12. Month 4 opens the fiscal year; months 1-3 close it.")]
    pub month: u32,

    #[serde(rename = "Direction")]
    pub direction: Direction,

    #[serde(rename = "HS_Code")]
    pub commodity_code: String,

    #[serde(rename = "Country")]
    #[schemars(description = "ISO-2 code, or one of the sentinels Unknown / Many / Not_Specified")]
    pub country: String,

    #[serde(rename = "Value")]
    pub value: f64,

    #[serde(rename = "Quantity")]
    pub quantity: f64,

    #[serde(rename = "Unit")]
    pub unit: String,

    #[serde(rename = "Revenue", default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Customs revenue, present only for Import records")]
    pub revenue: Option<f64>,
}

impl TradeRecord {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.commodity_code.clone(), self.country.clone())
    }

    pub fn period(&self) -> (i32, u32, Direction) {
        (self.year, self.month, self.direction)
    }
}

/// A row of a fiscal-year-to-date table as read from the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeRow {
    pub commodity_code: String,
    pub description: Option<String>,
    pub country: String,
    pub value: f64,
    pub quantity: f64,
    pub unit: String,
    pub revenue: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FiscalMetadata {
    pub year: i32,
    pub start_month: u32,
    pub end_month: u32,
    pub target_month: u32,
    pub previous_month: u32,
}

impl TradeRecord {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(TradeRecord)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = TradeRecord::schema_as_json().unwrap();
        assert!(schema_json.contains("HS_Code"));
        assert!(schema_json.contains("Direction"));
        assert!(schema_json.contains("Revenue"));
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!(Direction::parse("I").unwrap(), Direction::Import);
        assert_eq!(Direction::parse(" export ").unwrap(), Direction::Export);
        assert!(Direction::parse("X").is_err());
        assert_eq!(Direction::Export.code(), "E");
    }

    #[test]
    fn test_composite_key_display() {
        let key = CompositeKey::new("1001", "IN");
        assert_eq!(key.to_string(), "1001|IN");
    }

    #[test]
    fn test_record_serialization_uses_ledger_names() {
        let record = TradeRecord {
            year: 2081,
            month: 6,
            direction: Direction::Export,
            commodity_code: "2001".to_string(),
            country: "US".to_string(),
            value: 200.0,
            quantity: 20.0,
            unit: "pcs".to_string(),
            revenue: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"Direction\":\"E\""));
        assert!(!json.contains("Revenue"));

        let back: TradeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);

        let import = TradeRecord {
            direction: Direction::Import,
            revenue: Some(1.0),
            ..record.clone()
        };
        assert_eq!(ledger_columns([&record]).len(), 8);
        assert_eq!(ledger_columns([&record, &import]).last(), Some(&"Revenue"));
        assert_eq!(ledger_columns(&[] as &[TradeRecord]).len(), 8);
    }
}
