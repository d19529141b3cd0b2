use crate::schema::Direction;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TradeHistoryError {
    #[error("Could not extract fiscal metadata: {0}")]
    MetadataNotFound(String),

    #[error("No cumulative source data: {0}")]
    NoSourceData(String),

    #[error("Ledger is missing required columns: {}", .0.join(", "))]
    MissingLedgerColumns(Vec<String>),

    #[error("No positive monthly records for {0}")]
    EmptyDeltaResult(Direction),

    #[error("No data to combine: both import and export are empty")]
    NothingToCombine,

    #[error("Invalid fiscal month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Invalid trade direction '{0}': expected I/E or Import/Export")]
    InvalidDirection(String),

    #[error("Unsupported source file: {0}")]
    UnsupportedSource(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Ledger parse error on line {line}: {details}")]
    LedgerParse { line: u64, details: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Backup pattern error: {0}")]
    BackupPattern(#[from] glob::PatternError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TradeHistoryError>;
