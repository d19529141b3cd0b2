use crate::calendar::{month_name, previous_fiscal_month, MonthNameResolver};
use crate::error::{Result, TradeHistoryError};
use crate::schema::FiscalMetadata;
use log::{debug, info, warn};
use regex::Regex;

const FISCAL_YEAR_PATTERNS: [&str; 4] = [
    r"(?i)FY\s*(\d{4})\s*/\s*\d{2}",
    r"(?i)FY\s*(\d{4})\s*[-–]\s*\d{2}",
    r"(\d{4})/\d{2}",
    r"(\d{4})[-–]\d{2}",
];

const FILENAME_YEAR_PATTERNS: [&str; 2] = [r"(\d{4})(\d{2})", r"(\d{4})"];

const MIN_FILENAME_YEAR: i32 = 2000;
const MAX_FILENAME_YEAR: i32 = 2100;

/// Derives fiscal year and the reporting month range from a document's
/// header text, falling back to the file name for the year only.
pub struct MetadataExtractor {
    year_patterns: Vec<Regex>,
    range_patterns: Vec<Regex>,
    filename_patterns: Vec<Regex>,
    months: MonthNameResolver,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| TradeHistoryError::ConfigError(format!("bad pattern '{}': {}", pattern, e)))
}

impl MetadataExtractor {
    pub fn new() -> Result<Self> {
        Self::with_resolver(MonthNameResolver::default())
    }

    pub fn with_resolver(months: MonthNameResolver) -> Result<Self> {
        let token = months.token_pattern();
        // Parenthesised form first: headers usually wrap the range.
        let range_sources = [
            format!(r"(?i)\(\s*({token})\s*[-–—]\s*({token})\s*\)"),
            format!(r"(?i)\b({token})\s*[-–—]\s*({token})\b"),
            format!(r"(?i)\b({token})\s+to\s+({token})\b"),
            format!(r"(?i)({token})\s*[-–—]\s*({token})"),
        ];

        Ok(Self {
            year_patterns: FISCAL_YEAR_PATTERNS
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_>>()?,
            range_patterns: range_sources
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_>>()?,
            filename_patterns: FILENAME_YEAR_PATTERNS
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_>>()?,
            months,
        })
    }

    pub fn extract(&self, header_text: &str, file_stem: &str) -> Result<FiscalMetadata> {
        let year = match self.parse_fiscal_year(header_text) {
            Some(year) => Some(year),
            None => self.year_from_filename(file_stem),
        };

        let range = self.parse_month_range(header_text);

        match (year, range) {
            (Some(year), Some((start_month, end_month))) => {
                let target_month = end_month;
                let previous_month = previous_fiscal_month(target_month);
                info!(
                    "Extracted metadata: Year={}, Months={}-{}, Target={} ({}), Previous={}",
                    year,
                    start_month,
                    end_month,
                    target_month,
                    month_name(target_month).unwrap_or("?"),
                    previous_month
                );
                Ok(FiscalMetadata {
                    year,
                    start_month,
                    end_month,
                    target_month,
                    previous_month,
                })
            }
            (None, _) => Err(TradeHistoryError::MetadataNotFound(format!(
                "no fiscal year in header or file name '{}'",
                file_stem
            ))),
            (_, None) => Err(TradeHistoryError::MetadataNotFound(format!(
                "no month range in header of '{}'",
                file_stem
            ))),
        }
    }

    /// First matching pattern wins; no plausibility check beyond shape.
    pub fn parse_fiscal_year(&self, header_text: &str) -> Option<i32> {
        for pattern in &self.year_patterns {
            if let Some(caps) = pattern.captures(header_text) {
                if let Ok(year) = caps[1].parse::<i32>() {
                    debug!("Extracted year {} using pattern {}", year, pattern.as_str());
                    return Some(year);
                }
            }
        }
        warn!(
            "Could not extract fiscal year from header: {}",
            truncate(header_text, 100)
        );
        None
    }

    pub fn parse_month_range(&self, header_text: &str) -> Option<(u32, u32)> {
        for (idx, pattern) in self.range_patterns.iter().enumerate() {
            let Some(caps) = pattern.captures(header_text) else {
                continue;
            };
            let start_name = caps[1].trim();
            let end_name = caps[2].trim();

            match (self.months.resolve(start_name), self.months.resolve(end_name)) {
                (Some(start), Some(end)) => {
                    debug!(
                        "Extracted month range using pattern {}: {}({}) - {}({})",
                        idx + 1,
                        start_name,
                        start,
                        end_name,
                        end
                    );
                    return Some((start, end));
                }
                _ => debug!(
                    "Pattern {} matched but could not resolve '{}' or '{}'",
                    idx + 1,
                    start_name,
                    end_name
                ),
            }
        }
        warn!(
            "Could not extract month range from header: {}",
            truncate(header_text, 150)
        );
        None
    }

    pub fn year_from_filename(&self, file_stem: &str) -> Option<i32> {
        for pattern in &self.filename_patterns {
            if let Some(caps) = pattern.captures(file_stem) {
                if let Ok(year) = caps[1].parse::<i32>() {
                    if (MIN_FILENAME_YEAR..=MAX_FILENAME_YEAR).contains(&year) {
                        debug!("Extracted year {} from file name", year);
                        return Some(year);
                    }
                }
            }
        }
        warn!("Could not extract year from file name: {}", file_stem);
        None
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
