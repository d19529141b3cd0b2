use crate::calendar::{validate_month, FISCAL_START_MONTH};
use crate::error::Result;
use crate::schema::{Direction, FiscalMetadata, TradeRecord};
use log::debug;

/// Which fiscal months of the target year make up "cumulative through the
/// previous month".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRule {
    /// Cutoff in months 4..=12: one range from the fiscal start.
    Contiguous { through: u32 },
    /// Cutoff in months 1..=3: months 4..=12 plus 1..=through.
    Wrapped { through: u32 },
}

impl WindowRule {
    pub fn for_previous_month(previous_month: u32) -> Result<Self> {
        validate_month(previous_month)?;
        if previous_month >= FISCAL_START_MONTH {
            Ok(WindowRule::Contiguous {
                through: previous_month,
            })
        } else {
            Ok(WindowRule::Wrapped {
                through: previous_month,
            })
        }
    }

    pub fn contains(&self, month: u32) -> bool {
        match *self {
            WindowRule::Contiguous { through } => (FISCAL_START_MONTH..=through).contains(&month),
            WindowRule::Wrapped { through } => {
                (FISCAL_START_MONTH..=12).contains(&month) || (1..=through).contains(&month)
            }
        }
    }
}

/// Ledger rows for `year` whose month falls inside the window ending at
/// `previous_month`. An empty result is valid.
pub fn select_window(
    records: &[TradeRecord],
    year: i32,
    previous_month: u32,
) -> Result<Vec<&TradeRecord>> {
    let rule = WindowRule::for_previous_month(previous_month)?;
    let window: Vec<&TradeRecord> = records
        .iter()
        .filter(|r| r.year == year && rule.contains(r.month))
        .collect();

    debug!(
        "Selected {} ledger rows for year {} through month {} ({:?})",
        window.len(),
        year,
        previous_month,
        rule
    );
    Ok(window)
}

/// Window for a run. A report ending in the fiscal start month opens a new
/// fiscal year, so nothing precedes it.
pub fn previous_cumulative_window<'a>(
    records: &'a [TradeRecord],
    metadata: &FiscalMetadata,
) -> Result<Vec<&'a TradeRecord>> {
    if metadata.target_month == FISCAL_START_MONTH {
        debug!("Target month opens fiscal year {}; no previous cumulative", metadata.year);
        return Ok(Vec::new());
    }
    select_window(records, metadata.year, metadata.previous_month)
}

pub fn filter_direction<'a>(
    window: &[&'a TradeRecord],
    direction: Direction,
) -> Vec<&'a TradeRecord> {
    window
        .iter()
        .copied()
        .filter(|r| r.direction == direction)
        .collect()
}
