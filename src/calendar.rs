//! Fiscal calendar arithmetic and month-name vocabulary.
//!
//! The source fiscal year numbers its months 1-12 but opens at month 4
//! (Shrawan) and closes at month 3 (Ashad). Months 1-3 are therefore the
//! final quarter of the fiscal year, not its start.

use crate::error::{Result, TradeHistoryError};
use log::debug;

pub const FISCAL_START_MONTH: u32 = 4;

/// Canonical 12-entry vocabulary, index 0 = month 1.
pub const MONTH_NAMES: [&str; 12] = [
    "Baishakh", "Jestha", "Ashad", "Shrawan", "Bhadra", "Ashwin", "Kartik", "Mangsir", "Poush",
    "Magh", "Falgun", "Chaitra",
];

/// Known alternate spellings seen in published headers.
pub const ALTERNATE_SPELLINGS: [(&str, u32); 16] = [
    ("asoj", 6),
    ("aswin", 6),
    ("baisakh", 1),
    ("jeth", 2),
    ("asar", 3),
    ("asadh", 3),
    ("saun", 4),
    ("sawan", 4),
    ("bhadau", 5),
    ("kattik", 7),
    ("mansir", 8),
    ("marga", 8),
    ("push", 9),
    ("phagun", 11),
    ("fagun", 11),
    ("chait", 12),
];

pub fn validate_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(TradeHistoryError::InvalidMonth(month));
    }
    Ok(())
}

/// The month before `month`, wrapping 1 back to 12.
pub fn previous_fiscal_month(month: u32) -> u32 {
    if month == 1 {
        12
    } else {
        month - 1
    }
}

pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get(month.checked_sub(1)? as usize).copied()
}

/// One tier of month-name resolution.
pub trait MonthNameStrategy {
    fn name(&self) -> &'static str;
    fn resolve(&self, cleaned: &str) -> Option<u32>;
}

pub struct ExactName;

impl MonthNameStrategy for ExactName {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn resolve(&self, cleaned: &str) -> Option<u32> {
        MONTH_NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(cleaned))
            .map(|idx| idx as u32 + 1)
    }
}

/// Either name is a prefix of the other, or the first four characters agree.
pub struct PrefixMatch;

impl MonthNameStrategy for PrefixMatch {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn resolve(&self, cleaned: &str) -> Option<u32> {
        if cleaned.len() < 3 {
            return None;
        }
        MONTH_NAMES
            .iter()
            .position(|name| {
                let lower = name.to_ascii_lowercase();
                let head: String = lower.chars().take(4).collect();
                lower.starts_with(cleaned) || cleaned.starts_with(&head)
            })
            .map(|idx| idx as u32 + 1)
    }
}

pub struct AlternateSpelling;

impl MonthNameStrategy for AlternateSpelling {
    fn name(&self) -> &'static str {
        "alternate"
    }

    fn resolve(&self, cleaned: &str) -> Option<u32> {
        if cleaned.len() < 3 {
            return None;
        }
        ALTERNATE_SPELLINGS
            .iter()
            .find(|(variant, _)| cleaned.contains(variant) || variant.contains(cleaned))
            .map(|(_, month)| *month)
    }
}

/// Ordered chain of strategies; the first one that resolves wins.
pub struct MonthNameResolver {
    strategies: Vec<Box<dyn MonthNameStrategy + Send + Sync>>,
}

impl Default for MonthNameResolver {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(ExactName),
                Box::new(PrefixMatch),
                Box::new(AlternateSpelling),
            ],
        }
    }
}

impl MonthNameResolver {
    pub fn resolve(&self, raw: &str) -> Option<u32> {
        let cleaned = raw.trim().to_lowercase();
        if cleaned.is_empty() {
            return None;
        }
        for strategy in &self.strategies {
            if let Some(month) = strategy.resolve(&cleaned) {
                debug!("Resolved month '{}' -> {} ({})", raw, month, strategy.name());
                return Some(month);
            }
        }
        None
    }

    /// Regex alternation matching any token this resolver can plausibly accept:
    /// every canonical name by its 4-letter stem, plus each alternate spelling.
    pub fn token_pattern(&self) -> String {
        let mut parts: Vec<String> = MONTH_NAMES
            .iter()
            .map(|name| {
                let head: String = name.to_ascii_lowercase().chars().take(4).collect();
                format!("{}[a-z]*", regex::escape(&head))
            })
            .collect();
        let mut alternates: Vec<&str> = ALTERNATE_SPELLINGS.iter().map(|(v, _)| *v).collect();
        alternates.sort_by_key(|v| std::cmp::Reverse(v.len()));
        parts.extend(alternates.iter().map(|v| format!("{}[a-z]*", regex::escape(v))));
        parts.join("|")
    }
}
