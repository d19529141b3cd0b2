//! Declarative mapping from raw source headers to canonical fields.
//!
//! Each field owns an ordered list of predicates over the normalized header.
//! Fields are resolved in table order and every column is claimed at most once.

use crate::utils::normalize_header;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CanonicalField {
    CommodityCode,
    CommodityDescription,
    Country,
    Unit,
    Quantity,
    Value,
    Revenue,
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CanonicalField::CommodityCode => "HS_Code",
            CanonicalField::CommodityDescription => "Commodity",
            CanonicalField::Country => "Country",
            CanonicalField::Unit => "Unit",
            CanonicalField::Quantity => "Quantity",
            CanonicalField::Value => "Value",
            CanonicalField::Revenue => "Revenue",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderPredicate {
    Exact(&'static str),
    Contains(&'static str),
    /// Contains the first needle but not the second.
    ContainsExcept(&'static str, &'static str),
}

impl HeaderPredicate {
    pub fn matches(&self, normalized: &str) -> bool {
        match self {
            HeaderPredicate::Exact(s) => normalized == *s,
            HeaderPredicate::Contains(s) => normalized.contains(s),
            HeaderPredicate::ContainsExcept(s, not) => {
                normalized.contains(s) && !normalized.contains(not)
            }
        }
    }
}

pub struct FieldRule {
    pub field: CanonicalField,
    pub predicates: &'static [HeaderPredicate],
}

use HeaderPredicate::{Contains, ContainsExcept, Exact};

pub const TRADE_COLUMN_RULES: &[FieldRule] = &[
    FieldRule {
        field: CanonicalField::CommodityCode,
        predicates: &[
            Contains("hscode"),
            Exact("hs"),
            Exact("code"),
            ContainsExcept("code", "countr"),
        ],
    },
    FieldRule {
        field: CanonicalField::Country,
        predicates: &[
            Contains("countr"),
            Contains("partner"),
            Contains("origin"),
            Contains("destination"),
        ],
    },
    FieldRule {
        field: CanonicalField::Revenue,
        predicates: &[Contains("revenue"), Contains("duty")],
    },
    FieldRule {
        field: CanonicalField::Quantity,
        predicates: &[Contains("quantity"), Exact("qty"), Contains("qty")],
    },
    FieldRule {
        field: CanonicalField::Value,
        predicates: &[
            Contains("value"),
            Contains("amount"),
            Contains("cif"),
            Contains("fob"),
        ],
    },
    FieldRule {
        field: CanonicalField::Unit,
        predicates: &[Exact("unit"), Exact("uom"), Contains("unit")],
    },
    FieldRule {
        field: CanonicalField::CommodityDescription,
        predicates: &[
            Contains("description"),
            Contains("commodity"),
            Contains("goods"),
            Contains("item"),
        ],
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    positions: BTreeMap<CanonicalField, usize>,
}

impl ColumnMap {
    pub fn resolve(headers: &[String]) -> Self {
        Self::resolve_with(headers, TRADE_COLUMN_RULES)
    }

    pub fn resolve_with(headers: &[String], rules: &[FieldRule]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut claimed = vec![false; normalized.len()];
        let mut positions = BTreeMap::new();

        for rule in rules {
            let found = rule.predicates.iter().find_map(|predicate| {
                normalized.iter().enumerate().position(|(idx, header)| {
                    !claimed[idx] && !header.is_empty() && predicate.matches(header)
                })
            });

            if let Some(idx) = found {
                claimed[idx] = true;
                positions.insert(rule.field, idx);
            }
        }

        Self { positions }
    }

    pub fn get(&self, field: CanonicalField) -> Option<usize> {
        self.positions.get(&field).copied()
    }

    pub fn has(&self, field: CanonicalField) -> bool {
        self.positions.contains_key(&field)
    }

    pub fn missing(&self, required: &[CanonicalField]) -> Vec<CanonicalField> {
        required.iter().copied().filter(|f| !self.has(*f)).collect()
    }
}
