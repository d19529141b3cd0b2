use crate::country::CountryResolver;
use crate::schema::*;
use crate::utils::{clean_commodity_code, format_count};
use crate::window::filter_direction;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub value: f64,
    pub quantity: f64,
    pub revenue: f64,
    pub unit: Option<String>,
}

/// Fiscal-year-to-date totals for one direction, one entry per composite key.
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeSnapshot {
    pub direction: Direction,
    entries: BTreeMap<CompositeKey, SnapshotEntry>,
}

impl CumulativeSnapshot {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            entries: BTreeMap::new(),
        }
    }

    /// Sums value, quantity and revenue into the key's entry; the first
    /// non-empty unit seen for a key is kept.
    pub fn add(&mut self, key: CompositeKey, value: f64, quantity: f64, revenue: f64, unit: &str) {
        let entry = self.entries.entry(key).or_insert(SnapshotEntry {
            value: 0.0,
            quantity: 0.0,
            revenue: 0.0,
            unit: None,
        });
        entry.value += value;
        entry.quantity += quantity;
        entry.revenue += revenue;
        if entry.unit.is_none() && !unit.trim().is_empty() {
            entry.unit = Some(unit.trim().to_string());
        }
    }

    /// Previous cumulative: the window's rows for this direction, summed.
    pub fn from_ledger(window: &[&TradeRecord], direction: Direction) -> Self {
        let rows = filter_direction(window, direction);
        let mut snapshot = Self::new(direction);

        if rows.is_empty() {
            warn!("No {} data in filtered ledger window", direction);
            return snapshot;
        }

        info!(
            "Calculating {} cumulative from {} records",
            direction,
            format_count(rows.len())
        );

        for record in rows {
            let key = CompositeKey::new(
                clean_commodity_code(&record.commodity_code),
                record.country.trim(),
            );
            snapshot.add(
                key,
                record.value,
                record.quantity,
                record.revenue.unwrap_or(0.0),
                &record.unit,
            );
        }

        snapshot.log_summary();
        snapshot
    }

    /// Current cumulative: source rows with countries resolved to ISO-2.
    pub fn from_rows(
        rows: &[CumulativeRow],
        direction: Direction,
        resolver: &mut CountryResolver,
    ) -> Self {
        let mut snapshot = Self::new(direction);
        for row in rows {
            let key = CompositeKey::new(
                clean_commodity_code(&row.commodity_code),
                resolver.resolve(&row.country),
            );
            snapshot.add(
                key,
                row.value,
                row.quantity,
                row.revenue.unwrap_or(0.0),
                &row.unit,
            );
        }
        snapshot.log_summary();
        snapshot
    }

    fn log_summary(&self) {
        info!(
            "Result: {} unique keys, total value: {:.2}",
            format_count(self.len()),
            self.total_value()
        );
    }

    pub fn get(&self, key: &CompositeKey) -> Option<&SnapshotEntry> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &CompositeKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CompositeKey, &SnapshotEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_value(&self) -> f64 {
        self.entries.values().map(|e| e.value).sum()
    }
}

pub struct DeltaCalculator {
    year: i32,
    target_month: u32,
}

impl DeltaCalculator {
    pub fn new(year: i32, target_month: u32) -> Self {
        Self { year, target_month }
    }

    /// Monthly rows for one direction. Empty when nothing moved.
    pub fn delta(
        &self,
        current_rows: &[CumulativeRow],
        previous_window: &[&TradeRecord],
        direction: Direction,
        resolver: &mut CountryResolver,
    ) -> Vec<TradeRecord> {
        info!("Calculating monthly {} values", direction);
        let previous = CumulativeSnapshot::from_ledger(previous_window, direction);
        let current = CumulativeSnapshot::from_rows(current_rows, direction, resolver);
        self.subtract(&current, &previous)
    }

    /// Current minus previous over the union of keys. A key survives only if
    /// its monthly value or quantity is positive.
    pub fn subtract(
        &self,
        current: &CumulativeSnapshot,
        previous: &CumulativeSnapshot,
    ) -> Vec<TradeRecord> {
        let direction = current.direction;
        if previous.is_empty() {
            info!("No previous month data available");
        }

        let keys: BTreeSet<&CompositeKey> = current.keys().chain(previous.keys()).collect();
        let mut records = Vec::new();
        let mut dropped = 0usize;

        for key in keys {
            let cur = current.get(key);
            let prev = previous.get(key);
            let monthly_value = side(cur, |e| e.value) - side(prev, |e| e.value);
            let monthly_quantity = side(cur, |e| e.quantity) - side(prev, |e| e.quantity);

            if !(monthly_value > 0.0 || monthly_quantity > 0.0) {
                dropped += 1;
                continue;
            }

            let unit = cur
                .and_then(|e| e.unit.clone())
                .or_else(|| prev.and_then(|e| e.unit.clone()))
                .unwrap_or_else(|| DEFAULT_UNIT.to_string());

            let revenue = if direction.carries_revenue() {
                Some(side(cur, |e| e.revenue) - side(prev, |e| e.revenue))
            } else {
                None
            };

            records.push(TradeRecord {
                year: self.year,
                month: self.target_month,
                direction,
                commodity_code: key.commodity_code.clone(),
                country: key.country.clone(),
                value: monthly_value,
                quantity: monthly_quantity,
                unit,
                revenue,
            });
        }

        if records.is_empty() {
            debug!("All {} {} keys filtered as zero/negative", dropped, direction);
            return records;
        }

        let total: f64 = records.iter().map(|r| r.value).sum();
        info!(
            "Result: {} records (filtered {} zero/negative), total: {:.2}",
            format_count(records.len()),
            format_count(dropped),
            total
        );
        records
    }
}

fn side(entry: Option<&SnapshotEntry>, field: fn(&SnapshotEntry) -> f64) -> f64 {
    entry.map(field).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn row(code: &str, country: &str, value: f64, quantity: f64, revenue: Option<f64>) -> CumulativeRow {
        CumulativeRow {
            commodity_code: code.to_string(),
            description: None,
            country: country.to_string(),
            value,
            quantity,
            unit: "kg".to_string(),
            revenue,
        }
    }

    fn ledger(month: u32, code: &str, country: &str, value: f64, quantity: f64) -> TradeRecord {
        TradeRecord {
            year: 2081,
            month,
            direction: Direction::Import,
            commodity_code: code.to_string(),
            country: country.to_string(),
            value,
            quantity,
            unit: "kg".to_string(),
            revenue: Some(value / 10.0),
        }
    }

    #[test]
    fn test_snapshot_keys_are_unique() {
        let rows = vec![
            row("1001", "India", 100.0, 1.0, Some(5.0)),
            row("1001.0", "IN", 50.0, 2.0, Some(5.0)),
            row("1001", "China", 10.0, 1.0, None),
        ];
        let mut resolver = CountryResolver::default();
        let snapshot = CumulativeSnapshot::from_rows(&rows, Direction::Import, &mut resolver);

        assert_eq!(snapshot.len(), 2);
        let keys: HashSet<String> = snapshot.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys.len(), snapshot.len());

        let india = snapshot.get(&CompositeKey::new("1001", "IN")).unwrap();
        assert_eq!(india.value, 150.0);
        assert_eq!(india.quantity, 3.0);
        assert_eq!(india.revenue, 10.0);
    }

    #[test]
    fn test_unit_first_wins() {
        let mut snapshot = CumulativeSnapshot::new(Direction::Export);
        let key = CompositeKey::new("2001", "US");
        snapshot.add(key.clone(), 1.0, 1.0, 0.0, "");
        snapshot.add(key.clone(), 1.0, 1.0, 0.0, "kg");
        snapshot.add(key.clone(), 1.0, 1.0, 0.0, "ltr");
        assert_eq!(snapshot.get(&key).unwrap().unit.as_deref(), Some("kg"));
    }

    #[test]
    fn test_empty_previous_reproduces_current() {
        let rows = vec![
            row("1001", "IN", 100.0, 10.0, Some(5.0)),
            row("1001", "IN", 20.0, 0.0, Some(1.0)),
            row("2002", "CN", 30.0, 3.0, Some(2.0)),
        ];
        let calc = DeltaCalculator::new(2081, 4);
        let mut resolver = CountryResolver::default();
        let deltas = calc.delta(&rows, &[], Direction::Import, &mut resolver);

        let current = CumulativeSnapshot::from_rows(&rows, Direction::Import, &mut resolver);
        assert_eq!(deltas.len(), current.len());
        for record in &deltas {
            let entry = current.get(&record.key()).unwrap();
            assert_eq!(record.value, entry.value);
            assert_eq!(record.quantity, entry.quantity);
            assert_eq!(record.year, 2081);
            assert_eq!(record.month, 4);
        }
    }

    #[test]
    fn test_non_positive_rows_are_dropped() {
        let window_rows = vec![
            ledger(4, "1001", "IN", 150.0, 10.0),
            ledger(4, "2002", "CN", 100.0, 10.0),
            ledger(4, "3003", "US", 50.0, 5.0),
        ];
        let window: Vec<&TradeRecord> = window_rows.iter().collect();
        let rows = vec![
            row("1001", "IN", 400.0, 10.0, Some(40.0)),
            row("2002", "CN", 100.0, 10.0, Some(10.0)),
            row("3003", "US", 40.0, 5.0, Some(5.0)),
            row("4004", "JP", 0.0, 7.0, None),
        ];

        let calc = DeltaCalculator::new(2081, 5);
        let mut resolver = CountryResolver::default();
        let deltas = calc.delta(&rows, &window, Direction::Import, &mut resolver);

        assert!(deltas.iter().all(|r| r.value > 0.0 || r.quantity > 0.0));
        let codes: Vec<&str> = deltas.iter().map(|r| r.commodity_code.as_str()).collect();
        assert_eq!(codes, vec!["1001", "4004"]);
        assert_eq!(deltas[0].value, 250.0);
        assert_eq!(deltas[0].revenue, Some(25.0));
        assert_eq!(deltas[1].value, 0.0);
        assert_eq!(deltas[1].quantity, 7.0);
    }

    #[test]
    fn test_export_rows_carry_no_revenue() {
        let rows = vec![row("2001", "US", 300.0, 3.0, None)];
        let calc = DeltaCalculator::new(2081, 6);
        let mut resolver = CountryResolver::default();
        let deltas = calc.delta(&rows, &[], Direction::Export, &mut resolver);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].revenue, None);
        assert_eq!(deltas[0].direction, Direction::Export);
    }

    #[test]
    fn test_previous_unit_used_when_current_absent() {
        let mut current = CumulativeSnapshot::new(Direction::Import);
        current.add(CompositeKey::new("1001", "IN"), 10.0, 0.0, 0.0, "");
        let mut previous = CumulativeSnapshot::new(Direction::Import);
        previous.add(CompositeKey::new("1001", "IN"), 5.0, 0.0, 0.0, "ton");
        previous.add(CompositeKey::new("5005", "IN"), 5.0, 0.0, 0.0, "");

        let deltas = DeltaCalculator::new(2081, 6).subtract(&current, &previous);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].unit, "ton");

        current.add(CompositeKey::new("6006", "IN"), 1.0, 0.0, 0.0, "");
        let deltas = DeltaCalculator::new(2081, 6).subtract(&current, &previous);
        assert_eq!(deltas[1].unit, DEFAULT_UNIT);
    }

    #[test]
    fn test_both_sides_empty_yields_empty() {
        let calc = DeltaCalculator::new(2081, 6);
        let mut resolver = CountryResolver::default();
        assert!(calc.delta(&[], &[], Direction::Import, &mut resolver).is_empty());
    }
}
