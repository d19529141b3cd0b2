//! Source documents and the cumulative table reader.
//!
//! A source is anything that exposes named sheets of cells: an Excel-family
//! workbook, or a delimited file carrying a `Direction` column which is split
//! into two virtual sheets named `import` and `export`.

use crate::columns::{CanonicalField, ColumnMap};
use crate::error::{Result, TradeHistoryError};
use crate::schema::{CumulativeRow, Direction, DEFAULT_UNIT, UNKNOWN_COUNTRY};
use crate::utils::{clean_commodity_code, coerce_numeric, format_count, normalize_header, Coerced};
use calamine::{open_workbook_auto, Data, Reader, Sheets};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const DEFAULT_HEADER_SCAN_ROWS: usize = 10;

const REQUIRED_FIELDS: [CanonicalField; 3] = [
    CanonicalField::CommodityCode,
    CanonicalField::Country,
    CanonicalField::Value,
];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => format_number(*n),
        }
    }

    pub fn to_number(&self) -> Coerced {
        match self {
            Cell::Number(n) if n.is_finite() => Coerced {
                value: *n,
                was_coerced: false,
            },
            Cell::Number(_) => Coerced {
                value: 0.0,
                was_coerced: true,
            },
            Cell::Empty => Coerced {
                value: 0.0,
                was_coerced: false,
            },
            Cell::Text(s) => coerce_numeric(s),
        }
    }
}

/// Integral floats print without a fraction, so a code stored as `1001.0`
/// reads back as `1001`.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::Error(_) => Cell::Empty,
            other => Cell::Text(other.to_string()),
        }
    }
}

pub trait SourceDocument {
    fn file_stem(&self) -> &str;

    fn sheet_names(&self) -> Vec<String>;

    fn rows(&mut self, sheet: &str) -> Result<Vec<Vec<Cell>>>;

    /// Non-empty cell text from the first `max_rows` rows of the first sheet,
    /// joined by single spaces.
    fn header_text(&mut self, max_rows: usize) -> Result<String> {
        let Some(first) = self.sheet_names().into_iter().next() else {
            return Ok(String::new());
        };
        let rows = self.rows(&first)?;
        let text = rows
            .iter()
            .take(max_rows)
            .flat_map(|row| row.iter())
            .filter(|cell| !cell.is_empty())
            .map(Cell::as_text)
            .collect::<Vec<_>>()
            .join(" ");
        debug!("Header text: {}", text.chars().take(200).collect::<String>());
        Ok(text)
    }
}

pub struct Workbook {
    stem: String,
    sheets: Sheets<BufReader<File>>,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self> {
        let sheets = open_workbook_auto(path).map_err(|e| {
            TradeHistoryError::Spreadsheet(format!("failed to open {}: {}", path.display(), e))
        })?;
        info!(
            "Loaded workbook: {} ({} sheets)",
            path.display(),
            sheets.sheet_names().len()
        );
        Ok(Self {
            stem: file_stem(path),
            sheets,
        })
    }
}

impl SourceDocument for Workbook {
    fn file_stem(&self) -> &str {
        &self.stem
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    fn rows(&mut self, sheet: &str) -> Result<Vec<Vec<Cell>>> {
        let range = self.sheets.worksheet_range(sheet).map_err(|e| {
            TradeHistoryError::Spreadsheet(format!("failed to read sheet '{}': {}", sheet, e))
        })?;
        Ok(range
            .rows()
            .map(|row| row.iter().map(Cell::from).collect())
            .collect())
    }
}

/// A delimited file with one `Direction` column (`I`/`E`), exposed as two
/// virtual sheets.
pub struct DelimitedDocument {
    stem: String,
    preamble: Vec<Vec<Cell>>,
    sheets: BTreeMap<Direction, Vec<Vec<Cell>>>,
}

impl DelimitedDocument {
    pub fn open(path: &Path, scan_rows: usize) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut doc = Self::from_bytes(&bytes, scan_rows)?;
        doc.stem = file_stem(path);
        Ok(doc)
    }

    /// Title lines above the header row are kept for metadata extraction;
    /// the header row is the first of the first `scan_rows` rows naming a
    /// `Direction` column.
    pub fn from_bytes(bytes: &[u8], scan_rows: usize) -> Result<Self> {
        let content = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content);

        let mut records: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            records.push(record?.iter().map(|s| s.trim().to_string()).collect());
        }
        if records.is_empty() {
            return Err(TradeHistoryError::NoSourceData(
                "delimited source is empty".to_string(),
            ));
        }

        let (header_idx, direction_idx) = records
            .iter()
            .take(scan_rows)
            .enumerate()
            .find_map(|(row_idx, row)| {
                row.iter()
                    .position(|h| normalize_header(h) == "direction")
                    .map(|col_idx| (row_idx, col_idx))
            })
            .ok_or_else(|| {
                TradeHistoryError::NoSourceData(
                    "delimited source must have a 'Direction' column with I or E".to_string(),
                )
            })?;

        let preamble: Vec<Vec<Cell>> = records
            .iter()
            .take(scan_rows)
            .map(|row| to_cells(row, None))
            .collect();
        let header_row = to_cells(&records[header_idx], Some(direction_idx));

        let mut sheets: BTreeMap<Direction, Vec<Vec<Cell>>> = BTreeMap::new();
        let mut skipped = 0usize;

        for record in &records[header_idx + 1..] {
            let direction = match record.get(direction_idx).map(|d| Direction::parse(d)) {
                Some(Ok(direction)) => direction,
                _ => {
                    skipped += 1;
                    continue;
                }
            };

            sheets
                .entry(direction)
                .or_insert_with(|| vec![header_row.clone()])
                .push(to_cells(record, Some(direction_idx)));
        }

        if skipped > 0 {
            debug!("Skipped {} rows without a valid Direction", skipped);
        }

        if sheets.is_empty() {
            return Err(TradeHistoryError::NoSourceData(
                "delimited source has no rows with Direction I or E".to_string(),
            ));
        }

        Ok(Self {
            stem: String::new(),
            preamble,
            sheets,
        })
    }
}

impl SourceDocument for DelimitedDocument {
    fn file_stem(&self) -> &str {
        &self.stem
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.keys().map(|d| d.label().to_string()).collect()
    }

    fn rows(&mut self, sheet: &str) -> Result<Vec<Vec<Cell>>> {
        let direction = Direction::parse(sheet)?;
        Ok(self.sheets.get(&direction).cloned().unwrap_or_default())
    }

    fn header_text(&mut self, max_rows: usize) -> Result<String> {
        Ok(self
            .preamble
            .iter()
            .take(max_rows)
            .flat_map(|row| row.iter())
            .filter(|cell| !cell.is_empty())
            .map(Cell::as_text)
            .collect::<Vec<_>>()
            .join(" "))
    }
}

fn to_cells(row: &[String], skip: Option<usize>) -> Vec<Cell> {
    row.iter()
        .enumerate()
        .filter(|(idx, _)| Some(*idx) != skip)
        .map(|(_, s)| {
            if s.is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        })
        .collect()
}

/// Opens a source by extension. `scan_rows` bounds the header search of
/// delimited sources.
pub fn open_source(path: &Path, scan_rows: usize) -> Result<Box<dyn SourceDocument>> {
    if !path.exists() {
        return Err(TradeHistoryError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Ok(Box::new(Workbook::open(path)?)),
        "csv" => Ok(Box::new(DelimitedDocument::open(path, scan_rows)?)),
        _ => Err(TradeHistoryError::UnsupportedSource(format!(
            "unsupported file type '.{}' for {}",
            ext,
            path.display()
        ))),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// First sheet whose name contains any keyword, case-insensitively.
pub fn find_target_sheet(sheet_names: &[String], keywords: &[String]) -> Option<String> {
    sheet_names
        .iter()
        .find(|name| {
            let lower = name.to_lowercase();
            keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
        })
        .cloned()
}

/// Index of the first row (within `scan_rows`) that carries a commodity-code
/// header token; 0 when none does.
pub fn find_header_row(rows: &[Vec<Cell>], scan_rows: usize) -> usize {
    rows.iter()
        .take(scan_rows)
        .position(|row| {
            row.iter().any(|cell| {
                let token = normalize_header(&cell.as_text());
                token.contains("hscode") || token.contains("code")
            })
        })
        .unwrap_or(0)
}

pub struct CumulativeReader {
    header_scan_rows: usize,
}

impl Default for CumulativeReader {
    fn default() -> Self {
        Self::new(DEFAULT_HEADER_SCAN_ROWS)
    }
}

impl CumulativeReader {
    pub fn new(header_scan_rows: usize) -> Self {
        Self { header_scan_rows }
    }

    /// Reads one direction's cumulative table. `Ok(None)` means the document
    /// has no usable table for this direction, which is not an error.
    pub fn read(
        &self,
        doc: &mut dyn SourceDocument,
        direction: Direction,
        keywords: &[String],
    ) -> Result<Option<Vec<CumulativeRow>>> {
        let names = doc.sheet_names();
        let Some(sheet) = find_target_sheet(&names, keywords) else {
            warn!(
                "No {} sheet found (keywords {:?}, sheets {:?})",
                direction, keywords, names
            );
            return Ok(None);
        };

        info!("Reading {} data from sheet '{}'", direction, sheet);
        let rows = doc.rows(&sheet)?;
        Ok(self.parse_table(&rows, direction))
    }

    pub fn parse_table(&self, rows: &[Vec<Cell>], direction: Direction) -> Option<Vec<CumulativeRow>> {
        if rows.is_empty() {
            warn!("{} sheet is empty", direction);
            return None;
        }

        let header_idx = find_header_row(rows, self.header_scan_rows);
        let headers: Vec<String> = rows[header_idx].iter().map(Cell::as_text).collect();
        let columns = ColumnMap::resolve(&headers);

        let missing = columns.missing(&REQUIRED_FIELDS);
        if !missing.is_empty() {
            warn!(
                "{} table is missing columns {:?} (headers {:?})",
                direction, missing, headers
            );
            return None;
        }

        let mut out = Vec::new();
        let mut dropped_totals = 0usize;
        let mut coerced = 0usize;

        for row in &rows[header_idx + 1..] {
            if row.iter().all(Cell::is_empty) {
                continue;
            }

            let text = |field: CanonicalField| -> String {
                columns
                    .get(field)
                    .and_then(|idx| row.get(idx))
                    .map(Cell::as_text)
                    .unwrap_or_default()
            };
            let mut number = |field: CanonicalField| -> f64 {
                let parsed = columns
                    .get(field)
                    .and_then(|idx| row.get(idx))
                    .map(Cell::to_number)
                    .unwrap_or(Coerced {
                        value: 0.0,
                        was_coerced: false,
                    });
                if parsed.was_coerced {
                    coerced += 1;
                }
                parsed.value
            };

            let raw_code = text(CanonicalField::CommodityCode);
            if raw_code.is_empty() {
                continue;
            }
            if raw_code.to_lowercase().contains("total") {
                dropped_totals += 1;
                continue;
            }

            let country = match text(CanonicalField::Country) {
                c if c.is_empty() || c == "nan" || c == "None" => UNKNOWN_COUNTRY.to_string(),
                c => c,
            };
            let unit = match text(CanonicalField::Unit) {
                u if u.is_empty() => DEFAULT_UNIT.to_string(),
                u => u,
            };
            let description = Some(text(CanonicalField::CommodityDescription))
                .filter(|d| !d.is_empty());

            let value = number(CanonicalField::Value);
            let quantity = number(CanonicalField::Quantity);
            let revenue = if direction.carries_revenue() {
                Some(number(CanonicalField::Revenue))
            } else {
                None
            };

            out.push(CumulativeRow {
                commodity_code: clean_commodity_code(&raw_code),
                description,
                country,
                value,
                quantity,
                unit,
                revenue,
            });
        }

        if dropped_totals > 0 {
            debug!("Dropped {} total/subtotal rows from {}", dropped_totals, direction);
        }
        if coerced > 0 {
            debug!("Coerced {} non-numeric {} cells to zero", coerced, direction);
        }
        info!("Cleaned {} data: {} records", direction, format_count(out.len()));

        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(cells: &[&str]) -> Vec<Cell> {
        cells
            .iter()
            .map(|s| {
                if s.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s.to_string())
                }
            })
            .collect()
    }

    #[test]
    fn test_find_target_sheet() {
        let names = vec![
            "Summary".to_string(),
            "Table 4 Import".to_string(),
            "Table 6 Export".to_string(),
        ];
        let import = vec!["4".to_string(), "import".to_string()];
        let export = vec!["6".to_string(), "export".to_string()];
        let nothing = vec!["re-export".to_string()];

        assert_eq!(find_target_sheet(&names, &import), Some("Table 4 Import".to_string()));
        assert_eq!(find_target_sheet(&names, &export), Some("Table 6 Export".to_string()));
        assert_eq!(find_target_sheet(&names, &nothing), None);
    }

    #[test]
    fn test_find_header_row_skips_title_rows() {
        let rows = vec![
            text_row(&["Foreign Trade Statistics FY 2082/83", ""]),
            text_row(&["(Shrawan - Ashwin)", ""]),
            text_row(&["HS Code", "Partner Countries"]),
            text_row(&["1001", "India"]),
        ];
        assert_eq!(find_header_row(&rows, 10), 2);
        assert_eq!(find_header_row(&rows[..2], 10), 0);
    }

    #[test]
    fn test_parse_table_cleans_rows() {
        let rows = vec![
            text_row(&["Import FY 2082/83", "", "", "", "", ""]),
            text_row(&["HS Code", "Description", "Country", "Quantity", "Value", "Revenue"]),
            vec![
                Cell::Number(1001.0),
                Cell::Text("Wheat".into()),
                Cell::Text("India".into()),
                Cell::Number(10.0),
                Cell::Number(100.0),
                Cell::Text("n/a".into()),
            ],
            text_row(&["Total", "", "", "", "999", ""]),
            text_row(&["", "orphan", "", "", "5", ""]),
            text_row(&["", "", "", "", "", ""]),
            text_row(&["1002.0", "", "", "x", "1,500", "20"]),
        ];

        let reader = CumulativeReader::default();
        let parsed = reader.parse_table(&rows, Direction::Import).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].commodity_code, "1001");
        assert_eq!(parsed[0].description.as_deref(), Some("Wheat"));
        assert_eq!(parsed[0].unit, DEFAULT_UNIT);
        assert_eq!(parsed[0].revenue, Some(0.0));
        assert_eq!(parsed[1].commodity_code, "1002");
        assert_eq!(parsed[1].country, UNKNOWN_COUNTRY);
        assert_eq!(parsed[1].quantity, 0.0);
        assert_eq!(parsed[1].value, 1500.0);
        assert_eq!(parsed[1].revenue, Some(20.0));
    }

    #[test]
    fn test_export_rows_have_no_revenue() {
        let rows = vec![
            text_row(&["Code", "Country", "Unit", "Value"]),
            text_row(&["2001", "USA", "kg", "300"]),
        ];
        let parsed = CumulativeReader::default()
            .parse_table(&rows, Direction::Export)
            .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].revenue, None);
        assert_eq!(parsed[0].unit, "kg");
    }

    #[test]
    fn test_missing_required_column_yields_none() {
        let rows = vec![
            text_row(&["HS Code", "Quantity"]),
            text_row(&["1001", "5"]),
        ];
        assert!(CumulativeReader::default()
            .parse_table(&rows, Direction::Import)
            .is_none());
    }

    #[test]
    fn test_delimited_document_splits_directions() {
        let csv = "\u{feff}HS_Code,Country,Direction,Value,Quantity,Unit,Revenue\n\
                   1001,India,I,400,40,kg,200\n\
                   2001,USA,E,300,30,pcs,\n\
                   3001,China,X,1,1,pcs,\n";
        let mut doc = DelimitedDocument::from_bytes(csv.as_bytes(), DEFAULT_HEADER_SCAN_ROWS).unwrap();
        assert_eq!(doc.sheet_names(), vec!["import".to_string(), "export".to_string()]);

        let reader = CumulativeReader::default();
        let keywords = vec!["import".to_string()];
        let imports = reader
            .read(&mut doc, Direction::Import, &keywords)
            .unwrap()
            .unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].value, 400.0);
        assert_eq!(imports[0].revenue, Some(200.0));

        let header = doc.header_text(10).unwrap();
        assert!(header.contains("HS_Code"));
    }

    #[test]
    fn test_delimited_document_keeps_title_lines() {
        let csv = "Trade statistics FY 2081/82 (Shrawan - Poush)\n\
                   HS_Code,Country,Direction,Value\n\
                   1001,India,I,400\n";
        let mut doc = DelimitedDocument::from_bytes(csv.as_bytes(), DEFAULT_HEADER_SCAN_ROWS).unwrap();
        assert_eq!(doc.sheet_names(), vec!["import".to_string()]);
        assert!(doc.header_text(10).unwrap().starts_with("Trade statistics FY 2081/82"));

        let rows = doc.rows("import").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Cell::Text("HS_Code".to_string()));
        assert_eq!(rows[0].len(), 3);
    }

    #[test]
    fn test_delimited_header_search_honours_scan_rows() {
        let csv = "Trade statistics FY 2081/82\n\
                   (Shrawan - Poush)\n\
                   Provisional\n\
                   HS_Code,Country,Direction,Value\n\
                   1001,India,I,400\n";
        assert!(DelimitedDocument::from_bytes(csv.as_bytes(), 4).is_ok());
        assert!(matches!(
            DelimitedDocument::from_bytes(csv.as_bytes(), 3),
            Err(TradeHistoryError::NoSourceData(_))
        ));
    }

    #[test]
    fn test_delimited_document_requires_direction() {
        let csv = "HS_Code,Country,Value\n1001,India,4\n";
        assert!(matches!(
            DelimitedDocument::from_bytes(csv.as_bytes(), DEFAULT_HEADER_SCAN_ROWS),
            Err(TradeHistoryError::NoSourceData(_))
        ));
    }

    #[test]
    fn test_open_source_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        assert!(matches!(
            open_source(&path, DEFAULT_HEADER_SCAN_ROWS),
            Err(TradeHistoryError::UnsupportedSource(_))
        ));
    }

    #[test]
    fn test_number_cells_render_as_codes() {
        assert_eq!(Cell::Number(1001.0).as_text(), "1001");
        assert_eq!(Cell::Number(0.5).as_text(), "0.5");
    }
}
