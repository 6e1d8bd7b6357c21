//! Raw cell grids loaded from delimited text or spreadsheet workbooks.
//!
//! Every reader works on a [`RawTable`], so the provider-specific parsing
//! never touches the file format directly.

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::debug;

use crate::error::ReadError;

/// Tokens treated as a missing value in numeric cells.
const NA_TOKENS: &[&str] = &["n.a.", "N/A", "NA", "NaN", "nan", "-", "--"];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn text(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Renders a header cell as a column name. Spreadsheet time-of-day cells
    /// become `HH:MM:SS`, hours counted from the serial epoch so that a full
    /// day renders as `24:00:00`.
    pub fn as_label(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::DateTime(dt) => {
                let secs = (*dt - excel_epoch()).num_seconds();
                if (0..=2 * 86_400).contains(&secs) {
                    format!(
                        "{:02}:{:02}:{:02}",
                        secs / 3600,
                        (secs % 3600) / 60,
                        secs % 60
                    )
                } else {
                    dt.to_string()
                }
            }
        }
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Empty => None,
            Cell::DateTime(dt) => Some(dt.date()),
            Cell::Text(s) => parse_date(s).or_else(|| parse_datetime(s).map(|dt| dt.date())),
            Cell::Number(n) if *n >= 10_000_000.0 => parse_compact_date(&format!("{}", *n as i64)),
            Cell::Number(n) => excel_serial(*n).map(|dt| dt.date()),
        }
    }

    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Empty => None,
            Cell::DateTime(dt) => Some(*dt),
            Cell::Text(s) => parse_datetime(s),
            Cell::Number(n) => excel_serial(*n),
        }
    }

    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Cell::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.fract() == 0.0).map(|n| n as i64),
            _ => None,
        }
    }
}

/// Decimal and thousands separators of a provider's number format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub decimal: char,
    pub thousands: Option<char>,
}

impl NumberFormat {
    pub const POINT: NumberFormat = NumberFormat {
        decimal: '.',
        thousands: None,
    };
    pub const COMMA: NumberFormat = NumberFormat {
        decimal: ',',
        thousands: None,
    };
    pub const GERMAN: NumberFormat = NumberFormat {
        decimal: ',',
        thousands: Some('.'),
    };

    pub fn parse(&self, text: &str) -> Option<f64> {
        let mut normalized = String::with_capacity(text.len());
        for c in text.trim().chars() {
            if Some(c) == self.thousands {
                continue;
            }
            normalized.push(if c == self.decimal { '.' } else { c });
        }
        normalized.parse().ok()
    }
}

/// Character encoding of a delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
}

/// Which sheet of a workbook holds the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetChoice {
    First,
    Last,
}

/// A rectangular-ish grid of cells; rows may have different lengths.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Rows from `offset` on; empty when the table is shorter.
    pub fn rows_from(&self, offset: usize) -> &[Vec<Cell>] {
        self.rows.get(offset..).unwrap_or(&[])
    }

    pub fn row(&self, index: usize) -> Option<&[Cell]> {
        self.rows.get(index).map(Vec::as_slice)
    }
}

/// Cell `col` of `row`, or [`Cell::Empty`] past the end of a short row.
pub fn cell(row: &[Cell], col: usize) -> &Cell {
    const EMPTY: &Cell = &Cell::Empty;
    row.get(col).unwrap_or(EMPTY)
}

/// Fails when `row` has fewer than `width` fields. A column missing from the
/// file must not be read back as nulls.
pub fn require_width(row: &[Cell], row_index: usize, width: usize) -> Result<(), ReadError> {
    if row.len() < width {
        return Err(ReadError::Layout(format!(
            "row {row_index} has {} columns, expected at least {width}",
            row.len()
        )));
    }
    Ok(())
}

/// Number of fields needed to reach every column in `columns`.
pub fn width_of(columns: impl IntoIterator<Item = usize>) -> usize {
    columns.into_iter().map(|col| col + 1).max().unwrap_or(0)
}

/// Reads a numeric cell. Blank cells and NA tokens are `None`; anything else
/// that is not a number fails the read.
pub fn number(
    row: &[Cell],
    row_index: usize,
    col: usize,
    format: NumberFormat,
) -> Result<Option<f64>, ReadError> {
    match cell(row, col) {
        Cell::Empty => Ok(None),
        Cell::Number(n) => Ok(Some(*n)),
        Cell::Text(s) if NA_TOKENS.contains(&s.as_str()) => Ok(None),
        Cell::Text(s) => format.parse(s).map(Some).ok_or_else(|| ReadError::Value {
            row: row_index,
            column: col,
            value: s.clone(),
        }),
        Cell::DateTime(dt) => Err(ReadError::Value {
            row: row_index,
            column: col,
            value: dt.to_string(),
        }),
    }
}

/// Loads a delimited text file without interpreting any header row.
pub fn load_delimited(
    path: &Path,
    delimiter: u8,
    encoding: Encoding,
) -> Result<RawTable, ReadError> {
    let bytes = std::fs::read(path).map_err(|error| ReadError::Io {
        path: path.to_path_buf(),
        error,
    })?;
    let text = match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(&bytes).into_owned(),
        Encoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
    };
    parse_delimited(&text, delimiter)
}

pub fn parse_delimited(text: &str, delimiter: u8) -> Result<RawTable, ReadError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Cell::text).collect());
    }
    debug!(rows = rows.len(), "delimited table loaded");
    Ok(RawTable::new(rows))
}

/// Loads one sheet of a spreadsheet workbook (xls, xlsx, ods).
///
/// The grid is anchored at cell A1 even when the used range starts further
/// down or right, so row and column offsets match what the provider shows.
pub fn load_workbook(path: &Path, choice: SheetChoice) -> Result<RawTable, ReadError> {
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names();
    let name = match choice {
        SheetChoice::First => names.first(),
        SheetChoice::Last => names.last(),
    }
    .cloned()
    .ok_or_else(|| ReadError::Layout("workbook has no sheets".into()))?;

    let range = workbook.worksheet_range(&name)?;
    let (row_offset, col_offset) = range.start().unwrap_or((0, 0));

    let mut rows: Vec<Vec<Cell>> = (0..row_offset).map(|_| Vec::new()).collect();
    for data_row in range.rows() {
        let mut row: Vec<Cell> = (0..col_offset).map(|_| Cell::Empty).collect();
        row.extend(data_row.iter().map(cell_from_data));
        rows.push(row);
    }
    debug!(sheet = %name, rows = rows.len(), "workbook sheet loaded");
    Ok(RawTable::new(rows))
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::text(s),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => excel_serial(dt.as_f64()).map_or(Cell::Empty, Cell::DateTime),
        Data::DateTimeIso(s) => Cell::text(s),
        _ => Cell::Empty,
    }
}

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Converts a spreadsheet serial day number (1900 date system) to a naive
/// timestamp, rounded to the second.
pub fn excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let secs = (serial * 86_400.0).round() as i64;
    excel_epoch().checked_add_signed(TimeDelta::try_seconds(secs)?)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

/// Parses a day-first, ISO or compact `yyyymmdd` date.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| parse_compact_date(text))
}

/// `yyyymmdd`; chrono's `%Y` would swallow all eight digits.
fn parse_compact_date(text: &str) -> Option<NaiveDate> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::from_ymd_opt(
        text[0..4].parse().ok()?,
        text[4..6].parse().ok()?,
        text[6..8].parse().ok()?,
    )
}

/// Parses a day-first or ISO timestamp; a bare date means midnight.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Joins a date with a `HH:MM` / `HH:MM:SS` time. `24:00` rolls over to the
/// next midnight.
pub fn combine_date_time(date: NaiveDate, time: &str) -> Option<NaiveDateTime> {
    let time = time.trim();
    if time.starts_with("24:00") {
        return date.succ_opt()?.and_hms_opt(0, 0, 0);
    }
    ["%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(time, fmt).ok())
        .map(|t| date.and_time(t))
}
