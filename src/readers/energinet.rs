//! Energinet.dk market data workbooks (Elspot prices, wind and solar).
//!
//! Column names sit in the third row. The first two columns hold the date and
//! the hour of day counted from 1. The provider does not mark the repeated
//! autumn hour, so it is always read as daylight time, and the spring hour that
//! does not exist is dropped before conversion.

use chrono::TimeDelta;
use chrono_tz::Europe::Copenhagen;
use std::path::Path;
use tracing::debug;

use super::{LocalRow, ReaderParams, Source, localize_rows};
use crate::error::ReadError;
use crate::series::{Label, LabelNames, NormalizedSeries};
use crate::table::{Cell, NumberFormat, RawTable, SheetChoice, cell, load_workbook, number, require_width, width_of};
use crate::timezone::{Ambiguity, spring_transitions, years_of};

const HEADER_ROW: usize = 2;
const FIRST_VALUE_COLUMN: usize = 2;
/// Transition lists start here; earlier files are not published.
const FIRST_TRANSITION_YEAR: i32 = 2000;

/// Raw column name to `(kind, region, attribute)`.
const COLUMN_MAP: &[(&str, (&str, &str, &str))] = &[
    ("DK-West", ("price", "DKw", "Elspot")),
    ("DK-East", ("price", "DKe", "Elspot")),
    ("Norway", ("price", "NO", "Elspot")),
    ("Sweden (SE)", ("price", "SE", "Elspot")),
    ("Sweden (SE3)", ("price", "SE3", "Elspot")),
    ("Sweden (SE4)", ("price", "SE4", "Elspot")),
    ("DE European Power Exchange", ("price", "DE", "EPEX")),
    ("DK-West: Wind power production", ("wind", "DKw", "generation")),
    ("DK-West: Solar cell production (estimated)", ("solar", "DKw", "generation")),
    ("DK-East: Wind power production", ("wind", "DKe", "generation")),
    ("DK-East: Solar cell production (estimated)", ("solar", "DKe", "generation")),
    ("DK: Wind power production (onshore)", ("wind", "DK", "onshore")),
    ("DK: Wind power production (offshore)", ("wind", "DK", "offshore")),
];

fn map_column(raw: &str, web: &str) -> Option<Label> {
    COLUMN_MAP
        .iter()
        .find(|(name, _)| *name == raw)
        .map(|(_, (kind, region, attribute))| {
            Label::new(*kind, *region, *attribute, Source::EnerginetDk.name(), web)
        })
}

#[tracing::instrument(skip(params, names), fields(variable = %params.variable))]
pub fn read(path: &Path, params: &ReaderParams, names: &LabelNames) -> Result<NormalizedSeries, ReadError> {
    let table = load_workbook(path, SheetChoice::First)?;
    from_table(&table, params, names)
}

/// Index of the last non-empty cell plus one.
fn used_width(row: &[Cell]) -> usize {
    row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1)
}

/// Data column index and header name. A header row two fields narrower than
/// the data lacks the date and hour columns, so its names belong to the
/// columns after them.
fn header_columns(header: &[Cell], data_width: usize) -> Result<Vec<(usize, String)>, ReadError> {
    let header_width = used_width(header);
    let shift = match data_width.saturating_sub(header_width) {
        0 => 0,
        FIRST_VALUE_COLUMN => FIRST_VALUE_COLUMN,
        _ => {
            return Err(ReadError::Layout(format!(
                "header row has {header_width} columns but data rows have {data_width}"
            )));
        }
    };
    Ok(header
        .iter()
        .enumerate()
        .map(|(i, c)| (i + shift, c.as_label()))
        .filter(|(col, name)| *col >= FIRST_VALUE_COLUMN && !name.is_empty())
        .collect())
}

pub fn from_table(
    table: &RawTable,
    params: &ReaderParams,
    names: &LabelNames,
) -> Result<NormalizedSeries, ReadError> {
    let header = table
        .row(HEADER_ROW)
        .ok_or_else(|| ReadError::Layout("missing header row".into()))?;

    let data_width = table
        .rows_from(HEADER_ROW + 1)
        .iter()
        .map(|row| used_width(row))
        .max()
        .unwrap_or(0);

    let mut kept: Vec<(usize, Label)> = Vec::new();
    for (col, raw) in header_columns(header, data_width)? {
        match map_column(&raw, &params.web) {
            Some(label) => kept.push((col, label)),
            None => debug!(column = %raw, "unmapped column dropped"),
        }
    }
    if kept.is_empty() {
        return Err(ReadError::Layout("no known columns in header row".into()));
    }
    let width = width_of(kept.iter().map(|(col, _)| *col));

    let mut rows: Vec<LocalRow> = Vec::new();
    for (i, row) in table.rows_from(HEADER_ROW + 1).iter().enumerate() {
        let row_index = HEADER_ROW + 1 + i;
        let (date_cell, hour_cell) = (cell(row, 0), cell(row, 1));
        if date_cell.is_empty() && hour_cell.is_empty() {
            continue;
        }
        require_width(row, row_index, width)?;
        let date = date_cell
            .to_date()
            .ok_or_else(|| ReadError::Timestamp(date_cell.as_label()))?;
        let hour = hour_cell
            .to_integer()
            .filter(|h| (1..=24).contains(h))
            .ok_or_else(|| ReadError::Timestamp(hour_cell.as_label()))?;
        let local = date.and_time(Default::default()) + TimeDelta::hours(hour - 1);

        let values = kept
            .iter()
            .map(|(col, _)| number(row, row_index, *col, NumberFormat::POINT))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push((local, values));
    }

    let years = years_of(rows.iter().map(|(local, _)| local))
        .into_iter()
        .filter(|year| *year >= FIRST_TRANSITION_YEAR);
    let spring = spring_transitions(Copenhagen, years);
    let before = rows.len();
    rows.retain(|(local, _)| !spring.contains(local));
    debug!(dropped = before - rows.len(), "spring transition hours dropped");

    let columns = kept.into_iter().map(|(_, label)| label).collect();
    localize_rows(rows, Copenhagen, Ambiguity::Daylight, columns, names)
}
