//! Elia (Belgium) wind and solar workbooks.
//!
//! Four header rows, then one row per quarter hour: timestamp in the first
//! column, forecast, generation and installed capacity in columns 2, 4 and 5.

use chrono_tz::Europe::Brussels;
use std::path::Path;

use super::{LocalRow, ReaderParams, Source, attribute_labels, localize_rows};
use crate::error::ReadError;
use crate::series::{LabelNames, NormalizedSeries};
use crate::table::{NumberFormat, RawTable, SheetChoice, cell, load_workbook, number, require_width, width_of};
use crate::timezone::Ambiguity;

const SKIP_ROWS: usize = 4;
const VALUE_COLUMNS: [(usize, &str); 3] = [(2, "forecast"), (4, "generation"), (5, "capacity")];

#[tracing::instrument(skip(params, names), fields(variable = %params.variable))]
pub fn read(path: &Path, params: &ReaderParams, names: &LabelNames) -> Result<NormalizedSeries, ReadError> {
    let table = load_workbook(path, SheetChoice::First)?;
    from_table(&table, params, names)
}

pub fn from_table(
    table: &RawTable,
    params: &ReaderParams,
    names: &LabelNames,
) -> Result<NormalizedSeries, ReadError> {
    let width = width_of(VALUE_COLUMNS.iter().map(|(col, _)| *col));
    let mut rows: Vec<LocalRow> = Vec::new();
    for (i, row) in table.rows_from(SKIP_ROWS).iter().enumerate() {
        let stamp = cell(row, 0);
        if stamp.is_empty() {
            continue;
        }
        require_width(row, SKIP_ROWS + i, width)?;
        let local = stamp
            .to_datetime()
            .ok_or_else(|| ReadError::Timestamp(stamp.as_label()))?;
        let values = VALUE_COLUMNS
            .iter()
            .map(|(col, _)| number(row, SKIP_ROWS + i, *col, NumberFormat::POINT))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push((local, values));
    }
    if rows.is_empty() {
        return Err(ReadError::Layout("no data rows below the header".into()));
    }

    let attributes: Vec<&str> = VALUE_COLUMNS.iter().map(|(_, name)| *name).collect();
    let columns = attribute_labels(&params.variable, "BE", &attributes, Source::Elia, &params.web);
    localize_rows(rows, Brussels, Ambiguity::Infer, columns, names)
}
