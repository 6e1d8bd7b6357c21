//! Amprion wind and solar CSV exports.

use chrono::Datelike;
use chrono_tz::Europe::Berlin;
use std::path::Path;

use super::{LocalRow, ReaderParams, Source, attribute_labels, localize_rows};
use crate::error::ReadError;
use crate::series::{LabelNames, NormalizedSeries};
use crate::table::{
    Encoding, NumberFormat, RawTable, cell, combine_date_time, load_delimited, number, require_width, width_of,
};
use crate::timezone::Ambiguity;

const VALUE_COLUMNS: [(usize, &str); 2] = [(2, "forecast"), (3, "generation")];
/// From 2010 on only the daylight copy of the repeated autumn hour is published.
const LAST_INFER_YEAR: i32 = 2009;

#[tracing::instrument(skip(params, names), fields(variable = %params.variable))]
pub fn read(path: &Path, params: &ReaderParams, names: &LabelNames) -> Result<NormalizedSeries, ReadError> {
    let table = load_delimited(path, b';', Encoding::Utf8)?;
    from_table(&table, params, names)
}

pub fn from_table(
    table: &RawTable,
    params: &ReaderParams,
    names: &LabelNames,
) -> Result<NormalizedSeries, ReadError> {
    let width = width_of(VALUE_COLUMNS.iter().map(|(col, _)| *col));
    if let Some(header) = table.row(0) {
        require_width(header, 0, width)?;
    }

    let mut rows: Vec<LocalRow> = Vec::new();
    for (i, row) in table.rows_from(1).iter().enumerate() {
        let (date_cell, time_cell) = (cell(row, 0), cell(row, 1));
        if date_cell.is_empty() {
            continue;
        }
        require_width(row, 1 + i, width)?;
        let date = date_cell
            .to_date()
            .ok_or_else(|| ReadError::Timestamp(date_cell.as_label()))?;
        let time: String = time_cell.as_label().chars().take(5).collect();
        let local = combine_date_time(date, &time)
            .ok_or_else(|| ReadError::Timestamp(format!("{} {}", date_cell.as_label(), time)))?;
        let values = VALUE_COLUMNS
            .iter()
            .map(|(col, _)| number(row, 1 + i, *col, NumberFormat::COMMA))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push((local, values));
    }
    if rows.is_empty() {
        return Err(ReadError::Layout("no data rows below the header".into()));
    }

    let attributes: Vec<&str> = VALUE_COLUMNS.iter().map(|(_, name)| *name).collect();
    let columns = attribute_labels(&params.variable, "DEamprion", &attributes, Source::Amprion, &params.web);

    let (early, late): (Vec<LocalRow>, Vec<LocalRow>) = rows
        .into_iter()
        .partition(|(local, _)| local.year() <= LAST_INFER_YEAR);
    let early = localize_rows(early, Berlin, Ambiguity::Infer, columns.clone(), names)?;
    let late = localize_rows(late, Berlin, Ambiguity::Daylight, columns, names)?;
    Ok(early.combine_first(late))
}
