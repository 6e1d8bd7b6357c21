//! 50Hertz wind and solar CSV exports.
//!
//! One file per `tech_attribute` variable (e.g. `wind_forecast`). Before 2007
//! and from 2015 on only the standard-time copy of the repeated autumn hour is
//! published.

use chrono::Datelike;
use chrono_tz::Europe::Berlin;
use std::ops::RangeInclusive;
use std::path::Path;

use super::{LocalRow, ReaderParams, Source, localize_rows};
use crate::error::ReadError;
use crate::series::{Label, LabelNames, NormalizedSeries};
use crate::table::{
    Encoding, NumberFormat, RawTable, cell, combine_date_time, load_delimited, number, require_width,
};
use crate::timezone::Ambiguity;

const FIRST_DATA_ROW: usize = 4;
const VALUE_COLUMN: usize = 3;
/// Years in which both copies of the autumn hour are present.
const INFER_YEARS: RangeInclusive<i32> = 2007..=2014;

#[tracing::instrument(skip(params, names), fields(variable = %params.variable))]
pub fn read(path: &Path, params: &ReaderParams, names: &LabelNames) -> Result<NormalizedSeries, ReadError> {
    let table = load_delimited(path, b';', Encoding::Utf8)?;
    from_table(&table, params, names)
}

/// Splits `wind_forecast` into `("wind", "forecast")`.
fn split_variable(variable: &str) -> Result<(&str, &str), ReadError> {
    match variable.split_once('_') {
        Some((tech, attribute)) if !tech.is_empty() && !attribute.is_empty() => Ok((tech, attribute)),
        _ => Err(ReadError::Variable {
            provider: Source::FiftyHertz.name(),
            variable: variable.to_string(),
        }),
    }
}

pub fn from_table(
    table: &RawTable,
    params: &ReaderParams,
    names: &LabelNames,
) -> Result<NormalizedSeries, ReadError> {
    let (tech, attribute) = split_variable(&params.variable)?;

    let mut rows: Vec<LocalRow> = Vec::new();
    for (i, row) in table.rows_from(FIRST_DATA_ROW).iter().enumerate() {
        let (date_cell, time_cell) = (cell(row, 0), cell(row, 1));
        if date_cell.is_empty() {
            continue;
        }
        require_width(row, FIRST_DATA_ROW + i, VALUE_COLUMN + 1)?;
        let date = date_cell
            .to_date()
            .ok_or_else(|| ReadError::Timestamp(date_cell.as_label()))?;
        let time: String = time_cell.as_label().chars().take(5).collect();
        let local = combine_date_time(date, &time)
            .ok_or_else(|| ReadError::Timestamp(format!("{} {}", date_cell.as_label(), time)))?;
        let value = number(row, FIRST_DATA_ROW + i, VALUE_COLUMN, NumberFormat::GERMAN)?;
        rows.push((local, vec![value]));
    }
    let Some((first, _)) = rows.first() else {
        return Err(ReadError::Layout("no data rows below the header".into()));
    };

    let ambiguity = if INFER_YEARS.contains(&first.year()) {
        Ambiguity::Infer
    } else {
        Ambiguity::Standard
    };
    let label = Label::new(tech, "DE50hertz", attribute, Source::FiftyHertz.name(), params.web.as_str());
    localize_rows(rows, Berlin, ambiguity, vec![label], names)
}
