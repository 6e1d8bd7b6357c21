//! Daily installed wind and solar capacity for Germany, as compiled by the
//! renewable power plants data package.
//!
//! The values are daily; they are spread over every slot of the configured
//! resolution up to the end of the last day.

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Europe::Berlin;
use std::path::Path;

use super::ReaderParams;
use crate::error::ReadError;
use crate::series::{Label, LabelNames, NormalizedSeries, SeriesBuilder};
use crate::table::{Encoding, NumberFormat, RawTable, cell, load_delimited, number, require_width, width_of};
use crate::timezone::{Ambiguity, localize_one};

const DATE_COLUMN: usize = 0;
const VALUE_COLUMNS: [(usize, &str); 2] = [(2, "wind"), (3, "solar")];
const SOURCE_NAME: &str = "own calculation";

#[tracing::instrument(skip(params, names), fields(variable = %params.variable))]
pub fn read(path: &Path, params: &ReaderParams, names: &LabelNames) -> Result<NormalizedSeries, ReadError> {
    let table = load_delimited(path, b',', Encoding::Utf8)?;
    from_table(&table, params, names)
}

fn labels(web: &str) -> Vec<Label> {
    VALUE_COLUMNS
        .iter()
        .map(|(_, tech)| Label::new(*tech, "DE", "capacity", SOURCE_NAME, web))
        .collect()
}

pub fn from_table(
    table: &RawTable,
    params: &ReaderParams,
    names: &LabelNames,
) -> Result<NormalizedSeries, ReadError> {
    let mut builder = SeriesBuilder::new(names.clone(), labels(&params.web));
    let mut last: Option<(NaiveDate, Vec<Option<f64>>)> = None;
    let width = width_of(VALUE_COLUMNS.iter().map(|(col, _)| *col));
    if let Some(header) = table.row(0) {
        require_width(header, 0, width)?;
    }

    for (i, row) in table.rows_from(1).iter().enumerate() {
        let date_cell = cell(row, DATE_COLUMN);
        if date_cell.is_empty() {
            continue;
        }
        require_width(row, 1 + i, width)?;
        let date = date_cell
            .to_date()
            .ok_or_else(|| ReadError::Timestamp(date_cell.as_label()))?;
        let values = VALUE_COLUMNS
            .iter()
            .map(|(col, _)| number(row, 1 + i, *col, NumberFormat::POINT))
            .collect::<Result<Vec<_>, _>>()?;
        let midnight = date.and_time(NaiveTime::MIN);
        builder.push(localize_one(Berlin, midnight, Ambiguity::Infer)?, values.clone());
        last = Some((date, values));
    }
    let Some((last_date, last_values)) = last else {
        return Err(ReadError::Layout("no data rows below the header".into()));
    };

    // The last day is held until 23:59 so that resampling covers all of it.
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN);
    builder.push(
        localize_one(Berlin, last_date.and_time(end_of_day), Ambiguity::Infer)?,
        last_values,
    );
    Ok(builder.finish().resample_ffill(params.resolution.step()))
}
