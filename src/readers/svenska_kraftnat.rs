//! Svenska Kraftnät wind and solar workbooks.
//!
//! The hidden sheets of some years precede the data, so the last sheet is
//! read. Times are Swedish standard time all year round.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use std::path::Path;
use tracing::debug;

use super::{ReaderParams, Source};
use crate::error::ReadError;
use crate::series::{Label, LabelNames, NormalizedSeries, SeriesBuilder};
use crate::table::{Cell, NumberFormat, RawTable, SheetChoice, cell, load_workbook, number, require_width, width_of};

const SUMMARY_ROW: &str = "Tot summa GWh";

/// Column layout of one yearly workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Date as `yyyymmdd` and hour as `HHMM` in separate columns, wind only.
    DateAndHour,
    /// One timestamp column, wind and solar.
    Timestamp { skip: usize },
}

impl Layout {
    fn for_variable(variable: &str) -> Self {
        match variable {
            "wind_solar_1" | "wind_solar_2" => Layout::DateAndHour,
            "wind_solar_4" => Layout::Timestamp { skip: 5 },
            _ => Layout::Timestamp { skip: 7 },
        }
    }

    fn skip(self) -> usize {
        match self {
            Layout::DateAndHour => 4,
            Layout::Timestamp { skip } => skip,
        }
    }

    fn value_columns(self) -> &'static [(usize, &'static str)] {
        match self {
            Layout::DateAndHour => &[(3, "wind")],
            Layout::Timestamp { .. } => &[(2, "wind"), (8, "solar")],
        }
    }
}

#[tracing::instrument(skip(params, names), fields(variable = %params.variable))]
pub fn read(path: &Path, params: &ReaderParams, names: &LabelNames) -> Result<NormalizedSeries, ReadError> {
    let table = load_workbook(path, SheetChoice::Last)?;
    from_table(&table, params, names)
}

/// `HHMM` as written by the provider; small values are plain hours.
fn hour_of(cell: &Cell) -> Option<i64> {
    let raw = cell.to_integer()?;
    let hour = if raw >= 100 { raw / 100 } else { raw };
    (0..=24).contains(&hour).then_some(hour)
}

fn local_time(row: &[Cell], layout: Layout) -> Result<Option<NaiveDateTime>, ReadError> {
    let stamp = cell(row, 0);
    if stamp.is_empty() || stamp.as_text() == Some(SUMMARY_ROW) {
        return Ok(None);
    }
    let local = match layout {
        Layout::DateAndHour => {
            let date = stamp
                .to_date()
                .ok_or_else(|| ReadError::Timestamp(stamp.as_label()))?;
            let hour = hour_of(cell(row, 1))
                .ok_or_else(|| ReadError::Timestamp(cell(row, 1).as_label()))?;
            date.and_time(Default::default())
                .checked_add_signed(TimeDelta::hours(hour))
                .ok_or_else(|| ReadError::Timestamp(format!("{} {hour}", stamp.as_label())))?
        }
        Layout::Timestamp { .. } => stamp
            .to_datetime()
            .ok_or_else(|| ReadError::Timestamp(stamp.as_label()))?,
    };
    Ok(Some(local))
}

pub fn from_table(
    table: &RawTable,
    params: &ReaderParams,
    names: &LabelNames,
) -> Result<NormalizedSeries, ReadError> {
    let layout = Layout::for_variable(&params.variable);
    let columns = layout
        .value_columns()
        .iter()
        .map(|(_, tech)| Label::new(*tech, "SE", "generation", Source::SvenskaKraftnat.name(), params.web.as_str()))
        .collect();
    let mut builder = SeriesBuilder::new(names.clone(), columns);

    let width = width_of(layout.value_columns().iter().map(|(col, _)| *col));
    let mut skipped = 0usize;
    let mut rows = 0usize;
    for (i, row) in table.rows_from(layout.skip()).iter().enumerate() {
        let Some(local) = local_time(row, layout)? else {
            skipped += 1;
            continue;
        };
        require_width(row, layout.skip() + i, width)?;
        let values = layout
            .value_columns()
            .iter()
            .map(|(col, _)| number(row, layout.skip() + i, *col, NumberFormat::POINT))
            .collect::<Result<Vec<_>, _>>()?;
        // standard time is UTC+1 all year
        let utc = local
            .checked_sub_signed(TimeDelta::hours(1))
            .ok_or_else(|| ReadError::Timestamp(local.to_string()))?;
        let ts = DateTime::<Utc>::from_naive_utc_and_offset(utc, Utc);
        builder.push(ts, values);
        rows += 1;
    }
    if rows == 0 {
        return Err(ReadError::Layout("no data rows below the header".into()));
    }
    debug!(rows, skipped, ?layout, "sheet read");
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::test_support::assert_clean_index;
    use crate::series::Resolution;
    use chrono::TimeZone;

    fn padded(skip: usize, data: Vec<Vec<Cell>>) -> RawTable {
        let mut rows: Vec<Vec<Cell>> = (0..skip).map(|_| vec![Cell::text("Tid")]).collect();
        rows.extend(data);
        RawTable::new(rows)
    }

    fn label(tech: &str) -> Label {
        Label::new(tech, "SE", "generation", "Svenska Kraftnaet", "http://svk.se")
    }

    #[test]
    fn test_date_and_hour_layout() {
        let table = padded(
            4,
            vec![
                vec![Cell::Number(20090101.0), Cell::Number(0.0), Cell::Empty, Cell::Number(120.0)],
                vec![Cell::Number(20090101.0), Cell::Number(100.0), Cell::Empty, Cell::Number(130.0)],
                vec![Cell::Number(20090101.0), Cell::Number(1300.0), Cell::Empty, Cell::Number(140.0)],
                vec![Cell::Empty, Cell::Empty, Cell::Empty, Cell::Number(390.0)],
            ],
        );
        let params = ReaderParams::new("wind_solar_1", "http://svk.se", Resolution::Hourly);

        let series = from_table(&table, &params, &LabelNames::default()).unwrap();

        assert_clean_index(&series);
        assert_eq!(series.columns(), &[label("wind")]);
        assert_eq!(series.len(), 3);
        assert_eq!(
            series.first_timestamp(),
            Some(Utc.with_ymd_and_hms(2008, 12, 31, 23, 0, 0).unwrap())
        );
        assert_eq!(
            series.value(Utc.with_ymd_and_hms(2009, 1, 1, 12, 0, 0).unwrap(), &label("wind")),
            Some(140.0)
        );
    }

    #[test]
    fn test_timestamp_layout_skips_summary_row() {
        let row = |stamp: &str, wind: f64, solar: f64| {
            let mut row = vec![Cell::text(stamp), Cell::Empty, Cell::Number(wind)];
            row.extend((3..8).map(|_| Cell::Empty));
            row.push(Cell::Number(solar));
            row
        };
        let table = padded(
            7,
            vec![
                row("01.07.2011 00:00", 10.0, 0.5),
                row("01.07.2011 01:00", 11.0, 0.6),
                row(SUMMARY_ROW, 21.0, 1.1),
            ],
        );
        let params = ReaderParams::new("wind_solar_3", "http://svk.se", Resolution::Hourly);

        let series = from_table(&table, &params, &LabelNames::default()).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.columns(), &[label("wind"), label("solar")]);
        // standard time, not summer time, even in July
        assert_eq!(
            series.value(Utc.with_ymd_and_hms(2011, 6, 30, 23, 0, 0).unwrap(), &label("solar")),
            Some(0.5)
        );
    }

    #[test]
    fn test_out_of_range_hour_is_a_timestamp_error() {
        for hour in [1e17, 2500.0, -100.0] {
            let table = padded(
                4,
                vec![vec![Cell::Number(20090101.0), Cell::Number(hour), Cell::Empty, Cell::Number(1.0)]],
            );
            let params = ReaderParams::new("wind_solar_1", "http://svk.se", Resolution::Hourly);
            assert!(
                matches!(from_table(&table, &params, &LabelNames::default()), Err(ReadError::Timestamp(_))),
                "hour {hour}"
            );
        }
    }

    #[test]
    fn test_sheet_without_solar_column_is_a_layout_error() {
        let table = padded(
            7,
            vec![vec![Cell::text("01.07.2011 00:00"), Cell::Empty, Cell::Number(10.0)]],
        );
        let params = ReaderParams::new("wind_solar_3", "http://svk.se", Resolution::Hourly);
        assert!(matches!(
            from_table(&table, &params, &LabelNames::default()),
            Err(ReadError::Layout(_))
        ));
    }

    #[test]
    fn test_layout_selection() {
        assert_eq!(Layout::for_variable("wind_solar_2"), Layout::DateAndHour);
        assert_eq!(Layout::for_variable("wind_solar_4").skip(), 5);
        assert_eq!(Layout::for_variable("wind_solar_5").skip(), 7);
    }
}
