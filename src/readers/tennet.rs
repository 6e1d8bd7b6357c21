//! TenneT TSO (Germany) wind and solar CSV exports.
//!
//! Rows are addressed by date and quarter position (1..=96) rather than by a
//! wall-clock time, and the date is only written on the first row of a day.
//! Transition days do not follow the 92/100 convention consistently, so the
//! positions are repaired before they are turned into local timestamps.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use chrono_tz::Europe::Berlin;
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{LocalRow, ReaderParams, Source, attribute_labels, localize_rows};
use crate::error::ReadError;
use crate::series::{Label, LabelNames, NormalizedSeries};
use crate::table::{Encoding, NumberFormat, RawTable, cell, load_delimited, number, require_width};
use crate::timezone::Ambiguity;

const FIRST_DATA_ROW: usize = 4;
/// Rows a date is carried down before it counts as missing.
const DATE_FILL_LIMIT: usize = 100;
const QUARTERS_PER_DAY: i64 = 96;

/// A correction for one day whose published positions are known to be wrong.
#[derive(Debug)]
enum Correction {
    /// Remove rows with these positions.
    Drop(&'static [i64]),
    /// Renumber the remaining rows at or after `from`, in file order, to the
    /// concatenation of `to`.
    Renumber {
        from: i64,
        to: &'static [RangeInclusive<i64>],
    },
    /// Remove the four quarters of this local hour.
    DropHour(i64),
}

/// Dated patches for days the generic rules cannot repair.
const KNOWN_DEFECTS: &[((i32, u32, u32), &[Correction])] = &[
    // 94 rows on the spring transition day; positions 8 and 10 are spurious.
    (
        (2012, 3, 25),
        &[
            Correction::Drop(&[8, 10]),
            Correction::Renumber {
                from: 9,
                to: &[8..=8, 13..=96],
            },
        ],
    ),
    ((2012, 9, 27), &[Correction::Drop(&[97])]),
    // The missing spring hour is published as empty rows.
    ((2006, 3, 26), &[Correction::DropHour(2)]),
    ((2008, 3, 30), &[Correction::DropHour(2)]),
    ((2009, 3, 29), &[Correction::DropHour(2)]),
];

#[derive(Debug, Clone)]
struct QuarterRow {
    date: NaiveDate,
    position: i64,
    values: Vec<Option<f64>>,
}

impl QuarterRow {
    fn local(&self) -> Result<NaiveDateTime, ReadError> {
        if !(1..=QUARTERS_PER_DAY).contains(&self.position) {
            return Err(ReadError::Layout(format!(
                "quarter position {} on {} after corrections",
                self.position, self.date
            )));
        }
        Ok(self.date.and_time(Default::default()) + TimeDelta::minutes((self.position - 1) * 15))
    }
}

#[tracing::instrument(skip(params, names), fields(variable = %params.variable))]
pub fn read(path: &Path, params: &ReaderParams, names: &LabelNames) -> Result<NormalizedSeries, ReadError> {
    let table = load_delimited(path, b';', Encoding::Latin1)?;
    from_table(&table, params, names)
}

fn labels(params: &ReaderParams) -> Result<Vec<Label>, ReadError> {
    let mut labels = attribute_labels(
        &params.variable,
        "DEtennet",
        &["forecast", "generation"],
        Source::Tennet,
        &params.web,
    );
    match params.variable.as_str() {
        "solar" => {}
        "wind" => labels.push(Label::new(
            "wind-offshore",
            "DEtennet",
            "generation",
            Source::Tennet.name(),
            params.web.as_str(),
        )),
        other => {
            return Err(ReadError::Variable {
                provider: Source::Tennet.name(),
                variable: other.to_string(),
            });
        }
    }
    Ok(labels)
}

pub fn from_table(
    table: &RawTable,
    params: &ReaderParams,
    names: &LabelNames,
) -> Result<NormalizedSeries, ReadError> {
    let columns = labels(params)?;
    let mut rows = parse_rows(table, columns.len())?;
    if rows.is_empty() {
        return Err(ReadError::Layout("no data rows below the header".into()));
    }

    correct_positions(&mut rows);
    apply_known_defects(&mut rows)?;

    let local_rows = rows
        .into_iter()
        .map(|row| Ok((row.local()?, row.values)))
        .collect::<Result<Vec<LocalRow>, ReadError>>()?;
    localize_rows(local_rows, Berlin, Ambiguity::Infer, columns, names)
}

fn parse_rows(table: &RawTable, width: usize) -> Result<Vec<QuarterRow>, ReadError> {
    let mut rows = Vec::new();
    let mut current: Option<NaiveDate> = None;
    let mut carried = 0usize;

    for (i, row) in table.rows_from(FIRST_DATA_ROW).iter().enumerate() {
        let row_index = FIRST_DATA_ROW + i;
        let (date_cell, position_cell) = (cell(row, 0), cell(row, 1));
        if position_cell.is_empty() {
            continue;
        }
        require_width(row, row_index, 2 + width)?;
        if date_cell.is_empty() {
            carried += 1;
        } else {
            current = Some(
                date_cell
                    .to_date()
                    .ok_or_else(|| ReadError::Timestamp(date_cell.as_label()))?,
            );
            carried = 0;
        }
        let date = current
            .filter(|_| carried <= DATE_FILL_LIMIT)
            .ok_or_else(|| ReadError::Timestamp(format!("no date for row {row_index}")))?;
        let position = position_cell
            .to_integer()
            .ok_or_else(|| ReadError::Timestamp(position_cell.as_label()))?;
        let values = (2..2 + width)
            .map(|col| number(row, row_index, col, NumberFormat::POINT))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(QuarterRow { date, position, values });
    }
    Ok(rows)
}

/// Distinct dates in file order.
fn days(rows: &[QuarterRow]) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = Vec::new();
    for row in rows {
        if days.last() != Some(&row.date) {
            days.push(row.date);
        }
    }
    days
}

fn shift_day(rows: &mut [QuarterRow], date: NaiveDate, from: i64, by: i64) {
    for row in rows.iter_mut().filter(|r| r.date == date && r.position >= from) {
        row.position += by;
    }
}

/// Maps the 92-quarter spring day and the 100/101-quarter autumn day onto
/// positions 1..=96. The repeated autumn hour keeps its doubled positions.
fn correct_positions(rows: &mut Vec<QuarterRow>) {
    for date in days(rows) {
        let last = rows.iter().rev().find(|r| r.date == date).map(|r| r.position);
        let max = rows
            .iter()
            .filter(|r| r.date == date)
            .map(|r| r.position)
            .max()
            .unwrap_or_default();

        if last == Some(92) {
            debug!(%date, "spring day with 92 quarters");
            shift_day(rows, date, 9, 4);
        }
        if max > QUARTERS_PER_DAY {
            info!(%date, max_position = max, "day with more than 96 quarters");
        }
        match max {
            100 => shift_day(rows, date, 13, -4),
            101 => {
                rows.retain(|r| !(r.date == date && r.position == 13));
                shift_day(rows, date, 13, -5);
            }
            _ => {}
        }
    }
}

fn apply_known_defects(rows: &mut Vec<QuarterRow>) -> Result<(), ReadError> {
    for ((y, m, d), corrections) in KNOWN_DEFECTS {
        let Some(date) = NaiveDate::from_ymd_opt(*y, *m, *d) else {
            continue;
        };
        if !rows.iter().any(|r| r.date == date) {
            continue;
        }
        debug!(%date, "applying known defect corrections");
        for correction in *corrections {
            apply(rows, date, correction)?;
        }
    }
    Ok(())
}

fn apply(rows: &mut Vec<QuarterRow>, date: NaiveDate, correction: &Correction) -> Result<(), ReadError> {
    match correction {
        Correction::Drop(positions) => {
            rows.retain(|r| !(r.date == date && positions.contains(&r.position)));
        }
        Correction::DropHour(hour) => {
            rows.retain(|r| !(r.date == date && (r.position - 1) / 4 == *hour));
        }
        Correction::Renumber { from, to } => {
            let mut targets = to.iter().flat_map(|range| range.clone());
            for row in rows.iter_mut().filter(|r| r.date == date && r.position >= *from) {
                row.position = targets.next().ok_or_else(|| {
                    ReadError::Layout(format!("more rows than expected on {date}"))
                })?;
            }
            if targets.next().is_some() {
                warn!(%date, "fewer rows than expected for renumbering");
                return Err(ReadError::Layout(format!("fewer rows than expected on {date}")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::test_support::{assert_clean_index, write_temp};
    use crate::series::Resolution;
    use crate::table::parse_delimited;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeSet;

    const PREAMBLE: &str = "TenneT TSO GmbH\nTatsächliche und prognostizierte Solareinspeisung\nAngaben in MW\nDatum;Position;Prognose;Ist-Wert\n";

    /// One day of rows with the date written only on the first line. The
    /// generation value equals the published position.
    fn day(date: &str, positions: impl IntoIterator<Item = i64>) -> String {
        positions
            .into_iter()
            .enumerate()
            .map(|(i, pos)| {
                let date = if i == 0 { date } else { "" };
                format!("{date};{pos};1.5;{pos}\n")
            })
            .collect()
    }

    fn solar(body: &str) -> NormalizedSeries {
        let table = parse_delimited(&format!("{PREAMBLE}{body}"), b';').unwrap();
        let params = ReaderParams::new("solar", "http://tennet.eu", Resolution::QuarterHourly);
        from_table(&table, &params, &LabelNames::default()).unwrap()
    }

    fn generation() -> Label {
        Label::new("solar", "DEtennet", "generation", "TenneT", "http://tennet.eu")
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_autumn_day_with_100_positions() {
        let mut rows = parse_rows(
            &parse_delimited(&format!("{PREAMBLE}{}", day("2015-10-25", 1..=100)), b';').unwrap(),
            2,
        )
        .unwrap();
        correct_positions(&mut rows);
        let distinct: BTreeSet<i64> = rows.iter().map(|r| r.position).collect();
        assert_eq!(distinct, (1..=96).collect());

        let series = solar(&day("2015-10-25", 1..=100));
        assert_clean_index(&series);
        assert_eq!(series.len(), 100);
        assert_eq!(series.first_timestamp(), Some(utc(2015, 10, 24, 22, 0)));
        assert_eq!(series.last_timestamp(), Some(utc(2015, 10, 25, 22, 45)));
        // published positions 13..=16 are the standard-time copy of 02:00
        assert_eq!(series.value(utc(2015, 10, 25, 1, 0), &generation()), Some(13.0));
    }

    #[test]
    fn test_autumn_day_with_101_positions_drops_13th() {
        let series = solar(&day("2011-10-30", 1..=101));
        assert_clean_index(&series);
        assert_eq!(series.len(), 100);
        assert_eq!(series.value(utc(2011, 10, 30, 0, 0), &generation()), Some(9.0));
        assert_eq!(series.value(utc(2011, 10, 30, 1, 0), &generation()), Some(14.0));
        assert_eq!(series.last_timestamp(), Some(utc(2011, 10, 30, 22, 45)));
    }

    #[test]
    fn test_spring_day_with_92_positions() {
        let body = format!("{}{}", day("2015-03-29", 1..=92), day("2015-03-30", 1..=2));
        let series = solar(&body);
        assert_clean_index(&series);
        assert_eq!(series.len(), 94);
        assert_eq!(series.value(utc(2015, 3, 29, 0, 45), &generation()), Some(8.0));
        assert_eq!(series.value(utc(2015, 3, 29, 1, 0), &generation()), Some(9.0));
        assert_eq!(series.value(utc(2015, 3, 29, 21, 45), &generation()), Some(92.0));
        assert!(series.contains(utc(2015, 3, 29, 22, 0)));
    }

    #[test]
    fn test_known_defect_2012_03_25() {
        let series = solar(&day("2012-03-25", 1..=94));
        assert_clean_index(&series);
        assert_eq!(series.len(), 92);
        // published position 9 becomes 01:45, position 11 becomes 03:00
        assert_eq!(series.value(utc(2012, 3, 25, 0, 45), &generation()), Some(9.0));
        assert_eq!(series.value(utc(2012, 3, 25, 1, 0), &generation()), Some(11.0));
        assert_eq!(series.value(utc(2012, 3, 25, 21, 45), &generation()), Some(94.0));
    }

    #[test]
    fn test_known_defect_2012_09_27() {
        let series = solar(&day("2012-09-27", 1..=97));
        assert_clean_index(&series);
        assert_eq!(series.len(), 96);
        assert_eq!(series.value(utc(2012, 9, 27, 21, 45), &generation()), Some(96.0));
    }

    #[test]
    fn test_known_defect_empty_spring_hour() {
        let series = solar(&day("2009-03-29", 1..=96));
        assert_clean_index(&series);
        assert_eq!(series.len(), 92);
        assert_eq!(series.value(utc(2009, 3, 29, 1, 0), &generation()), Some(13.0));
    }

    #[test]
    fn test_unrepaired_overflow_is_a_layout_error() {
        let table = parse_delimited(&format!("{PREAMBLE}{}", day("2014-06-01", 1..=98)), b';').unwrap();
        let params = ReaderParams::new("solar", "w", Resolution::QuarterHourly);
        assert!(matches!(
            from_table(&table, &params, &LabelNames::default()),
            Err(ReadError::Layout(_))
        ));
    }

    #[test]
    fn test_wind_file_carries_offshore_column() {
        let dir = tempfile::tempdir().unwrap();
        let body = "2014-06-01;1;10;20;5\n;2;11;21;6\n";
        let path = write_temp(&dir, "wind.csv", format!("{PREAMBLE}{body}").as_bytes());
        let params = ReaderParams::new("wind", "http://tennet.eu", Resolution::QuarterHourly);

        let series = read(&path, &params, &LabelNames::default()).unwrap();

        let offshore = Label::new("wind-offshore", "DEtennet", "generation", "TenneT", "http://tennet.eu");
        assert_eq!(series.columns().len(), 3);
        assert_eq!(series.value(utc(2014, 5, 31, 22, 15), &offshore), Some(6.0));
    }

    #[test]
    fn test_wind_without_offshore_column_is_a_layout_error() {
        let table = parse_delimited(&format!("{PREAMBLE}{}", day("2014-06-01", 1..=4)), b';').unwrap();
        let params = ReaderParams::new("wind", "w", Resolution::QuarterHourly);
        assert!(matches!(
            from_table(&table, &params, &LabelNames::default()),
            Err(ReadError::Layout(_))
        ));
    }

    #[test]
    fn test_unknown_variable_is_rejected() {
        let table = parse_delimited(&format!("{PREAMBLE}{}", day("2014-06-01", 1..=4)), b';').unwrap();
        let params = ReaderParams::new("load", "w", Resolution::QuarterHourly);
        assert!(matches!(
            from_table(&table, &params, &LabelNames::default()),
            Err(ReadError::Variable { .. })
        ));
    }
}
