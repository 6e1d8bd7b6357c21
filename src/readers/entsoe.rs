//! ENTSO-E data portal hourly load workbooks.
//!
//! One row per (country, day) with the 24 hours spread over the columns.
//! October files label the third hour `3A:00:00` / `3B:00:00` on every day,
//! although only the day of the actual transition has a second one.

use chrono::{NaiveDateTime, TimeDelta};
use chrono_tz::Europe::{Berlin, Brussels};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

use super::{LocalRow, ReaderParams, Source, localize_rows};
use crate::error::ReadError;
use crate::series::{Label, LabelNames, NormalizedSeries};
use crate::table::{NumberFormat, RawTable, SheetChoice, cell, load_workbook, number, require_width, width_of};
use crate::timezone::{Ambiguity, all_transitions, years_of};

const HEADER_ROW: usize = 9;
const FIRST_HOUR_COLUMN: usize = 2;
const FIRST_TRANSITION_YEAR: i32 = 2000;

/// Country codes the portal spells differently from the rest of the dataset.
const COUNTRY_RENAMES: &[(&str, &str)] = &[("DK_W", "DKw"), ("UA_W", "UAw")];

/// One hour column of the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HourColumn {
    /// Hour of day counted from 1.
    hour: i64,
    /// `A`/`B` marker of the October third hour.
    marker: Option<char>,
}

impl HourColumn {
    fn parse(raw: &str) -> Option<Self> {
        let head: String = raw.chars().take(2).collect();
        let marker = head.chars().find(|c| matches!(c, 'A' | 'B'));
        let digits: String = head.chars().filter(char::is_ascii_digit).collect();
        let hour = digits.parse().ok().filter(|h| (1..=24).contains(h))?;
        Some(Self { hour, marker })
    }
}

fn country_code(raw: &str) -> String {
    COUNTRY_RENAMES
        .iter()
        .find(|(from, _)| *from == raw)
        .map_or_else(|| raw.to_string(), |(_, to)| to.to_string())
}

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
    let header = table
        .row(HEADER_ROW)
        .ok_or_else(|| ReadError::Layout("missing header row".into()))?;
    let mut hours: Vec<(usize, HourColumn)> = Vec::new();
    for (col, c) in header.iter().enumerate().skip(FIRST_HOUR_COLUMN) {
        let raw = c.as_label();
        if raw.is_empty() {
            continue;
        }
        let parsed = HourColumn::parse(&raw)
            .ok_or_else(|| ReadError::Layout(format!("unexpected hour column {raw:?}")))?;
        hours.push((col, parsed));
    }
    if hours.is_empty() {
        return Err(ReadError::Layout("no hour columns in header row".into()));
    }
    let width = width_of(hours.iter().map(|(col, _)| *col));

    // (local time, A/B marker) -> country -> value
    let mut long: BTreeMap<(NaiveDateTime, Option<char>), BTreeMap<String, f64>> = BTreeMap::new();
    let mut countries: BTreeSet<String> = BTreeSet::new();

    for (i, row) in table.rows_from(HEADER_ROW + 1).iter().enumerate() {
        let row_index = HEADER_ROW + 1 + i;
        let Some(country) = cell(row, 0).as_text().map(country_code) else {
            continue;
        };
        require_width(row, row_index, width)?;
        let day_cell = cell(row, 1);
        let day = day_cell
            .to_date()
            .ok_or_else(|| ReadError::Timestamp(day_cell.as_label()))?;
        let midnight = day.and_time(Default::default());

        for (col, hour) in &hours {
            let Some(value) = number(row, row_index, *col, NumberFormat::POINT)? else {
                continue;
            };
            let local = midnight + TimeDelta::hours(hour.hour - 1);
            countries.insert(country.clone());
            long.entry((local, hour.marker))
                .or_default()
                .entry(country.clone())
                .or_insert(value);
        }
    }

    let years = years_of(long.keys().map(|(local, _)| local))
        .into_iter()
        .filter(|year| *year >= FIRST_TRANSITION_YEAR);
    let transitions = all_transitions(Berlin, years);
    let before = long.len();
    // A `3B` hour is only real on the autumn transition day; an unmarked
    // third hour on a transition day is the spring hour that does not exist.
    long.retain(|(local, marker), _| match marker {
        Some('B') => transitions.contains(local),
        None => !transitions.contains(local),
        _ => true,
    });
    debug!(dropped = before - long.len(), "transition hours dropped");

    let countries: Vec<String> = countries.into_iter().collect();
    let rows: Vec<LocalRow> = long
        .into_iter()
        .map(|((local, _), values)| {
            let row = countries.iter().map(|c| values.get(c).copied()).collect();
            (local, row)
        })
        .collect();

    let columns = countries
        .iter()
        .map(|country| {
            Label::new(
                "load",
                country.as_str(),
                "load",
                Source::EntsoE.name(),
                params.web.as_str(),
            )
        })
        .collect();
    localize_rows(rows, Brussels, Ambiguity::Infer, columns, names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::test_support::assert_clean_index;
    use crate::series::Resolution;
    use crate::table::Cell;
    use chrono::{TimeZone, Utc};

    fn header(hour_labels: &[&str]) -> Vec<Cell> {
        let mut row = vec![Cell::text("Country"), Cell::text("Day")];
        row.extend(hour_labels.iter().map(|h| Cell::text(h)));
        row
    }

    fn sheet(hour_labels: &[&str], data: Vec<Vec<Cell>>) -> RawTable {
        let mut rows: Vec<Vec<Cell>> = (0..HEADER_ROW).map(|_| vec![Cell::Empty]).collect();
        rows.push(header(hour_labels));
        rows.extend(data);
        RawTable::new(rows)
    }

    fn data_row(country: &str, day: &str, values: &[&str]) -> Vec<Cell> {
        let mut row = vec![Cell::text(country), Cell::text(day)];
        row.extend(values.iter().map(|v| Cell::text(v)));
        row
    }

    fn params() -> ReaderParams {
        ReaderParams::new("load", "https://entsoe.eu", Resolution::Hourly)
    }

    fn load(country: &str) -> Label {
        Label::new("load", country, "load", "ENTSO-E", "https://entsoe.eu")
    }

    #[test]
    fn test_hour_column_parsing() {
        assert_eq!(HourColumn::parse("01:00:00"), Some(HourColumn { hour: 1, marker: None }));
        assert_eq!(HourColumn::parse("3B:00:00"), Some(HourColumn { hour: 3, marker: Some('B') }));
        assert_eq!(HourColumn::parse("24:00:00"), Some(HourColumn { hour: 24, marker: None }));
        assert_eq!(HourColumn::parse("Total"), None);
    }

    #[test]
    fn test_october_days_keep_3b_only_on_transition_day() {
        let labels = ["02:00:00", "3A:00:00", "3B:00:00", "04:00:00"];
        let table = sheet(
            &labels,
            vec![
                data_row("DE", "2015-10-24", &["1", "2", "", "4"]),
                data_row("DE", "2015-10-25", &["10", "20", "30", "40"]),
                data_row("DK_W", "2015-10-25", &["5", "6", "7", "n.a."]),
            ],
        );

        let series = from_table(&table, &params(), &LabelNames::default()).unwrap();

        assert_clean_index(&series);
        assert_eq!(series.columns(), &[load("DE"), load("DKw")]);
        // 24 Oct: 01:00, 02:00, 03:00 CEST; 25 Oct: 01:00, 02:00 CEST, 02:00 CET, 03:00 CET
        assert_eq!(series.len(), 7);
        let utc = |d, h| Utc.with_ymd_and_hms(2015, 10, d, h, 0, 0).unwrap();
        assert_eq!(series.value(utc(25, 0), &load("DE")), Some(20.0));
        assert_eq!(series.value(utc(25, 1), &load("DE")), Some(30.0));
        assert_eq!(series.value(utc(25, 2), &load("DE")), Some(40.0));
        assert_eq!(series.value(utc(25, 1), &load("DKw")), Some(7.0));
        assert_eq!(series.value(utc(25, 2), &load("DKw")), None);
    }

    #[test]
    fn test_spring_third_hour_dropped() {
        let labels = ["02:00:00", "03:00:00", "04:00:00"];
        let table = sheet(
            &labels,
            vec![
                data_row("FR", "2015-03-29", &["1", "", "3"]),
                data_row("FR", "2015-03-30", &["1", "2", "3"]),
            ],
        );

        let series = from_table(&table, &params(), &LabelNames::default()).unwrap();

        assert_clean_index(&series);
        assert_eq!(series.len(), 5);
        assert_eq!(
            series.value(Utc.with_ymd_and_hms(2015, 3, 29, 1, 0, 0).unwrap(), &load("FR")),
            Some(3.0)
        );
    }

    #[test]
    fn test_spring_third_hour_with_value_is_still_dropped() {
        let table = sheet(
            &["03:00:00"],
            vec![data_row("FR", "2015-03-29", &["99"]), data_row("FR", "2015-03-28", &["1"])],
        );
        let series = from_table(&table, &params(), &LabelNames::default()).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_row_shorter_than_hour_columns_is_a_layout_error() {
        let table = sheet(
            &["01:00:00", "02:00:00", "03:00:00"],
            vec![data_row("FR", "2015-06-01", &["1", "2"])],
        );
        assert!(matches!(
            from_table(&table, &params(), &LabelNames::default()),
            Err(ReadError::Layout(_))
        ));
    }

    #[test]
    fn test_missing_header_row_is_a_layout_error() {
        let table = RawTable::new(vec![vec![Cell::text("Country")]]);
        assert!(matches!(
            from_table(&table, &params(), &LabelNames::default()),
            Err(ReadError::Layout(_))
        ));
    }
}
