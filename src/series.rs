//! Time-indexed tables shared by every reader and the merge driver.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Sampling interval of a dataset. Declared by source configuration, never
/// inferred from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "15min")]
    QuarterHourly,
    #[serde(rename = "60min")]
    Hourly,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::QuarterHourly => "15min",
            Resolution::Hourly => "60min",
        }
    }

    pub fn step(self) -> TimeDelta {
        match self {
            Resolution::QuarterHourly => TimeDelta::minutes(15),
            Resolution::Hourly => TimeDelta::minutes(60),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown resolution {0:?}, expected 15min or 60min")]
pub struct ParseResolutionError(String);

impl FromStr for Resolution {
    type Err = ParseResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "15min" => Ok(Resolution::QuarterHourly),
            "60min" => Ok(Resolution::Hourly),
            other => Err(ParseResolutionError(other.to_string())),
        }
    }
}

/// Five-level column label: what is measured, where, which attribute, who
/// published it and where it was published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Label {
    pub kind: String,
    pub region: String,
    pub attribute: String,
    pub source: String,
    pub web: String,
}

impl Label {
    pub fn new(
        kind: impl Into<String>,
        region: impl Into<String>,
        attribute: impl Into<String>,
        source: impl Into<String>,
        web: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            region: region.into(),
            attribute: attribute.into(),
            source: source.into(),
            web: web.into(),
        }
    }

    /// Label levels in header order.
    pub fn levels(&self) -> [&str; 5] {
        [
            &self.kind,
            &self.region,
            &self.attribute,
            &self.source,
            &self.web,
        ]
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.kind, self.region, self.attribute, self.source
        )
    }
}

/// Names of the five label levels, written as the first cell of each header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelNames([String; 5]);

impl LabelNames {
    pub fn new(names: [&str; 5]) -> Self {
        Self(names.map(str::to_string))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for LabelNames {
    fn default() -> Self {
        Self::new(["variable", "country", "attribute", "source", "web"])
    }
}

/// A table indexed by UTC instants with labeled value columns.
///
/// The index is strictly increasing and unique by construction: rows are
/// kept in a `BTreeMap` and [`SeriesBuilder`] refuses to overwrite an
/// existing instant.
#[derive(Debug, Clone)]
pub struct NormalizedSeries {
    names: LabelNames,
    columns: Vec<Label>,
    rows: BTreeMap<DateTime<Utc>, Vec<Option<f64>>>,
    collisions: usize,
}

impl NormalizedSeries {
    pub fn empty(names: LabelNames) -> Self {
        Self {
            names,
            columns: Vec::new(),
            rows: BTreeMap::new(),
            collisions: 0,
        }
    }

    pub fn names(&self) -> &LabelNames {
        &self.names
    }

    pub fn columns(&self) -> &[Label] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows that were discarded because their instant already existed.
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next_back().copied()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.rows.keys().copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = (DateTime<Utc>, &[Option<f64>])> + '_ {
        self.rows.iter().map(|(ts, values)| (*ts, values.as_slice()))
    }

    pub fn column_index(&self, label: &Label) -> Option<usize> {
        self.columns.iter().position(|c| c == label)
    }

    /// Value at `ts` in column `label`; `None` for a null cell, a missing row
    /// or an unknown column.
    pub fn value(&self, ts: DateTime<Utc>, label: &Label) -> Option<f64> {
        let idx = self.column_index(label)?;
        self.rows.get(&ts).and_then(|row| row[idx])
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.rows.contains_key(&ts)
    }

    /// Drops every row after `cutoff` (the cutoff itself is kept).
    pub fn truncate_after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.rows.retain(|ts, _| *ts <= cutoff);
        self
    }

    /// Moves every row by `delta`.
    pub fn shift(self, delta: TimeDelta) -> Self {
        let rows = self
            .rows
            .into_iter()
            .map(|(ts, values)| (ts + delta, values))
            .collect();
        Self { rows, ..self }
    }

    /// Column-wise merge where values already present win.
    ///
    /// Columns are unioned in first-seen order, the index is unioned, and a
    /// null cell of `self` is filled from `other`. A non-null cell of `self`
    /// is never replaced.
    pub fn combine_first(self, other: NormalizedSeries) -> Self {
        let mut columns = self.columns;
        let mut positions: HashMap<Label, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect();
        let mapping: Vec<usize> = other
            .columns
            .into_iter()
            .map(|label| {
                *positions.entry(label.clone()).or_insert_with(|| {
                    columns.push(label);
                    columns.len() - 1
                })
            })
            .collect();

        let width = columns.len();
        let mut rows = self.rows;
        for values in rows.values_mut() {
            values.resize(width, None);
        }

        for (ts, values) in other.rows {
            let row = rows.entry(ts).or_insert_with(|| vec![None; width]);
            for (value, &target) in values.into_iter().zip(&mapping) {
                if row[target].is_none() {
                    row[target] = value;
                }
            }
        }

        Self {
            names: self.names,
            columns,
            rows,
            collisions: self.collisions + other.collisions,
        }
    }

    /// Reindexes onto a strictly regular grid from the first to the last
    /// instant, so that missing instants become all-null rows.
    ///
    /// Rows that do not fall on the grid anchored at the first instant are
    /// dropped.
    pub fn reindex_regular(self, step: TimeDelta) -> Self {
        let (Some(start), Some(end)) = (self.first_timestamp(), self.last_timestamp()) else {
            return self;
        };
        let width = self.columns.len();
        let mut source = self.rows;
        let mut rows = BTreeMap::new();
        let mut gaps = 0usize;

        let mut ts = start;
        while ts <= end {
            let values = source.remove(&ts).unwrap_or_else(|| {
                gaps += 1;
                vec![None; width]
            });
            rows.insert(ts, values);
            ts += step;
        }

        if !source.is_empty() {
            warn!(
                dropped = source.len(),
                step_minutes = step.num_minutes(),
                "rows off the regular grid dropped"
            );
        }
        debug!(rows = rows.len(), gaps, "reindexed onto regular grid");

        Self { rows, ..self }
    }

    /// Resamples onto `step`-aligned instants, carrying the most recent row
    /// forward into every slot until the next row.
    pub fn resample_ffill(self, step: TimeDelta) -> Self {
        let (Some(first), Some(last)) = (self.first_timestamp(), self.last_timestamp()) else {
            return self;
        };
        let start = floor_to_step(first, step);
        let end = floor_to_step(last, step);

        let mut source = self.rows.into_iter().peekable();
        let mut current: Option<Vec<Option<f64>>> = None;
        let mut rows = BTreeMap::new();

        let mut ts = start;
        while ts <= end {
            while let Some((_, values)) = source.next_if(|(row_ts, _)| *row_ts <= ts) {
                current = Some(values);
            }
            if let Some(values) = &current {
                rows.insert(ts, values.clone());
            }
            ts += step;
        }

        Self { rows, ..self }
    }
}

fn floor_to_step(ts: DateTime<Utc>, step: TimeDelta) -> DateTime<Utc> {
    let step = step.num_seconds();
    let secs = ts.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(step), 0).unwrap_or(ts)
}

/// Accumulates rows for one reader and hands out a [`NormalizedSeries`].
#[derive(Debug)]
pub struct SeriesBuilder {
    series: NormalizedSeries,
}

impl SeriesBuilder {
    pub fn new(names: LabelNames, columns: Vec<Label>) -> Self {
        Self {
            series: NormalizedSeries {
                columns,
                ..NormalizedSeries::empty(names)
            },
        }
    }

    /// Inserts a row. A row for an instant that already exists is discarded
    /// and counted; the first row stays.
    pub fn push(&mut self, ts: DateTime<Utc>, mut values: Vec<Option<f64>>) {
        values.resize(self.series.columns.len(), None);
        match self.series.rows.entry(ts) {
            Entry::Vacant(v) => {
                v.insert(values);
            }
            Entry::Occupied(_) => {
                self.series.collisions += 1;
                warn!(%ts, "duplicate instant after normalization, keeping first row");
            }
        }
    }

    pub fn finish(self) -> NormalizedSeries {
        self.series
    }
}
