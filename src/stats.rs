use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::series::{NormalizedSeries, Resolution};

#[derive(Debug, Default, Serialize)]
pub struct DatasetSummary {
    pub resolution: Option<Resolution>,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub rows: usize,
    /// Rows without a single value.
    pub empty_rows: usize,
    pub collisions: usize,
    pub columns: Vec<ColumnCoverage>,
}

#[derive(Debug, Default, Serialize)]
pub struct ColumnCoverage {
    pub label: String,
    pub values: usize,
    pub coverage_pct: f64,
}

impl DatasetSummary {
    pub fn from_series(resolution: Resolution, series: &NormalizedSeries) -> Self {
        let mut values = vec![0usize; series.columns().len()];
        let mut empty_rows = 0;

        for (_, row) in series.rows() {
            if row.iter().all(Option::is_none) {
                empty_rows += 1;
            }
            for (count, value) in values.iter_mut().zip(row) {
                if value.is_some() {
                    *count += 1;
                }
            }
        }

        let rows = series.len();
        let columns = series
            .columns()
            .iter()
            .zip(values)
            .map(|(label, values)| ColumnCoverage {
                label: label.to_string(),
                values,
                coverage_pct: Self::pct(values, rows),
            })
            .collect();

        DatasetSummary {
            resolution: Some(resolution),
            first: series.first_timestamp(),
            last: series.last_timestamp(),
            rows,
            empty_rows,
            collisions: series.collisions(),
            columns,
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Lowest coverage of any column.
    pub fn min_coverage_pct(&self) -> f64 {
        self.columns
            .iter()
            .map(|c| c.coverage_pct)
            .fold(None, |min: Option<f64>, pct| Some(min.map_or(pct, |m| m.min(pct))))
            .unwrap_or(0.0)
    }
}
