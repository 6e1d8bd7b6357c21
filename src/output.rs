//! Output formatting and persistence for merged datasets.
//!
//! Supports pretty-printing and JSON logging of coverage summaries, and CSV
//! export of a dataset with its label header.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use csv::WriterBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::series::{NormalizedSeries, Resolution};
use crate::stats::DatasetSummary;

/// Logs a summary using Rust's debug pretty-print format.
pub fn print_pretty(summary: &DatasetSummary) {
    debug!("{:#?}", summary);
}

/// Logs a summary as pretty-printed JSON.
pub fn print_json(summary: &DatasetSummary) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

/// `<dir>/time_series_<resolution>.csv`
pub fn dataset_path(dir: &Path, resolution: Resolution) -> PathBuf {
    dir.join(format!("time_series_{resolution}.csv"))
}

/// Writes `series` as CSV: one header row per label level, led by the level
/// name, then one row per instant with empty fields for missing values.
pub fn write_dataset(path: &Path, series: &NormalizedSeries) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    for (level, name) in series.names().as_slice().iter().enumerate() {
        let mut record = vec![name.as_str()];
        record.extend(series.columns().iter().map(|label| label.levels()[level]));
        writer.write_record(&record)?;
    }

    for (ts, values) in series.rows() {
        let mut record = Vec::with_capacity(values.len() + 1);
        record.push(ts.to_rfc3339_opts(SecondsFormat::Secs, true));
        record.extend(values.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    debug!(path = %path.display(), rows = series.len(), "dataset written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{Label, LabelNames, SeriesBuilder};
    use chrono::{TimeZone, Utc};
    use std::fs;

    fn series() -> NormalizedSeries {
        let columns = vec![
            Label::new("wind", "DEtennet", "generation", "TenneT", "http://tennet"),
            Label::new("solar", "DEtennet", "forecast", "TenneT", "http://tennet"),
        ];
        let mut builder = SeriesBuilder::new(LabelNames::default(), columns);
        builder.push(Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap(), vec![Some(1.5), None]);
        builder.push(Utc.with_ymd_and_hms(2015, 1, 1, 0, 15, 0).unwrap(), vec![None, Some(2.0)]);
        builder.finish()
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&DatasetSummary::default());
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&DatasetSummary::default()).unwrap();
    }

    #[test]
    fn test_dataset_path() {
        assert_eq!(
            dataset_path(Path::new("out"), Resolution::QuarterHourly),
            Path::new("out/time_series_15min.csv")
        );
    }

    #[test]
    fn test_write_dataset_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("time_series_15min.csv");

        write_dataset(&path, &series()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "variable,wind,solar",
                "country,DEtennet,DEtennet",
                "attribute,generation,forecast",
                "source,TenneT,TenneT",
                "web,http://tennet,http://tennet",
                "2015-01-01T00:00:00Z,1.5,",
                "2015-01-01T00:15:00Z,,2",
            ]
        );
    }
}
