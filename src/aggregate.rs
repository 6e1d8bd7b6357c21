//! Merge driver: reads every configured file and merges the results per
//! resolution bucket.
//!
//! Files are expected at `<out_path>/<source>/<variable>/<container>/<file>`
//! with exactly one file per container. Per-file problems never abort a run;
//! each container yields an [`Outcome`] instead.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{SourceCatalog, VariableParams};
use crate::readers::{self, ReaderParams, Source};
use crate::series::{LabelNames, NormalizedSeries, Resolution};

/// Files below this size are empty downloads or error pages.
pub const MIN_FILE_BYTES: u64 = 128;

/// Last instant kept from any file unless configured otherwise.
pub fn default_cutoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 12, 31, 22, 45, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// What happened to one configured variable or one container.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    UnsupportedSource {
        name: String,
    },
    MissingDirectory {
        path: PathBuf,
    },
    UnexpectedFileCount {
        path: PathBuf,
        count: usize,
    },
    TooSmall {
        path: PathBuf,
        bytes: u64,
    },
    Failed {
        path: PathBuf,
        error: String,
    },
    Merged {
        path: PathBuf,
        resolution: Resolution,
        rows: usize,
    },
}

impl Outcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, Outcome::Merged { .. })
    }
}

/// Result of one [`Aggregator::run`].
#[derive(Debug)]
pub struct AggregateRun {
    pub datasets: BTreeMap<Resolution, NormalizedSeries>,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    out_path: PathBuf,
    names: LabelNames,
    cutoff: Option<DateTime<Utc>>,
    subset: Option<Vec<String>>,
}

impl Aggregator {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            names: LabelNames::default(),
            cutoff: Some(default_cutoff()),
            subset: None,
        }
    }

    /// `None` keeps every row.
    pub fn with_cutoff(mut self, cutoff: Option<DateTime<Utc>>) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Only reads the named sources.
    pub fn with_subset(mut self, subset: Vec<String>) -> Self {
        self.subset = Some(subset);
        self
    }

    /// Reads and merges every configured variable in catalog order.
    ///
    /// Earlier contributions win: a later file only fills cells that are still
    /// null. Every non-empty bucket is reindexed onto its regular grid once
    /// all files are merged. I/O problems are reported as
    /// [`Outcome::Failed`] like any other per-file failure.
    #[tracing::instrument(skip(self, catalog), fields(out_path = %self.out_path.display()))]
    pub fn run(&self, catalog: &SourceCatalog) -> AggregateRun {
        let mut buckets: BTreeMap<Resolution, NormalizedSeries> = BTreeMap::new();
        let mut outcomes = Vec::new();

        for entry in catalog.sources() {
            if self.subset.as_ref().is_some_and(|subset| !subset.contains(&entry.name)) {
                continue;
            }
            let Some(source) = Source::from_name(&entry.name) else {
                warn!(source = %entry.name, "no reader for source, skipped");
                outcomes.push(Outcome::UnsupportedSource {
                    name: entry.name.clone(),
                });
                continue;
            };
            for (variable, params) in &entry.variables {
                self.read_variable(source, variable, params, &mut buckets, &mut outcomes);
            }
        }

        let datasets = buckets
            .into_iter()
            .map(|(resolution, series)| {
                let series = series.reindex_regular(resolution.step());
                info!(%resolution, rows = series.len(), columns = series.columns().len(), "dataset ready");
                (resolution, series)
            })
            .collect();
        AggregateRun { datasets, outcomes }
    }

    fn read_variable(
        &self,
        source: Source,
        variable: &str,
        params: &VariableParams,
        buckets: &mut BTreeMap<Resolution, NormalizedSeries>,
        outcomes: &mut Vec<Outcome>,
    ) {
        let variable_dir = self.out_path.join(source.name()).join(variable);
        if !variable_dir.is_dir() {
            info!(%source, variable, "folder not found");
            outcomes.push(Outcome::MissingDirectory { path: variable_dir });
            return;
        }

        let containers = match sorted_entries(&variable_dir) {
            Ok(containers) => containers,
            Err(error) => {
                outcomes.push(failed(&variable_dir, &error));
                return;
            }
        };
        let reader_params = ReaderParams::new(variable, params.web.as_str(), params.resolution);
        for container in containers {
            let outcome = self
                .read_container(source, &container, &reader_params, buckets)
                .unwrap_or_else(|error| failed(&container, &error));
            outcomes.push(outcome);
        }
    }

    fn read_container(
        &self,
        source: Source,
        container: &Path,
        params: &ReaderParams,
        buckets: &mut BTreeMap<Resolution, NormalizedSeries>,
    ) -> Result<Outcome> {
        let files = if container.is_dir() {
            sorted_entries(container)?
        } else {
            Vec::new()
        };
        let [file] = files.as_slice() else {
            warn!(%source, variable = %params.variable, container = %container.display(), count = files.len(), "expected exactly one file");
            return Ok(Outcome::UnexpectedFileCount {
                path: container.to_path_buf(),
                count: files.len(),
            });
        };

        let bytes = std::fs::metadata(file)
            .with_context(|| format!("reading metadata of {}", file.display()))?
            .len();
        if bytes < MIN_FILE_BYTES {
            info!(file = %file.display(), bytes, "file is probably empty, skipped");
            return Ok(Outcome::TooSmall {
                path: file.clone(),
                bytes,
            });
        }

        info!(%source, variable = %params.variable, file = %file.display(), "reading data");
        let series = match readers::read(source, file, params, &self.names) {
            Ok(series) => series,
            Err(error) => {
                warn!(file = %file.display(), %error, "read failed, skipped");
                return Ok(Outcome::Failed {
                    path: file.clone(),
                    error: error.to_string(),
                });
            }
        };
        let series = match self.cutoff {
            Some(cutoff) => series.truncate_after(cutoff),
            None => series,
        };
        let rows = series.len();

        let merged = match buckets.remove(&params.resolution) {
            Some(existing) => existing.combine_first(series),
            None => series,
        };
        debug!(resolution = %params.resolution, rows = merged.len(), "bucket updated");
        buckets.insert(params.resolution, merged);

        Ok(Outcome::Merged {
            path: file.clone(),
            resolution: params.resolution,
            rows,
        })
    }
}

fn failed(path: &Path, error: &anyhow::Error) -> Outcome {
    let error = format!("{error:#}");
    warn!(path = %path.display(), %error, "unreadable, skipped");
    Outcome::Failed {
        path: path.to_path_buf(),
        error,
    }
}

/// Directory entries sorted by name.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Label;
    use chrono::TimeDelta;
    use std::fs;

    const HEADER: &str = "Datum;Uhrzeit;Prognose (MW);Online Hochrechnung (MW)\n";

    /// An Amprion file, padded with blank rows so it clears the size floor.
    fn amprion(rows: &[(&str, &str, &str)]) -> String {
        let mut text = HEADER.to_string();
        for (time, forecast, generation) in rows {
            text.push_str(&format!("01.06.2015;{time};{forecast};{generation}\n"));
        }
        while text.len() < MIN_FILE_BYTES as usize {
            text.push_str(";;;\n");
        }
        text
    }

    fn put(root: &Path, source: &str, variable: &str, container: &str, name: &str, content: &str) {
        let dir = root.join(source).join(variable).join(container);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    fn catalog(json: &str) -> SourceCatalog {
        SourceCatalog::from_json(json).unwrap()
    }

    const AMPRION_WIND: &str =
        r#"{"Amprion": {"wind": {"web": "http://amprion", "resolution": "15min"}}}"#;

    fn forecast() -> Label {
        Label::new("wind", "DEamprion", "forecast", "Amprion", "http://amprion")
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 5, 31, h, m, 0).unwrap()
    }

    #[test]
    fn test_non_null_value_wins_regardless_of_order() {
        for (first, second) in [("", "5"), ("5", "")] {
            let dir = tempfile::tempdir().unwrap();
            put(dir.path(), "Amprion", "wind", "a", "f.csv", &amprion(&[("00:00", first, "1")]));
            put(dir.path(), "Amprion", "wind", "b", "f.csv", &amprion(&[("00:00", second, "2")]));

            let run = Aggregator::new(dir.path()).run(&catalog(AMPRION_WIND));

            let dataset = &run.datasets[&Resolution::QuarterHourly];
            assert_eq!(dataset.value(at(22, 0), &forecast()), Some(5.0));
            let generation = Label::new("wind", "DEamprion", "generation", "Amprion", "http://amprion");
            // the earlier container wins where both have a value
            assert_eq!(dataset.value(at(22, 0), &generation), Some(1.0));
        }
    }

    #[test]
    fn test_missing_step_becomes_null_row() {
        let dir = tempfile::tempdir().unwrap();
        put(
            dir.path(),
            "Amprion",
            "wind",
            "2015",
            "f.csv",
            &amprion(&[("00:00", "1", "1"), ("00:15", "2", "2"), ("00:45", "4", "4")]),
        );

        let run = Aggregator::new(dir.path()).run(&catalog(AMPRION_WIND));

        let dataset = &run.datasets[&Resolution::QuarterHourly];
        assert_eq!(dataset.len(), 4);
        assert!(dataset.contains(at(22, 30)));
        assert_eq!(dataset.columns().len(), 2);
        let gap: Vec<_> = dataset.rows().find(|(ts, _)| *ts == at(22, 30)).unwrap().1.to_vec();
        assert_eq!(gap, vec![None, None]);
    }

    #[test]
    fn test_soft_failures_are_reported_per_container() {
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "Amprion", "wind", "a_ok", "f.csv", &amprion(&[("00:00", "1", "1")]));
        put(dir.path(), "Amprion", "wind", "b_two", "f.csv", &amprion(&[("00:00", "1", "1")]));
        put(dir.path(), "Amprion", "wind", "b_two", "g.csv", &amprion(&[("00:00", "1", "1")]));
        put(dir.path(), "Amprion", "wind", "c_small", "f.csv", "Datum;Uhrzeit\n");
        put(dir.path(), "Amprion", "wind", "d_bad", "f.csv", &amprion(&[("00:00", "abc", "1")]));
        let json = r#"{
            "RTE": {"load": {"web": "w", "resolution": "60min"}},
            "Amprion": {"wind": {"web": "http://amprion", "resolution": "15min"}},
            "TenneT": {"wind": {"web": "w", "resolution": "15min"}}
        }"#;

        let run = Aggregator::new(dir.path()).run(&catalog(json));

        assert_eq!(run.outcomes.len(), 6);
        assert!(matches!(&run.outcomes[0], Outcome::UnsupportedSource { name } if name == "RTE"));
        assert!(run.outcomes[1].is_merged());
        assert!(matches!(run.outcomes[2], Outcome::UnexpectedFileCount { count: 2, .. }));
        assert!(matches!(run.outcomes[3], Outcome::TooSmall { .. }));
        assert!(matches!(run.outcomes[4], Outcome::Failed { .. }));
        assert!(matches!(run.outcomes[5], Outcome::MissingDirectory { .. }));
        assert_eq!(run.datasets.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_does_not_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let dangling = dir.path().join("Amprion").join("wind").join("a_dangling");
        fs::create_dir_all(&dangling).unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere.csv"), dangling.join("f.csv")).unwrap();
        put(dir.path(), "Amprion", "wind", "b_ok", "f.csv", &amprion(&[("00:00", "1", "1")]));

        let run = Aggregator::new(dir.path()).run(&catalog(AMPRION_WIND));

        assert!(
            matches!(&run.outcomes[0], Outcome::Failed { path, .. } if path == &dangling),
            "{:?}",
            run.outcomes
        );
        assert!(run.outcomes[1].is_merged());
        assert_eq!(run.datasets[&Resolution::QuarterHourly].value(at(22, 0), &forecast()), Some(1.0));
    }

    #[test]
    fn test_cutoff_is_inclusive_and_configurable() {
        let dir = tempfile::tempdir().unwrap();
        put(
            dir.path(),
            "Amprion",
            "wind",
            "2015",
            "f.csv",
            &amprion(&[("00:00", "1", "1"), ("00:15", "2", "2"), ("00:30", "3", "3")]),
        );
        let cutoff = at(22, 15);

        let run = Aggregator::new(dir.path())
            .with_cutoff(Some(cutoff))
            .run(&catalog(AMPRION_WIND));

        let dataset = &run.datasets[&Resolution::QuarterHourly];
        assert_eq!(dataset.last_timestamp(), Some(cutoff));
        assert!(matches!(run.outcomes[0], Outcome::Merged { rows: 2, .. }));
        assert_eq!(default_cutoff() + TimeDelta::minutes(15), Utc.with_ymd_and_hms(2015, 12, 31, 23, 0, 0).unwrap());
    }

    #[test]
    fn test_subset_limits_sources() {
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "Amprion", "wind", "2015", "f.csv", &amprion(&[("00:00", "1", "1")]));
        let json = r#"{
            "Amprion": {"wind": {"web": "http://amprion", "resolution": "15min"}},
            "TenneT": {"wind": {"web": "w", "resolution": "15min"}}
        }"#;

        let run = Aggregator::new(dir.path())
            .with_subset(vec!["TenneT".to_string()])
            .run(&catalog(json));

        assert!(run.datasets.is_empty());
        assert!(matches!(run.outcomes[..], [Outcome::MissingDirectory { .. }]));
    }
}
