//! One reader per data provider.
//!
//! Every reader turns a raw file into a [`NormalizedSeries`] indexed by UTC
//! instants and labeled with the canonical five-level [`Label`]. Readers do not
//! depend on each other; [`read`] dispatches on the closed [`Source`] set.

pub mod amprion;
pub mod capacities;
pub mod elia;
pub mod energinet;
pub mod entsoe;
pub mod hertz;
pub mod svenska_kraftnat;
pub mod tennet;
pub mod transnetbw;

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use std::fmt;
use std::path::Path;

use crate::error::ReadError;
use crate::series::{Label, LabelNames, NormalizedSeries, Resolution, SeriesBuilder};
use crate::timezone::{Ambiguity, localize};

/// Data providers with a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Elia,
    EnerginetDk,
    EntsoE,
    FiftyHertz,
    Amprion,
    Tennet,
    TransnetBw,
    Opsd,
    SvenskaKraftnat,
}

impl Source {
    pub const ALL: [Source; 9] = [
        Source::Elia,
        Source::EnerginetDk,
        Source::EntsoE,
        Source::FiftyHertz,
        Source::Amprion,
        Source::Tennet,
        Source::TransnetBw,
        Source::Opsd,
        Source::SvenskaKraftnat,
    ];

    /// Name used in source configuration and in the download directory tree.
    pub fn name(self) -> &'static str {
        match self {
            Source::Elia => "Elia",
            Source::EnerginetDk => "Energinet.dk",
            Source::EntsoE => "ENTSO-E",
            Source::FiftyHertz => "50Hertz",
            Source::Amprion => "Amprion",
            Source::Tennet => "TenneT",
            Source::TransnetBw => "TransnetBW",
            Source::Opsd => "OPSD",
            Source::SvenskaKraftnat => "Svenska Kraftnaet",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source-specific parameters of one configured variable.
#[derive(Debug, Clone)]
pub struct ReaderParams {
    pub variable: String,
    pub web: String,
    pub resolution: Resolution,
}

impl ReaderParams {
    pub fn new(variable: impl Into<String>, web: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            variable: variable.into(),
            web: web.into(),
            resolution,
        }
    }
}

/// Reads `path` with the reader bound to `source`.
pub fn read(
    source: Source,
    path: &Path,
    params: &ReaderParams,
    names: &LabelNames,
) -> Result<NormalizedSeries, ReadError> {
    match source {
        Source::Elia => elia::read(path, params, names),
        Source::EnerginetDk => energinet::read(path, params, names),
        Source::EntsoE => entsoe::read(path, params, names),
        Source::FiftyHertz => hertz::read(path, params, names),
        Source::Amprion => amprion::read(path, params, names),
        Source::Tennet => tennet::read(path, params, names),
        Source::TransnetBw => transnetbw::read(path, params, names),
        Source::Opsd => capacities::read(path, params, names),
        Source::SvenskaKraftnat => svenska_kraftnat::read(path, params, names),
    }
}

/// A parsed row still in provider-local wall-clock time.
pub(crate) type LocalRow = (NaiveDateTime, Vec<Option<f64>>);

/// Localizes rows in their file order and collects them into a series.
pub(crate) fn localize_rows(
    rows: Vec<LocalRow>,
    tz: Tz,
    ambiguity: Ambiguity,
    columns: Vec<Label>,
    names: &LabelNames,
) -> Result<NormalizedSeries, ReadError> {
    let stamps: Vec<NaiveDateTime> = rows.iter().map(|(local, _)| *local).collect();
    let instants = localize(tz, &stamps, ambiguity)?;

    let mut builder = SeriesBuilder::new(names.clone(), columns);
    for (ts, (_, values)) in instants.into_iter().zip(rows) {
        builder.push(ts, values);
    }
    Ok(builder.finish())
}

/// Labels `(kind, region, attribute, source, web)` for each attribute.
pub(crate) fn attribute_labels(
    kind: &str,
    region: &str,
    attributes: &[&str],
    source: Source,
    web: &str,
) -> Vec<Label> {
    attributes
        .iter()
        .map(|attribute| Label::new(kind, region, *attribute, source.name(), web))
        .collect()
}
