use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use crate::series::Resolution;

/// Per-variable settings of one source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VariableParams {
    /// Page the data was downloaded from; carried into the column labels.
    pub web: String,
    pub resolution: Resolution,
}

/// Declared variables of one source, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
    pub name: String,
    pub variables: Vec<(String, VariableParams)>,
}

/// Maps source names to their variables.
///
/// Stored as a JSON object on disk; the order of sources and variables is
/// the merge precedence, so it is kept as written:
/// ```json
/// {
///   "TenneT": {
///     "wind": { "web": "http://www.tennettso.de/", "resolution": "15min" },
///     "solar": { "web": "http://www.tennettso.de/", "resolution": "15min" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    entries: Vec<SourceEntry>,
}

impl SourceCatalog {
    /// Loads the catalog from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading source catalog {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(content)?;
        let sources = root
            .as_object()
            .ok_or_else(|| anyhow!("source catalog must be a JSON object"))?;

        let mut entries = Vec::with_capacity(sources.len());
        for (name, variables) in sources {
            let variables = variables
                .as_object()
                .ok_or_else(|| anyhow!("variables of {name} must be a JSON object"))?;
            let variables = variables
                .iter()
                .map(|(variable, params)| -> Result<(String, VariableParams)> {
                    let params: VariableParams = serde_json::from_value(params.clone())
                        .with_context(|| format!("parameters of {name}/{variable}"))?;
                    Ok((variable.clone(), params))
                })
                .collect::<Result<Vec<_>>>()?;
            entries.push(SourceEntry {
                name: name.clone(),
                variables,
            });
        }
        Ok(Self { entries })
    }

    pub fn sources(&self) -> &[SourceEntry] {
        &self.entries
    }

    /// Iterates over all `(source, variable, params)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &VariableParams)> {
        self.entries.iter().flat_map(|entry| {
            entry
                .variables
                .iter()
                .map(move |(variable, params)| (entry.name.as_str(), variable.as_str(), params))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "TenneT": {
            "wind": { "web": "http://tennet", "resolution": "15min" },
            "solar": { "web": "http://tennet", "resolution": "15min" }
        },
        "Energinet.dk": {
            "prices_wind": { "web": "http://energinet", "resolution": "60min" }
        },
        "Amprion": {
            "wind": { "web": "http://amprion", "resolution": "15min" }
        }
    }"#;

    #[test]
    fn test_document_order_is_kept() {
        let catalog = SourceCatalog::from_json(CATALOG).unwrap();
        let triples: Vec<_> = catalog.iter().map(|(s, v, _)| (s, v)).collect();
        assert_eq!(
            triples,
            vec![
                ("TenneT", "wind"),
                ("TenneT", "solar"),
                ("Energinet.dk", "prices_wind"),
                ("Amprion", "wind"),
            ]
        );
        let (_, _, params) = catalog.iter().nth(2).unwrap();
        assert_eq!(params.resolution, Resolution::Hourly);
    }

    #[test]
    fn test_sources_in_document_order() {
        let catalog = SourceCatalog::from_json(CATALOG).unwrap();
        let names: Vec<_> = catalog.sources().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["TenneT", "Energinet.dk", "Amprion"]);
    }

    #[test]
    fn test_unknown_resolution_is_an_error() {
        let err = SourceCatalog::from_json(r#"{"Elia": {"wind": {"web": "w", "resolution": "5min"}}}"#)
            .unwrap_err();
        assert!(format!("{err:#}").contains("Elia/wind"));
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        assert!(SourceCatalog::load(Path::new("/nonexistent/sources.json")).is_err());
    }
}
