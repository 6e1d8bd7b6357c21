//! `key=value` form parameter files for the Energinet.dk market data export.
//!
//! The last line of a file holds the end of the requested period and is
//! always replaced with the run date. The form state tokens of the page are
//! added after parsing.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, warn};

pub const END_DATE_KEY: &str = "endDate";
pub const VIEW_STATE_KEY: &str = "__VIEWSTATE";
pub const EVENT_VALIDATION_KEY: &str = "__EVENTVALIDATION";

/// Ordered form parameters. A repeated key keeps its first position and its
/// last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostParameters {
    entries: Vec<(String, String)>,
}

impl PostParameters {
    /// Parses parameter lines, replacing the final line with `end_date`.
    /// Lines that are not exactly one `key=value` pair are logged and skipped.
    pub fn parse(text: &str, end_date: NaiveDate) -> Self {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        let end = format!("{END_DATE_KEY}={}", end_date.format("%d-%m-%Y"));
        match lines.last_mut() {
            Some(last) => *last = end,
            None => lines.push(end),
        }

        let mut params = Self::default();
        for line in &lines {
            let mut parts = line.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => params.insert(key, value),
                _ => warn!(line = %line, "malformed parameter line skipped"),
            }
        }
        debug!(count = params.len(), "post parameters parsed");
        params
    }

    /// Reads and parses a parameter file.
    pub fn load(path: &Path, end_date: NaiveDate) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading parameter file {}", path.display()))?;
        Ok(Self::parse(&text, end_date))
    }

    /// Adds the page's form state tokens.
    pub fn with_form_state(mut self, view_state: &str, event_validation: &str) -> Self {
        self.insert(VIEW_STATE_KEY, view_state);
        self.insert(EVENT_VALIDATION_KEY, event_validation);
        self
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON object in parameter order.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Value::Object(map)
    }
}
