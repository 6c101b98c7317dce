//! Readings - one fetched (or failed) value per source per attempt.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// The outcome of fetching a single source.
///
/// A reading is immutable once produced. A null `value` means every endpoint
/// in the source's fallback chain failed; `error` then says why.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Reading {
    /// Identifier of the source this reading came from.
    pub source: String,

    /// The extracted numeric value, if any endpoint succeeded.
    pub value: Option<f64>,

    /// Categorical label attached to the value (e.g. "Extreme Fear").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// When the fetch settled.
    pub fetched_at: DateTime<Utc>,

    /// Description of why the value is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reading {
    /// A successful reading.
    pub fn value(source: impl Into<String>, value: f64, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            value: Some(value),
            label: None,
            fetched_at,
            error: None,
        }
    }

    /// A reading whose every endpoint failed.
    pub fn failed(
        source: impl Into<String>,
        error: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source: source.into(),
            value: None,
            label: None,
            fetched_at,
            error: Some(error.into()),
        }
    }

    /// Attach a categorical label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// True when the reading carries a value.
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// All readings gathered by one fetch attempt, keyed by source id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Readings {
    by_source: BTreeMap<String, Reading>,
}

impl Readings {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a reading.
    pub fn insert(&mut self, reading: Reading) {
        self.by_source.insert(reading.source.clone(), reading);
    }

    /// Look up a reading by source id.
    pub fn get(&self, source: &str) -> Option<&Reading> {
        self.by_source.get(source)
    }

    /// The value of a source, or `None` when missing or failed.
    pub fn value(&self, source: &str) -> Option<f64> {
        self.get(source).and_then(|r| r.value)
    }

    /// The label of a source, if any.
    pub fn label(&self, source: &str) -> Option<&str> {
        self.get(source).and_then(|r| r.label.as_deref())
    }

    /// True when the source has a value.
    pub fn is_present(&self, source: &str) -> bool {
        self.value(source).is_some()
    }

    /// A copy restricted to the given source ids.
    ///
    /// Derivation steps only ever see the subset they declare.
    pub fn subset<'a>(&self, sources: impl IntoIterator<Item = &'a str>) -> Readings {
        let by_source = sources
            .into_iter()
            .filter_map(|id| self.by_source.get(id).map(|r| (id.to_string(), r.clone())))
            .collect();
        Readings { by_source }
    }

    /// Number of readings.
    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    /// Check if there are no readings.
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Number of readings with a value.
    pub fn present_count(&self) -> usize {
        self.by_source.values().filter(|r| r.is_present()).count()
    }

    /// Iterate over all readings in source-id order.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.by_source.values()
    }
}

impl FromIterator<Reading> for Readings {
    fn from_iter<I: IntoIterator<Item = Reading>>(iter: I) -> Self {
        let mut readings = Readings::new();
        for reading in iter {
            readings.insert(reading);
        }
        readings
    }
}
