//! Derivation module results.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one of the seven derivation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleId {
    /// Macro tone.
    M1,
    /// Behavioral polarity.
    M2,
    /// Scenario bias and confidence.
    M3,
    /// Multi-timeframe alignment.
    M4,
    /// Cross-asset proxy.
    M5,
    /// Risk chain.
    M6,
    /// Forecast.
    M7,
}

impl ModuleId {
    /// All modules in execution order.
    pub const ALL: [ModuleId; 7] = [
        ModuleId::M1,
        ModuleId::M2,
        ModuleId::M3,
        ModuleId::M4,
        ModuleId::M5,
        ModuleId::M6,
        ModuleId::M7,
    ];

    /// Short code used as the snapshot key ("M1".."M7").
    pub const fn code(&self) -> &'static str {
        match self {
            ModuleId::M1 => "M1",
            ModuleId::M2 => "M2",
            ModuleId::M3 => "M3",
            ModuleId::M4 => "M4",
            ModuleId::M5 => "M5",
            ModuleId::M6 => "M6",
            ModuleId::M7 => "M7",
        }
    }

    /// Descriptive name of the step.
    pub const fn name(&self) -> &'static str {
        match self {
            ModuleId::M1 => "macro",
            ModuleId::M2 => "behavioral",
            ModuleId::M3 => "scenario",
            ModuleId::M4 => "alignment",
            ModuleId::M5 => "cross_asset",
            ModuleId::M6 => "risk",
            ModuleId::M7 => "forecast",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Directional bias produced by the scenario step.
///
/// Profiles may introduce their own labels (e.g. `bullish_usd` or
/// `yield_pressure`); those are carried as [`Bias::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Bias {
    Bullish,
    Bearish,
    #[default]
    Neutral,
    Other(String),
}

impl Bias {
    /// The label as written to snapshots.
    pub fn as_str(&self) -> &str {
        match self {
            Bias::Bullish => "bullish",
            Bias::Bearish => "bearish",
            Bias::Neutral => "neutral",
            Bias::Other(label) => label,
        }
    }
}

impl From<&str> for Bias {
    fn from(label: &str) -> Self {
        match label {
            "bullish" => Bias::Bullish,
            "bearish" => Bias::Bearish,
            "neutral" => Bias::Neutral,
            other => Bias::Other(other.to_string()),
        }
    }
}

impl From<String> for Bias {
    fn from(label: String) -> Self {
        Bias::from(label.as_str())
    }
}

impl From<Bias> for String {
    fn from(bias: Bias) -> Self {
        bias.as_str().to_string()
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sentiment index value with its provider classification.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentIndex {
    pub value: Option<f64>,
    pub classification: Option<String>,
}

/// A single named output of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    Null,
    Number(f64),
    Text(String),
    Index(SentimentIndex),
}

impl OutputValue {
    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            OutputValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutputValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, OutputValue::Null)
    }
}

impl From<Option<f64>> for OutputValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(OutputValue::Null, OutputValue::Number)
    }
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputValue::Null => f.write_str("n/a"),
            OutputValue::Number(n) => write!(f, "{}", n),
            OutputValue::Text(s) => f.write_str(s),
            OutputValue::Index(idx) => match (&idx.value, &idx.classification) {
                (Some(v), Some(c)) => write!(f, "{} ({})", v, c),
                (Some(v), None) => write!(f, "{}", v),
                _ => f.write_str("n/a"),
            },
        }
    }
}

/// The outputs of one derivation step for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleResult {
    /// Which step produced this result.
    pub module: ModuleId,

    /// Named outputs, keyed by output name.
    pub outputs: BTreeMap<String, OutputValue>,

    /// The cycle timestamp the result was derived for.
    pub computed_at: DateTime<Utc>,
}

impl ModuleResult {
    /// Create a builder for a module result.
    pub fn builder(module: ModuleId, computed_at: DateTime<Utc>) -> ModuleResultBuilder {
        ModuleResultBuilder {
            module,
            computed_at,
            outputs: BTreeMap::new(),
        }
    }

    /// Look up an output.
    pub fn get(&self, key: &str) -> Option<&OutputValue> {
        self.outputs.get(key)
    }

    /// Look up a numeric output.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(OutputValue::as_number)
    }

    /// Look up a text output.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(OutputValue::as_text)
    }
}

/// Builder for `ModuleResult`.
#[derive(Debug)]
pub struct ModuleResultBuilder {
    module: ModuleId,
    computed_at: DateTime<Utc>,
    outputs: BTreeMap<String, OutputValue>,
}

impl ModuleResultBuilder {
    /// Add a numeric output.
    pub fn number(self, key: impl Into<String>, value: f64) -> Self {
        self.output(key, OutputValue::Number(value))
    }

    /// Add a possibly-missing numeric output.
    pub fn maybe_number(self, key: impl Into<String>, value: Option<f64>) -> Self {
        self.output(key, value.into())
    }

    /// Add a text output.
    pub fn text(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.output(key, OutputValue::Text(value.into()))
    }

    /// Add a sentiment index output.
    pub fn index(self, key: impl Into<String>, index: SentimentIndex) -> Self {
        self.output(key, OutputValue::Index(index))
    }

    /// Add any output.
    pub fn output(mut self, key: impl Into<String>, value: OutputValue) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }

    /// Build the result.
    pub fn build(self) -> ModuleResult {
        ModuleResult {
            module: self.module,
            outputs: self.outputs,
            computed_at: self.computed_at,
        }
    }
}
