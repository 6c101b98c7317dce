//! Instrument profiles.
//!
//! A profile is the complete, immutable description of one instrument: which
//! sources to fetch and how, the coefficients of every derivation step, the
//! integrity keys, the recovery policy, the cycle interval and where output
//! goes. Profiles are loaded once at startup and validated before anything
//! runs.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Bias, HumanDuration};

/// Errors found while validating a profile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("profile symbol must not be empty")]
    MissingSymbol,

    #[error("source '{0}' is declared more than once")]
    DuplicateSource(String),

    #[error("source '{0}' has no endpoints")]
    NoEndpoints(String),

    #[error("[{section}] references unknown source '{source_id}'")]
    UnknownSource {
        section: &'static str,
        source_id: String,
    },

    #[error("[{0}] must list at least one source")]
    EmptySources(&'static str),

    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} must not be zero")]
    ZeroDivisor { field: &'static str },

    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be at least 1.0, got {value}")]
    BelowOne { field: &'static str, value: f64 },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
}

/// Complete configuration for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Instrument symbol shown in logs and summaries (e.g. "BTCUSD").
    pub symbol: String,

    /// Sources fetched every attempt.
    #[serde(default)]
    pub sources: Vec<SourceSpec>,

    /// Defaults applied to every fetch.
    #[serde(default)]
    pub fetch: FetchSettings,

    /// M1 rule.
    pub macro_tone: MacroToneRule,

    /// M2 rule.
    #[serde(default)]
    pub behavioral: BehavioralRule,

    /// M3 rules.
    pub scenario: ScenarioRule,

    /// M4 placeholder values.
    pub alignment: AlignmentRule,

    /// M5 proxy.
    pub cross_asset: CrossAssetRule,

    /// M6 formula.
    pub risk: RiskRule,

    /// M7 scaling.
    pub forecast: ForecastRule,

    /// Sources that count toward the integrity score.
    pub integrity: IntegrityRule,

    #[serde(default)]
    pub recovery: RecoveryPolicy,

    #[serde(default)]
    pub schedule: Schedule,

    #[serde(default)]
    pub output: OutputSpec,
}

impl Profile {
    /// Look up a source by id.
    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Iterate over declared source ids.
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id.as_str())
    }

    /// Check references, coefficients and ranges.
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.symbol.trim().is_empty() {
            return Err(ProfileError::MissingSymbol);
        }

        let mut ids = HashSet::new();
        for source in &self.sources {
            if !ids.insert(source.id.as_str()) {
                return Err(ProfileError::DuplicateSource(source.id.clone()));
            }
            if source.endpoints.is_empty() {
                return Err(ProfileError::NoEndpoints(source.id.clone()));
            }
        }

        let known = |section: &'static str, id: &str| {
            if ids.contains(id) {
                Ok(())
            } else {
                Err(ProfileError::UnknownSource {
                    section,
                    source_id: id.to_string(),
                })
            }
        };

        // M1
        for id in &self.macro_tone.inputs {
            known("macro_tone", id)?;
        }
        let tone_sources = self.macro_tone.tone.sources();
        if tone_sources.is_empty() {
            return Err(ProfileError::EmptySources("macro_tone"));
        }
        for id in tone_sources {
            known("macro_tone", id)?;
        }
        match &self.macro_tone.tone {
            ToneRule::AllPresent { met, unmet, .. } => {
                finite("macro_tone.met", *met)?;
                finite("macro_tone.unmet", *unmet)?;
            }
            ToneRule::FractionPresent { scale, .. } => finite("macro_tone.scale", *scale)?,
        }

        // M2
        if let Some(id) = &self.behavioral.sentiment {
            known("behavioral", id)?;
        }
        for extra in &self.behavioral.extras {
            known("behavioral", &extra.source)?;
        }
        positive("behavioral.scale", self.behavioral.scale)?;

        // M3
        let confidence = &self.scenario.confidence;
        finite("scenario.confidence.base", confidence.base)?;
        finite("scenario.confidence.midpoint", confidence.midpoint)?;
        if let Some(divisor) = confidence.tone_divisor {
            divisor_ok("scenario.confidence.tone_divisor", divisor)?;
        }
        if let Some(weight) = confidence.spread_weight {
            finite("scenario.confidence.spread_weight", weight)?;
        }
        for rule in &self.scenario.rules {
            rule.tone.check("scenario.rules.tone")?;
            rule.polarity.check("scenario.rules.polarity")?;
        }

        // M4
        finite("alignment.score", self.alignment.score)?;

        // M5
        known("cross_asset", &self.cross_asset.numerator)?;
        known("cross_asset", &self.cross_asset.denominator)?;
        divisor_ok(
            "cross_asset.denominator_factor",
            self.cross_asset.denominator_factor,
        )?;
        finite("cross_asset.scale", self.cross_asset.scale)?;

        // M6
        divisor_ok("risk.divisor", self.risk.divisor)?;
        finite("risk.tone_weight", self.risk.tone_weight)?;
        finite("risk.polarity_weight", self.risk.polarity_weight)?;

        // M7
        finite("forecast.volatility_scale", self.forecast.volatility_scale)?;

        if self.integrity.key_sources.is_empty() {
            return Err(ProfileError::EmptySources("integrity"));
        }
        for id in &self.integrity.key_sources {
            known("integrity", id)?;
        }

        let recovery = &self.recovery;
        if !(0.0..=1.0).contains(&recovery.threshold) {
            return Err(ProfileError::OutOfRange {
                field: "recovery.threshold",
                value: recovery.threshold,
            });
        }
        finite("recovery.backoff_multiplier", recovery.backoff_multiplier)?;
        if recovery.backoff_multiplier < 1.0 {
            return Err(ProfileError::BelowOne {
                field: "recovery.backoff_multiplier",
                value: recovery.backoff_multiplier,
            });
        }

        if self.schedule.interval.is_zero() {
            return Err(ProfileError::NotPositive {
                field: "schedule.interval",
            });
        }
        if self.fetch.timeout.is_zero() {
            return Err(ProfileError::NotPositive {
                field: "fetch.timeout",
            });
        }

        Ok(())
    }

    /// Range the M3 confidence can take under this profile.
    pub fn confidence_bounds(&self) -> (f64, f64) {
        self.scenario
            .confidence
            .bounds(self.macro_tone.tone.range())
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ProfileError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ProfileError::NonFinite { field, value })
    }
}

fn divisor_ok(field: &'static str, value: f64) -> Result<(), ProfileError> {
    finite(field, value)?;
    if value == 0.0 {
        return Err(ProfileError::ZeroDivisor { field });
    }
    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<(), ProfileError> {
    finite(field, value)?;
    if value <= 0.0 {
        return Err(ProfileError::NotPositive { field });
    }
    Ok(())
}

fn one() -> f64 {
    1.0
}

/// A source: an id plus an ordered fallback chain of endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    pub endpoints: Vec<EndpointSpec>,
}

/// Known data providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Coingecko,
    Fred,
    Yahoo,
    TwelveData,
    FearGreed,
    FinnhubSentiment,
    SolanaRpc,
    /// Any JSON endpoint with an explicit extraction rule.
    Http,
}

impl Provider {
    /// Provider name as written in profiles.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Provider::Coingecko => "coingecko",
            Provider::Fred => "fred",
            Provider::Yahoo => "yahoo",
            Provider::TwelveData => "twelve_data",
            Provider::FearGreed => "fear_greed",
            Provider::FinnhubSentiment => "finnhub_sentiment",
            Provider::SolanaRpc => "solana_rpc",
            Provider::Http => "http",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One endpoint in a source's fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub provider: Provider,

    /// Provider symbol (coin id, series id, ticker).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// Full URL; overrides the provider's base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// JSON body; when present the request is a POST.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Extraction rule; overrides the provider's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<Extract>,

    /// Per-attempt timeout; falls back to `[fetch] timeout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<HumanDuration>,
}

impl EndpointSpec {
    /// An endpoint for a provider preset.
    pub fn preset(provider: Provider, symbol: impl Into<String>) -> Self {
        Self {
            provider,
            symbol: Some(symbol.into()),
            url: None,
            body: None,
            extract: None,
            timeout: None,
        }
    }
}

/// How a value is pulled out of a JSON response.
///
/// Pointers are RFC 6901 JSON pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Extract {
    /// A number (or numeric string) at `pointer`; `default` when absent.
    Number {
        pointer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<f64>,
    },
    /// `field` of the last element of the array at `array`.
    LastObservation { array: String, field: String },
    /// A sentiment index value plus its classification label.
    Index { value: String, classification: String },
    /// `count / max(period, 1)` of the object at `sample`, rounded to 2 places.
    Throughput {
        sample: String,
        count: String,
        period: String,
    },
}

/// Fetch defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Per-attempt timeout.
    #[serde(default = "default_timeout")]
    pub timeout: HumanDuration,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_user_agent() -> String {
    concat!("fusion-runtime/", env!("CARGO_PKG_VERSION")).to_string()
}

/// M1: which readings are reported and how the tone score is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroToneRule {
    /// Readings reported verbatim under their source id.
    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(flatten)]
    pub tone: ToneRule,
}

/// M1 tone score rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ToneRule {
    /// `met` iff every listed reading is present, else `unmet`.
    AllPresent {
        sources: Vec<String>,
        met: f64,
        unmet: f64,
    },
    /// `scale × present / len`.
    FractionPresent {
        sources: Vec<String>,
        #[serde(default = "one")]
        scale: f64,
    },
}

impl ToneRule {
    /// Sources the rule looks at.
    pub fn sources(&self) -> &[String] {
        match self {
            ToneRule::AllPresent { sources, .. } | ToneRule::FractionPresent { sources, .. } => {
                sources
            }
        }
    }

    /// Smallest and largest tone the rule can produce.
    pub fn range(&self) -> (f64, f64) {
        match self {
            ToneRule::AllPresent { met, unmet, .. } => (met.min(*unmet), met.max(*unmet)),
            ToneRule::FractionPresent { scale, .. } => (scale.min(0.0), scale.max(0.0)),
        }
    }
}

/// M2: sentiment index and extra readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralRule {
    /// Source of the sentiment index. Without one, polarity stays neutral.
    #[serde(default)]
    pub sentiment: Option<String>,

    /// Index value that maps to polarity 1.0.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Additional readings reported by M2.
    #[serde(default)]
    pub extras: Vec<BehavioralExtra>,
}

impl Default for BehavioralRule {
    fn default() -> Self {
        Self {
            sentiment: None,
            scale: default_scale(),
            extras: Vec::new(),
        }
    }
}

fn default_scale() -> f64 {
    100.0
}

/// An extra reading reported by M2 under its own output name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralExtra {
    pub output: String,
    pub source: String,
    /// Value reported when the reading is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
}

/// M3: ordered bias rules and the confidence formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRule {
    /// Checked in order; the first match wins.
    #[serde(default)]
    pub rules: Vec<BiasRule>,

    #[serde(default)]
    pub default_bias: Bias,

    pub confidence: ConfidenceRule,
}

/// A bias assigned when both thresholds match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasRule {
    pub bias: Bias,
    #[serde(default)]
    pub tone: Threshold,
    #[serde(default)]
    pub polarity: Threshold,
}

impl BiasRule {
    /// True when `tone` and `polarity` satisfy both thresholds.
    pub fn matches(&self, tone: f64, polarity: f64) -> bool {
        self.tone.matches(tone) && self.polarity.matches(polarity)
    }
}

/// Strict bounds on a value; a missing bound always matches.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below: Option<f64>,
}

impl Threshold {
    pub fn matches(&self, value: f64) -> bool {
        self.above.map_or(true, |a| value > a) && self.below.map_or(true, |b| value < b)
    }

    fn check(&self, field: &'static str) -> Result<(), ProfileError> {
        for bound in [self.above, self.below].into_iter().flatten() {
            finite(field, bound)?;
        }
        Ok(())
    }
}

/// `base + tone / tone_divisor + |midpoint - polarity| × spread_weight`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceRule {
    pub base: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_divisor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread_weight: Option<f64>,
    #[serde(default = "default_midpoint")]
    pub midpoint: f64,
}

fn default_midpoint() -> f64 {
    0.5
}

impl ConfidenceRule {
    /// Evaluate without rounding.
    pub fn evaluate(&self, tone: f64, polarity: f64) -> f64 {
        let tone_term = self.tone_divisor.map_or(0.0, |d| tone / d);
        let spread_term = self
            .spread_weight
            .map_or(0.0, |w| (self.midpoint - polarity).abs() * w);
        self.base + tone_term + spread_term
    }

    /// Range of the confidence for tone in `tone_range` and polarity in [0, 1].
    pub fn bounds(&self, tone_range: (f64, f64)) -> (f64, f64) {
        let (lo_tone, hi_tone) = tone_range;
        let tone_terms = match self.tone_divisor {
            Some(d) => {
                let (a, b) = (lo_tone / d, hi_tone / d);
                (a.min(b), a.max(b))
            }
            None => (0.0, 0.0),
        };
        let spread_terms = match self.spread_weight {
            Some(w) => {
                // |midpoint - p| over p in [0, 1]
                let nearest = if (0.0..=1.0).contains(&self.midpoint) {
                    0.0
                } else {
                    self.midpoint.abs().min((self.midpoint - 1.0).abs())
                };
                let farthest = self.midpoint.abs().max((self.midpoint - 1.0).abs());
                let (a, b) = (nearest * w, farthest * w);
                (a.min(b), a.max(b))
            }
            None => (0.0, 0.0),
        };
        (
            self.base + tone_terms.0 + spread_terms.0,
            self.base + tone_terms.1 + spread_terms.1,
        )
    }
}

/// M4 placeholder values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRule {
    pub score: f64,
    pub phase: String,
}

/// M5: `num / (den × denominator_factor) × scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossAssetRule {
    /// Output name (e.g. "BTC_ETH_corr").
    pub output: String,
    pub numerator: String,
    pub denominator: String,
    #[serde(default = "one")]
    pub denominator_factor: f64,
    pub scale: f64,
}

/// How M6 uses the behavioral polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolarityMode {
    #[default]
    Direct,
    /// Uses `1 - polarity`.
    Inverse,
}

/// M6: `(tone_weight × tone + polarity_weight × p) / divisor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRule {
    #[serde(default)]
    pub polarity: PolarityMode,
    pub divisor: f64,
    #[serde(default = "one")]
    pub tone_weight: f64,
    #[serde(default = "one")]
    pub polarity_weight: f64,
}

/// M7: volatility scaling of the risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRule {
    pub volatility_scale: f64,
}

/// Sources whose presence makes up the integrity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityRule {
    pub key_sources: Vec<String>,
}

/// Bounded retry policy for low-integrity attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Minimum integrity score accepted without retrying.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Wait before the first retry.
    #[serde(default = "default_backoff")]
    pub backoff: HumanDuration,

    /// Retries per cycle before publishing the best attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Growth factor between retries (1.0 keeps the backoff fixed).
    #[serde(default = "one")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single backoff.
    #[serde(default = "default_max_backoff")]
    pub max_backoff: HumanDuration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            backoff: default_backoff(),
            max_retries: default_max_retries(),
            backoff_multiplier: 1.0,
            max_backoff: default_max_backoff(),
        }
    }
}

fn default_threshold() -> f64 {
    0.5
}

fn default_backoff() -> HumanDuration {
    HumanDuration::from_secs(600)
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_backoff() -> HumanDuration {
    HumanDuration::from_secs(3600)
}

/// Cycle timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Sleep between the end of one cycle and the start of the next.
    #[serde(default = "default_interval")]
    pub interval: HumanDuration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

fn default_interval() -> HumanDuration {
    HumanDuration::from_secs(4 * 3600)
}

/// Where artifacts go. File names are relative to `directory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Overwritten with the latest cycle block when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_file: Option<String>,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            file_prefix: default_file_prefix(),
            log_file: default_log_file(),
            summary_file: None,
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_prefix() -> String {
    "TOTAL_RECALL_RUNTIME".to_string()
}

fn default_log_file() -> String {
    "FUSION_LOG.txt".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
symbol = "XRP"

[[sources]]
id = "XRP"
endpoints = [{ provider = "twelve_data", symbol = "XRP/USD" }]

[[sources]]
id = "BTC"
endpoints = [{ provider = "coingecko", symbol = "bitcoin" }]

[[sources]]
id = "ETH"
endpoints = [{ provider = "coingecko", symbol = "ethereum", timeout = "5s" }]

[[sources]]
id = "fear_greed"
endpoints = [{ provider = "fear_greed" }]

[macro_tone]
inputs = ["XRP", "BTC", "ETH"]
rule = "all_present"
sources = ["XRP", "BTC", "ETH"]
met = 0.6
unmet = 0.4

[behavioral]
sentiment = "fear_greed"
extras = [{ output = "vol_proxy", source = "BTC", default = 0.0 }]

[scenario]
rules = [
    { bias = "bullish", tone = { above = 0.55 }, polarity = { above = 0.55 } },
    { bias = "bearish", tone = { below = 0.45 }, polarity = { below = 0.45 } },
]
confidence = { base = 0.65, spread_weight = 0.6 }

[alignment]
score = 0.31
phase = "rotation"

[cross_asset]
output = "XRP_BTC_corr"
numerator = "XRP"
denominator = "BTC"
scale = 0.002

[risk]
polarity = "inverse"
divisor = 7.0

[forecast]
volatility_scale = 3.2

[integrity]
key_sources = ["XRP", "BTC", "ETH"]

[output]
directory = "XRP"
summary_file = "SUMMARY_LAST.txt"
"#;

    fn profile() -> Profile {
        toml::from_str(PROFILE).unwrap()
    }

    #[test]
    fn test_parse_and_defaults() {
        let p = profile();
        assert!(p.validate().is_ok());

        assert_eq!(p.symbol, "XRP");
        assert_eq!(p.sources.len(), 4);
        assert_eq!(
            p.source("ETH").unwrap().endpoints[0].timeout,
            Some(HumanDuration::from_secs(5))
        );
        assert_eq!(p.fetch.timeout, HumanDuration::from_secs(10));
        assert_eq!(p.behavioral.sentiment.as_deref(), Some("fear_greed"));
        assert_eq!(p.behavioral.scale, 100.0);
        assert_eq!(p.scenario.default_bias, Bias::Neutral);
        assert_eq!(p.scenario.confidence.midpoint, 0.5);
        assert_eq!(p.cross_asset.denominator_factor, 1.0);
        assert_eq!(p.risk.polarity, PolarityMode::Inverse);
        assert_eq!(p.recovery, RecoveryPolicy::default());
        assert_eq!(p.recovery.backoff, HumanDuration::from_secs(600));
        assert_eq!(p.schedule.interval, HumanDuration::from_secs(4 * 3600));
        assert_eq!(p.output.file_prefix, "TOTAL_RECALL_RUNTIME");
        assert_eq!(p.output.log_file, "FUSION_LOG.txt");
        assert_eq!(p.output.summary_file.as_deref(), Some("SUMMARY_LAST.txt"));
    }

    #[test]
    fn test_sentiment_is_opt_in() {
        let without = PROFILE.replace("sentiment = \"fear_greed\"\n", "");
        let p: Profile = toml::from_str(&without).unwrap();
        assert!(p.validate().is_ok());
        assert_eq!(p.behavioral.sentiment, None);
        assert_eq!(p.behavioral.extras.len(), 1);

        assert_eq!(BehavioralRule::default().sentiment, None);
    }

    #[test]
    fn test_tone_rule_is_tagged() {
        let p = profile();
        match &p.macro_tone.tone {
            ToneRule::AllPresent { sources, met, unmet } => {
                assert_eq!(sources, &["XRP", "BTC", "ETH"]);
                assert_eq!(*met, 0.6);
                assert_eq!(*unmet, 0.4);
            }
            other => panic!("unexpected rule {other:?}"),
        }
        assert_eq!(p.macro_tone.tone.range(), (0.4, 0.6));
    }

    #[test]
    fn test_rejects_unknown_reference() {
        let mut p = profile();
        p.integrity.key_sources.push("SOL".into());
        assert_eq!(
            p.validate(),
            Err(ProfileError::UnknownSource {
                section: "integrity",
                source_id: "SOL".into(),
            })
        );
    }

    #[test]
    fn test_rejects_empty_key_sources() {
        let mut p = profile();
        p.integrity.key_sources.clear();
        assert_eq!(p.validate(), Err(ProfileError::EmptySources("integrity")));
    }

    #[test]
    fn test_rejects_zero_divisor() {
        let mut p = profile();
        p.risk.divisor = 0.0;
        assert_eq!(
            p.validate(),
            Err(ProfileError::ZeroDivisor {
                field: "risk.divisor"
            })
        );
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let mut p = profile();
        p.recovery.threshold = 1.5;
        assert!(matches!(
            p.validate(),
            Err(ProfileError::OutOfRange {
                field: "recovery.threshold",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_duplicate_source() {
        let mut p = profile();
        let dup = p.sources[0].clone();
        p.sources.push(dup);
        assert_eq!(p.validate(), Err(ProfileError::DuplicateSource("XRP".into())));
    }

    #[test]
    fn test_rejects_nan_coefficient() {
        let mut p = profile();
        p.forecast.volatility_scale = f64::NAN;
        assert!(matches!(
            p.validate(),
            Err(ProfileError::NonFinite {
                field: "forecast.volatility_scale",
                ..
            })
        ));
    }

    #[test]
    fn threshold_comparisons_are_strict() {
        let t = Threshold {
            above: Some(0.55),
            below: None,
        };
        assert!(!t.matches(0.55));
        assert!(t.matches(0.56));
        assert!(Threshold::default().matches(f64::MIN));
    }

    #[test]
    fn confidence_bounds_cover_evaluations() {
        let p = profile();
        let (lo, hi) = p.confidence_bounds();
        assert!((lo - 0.65).abs() < 1e-9);
        assert!((hi - 0.95).abs() < 1e-9);

        for polarity in [0.0, 0.25, 0.5, 0.75, 1.0] {
            for tone in [0.4, 0.6] {
                let c = p.scenario.confidence.evaluate(tone, polarity);
                assert!(c >= lo - 1e-9 && c <= hi + 1e-9);
            }
        }
    }

    #[test]
    fn confidence_bounds_with_tone_divisor() {
        let rule = ConfidenceRule {
            base: 0.65,
            tone_divisor: Some(2.0),
            spread_weight: None,
            midpoint: 0.5,
        };
        let (lo, hi) = rule.bounds((0.25, 0.5));
        assert!((lo - 0.775).abs() < 1e-9);
        assert!((hi - 0.9).abs() < 1e-9);
    }
}
