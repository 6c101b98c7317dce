//! The derivation pipeline, M1 through M7.
//!
//! Every step is a pure function of the readings it declares (and of the
//! upstream numbers it is handed), so a pipeline run is deterministic for a
//! given profile, reading set and cycle timestamp. Missing inputs never make a
//! step fail; they fall back to the neutral values documented on each step.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fusion_types::{
    AlignmentRule, BehavioralRule, Bias, CrossAssetRule, ForecastRule, MacroToneRule, ModuleId,
    ModuleResult, PolarityMode, Profile, Readings, RiskRule, ScenarioRule, SentimentIndex,
    ToneRule,
};

/// M1 output holding the tone score.
pub const MACRO_TONE_SCORE: &str = "macro_tone_score";
/// M2 output holding the polarity.
pub const BEHAVIORAL_POLARITY: &str = "behavioral_polarity";
/// Polarity used when the sentiment index is missing.
pub const NEUTRAL_POLARITY: f64 = 0.5;

/// Round to `places` decimals.
///
/// Rounds the exact binary value of `value`, ties to even, so `0.0625`
/// becomes `0.062` and `2.675` (stored just below the tie) becomes `2.67`.
/// Non-finite values pass through.
pub fn round_to(value: f64, places: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{value:.places$}").parse().unwrap_or(value)
}

/// Result of the alignment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub score: f64,
    pub phase: String,
}

/// Multi-timeframe alignment (M4).
///
/// The bundled [`StaticAlignment`] restates fixed profile values; a real
/// implementation can declare the sources it needs and compute from them.
pub trait AlignmentStage: Send + Sync + fmt::Debug {
    /// Source ids this stage reads.
    fn sources(&self) -> Vec<String> {
        Vec::new()
    }

    /// Compute the alignment from the declared readings.
    fn align(&self, readings: &Readings) -> Alignment;
}

/// Alignment placeholder that always reports the profile's values.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticAlignment {
    score: f64,
    phase: String,
}

impl StaticAlignment {
    pub fn new(score: f64, phase: impl Into<String>) -> Self {
        Self {
            score,
            phase: phase.into(),
        }
    }
}

impl From<&AlignmentRule> for StaticAlignment {
    fn from(rule: &AlignmentRule) -> Self {
        Self::new(rule.score, rule.phase.clone())
    }
}

impl AlignmentStage for StaticAlignment {
    fn align(&self, _readings: &Readings) -> Alignment {
        Alignment {
            score: self.score,
            phase: self.phase.clone(),
        }
    }
}

/// Runs M1..M7 for one profile.
#[derive(Debug, Clone)]
pub struct ModulePipeline {
    profile: Arc<Profile>,
    alignment: Arc<dyn AlignmentStage>,
}

impl ModulePipeline {
    /// Create a pipeline using the profile's static alignment values.
    pub fn new(profile: Arc<Profile>) -> Self {
        let alignment = Arc::new(StaticAlignment::from(&profile.alignment));
        Self { profile, alignment }
    }

    /// Replace the alignment stage.
    pub fn with_alignment(mut self, alignment: Arc<dyn AlignmentStage>) -> Self {
        self.alignment = alignment;
        self
    }

    /// Derive every module result, in order, for a cycle at `at`.
    pub fn derive(&self, readings: &Readings, at: DateTime<Utc>) -> Vec<ModuleResult> {
        let p = &self.profile;

        let (m1, tone) = macro_tone(&p.macro_tone, readings, at);
        let (m2, polarity) = behavioral(&p.behavioral, readings, at);
        let (m3, bias, confidence) = scenario(&p.scenario, tone, polarity, at);
        let m4 = alignment(self.alignment.as_ref(), readings, at);
        let m5 = cross_asset(&p.cross_asset, readings, at);
        let (m6, risk_score) = risk(&p.risk, tone, polarity, at);
        let m7 = forecast(&p.forecast, &bias, confidence, risk_score, at);

        vec![m1, m2, m3, m4, m5, m6, m7]
    }
}

/// M1: report declared inputs and compute the macro tone score.
pub fn macro_tone(
    rule: &MacroToneRule,
    readings: &Readings,
    at: DateTime<Utc>,
) -> (ModuleResult, f64) {
    let declared = rule
        .inputs
        .iter()
        .chain(rule.tone.sources())
        .map(String::as_str);
    let view = readings.subset(declared);

    let tone = match &rule.tone {
        ToneRule::AllPresent {
            sources,
            met,
            unmet,
        } => {
            if sources.iter().all(|id| view.is_present(id)) {
                *met
            } else {
                *unmet
            }
        }
        ToneRule::FractionPresent { sources, scale } => {
            if sources.is_empty() {
                0.0
            } else {
                let present = sources.iter().filter(|id| view.is_present(id)).count();
                scale * present as f64 / sources.len() as f64
            }
        }
    };
    let tone = round_to(tone, 3);

    let result = rule
        .inputs
        .iter()
        .fold(ModuleResult::builder(ModuleId::M1, at), |b, id| {
            b.maybe_number(id.as_str(), view.value(id))
        })
        .number(MACRO_TONE_SCORE, tone)
        .build();

    (result, tone)
}

/// M2: sentiment index, extra readings and the behavioral polarity.
pub fn behavioral(
    rule: &BehavioralRule,
    readings: &Readings,
    at: DateTime<Utc>,
) -> (ModuleResult, f64) {
    let declared = rule
        .sentiment
        .iter()
        .chain(rule.extras.iter().map(|e| &e.source))
        .map(String::as_str);
    let view = readings.subset(declared);

    let mut builder = ModuleResult::builder(ModuleId::M2, at);
    let mut polarity = NEUTRAL_POLARITY;

    if let Some(id) = &rule.sentiment {
        let value = view.value(id);
        builder = builder.index(
            id.as_str(),
            SentimentIndex {
                value,
                classification: view.label(id).map(str::to_string),
            },
        );
        if let Some(v) = value {
            polarity = (v / rule.scale).clamp(0.0, 1.0);
        }
    }

    for extra in &rule.extras {
        builder = builder.maybe_number(
            extra.output.as_str(),
            view.value(&extra.source).or(extra.default),
        );
    }

    let polarity = round_to(polarity, 3);
    (builder.number(BEHAVIORAL_POLARITY, polarity).build(), polarity)
}

/// M3: first matching bias rule and the confidence formula.
pub fn scenario(
    rule: &ScenarioRule,
    tone: f64,
    polarity: f64,
    at: DateTime<Utc>,
) -> (ModuleResult, Bias, f64) {
    let bias = rule
        .rules
        .iter()
        .find(|r| r.matches(tone, polarity))
        .map(|r| r.bias.clone())
        .unwrap_or_else(|| rule.default_bias.clone());
    let confidence = round_to(rule.confidence.evaluate(tone, polarity), 3);

    let result = ModuleResult::builder(ModuleId::M3, at)
        .text("short_term_bias", bias.as_str())
        .number("confidence", confidence)
        .build();

    (result, bias, confidence)
}

/// M4: delegate to the alignment stage.
pub fn alignment(
    stage: &dyn AlignmentStage,
    readings: &Readings,
    at: DateTime<Utc>,
) -> ModuleResult {
    let declared = stage.sources();
    let view = readings.subset(declared.iter().map(String::as_str));
    let Alignment { score, phase } = stage.align(&view);

    ModuleResult::builder(ModuleId::M4, at)
        .number("alignment_score", round_to(score, 3))
        .text("phase", phase)
        .build()
}

/// M5: cross-asset ratio proxy.
///
/// A missing numerator counts as 0, a missing or zero denominator as 1, and a
/// non-finite result becomes 0.
pub fn cross_asset(rule: &CrossAssetRule, readings: &Readings, at: DateTime<Utc>) -> ModuleResult {
    let view = readings.subset([rule.numerator.as_str(), rule.denominator.as_str()]);

    let numerator = view.value(&rule.numerator).unwrap_or(0.0);
    let denominator = view
        .value(&rule.denominator)
        .filter(|d| *d != 0.0)
        .unwrap_or(1.0);
    let raw = numerator / (denominator * rule.denominator_factor) * rule.scale;
    let value = if raw.is_finite() {
        round_to(raw, 3)
    } else {
        0.0
    };

    ModuleResult::builder(ModuleId::M5, at)
        .number(rule.output.as_str(), value)
        .build()
}

/// M6: risk chain score.
pub fn risk(rule: &RiskRule, tone: f64, polarity: f64, at: DateTime<Utc>) -> (ModuleResult, f64) {
    let p = match rule.polarity {
        PolarityMode::Direct => polarity,
        PolarityMode::Inverse => 1.0 - polarity,
    };
    let score = round_to(
        (rule.tone_weight * tone + rule.polarity_weight * p) / rule.divisor,
        3,
    );

    let result = ModuleResult::builder(ModuleId::M6, at)
        .number("risk_chain_score", score)
        .build();

    (result, score)
}

/// M7: forecast restating M3 and scaling M6.
pub fn forecast(
    rule: &ForecastRule,
    bias: &Bias,
    confidence: f64,
    risk_score: f64,
    at: DateTime<Utc>,
) -> ModuleResult {
    ModuleResult::builder(ModuleId::M7, at)
        .text("directional_bias", bias.as_str())
        .number(
            "expected_volatility_pct",
            round_to(risk_score * rule.volatility_scale, 2),
        )
        .number("confidence_score", confidence)
        .build()
}
