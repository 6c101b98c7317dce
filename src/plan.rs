//! The plan printed by `check`: what a validated profile will do.

use std::fmt;

use fusion_sources::SourceFetcher;
use fusion_types::Profile;
use serde::Serialize;

/// Summary of a validated profile and its resolved endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub symbol: String,
    pub sources: Vec<PlannedSource>,
    pub key_sources: Vec<String>,
    pub threshold: f64,
    pub max_retries: u32,
    pub backoff: String,
    pub interval: String,
    pub output_directory: String,
    pub confidence_range: (f64, f64),
}

/// One source and its fallback chain, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedSource {
    pub id: String,
    /// Loggable endpoint descriptions; never contain credentials.
    pub endpoints: Vec<String>,
}

impl Plan {
    pub fn new(profile: &Profile, fetcher: &SourceFetcher) -> Self {
        let sources = fetcher
            .sources()
            .iter()
            .map(|source| PlannedSource {
                id: source.id.clone(),
                endpoints: source
                    .endpoints
                    .iter()
                    .map(|e| e.description().to_string())
                    .collect(),
            })
            .collect();

        Self {
            symbol: profile.symbol.clone(),
            sources,
            key_sources: profile.integrity.key_sources.clone(),
            threshold: profile.recovery.threshold,
            max_retries: profile.recovery.max_retries,
            backoff: profile.recovery.backoff.to_string(),
            interval: profile.schedule.interval.to_string(),
            output_directory: profile.output.directory.display().to_string(),
            confidence_range: profile.confidence_bounds(),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: profile OK", self.symbol)?;
        writeln!(f, "Sources:")?;
        for source in &self.sources {
            writeln!(f, "  {:<18} {}", source.id, source.endpoints.join(" -> "))?;
        }
        writeln!(f, "Integrity keys: {}", self.key_sources.join(", "))?;
        writeln!(
            f,
            "Recovery: threshold {}, up to {} retries, backoff {}",
            self.threshold, self.max_retries, self.backoff
        )?;
        writeln!(f, "Interval: {}", self.interval)?;
        writeln!(
            f,
            "Confidence range: [{:.3}, {:.3}]",
            self.confidence_range.0, self.confidence_range.1
        )?;
        write!(f, "Output: {}", self.output_directory)
    }
}
