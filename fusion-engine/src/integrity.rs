//! Data integrity scoring.

use fusion_types::{Profile, Readings};

/// Fraction of key sources present in a reading set.
///
/// An empty key set scores 1.0. A reading whose value is 0 counts as present.
pub fn integrity_score(readings: &Readings, key_sources: &[String]) -> f64 {
    if key_sources.is_empty() {
        return 1.0;
    }
    let present = key_sources
        .iter()
        .filter(|id| readings.is_present(id))
        .count();
    present as f64 / key_sources.len() as f64
}

/// Scores attempts against a profile's key sources.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityScorer {
    key_sources: Vec<String>,
}

impl IntegrityScorer {
    pub fn new(key_sources: Vec<String>) -> Self {
        Self { key_sources }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self::new(profile.integrity.key_sources.clone())
    }

    pub fn key_sources(&self) -> &[String] {
        &self.key_sources
    }

    pub fn score(&self, readings: &Readings) -> f64 {
        integrity_score(readings, &self.key_sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{btcusd_profile, readings};

    fn keys(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fraction_present() {
        let r = readings(&[
            ("BTC", Some(97_000.0)),
            ("ETH", None),
            ("DXY", Some(108.0)),
            ("VIX", Some(15.0)),
        ]);
        assert_eq!(integrity_score(&r, &keys(&["BTC", "ETH", "DXY", "VIX"])), 0.75);
    }

    #[test]
    fn test_absent_key_counts_as_missing() {
        let r = readings(&[("BTC", Some(1.0))]);
        assert_eq!(integrity_score(&r, &keys(&["BTC", "ETH"])), 0.5);
    }

    #[test]
    fn test_zero_is_present() {
        let r = readings(&[("TPS", Some(0.0))]);
        assert_eq!(integrity_score(&r, &keys(&["TPS"])), 1.0);
    }

    #[test]
    fn test_empty_key_set() {
        assert_eq!(integrity_score(&Readings::new(), &[]), 1.0);
    }

    #[test]
    fn test_scorer_from_profile() {
        let scorer = IntegrityScorer::from_profile(&btcusd_profile());
        assert_eq!(scorer.key_sources(), keys(&["BTC", "ETH", "DXY", "VIX"]));
        assert_eq!(scorer.score(&Readings::new()), 0.0);
    }
}
