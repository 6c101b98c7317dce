//! Loading instrument profiles.
//!
//! A profile is a TOML file (see `profiles/`). Any key can be overridden from
//! the environment as `FUSION_<SECTION>__<KEY>`, e.g.
//! `FUSION_RECOVERY__MAX_RETRIES=5` or `FUSION_OUTPUT__DIRECTORY=/var/lib/fusion`.

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, Map};
use fusion_types::Profile;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "FUSION";

/// Reads, overrides and validates profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileLoader {
    env: Option<Map<String, String>>,
}

impl ProfileLoader {
    /// Overrides come from the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides come from `vars` instead of the process environment.
    pub fn with_env(vars: Map<String, String>) -> Self {
        Self { env: Some(vars) }
    }

    /// Load and validate the profile at `path`.
    pub fn load(&self, path: &Path) -> Result<Profile> {
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(self.env.clone());

        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(environment)
            .build()
            .with_context(|| format!("failed to read profile {}", path.display()))?;

        let profile: Profile = config
            .try_deserialize()
            .with_context(|| format!("invalid profile {}", path.display()))?;
        profile
            .validate()
            .with_context(|| format!("invalid profile {}", path.display()))?;

        Ok(profile)
    }
}

/// Load a profile with overrides from the process environment.
pub fn load_profile(path: &Path) -> Result<Profile> {
    ProfileLoader::new().load(path)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use fusion_types::{Provider, ToneRule};

    use super::*;

    fn bundled(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("profiles")
            .join(format!("{}.toml", name))
    }

    fn no_env() -> ProfileLoader {
        ProfileLoader::with_env(Map::new())
    }

    #[test]
    fn test_bundled_profiles_load() {
        for name in ["btcusd", "us10y", "usdjpy", "xauusd", "xrp", "sol"] {
            let profile = no_env()
                .load(&bundled(name))
                .unwrap_or_else(|e| panic!("{}: {:#}", name, e));
            assert!(!profile.sources.is_empty(), "{}", name);
        }
    }

    #[test]
    fn test_btcusd_constants() {
        let profile = no_env().load(&bundled("btcusd")).unwrap();

        assert_eq!(profile.symbol, "BTCUSD");
        assert_eq!(
            profile.macro_tone.tone,
            ToneRule::AllPresent {
                sources: vec!["BTC".into(), "DXY".into(), "VIX".into()],
                met: 0.5,
                unmet: 0.25,
            }
        );
        assert_eq!(profile.cross_asset.denominator_factor, 20.0);
        assert_eq!(profile.risk.divisor, 8.0);
        assert_eq!(profile.forecast.volatility_scale, 2.5);
        assert_eq!(profile.recovery.backoff.to_duration(), Duration::from_secs(600));
        assert_eq!(
            profile.schedule.interval.to_duration(),
            Duration::from_secs(4 * 3600)
        );
        assert_eq!(profile.output.summary_file, None);
    }

    #[test]
    fn test_fallback_chain_order() {
        let profile = no_env().load(&bundled("xauusd")).unwrap();
        let xau = profile.source("XAUUSD").unwrap();

        let providers: Vec<_> = xau.endpoints.iter().map(|e| e.provider).collect();
        assert_eq!(providers, vec![Provider::TwelveData, Provider::Yahoo]);
        assert_eq!(xau.endpoints[1].symbol.as_deref(), Some("GC=F"));
    }

    #[test]
    fn test_environment_overrides() {
        let mut vars = Map::new();
        vars.insert("FUSION_RECOVERY__MAX_RETRIES".to_string(), "5".to_string());
        vars.insert("FUSION_SCHEDULE__INTERVAL".to_string(), "30m".to_string());
        vars.insert("FUSION_OUTPUT__DIRECTORY".to_string(), "/tmp/fusion".to_string());

        let profile = ProfileLoader::with_env(vars).load(&bundled("xrp")).unwrap();

        assert_eq!(profile.recovery.max_retries, 5);
        assert_eq!(
            profile.schedule.interval.to_duration(),
            Duration::from_secs(1800)
        );
        assert_eq!(profile.output.directory, PathBuf::from("/tmp/fusion"));
        assert_eq!(profile.output.summary_file.as_deref(), Some("SUMMARY_LAST.txt"));
    }

    #[test]
    fn test_rejects_invalid_override() {
        let mut vars = Map::new();
        vars.insert("FUSION_RISK__DIVISOR".to_string(), "0".to_string());

        let err = ProfileLoader::with_env(vars)
            .load(&bundled("sol"))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("risk.divisor"));
    }

    #[test]
    fn test_missing_file() {
        let err = no_env().load(Path::new("/nonexistent/profile.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read profile"));
    }

    #[test]
    fn test_unknown_source_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        let text = std::fs::read_to_string(bundled("xrp"))
            .unwrap()
            .replace("key_sources = [\"XRP\", \"BTC\", \"ETH\"]", "key_sources = [\"DOGE\"]");
        std::fs::write(&path, text).unwrap();

        let err = no_env().load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("DOGE"));
    }
}
