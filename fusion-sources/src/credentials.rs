//! API credentials read from the environment.

use std::collections::HashMap;
use std::fmt;

/// Prefix for credentials not covered by a well-known variable.
pub const CREDENTIAL_ENV_PREFIX: &str = "FUSION_CREDENTIAL_";

/// Well-known credential names and the variables they are read from.
const WELL_KNOWN: &[(&str, &str)] = &[
    ("fred", "FRED_API_KEY"),
    ("twelvedata", "TWELVEDATA_API_KEY"),
    ("finnhub", "FINNHUB_API_KEY"),
];

/// Named secrets used to build provider URLs.
///
/// Values never appear in `Debug` output.
#[derive(Clone, Default)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl Credentials {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read credentials from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Read credentials from `(name, value)` environment pairs.
    ///
    /// Recognizes `FRED_API_KEY`, `TWELVEDATA_API_KEY`, `FINNHUB_API_KEY`
    /// and `FUSION_CREDENTIAL_<NAME>`. Empty values are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut creds = Self::new();
        for (key, value) in vars {
            let key = key.as_ref();
            let value = value.into();
            if value.trim().is_empty() {
                continue;
            }
            if let Some((name, _)) = WELL_KNOWN.iter().find(|(_, var)| *var == key) {
                creds.values.insert((*name).to_string(), value);
            } else if let Some(name) = key.strip_prefix(CREDENTIAL_ENV_PREFIX) {
                if !name.is_empty() {
                    creds.values.insert(name.to_ascii_lowercase(), value);
                }
            }
        }
        creds
    }

    /// Add or replace a credential.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a credential by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// The environment variable a credential is read from.
    pub fn env_var(name: &str) -> String {
        WELL_KNOWN
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, var)| (*var).to_string())
            .unwrap_or_else(|| format!("{}{}", CREDENTIAL_ENV_PREFIX, name.to_ascii_uppercase()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Credentials")
            .field("names", &names)
            .finish_non_exhaustive()
    }
}
