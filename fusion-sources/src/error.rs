//! Error types for sources.

use fusion_types::Provider;
use thiserror::Error;

/// Why a single endpoint attempt produced no value.
///
/// These never leave the fetcher: each one advances the fallback chain, and
/// a source whose chain is exhausted becomes a null reading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Timeout waiting for response.
    #[error("request timed out")]
    Timeout,

    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Provider answered with a non-success status.
    #[error("provider returned status {0}")]
    Status(u16),

    /// Failed to parse response.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The expected field is absent.
    #[error("missing field {0}")]
    MissingField(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // URLs may carry API keys
        let err = err.without_url();
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

/// Errors turning a profile's source declarations into requests.
///
/// Raised once at startup; a profile that resolves never fails this way
/// again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("source '{source_id}': provider {provider} needs a symbol")]
    MissingSymbol {
        source_id: String,
        provider: Provider,
    },

    #[error("source '{source_id}': http endpoints need a url")]
    MissingUrl { source_id: String },

    #[error("source '{source_id}': http endpoints need an extract rule")]
    MissingExtract { source_id: String },

    #[error("source '{source_id}': credential '{credential}' is not set (export {env_var})")]
    MissingCredential {
        source_id: String,
        credential: String,
        env_var: String,
    },

    #[error("source '{source_id}': invalid url: {reason}")]
    InvalidUrl { source_id: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}
