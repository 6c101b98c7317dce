//! # fusion-sources
//!
//! Fetching market data for the fusion runtime.
//!
//! A profile declares each source as an ordered chain of endpoints: provider
//! presets (CoinGecko, FRED, Yahoo chart, Twelve Data, alternative.me
//! fear/greed, Finnhub news sentiment, Solana RPC) or generic JSON endpoints
//! with an explicit extraction rule. [`SourceFetcher`] resolves the chain once
//! at startup and then, every attempt, tries each endpoint in order under its
//! own timeout. Failures never escape: a source whose chain is exhausted
//! yields a null [`Reading`](fusion_types::Reading) carrying every error.
//!
//! ## Credentials
//!
//! API keys come from the environment only ([`Credentials::from_env`]):
//! `FRED_API_KEY`, `TWELVEDATA_API_KEY`, `FINNHUB_API_KEY`, or
//! `FUSION_CREDENTIAL_<NAME>` for `{name}` placeholders in generic URLs.

use async_trait::async_trait;
use fusion_types::Readings;

mod credentials;
pub mod error;
pub mod extract;
mod fetcher;
pub mod provider;

pub use credentials::{Credentials, CREDENTIAL_ENV_PREFIX};
pub use error::{FetchError, ResolveError};
pub use fetcher::SourceFetcher;
pub use provider::{ResolvedEndpoint, ResolvedSource};

/// Something that produces the readings of one fetch attempt.
///
/// [`SourceFetcher`] is the HTTP implementation; the engine only depends on
/// this trait.
#[async_trait]
pub trait ReadingCollector: Send + Sync {
    /// Fetch every source and return once all have settled.
    async fn collect(&self) -> Readings;
}
