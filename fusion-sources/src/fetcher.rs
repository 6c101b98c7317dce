//! Fetching readings over HTTP with per-source fallback chains.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fusion_sources::{Credentials, ReadingCollector, SourceFetcher};
//! use fusion_types::{EndpointSpec, FetchSettings, Provider, SourceSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sources = vec![SourceSpec {
//!         id: "BTC".into(),
//!         endpoints: vec![EndpointSpec::preset(Provider::Coingecko, "bitcoin")],
//!     }];
//!
//!     let fetcher =
//!         SourceFetcher::from_sources(&sources, &FetchSettings::default(), &Credentials::from_env())?;
//!     let readings = fetcher.collect().await;
//!
//!     println!("BTC = {:?}", readings.value("BTC"));
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use fusion_types::{FetchSettings, Profile, Reading, Readings, SourceSpec};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::extract::{extract, Extracted};
use crate::provider::{resolve_source, ResolvedEndpoint, ResolvedSource};
use crate::{Credentials, FetchError, ReadingCollector, ResolveError};

/// Fetches every source of a profile.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: Client,
    sources: Vec<ResolvedSource>,
}

impl SourceFetcher {
    /// Resolve a profile's sources.
    pub fn new(profile: &Profile, credentials: &Credentials) -> Result<Self, ResolveError> {
        Self::from_sources(&profile.sources, &profile.fetch, credentials)
    }

    /// Resolve a list of sources.
    pub fn from_sources(
        sources: &[SourceSpec],
        settings: &FetchSettings,
        credentials: &Credentials,
    ) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ResolveError::Client(e.to_string()))?;

        let sources = sources
            .iter()
            .map(|source| resolve_source(source, settings, credentials))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::with_client(client, sources))
    }

    /// Use an existing client.
    pub fn with_client(client: Client, sources: Vec<ResolvedSource>) -> Self {
        Self { client, sources }
    }

    /// The resolved sources, in profile order.
    pub fn sources(&self) -> &[ResolvedSource] {
        &self.sources
    }

    /// Fetch one source, walking its fallback chain.
    ///
    /// Never fails: when every endpoint fails the reading is null and its
    /// error lists each attempt.
    pub async fn fetch(&self, source: &ResolvedSource) -> Reading {
        let mut failures = Vec::with_capacity(source.endpoints.len());

        for (attempt, endpoint) in source.endpoints.iter().enumerate() {
            match self.attempt(endpoint).await {
                Ok(Extracted { value, label }) => {
                    debug!(
                        source = %source.id,
                        endpoint = endpoint.description(),
                        value,
                        "Fetched reading"
                    );
                    if attempt > 0 {
                        info!(
                            source = %source.id,
                            endpoint = endpoint.description(),
                            attempt = attempt + 1,
                            "Fallback endpoint succeeded"
                        );
                    }
                    let reading = Reading::value(&source.id, value, Utc::now());
                    return match label {
                        Some(label) => reading.with_label(label),
                        None => reading,
                    };
                }
                Err(e) => {
                    warn!(
                        source = %source.id,
                        endpoint = endpoint.description(),
                        error = %e,
                        "Endpoint failed"
                    );
                    failures.push(format!("{}: {}", endpoint.description(), e));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no endpoints".to_string());
        }
        Reading::failed(&source.id, failures.join("; "), Utc::now())
    }

    async fn attempt(&self, endpoint: &ResolvedEndpoint) -> Result<Extracted, FetchError> {
        let request = match endpoint.body() {
            Some(body) => self.client.post(endpoint.url().clone()).json(body),
            None => self.client.get(endpoint.url().clone()),
        };

        let response = request.timeout(endpoint.timeout()).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body: Value = response.json().await?;
        extract(endpoint.extract(), &body)
    }
}

#[async_trait]
impl ReadingCollector for SourceFetcher {
    async fn collect(&self) -> Readings {
        join_all(self.sources.iter().map(|source| self.fetch(source)))
            .await
            .into_iter()
            .collect()
    }
}
