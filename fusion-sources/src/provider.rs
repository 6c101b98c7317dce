//! Provider presets and endpoint resolution.
//!
//! Each profile endpoint is resolved once, at startup, into a concrete
//! request: URL (credentials filled in), optional JSON body, extraction rule
//! and timeout. Resolution is where missing symbols or credentials surface;
//! fetching itself never fails for configuration reasons.

use std::fmt;
use std::time::Duration;

use fusion_types::{EndpointSpec, Extract, FetchSettings, Provider, SourceSpec};
use reqwest::Url;
use serde_json::{json, Value};

use crate::extract::pointer_token;
use crate::{Credentials, ResolveError};

const COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/simple/price";
const FRED_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
const YAHOO_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const TWELVE_DATA_URL: &str = "https://api.twelvedata.com/price";
const FEAR_GREED_URL: &str = "https://api.alternative.me/fng/";
const FINNHUB_SENTIMENT_URL: &str = "https://finnhub.io/api/v1/news-sentiment";
const SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// A source with every endpoint resolved.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub id: String,
    pub endpoints: Vec<ResolvedEndpoint>,
}

/// A ready-to-send request for one endpoint.
#[derive(Clone)]
pub struct ResolvedEndpoint {
    provider: Provider,
    description: String,
    url: Url,
    body: Option<Value>,
    extract: Extract,
    timeout: Duration,
}

impl ResolvedEndpoint {
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Loggable description; never contains credentials.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn extract(&self) -> &Extract {
        &self.extract
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True when the request carries a JSON body.
    pub fn is_post(&self) -> bool {
        self.body.is_some()
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

impl fmt::Debug for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedEndpoint")
            .field("provider", &self.provider)
            .field("description", &self.description)
            .field("post", &self.is_post())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Resolve every endpoint of a source.
pub fn resolve_source(
    spec: &SourceSpec,
    settings: &FetchSettings,
    credentials: &Credentials,
) -> Result<ResolvedSource, ResolveError> {
    let endpoints = spec
        .endpoints
        .iter()
        .map(|endpoint| resolve_endpoint(&spec.id, endpoint, settings, credentials))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResolvedSource {
        id: spec.id.clone(),
        endpoints,
    })
}

/// Resolve one endpoint against its provider preset.
pub fn resolve_endpoint(
    source_id: &str,
    spec: &EndpointSpec,
    settings: &FetchSettings,
    credentials: &Credentials,
) -> Result<ResolvedEndpoint, ResolveError> {
    let symbol = || {
        spec.symbol
            .as_deref()
            .ok_or_else(|| ResolveError::MissingSymbol {
                source_id: source_id.to_string(),
                provider: spec.provider,
            })
    };
    let credential = |name: &str| {
        credentials
            .get(name)
            .ok_or_else(|| missing_credential(source_id, name))
    };
    let base = |default: &str| parse_url(source_id, spec.url.as_deref().unwrap_or(default));

    let (url, body, extract, description) = match spec.provider {
        Provider::Coingecko => {
            let coin = symbol()?;
            let url = with_query(base(COINGECKO_URL)?, &[("ids", coin), ("vs_currencies", "usd")]);
            let extract = number(format!("/{}/usd", pointer_token(coin)), None);
            (url, None, extract, labelled(spec.provider, coin))
        }
        Provider::Fred => {
            let series = symbol()?;
            let key = credential("fred")?;
            let url = with_query(
                base(FRED_URL)?,
                &[("series_id", series), ("api_key", key), ("file_type", "json")],
            );
            let extract = Extract::LastObservation {
                array: "/observations".to_string(),
                field: "value".to_string(),
            };
            (url, None, extract, labelled(spec.provider, series))
        }
        Provider::Yahoo => {
            let ticker = symbol()?;
            let mut url = base(YAHOO_URL)?;
            url.path_segments_mut()
                .map_err(|_| invalid_url(source_id, "url cannot be a base"))?
                .pop_if_empty()
                .push(ticker);
            let extract = number("/chart/result/0/meta/regularMarketPrice".to_string(), None);
            (url, None, extract, labelled(spec.provider, ticker))
        }
        Provider::TwelveData => {
            let ticker = symbol()?;
            let key = credential("twelvedata")?;
            let url = with_query(
                base(TWELVE_DATA_URL)?,
                &[("symbol", ticker), ("apikey", key)],
            );
            (url, None, number("/price".to_string(), None), labelled(spec.provider, ticker))
        }
        Provider::FearGreed => {
            let extract = Extract::Index {
                value: "/data/0/value".to_string(),
                classification: "/data/0/value_classification".to_string(),
            };
            (base(FEAR_GREED_URL)?, None, extract, spec.provider.to_string())
        }
        Provider::FinnhubSentiment => {
            let ticker = symbol()?;
            let key = credential("finnhub")?;
            let url = with_query(
                base(FINNHUB_SENTIMENT_URL)?,
                &[("symbol", ticker), ("token", key)],
            );
            let extract = number("/buzz/articlesInLastWeek".to_string(), Some(0.0));
            (url, None, extract, labelled(spec.provider, ticker))
        }
        Provider::SolanaRpc => {
            let body = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "getRecentPerformanceSamples",
                "params": [1],
            });
            let extract = Extract::Throughput {
                sample: "/result/0".to_string(),
                count: "numTransactions".to_string(),
                period: "samplePeriodSecs".to_string(),
            };
            (base(SOLANA_RPC_URL)?, Some(body), extract, spec.provider.to_string())
        }
        Provider::Http => {
            let template = spec.url.as_deref().ok_or_else(|| ResolveError::MissingUrl {
                source_id: source_id.to_string(),
            })?;
            let extract = spec
                .extract
                .clone()
                .ok_or_else(|| ResolveError::MissingExtract {
                    source_id: source_id.to_string(),
                })?;
            let url = parse_url(source_id, &substitute(source_id, template, credentials)?)?;
            let description = format!("http({})", url.host_str().unwrap_or("?"));
            (url, None, extract, description)
        }
    };

    Ok(ResolvedEndpoint {
        provider: spec.provider,
        description,
        url,
        body: spec.body.clone().or(body),
        extract: spec.extract.clone().unwrap_or(extract),
        timeout: spec
            .timeout
            .unwrap_or(settings.timeout)
            .to_duration(),
    })
}

fn number(pointer: String, default: Option<f64>) -> Extract {
    Extract::Number { pointer, default }
}

fn labelled(provider: Provider, symbol: &str) -> String {
    format!("{}({})", provider, symbol)
}

fn with_query(mut url: Url, pairs: &[(&str, &str)]) -> Url {
    url.query_pairs_mut().extend_pairs(pairs);
    url
}

fn parse_url(source_id: &str, raw: &str) -> Result<Url, ResolveError> {
    Url::parse(raw).map_err(|e| invalid_url(source_id, &e.to_string()))
}

fn invalid_url(source_id: &str, reason: &str) -> ResolveError {
    ResolveError::InvalidUrl {
        source_id: source_id.to_string(),
        reason: reason.to_string(),
    }
}

fn missing_credential(source_id: &str, name: &str) -> ResolveError {
    ResolveError::MissingCredential {
        source_id: source_id.to_string(),
        credential: name.to_string(),
        env_var: Credentials::env_var(name),
    }
}

/// Replace `{name}` placeholders with credentials.
fn substitute(
    source_id: &str,
    template: &str,
    credentials: &Credentials,
) -> Result<String, ResolveError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        let value = credentials
            .get(name)
            .ok_or_else(|| missing_credential(source_id, name))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_types::HumanDuration;

    fn settings() -> FetchSettings {
        FetchSettings::default()
    }

    fn creds() -> Credentials {
        Credentials::new()
            .with("fred", "fred-key")
            .with("twelvedata", "td-key")
            .with("finnhub", "fh-key")
    }

    fn resolve(spec: EndpointSpec) -> Result<ResolvedEndpoint, ResolveError> {
        resolve_endpoint("X", &spec, &settings(), &creds())
    }

    #[test]
    fn test_coingecko_preset() {
        let ep = resolve(EndpointSpec::preset(Provider::Coingecko, "bitcoin")).unwrap();
        assert_eq!(
            ep.url().as_str(),
            "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd"
        );
        assert_eq!(
            ep.extract(),
            &Extract::Number {
                pointer: "/bitcoin/usd".into(),
                default: None
            }
        );
        assert_eq!(ep.timeout(), Duration::from_secs(10));
        assert!(!ep.is_post());
        assert_eq!(ep.description(), "coingecko(bitcoin)");
    }

    #[test]
    fn test_fred_preset_carries_key() {
        let ep = resolve(EndpointSpec::preset(Provider::Fred, "DGS10")).unwrap();
        assert_eq!(
            ep.url().as_str(),
            "https://api.stlouisfed.org/fred/series/observations?series_id=DGS10&api_key=fred-key&file_type=json"
        );
    }

    #[test]
    fn test_debug_hides_url() {
        let ep = resolve(EndpointSpec::preset(Provider::TwelveData, "XAU/USD")).unwrap();
        assert!(ep.url().as_str().contains("apikey=td-key"));
        assert!(ep.url().as_str().contains("symbol=XAU%2FUSD"));
        assert!(!format!("{:?}", ep).contains("td-key"));
        assert!(!ep.description().contains("td-key"));
    }

    #[test]
    fn test_yahoo_symbol_in_path() {
        let ep = resolve(EndpointSpec::preset(Provider::Yahoo, "DX-Y.NYB")).unwrap();
        assert_eq!(
            ep.url().as_str(),
            "https://query1.finance.yahoo.com/v8/finance/chart/DX-Y.NYB"
        );
    }

    #[test]
    fn test_solana_is_post() {
        let spec = EndpointSpec {
            provider: Provider::SolanaRpc,
            symbol: None,
            url: None,
            body: None,
            extract: None,
            timeout: Some(HumanDuration::from_secs(3)),
        };
        let ep = resolve(spec).unwrap();
        assert!(ep.is_post());
        assert_eq!(ep.body().unwrap()["method"], "getRecentPerformanceSamples");
        assert_eq!(ep.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_missing_credential() {
        let spec = EndpointSpec::preset(Provider::Fred, "DGS10");
        let err = resolve_endpoint("US10Y", &spec, &settings(), &Credentials::new()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::MissingCredential {
                source_id: "US10Y".into(),
                credential: "fred".into(),
                env_var: "FRED_API_KEY".into(),
            }
        );
    }

    #[test]
    fn test_missing_symbol() {
        let mut spec = EndpointSpec::preset(Provider::Coingecko, "bitcoin");
        spec.symbol = None;
        assert!(matches!(
            resolve(spec),
            Err(ResolveError::MissingSymbol { .. })
        ));
    }

    #[test]
    fn test_http_placeholders() {
        let spec = EndpointSpec {
            provider: Provider::Http,
            symbol: None,
            url: Some("https://example.com/q?key={fred}&s=BTC".into()),
            body: None,
            extract: Some(Extract::Number {
                pointer: "/v".into(),
                default: None,
            }),
            timeout: None,
        };
        let ep = resolve(spec).unwrap();
        assert_eq!(ep.url().as_str(), "https://example.com/q?key=fred-key&s=BTC");
        assert_eq!(ep.description(), "http(example.com)");
    }

    #[test]
    fn test_http_requires_extract() {
        let spec = EndpointSpec {
            provider: Provider::Http,
            symbol: None,
            url: Some("https://example.com/q".into()),
            body: None,
            extract: None,
            timeout: None,
        };
        assert!(matches!(
            resolve(spec),
            Err(ResolveError::MissingExtract { .. })
        ));
    }

    #[test]
    fn test_url_override_keeps_preset_query() {
        let mut spec = EndpointSpec::preset(Provider::Coingecko, "ethereum");
        spec.url = Some("http://127.0.0.1:9/simple/price".into());
        let ep = resolve(spec).unwrap();
        assert_eq!(
            ep.url().as_str(),
            "http://127.0.0.1:9/simple/price?ids=ethereum&vs_currencies=usd"
        );
    }
}
