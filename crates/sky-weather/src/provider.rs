//! Forecast webservice client.
//!
//! `FeedSource` fetches the raw document; `WeatherProvider` turns a target
//! into a request, fetches and parses it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::Client;
use sky_core::error::ReqwestErrorExt;
use sky_core::FeedConfig;

use crate::fixture::EXAMPLE_RESPONSE;
use crate::parser::{self, ParsedForecast};
use crate::types::{Coordinates, FeedError, ParseError, Target};

/// Everything the webservice needs to answer for one target
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRequest {
    pub city: String,
    pub coordinates: Coordinates,
    pub language: String,
    pub encoding: String,
    pub days: u32,
}

impl FeedRequest {
    /// Fails with `InvalidLocation` when the target has no coordinates.
    pub fn for_target(target: &Target, days: u32) -> Result<Self, ParseError> {
        let coordinates = target.coordinates.ok_or(ParseError::InvalidLocation)?;

        Ok(Self {
            city: target.title.clone(),
            coordinates,
            language: target.language.clone(),
            encoding: target.encoding.clone(),
            days,
        })
    }
}

/// `{base}?weather={city},,,{lat·1e6},{lon·1e6}&hl={lang}&days={n}`
///
/// Commas separate the fields of `weather`, so they stay literal inside the
/// city name too.
pub fn forecast_url(base_url: &str, request: &FeedRequest) -> String {
    let lat_e6 = (request.coordinates.latitude * 1e6) as i64;
    let lon_e6 = (request.coordinates.longitude * 1e6) as i64;
    let city = request
        .city
        .split(',')
        .map(|part| urlencoding::encode(part).into_owned())
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "{}?weather={},,,{},{}&hl={}&days={}",
        base_url,
        city,
        lat_e6,
        lon_e6,
        urlencoding::encode(&request.language),
        request.days
    )
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Raw feed document, decoded to text
    async fn fetch(&self, request: &FeedRequest) -> Result<String, FeedError>;
}

/// HTTP feed client
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    base_url: String,
    use_embedded_fixture: bool,
}

impl FeedClient {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FeedError::from(e.into_network_error()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            use_embedded_fixture: config.use_embedded_fixture,
        })
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch(&self, request: &FeedRequest) -> Result<String, FeedError> {
        if self.use_embedded_fixture {
            tracing::debug!("Serving embedded sample feed for '{}'", request.city);
            return Ok(EXAMPLE_RESPONSE.to_string());
        }

        let url = forecast_url(&self.base_url, request);
        tracing::debug!("Fetching forecast: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::from(e.into_network_error()))?
            .error_for_status()
            .map_err(|e| FeedError::from(e.into_network_error()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| FeedError::from(e.into_network_error()))?;
        Ok(decode(&body, &request.encoding))
    }
}

/// Decode with the target's charset whatever the server declared. Unknown
/// labels fall back to UTF-8.
fn decode(body: &[u8], label: &str) -> String {
    let encoding = Encoding::for_label(label.trim().as_bytes()).unwrap_or_else(|| {
        tracing::warn!("Unknown feed encoding '{}', using UTF-8", label);
        UTF_8
    });

    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        tracing::debug!("Feed body had invalid {} sequences", used.name());
    }
    text.into_owned()
}

/// Fetch plus parse for a target
#[derive(Clone)]
pub struct WeatherProvider {
    source: Arc<dyn FeedSource>,
    days: u32,
}

impl WeatherProvider {
    pub fn new(source: Arc<dyn FeedSource>, days: u32) -> Self {
        Self { source, days }
    }

    /// Build the HTTP-backed provider from configuration
    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        Ok(Self::new(Arc::new(FeedClient::new(config)?), config.forecast_days))
    }

    /// Fetch and parse the forecast for `target`. A feed without any
    /// usable record is an error.
    pub async fn forecast(&self, target: &Target) -> Result<ParsedForecast, ParseError> {
        let request = FeedRequest::for_target(target, self.days)?;
        let raw = self.source.fetch(&request).await?;

        let parsed = parser::parse(&raw, self.days)?;
        if parsed.records.is_empty() {
            return Err(ParseError::Empty);
        }

        tracing::debug!(
            "Parsed {} forecast records for target {}",
            parsed.records.len(),
            target.id
        );
        Ok(parsed)
    }
}
