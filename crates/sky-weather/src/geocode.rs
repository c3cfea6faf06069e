//! Forward and reverse geocoding.
//!
//! `NominatimGeocoder` talks to Nominatim (OpenStreetMap), which is free and
//! needs no API key. `GeocodeResolver` wraps any geocoder with the bounded
//! retry used by the update cycle and the configuration flow.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sky_core::error::ReqwestErrorExt;
use sky_core::GeocodeConfig;

use crate::retry::{with_retry, RetryConfig, RetryDecision};
use crate::types::{Coordinates, GeocodeError};

const USER_AGENT: &str = concat!("Sky/", env!("CARGO_PKG_VERSION"));

/// Best match returned by a geocoder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub locality: Option<String>,
    pub feature_name: Option<String>,
    pub admin_area: Option<String>,
    pub postal_code: Option<String>,
    pub country_name: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl Address {
    /// First non-empty of locality, feature name, admin area, postal code,
    /// country name.
    pub fn display_name(&self) -> Option<&str> {
        [
            &self.locality,
            &self.feature_name,
            &self.admin_area,
            &self.postal_code,
            &self.country_name,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .map(str::trim)
        .find(|part| !part.is_empty())
    }
}

/// A place by name, by coordinates, or both once resolved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodeQuery {
    pub name: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl GeocodeQuery {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            coordinates: None,
        }
    }

    pub fn by_coordinates(coordinates: Coordinates) -> Self {
        Self {
            name: None,
            coordinates: Some(coordinates),
        }
    }

    pub fn from_address(address: &Address) -> Self {
        Self {
            name: address.display_name().map(str::to_string),
            coordinates: address.coordinates,
        }
    }

    /// The trimmed name, when there is one worth looking up
    pub fn lookup_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// A geocoding backend. Zero matches is `Ok(None)`, not an error.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn forward(&self, name: &str) -> Result<Option<Address>, GeocodeError>;
    async fn reverse(&self, coordinates: Coordinates) -> Result<Option<Address>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: Option<String>,
    lon: Option<String>,
    name: Option<String>,
    address: Option<NominatimAddress>,
    /// Set by `/reverse` when nothing is near the point
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
}

impl NominatimPlace {
    fn into_address(self) -> Address {
        let coordinates = Coordinates::from_parts(
            self.lat.and_then(|v| v.parse().ok()),
            self.lon.and_then(|v| v.parse().ok()),
        );
        let addr = self.address.unwrap_or_default();

        // Prefer city > town > village > municipality for the locality
        let locality = addr
            .city
            .or(addr.town)
            .or(addr.village)
            .or(addr.municipality);

        Address {
            locality,
            feature_name: self.name,
            admin_area: addr.state,
            postal_code: addr.postcode,
            country_name: addr.country,
            coordinates,
        }
    }
}

/// Nominatim `/search` and `/reverse` client
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodeConfig) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GeocodeError::Network(e.into_network_error()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GeocodeError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| GeocodeError::Network(e.into_network_error()))?
            .error_for_status()
            .map_err(|e| GeocodeError::Network(e.into_network_error()))?;

        response
            .json()
            .await
            .map_err(|e| GeocodeError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn forward(&self, name: &str) -> Result<Option<Address>, GeocodeError> {
        let places: Vec<NominatimPlace> = self
            .get_json(
                "search",
                &[
                    ("q", name.to_string()),
                    ("format", "json".to_string()),
                    ("addressdetails", "1".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        Ok(places.into_iter().next().map(NominatimPlace::into_address))
    }

    async fn reverse(&self, coordinates: Coordinates) -> Result<Option<Address>, GeocodeError> {
        let place: NominatimPlace = self
            .get_json(
                "reverse",
                &[
                    ("lat", coordinates.latitude.to_string()),
                    ("lon", coordinates.longitude.to_string()),
                    ("format", "json".to_string()),
                    ("addressdetails", "1".to_string()),
                ],
            )
            .await?;

        if let Some(reason) = &place.error {
            tracing::debug!("Reverse geocode found nothing: {}", reason);
            return Ok(None);
        }

        Ok(Some(place.into_address()))
    }
}

/// Geocoder plus bounded retry. Every attempt is a full resolve.
#[derive(Clone)]
pub struct GeocodeResolver {
    geocoder: Arc<dyn Geocoder>,
    retry: RetryConfig,
}

impl GeocodeResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, retry: RetryConfig) -> Self {
        Self { geocoder, retry }
    }

    /// Resolve a query.
    ///
    /// A name is looked up forward and must match. Coordinates are looked up
    /// in reverse and stay as given; no reverse match returns the query
    /// unchanged.
    pub async fn resolve(&self, query: &GeocodeQuery) -> Result<GeocodeQuery, GeocodeError> {
        if query.lookup_name().is_none() && query.coordinates.is_none() {
            return Err(GeocodeError::EmptyQuery);
        }

        let result = with_retry(
            &self.retry,
            || self.attempt(query),
            |e: &GeocodeError| {
                if e.is_retryable() {
                    RetryDecision::Retry
                } else {
                    RetryDecision::NoRetry
                }
            },
        )
        .await;

        match result {
            Ok(resolved) => Ok(resolved),
            Err(failure) if failure.exhausted => Err(GeocodeError::Exhausted {
                attempts: failure.attempts,
                last: Box::new(failure.last),
            }),
            Err(failure) => Err(failure.last),
        }
    }

    async fn attempt(&self, query: &GeocodeQuery) -> Result<GeocodeQuery, GeocodeError> {
        if let Some(name) = query.lookup_name() {
            let address = self
                .geocoder
                .forward(name)
                .await?
                .ok_or_else(|| GeocodeError::NoMatch(name.to_string()))?;

            return Ok(GeocodeQuery {
                name: address
                    .display_name()
                    .map(str::to_string)
                    .or_else(|| Some(name.to_string())),
                coordinates: address.coordinates.or(query.coordinates),
            });
        }

        let Some(coordinates) = query.coordinates else {
            return Err(GeocodeError::EmptyQuery);
        };

        match self.geocoder.reverse(coordinates).await? {
            Some(address) => Ok(GeocodeQuery {
                name: address
                    .display_name()
                    .map(str::to_string)
                    .or_else(|| query.name.clone()),
                coordinates: Some(coordinates),
            }),
            None => Ok(query.clone()),
        }
    }
}
