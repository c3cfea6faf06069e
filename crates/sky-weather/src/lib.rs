//! Forecast domain for Sky
//!
//! Feed client and parser, geocoding, location capability and the SQLite
//! forecast store used by the background updater.

pub mod types;
pub mod cache;
pub mod fixture;
pub mod geocode;
pub mod location;
pub mod parser;
pub mod provider;
pub mod retry;

pub use types::*;
pub use cache::{ForecastStore, SqliteForecastStore};
pub use geocode::{Address, GeocodeQuery, GeocodeResolver, Geocoder, NominatimGeocoder};
pub use location::{LocationFix, LocationProvider, NoLocation, SharedLocation};
pub use parser::{flatten_forecasts, parse, ParsedForecast};
pub use provider::{FeedClient, FeedRequest, FeedSource, WeatherProvider};
pub use retry::RetryConfig;
