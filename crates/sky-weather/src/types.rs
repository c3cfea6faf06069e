use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sky_core::{DatabaseError, NetworkError};

/// Opaque identifier of a display surface
pub type TargetId = i64;

/// A latitude/longitude pair. Targets hold `Option<Coordinates>`, so a
/// half-set location cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` unless both values are finite numbers.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if latitude.is_finite() && longitude.is_finite() {
            Some(Self {
                latitude,
                longitude,
            })
        } else {
            None
        }
    }

    /// Build from two nullable columns; both must be present.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Self::new(lat, lon),
            _ => None,
        }
    }
}

/// How a target keeps its location current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LocationMode {
    /// Location picked by hand and never refreshed
    #[default]
    Fixed,
    /// Current location taken once, at configuration time
    TrackCurrent,
    /// Current location re-read on every refresh cycle
    TrackCurrentAndRefresh,
}

impl LocationMode {
    /// Whether the refresh cycle must re-read the device location
    pub fn refreshes_each_cycle(&self) -> bool {
        matches!(self, Self::TrackCurrentAndRefresh)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::TrackCurrent => "track-current",
            Self::TrackCurrentAndRefresh => "track-current-and-refresh",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fixed" => Some(Self::Fixed),
            "track-current" => Some(Self::TrackCurrent),
            "track-current-and-refresh" => Some(Self::TrackCurrentAndRefresh),
            _ => None,
        }
    }
}

/// Outcome of the most recent refresh cycle for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    #[default]
    Unknown,
    Ok,
    Failure,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ok => "ok",
            Self::Failure => "failure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unknown" => Some(Self::Unknown),
            "ok" => Some(Self::Ok),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Temperature unit announced by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// `"SI"` means Celsius; any other unit system is Fahrenheit.
    pub fn from_unit_system(tag: &str) -> Self {
        if tag == "SI" {
            Self::Celsius
        } else {
            Self::Fahrenheit
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }

    pub fn parse_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "°C" => Some(Self::Celsius),
            "°F" => Some(Self::Fahrenheit),
            _ => None,
        }
    }
}

/// Summary "current conditions" block of a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MainConditions {
    pub unit: TemperatureUnit,
    pub current_temperature: Option<i32>,
}

/// One configured display surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub title: String,
    pub coordinates: Option<Coordinates>,
    pub language: String,
    pub encoding: String,
    /// Hours between background refreshes; 0 disables them
    pub refresh_interval_hours: u32,
    pub location_mode: LocationMode,
    pub last_updated: Option<DateTime<Utc>>,
    pub status: UpdateStatus,
    pub configured: bool,
    pub conditions: Option<MainConditions>,
}

impl Target {
    /// A fresh, not yet configured target
    pub fn new(id: TargetId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            coordinates: None,
            language: "en".to_string(),
            encoding: "UTF-8".to_string(),
            refresh_interval_hours: 6,
            location_mode: LocationMode::Fixed,
            last_updated: None,
            status: UpdateStatus::Unknown,
            configured: false,
            conditions: None,
        }
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_interval(mut self, hours: u32) -> Self {
        self.refresh_interval_hours = hours;
        self
    }

    pub fn with_location_mode(mut self, mode: LocationMode) -> Self {
        self.location_mode = mode;
        self
    }

    pub fn with_feed_locale(mut self, language: impl Into<String>, encoding: impl Into<String>) -> Self {
        self.language = language.into();
        self.encoding = encoding.into();
        self
    }
}

/// One 24h forecast period (or an alert)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub valid_start: DateTime<Utc>,
    pub temp_high: Option<i32>,
    pub temp_low: Option<i32>,
    pub conditions: String,
    pub icon: Option<String>,
    pub url: Option<String>,
    pub alert: bool,
}

/// Icon families used by the widgets, picked from the feed's icon key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionIcon {
    SevereAlert,
    HazeAlert,
    FewClouds,
    FewCloudsNight,
    BigClouds,
    SnowIcy,
    Storm,
    Snow,
    ShowersScattered,
    Showers,
    Clear,
    ClearNight,
    Unknown,
}

impl ConditionIcon {
    /// Classify an icon key (or full icon URL) by keyword, most severe
    /// families first.
    pub fn classify(icon: &str, daytime: bool) -> Self {
        let key = icon_key(icon).to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| key.contains(w));

        if has(&["alert", "advisory", "warning", "watch", "dust", "smoke"]) {
            Self::SevereAlert
        } else if has(&["haze", "fog"]) {
            Self::HazeAlert
        } else if has(&["partly_cloudy"]) {
            if daytime {
                Self::FewClouds
            } else {
                Self::FewCloudsNight
            }
        } else if has(&["cloudy"]) {
            // No dedicated night artwork for heavy clouds
            if daytime {
                Self::BigClouds
            } else {
                Self::FewCloudsNight
            }
        } else if has(&["icy"]) {
            Self::SnowIcy
        } else if has(&["storm"]) {
            Self::Storm
        } else if has(&["snow", "frost", "flurries", "sleet"]) {
            Self::Snow
        } else if has(&["chance_of_rain", "mist"]) {
            Self::ShowersScattered
        } else if has(&["rain"]) {
            Self::Showers
        } else if has(&["sunny", "clear"]) {
            if daytime {
                Self::Clear
            } else {
                Self::ClearNight
            }
        } else {
            Self::Unknown
        }
    }

    /// Asset name for the renderer
    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::SevereAlert => "weather_severe_alert",
            Self::HazeAlert => "weather_haze_alert",
            Self::FewClouds => "weather_few_clouds",
            Self::FewCloudsNight => "weather_few_clouds_night",
            Self::BigClouds => "weather_big_clouds",
            Self::SnowIcy => "weather_snow_icy",
            Self::Storm => "weather_storm",
            Self::Snow => "weather_snow",
            Self::ShowersScattered => "weather_showers_scattered",
            Self::Showers => "weather_showers",
            Self::Clear => "weather_clear",
            Self::ClearNight => "weather_clear_night",
            Self::Unknown => "weather_unknown",
        }
    }
}

/// Strip directories and extension from an icon URL:
/// `/ig/images/weather/mostly_sunny.gif` becomes `mostly_sunny`.
pub fn icon_key(icon: &str) -> &str {
    let file = icon.rsplit('/').next().unwrap_or(icon);
    match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    }
}

/// First hour considered daytime; kept early so the 6AM refresh flips icons.
const DAYTIME_BEGIN_HOUR: u32 = 7;
/// Last hour considered daytime.
const DAYTIME_END_HOUR: u32 = 20;

/// Whether the given local hour counts as daytime for icon selection
pub fn is_daytime(hour: u32) -> bool {
    (DAYTIME_BEGIN_HOUR..=DAYTIME_END_HOUR).contains(&hour)
}

/// Location service errors
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location service unavailable")]
    ServiceUnavailable,
    #[error("No last known location")]
    NoFix,
    #[error("Location error: {0}")]
    Other(String),
}

/// Geocoding failures
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Geocode query has neither a name nor coordinates")]
    EmptyQuery,
    #[error("No geocoding match for '{0}'")]
    NoMatch(String),
    #[error("Geocoding request failed: {0}")]
    Network(#[from] NetworkError),
    #[error("Geocoding response could not be read: {0}")]
    InvalidResponse(String),
    #[error("Geocoding failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<GeocodeError>,
    },
}

impl GeocodeError {
    /// Whether another full resolve attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::EmptyQuery | Self::Exhausted { .. })
    }
}

/// Feed transport failures
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Forecast request timed out")]
    Timeout,
    #[error("Forecast request failed: {0}")]
    Network(NetworkError),
}

impl From<NetworkError> for FeedError {
    fn from(e: NetworkError) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e)
        }
    }
}

/// Anything that stops a feed from turning into forecast records
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Requested forecast for invalid location")]
    InvalidLocation,
    #[error("Problem calling forecast API: {0}")]
    Network(#[from] FeedError),
    #[error("Malformed forecast document: {0}")]
    Malformed(String),
    #[error("Missing '{attribute}' on <{tag}>")]
    MissingAttribute { tag: String, attribute: String },
    #[error("Unreadable timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("Non-numeric temperature '{value}' in <{tag}>")]
    InvalidTemperature { tag: String, value: String },
    #[error("No forecasts found from webservice query")]
    Empty,
}

/// Forecast store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Target {0} not found")]
    NotFound(TargetId),
    #[error("Stored value for {field} is invalid: {value}")]
    InvalidValue { field: &'static str, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_reject_nan() {
        assert!(Coordinates::new(f64::NAN, 2.0).is_none());
        assert!(Coordinates::new(1.0, f64::NAN).is_none());
        assert!(Coordinates::new(48.85, 2.35).is_some());
    }

    #[test]
    fn test_coordinates_need_both_parts() {
        assert!(Coordinates::from_parts(Some(1.0), None).is_none());
        assert!(Coordinates::from_parts(None, Some(1.0)).is_none());
        assert_eq!(
            Coordinates::from_parts(Some(1.0), Some(2.0)),
            Coordinates::new(1.0, 2.0)
        );
    }

    #[test]
    fn test_unit_system_mapping() {
        assert_eq!(TemperatureUnit::from_unit_system("SI"), TemperatureUnit::Celsius);
        assert_eq!(TemperatureUnit::from_unit_system("US"), TemperatureUnit::Fahrenheit);
        assert_eq!(TemperatureUnit::from_unit_system(""), TemperatureUnit::Fahrenheit);
        assert_eq!(TemperatureUnit::Celsius.symbol(), "°C");
        assert_eq!(TemperatureUnit::parse_symbol("°F"), Some(TemperatureUnit::Fahrenheit));
    }

    #[test]
    fn test_location_mode_roundtrip_names() {
        for mode in [
            LocationMode::Fixed,
            LocationMode::TrackCurrent,
            LocationMode::TrackCurrentAndRefresh,
        ] {
            assert_eq!(LocationMode::parse(mode.as_str()), Some(mode));
        }
        assert!(LocationMode::TrackCurrentAndRefresh.refreshes_each_cycle());
        assert!(!LocationMode::TrackCurrent.refreshes_each_cycle());
    }

    #[test]
    fn test_icon_key() {
        assert_eq!(icon_key("/ig/images/weather/mostly_sunny.gif"), "mostly_sunny");
        assert_eq!(icon_key("sunny"), "sunny");
        assert_eq!(icon_key(""), "");
    }

    #[test]
    fn test_icon_priority() {
        assert_eq!(ConditionIcon::classify("/w/dust.gif", true), ConditionIcon::SevereAlert);
        assert_eq!(ConditionIcon::classify("/w/fog.gif", true), ConditionIcon::HazeAlert);
        assert_eq!(ConditionIcon::classify("/w/partly_cloudy.gif", true), ConditionIcon::FewClouds);
        assert_eq!(ConditionIcon::classify("/w/mostly_cloudy.gif", true), ConditionIcon::BigClouds);
        assert_eq!(ConditionIcon::classify("/w/chance_of_storm.gif", true), ConditionIcon::Storm);
        assert_eq!(ConditionIcon::classify("/w/chance_of_snow.gif", true), ConditionIcon::Snow);
        assert_eq!(
            ConditionIcon::classify("/w/chance_of_rain.gif", true),
            ConditionIcon::ShowersScattered
        );
        assert_eq!(ConditionIcon::classify("/w/rain.gif", true), ConditionIcon::Showers);
        assert_eq!(ConditionIcon::classify("/w/mostly_sunny.gif", true), ConditionIcon::Clear);
        assert_eq!(ConditionIcon::classify("/w/unheard_of.gif", true), ConditionIcon::Unknown);
    }

    #[test]
    fn test_icon_night_variants() {
        assert_eq!(ConditionIcon::classify("sunny", false), ConditionIcon::ClearNight);
        assert_eq!(ConditionIcon::classify("cloudy", false), ConditionIcon::FewCloudsNight);
        assert_eq!(ConditionIcon::classify("rain", false), ConditionIcon::Showers);
    }

    #[test]
    fn test_daytime_window() {
        assert!(!is_daytime(6));
        assert!(is_daytime(7));
        assert!(is_daytime(20));
        assert!(!is_daytime(21));
    }

    #[test]
    fn test_geocode_retryability() {
        assert!(!GeocodeError::EmptyQuery.is_retryable());
        assert!(GeocodeError::NoMatch("x".into()).is_retryable());
        assert!(GeocodeError::Network(NetworkError::Timeout).is_retryable());
    }

    #[test]
    fn test_feed_timeout_mapping() {
        let err: FeedError = NetworkError::Timeout.into();
        assert!(matches!(err, FeedError::Timeout));
        let err: FeedError = NetworkError::ConnectionFailed("refused".into()).into();
        assert!(matches!(err, FeedError::Network(_)));
    }
}
