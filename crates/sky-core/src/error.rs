//! Error types shared across the Sky crates.
//!
//! `sky-weather` and `sky-update` keep narrow per-concern enums. Whatever
//! reaches the process edge is folded into `AppError`, whose
//! `user_message()` is short enough for a widget status line.

use thiserror::Error;

/// Error surfaced where the updater is wired together or reported on.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Forecast store error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Forecast error: {0}")]
    Forecast(#[from] ForecastError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Status-line text for the failure
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Database(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Forecast(e) => e.user_message(),
            AppError::Io(_) => "Could not access Sky's data directory.",
            AppError::Other(_) => "Update failed.",
        }
    }
}

/// Transport failures talking to the feed or geocoding service
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("Unreadable response body: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => "No connection to the forecast service.",
            NetworkError::Timeout => "Forecast service did not answer in time.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "Forecast service is down. Will retry."
            }
            NetworkError::ServerError { .. } => "Forecast service refused the request.",
            NetworkError::InvalidResponse(_) => "Forecast service sent an unreadable reply.",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, NetworkError::Timeout)
    }
}

/// Problems with the forecast store (SQLite)
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Cannot open forecast store: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Forecast store is corrupt: {0}")]
    Corruption(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::ConnectionFailed(_) => "Cannot open saved forecasts.",
            DatabaseError::QueryFailed(_) => "Saving the forecast failed.",
            DatabaseError::Corruption(_) => "Saved forecasts are damaged. Remove and re-add the widget.",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Sky's configuration file has invalid settings.",
        }
    }
}

/// A refresh that reached the services but produced no usable forecast
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The feed reply was not a forecast we could read
    #[error("Unreadable forecast: {0}")]
    Unreadable(String),

    /// The feed answered without any forecast period
    #[error("Forecast reply was empty")]
    Empty,

    /// No usable position or place for the target
    #[error("Location unknown: {0}")]
    LocationUnknown(String),
}

impl ForecastError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ForecastError::Unreadable(_) => "Forecast could not be read.",
            ForecastError::Empty => "No forecast available for this place.",
            ForecastError::LocationUnknown(_) => "Location unknown. Check the widget's place.",
        }
    }
}

/// Conversion of reqwest failures into [`NetworkError`]
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        let message = self.to_string();
        match self.status() {
            _ if self.is_timeout() => NetworkError::Timeout,
            Some(status) => NetworkError::ServerError {
                status: status.as_u16(),
                message,
            },
            None if self.is_decode() || self.is_body() => NetworkError::InvalidResponse(message),
            None => NetworkError::ConnectionFailed(message),
        }
    }
}

/// Conversion of rusqlite failures into [`DatabaseError`]
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        let message = self.to_string();
        match self.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase) => {
                DatabaseError::Corruption(message)
            }
            Some(rusqlite::ErrorCode::CannotOpen) => DatabaseError::ConnectionFailed(message),
            _ => DatabaseError::QueryFailed(message),
        }
    }
}
