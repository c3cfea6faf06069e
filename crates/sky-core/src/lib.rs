//! Shared foundation for the Sky forecast updater: configuration, typed
//! application errors and logging setup.

pub mod config;
pub mod error;

pub use config::{Config, FeedConfig, GeocodeConfig, ScheduleConfig, ValidationResult};
pub use error::{AppError, ConfigError, DatabaseError, ForecastError, NetworkError};

use anyhow::Result;

/// Initialize logging for the process
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!("Sky core initialized");
    Ok(())
}
