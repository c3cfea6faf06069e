//! Device location capability.
//!
//! The platform pushes fixes in through `SharedLocation::on_location_update`;
//! the update cycle only ever asks for the last known fix.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::types::{Coordinates, LocationError};

/// A location reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub coordinates: Coordinates,
    pub accuracy_meters: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Most recent fix known to the provider, without waiting for a new one
    async fn last_known_fix(&self) -> Result<LocationFix, LocationError>;
}

/// Provider fed by platform callbacks
#[derive(Debug, Default)]
pub struct SharedLocation {
    last: RwLock<Option<LocationFix>>,
}

impl SharedLocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh fix from the platform
    pub fn on_location_update(&self, fix: LocationFix) {
        tracing::debug!(
            "Location update: {:.4}, {:.4}",
            fix.coordinates.latitude,
            fix.coordinates.longitude
        );
        *self.last.write() = Some(fix);
    }

    pub fn clear(&self) {
        *self.last.write() = None;
    }
}

#[async_trait]
impl LocationProvider for SharedLocation {
    async fn last_known_fix(&self) -> Result<LocationFix, LocationError> {
        (*self.last.read()).ok_or(LocationError::NoFix)
    }
}

/// Stand-in for a platform without location services
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn last_known_fix(&self) -> Result<LocationFix, LocationError> {
        Err(LocationError::ServiceUnavailable)
    }
}
