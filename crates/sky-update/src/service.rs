//! Entry points for everything that asks for a refresh.
//!
//! Requests land in the queue; if no drain is running one is spawned on the
//! tokio runtime. A request racing with the end of a drain may start a
//! second drain, so every queued id is processed at least once.

use std::sync::Arc;

use sky_core::{AppError, Config, ConfigError};
use sky_weather::{
    ForecastStore, GeocodeError, GeocodeQuery, GeocodeResolver, LocationProvider,
    NominatimGeocoder, RetryConfig, SqliteForecastStore, StoreResult, Target, TargetId,
    UpdateStatus, WeatherProvider,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::coordinator::{DrainReport, UpdateCoordinator, UpdateError};
use crate::queue::UpdateQueue;
use crate::render::WidgetRenderer;
use crate::scheduler::{AlarmFired, SchedulePolicy, TokioAlarm};

/// Handle of a drain started by a request
pub type DrainHandle = JoinHandle<DrainReport>;

#[derive(Clone)]
pub struct UpdateService {
    coordinator: Arc<UpdateCoordinator>,
    default_language: String,
    default_encoding: String,
}

impl UpdateService {
    pub fn new(coordinator: UpdateCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            default_language: "en".to_string(),
            default_encoding: "UTF-8".to_string(),
        }
    }

    /// Feed locale given to targets configured without one
    pub fn with_feed_defaults(mut self, language: impl Into<String>, encoding: impl Into<String>) -> Self {
        self.default_language = language.into();
        self.default_encoding = encoding.into();
        self
    }

    /// Wire the SQLite store, HTTP clients and an in-process alarm from
    /// configuration. Alarm firings arrive on the returned receiver.
    pub fn open(
        config: &Config,
        renderer: Arc<dyn WidgetRenderer>,
        location: Option<Arc<dyn LocationProvider>>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<AlarmFired>), AppError> {
        let validation = config.validate();
        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        std::fs::create_dir_all(&config.config_dir)?;
        let store = SqliteForecastStore::new(config.database_path()).map_err(UpdateError::from)?;
        tracing::info!("Forecast store at {}", config.database_path().display());

        let provider = WeatherProvider::from_config(&config.feed)
            .map_err(|e| UpdateError::Forecast(e.into()))?;
        let geocoder = NominatimGeocoder::new(&config.geocode).map_err(UpdateError::from)?;
        let resolver = GeocodeResolver::new(Arc::new(geocoder), RetryConfig::from(&config.geocode));
        let (alarm, alarm_rx) = TokioAlarm::channel();

        let mut coordinator = UpdateCoordinator::new(
            Arc::new(UpdateQueue::new()),
            Arc::new(store),
            provider,
            resolver,
            renderer,
            alarm,
            SchedulePolicy::from(&config.schedule),
        );
        if let Some(location) = location {
            coordinator = coordinator.with_location(location);
        }

        let service = Self::new(coordinator)
            .with_feed_defaults(&config.feed.default_language, &config.feed.default_encoding);
        Ok((service, alarm_rx))
    }

    fn store(&self) -> &Arc<dyn ForecastStore> {
        self.coordinator.store()
    }

    /// Queue the given targets and make sure a drain is running.
    pub fn request_update(&self, ids: &[TargetId]) -> Option<DrainHandle> {
        self.coordinator.queue().enqueue(ids);
        self.start()
    }

    /// Refresh every registered target
    pub fn update_all(&self) -> StoreResult<Option<DrainHandle>> {
        let ids = self.store().target_ids()?;
        Ok(self.request_update(&ids))
    }

    /// Refresh targets that asked for automatic refreshes
    pub fn update_scheduled(&self) -> StoreResult<Option<DrainHandle>> {
        let mut ids = Vec::new();
        for id in self.store().target_ids()? {
            if let Some(target) = self.store().target(id)? {
                if target.configured && target.refresh_interval_hours > 0 {
                    ids.push(id);
                }
            }
        }
        Ok(self.request_update(&ids))
    }

    /// Spawn a drain unless one already holds the worker slot.
    pub fn start(&self) -> Option<DrainHandle> {
        if !self.coordinator.queue().try_claim_worker() {
            tracing::debug!("Update worker already running");
            return None;
        }

        let coordinator = self.coordinator.clone();
        Some(tokio::spawn(async move { coordinator.drain().await }))
    }

    /// Save a target's configuration and refresh it right away.
    ///
    /// Editing an existing target keeps its status and cached conditions;
    /// only a refresh cycle changes those.
    pub fn configure_target(&self, mut target: Target) -> StoreResult<Option<DrainHandle>> {
        if target.language.trim().is_empty() {
            target.language = self.default_language.clone();
        }
        if target.encoding.trim().is_empty() {
            target.encoding = self.default_encoding.clone();
        }
        target.configured = true;
        // Only applied when the row is created
        target.status = UpdateStatus::Unknown;
        target.last_updated = None;
        target.conditions = None;

        self.store().save_target(&target)?;
        tracing::info!("Configured target {} ({})", target.id, target.title);
        Ok(self.request_update(&[target.id]))
    }

    pub fn remove_target(&self, id: TargetId) -> StoreResult<()> {
        self.store().remove_target(id)?;
        tracing::info!("Removed target {}", id);
        Ok(())
    }

    /// Geocode for the configuration flow
    pub async fn lookup_location(&self, query: &GeocodeQuery) -> Result<GeocodeQuery, GeocodeError> {
        self.coordinator.resolver().resolve(query).await
    }

    pub fn target(&self, id: TargetId) -> StoreResult<Option<Target>> {
        self.store().target(id)
    }
}
