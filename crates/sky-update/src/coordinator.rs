//! The refresh cycle.
//!
//! A drain takes ids off the queue one by one until it reports empty. Each
//! configured target optionally gets its location refreshed, then its
//! forecast fetched, then its status committed and its widget rendered.
//! Once the queue is empty the shortest refresh interval seen picks the
//! next alarm.

use std::sync::Arc;

use chrono::{DateTime, Local, Timelike, Utc};
use sky_core::{AppError, DatabaseError, ForecastError, NetworkError};
use sky_weather::{
    is_daytime, Coordinates, FeedError, ForecastStore, GeocodeError, GeocodeQuery,
    GeocodeResolver, LocationError, LocationProvider, ParseError, StoreError, Target, TargetId,
    UpdateStatus, WeatherProvider,
};

use crate::queue::UpdateQueue;
use crate::render::{WidgetRenderer, WidgetSnapshot};
use crate::scheduler::{AlarmScheduler, SchedulePolicy};

/// Why a refresh step failed
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("Location refresh failed: {0}")]
    Location(#[from] LocationError),

    #[error("Location lookup failed: {0}")]
    Geocode(#[from] GeocodeError),

    #[error(transparent)]
    Forecast(#[from] ParseError),

    #[error("Storage failed: {0}")]
    Store(#[from] StoreError),
}

impl From<UpdateError> for AppError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::Location(e) => ForecastError::LocationUnknown(e.to_string()).into(),
            UpdateError::Geocode(GeocodeError::Network(net)) => net.into(),
            UpdateError::Geocode(e) => ForecastError::LocationUnknown(e.to_string()).into(),
            UpdateError::Forecast(ParseError::Network(FeedError::Timeout)) => NetworkError::Timeout.into(),
            UpdateError::Forecast(ParseError::Network(FeedError::Network(net))) => net.into(),
            UpdateError::Forecast(ParseError::InvalidLocation) => {
                ForecastError::LocationUnknown("target has no coordinates".to_string()).into()
            }
            UpdateError::Forecast(ParseError::Empty) => ForecastError::Empty.into(),
            UpdateError::Forecast(e) => ForecastError::Unreadable(e.to_string()).into(),
            UpdateError::Store(StoreError::Database(db)) => db.into(),
            UpdateError::Store(e) => DatabaseError::QueryFailed(e.to_string()).into(),
        }
    }
}

/// Why a queued id was not processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not configured yet
    Unconfigured,
    /// Removed after being queued
    Missing,
}

#[derive(Debug)]
pub enum TargetOutcome {
    Updated,
    Failed(Vec<UpdateError>),
    Skipped(SkipReason),
}

#[derive(Debug)]
pub struct TargetReport {
    pub id: TargetId,
    pub outcome: TargetOutcome,
}

/// Summary of one drain
#[derive(Debug)]
pub struct DrainReport {
    pub targets: Vec<TargetReport>,
    /// False when any processed target failed
    pub all_ok: bool,
    /// Alarm handed to the scheduler, if one was set
    pub next_wake: Option<DateTime<Utc>>,
}

impl Default for DrainReport {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            all_ok: true,
            next_wake: None,
        }
    }
}

impl DrainReport {
    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Updated))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Skipped(_)))
    }

    fn count(&self, pred: impl Fn(&TargetOutcome) -> bool) -> usize {
        self.targets.iter().filter(|t| pred(&t.outcome)).count()
    }
}

pub struct UpdateCoordinator {
    queue: Arc<UpdateQueue>,
    store: Arc<dyn ForecastStore>,
    provider: WeatherProvider,
    resolver: GeocodeResolver,
    location: Option<Arc<dyn LocationProvider>>,
    renderer: Arc<dyn WidgetRenderer>,
    alarm: Arc<dyn AlarmScheduler>,
    policy: SchedulePolicy,
}

impl UpdateCoordinator {
    pub fn new(
        queue: Arc<UpdateQueue>,
        store: Arc<dyn ForecastStore>,
        provider: WeatherProvider,
        resolver: GeocodeResolver,
        renderer: Arc<dyn WidgetRenderer>,
        alarm: Arc<dyn AlarmScheduler>,
        policy: SchedulePolicy,
    ) -> Self {
        Self {
            queue,
            store,
            provider,
            resolver,
            location: None,
            renderer,
            alarm,
            policy,
        }
    }

    /// Attach the device location capability
    pub fn with_location(mut self, location: Arc<dyn LocationProvider>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn queue(&self) -> &Arc<UpdateQueue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<dyn ForecastStore> {
        &self.store
    }

    pub fn resolver(&self) -> &GeocodeResolver {
        &self.resolver
    }

    /// Process queued targets until the queue is empty, then schedule the
    /// next refresh. The worker slot is released when this returns.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let mut shortest_interval: Option<u32> = None;

        while self.queue.has_next() {
            let Some(id) = self.queue.next() else {
                continue;
            };

            let (outcome, interval) = self.process(id).await;

            if let Some(hours) = interval.filter(|&h| h > 0) {
                shortest_interval = Some(shortest_interval.map_or(hours, |s| s.min(hours)));
            }

            match &outcome {
                TargetOutcome::Updated => tracing::info!("Target {} updated", id),
                TargetOutcome::Failed(errors) => {
                    report.all_ok = false;
                    for e in errors {
                        tracing::warn!("Target {} refresh failed: {}", id, e);
                    }
                }
                TargetOutcome::Skipped(reason) => {
                    tracing::debug!("Skipping target {}: {:?}", id, reason);
                }
            }

            report.targets.push(TargetReport { id, outcome });
        }

        match shortest_interval {
            Some(hours) => {
                let wake = self.policy.next_wake_time(Utc::now(), hours, report.all_ok);
                self.alarm.schedule(wake, true);
                report.next_wake = Some(wake);
            }
            None => tracing::debug!("No target wants automatic refreshes"),
        }

        tracing::info!(
            "Drain finished: {} updated, {} failed, {} skipped",
            report.updated(),
            report.failed(),
            report.skipped()
        );
        report
    }

    /// Run one target through the cycle. Also returns its refresh interval
    /// when it was configured.
    async fn process(&self, id: TargetId) -> (TargetOutcome, Option<u32>) {
        let mut target = match self.store.target(id) {
            Ok(Some(target)) => target,
            Ok(None) => return (TargetOutcome::Skipped(SkipReason::Missing), None),
            Err(e) => return (TargetOutcome::Failed(vec![e.into()]), None),
        };

        if !target.configured {
            return (TargetOutcome::Skipped(SkipReason::Unconfigured), None);
        }

        let interval = Some(target.refresh_interval_hours);
        let mut errors: Vec<UpdateError> = Vec::new();

        if target.location_mode.refreshes_each_cycle() {
            match self.refresh_location(&target).await {
                Ok((title, coordinates)) => {
                    match self.store.update_location(id, title.as_deref(), coordinates) {
                        Ok(()) => {
                            if let Some(title) = title {
                                target.title = title;
                            }
                            target.coordinates = Some(coordinates);
                        }
                        Err(e) => errors.push(e.into()),
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        let fetched = match self.provider.forecast(&target).await {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                errors.push(e.into());
                None
            }
        };

        if let Some(parsed) = &fetched {
            if let Err(e) = self
                .store
                .replace_forecasts(id, &parsed.conditions, &parsed.records)
            {
                errors.push(e.into());
            }
        }

        let status = if errors.is_empty() {
            UpdateStatus::Ok
        } else {
            UpdateStatus::Failure
        };
        if let Err(e) = self.store.record_status(id, status, Utc::now()) {
            errors.push(e.into());
        }

        self.render(id);

        let outcome = if errors.is_empty() {
            TargetOutcome::Updated
        } else {
            TargetOutcome::Failed(errors)
        };
        (outcome, interval)
    }

    /// Last known fix, reverse geocoded. The name is `None` when nothing
    /// was resolved for the point.
    async fn refresh_location(
        &self,
        target: &Target,
    ) -> Result<(Option<String>, Coordinates), UpdateError> {
        let provider = self
            .location
            .as_ref()
            .ok_or(LocationError::ServiceUnavailable)?;
        let fix = provider.last_known_fix().await?;

        let resolved = self
            .resolver
            .resolve(&GeocodeQuery::by_coordinates(fix.coordinates))
            .await?;

        tracing::debug!(
            "Target {} now at {:?} ({:?})",
            target.id,
            resolved.coordinates,
            resolved.name
        );
        Ok((
            resolved.name,
            resolved.coordinates.unwrap_or(fix.coordinates),
        ))
    }

    /// Draw from what was committed, not from what was fetched
    fn render(&self, id: TargetId) {
        let snapshot = self.store.target(id).and_then(|target| {
            let target = target.ok_or(StoreError::NotFound(id))?;
            let records = self.store.forecasts(id)?;
            let daytime = is_daytime(Local::now().hour());
            Ok(WidgetSnapshot::build(&target, &records, daytime))
        });

        match snapshot {
            Ok(snapshot) => self.renderer.render(&snapshot),
            Err(e) => tracing::warn!("Cannot render target {}: {}", id, e),
        }
    }
}
