use std::sync::Arc;

use anyhow::Result;
use sky_core::Config;
use sky_update::{UpdateService, WidgetRenderer, WidgetSnapshot};

/// Renderer for headless runs: every snapshot goes to the log as JSON.
struct LogRenderer;

impl WidgetRenderer for LogRenderer {
    fn render(&self, snapshot: &WidgetSnapshot) {
        match serde_json::to_string(snapshot) {
            Ok(json) => tracing::info!(target: "sky::widget", "{}", json),
            Err(e) => tracing::warn!("Cannot serialize snapshot for {}: {}", snapshot.target_id, e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    sky_core::init()?;

    let (config, _validation) = Config::load_validated()?;
    tracing::info!("Config directory: {}", config.config_dir.display());

    let (service, mut alarms) = UpdateService::open(&config, Arc::new(LogRenderer), None)
        .inspect_err(|e| tracing::error!("{}", e.user_message()))?;

    if let Some(drain) = service.update_all()? {
        let report = drain.await?;
        tracing::info!(
            "Startup refresh: {} updated, {} failed, {} skipped",
            report.updated(),
            report.failed(),
            report.skipped()
        );
    }

    loop {
        tokio::select! {
            fired = alarms.recv() => {
                let Some(fired) = fired else {
                    tracing::warn!("Alarm channel closed");
                    break;
                };
                tracing::info!("Scheduled refresh due at {}", fired.scheduled_for);
                if let Err(e) = service.update_scheduled() {
                    tracing::error!("Scheduled refresh failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
