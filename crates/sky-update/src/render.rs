//! What a widget gets to draw after a refresh.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sky_weather::{ConditionIcon, ForecastRecord, Target, TargetId, UpdateStatus};

/// One forecast row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayRow {
    /// Short weekday name, e.g. `Thu`
    pub weekday: String,
    pub icon: ConditionIcon,
    pub conditions: String,
    /// `high° / low°`, `?` for a missing value
    pub temperature: String,
    pub alert: bool,
    pub url: Option<String>,
}

/// Everything a renderer needs for one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetSnapshot {
    pub target_id: TargetId,
    pub title: String,
    pub status: UpdateStatus,
    pub last_updated: Option<DateTime<Utc>>,
    /// Current temperature with unit, e.g. `12°C`
    pub current_temperature: Option<String>,
    pub days: Vec<DayRow>,
}

impl WidgetSnapshot {
    pub fn build(target: &Target, records: &[ForecastRecord], daytime: bool) -> Self {
        let current_temperature = target.conditions.and_then(|c| {
            c.current_temperature
                .map(|t| format!("{}{}", t, c.unit.symbol()))
        });

        let days = records
            .iter()
            .map(|record| DayRow {
                weekday: record.valid_start.format("%a").to_string(),
                icon: icon_for(record, daytime),
                conditions: record.conditions.clone(),
                temperature: format!(
                    "{}° / {}°",
                    degrees(record.temp_high),
                    degrees(record.temp_low)
                ),
                alert: record.alert,
                url: record.url.clone(),
            })
            .collect();

        Self {
            target_id: target.id,
            title: target.title.clone(),
            status: target.status,
            last_updated: target.last_updated,
            current_temperature,
            days,
        }
    }
}

fn icon_for(record: &ForecastRecord, daytime: bool) -> ConditionIcon {
    if record.alert {
        return ConditionIcon::SevereAlert;
    }
    record
        .icon
        .as_deref()
        .map(|icon| ConditionIcon::classify(icon, daytime))
        .unwrap_or(ConditionIcon::Unknown)
}

fn degrees(value: Option<i32>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

/// Display surface that draws snapshots
pub trait WidgetRenderer: Send + Sync {
    fn render(&self, snapshot: &WidgetSnapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sky_weather::{MainConditions, TemperatureUnit};

    fn record(icon: Option<&str>, high: Option<i32>) -> ForecastRecord {
        ForecastRecord {
            // A Thursday
            valid_start: Utc.with_ymd_and_hms(2009, 4, 30, 12, 0, 0).unwrap(),
            temp_high: high,
            temp_low: Some(9),
            conditions: "Mostly Sunny".to_string(),
            icon: icon.map(str::to_string),
            url: None,
            alert: false,
        }
    }

    #[test]
    fn test_snapshot_rows() {
        let mut target = Target::new(3, "Mountain View");
        target.status = UpdateStatus::Ok;
        target.conditions = Some(MainConditions {
            unit: TemperatureUnit::Celsius,
            current_temperature: Some(12),
        });

        let snapshot = WidgetSnapshot::build(
            &target,
            &[record(Some("/ig/images/weather/mostly_sunny.gif"), Some(19))],
            true,
        );

        assert_eq!(snapshot.current_temperature.as_deref(), Some("12°C"));
        assert_eq!(snapshot.days.len(), 1);
        assert_eq!(snapshot.days[0].weekday, "Thu");
        assert_eq!(snapshot.days[0].icon, ConditionIcon::Clear);
        assert_eq!(snapshot.days[0].temperature, "19° / 9°");
    }

    #[test]
    fn test_missing_values() {
        let target = Target::new(1, "Nowhere");
        let snapshot = WidgetSnapshot::build(&target, &[record(None, None)], false);

        assert_eq!(snapshot.current_temperature, None);
        assert_eq!(snapshot.days[0].icon, ConditionIcon::Unknown);
        assert_eq!(snapshot.days[0].temperature, "?° / 9°");
        assert_eq!(snapshot.status, UpdateStatus::Unknown);
    }

    #[test]
    fn test_alert_rows_use_alert_icon() {
        let mut alert = record(Some("/ig/images/weather/sunny.gif"), None);
        alert.alert = true;
        let snapshot = WidgetSnapshot::build(&Target::new(1, "x"), &[alert], true);
        assert_eq!(snapshot.days[0].icon, ConditionIcon::SevereAlert);
    }
}
