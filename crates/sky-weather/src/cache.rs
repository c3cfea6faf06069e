//! SQLite-backed store for targets and their cached forecasts.
//!
//! A target's forecast set is only ever replaced whole, inside one
//! transaction, so readers never see a half-written refresh.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use sky_core::error::RusqliteErrorExt;

use crate::types::{
    Coordinates, ForecastRecord, LocationMode, MainConditions, StoreError, StoreResult, Target,
    TargetId, TemperatureUnit, UpdateStatus,
};

/// Persistence seam used by the update cycle
pub trait ForecastStore: Send + Sync {
    fn target(&self, id: TargetId) -> StoreResult<Option<Target>>;

    /// Ids of every registered target, ascending
    fn target_ids(&self) -> StoreResult<Vec<TargetId>>;

    /// Insert a target, or overwrite the configuration of an existing one.
    ///
    /// For an existing target the refresh results (status, last update and
    /// current conditions) are kept.
    fn save_target(&self, target: &Target) -> StoreResult<()>;

    /// Delete a target and its forecasts
    fn remove_target(&self, id: TargetId) -> StoreResult<()>;

    /// Store a refreshed location; `title` is left alone when `None`
    fn update_location(
        &self,
        id: TargetId,
        title: Option<&str>,
        coordinates: Coordinates,
    ) -> StoreResult<()>;

    /// Atomically swap the forecast set and current conditions
    fn replace_forecasts(
        &self,
        id: TargetId,
        conditions: &MainConditions,
        records: &[ForecastRecord],
    ) -> StoreResult<()>;

    fn record_status(
        &self,
        id: TargetId,
        status: UpdateStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Forecasts in the order they were stored
    fn forecasts(&self, id: TargetId) -> StoreResult<Vec<ForecastRecord>>;
}

fn db(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.into_database_error())
}

/// SQLite forecast store
pub struct SqliteForecastStore {
    conn: Mutex<Connection>,
}

impl SqliteForecastStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(db)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS targets (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    latitude REAL,
                    longitude REAL,
                    language TEXT NOT NULL,
                    encoding TEXT NOT NULL,
                    refresh_interval_hours INTEGER NOT NULL,
                    location_mode TEXT NOT NULL,
                    last_updated_ms INTEGER,
                    status TEXT NOT NULL,
                    configured INTEGER NOT NULL,
                    temp_unit TEXT,
                    current_temp INTEGER
                );

                CREATE TABLE IF NOT EXISTS forecasts (
                    target_id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    valid_start_ms INTEGER NOT NULL,
                    temp_high INTEGER,
                    temp_low INTEGER,
                    conditions TEXT NOT NULL,
                    icon TEXT,
                    url TEXT,
                    alert INTEGER NOT NULL,
                    PRIMARY KEY (target_id, position)
                );
                "#,
            )
            .map_err(db)
    }

    fn ensure_changed(changed: usize, id: TargetId) -> StoreResult<()> {
        if changed == 0 {
            Err(StoreError::NotFound(id))
        } else {
            Ok(())
        }
    }
}

/// Raw `targets` row before enum and timestamp decoding
struct TargetRow {
    id: TargetId,
    title: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    language: String,
    encoding: String,
    refresh_interval_hours: u32,
    location_mode: String,
    last_updated_ms: Option<i64>,
    status: String,
    configured: bool,
    temp_unit: Option<String>,
    current_temp: Option<i32>,
}

impl TargetRow {
    const COLUMNS: &'static str = "id, title, latitude, longitude, language, encoding, \
        refresh_interval_hours, location_mode, last_updated_ms, status, configured, \
        temp_unit, current_temp";

    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            language: row.get(4)?,
            encoding: row.get(5)?,
            refresh_interval_hours: row.get(6)?,
            location_mode: row.get(7)?,
            last_updated_ms: row.get(8)?,
            status: row.get(9)?,
            configured: row.get(10)?,
            temp_unit: row.get(11)?,
            current_temp: row.get(12)?,
        })
    }

    fn into_target(self) -> StoreResult<Target> {
        let location_mode =
            LocationMode::parse(&self.location_mode).ok_or_else(|| StoreError::InvalidValue {
                field: "location_mode",
                value: self.location_mode.clone(),
            })?;
        let status = UpdateStatus::parse(&self.status).ok_or_else(|| StoreError::InvalidValue {
            field: "status",
            value: self.status.clone(),
        })?;
        let last_updated = self.last_updated_ms.map(from_millis).transpose()?;
        let conditions = match self.temp_unit {
            Some(symbol) => {
                let unit = TemperatureUnit::parse_symbol(&symbol).ok_or(StoreError::InvalidValue {
                    field: "temp_unit",
                    value: symbol.clone(),
                })?;
                Some(MainConditions {
                    unit,
                    current_temperature: self.current_temp,
                })
            }
            None => None,
        };

        Ok(Target {
            id: self.id,
            title: self.title,
            coordinates: Coordinates::from_parts(self.latitude, self.longitude),
            language: self.language,
            encoding: self.encoding,
            refresh_interval_hours: self.refresh_interval_hours,
            location_mode,
            last_updated,
            status,
            configured: self.configured,
            conditions,
        })
    }
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(StoreError::InvalidValue {
        field: "timestamp",
        value: ms.to_string(),
    })
}

struct ForecastRow {
    valid_start_ms: i64,
    temp_high: Option<i32>,
    temp_low: Option<i32>,
    conditions: String,
    icon: Option<String>,
    url: Option<String>,
    alert: bool,
}

impl ForecastStore for SqliteForecastStore {
    fn target(&self, id: TargetId) -> StoreResult<Option<Target>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM targets WHERE id = ?1", TargetRow::COLUMNS);

        let row = conn
            .query_row(&sql, params![id], TargetRow::from_row)
            .optional()
            .map_err(db)?;

        row.map(TargetRow::into_target).transpose()
    }

    fn target_ids(&self) -> StoreResult<Vec<TargetId>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM targets ORDER BY id")
            .map_err(db)?;

        let rows = stmt
            .query_map([], |row| row.get::<_, TargetId>(0))
            .map_err(db)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db)
    }

    fn save_target(&self, target: &Target) -> StoreResult<()> {
        let (unit, current) = match &target.conditions {
            Some(c) => (Some(c.unit.symbol()), c.current_temperature),
            None => (None, None),
        };

        self.conn
            .lock()
            .execute(
                r#"
                INSERT INTO targets
                (id, title, latitude, longitude, language, encoding, refresh_interval_hours,
                 location_mode, last_updated_ms, status, configured, temp_unit, current_temp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    language = excluded.language,
                    encoding = excluded.encoding,
                    refresh_interval_hours = excluded.refresh_interval_hours,
                    location_mode = excluded.location_mode,
                    configured = excluded.configured
                "#,
                params![
                    target.id,
                    target.title,
                    target.coordinates.map(|c| c.latitude),
                    target.coordinates.map(|c| c.longitude),
                    target.language,
                    target.encoding,
                    target.refresh_interval_hours,
                    target.location_mode.as_str(),
                    target.last_updated.map(|t| t.timestamp_millis()),
                    target.status.as_str(),
                    target.configured,
                    unit,
                    current,
                ],
            )
            .map_err(db)?;

        tracing::debug!("Saved target {}", target.id);
        Ok(())
    }

    fn remove_target(&self, id: TargetId) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;

        tx.execute("DELETE FROM forecasts WHERE target_id = ?1", params![id])
            .map_err(db)?;
        let removed = tx
            .execute("DELETE FROM targets WHERE id = ?1", params![id])
            .map_err(db)?;
        tx.commit().map_err(db)?;

        Self::ensure_changed(removed, id)
    }

    fn update_location(
        &self,
        id: TargetId,
        title: Option<&str>,
        coordinates: Coordinates,
    ) -> StoreResult<()> {
        let changed = self
            .conn
            .lock()
            .execute(
                "UPDATE targets SET title = COALESCE(?2, title), latitude = ?3, longitude = ?4 WHERE id = ?1",
                params![id, title, coordinates.latitude, coordinates.longitude],
            )
            .map_err(db)?;

        Self::ensure_changed(changed, id)
    }

    fn replace_forecasts(
        &self,
        id: TargetId,
        conditions: &MainConditions,
        records: &[ForecastRecord],
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;

        let changed = tx
            .execute(
                "UPDATE targets SET temp_unit = ?2, current_temp = ?3 WHERE id = ?1",
                params![id, conditions.unit.symbol(), conditions.current_temperature],
            )
            .map_err(db)?;
        Self::ensure_changed(changed, id)?;

        tx.execute("DELETE FROM forecasts WHERE target_id = ?1", params![id])
            .map_err(db)?;

        {
            let mut insert = tx
                .prepare(
                    r#"
                    INSERT INTO forecasts
                    (target_id, position, valid_start_ms, temp_high, temp_low, conditions, icon, url, alert)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                )
                .map_err(db)?;

            for (position, record) in records.iter().enumerate() {
                insert
                    .execute(params![
                        id,
                        position as i64,
                        record.valid_start.timestamp_millis(),
                        record.temp_high,
                        record.temp_low,
                        record.conditions,
                        record.icon,
                        record.url,
                        record.alert,
                    ])
                    .map_err(db)?;
            }
        }

        tx.commit().map_err(db)?;
        tracing::debug!("Stored {} forecasts for target {}", records.len(), id);
        Ok(())
    }

    fn record_status(
        &self,
        id: TargetId,
        status: UpdateStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let changed = self
            .conn
            .lock()
            .execute(
                "UPDATE targets SET status = ?2, last_updated_ms = ?3 WHERE id = ?1",
                params![id, status.as_str(), updated_at.timestamp_millis()],
            )
            .map_err(db)?;

        Self::ensure_changed(changed, id)
    }

    fn forecasts(&self, id: TargetId) -> StoreResult<Vec<ForecastRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT valid_start_ms, temp_high, temp_low, conditions, icon, url, alert
                 FROM forecasts WHERE target_id = ?1 ORDER BY position",
            )
            .map_err(db)?;

        let rows = stmt
            .query_map(params![id], |row| {
                Ok(ForecastRow {
                    valid_start_ms: row.get(0)?,
                    temp_high: row.get(1)?,
                    temp_low: row.get(2)?,
                    conditions: row.get(3)?,
                    icon: row.get(4)?,
                    url: row.get(5)?,
                    alert: row.get(6)?,
                })
            })
            .map_err(db)?;

        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(db)?;
            records.push(ForecastRecord {
                valid_start: from_millis(row.valid_start_ms)?,
                temp_high: row.temp_high,
                temp_low: row.temp_low,
                conditions: row.conditions,
                icon: row.icon,
                url: row.url,
                alert: row.alert,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn create_test_store() -> SqliteForecastStore {
        SqliteForecastStore::in_memory().unwrap()
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 1, 6, 0, 0).unwrap()
    }

    fn record(day: i64, conditions: &str) -> ForecastRecord {
        ForecastRecord {
            valid_start: base() + Duration::days(day),
            temp_high: Some(20 + day as i32),
            temp_low: Some(10),
            conditions: conditions.to_string(),
            icon: Some("/ig/images/weather/sunny.gif".to_string()),
            url: None,
            alert: false,
        }
    }

    fn saved_target(store: &SqliteForecastStore, id: TargetId) -> Target {
        let target = Target::new(id, "Lisbon")
            .with_coordinates(Coordinates::new(38.72, -9.14).unwrap())
            .with_interval(3);
        store.save_target(&target).unwrap();
        target
    }

    #[test]
    fn test_save_and_get_target() {
        let store = create_test_store();
        let mut target = saved_target(&store, 4);
        target.location_mode = LocationMode::TrackCurrentAndRefresh;
        target.configured = true;
        store.save_target(&target).unwrap();

        let loaded = store.target(4).unwrap().unwrap();
        assert_eq!(loaded, target);
        assert_eq!(store.target_ids().unwrap(), vec![4]);
    }

    #[test]
    fn test_resave_keeps_refresh_results() {
        let store = create_test_store();
        let target = saved_target(&store, 6);
        let conditions = MainConditions {
            unit: TemperatureUnit::Celsius,
            current_temperature: Some(18),
        };
        store.replace_forecasts(6, &conditions, &[record(0, "a")]).unwrap();
        store.record_status(6, UpdateStatus::Ok, base()).unwrap();

        store
            .save_target(&target.with_interval(12).with_feed_locale("pt", "ISO-8859-1"))
            .unwrap();

        let loaded = store.target(6).unwrap().unwrap();
        assert_eq!(loaded.refresh_interval_hours, 12);
        assert_eq!(loaded.language, "pt");
        assert_eq!(loaded.status, UpdateStatus::Ok);
        assert_eq!(loaded.last_updated, Some(base()));
        assert_eq!(loaded.conditions, Some(conditions));
        assert_eq!(store.forecasts(6).unwrap().len(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();
        assert!(store.target(99).unwrap().is_none());
    }

    #[test]
    fn test_replace_leaves_no_leftovers() {
        let store = create_test_store();
        saved_target(&store, 1);
        let conditions = MainConditions {
            unit: TemperatureUnit::Fahrenheit,
            current_temperature: Some(71),
        };

        store
            .replace_forecasts(1, &conditions, &[record(0, "a"), record(1, "b"), record(2, "c")])
            .unwrap();
        let second = vec![record(0, "x"), record(1, "y")];
        store.replace_forecasts(1, &conditions, &second).unwrap();

        assert_eq!(store.forecasts(1).unwrap(), second);
        assert_eq!(store.target(1).unwrap().unwrap().conditions, Some(conditions));
    }

    #[test]
    fn test_replace_for_missing_target_writes_nothing() {
        let store = create_test_store();
        let err = store
            .replace_forecasts(5, &MainConditions::default(), &[record(0, "a")])
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound(5)));
        assert!(store.forecasts(5).unwrap().is_empty());
    }

    #[test]
    fn test_forecasts_keep_stored_order() {
        let store = create_test_store();
        saved_target(&store, 1);
        let mut alert = record(3, "Heat advisory");
        alert.alert = true;
        let records = vec![alert, record(0, "a"), record(1, "b")];

        store
            .replace_forecasts(1, &MainConditions::default(), &records)
            .unwrap();
        assert_eq!(store.forecasts(1).unwrap(), records);
    }

    #[test]
    fn test_update_location_keeps_title_when_unresolved() {
        let store = create_test_store();
        saved_target(&store, 2);
        let moved = Coordinates::new(41.15, -8.61).unwrap();

        store.update_location(2, None, moved).unwrap();
        let target = store.target(2).unwrap().unwrap();
        assert_eq!(target.title, "Lisbon");
        assert_eq!(target.coordinates, Some(moved));

        store.update_location(2, Some("Porto"), moved).unwrap();
        assert_eq!(store.target(2).unwrap().unwrap().title, "Porto");
    }

    #[test]
    fn test_record_status() {
        let store = create_test_store();
        saved_target(&store, 3);

        store.record_status(3, UpdateStatus::Failure, base()).unwrap();
        let target = store.target(3).unwrap().unwrap();
        assert_eq!(target.status, UpdateStatus::Failure);
        assert_eq!(target.last_updated, Some(base()));

        assert!(matches!(
            store.record_status(42, UpdateStatus::Ok, base()),
            Err(StoreError::NotFound(42))
        ));
    }

    #[test]
    fn test_remove_target_drops_forecasts() {
        let store = create_test_store();
        saved_target(&store, 1);
        store
            .replace_forecasts(1, &MainConditions::default(), &[record(0, "a")])
            .unwrap();

        store.remove_target(1).unwrap();
        assert!(store.target(1).unwrap().is_none());
        assert!(store.forecasts(1).unwrap().is_empty());
        assert!(matches!(store.remove_target(1), Err(StoreError::NotFound(1))));
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecasts.db");

        {
            let store = SqliteForecastStore::new(&path).unwrap();
            saved_target(&store, 8);
        }

        let reopened = SqliteForecastStore::new(&path).unwrap();
        assert_eq!(reopened.target_ids().unwrap(), vec![8]);
    }
}
