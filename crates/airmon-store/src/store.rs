//! Main store implementation.

use std::path::Path;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, info};

use airmon_types::{
    AlertLevel, CalibrationRecord, DeviceConfiguration, GasLevels, GasThresholdSet, GasType,
    ParseError, SensorReading, from_unix_millis, to_unix_millis,
};

use crate::error::{Error, Result};
use crate::models::{StoredReading, SyncCounts, SyncStatus};
use crate::queries::{READING_COLUMNS, ReadingQuery};
use crate::schema;

/// SQLite-based cache for AirMonitor data.
///
/// The store does no locking of its own. Share it between tasks behind a
/// single mutex.
pub struct Store {
    conn: Connection,
}

/// Mean values over a time window. `None` when no row carries the value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadingAverages {
    /// Number of readings in the window.
    pub count: u64,
    /// CO2 in percent.
    pub co2: Option<f64>,
    /// CO in percent.
    pub co: Option<f64>,
    /// O2 in percent.
    pub oxygen: Option<f64>,
    /// Temperature in Celsius.
    pub temperature: Option<f64>,
}

/// Worst values over a time window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadingExtremes {
    /// Highest raw PPM.
    pub max_ppm: Option<u32>,
    /// Highest CO2 in percent.
    pub max_co2: Option<f64>,
    /// Highest CO in percent.
    pub max_co: Option<f64>,
    /// Lowest O2 in percent.
    pub min_oxygen: Option<f64>,
}

/// Summary statistics for a single gas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasStatistics {
    pub gas: GasType,
    /// Readings in the window that carry this gas.
    pub count: u64,
    pub average: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

const CONFIG_COLUMNS: &str = "id, device_id, device_name, device_type, calibration_date, \
     calibration_version, calibration_status, oxygen_thresholds, co2_thresholds, \
     co_thresholds, ammonia_thresholds, nox_thresholds, vapor_thresholds, smoke_thresholds, \
     toluene_thresholds, location, room_type, is_indoor, alerts_enabled, \
     critical_alerts_enabled, alert_cooldown_minutes, email_notifications, push_notifications, \
     auto_sync, sync_interval_minutes, only_wifi, created_at, updated_at, is_active, user_id";

const CALIBRATION_COLUMNS: &str = "id, device_id, calibration_type, calibration_date, \
     reference_values, measured_values, adjustment_factors, temperature, humidity, pressure, \
     calibration_success, accuracy_improvement, notes, performed_by, version, is_active";

fn now_millis() -> i64 {
    to_unix_millis(OffsetDateTime::now_utc())
}

fn millis_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let millis: i64 = row.get(idx)?;
    from_unix_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn opt_millis_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(millis) => from_unix_millis(millis)
            .map(Some)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis)),
        None => Ok(None),
    }
}

fn parse_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseError>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_at<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn int_at<T: TryFrom<i64>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let value: i64 = row.get(idx)?;
    T::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

/// Gas columns start right after `ppm` in [`READING_COLUMNS`].
const FIRST_GAS_COLUMN: usize = 5;

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<StoredReading> {
    let mut values = [0.0_f64; 10];
    let mut complete = true;
    for (i, slot) in values.iter_mut().enumerate() {
        match row.get::<_, Option<f64>>(FIRST_GAS_COLUMN + i)? {
            Some(v) => *slot = v,
            None => complete = false,
        }
    }
    let gases = complete.then(|| GasLevels {
        oxygen: values[0],
        carbon_dioxide: values[1],
        carbon_monoxide: values[2],
        ammonia: values[3],
        nitrogen_oxides: values[4],
        water_vapor: values[5],
        alcohol: values[6],
        toluene: values[7],
        benzene: values[8],
        acetone: values[9],
    });

    let reading = SensorReading {
        id: row.get(0)?,
        timestamp: millis_at(row, 1)?,
        device_id: row.get(2)?,
        location: row.get(3)?,
        ppm: int_at(row, 4)?,
        gases,
        temperature: row.get(15)?,
        humidity: row.get(16)?,
        pressure: row.get(17)?,
        air_quality_level: parse_at(row, 18)?,
        quality_index: int_at(row, 19)?,
        alert_level: parse_at(row, 20)?,
        is_simulated: row.get(21)?,
        calibration_version: row.get(22)?,
        data_source: parse_at(row, 23)?,
    };

    Ok(StoredReading {
        reading,
        sync: SyncStatus {
            is_uploaded: row.get(24)?,
            last_sync_attempt: opt_millis_at(row, 25)?,
            sync_error: row.get(26)?,
        },
    })
}

fn configuration_from_row(row: &Row<'_>) -> rusqlite::Result<DeviceConfiguration> {
    Ok(DeviceConfiguration {
        id: row.get(0)?,
        device_id: row.get(1)?,
        device_name: row.get(2)?,
        device_type: row.get(3)?,
        calibration_date: millis_at(row, 4)?,
        calibration_version: row.get(5)?,
        calibration_status: parse_at(row, 6)?,
        thresholds: GasThresholdSet {
            oxygen: json_at(row, 7)?,
            co2: json_at(row, 8)?,
            co: json_at(row, 9)?,
            ammonia: json_at(row, 10)?,
            nox: json_at(row, 11)?,
            vapor: json_at(row, 12)?,
            smoke: json_at(row, 13)?,
            toluene: json_at(row, 14)?,
        },
        location: row.get(15)?,
        room_type: row.get(16)?,
        is_indoor: row.get(17)?,
        alerts_enabled: row.get(18)?,
        critical_alerts_enabled: row.get(19)?,
        alert_cooldown_minutes: int_at(row, 20)?,
        email_notifications: row.get(21)?,
        push_notifications: row.get(22)?,
        auto_sync: row.get(23)?,
        sync_interval_minutes: int_at(row, 24)?,
        only_wifi: row.get(25)?,
        created_at: millis_at(row, 26)?,
        updated_at: millis_at(row, 27)?,
        is_active: row.get(28)?,
        user_id: row.get(29)?,
    })
}

fn calibration_from_row(row: &Row<'_>) -> rusqlite::Result<CalibrationRecord> {
    Ok(CalibrationRecord {
        id: row.get(0)?,
        device_id: row.get(1)?,
        calibration_type: parse_at(row, 2)?,
        calibration_date: millis_at(row, 3)?,
        reference_values: json_at(row, 4)?,
        measured_values: json_at(row, 5)?,
        adjustment_factors: json_at(row, 6)?,
        temperature: row.get(7)?,
        humidity: row.get(8)?,
        pressure: row.get(9)?,
        calibration_success: row.get(10)?,
        accuracy_improvement: row.get(11)?,
        notes: row.get(12)?,
        performed_by: row.get(13)?,
        version: row.get(14)?,
        is_active: row.get(15)?,
    })
}

/// Write a reading row. An existing row with the same id is left untouched:
/// readings never change once stored.
fn write_reading(conn: &Connection, reading: &SensorReading, sync: &SyncStatus) -> Result<usize> {
    let gas = |g: GasType| reading.gases.as_ref().map(|levels| levels.get(g));

    let changed = conn.execute(
        &format!(
            "INSERT INTO sensor_readings ({READING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)
             ON CONFLICT(id) DO NOTHING"
        ),
        rusqlite::params![
            reading.id,
            to_unix_millis(reading.timestamp),
            reading.device_id,
            reading.location,
            reading.ppm,
            gas(GasType::Oxygen),
            gas(GasType::CarbonDioxide),
            gas(GasType::CarbonMonoxide),
            gas(GasType::Ammonia),
            gas(GasType::NitrogenOxides),
            gas(GasType::WaterVapor),
            gas(GasType::Alcohol),
            gas(GasType::Toluene),
            gas(GasType::Benzene),
            gas(GasType::Acetone),
            reading.temperature,
            reading.humidity,
            reading.pressure,
            reading.air_quality_level.as_str(),
            reading.quality_index,
            reading.alert_level.as_str(),
            reading.is_simulated,
            reading.calibration_version,
            reading.data_source.as_str(),
            sync.is_uploaded,
            sync.last_sync_attempt.map(to_unix_millis),
            sync.sync_error,
        ],
    )?;
    Ok(changed)
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Reading operations
impl Store {
    /// Insert a reading as pending upload.
    ///
    /// A reading whose id is already stored is ignored, whatever its upload
    /// state. Returns whether a row was added.
    pub fn insert_reading(&self, reading: &SensorReading) -> Result<bool> {
        let inserted = write_reading(&self.conn, reading, &SyncStatus::default())? > 0;
        if inserted {
            debug!(
                "Stored reading {} ({} ppm, {})",
                reading.id, reading.ppm, reading.alert_level
            );
        } else {
            debug!("Reading {} already stored, ignoring", reading.id);
        }
        Ok(inserted)
    }

    /// Insert several readings in one transaction.
    pub fn insert_readings(&self, readings: &[SensorReading]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let pending = SyncStatus::default();
        let mut inserted = 0;
        for reading in readings {
            inserted += write_reading(&tx, reading, &pending)?;
        }
        tx.commit()?;

        info!("Inserted {} readings", inserted);
        Ok(inserted)
    }

    /// Insert a reading pulled from the remote store, already marked uploaded.
    ///
    /// An existing local row with the same id is left untouched. Returns
    /// whether a row was added.
    pub fn insert_remote_reading(&self, reading: &SensorReading) -> Result<bool> {
        let changed = write_reading(&self.conn, reading, &SyncStatus::uploaded())?;
        Ok(changed > 0)
    }

    /// Get a reading by id.
    pub fn get_reading(&self, id: &str) -> Result<Option<StoredReading>> {
        let sql = format!("SELECT {READING_COLUMNS} FROM sensor_readings WHERE id = ?");
        let reading = self
            .conn
            .query_row(&sql, [id], reading_from_row)
            .optional()?;
        Ok(reading)
    }

    /// Get the newest reading, optionally for one device.
    pub fn latest_reading(&self, device_id: Option<&str>) -> Result<Option<StoredReading>> {
        let mut query = ReadingQuery::new().limit(1);
        if let Some(id) = device_id {
            query = query.device(id);
        }
        let mut readings = self.query_readings(&query)?;
        Ok(readings.pop())
    }

    /// Query readings with filters.
    pub fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<StoredReading>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let readings = stmt
            .query_map(params_ref.as_slice(), reading_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(readings)
    }

    /// Count readings, optionally for one device.
    pub fn count_readings(&self, device_id: Option<&str>) -> Result<u64> {
        let count: i64 = match device_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM sensor_readings WHERE device_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM sensor_readings", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Count critical readings taken at or after `since`.
    pub fn count_critical_since(&self, since: OffsetDateTime) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sensor_readings WHERE alert_level = ?1 AND timestamp >= ?2",
            rusqlite::params![AlertLevel::Critical.as_str(), to_unix_millis(since)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Delete readings taken strictly before `cutoff`.
    pub fn delete_readings_before(&self, cutoff: OffsetDateTime) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM sensor_readings WHERE timestamp < ?",
            [to_unix_millis(cutoff)],
        )?;
        info!("Deleted {} readings older than {}", deleted, cutoff);
        Ok(deleted)
    }

    /// Delete simulated readings taken strictly before `cutoff`.
    pub fn delete_simulated_before(&self, cutoff: OffsetDateTime) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM sensor_readings WHERE is_simulated = 1 AND timestamp < ?",
            [to_unix_millis(cutoff)],
        )?;
        info!("Deleted {} simulated readings older than {}", deleted, cutoff);
        Ok(deleted)
    }
}

// Aggregate queries
impl Store {
    /// Averages of CO2, CO, O2 and temperature since `since`.
    pub fn averages_since(&self, since: OffsetDateTime) -> Result<ReadingAverages> {
        let averages = self.conn.query_row(
            "SELECT COUNT(*), AVG(co2), AVG(co), AVG(oxygen), AVG(temperature)
             FROM sensor_readings WHERE timestamp >= ?",
            [to_unix_millis(since)],
            |row| {
                Ok(ReadingAverages {
                    count: row.get::<_, i64>(0)? as u64,
                    co2: row.get(1)?,
                    co: row.get(2)?,
                    oxygen: row.get(3)?,
                    temperature: row.get(4)?,
                })
            },
        )?;
        Ok(averages)
    }

    /// Peak PPM, CO2 and CO, and lowest O2 since `since`.
    pub fn extremes_since(&self, since: OffsetDateTime) -> Result<ReadingExtremes> {
        let extremes = self.conn.query_row(
            "SELECT MAX(ppm), MAX(co2), MAX(co), MIN(oxygen)
             FROM sensor_readings WHERE timestamp >= ?",
            [to_unix_millis(since)],
            |row| {
                Ok(ReadingExtremes {
                    max_ppm: row.get::<_, Option<i64>>(0)?.map(|v| v as u32),
                    max_co2: row.get(1)?,
                    max_co: row.get(2)?,
                    min_oxygen: row.get(3)?,
                })
            },
        )?;
        Ok(extremes)
    }

    /// Average, minimum and maximum of one gas between `start` and `end` inclusive.
    pub fn gas_statistics(
        &self,
        gas: GasType,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<GasStatistics> {
        let column = gas.column();
        let sql = format!(
            "SELECT COUNT({column}), AVG({column}), MIN({column}), MAX({column})
             FROM sensor_readings WHERE timestamp >= ?1 AND timestamp <= ?2"
        );
        let stats = self.conn.query_row(
            &sql,
            rusqlite::params![to_unix_millis(start), to_unix_millis(end)],
            |row| {
                Ok(GasStatistics {
                    gas,
                    count: row.get::<_, i64>(0)? as u64,
                    average: row.get(1)?,
                    minimum: row.get(2)?,
                    maximum: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }
}

// Sync bookkeeping
impl Store {
    /// Readings not yet accepted by the remote store, oldest first.
    pub fn unsynced_readings(&self, limit: Option<u32>) -> Result<Vec<StoredReading>> {
        let mut query = ReadingQuery::new().uploaded(false).oldest_first();
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        self.query_readings(&query)
    }

    /// Mark a reading uploaded and clear any earlier sync error.
    ///
    /// Returns `false` if no such reading exists.
    pub fn mark_uploaded(&self, id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE sensor_readings
             SET is_uploaded = 1, last_sync_attempt = ?2, sync_error = NULL
             WHERE id = ?1",
            rusqlite::params![id, now_millis()],
        )?;
        Ok(changed > 0)
    }

    /// Mark several readings uploaded in one transaction.
    pub fn mark_many_uploaded<S: AsRef<str>>(&self, ids: &[S]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let now = now_millis();
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE sensor_readings
                 SET is_uploaded = 1, last_sync_attempt = ?2, sync_error = NULL
                 WHERE id = ?1",
            )?;
            for id in ids {
                updated += stmt.execute(rusqlite::params![id.as_ref(), now])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    /// Record a failed upload attempt. The reading stays pending.
    ///
    /// Returns `false` if the reading does not exist or is already uploaded.
    pub fn mark_sync_error(&self, id: &str, error: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE sensor_readings
             SET last_sync_attempt = ?2, sync_error = ?3
             WHERE id = ?1 AND is_uploaded = 0",
            rusqlite::params![id, now_millis(), error],
        )?;
        Ok(changed > 0)
    }

    /// Upload progress over all readings.
    pub fn sync_counts(&self) -> Result<SyncCounts> {
        let counts = self.conn.query_row(
            "SELECT
                COALESCE(SUM(is_uploaded = 1), 0),
                COALESCE(SUM(is_uploaded = 0 AND sync_error IS NULL), 0),
                COALESCE(SUM(is_uploaded = 0 AND sync_error IS NOT NULL), 0)
             FROM sensor_readings",
            [],
            |row| {
                Ok(SyncCounts {
                    uploaded: row.get::<_, i64>(0)? as u64,
                    pending: row.get::<_, i64>(1)? as u64,
                    failed: row.get::<_, i64>(2)? as u64,
                })
            },
        )?;
        Ok(counts)
    }
}

// Device configuration operations
impl Store {
    /// Insert or replace a configuration.
    ///
    /// Saving an active configuration deactivates every other active row for
    /// the same device.
    pub fn upsert_configuration(&self, config: &DeviceConfiguration) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let t = &config.thresholds;

        if config.is_active {
            let superseded = tx.execute(
                "UPDATE device_configurations SET is_active = 0, updated_at = ?3
                 WHERE device_id = ?1 AND id != ?2 AND is_active = 1",
                rusqlite::params![config.device_id, config.id, now_millis()],
            )?;
            if superseded > 0 {
                debug!(
                    "Deactivated {} earlier configuration(s) for {}",
                    superseded, config.device_id
                );
            }
        }

        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO device_configurations ({CONFIG_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28,
                         ?29, ?30)"
            ),
            rusqlite::params![
                config.id,
                config.device_id,
                config.device_name,
                config.device_type,
                to_unix_millis(config.calibration_date),
                config.calibration_version,
                config.calibration_status.as_str(),
                serde_json::to_string(&t.oxygen)?,
                serde_json::to_string(&t.co2)?,
                serde_json::to_string(&t.co)?,
                serde_json::to_string(&t.ammonia)?,
                serde_json::to_string(&t.nox)?,
                serde_json::to_string(&t.vapor)?,
                serde_json::to_string(&t.smoke)?,
                serde_json::to_string(&t.toluene)?,
                config.location,
                config.room_type,
                config.is_indoor,
                config.alerts_enabled,
                config.critical_alerts_enabled,
                config.alert_cooldown_minutes,
                config.email_notifications,
                config.push_notifications,
                config.auto_sync,
                config.sync_interval_minutes,
                config.only_wifi,
                to_unix_millis(config.created_at),
                to_unix_millis(config.updated_at),
                config.is_active,
                config.user_id,
            ],
        )?;
        tx.commit()?;

        info!(
            "Saved configuration {} for {}",
            config.id, config.device_id
        );
        Ok(())
    }

    /// All active configurations, most recently updated first.
    pub fn active_configurations(&self) -> Result<Vec<DeviceConfiguration>> {
        let sql = format!(
            "SELECT {CONFIG_COLUMNS} FROM device_configurations
             WHERE is_active = 1 ORDER BY updated_at DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let configs = stmt
            .query_map([], configuration_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(configs)
    }

    /// The active configuration for a device.
    pub fn configuration_for_device(&self, device_id: &str) -> Result<Option<DeviceConfiguration>> {
        let sql = format!(
            "SELECT {CONFIG_COLUMNS} FROM device_configurations
             WHERE device_id = ? AND is_active = 1 ORDER BY updated_at DESC LIMIT 1"
        );
        let config = self
            .conn
            .query_row(&sql, [device_id], configuration_from_row)
            .optional()?;
        Ok(config)
    }

    /// Soft-delete: deactivate every configuration of a device.
    pub fn deactivate_device(&self, device_id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE device_configurations SET is_active = 0, updated_at = ?2
             WHERE device_id = ?1 AND is_active = 1",
            rusqlite::params![device_id, now_millis()],
        )?;
        Ok(changed)
    }

    /// Hard-delete every configuration of a device.
    pub fn delete_device(&self, device_id: &str) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM device_configurations WHERE device_id = ?",
            [device_id],
        )?;
        Ok(deleted)
    }
}

// Calibration operations
impl Store {
    /// Record a calibration event.
    ///
    /// Records are never rewritten: a second insert with a known id is
    /// ignored. Returns whether a row was added.
    pub fn insert_calibration(&self, record: &CalibrationRecord) -> Result<bool> {
        let changed = self.conn.execute(
            &format!(
                "INSERT INTO calibration_records ({CALIBRATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(id) DO NOTHING"
            ),
            rusqlite::params![
                record.id,
                record.device_id,
                record.calibration_type.as_str(),
                to_unix_millis(record.calibration_date),
                serde_json::to_string(&record.reference_values)?,
                serde_json::to_string(&record.measured_values)?,
                serde_json::to_string(&record.adjustment_factors)?,
                record.temperature,
                record.humidity,
                record.pressure,
                record.calibration_success,
                record.accuracy_improvement,
                record.notes,
                record.performed_by,
                record.version,
                record.is_active,
            ],
        )?;
        if changed > 0 {
            debug!(
                "Recorded {} calibration for {}",
                record.calibration_type, record.device_id
            );
        } else {
            debug!("Calibration {} already recorded, ignoring", record.id);
        }
        Ok(changed > 0)
    }

    /// Every calibration of a device, newest first.
    pub fn calibration_history(&self, device_id: &str) -> Result<Vec<CalibrationRecord>> {
        let sql = format!(
            "SELECT {CALIBRATION_COLUMNS} FROM calibration_records
             WHERE device_id = ? ORDER BY calibration_date DESC, rowid DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([device_id], calibration_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// The newest active calibration of a device.
    pub fn latest_calibration(&self, device_id: &str) -> Result<Option<CalibrationRecord>> {
        let sql = format!(
            "SELECT {CALIBRATION_COLUMNS} FROM calibration_records
             WHERE device_id = ? AND is_active = 1
             ORDER BY calibration_date DESC, rowid DESC LIMIT 1"
        );
        let record = self
            .conn
            .query_row(&sql, [device_id], calibration_from_row)
            .optional()?;
        Ok(record)
    }

    /// Number of successful calibrations of a device.
    pub fn successful_calibration_count(&self, device_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM calibration_records
             WHERE device_id = ? AND calibration_success = 1",
            [device_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Delete calibrations dated strictly before `cutoff`.
    pub fn delete_calibrations_before(&self, cutoff: OffsetDateTime) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM calibration_records WHERE calibration_date < ?",
            [to_unix_millis(cutoff)],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airmon_types::{AirQualityLevel, CalibrationType, DataOrigin, ThresholdRange};
    use time::Duration;

    fn reading_at(ppm: u32, timestamp: OffsetDateTime) -> SensorReading {
        SensorReading {
            id: SensorReading::new_id(),
            timestamp,
            device_id: "test-device".to_string(),
            location: Some("lab".to_string()),
            ppm,
            gases: None,
            temperature: 22.5,
            humidity: 45.0,
            pressure: None,
            air_quality_level: AirQualityLevel::from_ppm(ppm),
            quality_index: (ppm / 20) as u16,
            alert_level: if ppm > 400 {
                AlertLevel::Critical
            } else if ppm > 200 {
                AlertLevel::Warning
            } else {
                AlertLevel::Normal
            },
            is_simulated: false,
            calibration_version: "1.0".to_string(),
            data_source: DataOrigin::Mq135,
        }
    }

    fn with_gases(mut reading: SensorReading, co2: f64, co: f64, oxygen: f64) -> SensorReading {
        reading.gases = Some(GasLevels {
            oxygen,
            carbon_dioxide: co2,
            carbon_monoxide: co,
            ammonia: 0.001,
            nitrogen_oxides: 0.0005,
            water_vapor: 1.5,
            alcohol: 0.0,
            toluene: 0.0,
            benzene: 0.0,
            acetone: 0.0,
        });
        reading.is_simulated = true;
        reading.data_source = DataOrigin::Simulation;
        reading
    }

    fn now() -> OffsetDateTime {
        // Millisecond precision matches what the store keeps.
        from_unix_millis(now_millis()).unwrap()
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_readings(None).unwrap(), 0);
        assert!(store.latest_reading(None).unwrap().is_none());
    }

    #[test]
    fn test_insert_and_get_reading() {
        let store = Store::open_in_memory().unwrap();
        let reading = with_gases(reading_at(234, now()), 0.06, 0.002, 20.9);
        store.insert_reading(&reading).unwrap();

        let stored = store.get_reading(&reading.id).unwrap().unwrap();
        assert_eq!(stored.reading, reading);
        assert!(!stored.sync.is_uploaded);
        assert!(stored.sync.sync_error.is_none());
        assert!(store.get_reading("missing").unwrap().is_none());
    }

    #[test]
    fn test_reading_without_gases_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let reading = reading_at(145, now());
        store.insert_reading(&reading).unwrap();

        let stored = store.get_reading(&reading.id).unwrap().unwrap();
        assert!(stored.reading.gases.is_none());
        assert_eq!(stored.reading, reading);
    }

    #[test]
    fn test_reinsert_keeps_stored_reading() {
        let store = Store::open_in_memory().unwrap();
        let mut reading = reading_at(145, now());
        assert!(store.insert_reading(&reading).unwrap());
        store.mark_uploaded(&reading.id).unwrap();

        reading.ppm = 999;
        assert!(!store.insert_reading(&reading).unwrap());
        assert_eq!(store.insert_readings(std::slice::from_ref(&reading)).unwrap(), 0);

        assert_eq!(store.count_readings(None).unwrap(), 1);
        let stored = store.get_reading(&reading.id).unwrap().unwrap();
        assert_eq!(stored.reading.ppm, 145);
        assert!(stored.sync.is_uploaded);
        assert!(store.unsynced_readings(None).unwrap().is_empty());
    }

    #[test]
    fn test_insert_readings_batch() {
        let store = Store::open_in_memory().unwrap();
        let base = now();
        let readings: Vec<_> = (0..5)
            .map(|i| reading_at(100 + i * 50, base + Duration::seconds(i as i64)))
            .collect();

        assert_eq!(store.insert_readings(&readings).unwrap(), 5);
        assert_eq!(store.count_readings(Some("test-device")).unwrap(), 5);
        assert_eq!(store.count_readings(Some("other")).unwrap(), 0);
    }

    #[test]
    fn test_latest_reading() {
        let store = Store::open_in_memory().unwrap();
        let base = now();
        store.insert_reading(&reading_at(700, base - Duration::minutes(1))).unwrap();
        store.insert_reading(&reading_at(900, base)).unwrap();

        let mut other = reading_at(120, base - Duration::minutes(5));
        other.device_id = "other".to_string();
        store.insert_reading(&other).unwrap();

        assert_eq!(store.latest_reading(None).unwrap().unwrap().reading.ppm, 900);
        assert_eq!(
            store.latest_reading(Some("other")).unwrap().unwrap().reading.ppm,
            120
        );
    }

    #[test]
    fn test_query_time_window_and_level() {
        let store = Store::open_in_memory().unwrap();
        let base = now();
        for (i, ppm) in [150, 250, 450, 500].into_iter().enumerate() {
            store
                .insert_reading(&reading_at(ppm, base - Duration::hours(i as i64)))
                .unwrap();
        }

        let recent = store
            .query_readings(&ReadingQuery::new().since(base - Duration::minutes(90)))
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].reading.ppm, 150);

        let critical = store
            .query_readings(&ReadingQuery::new().alert_level(AlertLevel::Critical).oldest_first())
            .unwrap();
        let ppms: Vec<_> = critical.iter().map(|r| r.reading.ppm).collect();
        assert_eq!(ppms, vec![500, 450]);

        let page = store
            .query_readings(&ReadingQuery::new().limit(2).offset(1))
            .unwrap();
        let ppms: Vec<_> = page.iter().map(|r| r.reading.ppm).collect();
        assert_eq!(ppms, vec![250, 450]);
    }

    #[test]
    fn test_count_critical_since() {
        let store = Store::open_in_memory().unwrap();
        let base = now();
        store.insert_reading(&reading_at(450, base)).unwrap();
        store.insert_reading(&reading_at(480, base - Duration::days(2))).unwrap();
        store.insert_reading(&reading_at(150, base)).unwrap();

        assert_eq!(
            store.count_critical_since(base - Duration::days(1)).unwrap(),
            1
        );
    }

    #[test]
    fn test_averages_and_extremes() {
        let store = Store::open_in_memory().unwrap();
        let base = now();
        store
            .insert_reading(&with_gases(reading_at(200, base), 0.04, 0.001, 20.5))
            .unwrap();
        store
            .insert_reading(&with_gases(reading_at(300, base), 0.08, 0.003, 19.5))
            .unwrap();
        // Hardware row without gases only counts toward ppm and temperature.
        store.insert_reading(&reading_at(600, base)).unwrap();

        let since = base - Duration::hours(1);
        let averages = store.averages_since(since).unwrap();
        assert_eq!(averages.count, 3);
        assert!((averages.co2.unwrap() - 0.06).abs() < 1e-9);
        assert!((averages.oxygen.unwrap() - 20.0).abs() < 1e-9);
        assert!((averages.temperature.unwrap() - 22.5).abs() < 1e-9);

        let extremes = store.extremes_since(since).unwrap();
        assert_eq!(extremes.max_ppm, Some(600));
        assert_eq!(extremes.max_co2, Some(0.08));
        assert_eq!(extremes.max_co, Some(0.003));
        assert_eq!(extremes.min_oxygen, Some(19.5));
    }

    #[test]
    fn test_aggregates_on_empty_window() {
        let store = Store::open_in_memory().unwrap();
        let averages = store.averages_since(now()).unwrap();
        assert_eq!(averages, ReadingAverages::default());
        assert_eq!(store.extremes_since(now()).unwrap(), ReadingExtremes::default());
    }

    #[test]
    fn test_gas_statistics() {
        let store = Store::open_in_memory().unwrap();
        let base = now();
        store
            .insert_reading(&with_gases(reading_at(200, base), 0.04, 0.001, 20.5))
            .unwrap();
        store
            .insert_reading(&with_gases(reading_at(300, base), 0.08, 0.003, 19.5))
            .unwrap();

        let stats = store
            .gas_statistics(
                GasType::Oxygen,
                base - Duration::minutes(1),
                base + Duration::minutes(1),
            )
            .unwrap();
        assert_eq!(stats.gas, GasType::Oxygen);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.minimum, Some(19.5));
        assert_eq!(stats.maximum, Some(20.5));
        assert!((stats.average.unwrap() - 20.0).abs() < 1e-9);

        let none = store
            .gas_statistics(
                GasType::CarbonDioxide,
                base - Duration::days(3),
                base - Duration::days(2),
            )
            .unwrap();
        assert_eq!(none.count, 0);
        assert!(none.average.is_none());
    }

    #[test]
    fn test_unsynced_and_mark_uploaded() {
        let store = Store::open_in_memory().unwrap();
        let base = now();
        let older = reading_at(150, base - Duration::minutes(2));
        let newer = reading_at(250, base);
        store.insert_reading(&newer).unwrap();
        store.insert_reading(&older).unwrap();

        let pending = store.unsynced_readings(None).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id(), older.id);

        assert!(store.mark_uploaded(&older.id).unwrap());
        let pending = store.unsynced_readings(None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), newer.id);

        let uploaded = store.get_reading(&older.id).unwrap().unwrap();
        assert!(uploaded.sync.is_uploaded);
        assert!(uploaded.sync.last_sync_attempt.is_some());

        assert!(!store.mark_uploaded("missing").unwrap());
    }

    #[test]
    fn test_unsynced_limit() {
        let store = Store::open_in_memory().unwrap();
        let base = now();
        for i in 0..5 {
            store
                .insert_reading(&reading_at(150, base + Duration::seconds(i)))
                .unwrap();
        }
        assert_eq!(store.unsynced_readings(Some(3)).unwrap().len(), 3);
    }

    #[test]
    fn test_mark_sync_error_keeps_row_pending() {
        let store = Store::open_in_memory().unwrap();
        let reading = reading_at(150, now());
        store.insert_reading(&reading).unwrap();

        assert!(store.mark_sync_error(&reading.id, "network down").unwrap());
        let stored = store.get_reading(&reading.id).unwrap().unwrap();
        assert!(!stored.sync.is_uploaded);
        assert_eq!(stored.sync.sync_error.as_deref(), Some("network down"));
        assert!(stored.sync.has_failed());
        assert_eq!(store.unsynced_readings(None).unwrap().len(), 1);

        // A later success clears the error.
        store.mark_uploaded(&reading.id).unwrap();
        let stored = store.get_reading(&reading.id).unwrap().unwrap();
        assert!(stored.sync.is_uploaded);
        assert!(stored.sync.sync_error.is_none());

        // Uploaded rows never regress.
        assert!(!store.mark_sync_error(&reading.id, "late failure").unwrap());
    }

    #[test]
    fn test_mark_many_uploaded_and_counts() {
        let store = Store::open_in_memory().unwrap();
        let base = now();
        let readings: Vec<_> = (0..4)
            .map(|i| reading_at(150, base + Duration::seconds(i)))
            .collect();
        store.insert_readings(&readings).unwrap();

        let ids = [readings[0].id.clone(), readings[1].id.clone()];
        assert_eq!(store.mark_many_uploaded(&ids).unwrap(), 2);
        store.mark_sync_error(&readings[2].id, "timeout").unwrap();

        let counts = store.sync_counts().unwrap();
        assert_eq!(
            counts,
            SyncCounts {
                uploaded: 2,
                pending: 1,
                failed: 1
            }
        );
        assert_eq!(counts.unsynced(), 2);
    }

    #[test]
    fn test_insert_remote_reading() {
        let store = Store::open_in_memory().unwrap();
        let local = reading_at(150, now());
        store.insert_reading(&local).unwrap();

        // Existing local row wins.
        let mut pulled = local.clone();
        pulled.ppm = 999;
        assert!(!store.insert_remote_reading(&pulled).unwrap());
        assert_eq!(store.get_reading(&local.id).unwrap().unwrap().reading.ppm, 150);

        let fresh = reading_at(260, now());
        assert!(store.insert_remote_reading(&fresh).unwrap());
        let stored = store.get_reading(&fresh.id).unwrap().unwrap();
        assert!(stored.sync.is_uploaded);
        assert_eq!(store.unsynced_readings(None).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_readings_before_is_strict() {
        let store = Store::open_in_memory().unwrap();
        let cutoff = now() - Duration::days(30);
        store.insert_reading(&reading_at(150, cutoff - Duration::milliseconds(1))).unwrap();
        let at_cutoff = reading_at(160, cutoff);
        store.insert_reading(&at_cutoff).unwrap();
        store.insert_reading(&reading_at(170, now())).unwrap();

        assert_eq!(store.delete_readings_before(cutoff).unwrap(), 1);
        assert_eq!(store.count_readings(None).unwrap(), 2);
        assert!(store.get_reading(&at_cutoff.id).unwrap().is_some());
    }

    #[test]
    fn test_delete_simulated_before() {
        let store = Store::open_in_memory().unwrap();
        let old = now() - Duration::days(10);
        store
            .insert_reading(&with_gases(reading_at(150, old), 0.04, 0.001, 20.9))
            .unwrap();
        store.insert_reading(&reading_at(150, old)).unwrap();

        assert_eq!(store.delete_simulated_before(now()).unwrap(), 1);
        let remaining = store.query_readings(&ReadingQuery::new()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(!remaining[0].reading.is_simulated);
    }

    #[test]
    fn test_configuration_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let mut config = DeviceConfiguration::new("dev-1", "Kitchen monitor");
        config.room_type = Some("kitchen".to_string());
        config.thresholds.co2.warning = ThresholdRange(0.12, 0.4);
        config.calibration_date = now();
        config.created_at = now();
        config.updated_at = now();
        store.upsert_configuration(&config).unwrap();

        let stored = store.configuration_for_device("dev-1").unwrap().unwrap();
        assert_eq!(stored, config);
        assert!(store.configuration_for_device("dev-2").unwrap().is_none());
    }

    #[test]
    fn test_one_active_configuration_per_device() {
        let store = Store::open_in_memory().unwrap();
        let first = DeviceConfiguration::new("dev-1", "First");
        store.upsert_configuration(&first).unwrap();
        let second = DeviceConfiguration::new("dev-1", "Second");
        store.upsert_configuration(&second).unwrap();
        store
            .upsert_configuration(&DeviceConfiguration::new("dev-2", "Other"))
            .unwrap();

        let active = store.active_configurations().unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(
            store
                .configuration_for_device("dev-1")
                .unwrap()
                .unwrap()
                .device_name,
            "Second"
        );
    }

    #[test]
    fn test_deactivate_and_delete_device() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_configuration(&DeviceConfiguration::new("dev-1", "Monitor"))
            .unwrap();

        assert_eq!(store.deactivate_device("dev-1").unwrap(), 1);
        assert!(store.configuration_for_device("dev-1").unwrap().is_none());
        assert!(store.active_configurations().unwrap().is_empty());

        assert_eq!(store.delete_device("dev-1").unwrap(), 1);
        assert_eq!(store.delete_device("dev-1").unwrap(), 0);
    }

    #[test]
    fn test_calibration_history() {
        let store = Store::open_in_memory().unwrap();
        let base = now();

        let mut first = CalibrationRecord::new("dev-1", CalibrationType::FactoryReset, true);
        first.calibration_date = base - Duration::days(10);
        first.reference_values = serde_json::json!({"co2": 0.04});
        let mut second = CalibrationRecord::new("dev-1", CalibrationType::Manual, false);
        second.calibration_date = base - Duration::days(1);
        second.notes = Some("drifted".to_string());
        let mut third = CalibrationRecord::new("dev-1", CalibrationType::Automatic, true);
        third.calibration_date = base;
        third.is_active = false;

        for record in [&first, &second, &third] {
            store.insert_calibration(record).unwrap();
        }

        let history = store.calibration_history("dev-1").unwrap();
        let ids: Vec<_> = history.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![third.id.as_str(), second.id.as_str(), first.id.as_str()]);
        assert_eq!(history[2], first);

        let latest = store.latest_calibration("dev-1").unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(store.successful_calibration_count("dev-1").unwrap(), 2);

        assert_eq!(
            store
                .delete_calibrations_before(base - Duration::days(5))
                .unwrap(),
            1
        );
        assert_eq!(store.calibration_history("dev-1").unwrap().len(), 2);
    }

    #[test]
    fn test_calibration_insert_is_write_once() {
        let store = Store::open_in_memory().unwrap();
        let mut record = CalibrationRecord::new("dev-1", CalibrationType::Manual, true);
        record.notes = Some("first".to_string());
        assert!(store.insert_calibration(&record).unwrap());

        let mut rewrite = record.clone();
        rewrite.notes = Some("second".to_string());
        rewrite.calibration_success = false;
        assert!(!store.insert_calibration(&rewrite).unwrap());

        let history = store.calibration_history("dev-1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], record);
        assert_eq!(store.successful_calibration_count("dev-1").unwrap(), 1);
    }
}
