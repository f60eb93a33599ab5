//! Database schema and migrations.
//!
//! Timestamps are stored as epoch milliseconds. Threshold bands and
//! calibration values are stored as JSON text.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, 1)?;
        migrate(conn, 1)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Readings and device configuration.
pub(crate) fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sensor_readings (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            location TEXT,
            ppm INTEGER NOT NULL,
            oxygen REAL,
            co2 REAL,
            co REAL,
            ammonia REAL,
            nox REAL,
            water_vapor REAL,
            alcohol REAL,
            toluene REAL,
            benzene REAL,
            acetone REAL,
            temperature REAL NOT NULL,
            humidity REAL NOT NULL,
            pressure REAL,
            air_quality_level TEXT NOT NULL,
            quality_index INTEGER NOT NULL,
            alert_level TEXT NOT NULL,
            is_simulated INTEGER NOT NULL DEFAULT 0,
            calibration_version TEXT NOT NULL,
            data_source TEXT NOT NULL,
            is_uploaded INTEGER NOT NULL DEFAULT 0,
            last_sync_attempt INTEGER,
            sync_error TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_readings_device_time
            ON sensor_readings(device_id, timestamp);

        CREATE TABLE IF NOT EXISTS device_configurations (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            device_name TEXT NOT NULL,
            device_type TEXT NOT NULL,
            calibration_date INTEGER NOT NULL,
            calibration_version TEXT NOT NULL,
            calibration_status TEXT NOT NULL,
            oxygen_thresholds TEXT NOT NULL,
            co2_thresholds TEXT NOT NULL,
            co_thresholds TEXT NOT NULL,
            ammonia_thresholds TEXT NOT NULL,
            nox_thresholds TEXT NOT NULL,
            vapor_thresholds TEXT NOT NULL,
            smoke_thresholds TEXT NOT NULL,
            toluene_thresholds TEXT NOT NULL,
            location TEXT,
            room_type TEXT,
            is_indoor INTEGER NOT NULL,
            alerts_enabled INTEGER NOT NULL,
            critical_alerts_enabled INTEGER NOT NULL,
            alert_cooldown_minutes INTEGER NOT NULL,
            email_notifications INTEGER NOT NULL,
            push_notifications INTEGER NOT NULL,
            auto_sync INTEGER NOT NULL,
            sync_interval_minutes INTEGER NOT NULL,
            only_wifi INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            user_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_configurations_device
            ON device_configurations(device_id, is_active);
        "#,
    )?;

    Ok(())
}

/// Calibration history and the pending-upload index.
fn migrate_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS calibration_records (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            calibration_type TEXT NOT NULL,
            calibration_date INTEGER NOT NULL,
            reference_values TEXT NOT NULL,
            measured_values TEXT NOT NULL,
            adjustment_factors TEXT NOT NULL,
            temperature REAL NOT NULL,
            humidity REAL NOT NULL,
            pressure REAL,
            calibration_success INTEGER NOT NULL,
            accuracy_improvement REAL,
            notes TEXT,
            performed_by TEXT,
            version TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_calibrations_device_date
            ON calibration_records(device_id, calibration_date);

        CREATE INDEX IF NOT EXISTS idx_readings_pending
            ON sensor_readings(is_uploaded, timestamp);
        "#,
    )?;
    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    if old_version < 2 {
        migrate_to_v2(conn)?;
    }

    info!(
        "Migrated database schema from v{} to v{}",
        old_version, SCHEMA_VERSION
    );
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}
