//! Query builder for stored readings.
//!
//! # Example
//!
//! ```
//! use airmon_store::{Store, ReadingQuery};
//! use airmon_types::AlertLevel;
//! use time::{OffsetDateTime, Duration};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! let query = ReadingQuery::new()
//!     .device("AirMonitor_TI3042_001")
//!     .since(yesterday)
//!     .alert_level(AlertLevel::Critical)
//!     .limit(50);
//!
//! let readings = store.query_readings(&query)?;
//! assert!(readings.is_empty());
//! # Ok::<(), airmon_store::Error>(())
//! ```

use time::OffsetDateTime;

use airmon_types::{AlertLevel, to_unix_millis};

/// Columns selected for every reading row, in the order the row mapper reads them.
pub(crate) const READING_COLUMNS: &str = "id, timestamp, device_id, location, ppm, \
     oxygen, co2, co, ammonia, nox, water_vapor, alcohol, toluene, benzene, acetone, \
     temperature, humidity, pressure, air_quality_level, quality_index, alert_level, \
     is_simulated, calibration_version, data_source, \
     is_uploaded, last_sync_attempt, sync_error";

/// Fluent query builder for readings.
///
/// Use this to construct queries for [`Store::query_readings`](crate::Store::query_readings)
/// and [`Store::export_csv`](crate::Store::export_csv). All filters are optional.
///
/// By default, queries return results ordered by timestamp descending
/// (newest first).
#[derive(Debug, Default, Clone)]
pub struct ReadingQuery {
    /// Filter by device ID.
    pub device_id: Option<String>,
    /// Filter readings at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter readings at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Filter by overall alert level.
    pub alert_level: Option<AlertLevel>,
    /// Filter by upload state.
    pub uploaded: Option<bool>,
    /// Filter by simulated/hardware origin.
    pub simulated: Option<bool>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by timestamp descending (newest first).
    pub newest_first: bool,
}

impl ReadingQuery {
    /// Create a new query: all devices, no time window, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by device ID.
    pub fn device(mut self, device_id: &str) -> Self {
        self.device_id = Some(device_id.to_string());
        self
    }

    /// Filter to readings taken at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to readings taken at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Only readings with exactly this alert level.
    pub fn alert_level(mut self, level: AlertLevel) -> Self {
        self.alert_level = Some(level);
        self
    }

    /// Only readings with this upload state.
    pub fn uploaded(mut self, uploaded: bool) -> Self {
        self.uploaded = Some(uploaded);
        self
    }

    /// Only simulated (`true`) or hardware (`false`) readings.
    pub fn simulated(mut self, simulated: bool) -> Self {
        self.simulated = Some(simulated);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    ///
    /// Use with `limit()` for pagination: page 2 with 50 items per page is
    /// `.limit(50).offset(50)`.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results by oldest first (chronological).
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref device_id) = self.device_id {
            conditions.push("device_id = ?");
            params.push(Box::new(device_id.clone()));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new(to_unix_millis(since)));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp <= ?");
            params.push(Box::new(to_unix_millis(until)));
        }

        if let Some(level) = self.alert_level {
            conditions.push("alert_level = ?");
            params.push(Box::new(level.as_str()));
        }

        if let Some(uploaded) = self.uploaded {
            conditions.push("is_uploaded = ?");
            params.push(Box::new(uploaded));
        }

        if let Some(simulated) = self.simulated {
            conditions.push("is_simulated = ?");
            params.push(Box::new(simulated));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT {} FROM sensor_readings {} ORDER BY timestamp {}, rowid {}",
            READING_COLUMNS, where_clause, order, order
        );

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_reading_query_new_defaults() {
        let query = ReadingQuery::new();
        assert!(query.device_id.is_none());
        assert!(query.since.is_none());
        assert!(query.until.is_none());
        assert!(query.alert_level.is_none());
        assert!(query.limit.is_none());
        assert!(query.offset.is_none());
        assert!(query.newest_first);
    }

    #[test]
    fn test_reading_query_default_is_different_from_new() {
        assert!(!ReadingQuery::default().newest_first);
        assert!(ReadingQuery::new().newest_first);
    }

    #[test]
    fn test_reading_query_chaining() {
        let since = datetime!(2024-01-01 00:00:00 UTC);
        let until = datetime!(2024-12-31 23:59:59 UTC);

        let query = ReadingQuery::new()
            .device("my-device")
            .since(since)
            .until(until)
            .alert_level(AlertLevel::Warning)
            .limit(10)
            .offset(5)
            .oldest_first();

        assert_eq!(query.device_id, Some("my-device".to_string()));
        assert_eq!(query.since, Some(since));
        assert_eq!(query.until, Some(until));
        assert_eq!(query.alert_level, Some(AlertLevel::Warning));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(5));
        assert!(!query.newest_first);
    }

    #[test]
    fn test_build_where_empty() {
        let (where_clause, params) = ReadingQuery::new().build_where();
        assert_eq!(where_clause, "");
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_where_time_range() {
        let since = datetime!(2024-01-01 00:00:00 UTC);
        let until = datetime!(2024-12-31 23:59:59 UTC);

        let (where_clause, params) = ReadingQuery::new().since(since).until(until).build_where();
        assert_eq!(where_clause, "WHERE timestamp >= ? AND timestamp <= ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_build_where_all_filters() {
        let query = ReadingQuery::new()
            .device("device-1")
            .since(datetime!(2024-01-01 00:00:00 UTC))
            .alert_level(AlertLevel::Critical)
            .uploaded(false)
            .simulated(true);
        let (where_clause, params) = query.build_where();

        assert!(where_clause.contains("device_id = ?"));
        assert!(where_clause.contains("alert_level = ?"));
        assert!(where_clause.contains("is_uploaded = ?"));
        assert!(where_clause.contains("is_simulated = ?"));
        assert_eq!(params.len(), 5);
    }

    #[test]
    fn test_build_sql_basic() {
        let sql = ReadingQuery::new().build_sql();
        assert!(sql.contains("FROM sensor_readings"));
        assert!(sql.contains("ORDER BY timestamp DESC"));
        assert!(!sql.contains("WHERE"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_build_sql_pagination() {
        let sql = ReadingQuery::new().limit(100).offset(10).oldest_first().build_sql();
        assert!(sql.contains("ORDER BY timestamp ASC"));
        assert!(sql.ends_with("LIMIT 100 OFFSET 10"));

        let sql = ReadingQuery::new().offset(25).build_sql();
        assert!(sql.ends_with("LIMIT -1 OFFSET 25"));
    }
}
