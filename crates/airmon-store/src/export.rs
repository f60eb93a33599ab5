//! CSV export of stored readings.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use airmon_types::GasType;

use crate::error::{Error, Result};
use crate::models::StoredReading;
use crate::queries::ReadingQuery;
use crate::store::Store;

/// One CSV line. Gas columns are empty for readings without a breakdown.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    timestamp: String,
    device_id: &'a str,
    location: Option<&'a str>,
    ppm: u32,
    air_quality_level: &'static str,
    alert_level: &'static str,
    quality_index: u16,
    temperature_c: f64,
    humidity_pct: f64,
    pressure_hpa: Option<f64>,
    oxygen_pct: Option<f64>,
    co2_pct: Option<f64>,
    co_pct: Option<f64>,
    ammonia_pct: Option<f64>,
    nox_pct: Option<f64>,
    water_vapor_pct: Option<f64>,
    alcohol_pct: Option<f64>,
    toluene_pct: Option<f64>,
    benzene_pct: Option<f64>,
    acetone_pct: Option<f64>,
    is_simulated: bool,
    data_source: &'static str,
    is_uploaded: bool,
}

impl<'a> CsvRow<'a> {
    fn from_stored(stored: &'a StoredReading) -> Result<Self> {
        let r = &stored.reading;
        let gas = |g: GasType| r.gases.as_ref().map(|levels| levels.get(g));
        let timestamp = r
            .timestamp
            .format(&Rfc3339)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        Ok(Self {
            timestamp,
            device_id: &r.device_id,
            location: r.location.as_deref(),
            ppm: r.ppm,
            air_quality_level: r.air_quality_level.as_str(),
            alert_level: r.alert_level.as_str(),
            quality_index: r.quality_index,
            temperature_c: r.temperature,
            humidity_pct: r.humidity,
            pressure_hpa: r.pressure,
            oxygen_pct: gas(GasType::Oxygen),
            co2_pct: gas(GasType::CarbonDioxide),
            co_pct: gas(GasType::CarbonMonoxide),
            ammonia_pct: gas(GasType::Ammonia),
            nox_pct: gas(GasType::NitrogenOxides),
            water_vapor_pct: gas(GasType::WaterVapor),
            alcohol_pct: gas(GasType::Alcohol),
            toluene_pct: gas(GasType::Toluene),
            benzene_pct: gas(GasType::Benzene),
            acetone_pct: gas(GasType::Acetone),
            is_simulated: r.is_simulated,
            data_source: r.data_source.as_str(),
            is_uploaded: stored.sync.is_uploaded,
        })
    }
}

impl Store {
    /// Write the readings matching `query` as CSV with a header row.
    ///
    /// Returns the number of data rows written.
    pub fn export_csv<W: Write>(&self, query: &ReadingQuery, writer: W) -> Result<usize> {
        let readings = self.query_readings(query)?;
        let mut csv = csv::Writer::from_writer(writer);
        for stored in &readings {
            csv.serialize(CsvRow::from_stored(stored)?)?;
        }
        csv.flush()?;
        Ok(readings.len())
    }

    /// Export to a file, creating or truncating it.
    pub fn export_csv_to_path<P: AsRef<Path>>(&self, query: &ReadingQuery, path: P) -> Result<usize> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let rows = self.export_csv(query, file)?;
        info!("Exported {} readings to {}", rows, path.display());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airmon_types::{AirQualityLevel, AlertLevel, DataOrigin, GasLevels, SensorReading};
    use time::macros::datetime;

    fn reading(ppm: u32, gases: Option<GasLevels>) -> SensorReading {
        SensorReading {
            id: SensorReading::new_id(),
            timestamp: datetime!(2024-05-01 12:00:00 UTC),
            device_id: "dev-1".to_string(),
            location: None,
            ppm,
            gases,
            temperature: 23.5,
            humidity: 60.0,
            pressure: None,
            air_quality_level: AirQualityLevel::from_ppm(ppm),
            quality_index: 10,
            alert_level: AlertLevel::Normal,
            is_simulated: gases.is_some(),
            calibration_version: "1.0".to_string(),
            data_source: DataOrigin::Mq135,
        }
    }

    #[test]
    fn test_export_csv_header_and_rows() {
        let store = Store::open_in_memory().unwrap();
        store.insert_reading(&reading(145, None)).unwrap();

        let mut out = Vec::new();
        let rows = store.export_csv(&ReadingQuery::new(), &mut out).unwrap();
        assert_eq!(rows, 1);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("timestamp,device_id,location,ppm,"));
        assert!(header.contains("co2_pct"));

        let line = lines.next().unwrap();
        assert!(line.starts_with("2024-05-01T12:00:00Z,dev-1,,145,good,NORMAL,10,23.5,60.0,"));
        // No gas breakdown: every gas column is empty.
        assert!(line.contains(",,,,,,,,,,,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_export_csv_with_gases() {
        let store = Store::open_in_memory().unwrap();
        let gases = GasLevels {
            oxygen: 20.9,
            carbon_dioxide: 0.04,
            ..GasLevels::default()
        };
        store.insert_reading(&reading(200, Some(gases))).unwrap();

        let mut out = Vec::new();
        store.export_csv(&ReadingQuery::new(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(",20.9,0.04,"));
    }

    #[test]
    fn test_export_csv_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        let store = Store::open_in_memory().unwrap();
        store.insert_reading(&reading(145, None)).unwrap();
        store.insert_reading(&reading(321, None)).unwrap();

        let rows = store
            .export_csv_to_path(&ReadingQuery::new().oldest_first(), &path)
            .unwrap();
        assert_eq!(rows, 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
