//! Persistence layer backed by `sled`
//!
//! Each table is a `sled` tree holding JSON rows:
//! - `dim_time` keyed by the reading's second-resolution timestamp
//! - `dim_sensor` keyed by sensor id
//! - `dim_location` keyed by city name
//! - `dim_status` keyed by status code, seeded with the known codes on open
//! - `fact_weather_reading` and `alert_log` keyed by big-endian generated ids,
//!   so iteration yields insertion order.
//!
//! Dimension rows are get-or-create through `compare_and_swap`, so two writers
//! racing on the same key end up sharing one row.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::debug;

use crate::persistence::PersistenceSink;
use crate::reading::Reading;
use crate::rules::{Alert, Severity};
use crate::utils::error::PersistenceError;

const TIME_TREE: &str = "dim_time";
const SENSOR_TREE: &str = "dim_sensor";
const LOCATION_TREE: &str = "dim_location";
const STATUS_TREE: &str = "dim_status";
const FACT_TREE: &str = "fact_weather_reading";
const ALERT_TREE: &str = "alert_log";

const READING_UNIT: &str = "C/%/hPa";

const KNOWN_STATUSES: [(&str, &str); 5] = [
    ("OK", "Normal reading - no issues detected"),
    ("SPIKE", "Anomalous spike detected in reading"),
    ("STUCK", "Sensor appears to be stuck on same value"),
    ("DROPOUT", "Reading dropout or missing data"),
    ("DEGRADED", "Poor signal quality or degraded reading"),
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimeDim {
    pub time_id: u64,
    pub ts: DateTime<Utc>,
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// 0 = Monday
    pub day_of_week: u32,
    pub is_weekend: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SensorDim {
    pub sensor_id: String,
    pub sensor_type: String,
    pub sensor_model: String,
    pub manufacturer: String,
    pub firmware_version: String,
    pub is_active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LocationDim {
    pub location_id: u64,
    pub city_name: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
    pub location_code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusDim {
    pub status_id: u64,
    pub status_code: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FactReading {
    pub reading_id: u64,
    pub time_id: u64,
    pub sensor_id: String,
    pub location_id: u64,
    pub status_id: u64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_direction: String,
    pub rainfall: f64,
    pub unit: String,
    pub is_anomaly: bool,
    pub anomaly_type: Option<String>,
    pub ingestion_ts: DateTime<Utc>,
    pub processing_latency_ms: i64,
    pub signal_strength: f64,
    pub reading_quality: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub alert_id: u64,
    pub alert_ts: DateTime<Utc>,
    pub sensor_id: String,
    pub alert_type: String,
    pub alert_severity: Severity,
    pub message: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub threshold_value: f64,
    pub is_resolved: bool,
}

#[derive(Clone)]
pub struct SledSink {
    db: Db,
}

impl SledSink {
    /// Open or create a sled database at `path` and seed the status dimension.
    pub fn open(path: &str) -> Result<Self, PersistenceError> {
        Self::from_db(sled::open(path)?)
    }

    /// Open a throwaway database that lives only as long as this sink.
    pub fn temporary() -> Result<Self, PersistenceError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, PersistenceError> {
        let sink = Self { db };
        sink.seed_statuses()?;
        Ok(sink)
    }

    fn seed_statuses(&self) -> Result<(), PersistenceError> {
        let tree = self.tree(STATUS_TREE)?;
        for (code, description) in KNOWN_STATUSES {
            self.get_or_create(&tree, code.as_bytes(), |status_id| StatusDim {
                status_id,
                status_code: code.to_string(),
                description: description.to_string(),
            })?;
        }
        Ok(())
    }

    fn tree(&self, name: &str) -> Result<Tree, PersistenceError> {
        Ok(self.db.open_tree(name)?)
    }

    fn next_id(&self) -> Result<u64, PersistenceError> {
        Ok(self.db.generate_id()?)
    }

    /// Return the row stored under `key`, inserting `build(new_id)` if absent.
    fn get_or_create<T, F>(&self, tree: &Tree, key: &[u8], build: F) -> Result<T, PersistenceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(u64) -> T,
    {
        if let Some(existing) = tree.get(key)? {
            return Ok(serde_json::from_slice(&existing)?);
        }

        let row = build(self.next_id()?);
        let serialized = serde_json::to_vec(&row)?;
        match tree.compare_and_swap(key, None::<&[u8]>, Some(serialized))? {
            Ok(()) => Ok(row),
            Err(conflict) => match conflict.current {
                Some(current) => Ok(serde_json::from_slice(&current)?),
                None => Ok(row),
            },
        }
    }

    fn insert_row<T: Serialize>(&self, tree_name: &str, id: u64, row: &T) -> Result<(), PersistenceError> {
        let tree = self.tree(tree_name)?;
        tree.insert(id.to_be_bytes(), serde_json::to_vec(row)?)?;
        Ok(())
    }

    fn load_rows<T: DeserializeOwned>(&self, tree_name: &str) -> Result<Vec<T>, PersistenceError> {
        self.tree(tree_name)?
            .iter()
            .values()
            .map(|value| -> Result<T, PersistenceError> { Ok(serde_json::from_slice(&value?)?) })
            .collect()
    }

    fn time_dim(&self, ts: DateTime<Utc>) -> Result<TimeDim, PersistenceError> {
        let ts = ts.with_nanosecond(0).unwrap_or(ts);
        let key = ts.format("%Y-%m-%dT%H:%M:%S").to_string();
        let weekday = ts.weekday().num_days_from_monday();
        self.get_or_create(&self.tree(TIME_TREE)?, key.as_bytes(), |time_id| TimeDim {
            time_id,
            ts,
            date: ts.date_naive(),
            year: ts.year(),
            month: ts.month(),
            day: ts.day(),
            hour: ts.hour(),
            minute: ts.minute(),
            second: ts.second(),
            day_of_week: weekday,
            is_weekend: weekday >= 5,
        })
    }

    fn sensor_dim(&self, reading: &Reading) -> Result<SensorDim, PersistenceError> {
        self.get_or_create(&self.tree(SENSOR_TREE)?, reading.sensor_id.as_bytes(), |_| SensorDim {
            sensor_id: reading.sensor_id.clone(),
            sensor_type: reading.sensor.sensor_type.clone(),
            sensor_model: reading.sensor.model.clone(),
            manufacturer: reading.sensor.manufacturer.clone(),
            firmware_version: reading.sensor.firmware_version.clone(),
            is_active: true,
        })
    }

    fn location_dim(&self, reading: &Reading) -> Result<LocationDim, PersistenceError> {
        let location = &reading.location;
        self.get_or_create(&self.tree(LOCATION_TREE)?, location.city.as_bytes(), |location_id| {
            LocationDim {
                location_id,
                city_name: location.city.clone(),
                region: location.region.clone(),
                country: location.country.clone(),
                lat: location.lat,
                lon: location.lon,
                altitude: location.altitude,
                location_code: location.city.chars().take(3).collect::<String>().to_uppercase(),
            }
        })
    }

    fn status_dim(&self, code: &str) -> Result<StatusDim, PersistenceError> {
        self.get_or_create(&self.tree(STATUS_TREE)?, code.as_bytes(), |status_id| StatusDim {
            status_id,
            status_code: code.to_string(),
            description: format!("Status: {code}"),
        })
    }

    pub fn reading_count(&self) -> Result<usize, PersistenceError> {
        Ok(self.tree(FACT_TREE)?.len())
    }

    pub fn alert_count(&self) -> Result<usize, PersistenceError> {
        Ok(self.tree(ALERT_TREE)?.len())
    }

    /// All stored readings in insertion order.
    pub fn load_readings(&self) -> Result<Vec<FactReading>, PersistenceError> {
        self.load_rows(FACT_TREE)
    }

    /// All stored alerts in insertion order.
    pub fn load_alerts(&self) -> Result<Vec<AlertRecord>, PersistenceError> {
        self.load_rows(ALERT_TREE)
    }

    pub fn sensor(&self, sensor_id: &str) -> Result<Option<SensorDim>, PersistenceError> {
        match self.tree(SENSOR_TREE)?.get(sensor_id.as_bytes())? {
            Some(row) => Ok(Some(serde_json::from_slice(&row)?)),
            None => Ok(None),
        }
    }

    pub fn locations(&self) -> Result<Vec<LocationDim>, PersistenceError> {
        self.load_rows(LOCATION_TREE)
    }

    pub fn statuses(&self) -> Result<Vec<StatusDim>, PersistenceError> {
        self.load_rows(STATUS_TREE)
    }

    pub fn times(&self) -> Result<Vec<TimeDim>, PersistenceError> {
        self.load_rows(TIME_TREE)
    }
}

impl PersistenceSink for SledSink {
    fn store_reading(&self, reading: &Reading) -> Result<(), PersistenceError> {
        let time = self.time_dim(reading.timestamp)?;
        let sensor = self.sensor_dim(reading)?;
        let location = self.location_dim(reading)?;
        let status = self.status_dim(&reading.status)?;

        let ingestion_ts = Utc::now();
        let processing_latency_ms = reading
            .received_at
            .map(|received| (ingestion_ts - received).num_milliseconds().max(0))
            .unwrap_or(0);
        let metric = |key: &str| reading.metric(key).unwrap_or(0.0);

        let reading_id = self.next_id()?;
        let fact = FactReading {
            reading_id,
            time_id: time.time_id,
            sensor_id: sensor.sensor_id,
            location_id: location.location_id,
            status_id: status.status_id,
            temperature: metric("temperature"),
            humidity: metric("humidity"),
            pressure: metric("pressure"),
            wind_speed: metric("wind_speed"),
            wind_direction: reading.wind_direction.clone().unwrap_or_else(|| "N".to_string()),
            rainfall: metric("rainfall"),
            unit: READING_UNIT.to_string(),
            is_anomaly: reading.is_anomaly(),
            anomaly_type: reading.is_anomaly().then(|| reading.status.clone()),
            ingestion_ts,
            processing_latency_ms,
            signal_strength: reading.sensor.signal_strength,
            reading_quality: reading.sensor.reading_quality,
        };
        self.insert_row(FACT_TREE, reading_id, &fact)?;
        debug!(sensor_id = %fact.sensor_id, reading_id, "Reading stored");
        Ok(())
    }

    fn store_alert(&self, alert: &Alert) -> Result<(), PersistenceError> {
        let alert_id = self.next_id()?;
        let record = AlertRecord {
            alert_id,
            alert_ts: alert.generated_at,
            sensor_id: alert.sensor_id.clone(),
            alert_type: alert.rule.clone(),
            alert_severity: alert.severity,
            message: alert.message(),
            metric_name: alert.metric.clone(),
            metric_value: alert.value,
            threshold_value: alert.threshold,
            is_resolved: false,
        };
        self.insert_row(ALERT_TREE, alert_id, &record)?;
        debug!(sensor_id = %record.sensor_id, alert_id, "Alert stored");
        Ok(())
    }

    fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SledSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledSink").field("db", &"sled::Db").finish()
    }
}
