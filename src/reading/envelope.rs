use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::broker::Message;
use crate::utils::error::ReadingError;

/// Numeric metrics the pipeline understands, in envelope order.
pub const METRIC_KEYS: [&str; 5] = ["temperature", "humidity", "pressure", "wind_speed", "rainfall"];

pub const DEFAULT_STATUS: &str = "OK";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub city: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            city: "Unknown".to_string(),
            region: "Unknown".to_string(),
            country: "Egypt".to_string(),
            lat: 0.0,
            lon: 0.0,
            altitude: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDescriptor {
    pub sensor_type: String,
    pub model: String,
    pub manufacturer: String,
    pub firmware_version: String,
    pub signal_strength: f64,
    pub reading_quality: f64,
}

impl Default for SensorDescriptor {
    fn default() -> Self {
        Self {
            sensor_type: "weather_station".to_string(),
            model: "unknown".to_string(),
            manufacturer: "unknown".to_string(),
            firmware_version: "unknown".to_string(),
            signal_strength: -70.0,
            reading_quality: 1.0,
        }
    }
}

/// A sensor reading after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    /// Timestamp exactly as the producer sent it.
    pub raw_timestamp: String,
    pub status: String,
    /// Only the keys in [`METRIC_KEYS`] that carried a number.
    pub metrics: BTreeMap<String, f64>,
    pub wind_direction: Option<String>,
    pub location: Location,
    pub sensor: SensorDescriptor,
    /// Broker receipt time, when the reading came through the broker.
    pub received_at: Option<DateTime<Utc>>,
}

impl Reading {
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    pub fn is_anomaly(&self) -> bool {
        self.status != DEFAULT_STATUS
    }

    /// Normalize a broker message, carrying over its receipt time.
    pub fn from_message(message: &Message) -> Result<Self, ReadingError> {
        let mut reading = normalize(&message.payload)?;
        reading.received_at = Some(message.received_at);
        Ok(reading)
    }
}

/// Map either wire shape into a [`Reading`].
///
/// `sensor_id` and `timestamp` are required; everything else falls back to
/// the defaults above.
pub fn normalize(payload: &Value) -> Result<Reading, ReadingError> {
    let envelope = payload.as_object().ok_or(ReadingError::NotAnObject)?;

    let sensor_id = non_empty_str(envelope, "sensor_id").ok_or(ReadingError::MissingField("sensor_id"))?;
    let raw_timestamp = non_empty_str(envelope, "timestamp").ok_or(ReadingError::MissingField("timestamp"))?;
    let timestamp =
        parse_timestamp(raw_timestamp).ok_or_else(|| ReadingError::InvalidTimestamp(raw_timestamp.to_string()))?;

    let values = match envelope.get("value") {
        Some(Value::Object(nested)) => nested,
        _ => envelope,
    };
    let metrics = METRIC_KEYS
        .iter()
        .filter_map(|key| values.get(*key).and_then(Value::as_f64).map(|v| (key.to_string(), v)))
        .collect();
    let wind_direction = values
        .get("wind_direction")
        .and_then(Value::as_str)
        .map(str::to_string);

    let place = match envelope.get("metadata") {
        Some(Value::Object(metadata)) => metadata,
        _ => envelope,
    };
    let location_defaults = Location::default();
    let location = Location {
        city: str_or(place, "city", &location_defaults.city),
        region: str_or(place, "region", &location_defaults.region),
        country: str_or(place, "country", &location_defaults.country),
        lat: f64_or(place, "lat", location_defaults.lat),
        lon: f64_or(place, "lon", location_defaults.lon),
        altitude: f64_or(place, "altitude", location_defaults.altitude),
    };

    let sensor_defaults = SensorDescriptor::default();
    let sensor = SensorDescriptor {
        sensor_type: str_or(envelope, "sensor_type", &sensor_defaults.sensor_type),
        model: str_or(envelope, "sensor_model", &sensor_defaults.model),
        manufacturer: str_or(envelope, "manufacturer", &sensor_defaults.manufacturer),
        firmware_version: str_or(envelope, "firmware_version", &sensor_defaults.firmware_version),
        signal_strength: f64_or(envelope, "signal_strength", sensor_defaults.signal_strength),
        reading_quality: f64_or(envelope, "reading_quality", sensor_defaults.reading_quality),
    };

    Ok(Reading {
        sensor_id: sensor_id.to_string(),
        timestamp,
        raw_timestamp: raw_timestamp.to_string(),
        status: str_or(envelope, "status", DEFAULT_STATUS),
        metrics,
        wind_direction,
        location,
        sensor,
        received_at: None,
    })
}

/// RFC 3339 with `Z` or an offset, or a naive ISO-8601 stamp taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn str_or(obj: &Map<String, Value>, key: &str, default: &str) -> String {
    obj.get(key).and_then(Value::as_str).unwrap_or(default).to_string()
}

fn f64_or(obj: &Map<String, Value>, key: &str, default: f64) -> f64 {
    obj.get(key).and_then(Value::as_f64).unwrap_or(default)
}
