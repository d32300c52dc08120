use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::broker::Broker;

const WIND_DIRECTIONS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    pub sensor_id: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
    pub model: String,
    pub manufacturer: String,
    pub firmware_version: String,
}

impl SimulatedSensor {
    pub fn new(sensor_id: &str, city: &str, region: &str, lat: f64, lon: f64, altitude: f64) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            city: city.to_string(),
            region: region.to_string(),
            country: "Egypt".to_string(),
            lat,
            lon,
            altitude,
            model: "WST-5000".to_string(),
            manufacturer: "AcmeWeather".to_string(),
            firmware_version: "v2.1.0".to_string(),
        }
    }
}

/// Accepted vs. dropped publishes for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub accepted: usize,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct SensorSimulator {
    sensors: Vec<SimulatedSensor>,
    rng: StdRng,
    seq: u64,
    spike_probability: f64,
}

impl SensorSimulator {
    pub fn new(sensors: Vec<SimulatedSensor>, seed: u64) -> Self {
        Self {
            sensors,
            rng: StdRng::seed_from_u64(seed),
            seq: 0,
            spike_probability: 0.05,
        }
    }

    /// The first `count` stations of the stock fleet, cycling when `count`
    /// exceeds the fleet size.
    pub fn with_fleet(count: usize, seed: u64) -> Self {
        let fleet = [
            ("CAI", "Cairo", "Cairo Governorate", 30.0444, 31.2357, 23.0),
            ("ALX", "Alexandria", "Alexandria Governorate", 31.2001, 29.9187, 5.0),
            ("GIZ", "Giza", "Giza Governorate", 30.0131, 31.2089, 19.0),
            ("ASW", "Aswan", "Aswan Governorate", 24.0889, 32.8998, 194.0),
            ("LXR", "Luxor", "Luxor Governorate", 25.6872, 32.6396, 89.0),
        ];
        let sensors = (0..count.max(1))
            .map(|i| {
                let (code, city, region, lat, lon, alt) = fleet[i % fleet.len()];
                SimulatedSensor::new(&format!("WS_{code}_{:03}", i + 1), city, region, lat, lon, alt)
            })
            .collect();
        Self::new(sensors, seed)
    }

    pub fn with_spike_probability(mut self, probability: f64) -> Self {
        self.spike_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn sensors(&self) -> &[SimulatedSensor] {
        &self.sensors
    }

    /// Next envelope, round-robin over the fleet. `None` for an empty fleet.
    pub fn next_envelope(&mut self) -> Option<Value> {
        if self.sensors.is_empty() {
            return None;
        }
        let sensor = &self.sensors[(self.seq as usize) % self.sensors.len()];
        self.seq += 1;

        let mut temperature: f64 = self.rng.gen_range(5.0..43.0);
        let mut status = "OK";
        if self.rng.gen_bool(self.spike_probability) {
            temperature *= 1.3;
            status = "SPIKE";
        }
        let round = |v: f64| (v * 100.0).round() / 100.0;
        let direction = WIND_DIRECTIONS.choose(&mut self.rng).copied().unwrap_or("N");
        let reading_quality = if status == "OK" {
            self.rng.gen_range(0.90..1.0)
        } else {
            self.rng.gen_range(0.60..0.85)
        };

        Some(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "sensor_id": sensor.sensor_id,
            "sensor_type": "weather_station",
            "value": {
                "temperature": round(temperature),
                "humidity": round(self.rng.gen_range(15.0..95.0)),
                "pressure": round(self.rng.gen_range(975.0..1045.0)),
                "wind_speed": round(self.rng.gen_range(0.0..55.0)),
                "wind_direction": direction,
                "rainfall": round(self.rng.gen_range(0.0..5.0)),
            },
            "unit": "C/%/hPa",
            "metadata": {
                "city": sensor.city,
                "region": sensor.region,
                "country": sensor.country,
                "lat": sensor.lat,
                "lon": sensor.lon,
                "altitude": sensor.altitude,
            },
            "status": status,
            "is_simulated": true,
            "seq": self.seq,
            "firmware_version": sensor.firmware_version,
            "sensor_model": sensor.model,
            "manufacturer": sensor.manufacturer,
            "signal_strength": round(self.rng.gen_range(-80.0..-50.0)),
            "reading_quality": round(reading_quality),
        }))
    }

    /// Publish `count` envelopes back to back.
    pub fn publish_batch(&mut self, broker: &Broker, topic: &str, count: usize) -> PublishReport {
        let mut report = PublishReport::default();
        for _ in 0..count {
            let Some(envelope) = self.next_envelope() else {
                break;
            };
            if broker.publish(topic, envelope) {
                report.accepted += 1;
            } else {
                report.dropped += 1;
            }
        }
        debug!(topic, accepted = report.accepted, dropped = report.dropped, "Batch published");
        report
    }

    /// Publish one reading per sensor every `interval` until `stop` is set.
    pub fn run(&mut self, broker: &Broker, topic: &str, interval: Duration, stop: &AtomicBool) -> PublishReport {
        info!(topic, sensors = self.sensors.len(), "Simulator started");
        let mut total = PublishReport::default();
        while !stop.load(Ordering::SeqCst) {
            let round = self.publish_batch(broker, topic, self.sensors.len());
            total.accepted += round.accepted;
            total.dropped += round.dropped;
            thread::sleep(interval);
        }
        info!(topic, accepted = total.accepted, dropped = total.dropped, "Simulator stopped");
        total
    }
}
