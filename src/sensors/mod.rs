mod parsing;
mod query;

pub use parsing::parse_series;
pub use query::{DateRange, Fetcher};

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::registry::SensorRecord;

/// One observation. Values that could not be coerced are NaN.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub level: f64,
    pub battery: f64,
    pub signal: f64,
}

/// Hardware description sent along with the readings.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
}

/// Readings for one site, sorted by timestamp. Never empty.
#[derive(Serialize, Debug, Clone)]
pub struct SensorTimeSeries {
    readings: Vec<Reading>,
    device: DeviceInfo,
}

impl SensorTimeSeries {
    /// Returns `None` for an empty set of readings.
    pub fn new(mut readings: Vec<Reading>, device: DeviceInfo) -> Option<Self> {
        if readings.is_empty() {
            return None;
        }
        // Stable, so readings sharing a timestamp keep response order.
        readings.sort_by_key(|r| r.timestamp);
        Some(SensorTimeSeries { readings, device })
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn first(&self) -> &Reading {
        &self.readings[0]
    }

    pub fn last(&self) -> &Reading {
        &self.readings[self.readings.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// NaN count per API column (`nivel`, `bateria`, `senal`).
    pub fn invalid_counts(&self) -> [(&'static str, usize); 3] {
        let mut counts = [("nivel", 0), ("bateria", 0), ("senal", 0)];
        for reading in &self.readings {
            for ((_, count), value) in counts.iter_mut().zip([reading.level, reading.battery, reading.signal]) {
                if value.is_nan() {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Log, at debug, how many cells of each column could not be read.
    pub fn log_invalid_cells(&self, record: &SensorRecord) {
        for (column, count) in self.invalid_counts() {
            if count > 0 {
                log::debug!(
                    "{name} (id {id}): {count} non-numeric values in column '{column}' replaced by NaN",
                    name = record.name,
                    id = record.site_id
                );
            }
        }
    }

    /// Apply `f` to every reading, keeping order and device info.
    pub fn map_readings<F>(&self, f: F) -> SensorTimeSeries
    where
        F: Fn(&Reading) -> Reading,
    {
        SensorTimeSeries {
            readings: self.readings.iter().map(f).collect(),
            device: self.device.clone(),
        }
    }
}

/// Why a site produced no series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("no data in the requested window")]
    NoData,
    #[error("request failed with status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Network(String),
    #[error("could not decode response: {0}")]
    Parse(String),
}
