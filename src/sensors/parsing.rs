use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::{value::from_value, Value};

use super::{DeviceInfo, FetchError, Reading, SensorTimeSeries};

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%d/%m/%Y %H:%M:%S"];

#[derive(Deserialize, Debug)]
struct Record {
    hora: Value,
    #[serde(default = "nan", deserialize_with = "deserialize_lenient_f64")]
    nivel: f64,
    #[serde(default = "nan", deserialize_with = "deserialize_lenient_f64")]
    bateria: f64,
    #[serde(default = "nan", deserialize_with = "deserialize_lenient_f64")]
    senal: f64,
    #[serde(default)]
    marca: Value,
    #[serde(default)]
    modelo: Value,
    #[serde(default)]
    serie: Value,
}

fn nan() -> f64 {
    f64::NAN
}

fn coerce_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

// Never fails: anything that is not a number or a numeric string becomes NaN.
fn deserialize_lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_f64(&value))
}

fn metadata_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn parse_timestamp(raw: &Value) -> Option<NaiveDateTime> {
    let text = raw.as_str()?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Local).naive_local());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Turn an API response body into a sorted series.
///
/// An empty array is `NoData`. A body that is not an array of records, or a
/// record with an unreadable `hora`, fails the whole site. Bad numeric cells
/// only become NaN.
pub fn parse_series(body: &str) -> Result<SensorTimeSeries, FetchError> {
    let raw = serde_json::from_str::<Value>(body).map_err(|err| FetchError::Parse(err.to_string()))?;
    let records = from_value::<Vec<Record>>(raw).map_err(|err| FetchError::Parse(err.to_string()))?;

    let device = records
        .first()
        .map(|first| DeviceInfo {
            brand: metadata_string(&first.marca),
            model: metadata_string(&first.modelo),
            serial: metadata_string(&first.serie),
        })
        .unwrap_or_default();

    let mut readings = Vec::with_capacity(records.len());
    for (i, record) in records.into_iter().enumerate() {
        let timestamp = parse_timestamp(&record.hora)
            .ok_or_else(|| FetchError::Parse(format!("record {i}: invalid 'hora' value {}", record.hora)))?;

        readings.push(Reading {
            timestamp,
            level: record.nivel,
            battery: record.bateria,
            signal: record.senal,
        });
    }

    SensorTimeSeries::new(readings, device).ok_or(FetchError::NoData)
}
