//! Sensor registry: the static table of stations a report covers.
mod csv;
mod json;

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("could not read registry {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("registry {0} is empty")]
    Empty(String),
    #[error("registry is missing the '{0}' column")]
    MissingColumn(&'static str),
    #[error("invalid JSON registry: {0}")]
    Json(String),
}

/// External id of a site in the telemetry API.
///
/// Integer ids compare numerically, anything else lexicographically, so
/// `"9" < "10"` holds the way a numeric column sorts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Normalises float renderings of integers (`"30.0"` becomes `"30"`).
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(value) = raw.parse::<f64>() {
            if value.is_finite() && value.fract() == 0.0 && !raw.chars().all(|c| c.is_ascii_digit()) {
                return SiteId(format!("{}", value as i64));
            }
        }
        SiteId(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for SiteId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SiteId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Location metadata shown on the detail pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteMetadata {
    pub site_code: Option<String>,
    pub owner: Option<String>,
    pub abbreviation: Option<String>,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    /// Gauge zero above the IGN datum.
    pub gauge_zero: Option<f64>,
    pub river: Option<String>,
    pub location: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    pub name: String,
    pub site_id: SiteId,
    pub site: SiteMetadata,
}

/// Sensors keyed by name, in file order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    sensors: Vec<SensorRecord>,
}

impl Registry {
    /// A repeated name replaces the earlier record but keeps its position.
    pub fn insert(&mut self, record: SensorRecord) {
        match self.sensors.iter_mut().find(|s| s.name == record.name) {
            Some(existing) => *existing = record,
            None => self.sensors.push(record),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SensorRecord> {
        self.sensors.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorRecord> {
        self.sensors.iter()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl FromIterator<SensorRecord> for Registry {
    fn from_iter<I: IntoIterator<Item = SensorRecord>>(iter: I) -> Self {
        let mut registry = Registry::default();
        for record in iter {
            registry.insert(record);
        }
        registry
    }
}

/// Load a registry, choosing the format by extension (`.json`, anything else is CSV).
pub fn load(path: &Path, group: Option<&str>) -> Result<Registry, RegistryError> {
    let bytes = std::fs::read(path).map_err(|source| RegistryError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let registry = if is_json {
        json::parse_registry(&bytes, group)?
    } else {
        csv::parse_registry(&bytes, group)?
    };

    log::info!(
        "loaded {count} sensors from {path} (group: {group})",
        count = registry.len(),
        path = path.display(),
        group = group.unwrap_or("all")
    );
    Ok(registry)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_number(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse().ok())
}
