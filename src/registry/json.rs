use serde::Deserialize;
use serde_aux::prelude::*;
use serde_json::{Map, Value};

use super::{non_empty, Registry, RegistryError, SensorRecord, SiteId, SiteMetadata};
use crate::tabular::decode_text;

#[derive(Deserialize, Debug)]
struct JsonRecord {
    nombre: Option<String>,
    #[serde(default)]
    fdx_id: Option<Value>,
    #[serde(default)]
    sitecode: Option<Value>,
    #[serde(default)]
    propietario: Option<String>,
    #[serde(default)]
    abrev: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    lon: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    cero_ign: Option<f64>,
    #[serde(default)]
    rio: Option<String>,
    #[serde(default)]
    ubicacion: Option<String>,
    #[serde(default)]
    grupo: Option<String>,
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => non_empty(Some(s.as_str())),
        other => Some(other.to_string()),
    }
}

/// The file holds an array whose first element maps sensor name to record.
pub(super) fn parse_registry(bytes: &[u8], group: Option<&str>) -> Result<Registry, RegistryError> {
    let text = decode_text(bytes);
    let root = serde_json::from_str::<Value>(&text).map_err(|err| RegistryError::Json(err.to_string()))?;

    let sensors: &Map<String, Value> = match &root {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| RegistryError::Empty("JSON".to_string()))?
            .as_object()
            .ok_or_else(|| RegistryError::Json("first element must be an object".to_string()))?,
        _ => return Err(RegistryError::Json("expected a top-level array".to_string())),
    };

    let mut registry = Registry::default();
    for (key, raw) in sensors {
        let record = JsonRecord::deserialize(raw)
            .map_err(|err| RegistryError::Json(format!("sensor '{key}': {err}")))?;

        let record_group = non_empty(record.grupo.as_deref());
        if let Some(group) = group {
            if record_group.as_deref() != Some(group) {
                continue;
            }
        }

        // @NOTE: The map key is the canonical name when the record omits it.
        let name = non_empty(record.nombre.as_deref()).unwrap_or_else(|| key.clone());
        let Some(site_id) = record.fdx_id.as_ref().and_then(value_to_string) else {
            log::warn!("registry entry '{name}' has no fdx_id, ignoring it");
            continue;
        };
        registry.insert(SensorRecord {
            name,
            site_id: SiteId::new(&site_id),
            site: SiteMetadata {
                site_code: record.sitecode.as_ref().and_then(value_to_string),
                owner: non_empty(record.propietario.as_deref()),
                abbreviation: non_empty(record.abrev.as_deref()),
                lon: record.lon,
                lat: record.lat,
                gauge_zero: record.cero_ign,
                river: non_empty(record.rio.as_deref()),
                location: non_empty(record.ubicacion.as_deref()),
                group: record_group,
            },
        });
    }

    Ok(registry)
}
