use std::collections::HashMap;

use super::{non_empty, parse_number, Registry, RegistryError, SensorRecord, SiteId, SiteMetadata};
use crate::tabular::{decode_text, parse_document};

struct Row<'a> {
    columns: &'a HashMap<String, usize>,
    fields: &'a [String],
}

impl Row<'_> {
    // Missing columns and short rows both read as null.
    fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .get(column)
            .and_then(|&i| self.fields.get(i))
            .map(String::as_str)
    }
}

pub(super) fn parse_registry(bytes: &[u8], group: Option<&str>) -> Result<Registry, RegistryError> {
    let text = decode_text(bytes);
    let (header, rows) = parse_document(&text).ok_or_else(|| RegistryError::Empty("CSV".to_string()))?;

    let columns: HashMap<String, usize> = header
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name.to_lowercase(), i))
        .collect();
    if !columns.contains_key("nombre") {
        return Err(RegistryError::MissingColumn("nombre"));
    }
    if !columns.contains_key("fdx_id") {
        return Err(RegistryError::MissingColumn("fdx_id"));
    }
    if group.is_some() && !columns.contains_key("grupo") {
        return Err(RegistryError::MissingColumn("grupo"));
    }

    let mut registry = Registry::default();
    for fields in &rows {
        let row = Row { columns: &columns, fields };

        if let Some(group) = group {
            if row.get("grupo").map(str::trim) != Some(group) {
                continue;
            }
        }
        let Some(name) = non_empty(row.get("nombre")) else {
            continue;
        };
        let Some(site_id) = non_empty(row.get("fdx_id")) else {
            log::warn!("registry row '{name}' has no fdx_id, ignoring it");
            continue;
        };

        registry.insert(SensorRecord {
            name,
            site_id: SiteId::new(&site_id),
            site: SiteMetadata {
                site_code: non_empty(row.get("sitecode")),
                owner: non_empty(row.get("propietario")),
                abbreviation: non_empty(row.get("abrev")),
                lon: parse_number(row.get("lon")),
                lat: parse_number(row.get("lat")),
                gauge_zero: parse_number(row.get("cero_ign")),
                river: non_empty(row.get("rio")),
                location: non_empty(row.get("ubicacion")),
                group: non_empty(row.get("grupo")),
            },
        });
    }

    Ok(registry)
}
