//! CLI presentation: tables for command results.

use crate::object::ManagedObject;
use crate::schema::{EntityDescription, Schema};
use crate::store::{JournalMode, StoreLocation};
use comfy_table::Table;
use std::collections::BTreeMap;

pub fn format_info(
    schema: &Schema,
    location: &StoreLocation,
    journal_mode: Option<JournalMode>,
    counts: &BTreeMap<String, usize>,
) -> String {
    let mut summary = Table::new();
    summary.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
    summary.add_row(vec!["Schema".to_string(), format!("{} v{}", schema.name, schema.version)]);
    summary.add_row(vec!["Fingerprint".to_string(), schema.fingerprint_hex()]);
    summary.add_row(vec!["Location".to_string(), location.to_string()]);
    summary.add_row(vec![
        "Journal mode".to_string(),
        journal_mode.map_or_else(|| "-".to_string(), |m| m.to_string()),
    ]);

    let mut entities = Table::new();
    entities.load_preset(comfy_table::presets::UTF8_FULL);
    entities.set_header(vec!["Entity", "Attributes", "Rows"]);
    for entity in &schema.entities {
        let rows = counts.get(&entity.name).copied().unwrap_or(0);
        entities.add_row(vec![
            entity.name.clone(),
            entity.attributes.len().to_string(),
            rows.to_string(),
        ]);
    }

    format!("{}\n{}", summary, entities)
}

pub fn format_list(entity: &EntityDescription, objects: &[ManagedObject]) -> String {
    if objects.is_empty() {
        return format!("No {} objects", entity.name);
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    let mut header = vec!["ID".to_string()];
    header.extend(entity.attributes.iter().map(|a| a.name.clone()));
    table.set_header(header);

    for object in objects {
        let mut row = vec![object.id.to_hex()[..12].to_string()];
        row.extend(entity.attributes.iter().map(|a| object.value(&a.name).to_string()));
        table.add_row(row);
    }
    format!("{}\n{} object(s)", table, objects.len())
}
