//! SOC 2 framework control catalog.
//!
//! The catalog ships with the binary and is copied into the `controls` table
//! at boot. Framework controls are shared by every client and never edited.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::error::PortalError;
use super::types::Control;

const CATALOG_JSON: &str = include_str!("../../data/soc2_controls.json");

/// Namespace for deterministic framework control ids, so every deployment
/// assigns the same id to the same control code.
const CATALOG_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_3c2a_9b4e_4f7a_8c15_2e0d_b7a9_c441);

pub const CUSTOM_CATEGORY: &str = "Custom";

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    control_code: String,
    name: String,
    description: String,
    category: String,
    criteria_mapping: Option<String>,
    example_evidence: Option<String>,
}

pub fn framework_control_id(control_code: &str) -> Uuid {
    Uuid::new_v5(&CATALOG_NAMESPACE, control_code.as_bytes())
}

pub fn framework_controls() -> Result<Vec<Control>, PortalError> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(CATALOG_JSON)
        .map_err(|e| PortalError::Internal(format!("Control catalog is malformed: {e}")))?;

    let seeded_at = DateTime::<Utc>::UNIX_EPOCH;
    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| Control {
            id: framework_control_id(&entry.control_code),
            control_code: entry.control_code,
            name: entry.name,
            description: entry.description,
            category: entry.category,
            criteria_mapping: entry.criteria_mapping,
            example_evidence: entry.example_evidence,
            is_custom: false,
            sort_index: index as i32,
            created_at: seeded_at,
        })
        .collect())
}
