//! Visitor records, identity-key derivation, and field-level merge.
//!
//! The identity key is a deliberate best-effort merge heuristic, not a
//! strong identity: normalized email when present, else phone digits, else
//! the normalized full name. Two unrelated people sharing a common name and
//! nothing else can merge within a tenant; the key never crosses tenants.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The canonical unit stored in the shared dataset. `fields` holds canonical
/// values keyed by registry key; `custom_fields` holds unmapped source
/// columns keyed by their original header text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub fields: BTreeMap<String, String>,
    pub custom_fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VisitorRecord {
    pub fn new(
        owner_id: &str,
        fields: BTreeMap<String, String>,
        custom_fields: BTreeMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            fields,
            custom_fields,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn field(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }

    /// Field-by-field merge: a non-empty incoming value overwrites, an empty
    /// one never clears. Custom fields merge key-wise under the same rule.
    pub fn merge_from(
        &mut self,
        fields: &BTreeMap<String, String>,
        custom_fields: &BTreeMap<String, String>,
    ) {
        for (key, value) in fields {
            if !value.trim().is_empty() {
                self.fields.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in custom_fields {
            if !value.trim().is_empty() {
                self.custom_fields.insert(key.clone(), value.clone());
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Derives the merge key for a transformed row, or `None` when every
/// identity field is empty (the skip-empty rule).
pub fn identity_key(fields: &BTreeMap<String, String>) -> Option<String> {
    let email = normalize_email(fields.get("email").map(String::as_str).unwrap_or(""));
    if !email.is_empty() {
        return Some(format!("email:{email}"));
    }
    let phone = normalize_phone(fields.get("phoneNumber").map(String::as_str).unwrap_or(""));
    if !phone.is_empty() {
        return Some(format!("phone:{phone}"));
    }
    let name = normalize_name(fields.get("fullName").map(String::as_str).unwrap_or(""));
    if !name.is_empty() {
        return Some(format!("name:{name}"));
    }
    None
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Keeps digits only, so `+1 (555) 010-2030` and `15550102030` collide.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
