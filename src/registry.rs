//! Canonical schema registry: the fixed list of target fields and their
//! recognized header synonyms.
//!
//! The registry is the single source of truth for which canonical fields
//! exist, which of them count as identity fields, and which incoming header
//! spellings resolve to which field. Lookup is case-insensitive and ignores
//! whitespace and punctuation, so `"Phone No."`, `"phone_number"`, and
//! `"Contact Number"` all land on `phoneNumber`. New canonical fields are
//! additive; neither the decoder nor the merge engine enumerates them.

use std::{collections::HashMap, sync::OnceLock};

use serde::Serialize;

/// A fixed target attribute in the internal schema.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalField {
    pub key: &'static str,
    pub label: &'static str,
    /// Marks membership in the identity group used for merge-key derivation.
    /// Validation requires at least one identity field mapped, not all.
    pub required: bool,
    pub synonyms: &'static [&'static str],
}

/// Identity fields, in merge-key precedence order (see `record::identity_key`).
pub const IDENTITY_FIELD_KEYS: &[&str] = &["email", "phoneNumber", "fullName"];

static FIELDS: &[CanonicalField] = &[
    CanonicalField {
        key: "fullName",
        label: "Full Name",
        required: true,
        synonyms: &["name", "full name", "visitor name", "contact name", "person"],
    },
    CanonicalField {
        key: "email",
        label: "Email",
        required: true,
        synonyms: &["email", "e-mail", "email address", "mail", "email id"],
    },
    CanonicalField {
        key: "phoneNumber",
        label: "Phone Number",
        required: true,
        synonyms: &[
            "phone",
            "phone number",
            "phone no",
            "contact number",
            "mobile",
            "mobile number",
            "telephone",
            "cell",
        ],
    },
    CanonicalField {
        key: "company",
        label: "Company",
        required: false,
        synonyms: &["company", "organization", "organisation", "employer", "firm"],
    },
    CanonicalField {
        key: "city",
        label: "City",
        required: false,
        synonyms: &["city", "town"],
    },
    CanonicalField {
        key: "state",
        label: "State",
        required: false,
        synonyms: &["state", "province", "region"],
    },
    CanonicalField {
        key: "country",
        label: "Country",
        required: false,
        synonyms: &["country", "nation"],
    },
    CanonicalField {
        key: "pincode",
        label: "Pincode",
        required: false,
        synonyms: &["pincode", "pin code", "zip", "zip code", "postal code", "postcode"],
    },
];

static SYNONYM_INDEX: OnceLock<HashMap<String, &'static CanonicalField>> = OnceLock::new();

fn synonym_index() -> &'static HashMap<String, &'static CanonicalField> {
    SYNONYM_INDEX.get_or_init(|| {
        let mut index = HashMap::new();
        for field in FIELDS {
            index.insert(normalize_header(field.key), field);
            index.insert(normalize_header(field.label), field);
            for synonym in field.synonyms {
                index.insert(normalize_header(synonym), field);
            }
        }
        index
    })
}

/// All canonical fields, in registry order.
pub fn canonical_fields() -> &'static [CanonicalField] {
    FIELDS
}

pub fn field_by_key(key: &str) -> Option<&'static CanonicalField> {
    FIELDS.iter().find(|field| field.key == key)
}

pub fn is_identity_field(key: &str) -> bool {
    IDENTITY_FIELD_KEYS.contains(&key)
}

/// Resolves a raw file header to a canonical field, or `None` when the
/// header has no registered synonym.
pub fn lookup_by_synonym(header: &str) -> Option<&'static CanonicalField> {
    synonym_index().get(&normalize_header(header)).copied()
}

/// Lowercases and strips everything except letters and digits, collapsing
/// `"Phone No."` and `"phone_number"` onto the same lookup key.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}
