//! Header-to-field mapping: suggestion, caller overrides, and validation.
//!
//! The suggester is advisory only. It walks headers in file order, asks the
//! registry for a synonym match, and leaves everything else ignored. A later
//! header that matches an already-claimed field stays ignored rather than
//! fanning in. Validation is the gate: it runs when a preview is built (to
//! set the `committable` flag) and again immediately before a commit, so a
//! stale or hand-edited mapping can never regress past the rules.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{error::ImportError, registry};

/// Where a single source header lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "key")]
pub enum MappingTarget {
    /// Mapped to the canonical field with this key.
    Field(String),
    /// Preserved verbatim under `customFields` at commit time.
    Ignore,
}

impl MappingTarget {
    pub fn field_key(&self) -> Option<&str> {
        match self {
            MappingTarget::Field(key) => Some(key.as_str()),
            MappingTarget::Ignore => None,
        }
    }
}

/// Header → target assignment. BTreeMap keeps serialized output stable.
pub type FieldMapping = BTreeMap<String, MappingTarget>;

/// Greedy, header-order suggestion pass. First header to match a canonical
/// field claims it; unmatched headers default to ignore.
pub fn suggest_mapping(headers: &[String]) -> FieldMapping {
    let mut mapping = FieldMapping::new();
    let mut claimed: Vec<&str> = Vec::new();
    for header in headers {
        let target = match registry::lookup_by_synonym(header) {
            Some(field) if !claimed.contains(&field.key) => {
                claimed.push(field.key);
                MappingTarget::Field(field.key.to_string())
            }
            _ => MappingTarget::Ignore,
        };
        mapping.insert(header.clone(), target);
    }
    mapping
}

/// Checks a mapping for commit-readiness. Returns every violated rule, in
/// rule order: fan-in first, then the identity floor.
pub fn mapping_issues(mapping: &FieldMapping) -> Vec<ImportError> {
    let mut issues = Vec::new();

    let by_target = mapping
        .iter()
        .filter_map(|(header, target)| target.field_key().map(|key| (key, header.clone())))
        .into_group_map();
    for (target, mut headers) in by_target
        .into_iter()
        .sorted_by(|(a, _), (b, _)| a.cmp(b))
        .filter(|(_, headers)| headers.len() > 1)
    {
        headers.sort();
        issues.push(ImportError::AmbiguousMapping {
            target: target.to_string(),
            headers,
        });
    }

    let has_identity = mapping
        .values()
        .filter_map(MappingTarget::field_key)
        .any(registry::is_identity_field);
    if !has_identity {
        issues.push(ImportError::NoIdentityFieldMapped);
    }

    issues
}

/// Pass/fail form of [`mapping_issues`]: the first violated rule aborts.
pub fn validate_mapping(mapping: &FieldMapping) -> Result<(), ImportError> {
    match mapping_issues(mapping).into_iter().next() {
        Some(issue) => Err(issue),
        None => Ok(()),
    }
}

/// Applies `Header=fieldKey` and ignore overrides on top of a suggested
/// mapping. Unknown headers and unknown field keys are caller mistakes and
/// fail fast rather than being dropped silently.
pub fn apply_overrides(
    mapping: &mut FieldMapping,
    assignments: &[(String, String)],
    ignores: &[String],
) -> Result<()> {
    for (header, key) in assignments {
        if !mapping.contains_key(header) {
            return Err(anyhow!("Header '{header}' does not exist in the file"));
        }
        if registry::field_by_key(key).is_none() {
            return Err(anyhow!(
                "'{key}' is not a canonical field; run the fields command to list targets"
            ));
        }
        mapping.insert(header.clone(), MappingTarget::Field(key.clone()));
    }
    for header in ignores {
        if !mapping.contains_key(header) {
            return Err(anyhow!("Header '{header}' does not exist in the file"));
        }
        mapping.insert(header.clone(), MappingTarget::Ignore);
    }
    Ok(())
}

/// Parses a repeatable `Header=fieldKey` CLI assignment.
pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
    let (header, key) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected 'Header=fieldKey', got '{raw}'"))?;
    let header = header.trim();
    let key = key.trim();
    if header.is_empty() || key.is_empty() {
        return Err(anyhow!("Expected 'Header=fieldKey', got '{raw}'"));
    }
    Ok((header.to_string(), key.to_string()))
}
