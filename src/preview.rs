//! Bounded import previews: file shape, suggested mapping, and sample rows
//! without committing anything.
//!
//! A preview pulls at most [`DEFAULT_SAMPLE_ROWS`] data rows from the
//! decoder and stops, so building one against a 100 MB export costs about
//! the same as against a small one. Preview-stage format, size, and decode
//! errors abort immediately; a partial preview would be worse than none.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    decode::TabularReader,
    mapping::{self, FieldMapping},
    registry::{self, CanonicalField},
};

pub const DEFAULT_SAMPLE_ROWS: usize = 50;

// Digest covers a bounded prefix so identity stays cheap on large files.
const DIGEST_PREFIX_BYTES: u64 = 64 * 1024;

/// Name, declared size, and a bounded content digest identifying the
/// uploaded file across the preview/commit round trip.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIdentity {
    pub name: String,
    pub size: u64,
    pub digest: String,
}

/// Ephemeral, per-upload inspection artifact. Never persisted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub file: FileIdentity,
    pub headers: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    pub suggested_mapping: FieldMapping,
    pub available_fields: Vec<CanonicalField>,
    pub committable: bool,
    pub issues: Vec<String>,
}

pub struct PreviewOptions<'a> {
    pub sample_rows: usize,
    pub declared_mime: Option<&'a str>,
    pub delimiter: Option<u8>,
    pub encoding_label: Option<&'a str>,
}

impl Default for PreviewOptions<'_> {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            declared_mime: None,
            delimiter: None,
            encoding_label: None,
        }
    }
}

/// Builds a preview for `path`: headers, bounded samples, the suggested
/// mapping, and whether that mapping is committable as-is.
pub fn build_preview(path: &Path, options: &PreviewOptions) -> Result<ImportPreview> {
    let mut reader = TabularReader::open(
        path,
        options.declared_mime,
        options.delimiter,
        options.encoding_label,
    )?;
    let headers = reader.headers().to_vec();

    let mut sample_rows = Vec::new();
    for row in reader.rows() {
        if sample_rows.len() >= options.sample_rows {
            break;
        }
        sample_rows.push(row?);
    }

    let suggested_mapping = mapping::suggest_mapping(&headers);
    let issues: Vec<String> = mapping::mapping_issues(&suggested_mapping)
        .iter()
        .map(|issue| issue.to_string())
        .collect();
    let committable = issues.is_empty();

    let preview = ImportPreview {
        file: file_identity(path)?,
        headers,
        sample_rows,
        suggested_mapping,
        available_fields: registry::canonical_fields().to_vec(),
        committable,
        issues,
    };
    info!(
        "Previewed {:?}: {} column(s), {} sample row(s), committable={}",
        path,
        preview.headers.len(),
        preview.sample_rows.len(),
        preview.committable
    );
    Ok(preview)
}

fn file_identity(path: &Path) -> Result<FileIdentity> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("Reading metadata for {path:?}"))?;
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut prefix = BufReader::new(file).take(DIGEST_PREFIX_BYTES);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = prefix
            .read(&mut buffer)
            .with_context(|| format!("Hashing {path:?}"))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    hasher.update(metadata.len().to_le_bytes());
    Ok(FileIdentity {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        size: metadata.len(),
        digest: format!("{:x}", hasher.finalize()),
    })
}
