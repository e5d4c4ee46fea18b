//! Tabular decoding for CSV and Excel visitor exports.
//!
//! All file ingestion flows through [`TabularReader`]. It provides:
//!
//! - **Format detection**: extension/MIME based, with a content-sniff
//!   fallback (ZIP magic for `.xlsx`, OLE2 magic for `.xls`, else CSV).
//! - **Size ceiling**: declared length is checked against the 100 MB import
//!   limit before any decoding starts.
//! - **Pull-based rows**: CSV rows are streamed record-by-record so a
//!   preview can stop after its sample bound without touching the rest of
//!   the file.
//! - **Header hygiene**: header names are trimmed, blanks get synthetic
//!   names, and duplicates are suffixed (`Email`, `Email (2)`) instead of
//!   silently overwriting each other.
//! - **Encoding**: CSV input decoding via `encoding_rs`, defaulting to UTF-8.

use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader as _, open_workbook_auto};
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::error::ImportError;

/// Hard ceiling on declared input size: 100 MB.
pub const MAX_IMPORT_BYTES: u64 = 100 * 1024 * 1024;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const SNIFF_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    Csv,
    Excel,
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Checks the declared byte length against [`MAX_IMPORT_BYTES`]. Cheap by
/// construction: never reads the stream.
pub fn check_size_limit(declared_len: u64) -> Result<(), ImportError> {
    if declared_len > MAX_IMPORT_BYTES {
        return Err(ImportError::SizeLimitExceeded {
            size: declared_len,
            limit: MAX_IMPORT_BYTES,
        });
    }
    Ok(())
}

/// Resolves the format from extension and declared MIME, falling back to a
/// content sniff of the first bytes when neither is conclusive.
pub fn detect_format(
    path: &Path,
    declared_mime: Option<&str>,
) -> Result<TabularFormat, ImportError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("csv") | Some("tsv") => return Ok(TabularFormat::Csv),
        Some("xls") | Some("xlsx") => return Ok(TabularFormat::Excel),
        _ => {}
    }
    if let Some(mime) = declared_mime {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("text/csv") || mime.contains("text/tab-separated") {
            return Ok(TabularFormat::Csv);
        }
        if mime.contains("ms-excel") || mime.contains("spreadsheetml.sheet") {
            return Ok(TabularFormat::Excel);
        }
    }
    sniff_format(path, extension.is_none())
}

/// Content sniff for files the extension/MIME checks could not place.
/// Excel containers are recognizable by magic bytes anywhere; the CSV
/// fallback only applies to extensionless uploads, so `report.pdf` is
/// rejected instead of being fed to the CSV parser.
fn sniff_format(path: &Path, allow_csv_fallback: bool) -> Result<TabularFormat, ImportError> {
    let mut prefix = [0u8; SNIFF_BYTES];
    let read = File::open(path)
        .and_then(|mut file| file.read(&mut prefix))
        .map_err(|err| ImportError::decode(format!("reading {path:?}: {err}")))?;
    let prefix = &prefix[..read];

    // xlsx is a ZIP container; legacy xls is an OLE2 compound document.
    if prefix.starts_with(b"PK\x03\x04") || prefix.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return Ok(TabularFormat::Excel);
    }
    if allow_csv_fallback && !prefix.is_empty() && prefix.iter().all(|byte| *byte != 0) {
        debug!("Content sniff for {path:?} fell back to CSV");
        return Ok(TabularFormat::Csv);
    }
    Err(ImportError::UnsupportedFormat {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
    })
}

enum RowSource {
    Csv {
        reader: csv::Reader<Box<dyn Read>>,
        encoding: &'static Encoding,
    },
    // calamine materializes the sheet; the size ceiling bounds the cost.
    Excel {
        rows: std::vec::IntoIter<Vec<String>>,
    },
}

/// A decoded tabular file: cleaned header names plus a pull-based row
/// sequence. Rows are padded or truncated to the header width.
pub struct TabularReader {
    headers: Vec<String>,
    rows: RowSource,
}

impl TabularReader {
    /// Opens `path`, enforcing the size ceiling and resolving the format
    /// before any row decoding.
    pub fn open(
        path: &Path,
        declared_mime: Option<&str>,
        delimiter: Option<u8>,
        encoding_label: Option<&str>,
    ) -> Result<Self> {
        let metadata =
            std::fs::metadata(path).with_context(|| format!("Reading metadata for {path:?}"))?;
        check_size_limit(metadata.len())?;
        match detect_format(path, declared_mime)? {
            TabularFormat::Csv => {
                let encoding = resolve_encoding(encoding_label)?;
                let file: Box<dyn Read> = Box::new(BufReader::new(
                    File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
                ));
                Self::from_csv_reader(file, resolve_delimiter(path, delimiter), encoding)
            }
            TabularFormat::Excel => Self::from_workbook(path),
        }
    }

    /// Builds a streaming reader over already-opened CSV bytes. Used by
    /// [`open`](Self::open) and directly by callers that meter their own I/O.
    pub fn from_csv_reader(
        input: Box<dyn Read>,
        delimiter: u8,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .double_quote(true)
            .flexible(true)
            .from_reader(input);
        let raw = reader
            .byte_headers()
            .map_err(|err| ImportError::decode(format!("reading header row: {err}")))?
            .iter()
            .map(|field| decode_bytes(field, encoding))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            headers: dedup_headers(&raw),
            rows: RowSource::Csv { reader, encoding },
        })
    }

    fn from_workbook(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|err| ImportError::decode(format!("opening workbook {path:?}: {err}")))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ImportError::decode("workbook has no sheets"))?
            .map_err(|err| ImportError::decode(format!("reading first sheet: {err}")))?;
        let mut rows = range.rows().map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect::<Vec<String>>()
        });
        let raw = rows
            .next()
            .ok_or_else(|| ImportError::decode("sheet has no header row"))?;
        Ok(Self {
            headers: dedup_headers(&raw),
            rows: RowSource::Excel {
                rows: rows.collect::<Vec<_>>().into_iter(),
            },
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Pulls the next data row, or `None` at end of input. The returned row
    /// always has exactly `headers().len()` cells. Row errors carry no
    /// position of their own; callers that count rows attach the index.
    pub fn next_row(&mut self) -> Option<Result<Vec<String>>> {
        let width = self.headers.len();
        match &mut self.rows {
            RowSource::Csv { reader, encoding } => {
                let mut record = csv::ByteRecord::new();
                match reader.read_byte_record(&mut record) {
                    Ok(false) => None,
                    Ok(true) => {
                        let decoded = record
                            .iter()
                            .map(|field| decode_bytes(field, encoding))
                            .collect::<Result<Vec<_>>>()
                            .map(|cells| pad_row(cells, width));
                        Some(decoded)
                    }
                    Err(err) => {
                        Some(Err(ImportError::decode(format!("malformed record: {err}")).into()))
                    }
                }
            }
            RowSource::Excel { rows } => rows.next().map(|cells| Ok(pad_row(cells, width))),
        }
    }

    pub fn rows(&mut self) -> impl Iterator<Item = Result<Vec<String>>> + '_ {
        std::iter::from_fn(move || self.next_row())
    }
}

fn pad_row(mut cells: Vec<String>, width: usize) -> Vec<String> {
    // resize both pads short rows and drops cells past the header width
    cells.resize(width, String::new());
    cells
}

fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(ImportError::decode(format!(
            "invalid {} byte sequence",
            encoding.name()
        ))
        .into())
    } else {
        Ok(text.into_owned())
    }
}

/// Trims headers, names blank ones `Column N`, and suffixes repeats so that
/// duplicate source headers keep distinct cells instead of clobbering.
/// A source file may itself contain a header that looks like a suffixed
/// name (`Email (2)`), so candidates are checked against every name already
/// assigned, not just repeat counts, until a free one is found.
pub fn dedup_headers(raw: &[String]) -> Vec<String> {
    let mut assigned: HashSet<String> = HashSet::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    raw.iter()
        .enumerate()
        .map(|(idx, header)| {
            let trimmed = header.trim();
            let base = if trimmed.is_empty() {
                format!("Column {}", idx + 1)
            } else {
                trimmed.to_string()
            };
            let mut name = base.clone();
            while !assigned.insert(name.clone()) {
                let count = counts.entry(base.clone()).or_insert(1);
                *count += 1;
                name = format!("{base} ({count})");
            }
            name
        })
        .collect()
}
