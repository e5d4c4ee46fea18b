use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Import visitor spreadsheets safely", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Preview a CSV/Excel file: headers, sample rows, and suggested mapping
    Preview(PreviewArgs),
    /// Commit a full file into the dataset under a finalized mapping
    Commit(CommitArgs),
    /// List the canonical target fields and their recognized synonyms
    Fields(FieldsArgs),
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Input file (.csv, .tsv, .xls, .xlsx)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of sample rows to include
    #[arg(long, default_value_t = crate::preview::DEFAULT_SAMPLE_ROWS)]
    pub rows: usize,
    /// Declared MIME type, used when the extension is inconclusive
    #[arg(long)]
    pub mime: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of CSV input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Emit the preview as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CommitArgs {
    /// Input file (.csv, .tsv, .xls, .xlsx)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Dataset store file to merge into
    #[arg(short = 's', long = "store")]
    pub store: PathBuf,
    /// Owner (tenant) id the imported records belong to
    #[arg(short = 'O', long = "owner")]
    pub owner: String,
    /// Mapping overrides of the form `Header=fieldKey`
    #[arg(long = "map", action = clap::ArgAction::Append)]
    pub map: Vec<String>,
    /// Headers to force into customFields instead of a canonical field
    #[arg(long = "ignore", action = clap::ArgAction::Append)]
    pub ignore: Vec<String>,
    /// Rows per write batch
    #[arg(long = "batch-size", default_value_t = crate::commit::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Declared MIME type, used when the extension is inconclusive
    #[arg(long)]
    pub mime: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of CSV input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Emit the import result as JSON instead of a summary line
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct FieldsArgs {
    /// Emit the field list as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
