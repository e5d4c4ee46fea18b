pub mod cli;
pub mod commit;
pub mod decode;
pub mod error;
pub mod mapping;
pub mod preview;
pub mod record;
pub mod registry;
pub mod store;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("visitor_intake", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Preview(args) => handle_preview(&args),
        Commands::Commit(args) => handle_commit(&args),
        Commands::Fields(args) => handle_fields(&args),
    }
}

fn handle_preview(args: &cli::PreviewArgs) -> Result<()> {
    let options = preview::PreviewOptions {
        sample_rows: args.rows,
        declared_mime: args.mime.as_deref(),
        delimiter: args.delimiter,
        encoding_label: args.input_encoding.as_deref(),
    };
    let built = preview::build_preview(&args.input, &options)
        .with_context(|| format!("Previewing {:?}", args.input))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&built)?);
        return Ok(());
    }

    table::print_table(&built.headers, &built.sample_rows);
    println!();
    println!("Suggested mapping:");
    for (header, target) in &built.suggested_mapping {
        match target.field_key() {
            Some(key) => println!("  {header} -> {key}"),
            None => println!("  {header} -> (ignored, kept as custom field)"),
        }
    }
    if built.committable {
        println!("Mapping is committable as suggested.");
    } else {
        println!("Mapping needs edits before commit:");
        for issue in &built.issues {
            println!("  - {issue}");
        }
    }
    Ok(())
}

fn handle_commit(args: &cli::CommitArgs) -> Result<()> {
    let mut reader = decode::TabularReader::open(
        &args.input,
        args.mime.as_deref(),
        args.delimiter,
        args.input_encoding.as_deref(),
    )
    .with_context(|| format!("Opening {:?} for commit", args.input))?;

    let mut field_mapping = mapping::suggest_mapping(reader.headers());
    let assignments = args
        .map
        .iter()
        .map(|raw| mapping::parse_assignment(raw))
        .collect::<Result<Vec<_>>>()?;
    mapping::apply_overrides(&mut field_mapping, &assignments, &args.ignore)?;

    let mut store = store::JsonStore::open(&args.store)?;
    let mut options = commit::CommitOptions::new(&args.owner);
    options.batch_size = args.batch_size;
    let result = commit::execute_commit(&mut reader, &field_mapping, &mut store, &options)?;
    store.flush()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "{} record(s) imported, {} updated, {} skipped",
            result.inserted, result.updated, result.skipped
        );
        for row_error in &result.row_errors {
            println!("  row {}: {}", row_error.row, row_error.reason);
        }
        if let Some(reason) = &result.abort_reason {
            println!("Import stopped early: {reason}");
        }
    }
    info!(
        "Dataset {:?} now holds {} record(s)",
        args.store,
        store.len()
    );
    Ok(())
}

fn handle_fields(args: &cli::FieldsArgs) -> Result<()> {
    let fields = registry::canonical_fields();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&fields)?);
        return Ok(());
    }
    let headers = vec![
        "Key".to_string(),
        "Label".to_string(),
        "Identity".to_string(),
        "Synonyms".to_string(),
    ];
    let rows = fields
        .iter()
        .map(|field| {
            vec![
                field.key.to_string(),
                field.label.to_string(),
                (if field.required { "yes" } else { "" }).to_string(),
                field.synonyms.join(", "),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}
