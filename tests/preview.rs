mod common;

use std::{
    fs::OpenOptions,
    io::Read,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use common::TestWorkspace;
use encoding_rs::UTF_8;
use visitor_intake::{
    decode::{MAX_IMPORT_BYTES, TabularReader},
    error::ImportError,
    mapping::MappingTarget,
    preview::{DEFAULT_SAMPLE_ROWS, PreviewOptions, build_preview},
};

/// Counts bytes pulled from the underlying stream, so tests can prove the
/// decoder never reads past what the caller asked for.
struct MeteredReader {
    inner: Box<dyn Read>,
    bytes_read: Arc<AtomicUsize>,
}

impl Read for MeteredReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.bytes_read.fetch_add(read, Ordering::Relaxed);
        Ok(read)
    }
}

fn large_csv(rows: usize) -> String {
    let mut contents = String::from("Name,Email,Company\n");
    for idx in 0..rows {
        contents.push_str(&format!("Visitor {idx},visitor{idx}@example.com,Acme {idx}\n"));
    }
    contents
}

#[test]
fn preview_sample_is_bounded_regardless_of_file_size() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("big.csv", &large_csv(5_000));

    let preview = build_preview(&path, &PreviewOptions::default()).expect("preview");
    assert_eq!(preview.sample_rows.len(), DEFAULT_SAMPLE_ROWS);
    assert_eq!(preview.headers, vec!["Name", "Email", "Company"]);
    assert_eq!(preview.file.size, std::fs::metadata(&path).expect("meta").len());
}

#[test]
fn decoder_pulls_are_lazy_not_whole_file() {
    let contents = large_csv(200_000);
    let total = contents.len();
    let bytes_read = Arc::new(AtomicUsize::new(0));
    let metered = MeteredReader {
        inner: Box::new(std::io::Cursor::new(contents)),
        bytes_read: Arc::clone(&bytes_read),
    };

    let mut reader =
        TabularReader::from_csv_reader(Box::new(metered), b',', UTF_8).expect("open reader");
    let mut pulled = 0usize;
    for row in reader.rows() {
        row.expect("row decodes");
        pulled += 1;
        if pulled == DEFAULT_SAMPLE_ROWS {
            break;
        }
    }

    assert_eq!(pulled, DEFAULT_SAMPLE_ROWS);
    let consumed = bytes_read.load(Ordering::Relaxed);
    assert!(
        consumed < total / 20,
        "expected a bounded pull, but {consumed} of {total} bytes were read"
    );
}

#[test]
fn preview_suggests_mapping_and_reports_committable() {
    let workspace = TestWorkspace::new();
    let path = workspace.write_csv(
        "visitors.csv",
        &["Name", "E-mail", "Office"],
        &[&["Jane Doe", "jane@x.com", "NY"]],
    );

    let preview = build_preview(&path, &PreviewOptions::default()).expect("preview");
    assert_eq!(
        preview.suggested_mapping.get("Name"),
        Some(&MappingTarget::Field("fullName".to_string()))
    );
    assert_eq!(
        preview.suggested_mapping.get("E-mail"),
        Some(&MappingTarget::Field("email".to_string()))
    );
    assert_eq!(
        preview.suggested_mapping.get("Office"),
        Some(&MappingTarget::Ignore)
    );
    assert!(preview.committable);
    assert!(preview.issues.is_empty());
    assert!(preview.available_fields.iter().any(|f| f.key == "email"));
}

#[test]
fn preview_without_identity_columns_is_not_committable() {
    let workspace = TestWorkspace::new();
    let path = workspace.write_csv(
        "no_identity.csv",
        &["Company", "City", "Country"],
        &[&["Acme", "Boston", "US"]],
    );

    let preview = build_preview(&path, &PreviewOptions::default()).expect("preview");
    assert!(!preview.committable);
    assert_eq!(preview.issues.len(), 1);
    assert!(preview.issues[0].contains("identity"));
}

#[test]
fn duplicate_source_headers_keep_distinct_columns() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "dupes.csv",
        "Email,Email,Notes\nprimary@x.com,backup@x.com,vip\n",
    );

    let preview = build_preview(&path, &PreviewOptions::default()).expect("preview");
    assert_eq!(preview.headers, vec!["Email", "Email (2)", "Notes"]);
    assert_eq!(
        preview.sample_rows[0],
        vec!["primary@x.com", "backup@x.com", "vip"]
    );
}

#[test]
fn oversized_file_is_rejected_before_decoding() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("huge.csv", "Name,Email\n");
    // Sparse-extend past the ceiling; the check reads metadata, not bytes.
    OpenOptions::new()
        .write(true)
        .open(&path)
        .expect("reopen")
        .set_len(MAX_IMPORT_BYTES + 1)
        .expect("extend");

    let err = build_preview(&path, &PreviewOptions::default()).expect_err("over limit");
    match err.downcast_ref::<ImportError>() {
        Some(ImportError::SizeLimitExceeded { limit, .. }) => {
            assert_eq!(*limit, MAX_IMPORT_BYTES);
        }
        other => panic!("expected SizeLimitExceeded, got {other:?}"),
    }
}

#[test]
fn unsupported_format_is_rejected() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("report.pdf", "%PDF-1.7 not a spreadsheet");

    let err = build_preview(&path, &PreviewOptions::default()).expect_err("unsupported");
    assert!(matches!(
        err.downcast_ref::<ImportError>(),
        Some(ImportError::UnsupportedFormat { .. })
    ));
}

#[test]
fn file_identity_digest_tracks_content() {
    let workspace = TestWorkspace::new();
    let first = workspace.write_csv("a.csv", &["Name"], &[&["Jane"]]);
    let second = workspace.write_csv("b.csv", &["Name"], &[&["John"]]);

    let preview_a = build_preview(&first, &PreviewOptions::default()).expect("preview a");
    let preview_a_again = build_preview(&first, &PreviewOptions::default()).expect("preview a2");
    let preview_b = build_preview(&second, &PreviewOptions::default()).expect("preview b");

    assert_eq!(preview_a.file.digest, preview_a_again.file.digest);
    assert_ne!(preview_a.file.digest, preview_b.file.digest);
}
