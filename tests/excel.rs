//! Workbook decoding against a checked-in `.xlsx` fixture.

mod common;

use common::fixture_path;
use visitor_intake::{
    commit::{self, CommitOptions, ImportStatus},
    decode::TabularReader,
    mapping,
    preview::{self, PreviewOptions},
    store::MemoryStore,
};

#[test]
fn xlsx_fixture_decodes_headers_and_rows() {
    let mut reader = TabularReader::open(&fixture_path("visitors.xlsx"), None, None, None)
        .expect("open workbook");
    assert_eq!(reader.headers(), ["Name", "E-mail", "Office"]);

    let first = reader.next_row().expect("first row").expect("decode");
    assert_eq!(first, vec!["Jane Doe", "jane@x.com", "NY"]);
    let second = reader.next_row().expect("second row").expect("decode");
    assert_eq!(second, vec!["Sam Lee", "sam@x.com", "SF"]);
    assert!(reader.next_row().is_none());
}

#[test]
fn xlsx_preview_suggests_a_committable_mapping() {
    let built = preview::build_preview(&fixture_path("visitors.xlsx"), &PreviewOptions::default())
        .expect("preview");
    assert!(built.committable, "issues: {:?}", built.issues);
    assert_eq!(built.sample_rows.len(), 2);
    assert_eq!(
        built.suggested_mapping.get("E-mail").and_then(|t| t.field_key()),
        Some("email")
    );
}

#[test]
fn xlsx_commit_merges_into_the_dataset() {
    let mut reader = TabularReader::open(&fixture_path("visitors.xlsx"), None, None, None)
        .expect("open workbook");
    let field_mapping = mapping::suggest_mapping(reader.headers());
    let mut store = MemoryStore::new();
    let result = commit::execute_commit(
        &mut reader,
        &field_mapping,
        &mut store,
        &CommitOptions::new("tenant-a"),
    )
    .expect("commit");

    assert_eq!(result.status, ImportStatus::Completed);
    assert_eq!(result.inserted, 2);
    assert_eq!(result.updated, 0);
    let jane = store
        .get("tenant-a", "email:jane@x.com")
        .expect("record stored");
    assert_eq!(jane.field("fullName"), "Jane Doe");
    assert_eq!(
        jane.custom_fields.get("Office").map(String::as_str),
        Some("NY")
    );
}
