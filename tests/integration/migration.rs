//! Integration tests for opening stores against newer schemas

use super::test_utils::{library_schema, seed_books, settle, store_path};
use std::path::Path;
use strata::error::{MigrationError, SetupError};
use strata::schema::{AttributeDescription, AttributeKind, EntityDescription, Schema};
use strata::store::{JournalMode, StoreLocation, StoreMetadata};
use strata::types::Value;
use strata::{FetchRequest, Stack, StoreOptions};

fn open(schema: Schema, path: &Path, options: StoreOptions) -> Result<Stack, SetupError> {
    Stack::open(schema, StoreLocation::disk(path), options)
}

/// Library v2: books gain an optional subtitle and `title` becomes `name`
fn renamed_schema() -> Schema {
    Schema::new("Library", 2)
        .entity(
            EntityDescription::new("Author")
                .attribute(AttributeDescription::new("name", AttributeKind::String)),
        )
        .entity(
            EntityDescription::new("Book")
                .attribute(AttributeDescription::new("name", AttributeKind::String).renamed_from("title"))
                .attribute(AttributeDescription::new("subtitle", AttributeKind::String).optional())
                .attribute(AttributeDescription::new("pages", AttributeKind::Double).optional())
                .attribute(AttributeDescription::new("rating", AttributeKind::Double).with_default(0.0))
                .attribute(
                    AttributeDescription::new("author", AttributeKind::Reference)
                        .optional()
                        .referencing("Author"),
                ),
        )
}

fn seed(path: &Path) {
    let stack = open(library_schema(), path, StoreOptions::default()).unwrap();
    let child = stack.new_child_context();
    child.perform_and_wait(|scope| {
        scope.insert_with("Book", [("title", Value::from("Dune")), ("pages", Value::from(412))]);
    });
    child.save_context_and_wait().unwrap();
    settle(&stack);
}

#[test]
fn test_migration_carries_renamed_and_widened_values() {
    let (_dir, path) = store_path();
    seed(&path);

    let stack = open(renamed_schema(), &path, StoreOptions::default()).unwrap();
    assert_eq!(stack.coordinator().journal_mode(), Some(JournalMode::Delete));

    let books = stack
        .main_context()
        .perform_and_wait(|scope| scope.fetch(&FetchRequest::new("Book")))
        .unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].value("name"), &Value::from("Dune"));
    assert_eq!(books[0].value("pages"), &Value::Double(412.0));
    assert_eq!(books[0].value("subtitle"), &Value::Null);
    assert!(books[0].value("title").is_null());

    drop(books);
    drop(stack);
    strata::queue::main_queue().barrier();

    let reopened = open(renamed_schema(), &path, StoreOptions::default()).unwrap();
    assert_eq!(reopened.coordinator().journal_mode(), Some(JournalMode::WriteAhead));
    assert_eq!(reopened.coordinator().record_count(), 1);
}

#[test]
fn test_migration_required_when_automatic_migration_is_off() {
    let (_dir, path) = store_path();
    seed(&path);

    let options = StoreOptions {
        migrate_automatically: false,
        ..StoreOptions::default()
    };
    assert!(matches!(
        open(renamed_schema(), &path, options),
        Err(SetupError::MigrationRequired { .. })
    ));
}

#[test]
fn test_no_mapping_without_inference() {
    let (_dir, path) = store_path();
    seed(&path);

    let options = StoreOptions {
        infer_mapping: false,
        ..StoreOptions::default()
    };
    assert!(matches!(
        open(renamed_schema(), &path, options),
        Err(SetupError::Migration {
            source: MigrationError::NoMapping { from: 1, to: 2 },
            ..
        })
    ));
}

#[test]
fn test_failed_migration_leaves_store_untouched() {
    let (_dir, path) = store_path();
    seed(&path);

    let incompatible = Schema::new("Library", 2).entity(
        EntityDescription::new("Book")
            .attribute(AttributeDescription::new("title", AttributeKind::Integer)),
    );
    assert!(matches!(
        open(incompatible, &path, StoreOptions::default()),
        Err(SetupError::Migration {
            source: MigrationError::IncompatibleAttribute { .. },
            ..
        })
    ));

    let metadata = StoreMetadata::read(&path).unwrap().unwrap();
    assert!(metadata.matches(&library_schema()));

    let stack = open(library_schema(), &path, StoreOptions::default()).unwrap();
    assert_eq!(stack.coordinator().journal_mode(), Some(JournalMode::WriteAhead));
    assert_eq!(stack.coordinator().record_count(), 1);
}

#[test]
fn test_reopening_with_same_schema_keeps_rows() {
    let (_dir, path) = store_path();
    {
        let stack = open(library_schema(), &path, StoreOptions::default()).unwrap();
        seed_books(&stack, &["One", "Two"]);
    }
    strata::queue::main_queue().barrier();

    let stack = open(library_schema(), &path, StoreOptions::default()).unwrap();
    assert_eq!(stack.coordinator().entity_counts().get("Book"), Some(&2));
}
