//! Integration tests for destroying and recreating the store

use super::test_utils::{book_titles, in_memory_stack, library_schema, seed_books, settle, store_path, Book};
use std::sync::mpsc;
use std::time::Duration;
use strata::error::ResetError;
use strata::object::EntityModel;
use strata::queue::main_queue;
use strata::store::{JournalMode, StoreLocation};
use strata::{Stack, StoreOptions};

#[test]
fn test_in_memory_reset_discards_rows_and_rebuilds_contexts() {
    let stack = in_memory_stack();
    seed_books(&stack, &["Gone"]);
    let old_main = stack.main_context();
    let old_coordinator = stack.coordinator();

    stack.reset_store_blocking().unwrap();

    assert_eq!(stack.coordinator().record_count(), 0);
    assert!(!old_coordinator.has_store());
    assert!(!stack.main_context().ptr_eq(&old_main));
    assert!(stack
        .main_context()
        .parent_context()
        .unwrap()
        .ptr_eq(&stack.persisting_context()));
    assert!(book_titles(&stack.main_context()).is_empty());
}

#[test]
fn test_reset_after_delete_and_main_saves_afterwards() {
    let (_dir, path) = store_path();
    let stack = Stack::open(library_schema(), StoreLocation::disk(&path), StoreOptions::default()).unwrap();
    let ids = seed_books(&stack, &["Kept", "Dropped"]);

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| scope.delete(ids[1])).unwrap();
    child.save_context_and_wait().unwrap();
    settle(&stack);
    assert_eq!(stack.coordinator().record_count(), 1);

    stack.reset_store_blocking().unwrap();
    assert_eq!(stack.coordinator().record_count(), 0);

    stack.main_context().perform_and_wait(|scope| {
        Book::insert_into(scope, [("title", "Fresh")]);
        assert!(scope.save().unwrap());
    });
    settle(&stack);
    assert_eq!(stack.coordinator().record_count(), 1);
    assert_eq!(book_titles(&stack.main_context()), vec!["Fresh".to_string()]);
}

#[test]
fn test_reset_twice_succeeds() {
    let stack = in_memory_stack();
    stack.reset_store_blocking().unwrap();
    stack.reset_store_blocking().unwrap();
    assert_eq!(stack.coordinator().record_count(), 0);
}

#[test]
fn test_disk_reset_recreates_store() {
    let (_dir, path) = store_path();
    let stack = Stack::open(library_schema(), StoreLocation::disk(&path), StoreOptions::default()).unwrap();
    seed_books(&stack, &["Erased"]);

    stack.reset_store_blocking().unwrap();
    assert!(path.is_dir());
    assert_eq!(stack.coordinator().record_count(), 0);
    assert_eq!(stack.coordinator().journal_mode(), Some(JournalMode::WriteAhead));

    seed_books(&stack, &["Fresh"]);
    stack.reset_store_blocking().unwrap();
    assert!(book_titles(&stack.main_context()).is_empty());
}

#[test]
fn test_disk_reset_without_store_directory_fails() {
    let (_dir, path) = store_path();
    let stack = Stack::open(library_schema(), StoreLocation::disk(&path), StoreOptions::default()).unwrap();
    std::fs::remove_dir_all(&path).unwrap();

    match stack.reset_store_blocking() {
        Err(ResetError::StoreNotFound(missing)) => assert_eq!(missing, path),
        other => panic!("expected missing store, got {:?}", other),
    }
}

#[test]
fn test_reset_waits_for_bubbling_saves() {
    let stack = in_memory_stack();
    let child = stack.new_child_context();
    child.perform_and_wait(|scope| {
        Book::insert_into(scope, [("title", "In Flight")]);
        scope.save().unwrap();
    });

    stack.reset_store_blocking().unwrap();
    assert_eq!(stack.pending_saves(), 0);
    assert_eq!(stack.coordinator().record_count(), 0);
}

#[test]
fn test_reset_then_reports_on_background_thread() {
    let stack = in_memory_stack();
    seed_books(&stack, &["Later"]);

    let (tx, rx) = mpsc::channel();
    stack.reset_store_then(move |result| {
        tx.send(result.is_ok()).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_secs(10)).unwrap());
    settle(&stack);
    assert_eq!(stack.coordinator().record_count(), 0);
}

#[tokio::test]
async fn test_reset_async() {
    let stack = in_memory_stack();
    seed_books(&stack, &["Async"]);
    stack.reset_store().await.unwrap();
    assert_eq!(stack.coordinator().record_count(), 0);
}

#[test]
#[should_panic(expected = "main queue")]
fn test_reset_on_main_queue_panics() {
    let stack = in_memory_stack();
    main_queue().perform_and_wait(|| stack.reset_store_blocking()).unwrap();
}
