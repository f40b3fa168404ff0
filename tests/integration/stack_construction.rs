//! Integration tests for building a stack and its contexts

use super::test_utils::{in_memory_stack, library_schema, store_path};
use std::sync::mpsc;
use std::time::Duration;
use strata::context::Parent;
use strata::error::SetupError;
use strata::stack::{ChildOptions, CHILD_CONTEXT_NAME, MAIN_CONTEXT_NAME, PERSISTING_CONTEXT_NAME};
use strata::store::{JournalMode, StoreLocation, StoreMetadata};
use strata::{Confinement, MergePolicy, Stack, StoreOptions};

#[test]
fn test_in_memory_stack_hierarchy() {
    let stack = in_memory_stack();
    let persisting = stack.persisting_context();
    let main = stack.main_context();

    assert_eq!(persisting.name(), PERSISTING_CONTEXT_NAME);
    assert_eq!(persisting.confinement(), Confinement::Private);
    assert!(matches!(persisting.parent(), Parent::Coordinator(_)));

    assert_eq!(main.name(), MAIN_CONTEXT_NAME);
    assert_eq!(main.confinement(), Confinement::Main);
    assert!(main.parent_context().unwrap().ptr_eq(&persisting));

    assert_eq!(stack.coordinator().journal_mode(), None);
    assert_eq!(stack.location(), &StoreLocation::InMemory);
}

#[test]
fn test_disk_stack_creates_store() {
    let (_dir, path) = store_path();
    let stack = Stack::open(library_schema(), StoreLocation::disk(&path), StoreOptions::default()).unwrap();

    assert!(path.is_dir());
    assert!(StoreMetadata::path_in(&path).exists());
    assert_eq!(stack.coordinator().journal_mode(), Some(JournalMode::WriteAhead));
    assert_eq!(stack.coordinator().record_count(), 0);
}

#[tokio::test]
async fn test_construct_does_not_block_the_runtime() {
    let (_dir, path) = store_path();
    let stack = Stack::construct(library_schema(), StoreLocation::disk(&path), StoreOptions::default())
        .await
        .unwrap();
    assert_eq!(stack.schema().name, "Library");
    assert!(stack.coordinator().has_store());
}

#[test]
fn test_construct_then_reports_unwritable_location() {
    let (dir, _) = store_path();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let path = blocker.join("Library.store");

    let (tx, rx) = mpsc::channel();
    Stack::construct_then(library_schema(), StoreLocation::disk(&path), StoreOptions::default(), move |result| {
        tx.send(result).unwrap();
    });

    match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
        Err(SetupError::UnableToCreateStore { path: failed, .. }) => assert_eq!(failed, path),
        Err(other) => panic!("unexpected setup error: {}", other),
        Ok(_) => panic!("stack construction should have failed"),
    }
}

#[test]
fn test_default_child_context() {
    let stack = in_memory_stack();
    let child = stack.new_child_context();

    assert_eq!(child.name(), CHILD_CONTEXT_NAME);
    assert_eq!(child.confinement(), Confinement::Private);
    assert!(child.parent_context().unwrap().ptr_eq(&stack.main_context()));
    assert_eq!(child.attachment_count(), 1);
    assert!(!child.queue().is_current());
}

#[test]
fn test_child_context_with_options() {
    let stack = in_memory_stack();
    let parent = stack.new_child_context();
    let child = stack.new_child_context_with(ChildOptions {
        confinement: Confinement::Main,
        name: "Editor".to_string(),
        parent: Some(parent.clone()),
        merge_policy: MergePolicy::PersistedWins,
    });

    assert_eq!(child.name(), "Editor");
    assert_eq!(child.merge_policy(), MergePolicy::PersistedWins);
    assert!(child.parent_context().unwrap().ptr_eq(&parent));
    assert!(child.perform_and_wait(|_| strata::queue::main_queue().is_current()));
}
