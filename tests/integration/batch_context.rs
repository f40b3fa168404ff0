//! Integration tests for the standalone batch operation context

use super::test_utils::{book_titles, in_memory_stack, seed_books, settle, Book};
use strata::object::EntityModel;
use strata::stack::BATCH_CONTEXT_NAME;
use strata::types::Value;
use strata::MergePolicy;

#[test]
fn test_batch_context_writes_straight_to_store() {
    let stack = in_memory_stack();
    let batch = stack.new_batch_operation_context();

    assert_eq!(batch.name(), BATCH_CONTEXT_NAME);
    assert_eq!(batch.merge_policy(), MergePolicy::PersistedWins);
    assert!(batch.parent_context().is_none());
    assert_eq!(batch.attachment_count(), 0);

    batch.perform_and_wait(|scope| {
        for i in 0..20 {
            Book::insert_into(scope, [("title", format!("Import {:02}", i))]);
        }
    });
    batch.save_context_and_wait().unwrap();

    assert_eq!(stack.coordinator().record_count(), 20);
    assert_eq!(stack.pending_saves(), 0);
    assert_eq!(book_titles(&stack.main_context()).len(), 20);
}

#[test]
fn test_persisted_values_win_over_batch_edits() {
    let stack = in_memory_stack();
    let id = seed_books(&stack, &["Original"])[0];

    let batch = stack.new_batch_operation_context();
    batch.perform_and_wait(|scope| {
        assert_eq!(scope.get(id, "title").unwrap(), Value::from("Original"));
    });

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| scope.set(id, "title", "Changed").unwrap());
    child.save_context_and_wait().unwrap();
    settle(&stack);

    batch.perform_and_wait(|scope| {
        scope.set(id, "title", "Batch").unwrap();
        scope.set(id, "pages", 128).unwrap();
    });
    batch.save_context_and_wait().unwrap();

    let record = stack.coordinator().record(id).unwrap();
    assert_eq!(record.values["title"], Value::from("Changed"));
    assert_eq!(record.values["pages"], Value::Integer(128));
}
