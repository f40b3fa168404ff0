//! Integration tests for typed entity change monitors

use super::test_utils::{in_memory_stack, seed_books, settle, Author, Book, MonitorEvent, RecordingMonitor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata::notify::NotificationKind;
use strata::object::{EntityModel, ManagedObject};
use strata::{EntityMonitor, FireFrequency, Predicate, Value};

fn titles(books: &[Book]) -> Vec<&str> {
    let mut titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
    titles.sort();
    titles
}

#[test]
fn test_save_reports_only_matching_inserts_once() {
    let stack = in_memory_stack();
    let main = stack.main_context();
    let monitor = EntityMonitor::<Book>::new(&main, FireFrequency::OnSave, Some(Predicate::gt("pages", 100)));
    let delegate = RecordingMonitor::new();
    monitor.set_delegate(&delegate);

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| {
        for (title, pages) in [("Big", 200), ("Bigger", 300), ("Biggest", 400), ("Small", 50), ("Tiny", 20)] {
            Book::insert_into(scope, [("title", Value::from(title)), ("pages", Value::from(pages))]);
        }
        Author::insert_into(scope, [("name", "Anon")]);
    });
    child.save_context_and_wait().unwrap();
    settle(&stack);

    let events = delegate.take();
    assert_eq!(events.len(), 1);
    match &events[0] {
        MonitorEvent::Inserted(books) => assert_eq!(titles(books), vec!["Big", "Bigger", "Biggest"]),
        other => panic!("expected inserts, got {:?}", other),
    }
}

#[test]
fn test_on_change_fires_before_save() {
    let stack = in_memory_stack();
    let child = stack.new_child_context();
    let monitor = EntityMonitor::<Book>::new(&child, FireFrequency::OnChange, None);
    let delegate = RecordingMonitor::new();
    monitor.set_delegate(&delegate);

    child.perform_and_wait(|scope| {
        Book::insert_into(scope, [("title", "Unsaved")]);
    });

    let events = delegate.take();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], MonitorEvent::Inserted(books) if books[0].title == "Unsaved"));
    assert_eq!(stack.coordinator().record_count(), 0);
}

#[test]
fn test_batches_arrive_as_inserts_deletes_updates() {
    let stack = in_memory_stack();
    let ids = seed_books(&stack, &["Old", "Edited"]);
    let main = stack.main_context();
    let monitor = EntityMonitor::<Book>::new(&main, FireFrequency::OnSave, None);
    let delegate = RecordingMonitor::new();
    monitor.set_delegate(&delegate);

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| {
        Book::insert_into(scope, [("title", "New")]);
        scope.delete(ids[0]).unwrap();
        scope.set(ids[1], "pages", 99).unwrap();
    });
    child.save_context_and_wait().unwrap();
    settle(&stack);

    let events = delegate.take();
    assert_eq!(events.len(), 3, "{:?}", events);
    assert!(matches!(&events[0], MonitorEvent::Inserted(b) if b[0].title == "New"));
    assert!(matches!(&events[1], MonitorEvent::Deleted(b) if b[0].id == ids[0]));
    assert!(matches!(&events[2], MonitorEvent::Modified(b) if b[0].pages == Some(99)));
}

#[test]
fn test_modifications_reach_main_context_on_change() {
    let stack = in_memory_stack();
    let ids = seed_books(&stack, &["Walden"]);
    let main = stack.main_context();
    let monitor = EntityMonitor::<Book>::new(&main, FireFrequency::OnChange, None);
    let delegate = RecordingMonitor::new();
    monitor.set_delegate(&delegate);

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| {
        scope.set(ids[0], "title", "Walden Pond").unwrap();
        scope.save().unwrap();
    });
    settle(&stack);

    let events = delegate.take();
    assert_eq!(events, vec![MonitorEvent::Modified(vec![Book {
        id: ids[0],
        title: "Walden Pond".to_string(),
        pages: None,
    }])]);
}

#[test]
fn test_dropped_delegate_receives_nothing() {
    let stack = in_memory_stack();
    let child = stack.new_child_context();
    let monitor = EntityMonitor::<Book>::new(&child, FireFrequency::OnChange, None);

    let calls = Arc::new(AtomicUsize::new(0));
    let delegate = RecordingMonitor::<Book>::counting(calls.clone());
    monitor.set_delegate(&delegate);
    drop(delegate);

    child.perform_and_wait(|scope| {
        Book::insert_into(scope, [("title", "Ghost Written")]);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(monitor.is_observing());
}

#[test]
fn test_clearing_and_dropping_deregisters() {
    let stack = in_memory_stack();
    let main = stack.main_context();
    let center = stack.center().clone();
    let observers = || center.observer_count(main.id(), NotificationKind::DidSave);
    assert_eq!(observers(), 0);

    let monitor = EntityMonitor::<Book>::new(&main, FireFrequency::OnSave, None);
    let delegate = RecordingMonitor::new();
    monitor.set_delegate(&delegate);
    assert_eq!(observers(), 1);

    // Replacing the delegate keeps a single registration.
    monitor.set_delegate(&delegate);
    assert_eq!(observers(), 1);

    monitor.clear_delegate();
    assert_eq!(observers(), 0);
    assert!(!monitor.is_observing());

    monitor.set_delegate(&delegate);
    drop(monitor);
    assert_eq!(observers(), 0);
}

#[derive(Debug, Clone)]
struct Ghost;

impl EntityModel for Ghost {
    const ENTITY_NAME: &'static str = "Ghost";

    fn from_object(_object: &ManagedObject) -> Self {
        Ghost
    }
}

#[test]
#[should_panic(expected = "doesn't exist")]
fn test_unknown_entity_panics() {
    let stack = in_memory_stack();
    let _ = EntityMonitor::<Ghost>::new(&stack.main_context(), FireFrequency::OnChange, None);
}
