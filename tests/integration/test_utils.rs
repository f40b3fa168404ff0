//! Shared test utilities for integration tests
//!
//! A small library schema, typed models for it, and delegates that record
//! every callback they receive.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata::monitor::EntityMonitorDelegate;
use strata::object::{EntityModel, ManagedObject};
use strata::queue::main_queue;
use strata::results::{FetchObserverDelegate, ObjectChange, SectionChange};
use strata::schema::{AttributeDescription, AttributeKind, EntityDescription, Schema};
use strata::stack::Stack;
use strata::types::ObjectId;
use strata::{Context, SortDescriptor};
use tempfile::TempDir;

pub fn library_schema() -> Schema {
    Schema::new("Library", 1)
        .entity(
            EntityDescription::new("Author")
                .attribute(AttributeDescription::new("name", AttributeKind::String)),
        )
        .entity(
            EntityDescription::new("Book")
                .attribute(AttributeDescription::new("title", AttributeKind::String))
                .attribute(AttributeDescription::new("pages", AttributeKind::Integer).optional())
                .attribute(AttributeDescription::new("rating", AttributeKind::Double).with_default(0.0))
                .attribute(
                    AttributeDescription::new("author", AttributeKind::Reference)
                        .optional()
                        .referencing("Author"),
                ),
        )
}

pub fn in_memory_stack() -> Stack {
    Stack::construct_in_memory(library_schema()).unwrap()
}

/// Temp dir plus a store path inside it that does not exist yet
pub fn store_path() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Library.store");
    (dir, path)
}

/// Wait until every bubbling save and queued main-queue block has finished
pub fn settle(stack: &Stack) {
    stack.wait_for_saves();
    main_queue().barrier();
}

/// Insert books with the given titles through a fresh child and save down to the store
pub fn seed_books(stack: &Stack, titles: &[&str]) -> Vec<ObjectId> {
    let child = stack.new_child_context();
    let ids = child.perform_and_wait(|scope| {
        titles
            .iter()
            .map(|title| Book::insert_into(scope, [("title", *title)]))
            .collect()
    });
    child.save_context_and_wait().unwrap();
    settle(stack);
    ids
}

pub fn book_titles(context: &Context) -> Vec<String> {
    context.perform_and_wait(|scope| {
        Book::all_in(scope, vec![SortDescriptor::ascending("title")])
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect()
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: ObjectId,
    pub title: String,
    pub pages: Option<i64>,
}

impl EntityModel for Book {
    const ENTITY_NAME: &'static str = "Book";

    fn from_object(object: &ManagedObject) -> Self {
        Book {
            id: object.id,
            title: object.string("title").unwrap_or_default().to_string(),
            pages: object.integer("pages"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: ObjectId,
    pub name: String,
}

impl EntityModel for Author {
    const ENTITY_NAME: &'static str = "Author";

    fn from_object(object: &ManagedObject) -> Self {
        Author {
            id: object.id,
            name: object.string("name").unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent<T> {
    Inserted(Vec<T>),
    Deleted(Vec<T>),
    Modified(Vec<T>),
}

pub struct RecordingMonitor<T> {
    events: Mutex<Vec<MonitorEvent<T>>>,
    calls: Arc<AtomicUsize>,
}

impl<T> RecordingMonitor<T> {
    pub fn new() -> Arc<Self> {
        Self::counting(Arc::new(AtomicUsize::new(0)))
    }

    /// Recorder that also bumps `calls` on every callback, observable after it is dropped
    pub fn counting(calls: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            calls,
        })
    }

    pub fn take(&self) -> Vec<MonitorEvent<T>> {
        std::mem::take(&mut *self.events.lock())
    }

    fn record(&self, event: MonitorEvent<T>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(event);
    }
}

impl<T: Send> EntityMonitorDelegate<T> for RecordingMonitor<T> {
    fn observed_inserts(&self, entities: Vec<T>) {
        self.record(MonitorEvent::Inserted(entities));
    }

    fn observed_deletions(&self, entities: Vec<T>) {
        self.record(MonitorEvent::Deleted(entities));
    }

    fn observed_modifications(&self, entities: Vec<T>) {
        self.record(MonitorEvent::Modified(entities));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent<T> {
    WillChange,
    Object(ObjectChange<T>),
    Section(SectionChange<T>),
    DidChange,
    DidFetch,
}

pub struct RecordingObserver<T> {
    events: Mutex<Vec<ObserverEvent<T>>>,
}

impl<T> RecordingObserver<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn take(&self) -> Vec<ObserverEvent<T>> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl<T: Send> FetchObserverDelegate<T> for RecordingObserver<T> {
    fn will_change_content(&self) {
        self.events.lock().push(ObserverEvent::WillChange);
    }

    fn did_change_object(&self, change: ObjectChange<T>) {
        self.events.lock().push(ObserverEvent::Object(change));
    }

    fn did_change_section(&self, change: SectionChange<T>) {
        self.events.lock().push(ObserverEvent::Section(change));
    }

    fn did_change_content(&self) {
        self.events.lock().push(ObserverEvent::DidChange);
    }

    fn did_perform_fetch(&self) {
        self.events.lock().push(ObserverEvent::DidFetch);
    }
}
