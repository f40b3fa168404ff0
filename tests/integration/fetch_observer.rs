//! Integration tests for sectioned fetch observers

use super::test_utils::{in_memory_stack, seed_books, settle, Author, Book, ObserverEvent, RecordingObserver};
use strata::error::FetchError;
use strata::object::{EntityModel, ManagedObject};
use strata::results::SectionInfo;
use strata::{FetchObserver, FetchRequest, IndexPath, ObjectChange, Predicate, SectionBy, SectionChange, Stack};
use std::sync::Arc;

fn first_letter() -> SectionBy {
    SectionBy::derived(|object: &ManagedObject| {
        object
            .string("title")
            .and_then(|t| t.chars().next())
            .map(|c| c.to_uppercase().to_string())
            .unwrap_or_default()
    })
}

fn observe(stack: &Stack, section_by: Option<SectionBy>) -> (FetchObserver<Book>, Arc<RecordingObserver<Book>>) {
    let request = FetchRequest::new("Book").sorted_ascending("title");
    let observer = FetchObserver::<Book>::new(request, &stack.main_context(), section_by);
    let delegate = RecordingObserver::new();
    observer.set_delegate(&delegate);
    observer.perform_fetch().unwrap();
    assert_eq!(delegate.take(), vec![ObserverEvent::DidFetch]);
    (observer, delegate)
}

fn book(id: strata::ObjectId, title: &str) -> Book {
    Book {
        id,
        title: title.to_string(),
        pages: None,
    }
}

#[test]
fn test_hundred_books_sectioned_by_first_letter() {
    let stack = in_memory_stack();
    let titles: Vec<String> = (0..100)
        .map(|i| {
            let letter = (b'A' + (i * 7 % 26) as u8) as char;
            format!("{} Tale {:03}", letter, i)
        })
        .collect();
    let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
    seed_books(&stack, &refs);

    let (observer, _delegate) = observe(&stack, Some(first_letter()));

    assert_eq!(observer.count(), 100);
    assert_eq!(observer.section_count(), 26);

    let sections = observer.sections();
    let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
    let mut sorted_names = names.clone();
    sorted_names.sort();
    assert_eq!(names, sorted_names);

    for section in &sections {
        assert_eq!(section.index_title.as_deref(), Some(section.name.as_str()));
        assert!(section.objects.iter().all(|b| b.title.starts_with(&section.name)));
    }

    let fetched: Vec<String> = observer.fetched_objects().into_iter().map(|b| b.title).collect();
    let mut expected = titles.clone();
    expected.sort();
    assert_eq!(fetched, expected);
}

#[test]
fn test_insert_into_new_section() {
    let stack = in_memory_stack();
    seed_books(&stack, &["Alpha", "Beta"]);
    let (observer, delegate) = observe(&stack, Some(first_letter()));

    let child = stack.new_child_context();
    let id = child.perform_and_wait(|scope| Book::insert_into(scope, [("title", "Zulu")]));
    child.save_context_and_wait().unwrap();
    settle(&stack);

    assert_eq!(
        delegate.take(),
        vec![
            ObserverEvent::WillChange,
            ObserverEvent::Object(ObjectChange::Insert {
                object: book(id, "Zulu"),
                index_path: IndexPath::new(2, 0),
            }),
            ObserverEvent::Section(SectionChange::Insert {
                info: SectionInfo {
                    name: "Z".to_string(),
                    index_title: Some("Z".to_string()),
                    objects: vec![book(id, "Zulu")],
                },
                index: 2,
            }),
            ObserverEvent::DidChange,
        ]
    );
    assert_eq!(observer.section_count(), 3);
    assert_eq!(observer.index_path_for(id), Some(IndexPath::new(2, 0)));
}

#[test]
fn test_sort_key_change_is_a_move() {
    let stack = in_memory_stack();
    let ids = seed_books(&stack, &["Apple", "Avocado", "Banana"]);
    let (observer, delegate) = observe(&stack, Some(first_letter()));

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| scope.set(ids[0], "title", "Azure").unwrap());
    child.save_context_and_wait().unwrap();
    settle(&stack);

    assert_eq!(
        delegate.take(),
        vec![
            ObserverEvent::WillChange,
            ObserverEvent::Object(ObjectChange::Move {
                object: book(ids[0], "Azure"),
                from: IndexPath::new(0, 0),
                to: IndexPath::new(0, 1),
            }),
            ObserverEvent::DidChange,
        ]
    );
    assert_eq!(observer.object_at(IndexPath::new(0, 0)).unwrap().title, "Avocado");
}

#[test]
fn test_non_sort_change_is_an_update_at_old_path() {
    let stack = in_memory_stack();
    let ids = seed_books(&stack, &["Apple", "Banana"]);
    let (_observer, delegate) = observe(&stack, Some(first_letter()));

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| scope.set(ids[1], "pages", 320).unwrap());
    child.save_context_and_wait().unwrap();
    settle(&stack);

    assert_eq!(
        delegate.take(),
        vec![
            ObserverEvent::WillChange,
            ObserverEvent::Object(ObjectChange::Update {
                object: Book {
                    id: ids[1],
                    title: "Banana".to_string(),
                    pages: Some(320),
                },
                index_path: IndexPath::new(1, 0),
            }),
            ObserverEvent::DidChange,
        ]
    );
}

#[test]
fn test_deleting_last_object_removes_section() {
    let stack = in_memory_stack();
    let ids = seed_books(&stack, &["Apple", "Banana"]);
    let (observer, delegate) = observe(&stack, Some(first_letter()));

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| scope.delete(ids[1]).unwrap());
    child.save_context_and_wait().unwrap();
    settle(&stack);

    let events = delegate.take();
    assert_eq!(events.len(), 4, "{:?}", events);
    assert_eq!(events[0], ObserverEvent::WillChange);
    assert_eq!(
        events[1],
        ObserverEvent::Object(ObjectChange::Delete {
            object: book(ids[1], "Banana"),
            index_path: IndexPath::new(1, 0),
        })
    );
    assert!(matches!(
        &events[2],
        ObserverEvent::Section(SectionChange::Delete { info, index: 1 }) if info.name == "B"
    ));
    assert_eq!(events[3], ObserverEvent::DidChange);
    assert_eq!(observer.section_count(), 1);
}

#[test]
fn test_moving_to_another_section() {
    let stack = in_memory_stack();
    let ids = seed_books(&stack, &["Alpha", "Beta"]);
    let (_observer, delegate) = observe(&stack, Some(first_letter()));

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| scope.set(ids[1], "title", "Alphabet").unwrap());
    child.save_context_and_wait().unwrap();
    settle(&stack);

    let events = delegate.take();
    assert!(matches!(
        &events[1],
        ObserverEvent::Object(ObjectChange::Move { from, to, .. })
            if *from == IndexPath::new(1, 0) && *to == IndexPath::new(0, 1)
    ));
    assert!(matches!(
        &events[2],
        ObserverEvent::Section(SectionChange::Delete { index: 1, .. })
    ));
}

#[test]
fn test_moving_into_a_new_section() {
    let stack = in_memory_stack();
    let ids = seed_books(&stack, &["Alpha", "Beta", "Bravo"]);
    let (observer, delegate) = observe(&stack, Some(first_letter()));
    assert_eq!(observer.section_count(), 2);

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| scope.set(ids[2], "title", "Charlie").unwrap());
    child.save_context_and_wait().unwrap();
    settle(&stack);

    assert_eq!(
        delegate.take(),
        vec![
            ObserverEvent::WillChange,
            ObserverEvent::Object(ObjectChange::Move {
                object: book(ids[2], "Charlie"),
                from: IndexPath::new(1, 1),
                to: IndexPath::new(2, 0),
            }),
            ObserverEvent::Section(SectionChange::Insert {
                info: SectionInfo {
                    name: "C".to_string(),
                    index_title: Some("C".to_string()),
                    objects: vec![book(ids[2], "Charlie")],
                },
                index: 2,
            }),
            ObserverEvent::DidChange,
        ]
    );
    assert_eq!(observer.section_count(), 3);
    assert_eq!(observer.index_path_for(ids[2]), Some(IndexPath::new(2, 0)));
}

#[test]
fn test_unsectioned_results() {
    let stack = in_memory_stack();
    let ids = seed_books(&stack, &["Cervantes", "Austen", "Borges"]);
    let (observer, _delegate) = observe(&stack, None);

    assert_eq!(observer.section_count(), 1);
    let sections = observer.sections();
    assert_eq!(sections[0].name, "");
    assert_eq!(sections[0].index_title, None);
    assert_eq!(observer.first().unwrap().title, "Austen");
    assert_eq!(observer.object_at(IndexPath::new(0, 1)).unwrap().title, "Borges");
    assert_eq!(observer.index_path_for(ids[0]), Some(IndexPath::new(0, 2)));
    assert_eq!(observer.object_at(IndexPath::new(1, 0)), None);
}

#[test]
fn test_other_entities_are_ignored() {
    let stack = in_memory_stack();
    seed_books(&stack, &["Solaris"]);
    let (_observer, delegate) = observe(&stack, None);

    let child = stack.new_child_context();
    child.perform_and_wait(|scope| {
        Author::insert_into(scope, [("name", "Lem")]);
    });
    child.save_context_and_wait().unwrap();
    settle(&stack);

    assert!(delegate.take().is_empty());
}

#[test]
fn test_did_perform_fetch_fires_on_error() {
    let stack = in_memory_stack();
    let request = FetchRequest::new("Book").filtered(Predicate::eq("publisher", "Gollancz"));
    let observer = FetchObserver::<Book>::new(request, &stack.main_context(), None);
    let delegate = RecordingObserver::new();
    observer.set_delegate(&delegate);

    let result = observer.perform_fetch();
    assert!(matches!(result, Err(FetchError::UnknownAttribute { ref key, .. }) if key == "publisher"));
    assert_eq!(delegate.take(), vec![ObserverEvent::DidFetch]);
}

#[test]
#[should_panic(expected = "does not match")]
fn test_request_for_other_entity_panics() {
    let stack = in_memory_stack();
    let _ = FetchObserver::<Book>::new(FetchRequest::new(Author::ENTITY_NAME), &stack.main_context(), None);
}
