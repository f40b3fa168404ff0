//! Typed fetch observer
//!
//! Keeps a sorted, optionally sectioned result set of one entity type in
//! sync with a context and reports each change as
//! `will_change_content`, object changes, section changes, then
//! `did_change_content`.

use crate::context::{Context, WeakContext};
use crate::error::FetchError;
use crate::fetch::FetchRequest;
use crate::notify::{ContextNotification, NotificationKind, Subscription};
use crate::object::{EntityModel, ManagedObject};
use crate::types::ObjectId;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexPath {
    pub section: usize,
    pub item: usize,
}

impl IndexPath {
    pub fn new(section: usize, item: usize) -> Self {
        Self { section, item }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Insert,
    Delete,
    Move,
    Update,
}

/// Untyped change as produced by the result tracking
#[derive(Debug, Clone)]
pub struct RawObjectChange {
    pub object: ManagedObject,
    pub kind: ChangeType,
    pub old_path: Option<IndexPath>,
    pub new_path: Option<IndexPath>,
}

/// Typed object change delivered to delegates
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectChange<T> {
    Insert { object: T, index_path: IndexPath },
    Delete { object: T, index_path: IndexPath },
    Move { object: T, from: IndexPath, to: IndexPath },
    Update { object: T, index_path: IndexPath },
}

impl<T: EntityModel> ObjectChange<T> {
    /// Normalise a raw change.
    ///
    /// A move onto its own index path becomes an update. An insert that
    /// carries an old index path is a double report and yields `None`, as
    /// does any change missing the paths its kind needs.
    pub fn from_raw(raw: RawObjectChange) -> Option<Self> {
        let object = T::from_object(&raw.object);
        match (raw.kind, raw.old_path, raw.new_path) {
            (ChangeType::Insert, None, Some(index_path)) => {
                Some(ObjectChange::Insert { object, index_path })
            }
            (ChangeType::Insert, _, _) => None,
            (ChangeType::Delete, Some(index_path), _) => {
                Some(ObjectChange::Delete { object, index_path })
            }
            (ChangeType::Move, Some(from), Some(to)) if from == to => {
                Some(ObjectChange::Update { object, index_path: from })
            }
            (ChangeType::Move, Some(from), Some(to)) => Some(ObjectChange::Move { object, from, to }),
            (ChangeType::Update, Some(index_path), _) => {
                Some(ObjectChange::Update { object, index_path })
            }
            _ => None,
        }
    }
}

/// One section of the result set
#[derive(Debug, Clone, PartialEq)]
pub struct SectionInfo<T> {
    pub name: String,
    pub index_title: Option<String>,
    pub objects: Vec<T>,
}

impl<T> SectionInfo<T> {
    pub fn number_of_objects(&self) -> usize {
        self.objects.len()
    }
}

#[derive(Debug, Clone)]
pub struct RawSectionChange {
    pub name: String,
    pub objects: Vec<ManagedObject>,
    pub kind: ChangeType,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionChange<T> {
    Insert { info: SectionInfo<T>, index: usize },
    Delete { info: SectionInfo<T>, index: usize },
}

impl<T: EntityModel> SectionChange<T> {
    /// # Panics
    ///
    /// Panics on a section move or update; sections only appear and disappear.
    pub fn from_raw(raw: RawSectionChange) -> Self {
        let info = section_info(&raw.name, &raw.objects);
        match raw.kind {
            ChangeType::Insert => SectionChange::Insert { info, index: raw.index },
            ChangeType::Delete => SectionChange::Delete { info, index: raw.index },
            ChangeType::Move | ChangeType::Update => {
                panic!("Invalid section change type {:?} for section '{}'", raw.kind, raw.name)
            }
        }
    }
}

fn section_info<T: EntityModel>(name: &str, objects: &[ManagedObject]) -> SectionInfo<T> {
    SectionInfo {
        name: name.to_string(),
        index_title: name.chars().next().map(|c| c.to_uppercase().collect()),
        objects: objects.iter().map(T::from_object).collect(),
    }
}

/// How objects are grouped into sections
#[derive(Clone)]
pub enum SectionBy {
    /// The attribute's value rendered as text
    Attribute(String),
    Derived(Arc<dyn Fn(&ManagedObject) -> String + Send + Sync>),
}

impl SectionBy {
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&ManagedObject) -> String + Send + Sync + 'static,
    {
        SectionBy::Derived(Arc::new(f))
    }

    pub fn name_for(&self, object: &ManagedObject) -> String {
        match self {
            SectionBy::Attribute(key) => object.value(key).to_string(),
            SectionBy::Derived(f) => f(object),
        }
    }
}

impl fmt::Debug for SectionBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionBy::Attribute(key) => f.debug_tuple("Attribute").field(key).finish(),
            SectionBy::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

pub trait FetchObserverDelegate<T>: Send + Sync {
    fn will_change_content(&self) {}
    fn did_change_object(&self, _change: ObjectChange<T>) {}
    fn did_change_section(&self, _change: SectionChange<T>) {}
    fn did_change_content(&self) {}
    /// Sent exactly once per `perform_fetch`, whether it succeeded or not
    fn did_perform_fetch(&self) {}
}

type DelegateSlot<T> = Arc<Mutex<Option<Weak<dyn FetchObserverDelegate<T>>>>>;

#[derive(Default)]
struct Sections {
    sections: Vec<(String, Vec<ManagedObject>)>,
}

impl Sections {
    fn build(objects: Vec<ManagedObject>, request: &FetchRequest, section_by: Option<&SectionBy>) -> Self {
        let Some(section_by) = section_by else {
            return Self {
                sections: vec![(String::new(), objects)],
            };
        };

        let mut named: Vec<(String, ManagedObject)> = objects
            .into_iter()
            .map(|o| (section_by.name_for(&o), o))
            .collect();
        named.sort_by(|(a_name, a), (b_name, b)| {
            a_name.cmp(b_name).then_with(|| request.compare(a, b))
        });

        let mut sections: Vec<(String, Vec<ManagedObject>)> = Vec::new();
        for (name, object) in named {
            match sections.last_mut() {
                Some((current, objects)) if *current == name => objects.push(object),
                _ => sections.push((name, vec![object])),
            }
        }
        Self { sections }
    }

    fn paths(&self) -> HashMap<ObjectId, (IndexPath, &ManagedObject)> {
        let mut paths = HashMap::new();
        for (section, (_, objects)) in self.sections.iter().enumerate() {
            for (item, object) in objects.iter().enumerate() {
                paths.insert(object.id, (IndexPath::new(section, item), object));
            }
        }
        paths
    }

    fn objects(&self) -> impl Iterator<Item = &ManagedObject> {
        self.sections.iter().flat_map(|(_, objects)| objects.iter())
    }
}

struct Tracker {
    request: FetchRequest,
    section_by: Option<SectionBy>,
    current: Mutex<Sections>,
}

impl Tracker {
    fn section_name(&self, object: &ManagedObject) -> String {
        self.section_by
            .as_ref()
            .map(|s| s.name_for(object))
            .unwrap_or_default()
    }

    /// Replace the result set, returning the raw changes that lead to it.
    fn apply(
        &self,
        objects: Vec<ManagedObject>,
        touched: &BTreeSet<ObjectId>,
    ) -> (Vec<RawObjectChange>, Vec<RawSectionChange>) {
        let next = Sections::build(objects, &self.request, self.section_by.as_ref());
        let mut current = self.current.lock();

        let mut object_changes = Vec::new();
        let mut section_changes = Vec::new();
        {
            let old_paths = current.paths();
            let new_paths = next.paths();

            for object in current.objects() {
                if !new_paths.contains_key(&object.id) {
                    object_changes.push(RawObjectChange {
                        object: object.clone(),
                        kind: ChangeType::Delete,
                        old_path: old_paths.get(&object.id).map(|(p, _)| *p),
                        new_path: None,
                    });
                }
            }

            for object in next.objects() {
                let new_path = new_paths.get(&object.id).map(|(p, _)| *p);
                match old_paths.get(&object.id) {
                    None => object_changes.push(RawObjectChange {
                        object: object.clone(),
                        kind: ChangeType::Insert,
                        old_path: None,
                        new_path,
                    }),
                    Some((old_path, old)) if touched.contains(&object.id) || *old != object => {
                        let moved = self.section_name(old) != self.section_name(object)
                            || self
                                .request
                                .sort
                                .iter()
                                .any(|s| old.value(&s.key) != object.value(&s.key));
                        object_changes.push(RawObjectChange {
                            object: object.clone(),
                            kind: if moved { ChangeType::Move } else { ChangeType::Update },
                            old_path: Some(*old_path),
                            new_path,
                        });
                    }
                    Some(_) => {}
                }
            }

            let old_names: Vec<&String> = current.sections.iter().map(|(n, _)| n).collect();
            let new_names: Vec<&String> = next.sections.iter().map(|(n, _)| n).collect();
            for (index, (name, objects)) in current.sections.iter().enumerate() {
                if !new_names.contains(&name) {
                    section_changes.push(RawSectionChange {
                        name: name.clone(),
                        objects: objects.clone(),
                        kind: ChangeType::Delete,
                        index,
                    });
                }
            }
            for (index, (name, objects)) in next.sections.iter().enumerate() {
                if !old_names.contains(&name) {
                    section_changes.push(RawSectionChange {
                        name: name.clone(),
                        objects: objects.clone(),
                        kind: ChangeType::Insert,
                        index,
                    });
                }
            }
        }

        *current = next;
        (object_changes, section_changes)
    }
}

fn deliver<T: EntityModel>(
    slot: &DelegateSlot<T>,
    object_changes: Vec<RawObjectChange>,
    section_changes: Vec<RawSectionChange>,
) {
    if object_changes.is_empty() && section_changes.is_empty() {
        return;
    }
    let Some(delegate) = slot.lock().as_ref().and_then(Weak::upgrade) else {
        return;
    };

    delegate.will_change_content();
    for change in object_changes.into_iter().filter_map(ObjectChange::from_raw) {
        delegate.did_change_object(change);
    }
    for change in section_changes {
        delegate.did_change_section(SectionChange::from_raw(change));
    }
    delegate.did_change_content();
}

/// Reports `did_perform_fetch` when dropped
struct FetchReport<'a, T>(&'a DelegateSlot<T>);

impl<T> Drop for FetchReport<'_, T> {
    fn drop(&mut self) {
        let delegate = self.0.lock().as_ref().and_then(Weak::upgrade);
        if let Some(delegate) = delegate {
            delegate.did_perform_fetch();
        }
    }
}

pub struct FetchObserver<T: EntityModel> {
    context: Context,
    tracker: Arc<Tracker>,
    delegate: DelegateSlot<T>,
    subscription: Mutex<Option<Subscription>>,
}

impl<T: EntityModel> FetchObserver<T> {
    /// # Panics
    ///
    /// Panics when the request's entity is not `T`'s entity.
    pub fn new(request: FetchRequest, context: &Context, section_by: Option<SectionBy>) -> Self {
        assert_eq!(
            request.entity,
            T::ENTITY_NAME,
            "Fetch request entity '{}' does not match observed type entity '{}'",
            request.entity,
            T::ENTITY_NAME
        );

        Self {
            context: context.clone(),
            tracker: Arc::new(Tracker {
                request,
                section_by,
                current: Mutex::new(Sections::default()),
            }),
            delegate: Arc::new(Mutex::new(None)),
            subscription: Mutex::new(None),
        }
    }

    pub fn set_delegate<D>(&self, delegate: &Arc<D>)
    where
        D: FetchObserverDelegate<T> + 'static,
    {
        let weak = Arc::downgrade(delegate);
        let delegate: Weak<dyn FetchObserverDelegate<T>> = weak;
        *self.delegate.lock() = Some(delegate);
    }

    pub fn request(&self) -> &FetchRequest {
        &self.tracker.request
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Run the initial query and start tracking changes.
    pub fn perform_fetch(&self) -> Result<(), FetchError> {
        let _report = FetchReport(&self.delegate);

        let request = &self.tracker.request;
        let objects = self.context.perform_and_wait(|scope| scope.fetch(request))?;
        *self.tracker.current.lock() =
            Sections::build(objects, request, self.tracker.section_by.as_ref());

        let mut subscription = self.subscription.lock();
        if subscription.is_none() {
            *subscription = Some(self.subscribe());
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        let context: WeakContext = self.context.downgrade();
        let tracker = Arc::downgrade(&self.tracker);
        let delegate = self.delegate.clone();

        self.context.center().subscribe(
            self.context.id(),
            NotificationKind::ObjectsDidChange,
            move |notification| {
                let (Some(context), Some(tracker)) = (context.upgrade(), tracker.upgrade()) else {
                    return;
                };
                track_change(&context, &tracker, &delegate, notification);
            },
        )
    }

    pub fn fetched_objects(&self) -> Vec<T> {
        self.tracker
            .current
            .lock()
            .objects()
            .map(T::from_object)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.tracker.current.lock().objects().count()
    }

    pub fn first(&self) -> Option<T> {
        self.tracker.current.lock().objects().next().map(T::from_object)
    }

    pub fn sections(&self) -> Vec<SectionInfo<T>> {
        self.tracker
            .current
            .lock()
            .sections
            .iter()
            .map(|(name, objects)| section_info(name, objects))
            .collect()
    }

    pub fn section_count(&self) -> usize {
        self.tracker.current.lock().sections.len()
    }

    pub fn object_at(&self, path: IndexPath) -> Option<T> {
        let current = self.tracker.current.lock();
        current
            .sections
            .get(path.section)
            .and_then(|(_, objects)| objects.get(path.item))
            .map(T::from_object)
    }

    pub fn index_path_for(&self, id: ObjectId) -> Option<IndexPath> {
        self.tracker
            .current
            .lock()
            .paths()
            .get(&id)
            .map(|(path, _)| *path)
    }
}

fn track_change<T: EntityModel>(
    context: &Context,
    tracker: &Tracker,
    delegate: &DelegateSlot<T>,
    notification: &ContextNotification,
) {
    let entity = tracker.request.entity.as_str();
    let touched: BTreeSet<ObjectId> = notification
        .touched()
        .filter(|o| o.is_entity(entity))
        .map(|o| o.id)
        .collect();
    if touched.is_empty() {
        return;
    }

    // Delivered on the context's queue turn, so this runs inline.
    let refetched = context.perform_and_wait(|scope| scope.fetch(&tracker.request));
    match refetched {
        Ok(objects) => {
            let (object_changes, section_changes) = tracker.apply(objects, &touched);
            deliver(delegate, object_changes, section_changes);
        }
        Err(e) => warn!(entity, error = %e, "Failed to refresh fetch observer"),
    }
}

impl<T: EntityModel> fmt::Debug for FetchObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchObserver")
            .field("entity", &T::ENTITY_NAME)
            .field("context", &self.context.name())
            .field("section_by", &self.tracker.section_by)
            .finish()
    }
}
