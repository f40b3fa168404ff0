//! Working contexts
//!
//! A context is a thread-confined staging area over its parent: another
//! context, or the store coordinator for root contexts. Its state is only
//! reachable through a [`ContextScope`] handed to blocks running on the
//! context's queue.

mod save;
mod scope;

pub use scope::ContextScope;

use crate::coordinator::StoreCoordinator;
use crate::merge::MergePolicy;
use crate::notify::{NotificationCenter, Subscription};
use crate::object::ManagedObject;
use crate::queue::{main_queue, SerialQueue};
use crate::schema::Schema;
use crate::types::{ContextId, ObjectId};
use parking_lot::Mutex;
use scope::ContextState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Which queue a context's blocks run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confinement {
    /// The shared process-wide main queue
    Main,
    /// A dedicated worker queue owned by the context
    Private,
}

enum QueueHandle {
    Main,
    Owned(SerialQueue),
}

/// What a context commits into
#[derive(Clone)]
pub enum Parent {
    Coordinator(Arc<StoreCoordinator>),
    Context(Context),
}

struct ContextInner {
    id: ContextId,
    name: String,
    confinement: Confinement,
    queue: QueueHandle,
    parent: Parent,
    merge_policy: MergePolicy,
    schema: Arc<Schema>,
    center: Arc<NotificationCenter>,
    state: Mutex<ContextState>,
    attachments: Mutex<Vec<Subscription>>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        debug!(context = %self.name, id = %self.id, "Context discarded");
    }
}

/// Shared handle to a working context
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

/// Non-owning handle, used by observers that must not keep a context alive
#[derive(Clone)]
pub struct WeakContext {
    inner: Weak<ContextInner>,
}

impl WeakContext {
    pub fn upgrade(&self) -> Option<Context> {
        self.inner.upgrade().map(|inner| Context { inner })
    }
}

impl Context {
    /// Root context writing straight through `coordinator`.
    pub fn new_root(
        name: impl Into<String>,
        confinement: Confinement,
        coordinator: Arc<StoreCoordinator>,
        center: Arc<NotificationCenter>,
        merge_policy: MergePolicy,
    ) -> Context {
        let schema = coordinator.schema().clone();
        Self::build(
            name.into(),
            confinement,
            Parent::Coordinator(coordinator),
            schema,
            center,
            merge_policy,
        )
    }

    /// Context committing into `parent`, sharing its schema and notification center.
    pub fn new_child(
        name: impl Into<String>,
        confinement: Confinement,
        parent: &Context,
        merge_policy: MergePolicy,
    ) -> Context {
        Self::build(
            name.into(),
            confinement,
            Parent::Context(parent.clone()),
            parent.inner.schema.clone(),
            parent.inner.center.clone(),
            merge_policy,
        )
    }

    fn build(
        name: String,
        confinement: Confinement,
        parent: Parent,
        schema: Arc<Schema>,
        center: Arc<NotificationCenter>,
        merge_policy: MergePolicy,
    ) -> Context {
        // Main-queue contexts are only ever created on the main queue.
        if confinement == Confinement::Main && !main_queue().is_current() {
            return main_queue().perform_and_wait(move || {
                Self::build(name, confinement, parent, schema, center, merge_policy)
            });
        }

        let id = ContextId::next();
        let queue = match confinement {
            Confinement::Main => QueueHandle::Main,
            Confinement::Private => {
                QueueHandle::Owned(SerialQueue::new(format!("strata.context.{}", id.as_u64())))
            }
        };
        debug!(context = %name, id = %id, ?confinement, "Context created");

        Context {
            inner: Arc::new(ContextInner {
                id,
                name,
                confinement,
                queue,
                parent,
                merge_policy,
                schema,
                center,
                state: Mutex::new(ContextState::default()),
                attachments: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn confinement(&self) -> Confinement {
        self.inner.confinement
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.inner.merge_policy
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn center(&self) -> &Arc<NotificationCenter> {
        &self.inner.center
    }

    pub fn queue(&self) -> &SerialQueue {
        match &self.inner.queue {
            QueueHandle::Main => main_queue(),
            QueueHandle::Owned(queue) => queue,
        }
    }

    pub fn parent(&self) -> &Parent {
        &self.inner.parent
    }

    pub fn parent_context(&self) -> Option<&Context> {
        match &self.inner.parent {
            Parent::Context(parent) => Some(parent),
            Parent::Coordinator(_) => None,
        }
    }

    /// Coordinator at the root of this context's ancestry.
    pub fn coordinator(&self) -> Arc<StoreCoordinator> {
        match &self.inner.parent {
            Parent::Coordinator(coordinator) => coordinator.clone(),
            Parent::Context(parent) => parent.coordinator(),
        }
    }

    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Keep `subscription` alive for as long as this context lives.
    pub fn attach(&self, subscription: Subscription) {
        self.inner.attachments.lock().push(subscription);
    }

    pub fn attachment_count(&self) -> usize {
        self.inner.attachments.lock().len()
    }

    /// Enqueue `block` on this context's queue.
    pub fn perform<F>(&self, block: F)
    where
        F: FnOnce(&mut ContextScope<'_>) + Send + 'static,
    {
        let context = self.clone();
        self.queue().perform(move || context.run_turn(block));
    }

    /// Run `block` on this context's queue turn and return its result.
    pub fn perform_and_wait<F, R>(&self, block: F) -> R
    where
        F: FnOnce(&mut ContextScope<'_>) -> R,
    {
        self.queue().perform_and_wait(|| self.run_turn(block))
    }

    /// Must be called on this context's queue.
    fn run_turn<F, R>(&self, block: F) -> R
    where
        F: FnOnce(&mut ContextScope<'_>) -> R,
    {
        let mut state = self.inner.state.try_lock().unwrap_or_else(|| {
            panic!(
                "Context '{}' was re-entered while one of its blocks is running",
                self.inner.name
            )
        });

        let result = {
            let mut scope = ContextScope::new(self, &mut state);
            let result = block(&mut scope);
            scope.process_pending_changes();
            result
        };

        let outbox = std::mem::take(&mut state.outbox);
        drop(state);

        for (kind, notification) in outbox {
            self.inner.center.post(self.inner.id, kind, &notification);
        }
        result
    }

    /// Committed state of `entity` as seen through this context's parent.
    fn parent_objects(&self, entity: &str) -> Vec<ManagedObject> {
        match &self.inner.parent {
            Parent::Coordinator(coordinator) => coordinator
                .records_of(entity)
                .into_iter()
                .map(ManagedObject::from)
                .collect(),
            Parent::Context(parent) => parent.perform_and_wait(|scope| scope.visible_objects(entity)),
        }
    }

    fn parent_object(&self, id: ObjectId) -> Option<ManagedObject> {
        match &self.inner.parent {
            Parent::Coordinator(coordinator) => coordinator.record(id).map(ManagedObject::from),
            Parent::Context(parent) => parent.perform_and_wait(|scope| scope.visible_object(id)),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("confinement", &self.inner.confinement)
            .field("merge_policy", &self.inner.merge_policy)
            .finish()
    }
}
