//! Typed entity change monitor
//!
//! Filters one context's change notifications down to a single entity type
//! (and an optional predicate) and forwards them to a delegate as typed
//! insert, delete and update batches.

use crate::context::Context;
use crate::fetch::Predicate;
use crate::notify::{ContextNotification, NotificationKind, Subscription};
use crate::object::{EntityModel, ManagedObject};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// When a monitor reports changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireFrequency {
    /// After every processed mutation in the context
    OnChange,
    /// Only when the context commits
    OnSave,
}

impl FireFrequency {
    fn notification_kind(self) -> NotificationKind {
        match self {
            FireFrequency::OnChange => NotificationKind::ObjectsDidChange,
            FireFrequency::OnSave => NotificationKind::DidSave,
        }
    }
}

/// Receiver of typed change batches; each batch is non-empty
pub trait EntityMonitorDelegate<T>: Send + Sync {
    fn observed_inserts(&self, _entities: Vec<T>) {}
    fn observed_deletions(&self, _entities: Vec<T>) {}
    fn observed_modifications(&self, _entities: Vec<T>) {}
}

pub struct EntityMonitor<T: EntityModel> {
    context: Context,
    frequency: FireFrequency,
    filter: Option<Predicate>,
    subscription: Mutex<Option<Subscription>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: EntityModel> EntityMonitor<T> {
    /// # Panics
    ///
    /// Panics when `T`'s entity is not part of the context's schema.
    pub fn new(context: &Context, frequency: FireFrequency, filter: Option<Predicate>) -> Self {
        context.schema().expect_entity(T::ENTITY_NAME);
        Self {
            context: context.clone(),
            frequency,
            filter,
            subscription: Mutex::new(None),
            _entity: PhantomData,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn frequency(&self) -> FireFrequency {
        self.frequency
    }

    /// Route changes to `delegate`, replacing any previous delegate.
    ///
    /// Only a weak reference is kept; once the delegate is dropped nothing
    /// more is delivered.
    pub fn set_delegate<D>(&self, delegate: &Arc<D>)
    where
        D: EntityMonitorDelegate<T> + 'static,
    {
        let weak = Arc::downgrade(delegate);
        let delegate: Weak<dyn EntityMonitorDelegate<T>> = weak;
        let filter = self.filter.clone();

        let subscription = self.context.center().subscribe(
            self.context.id(),
            self.frequency.notification_kind(),
            move |notification| {
                if let Some(delegate) = delegate.upgrade() {
                    dispatch(delegate.as_ref(), notification, filter.as_ref());
                }
            },
        );

        // Dropping the previous subscription deregisters it.
        *self.subscription.lock() = Some(subscription);
    }

    pub fn clear_delegate(&self) {
        self.subscription.lock().take();
    }

    pub fn is_observing(&self) -> bool {
        self.subscription.lock().is_some()
    }
}

fn dispatch<T: EntityModel>(
    delegate: &dyn EntityMonitorDelegate<T>,
    notification: &ContextNotification,
    filter: Option<&Predicate>,
) {
    let select = |objects: &[ManagedObject]| -> Vec<T> {
        objects
            .iter()
            .filter(|o| o.is_entity(T::ENTITY_NAME))
            .filter(|o| filter.map_or(true, |p| p.evaluate(o)))
            .map(T::from_object)
            .collect()
    };

    let inserted = select(&notification.inserted);
    if !inserted.is_empty() {
        delegate.observed_inserts(inserted);
    }
    let deleted = select(&notification.deleted);
    if !deleted.is_empty() {
        delegate.observed_deletions(deleted);
    }
    let updated = select(&notification.updated);
    if !updated.is_empty() {
        delegate.observed_modifications(updated);
    }
}

impl<T: EntityModel> std::fmt::Debug for EntityMonitor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMonitor")
            .field("entity", &T::ENTITY_NAME)
            .field("context", &self.context.name())
            .field("frequency", &self.frequency)
            .field("filter", &self.filter)
            .finish()
    }
}
