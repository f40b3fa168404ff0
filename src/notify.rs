//! In-process notification center
//!
//! Contexts post typed change notifications keyed by their identity;
//! monitors, fetch observers and the stack's save bubbling subscribe to them.

use crate::object::ManagedObject;
use crate::types::ContextId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// Pending changes were processed inside a context
    ObjectsDidChange,
    /// A context committed its changes to its parent
    DidSave,
}

/// Immutable change record produced by one mutation turn or commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextNotification {
    pub context: Option<ContextId>,
    pub inserted: Vec<ManagedObject>,
    pub updated: Vec<ManagedObject>,
    pub deleted: Vec<ManagedObject>,
}

impl ContextNotification {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Every object the notification mentions, inserts first
    pub fn touched(&self) -> impl Iterator<Item = &ManagedObject> + '_ {
        self.inserted
            .iter()
            .chain(&self.updated)
            .chain(&self.deleted)
    }
}

type Observer = Arc<dyn Fn(&ContextNotification) + Send + Sync>;

#[derive(Default)]
struct Registry {
    observers: HashMap<(ContextId, NotificationKind), Vec<(u64, Observer)>>,
}

/// Publish/subscribe channel keyed by `(ContextId, NotificationKind)`
#[derive(Default)]
pub struct NotificationCenter {
    registry: Mutex<Registry>,
    next_token: AtomicU64,
}

impl NotificationCenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `observer`; it stays registered until the returned
    /// subscription is dropped.
    pub fn subscribe<F>(
        self: &Arc<Self>,
        context: ContextId,
        kind: NotificationKind,
        observer: F,
    ) -> Subscription
    where
        F: Fn(&ContextNotification) + Send + Sync + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.registry
            .lock()
            .observers
            .entry((context, kind))
            .or_default()
            .push((token, Arc::new(observer)));

        Subscription {
            center: Arc::downgrade(self),
            key: (context, kind),
            token,
        }
    }

    /// Deliver `notification` to every observer of `(context, kind)`.
    ///
    /// Observers run on the calling thread, outside the registry lock, so
    /// they may subscribe or unsubscribe while being notified.
    pub fn post(&self, context: ContextId, kind: NotificationKind, notification: &ContextNotification) {
        let observers: Vec<Observer> = self
            .registry
            .lock()
            .observers
            .get(&(context, kind))
            .map(|list| list.iter().map(|(_, o)| o.clone()).collect())
            .unwrap_or_default();

        for observer in observers {
            observer(notification);
        }
    }

    pub fn observer_count(&self, context: ContextId, kind: NotificationKind) -> usize {
        self.registry
            .lock()
            .observers
            .get(&(context, kind))
            .map_or(0, Vec::len)
    }

    fn remove(&self, key: (ContextId, NotificationKind), token: u64) {
        let mut registry = self.registry.lock();
        if let Some(list) = registry.observers.get_mut(&key) {
            list.retain(|(t, _)| *t != token);
            if list.is_empty() {
                registry.observers.remove(&key);
            }
        }
    }
}

/// Registration handle; dropping it deregisters the observer
#[must_use = "dropping a subscription deregisters its observer"]
pub struct Subscription {
    center: Weak<NotificationCenter>,
    key: (ContextId, NotificationKind),
    token: u64,
}

impl Subscription {
    pub fn context(&self) -> ContextId {
        self.key.0
    }

    pub fn kind(&self) -> NotificationKind {
        self.key.1
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(center) = self.center.upgrade() {
            center.remove(self.key, self.token);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("context", &self.key.0)
            .field("kind", &self.key.1)
            .finish()
    }
}
