//! Context hierarchy manager
//!
//! A `Stack` owns the coordinator, a private-queue persisting context writing
//! through it, and a main-queue context parented to the persisting context.
//! The main context and every child created through the stack have their
//! saves bubbled to their parent automatically.

use crate::concurrency::CompletionGroup;
use crate::context::{Confinement, Context};
use crate::coordinator::{Provisioner, StoreCoordinator, StoreOptions};
use crate::error::{ResetError, SetupError};
use crate::merge::MergePolicy;
use crate::notify::{NotificationCenter, NotificationKind};
use crate::queue::main_queue;
use crate::schema::Schema;
use crate::store::StoreLocation;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const PERSISTING_CONTEXT_NAME: &str = "Persisting Context";
pub const MAIN_CONTEXT_NAME: &str = "Main Queue Context";
pub const CHILD_CONTEXT_NAME: &str = "Main Queue Context Child";
pub const BATCH_CONTEXT_NAME: &str = "Batch Operation Context";

/// The persisting and main contexts built around one coordinator
#[derive(Debug, Clone)]
pub struct StackContexts {
    pub persisting: Context,
    pub main: Context,
}

/// Options for a stack-managed child context
#[derive(Debug, Clone)]
pub struct ChildOptions {
    pub confinement: Confinement,
    pub name: String,
    /// Defaults to the stack's main context
    pub parent: Option<Context>,
    pub merge_policy: MergePolicy,
}

impl Default for ChildOptions {
    fn default() -> Self {
        Self {
            confinement: Confinement::Private,
            name: CHILD_CONTEXT_NAME.to_string(),
            parent: None,
            merge_policy: MergePolicy::LastWriteWins,
        }
    }
}

struct StackInner {
    schema: Arc<Schema>,
    location: StoreLocation,
    options: StoreOptions,
    center: Arc<NotificationCenter>,
    coordinator: RwLock<Arc<StoreCoordinator>>,
    contexts: RwLock<StackContexts>,
    saves: Arc<CompletionGroup>,
    reset_lock: Mutex<()>,
}

#[derive(Clone)]
pub struct Stack {
    inner: Arc<StackInner>,
}

impl Stack {
    /// Build a stack, blocking the calling thread while the store opens.
    pub fn open(
        schema: impl Into<Arc<Schema>>,
        location: StoreLocation,
        options: StoreOptions,
    ) -> Result<Stack, SetupError> {
        let schema = schema.into();
        let coordinator = Provisioner::open(schema.clone(), &location, options)?;
        Ok(Self::from_coordinator(schema, location, options, coordinator))
    }

    /// Build a stack without blocking the async caller while the store opens.
    pub async fn construct(
        schema: impl Into<Arc<Schema>>,
        location: StoreLocation,
        options: StoreOptions,
    ) -> Result<Stack, SetupError> {
        let schema = schema.into();
        let coordinator = match &location {
            StoreLocation::InMemory => Provisioner::open_in_memory(schema.clone())?,
            StoreLocation::Disk(path) => {
                Provisioner::open_disk_async(schema.clone(), path.clone(), options).await?
            }
        };
        Ok(Self::from_coordinator(schema, location, options, coordinator))
    }

    /// Build a stack on a background thread and hand the result to `callback` there.
    pub fn construct_then<F>(
        schema: impl Into<Arc<Schema>>,
        location: StoreLocation,
        options: StoreOptions,
        callback: F,
    ) where
        F: FnOnce(Result<Stack, SetupError>) + Send + 'static,
    {
        let schema = schema.into();
        std::thread::Builder::new()
            .name("strata.stack-setup".to_string())
            .spawn(move || callback(Self::open(schema, location, options)))
            .unwrap_or_else(|e| panic!("Failed to spawn stack setup thread: {}", e));
    }

    pub fn construct_in_memory(schema: impl Into<Arc<Schema>>) -> Result<Stack, SetupError> {
        Self::open(schema, StoreLocation::InMemory, StoreOptions::default())
    }

    fn from_coordinator(
        schema: Arc<Schema>,
        location: StoreLocation,
        options: StoreOptions,
        coordinator: StoreCoordinator,
    ) -> Stack {
        let center = NotificationCenter::new();
        let saves = Arc::new(CompletionGroup::new());
        let coordinator = Arc::new(coordinator);
        let contexts = Self::build_contexts(&coordinator, &center, &saves);

        info!(
            schema = %schema.name,
            version = schema.version,
            location = %location,
            "Stack constructed"
        );

        Stack {
            inner: Arc::new(StackInner {
                schema,
                location,
                options,
                center,
                coordinator: RwLock::new(coordinator),
                contexts: RwLock::new(contexts),
                saves,
                reset_lock: Mutex::new(()),
            }),
        }
    }

    /// Persisting root plus the main context, whose local saves bubble into it.
    fn build_contexts(
        coordinator: &Arc<StoreCoordinator>,
        center: &Arc<NotificationCenter>,
        saves: &Arc<CompletionGroup>,
    ) -> StackContexts {
        let persisting = Context::new_root(
            PERSISTING_CONTEXT_NAME,
            Confinement::Private,
            coordinator.clone(),
            center.clone(),
            MergePolicy::LastWriteWins,
        );
        let main = Context::new_child(
            MAIN_CONTEXT_NAME,
            Confinement::Main,
            &persisting,
            MergePolicy::LastWriteWins,
        );
        observe_saves(center, saves, &main, &persisting);
        StackContexts { persisting, main }
    }

    /// Swap in `coordinator` and rebuild the persisting and main contexts around it.
    ///
    /// Contexts created before the swap keep committing into the old hierarchy.
    pub fn attach_coordinator(&self, coordinator: Arc<StoreCoordinator>) -> StackContexts {
        let contexts = Self::build_contexts(&coordinator, &self.inner.center, &self.inner.saves);
        *self.inner.coordinator.write() = coordinator;
        *self.inner.contexts.write() = contexts.clone();
        debug!("Stack contexts rebuilt around new coordinator");
        contexts
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn location(&self) -> &StoreLocation {
        &self.inner.location
    }

    pub fn center(&self) -> &Arc<NotificationCenter> {
        &self.inner.center
    }

    pub fn coordinator(&self) -> Arc<StoreCoordinator> {
        self.inner.coordinator.read().clone()
    }

    pub fn contexts(&self) -> StackContexts {
        self.inner.contexts.read().clone()
    }

    pub fn main_context(&self) -> Context {
        self.inner.contexts.read().main.clone()
    }

    pub fn persisting_context(&self) -> Context {
        self.inner.contexts.read().persisting.clone()
    }

    /// Private-queue child of the main context whose saves bubble upward.
    pub fn new_child_context(&self) -> Context {
        self.new_child_context_with(ChildOptions::default())
    }

    pub fn new_child_context_with(&self, options: ChildOptions) -> Context {
        let parent = options.parent.unwrap_or_else(|| self.main_context());
        let child = Context::new_child(options.name, options.confinement, &parent, options.merge_policy);
        observe_saves(&self.inner.center, &self.inner.saves, &child, &parent);
        child
    }

    /// Standalone root context for bulk imports.
    ///
    /// Writes straight through the coordinator, keeps values changed
    /// underneath it, and is not observed by the stack.
    pub fn new_batch_operation_context(&self) -> Context {
        Context::new_root(
            BATCH_CONTEXT_NAME,
            Confinement::Private,
            self.coordinator(),
            self.inner.center.clone(),
            MergePolicy::PersistedWins,
        )
    }

    /// Number of bubbling saves still in flight.
    pub fn pending_saves(&self) -> usize {
        self.inner.saves.pending()
    }

    pub fn wait_for_saves(&self) {
        self.inner.saves.wait();
    }

    pub fn wait_for_saves_timeout(&self, timeout: Duration) -> bool {
        self.inner.saves.wait_timeout(timeout)
    }

    /// Destroy and recreate the backing store, blocking until done.
    ///
    /// Waits for every in-flight bubbling save first. Disk stores are removed
    /// and reprovisioned; in-memory stacks get a fresh empty store. Removal
    /// failures may leave the old store partially deleted.
    ///
    /// # Panics
    ///
    /// Panics when called on the main queue, where pending bubbles could never finish.
    pub fn reset_store_blocking(&self) -> Result<(), ResetError> {
        if main_queue().is_current() {
            panic!("reset_store_blocking must not be called on the main queue");
        }

        let _reset = self.inner.reset_lock.lock();
        self.wait_for_saves();

        let schema = self.inner.schema.clone();
        let coordinator = self.coordinator();
        let fresh = match &self.inner.location {
            StoreLocation::InMemory => {
                if coordinator.detach_store().is_none() {
                    return Err(ResetError::InMemoryStoreMissing);
                }
                Provisioner::open_in_memory(schema)?
            }
            StoreLocation::Disk(path) => {
                if !coordinator.has_store() || !path.exists() {
                    return Err(ResetError::StoreNotFound(path.clone()));
                }
                drop(coordinator.detach_store());
                std::fs::remove_dir_all(path).map_err(|source| ResetError::Removal {
                    path: path.clone(),
                    source,
                })?;
                Provisioner::open_disk(schema, path, self.inner.options)?
            }
        };

        self.attach_coordinator(Arc::new(fresh));
        info!(location = %self.inner.location, "Store reset");
        Ok(())
    }

    /// Reset on a blocking-pool thread.
    pub async fn reset_store(&self) -> Result<(), ResetError> {
        let stack = self.clone();
        tokio::task::spawn_blocking(move || stack.reset_store_blocking())
            .await
            .map_err(|_| ResetError::Interrupted)?
    }

    /// Reset on a background thread and hand the result to `callback` there.
    pub fn reset_store_then<F>(&self, callback: F)
    where
        F: FnOnce(Result<(), ResetError>) + Send + 'static,
    {
        let stack = self.clone();
        std::thread::Builder::new()
            .name("strata.stack-reset".to_string())
            .spawn(move || callback(stack.reset_store_blocking()))
            .unwrap_or_else(|e| panic!("Failed to spawn store reset thread: {}", e));
    }
}

/// Bubble every local commit of `child` into `parent`.
///
/// The subscription lives on the child, so the observation ends when the
/// child is discarded.
fn observe_saves(
    center: &Arc<NotificationCenter>,
    saves: &Arc<CompletionGroup>,
    child: &Context,
    parent: &Context,
) {
    let parent = parent.downgrade();
    let saves = saves.clone();

    let subscription = center.subscribe(child.id(), NotificationKind::DidSave, move |_| {
        let Some(parent) = parent.upgrade() else {
            return;
        };
        saves.enter();
        let saves = saves.clone();
        let name = parent.name().to_string();
        parent.save_context(move |result| {
            if let Err(e) = result {
                warn!(context = %name, error = %e, "Bubbled save failed");
            }
            saves.leave();
        });
    });
    child.attach(subscription);
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("schema", &self.inner.schema.name)
            .field("location", &self.inner.location)
            .finish()
    }
}
