//! Strata: layered managed-object persistence
//!
//! A store coordinator owns the persisted rows. Working contexts stack on top
//! of it, each confined to a serial queue, and saves cascade from a child
//! context through every ancestor down to the store. Monitors and fetch
//! observers turn context notifications into typed change callbacks.

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod merge;
pub mod monitor;
pub mod notify;
pub mod object;
pub mod queue;
pub mod results;
pub mod schema;
pub mod stack;
pub mod store;
pub mod types;

pub use context::{Confinement, Context, ContextScope};
pub use coordinator::{Provisioner, StoreCoordinator, StoreOptions};
pub use error::{FetchError, ResetError, SaveError, SetupError};
pub use fetch::{FetchRequest, Predicate, SortDescriptor};
pub use merge::MergePolicy;
pub use monitor::{EntityMonitor, EntityMonitorDelegate, FireFrequency};
pub use object::{EntityModel, ManagedObject};
pub use results::{FetchObserver, FetchObserverDelegate, IndexPath, ObjectChange, SectionBy, SectionChange};
pub use schema::Schema;
pub use stack::Stack;
pub use store::StoreLocation;
pub use types::{ObjectId, Value};
