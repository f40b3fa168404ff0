//! Serial execution queues
//!
//! Every context is confined to one `SerialQueue`. Blocks submitted with
//! `perform` run on the queue's worker thread in FIFO order.
//! `perform_and_wait` waits for the queue's turn, then runs the block on the
//! calling thread while the worker is parked, so blocks may borrow from the
//! caller. A thread already executing on a queue runs nested
//! `perform_and_wait` calls for that queue inline.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::OnceLock;
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static ACTIVE_QUEUES: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as executing on a queue until dropped
struct ActiveGuard(u64);

impl ActiveGuard {
    fn enter(queue: u64) -> Self {
        ACTIVE_QUEUES.with(|active| active.borrow_mut().push(queue));
        ActiveGuard(queue)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE_QUEUES.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|q| *q == self.0) {
                active.remove(pos);
            }
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// FIFO queue backed by one worker thread
pub struct SerialQueue {
    id: u64,
    label: String,
    sender: Sender<Job>,
}

impl SerialQueue {
    pub fn new(label: impl Into<String>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let label = label.into();
        let (sender, receiver) = channel::<Job>();

        let worker_label = label.clone();
        std::thread::Builder::new()
            .name(label.clone())
            .spawn(move || Self::run(id, worker_label, receiver))
            .unwrap_or_else(|e| panic!("Failed to spawn worker for queue '{}': {}", label, e));

        debug!(queue = %label, "Serial queue started");
        Self { id, label, sender }
    }

    fn run(id: u64, label: String, receiver: Receiver<Job>) {
        let _active = ActiveGuard::enter(id);
        while let Ok(job) = receiver.recv() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                error!(queue = %label, panic = %panic_message(payload.as_ref()), "Queued block panicked");
            }
        }
        debug!(queue = %label, "Serial queue stopped");
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the calling thread is currently executing on this queue.
    pub fn is_current(&self) -> bool {
        ACTIVE_QUEUES.with(|active| active.borrow().contains(&self.id))
    }

    /// Enqueue `block` without waiting for it.
    pub fn perform<F>(&self, block: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(block)).is_err() {
            warn!(queue = %self.label, "Queue worker is gone; block dropped");
        }
    }

    /// Run `block` on this queue's turn and return its result.
    ///
    /// Panics inside `block` are resumed on the calling thread.
    pub fn perform_and_wait<F, R>(&self, block: F) -> R
    where
        F: FnOnce() -> R,
    {
        if self.is_current() {
            return block();
        }

        let (turn_tx, turn_rx) = channel::<()>();
        let (done_tx, done_rx) = channel::<()>();
        let parked = self.sender.send(Box::new(move || {
            if turn_tx.send(()).is_ok() {
                let _ = done_rx.recv();
            }
        }));

        if parked.is_err() || turn_rx.recv().is_err() {
            warn!(queue = %self.label, "Queue worker is gone; running block on caller");
        }

        let result = {
            let _active = ActiveGuard::enter(self.id);
            catch_unwind(AssertUnwindSafe(block))
        };
        let _ = done_tx.send(());

        match result {
            Ok(value) => value,
            Err(payload) => resume_unwind(payload),
        }
    }

    /// Block until every block submitted before this call has run.
    pub fn barrier(&self) {
        self.perform_and_wait(|| ());
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

/// The process-wide main queue shared by all main-confined contexts.
pub fn main_queue() -> &'static SerialQueue {
    static MAIN: OnceLock<SerialQueue> = OnceLock::new();
    MAIN.get_or_init(|| SerialQueue::new("strata.main-queue"))
}
