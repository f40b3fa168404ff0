//! Counting completion group for in-flight bubbling saves

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Tracks outstanding work; `wait` returns once every `enter` was matched by a `leave`
#[derive(Default)]
pub struct CompletionGroup {
    pending: Mutex<usize>,
    drained: Condvar,
}

impl CompletionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) {
        *self.pending.lock() += 1;
    }

    pub fn leave(&self) {
        let mut pending = self.pending.lock();
        if *pending == 0 {
            tracing::warn!("Completion group left more often than entered");
            return;
        }
        *pending -= 1;
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    pub fn pending(&self) -> usize {
        *self.pending.lock()
    }

    pub fn wait(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.drained.wait(&mut pending);
        }
    }

    /// Wait at most `timeout`; returns whether the group drained.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock();
        while *pending > 0 {
            if self.drained.wait_until(&mut pending, deadline).timed_out() {
                return *pending == 0;
            }
        }
        true
    }
}
