use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Counts writers that still have queue entries to consume.
#[derive(Debug)]
pub struct DrainLatch {
    remaining: Mutex<usize>,
    drained: Condvar,
}

impl DrainLatch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            drained: Condvar::new(),
        }
    }

    pub fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.drained.notify_all();
        }
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.lock()
    }

    /// Block until every writer has counted down. Returns false if `timeout`
    /// expired first. A timeout too large to express as an instant waits
    /// without limit.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut remaining, deadline).timed_out() {
                        return *remaining == 0;
                    }
                }
                None => self.drained.wait(&mut remaining),
            }
        }
        true
    }
}

/// Counts the latch down when dropped, so a writer that unwinds still
/// releases the controller.
pub struct DrainGuard<'a> {
    latch: &'a DrainLatch,
}

impl<'a> DrainGuard<'a> {
    pub fn new(latch: &'a DrainLatch) -> Self {
        Self { latch }
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.latch.count_down();
    }
}
