use std::collections::VecDeque;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify};

/// A slice of one problem's candidates handed to a single worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Index into the scheduler's problem list
    pub problem: usize,
    pub candidates: Range<usize>,
}

pub struct WorkQueue {
    queue: Mutex<VecDeque<WorkUnit>>,
    notify: Notify,
    closed: AtomicBool,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub async fn push(&self, unit: WorkUnit) {
        self.queue.lock().await.push_back(unit);
        self.notify.notify_one();
    }

    /// No more units will be pushed; idle workers drain and stop
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Next unit, or `None` once the queue is closed and empty
    pub async fn pop(&self) -> Option<WorkUnit> {
        loop {
            // registered before the check so a close() in between is not lost
            let notified = self.notify.notified();
            {
                let mut queue = self.queue.lock().await;
                if let Some(unit) = queue.pop_front() {
                    return Some(unit);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
