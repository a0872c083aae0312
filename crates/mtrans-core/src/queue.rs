//! Work Queue (C5): time-sliced FIFO execution of translation tasks so a
//! long batch cannot starve cancellation.
//!
//! Generalizes the teacher's thread-per-slot dispatch loop (`pool.rs`): there
//! a slot thread blocks on a single-item channel and processes one
//! `WorkItem` at a time; here a worker's dedicated thread drains a FIFO
//! queue under the same one-task-at-a-time discipline, but must also honor
//! a time/count budget before yielding so a burst of queued translations
//! does not block `CancelOne`/`CancelAll` indefinitely.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::TranslateError;

/// First-ever tasks on a queue bypass time/count batching, to reduce
/// startup latency.
pub const RUN_IMMEDIATELY: u64 = 20;
/// Processing window before yielding to the scheduler.
pub const TIME_BUDGET_MS: u64 = 100;
/// Tasks completed in the current drain before yielding.
pub const BATCH_SIZE: u64 = 5;

/// A unit of work owned by exactly one Worker's queue (§3). `completion` is
/// invoked exactly once, whether the task ran or was cancelled while
/// queued.
pub struct WorkItem {
    pub translation_id: u64,
    pub task: Box<dyn FnOnce() -> Result<String, TranslateError> + Send>,
    pub completion: Box<dyn FnOnce(Result<String, TranslateError>) + Send>,
}

struct QueueState {
    items: VecDeque<WorkItem>,
    total_run: u64,
    closed: bool,
}

/// FIFO task queue for a single Worker.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    cvar: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                total_run: 0,
                closed: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Enqueue `item` by insertion order keyed by `translation_id`.
    pub fn run_task(&self, item: WorkItem) {
        let mut state = self.state.lock().expect("work queue mutex poisoned");
        state.items.push_back(item);
        self.cvar.notify_one();
    }

    /// If `translation_id` is still queued, remove it and fail it with
    /// `Cancelled`. If it is already running (or already completed), this
    /// is a no-op — an in-flight task always runs to completion; the
    /// coordinator is responsible for discarding its result.
    pub fn cancel_one(&self, translation_id: u64) {
        let mut state = self.state.lock().expect("work queue mutex poisoned");
        if let Some(pos) = state
            .items
            .iter()
            .position(|i| i.translation_id == translation_id)
        {
            let item = state.items.remove(pos).expect("position came from iter");
            (item.completion)(Err(TranslateError::Cancelled));
        }
    }

    /// Remove every queued task, each failing with `Cancelled`. A task
    /// already in flight is allowed to finish; future enqueues are accepted
    /// normally.
    pub fn cancel_all(&self) {
        let mut state = self.state.lock().expect("work queue mutex poisoned");
        for item in state.items.drain(..) {
            (item.completion)(Err(TranslateError::Cancelled));
        }
    }

    /// Signal the drain loop to stop once the queue empties.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("work queue mutex poisoned");
        state.closed = true;
        self.cvar.notify_all();
    }

    fn pop_blocking(&self) -> Option<WorkItem> {
        let mut state = self.state.lock().expect("work queue mutex poisoned");
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self.cvar.wait(state).expect("work queue condvar poisoned");
        }
    }

    /// Drain the queue on the calling thread until `close()` is called and
    /// the queue is empty. At most one task executes at a time (the
    /// invariant this loop exists to enforce). Yields to the OS scheduler
    /// after `TIME_BUDGET_MS` elapsed or `BATCH_SIZE` tasks completed in the
    /// current drain window, except for the first `RUN_IMMEDIATELY` tasks
    /// ever processed by this queue.
    pub fn drain_loop(&self) {
        let mut window_start = Instant::now();
        let mut window_count: u64 = 0;

        while let Some(item) = self.pop_blocking() {
            let result = (item.task)();
            (item.completion)(result);

            let mut state = self.state.lock().expect("work queue mutex poisoned");
            state.total_run += 1;
            let total_run = state.total_run;
            drop(state);

            if total_run <= RUN_IMMEDIATELY {
                continue;
            }

            window_count += 1;
            let elapsed = window_start.elapsed();
            if window_count >= BATCH_SIZE || elapsed >= Duration::from_millis(TIME_BUDGET_MS) {
                std::thread::yield_now();
                window_start = Instant::now();
                window_count = 0;
            }
        }
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
