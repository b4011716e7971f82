// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cancellable one-shot timer scheduler.
//!
//! The subscription engine arms two kinds of timers: reply-TTL timers and
//! missed-publication check timers. Both need O(1) cancellation, a monotonic
//! clock, and delays beyond the 32-bit millisecond window (alert windows go
//! up to 30 days). One background worker owns a binary heap of armed timers
//! and sleeps on a condvar until the earliest deadline.
//!
//! Cancellation is lazy: `cancel` removes the timer id from the live set in
//! O(1); the heap entry is discarded when it surfaces. Tasks run with panic
//! isolation, so a panicking task is logged and never kills the worker.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Handle to an armed timer. Cancellation token only; dropping the handle
/// does not cancel the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    id: u64,
}

type TimerTask = Box<dyn FnOnce() + Send>;

struct ArmedTimer {
    due: Instant,
    id: u64,
    task: TimerTask,
}

// BinaryHeap is a max-heap; order by reversed due time so the earliest
// deadline surfaces first (ties broken by arming order).
impl PartialEq for ArmedTimer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.id == other.id
    }
}

impl Eq for ArmedTimer {}

impl PartialOrd for ArmedTimer {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArmedTimer {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.id.cmp(&self.id))
    }
}

struct TimerQueue {
    heap: BinaryHeap<ArmedTimer>,
    /// Ids of armed-and-not-cancelled timers. Absence when an entry
    /// surfaces means it was cancelled.
    live: HashSet<u64>,
    next_id: u64,
    running: bool,
}

struct SchedulerInner {
    queue: Mutex<TimerQueue>,
    wakeup: Condvar,
}

#[inline]
fn recover_queue<'a>(lock: &'a Mutex<TimerQueue>) -> MutexGuard<'a, TimerQueue> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::debug!("[scheduler] WARNING: queue mutex poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// One-shot timer scheduler backed by a single worker thread.
///
/// Dropping the scheduler stops the worker; timers still armed at that
/// point are discarded without running.
pub struct TimerScheduler {
    inner: Arc<SchedulerInner>,
    worker: Option<JoinHandle<()>>,
    worker_thread: ThreadId,
}

impl TimerScheduler {
    /// Start the scheduler and its worker thread.
    #[must_use]
    pub fn new() -> Self {
        let inner = Arc::new(SchedulerInner {
            queue: Mutex::new(TimerQueue {
                heap: BinaryHeap::new(),
                live: HashSet::new(),
                next_id: 0,
                running: true,
            }),
            wakeup: Condvar::new(),
        });

        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("junction-timer".to_string())
            .spawn(move || worker_loop(&worker_inner))
            .expect("failed to spawn timer worker thread");
        let worker_thread = worker.thread().id();

        Self {
            inner,
            worker: Some(worker),
            worker_thread,
        }
    }

    /// Arm a one-shot timer that runs `task` after `delay`.
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + Send + 'static) -> TimerHandle {
        let due = Instant::now().checked_add(delay).unwrap_or_else(|| {
            // Clock-representation overflow; push the deadline as far out as
            // the platform allows rather than firing early.
            log::warn!("[scheduler] delay {:?} exceeds clock range, capping", delay);
            Instant::now() + Duration::from_secs(86_400 * 365)
        });

        let mut queue = recover_queue(&self.inner.queue);
        let id = queue.next_id;
        queue.next_id += 1;
        queue.live.insert(id);
        queue.heap.push(ArmedTimer {
            due,
            id,
            task: Box::new(task),
        });
        drop(queue);
        self.inner.wakeup.notify_all();
        TimerHandle { id }
    }

    /// Cancel an armed timer in O(1). Returns `false` when the timer already
    /// fired or was cancelled before; cancelling twice is harmless.
    pub fn cancel(&self, handle: &TimerHandle) -> bool {
        let mut queue = recover_queue(&self.inner.queue);
        queue.live.remove(&handle.id)
    }

    /// Number of armed (not yet fired, not cancelled) timers.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        recover_queue(&self.inner.queue).live.len()
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        {
            let mut queue = recover_queue(&self.inner.queue);
            queue.running = false;
            queue.live.clear();
            queue.heap.clear();
        }
        self.inner.wakeup.notify_all();

        // A timer task can hold the last strong reference to a structure
        // owning this scheduler; joining from the worker itself would
        // deadlock, so the worker is left to unwind on its own in that case.
        if thread::current().id() != self.worker_thread {
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(inner: &Arc<SchedulerInner>) {
    log::debug!("[scheduler] worker started");
    let mut queue = recover_queue(&inner.queue);
    loop {
        if !queue.running {
            break;
        }

        let now = Instant::now();
        let next_due = queue.heap.peek().map(|t| t.due);
        match next_due {
            None => {
                queue = match inner.wakeup.wait(queue) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            Some(due) if due > now => {
                let (guard, _timed_out) = match inner.wakeup.wait_timeout(queue, due - now) {
                    Ok(res) => res,
                    Err(poisoned) => poisoned.into_inner(),
                };
                queue = guard;
            }
            Some(_) => {
                if let Some(timer) = queue.heap.pop() {
                    let fire = queue.live.remove(&timer.id);
                    drop(queue);
                    if fire {
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                            move || (timer.task)(),
                        ));
                        if result.is_err() {
                            log::warn!("[scheduler] timer task panicked");
                        }
                    }
                    queue = recover_queue(&inner.queue);
                }
            }
        }
    }
    log::debug!("[scheduler] worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_timer_fires_after_delay() {
        let scheduler = TimerScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);

        scheduler.schedule(Duration::from_millis(20), move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(5));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let scheduler = TimerScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (delay, label) in [(60u64, "late"), (10, "early"), (35, "middle")] {
            let order_clone = Arc::clone(&order);
            scheduler.schedule(Duration::from_millis(delay), move || {
                order_clone
                    .lock()
                    .expect("order mutex")
                    .push(label.to_string());
            });
        }

        thread::sleep(Duration::from_millis(120));
        let order = order.lock().expect("order mutex");
        assert_eq!(*order, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let scheduler = TimerScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);

        let handle = scheduler.schedule(Duration::from_millis(30), move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.cancel(&handle));
        assert!(!scheduler.cancel(&handle)); // idempotent

        thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[test]
    fn test_cancel_after_fire_reports_false() {
        let scheduler = TimerScheduler::new();
        let handle = scheduler.schedule(Duration::from_millis(5), || {});
        thread::sleep(Duration::from_millis(50));
        assert!(!scheduler.cancel(&handle));
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let scheduler = TimerScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);

        scheduler.schedule(Duration::from_millis(5), || panic!("task failure"));
        scheduler.schedule(Duration::from_millis(30), move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_long_delay_does_not_fire_early() {
        let scheduler = TimerScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);

        // Beyond the 32-bit signed millisecond window (~24.8 days).
        scheduler.schedule(Duration::from_millis(2_592_000_000), move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.armed_count(), 1);
    }

    #[test]
    fn test_drop_discards_armed_timers() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let scheduler = TimerScheduler::new();
            let fired_clone = Arc::clone(&fired);
            scheduler.schedule(Duration::from_millis(20), move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            });
        }
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
