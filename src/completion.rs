//! One-shot completion handshake carrying a task's result.
//!
//! An [`Executor`](crate::executor::Executor) runs a task on its own thread
//! while the caller of `invoke` blocks on a [`TaskCompletion`] until the
//! result is delivered. If the task is dropped without running (executor
//! stopped) or unwinds (panic), the [`CompletionGuard`] marks the completion
//! abandoned so the waiter is released instead of hanging.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

/// Outcome of waiting on a [`TaskCompletion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResult<T> {
    /// The task ran and produced a value.
    Completed(T),
    /// The task was dropped or panicked before producing a value.
    Abandoned,
    /// The timeout elapsed first.
    Timeout,
}

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Done(T),
    Taken,
    Abandoned,
}

/// A completion signal that also transports the task result.
///
/// # Thread Safety
///
/// All methods are safe to call from multiple threads. The implementation uses:
/// - An atomic boolean for lock-free completion checks
/// - A mutex + condvar for blocking waits
/// - Poison recovery so a panicking task cannot wedge the waiter
///
/// # Example
///
/// ```
/// use std::{sync::Arc, thread, time::Duration};
/// use grafton_playout::completion::{TaskCompletion, WaitResult};
///
/// let completion = Arc::new(TaskCompletion::new());
/// let signaller = Arc::clone(&completion);
/// thread::spawn(move || signaller.complete(42));
///
/// assert_eq!(completion.wait_timeout(Duration::from_secs(1)), WaitResult::Completed(42));
/// ```
#[derive(Debug)]
pub struct TaskCompletion<T> {
    finished: AtomicBool,
    slot: Mutex<Slot<T>>,
    cv: Condvar,
}

impl<T> Default for TaskCompletion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskCompletion<T> {
    /// Creates a pending completion.
    pub fn new() -> Self {
        Self {
            finished: AtomicBool::new(false),
            slot: Mutex::new(Slot::Pending),
            cv: Condvar::new(),
        }
    }

    /// Stores the result and wakes all waiters. Only the first call has effect.
    pub fn complete(&self, value: T) {
        self.finish(Slot::Done(value));
    }

    /// Releases waiters without a result. No-op if already finished.
    pub fn abandon(&self) {
        self.finish(Slot::Abandoned);
    }

    fn finish(&self, outcome: Slot<T>) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*slot, Slot::Pending) {
            *slot = outcome;
            self.finished.store(true, Ordering::Release);
        }
        self.cv.notify_all();
    }

    /// Lock-free check whether a result (or abandonment) has been recorded.
    pub fn is_complete(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Blocks until the task finishes.
    pub fn wait(&self) -> WaitResult<T> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        while matches!(*slot, Slot::Pending) {
            slot = self.cv.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
        Self::take(&mut slot)
    }

    /// Blocks until the task finishes or `timeout` elapses.
    ///
    /// # Poison Recovery
    ///
    /// If the mutex is poisoned the guard is recovered and waiting continues.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitResult<T> {
        let start = Instant::now();
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        while matches!(*slot, Slot::Pending) {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return WaitResult::Timeout;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(slot, timeout - elapsed)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
        Self::take(&mut slot)
    }

    fn take(slot: &mut Slot<T>) -> WaitResult<T> {
        match std::mem::replace(slot, Slot::Taken) {
            Slot::Done(value) => WaitResult::Completed(value),
            Slot::Abandoned => {
                *slot = Slot::Abandoned;
                WaitResult::Abandoned
            }
            // A second waiter after the value was taken sees abandonment.
            Slot::Taken | Slot::Pending => WaitResult::Abandoned,
        }
    }
}

/// Producer side of a [`TaskCompletion`]; abandons the completion on drop
/// unless a value was delivered.
#[derive(Debug)]
pub struct CompletionGuard<T> {
    completion: Option<Arc<TaskCompletion<T>>>,
}

impl<T> CompletionGuard<T> {
    pub fn new(completion: Arc<TaskCompletion<T>>) -> Self {
        Self {
            completion: Some(completion),
        }
    }

    pub fn complete(mut self, value: T) {
        if let Some(completion) = self.completion.take() {
            completion.complete(value);
        }
    }
}

impl<T> Drop for CompletionGuard<T> {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.abandon();
        }
    }
}
