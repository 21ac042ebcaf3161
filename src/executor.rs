//! Single-threaded FIFO task queue owned by one device.
//!
//! Every capture, playback or preview device runs its callbacks on its own
//! `Executor`, so callbacks of one device never run concurrently while
//! different devices run fully in parallel. Tasks run in submission order.
//!
//! A panicking task is logged and discarded; the executor keeps serving the
//! queue so one misbehaving callback cannot stop a device's clock.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use tracing::{debug, error};

use crate::{
    completion::{CompletionGuard, TaskCompletion, WaitResult},
    Error, Result,
};

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Task),
    Stop,
}

/// A named worker thread executing queued closures one at a time.
///
/// # Example
///
/// ```
/// use grafton_playout::executor::Executor;
///
/// # fn main() -> Result<(), grafton_playout::Error> {
/// let executor = Executor::new("preview")?;
/// executor.begin_invoke(|| println!("runs later, in order"))?;
/// let answer = executor.invoke(|| 6 * 7)?;
/// assert_eq!(answer, 42);
/// # Ok(())
/// # }
/// ```
pub struct Executor {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Message>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    running: Arc<AtomicBool>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Executor {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to create the thread.
    pub fn new<S: Into<String>>(name: S) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Message>();
        let running = Arc::new(AtomicBool::new(true));

        let worker_name = name.clone();
        let worker_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(Message::Run(task)) = receiver.recv() {
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        error!(executor = %worker_name, "task panicked");
                    }
                }
                // Flag first so tasks abandoned below report a stopped executor.
                worker_running.store(false, Ordering::Release);
                drop(receiver);
                debug!(executor = %worker_name, "executor stopped");
            })
            .map_err(|e| {
                Error::InvalidConfiguration(format!("Failed to spawn executor {name}: {e}"))
            })?;

        Ok(Self {
            thread_id: handle.thread().id(),
            name,
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            running,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the calling thread is this executor's worker.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue `task` and return immediately.
    ///
    /// # Errors
    ///
    /// [`Error::ExecutorStopped`] if the executor no longer accepts tasks.
    pub fn begin_invoke<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        sender
            .as_ref()
            .ok_or_else(|| Error::ExecutorStopped(self.name.clone()))?
            .send(Message::Run(Box::new(task)))
            .map_err(|_| Error::ExecutorStopped(self.name.clone()))
    }

    /// Run `task` on the executor and wait for its result.
    ///
    /// Called from the executor's own thread the task runs inline, so a task
    /// may synchronously invoke on its own executor without deadlocking.
    ///
    /// # Errors
    ///
    /// [`Error::ExecutorStopped`] if the executor is stopped before running
    /// the task, [`Error::TaskPanicked`] if the task panics.
    pub fn invoke<F, R>(&self, task: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Ok(task());
        }
        let completion = self.submit(task)?;
        self.outcome(completion.wait())
    }

    /// Like [`invoke`](Self::invoke) but gives up after `timeout`.
    ///
    /// On timeout the task stays queued and may still run later.
    pub fn invoke_timeout<F, R>(&self, timeout: Duration, task: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Ok(task());
        }
        let completion = self.submit(task)?;
        match completion.wait_timeout(timeout) {
            WaitResult::Timeout => Err(Error::Timeout(timeout)),
            other => self.outcome(other),
        }
    }

    fn submit<F, R>(&self, task: F) -> Result<Arc<TaskCompletion<R>>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let completion = Arc::new(TaskCompletion::new());
        let guard = CompletionGuard::new(Arc::clone(&completion));
        self.begin_invoke(move || {
            let value = task();
            guard.complete(value);
        })?;
        Ok(completion)
    }

    fn outcome<R>(&self, result: WaitResult<R>) -> Result<R> {
        match result {
            WaitResult::Completed(value) => Ok(value),
            WaitResult::Abandoned if self.is_running() => Err(Error::TaskPanicked(self.name.clone())),
            WaitResult::Abandoned => Err(Error::ExecutorStopped(self.name.clone())),
            WaitResult::Timeout => Err(Error::ExecutorStopped(self.name.clone())),
        }
    }

    /// Stop accepting tasks, let already queued tasks finish, and join the worker.
    ///
    /// Idempotent. Called from the worker itself it only signals the stop.
    pub fn stop(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(Message::Stop);
        }
        if self.is_current() {
            return;
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(executor = %self.name, "executor thread panicked");
            }
        }
    }
}

impl Executor {
    /// Stop accepting tasks without waiting for the queued ones.
    ///
    /// Already queued tasks still run; the worker exits after them on its own.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(Message::Stop);
        }
        // Detach the worker.
        drop(
            self.handle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.stop();
    }
}
