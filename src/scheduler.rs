//! Admission control for render tasks.
//!
//! Every page render goes through a [`Scheduler`], which decides when the task
//! may start:
//!
//! - [`Concurrency::Unbounded`] starts each task on its own thread the moment
//!   it is admitted. Nothing ever waits.
//! - [`Concurrency::Limited`] runs tasks on a fixed pool of `N` worker threads
//!   fed from one FIFO wait list. When a worker finishes a task it pops the
//!   next waiting one directly, so a slot is handed over rather than released
//!   and re-acquired.
//!
//! ```text
//! admit ──push_back──▶ [ t4 | t5 | t6 ] ──pop_front──▶ worker 0..N
//! ```
//!
//! Every admission lands in the same list, whichever thread it comes from, so
//! a route discovered inside a running render starts after every task that
//! was already waiting.
//!
//! A task's slot is freed however the task ends. Returning an `Err`, or even
//! panicking, only affects that task's [`TaskHandle`]; the worker moves on to
//! the next queued task. A task that never runs (its thread could not be
//! started) is dropped, which its handle reports as [`TaskAbandoned`].

use std::collections::VecDeque;
use std::io;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("failed to start render worker: {0}")]
    Spawn(#[from] io::Error),
}

/// A task ended without delivering its result.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("task exited without reporting a result")]
pub struct TaskAbandoned;

/// How many tasks may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    #[default]
    Unbounded,
    Limited(NonZeroUsize),
}

impl Concurrency {
    /// `None` means unbounded, mirroring the `max_concurrent_renders` config key.
    pub fn from_limit(limit: Option<NonZeroUsize>) -> Self {
        limit.map_or(Concurrency::Unbounded, Concurrency::Limited)
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            Concurrency::Unbounded => None,
            Concurrency::Limited(n) => Some(n.get()),
        }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct WaitList {
    jobs: VecDeque<Job>,
    closed: bool,
}

/// Shared FIFO consumed by the bounded workers.
#[derive(Default)]
struct WorkQueue {
    list: Mutex<WaitList>,
    ready: Condvar,
}

impl WorkQueue {
    fn lock(&self) -> MutexGuard<'_, WaitList> {
        self.list.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, job: Job) {
        let mut list = self.lock();
        list.jobs.push_back(job);
        debug!(waiting = list.jobs.len(), "task queued");
        self.ready.notify_one();
    }

    /// Next job in admission order, or `None` once closed and drained.
    fn pop(&self) -> Option<Job> {
        let mut list = self.lock();
        loop {
            if let Some(job) = list.jobs.pop_front() {
                return Some(job);
            }
            if list.closed {
                return None;
            }
            list = self
                .ready
                .wait(list)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

fn work(queue: &WorkQueue) {
    while let Some(job) = queue.pop() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("render task panicked; its slot was released");
        }
    }
}

enum Admission {
    Unbounded { spawned: AtomicUsize },
    Pooled(Arc<WorkQueue>),
    /// Drops every job unrun, as if no thread could ever be started.
    #[cfg(test)]
    Refusing,
}

pub struct Scheduler {
    concurrency: Concurrency,
    admission: Admission,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Scheduler {
    pub fn new(concurrency: Concurrency) -> Result<Self, SchedulerError> {
        match concurrency {
            Concurrency::Unbounded => Ok(Self::unbounded()),
            Concurrency::Limited(limit) => Self::bounded(limit),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            concurrency: Concurrency::Unbounded,
            admission: Admission::Unbounded {
                spawned: AtomicUsize::new(0),
            },
        }
    }

    /// Start `limit` workers. They exit once the scheduler is dropped and the
    /// wait list has drained.
    pub fn bounded(limit: NonZeroUsize) -> Result<Self, SchedulerError> {
        let queue = Arc::new(WorkQueue::default());
        for i in 0..limit.get() {
            let worker_queue = Arc::clone(&queue);
            let spawned = thread::Builder::new()
                .name(format!("prerender-worker-{i}"))
                .spawn(move || work(&worker_queue));
            if let Err(e) = spawned {
                // Let the workers already started wind down.
                queue.close();
                return Err(e.into());
            }
        }
        Ok(Self {
            concurrency: Concurrency::Limited(limit),
            admission: Admission::Pooled(queue),
        })
    }

    #[cfg(test)]
    pub(crate) fn refusing() -> Self {
        Self {
            concurrency: Concurrency::Unbounded,
            admission: Admission::Refusing,
        }
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Submit a task. The returned handle yields the task's output once it
    /// has run; dropping the handle does not cancel the task.
    ///
    /// A task that cannot be started is dropped without running. Anything it
    /// owns is dropped with it, and its handle reports [`TaskAbandoned`].
    pub fn admit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let job = move || {
            // The receiver may already be gone; the task still ran.
            let _ = tx.send(task());
        };

        match &self.admission {
            Admission::Unbounded { spawned } => {
                let id = spawned.fetch_add(1, Ordering::Relaxed);
                let spawn = thread::Builder::new()
                    .name(format!("prerender-task-{id}"))
                    .spawn(job);
                if let Err(e) = spawn {
                    error!(error = %e, "failed to start task thread");
                }
            }
            Admission::Pooled(queue) => queue.push(Box::new(job)),
            #[cfg(test)]
            Admission::Refusing => drop(job),
        }

        TaskHandle { rx }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Admission::Pooled(queue) = &self.admission {
            queue.close();
        }
    }
}

/// Result channel of one admitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the task has finished.
    pub fn join(self) -> Result<T, TaskAbandoned> {
        self.rx.recv().map_err(|_| TaskAbandoned)
    }
}
