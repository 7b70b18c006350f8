//! Handles for submitted requests and single-delivery result plumbing

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use meshlod_core::{CancelToken, Error, GeneratedLods, Result};

/// Callback invoked with the finished result, usually on a worker thread.
pub(crate) type CompletionCallback = Box<dyn FnOnce(Result<GeneratedLods>) + Send + 'static>;

/// Locks a mutex, recovering the guard when a panicking callback
/// poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) enum JobState {
    Queued { callback: Option<CompletionCallback> },
    Running { callback: Option<CompletionCallback> },
    Finished(Option<Result<GeneratedLods>>),
}

/// State shared between a [`LodHandle`] and the worker executing the job.
pub(crate) struct JobShared {
    state: Mutex<JobState>,
    done: Condvar,
}

impl JobShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(JobState::Queued { callback: None }),
            done: Condvar::new(),
        }
    }

    pub(crate) fn set_running(&self) {
        let mut state = lock(&self.state);
        if let JobState::Queued { callback } = &mut *state {
            let callback = callback.take();
            *state = JobState::Running { callback };
        }
    }

    /// Hands the terminal result to the registered callback, or parks it
    /// for the first `poll`/`wait`.
    pub(crate) fn deliver(&self, result: Result<GeneratedLods>) {
        let mut state = lock(&self.state);
        let callback = match &mut *state {
            JobState::Queued { callback } | JobState::Running { callback } => callback.take(),
            JobState::Finished(_) => {
                debug_assert!(false, "job result delivered twice");
                return;
            }
        };
        match callback {
            Some(callback) => {
                *state = JobState::Finished(None);
                self.done.notify_all();
                drop(state);
                callback(result);
            }
            None => {
                *state = JobState::Finished(Some(result));
                self.done.notify_all();
            }
        }
    }
}

/// Handle to one request submitted to a [`LodWorkQueue`].
///
/// The result is delivered exactly once: to the callback registered with
/// [`on_complete`], or to the first [`poll`] or [`wait`] that observes
/// the finished job.
///
/// [`LodWorkQueue`]: crate::LodWorkQueue
/// [`on_complete`]: LodHandle::on_complete
/// [`poll`]: LodHandle::poll
/// [`wait`]: LodHandle::wait
pub struct LodHandle {
    id: u64,
    tag: String,
    cancel: CancelToken,
    shared: Arc<JobShared>,
}

impl LodHandle {
    pub(crate) fn new(id: u64, tag: String, cancel: CancelToken, shared: Arc<JobShared>) -> Self {
        Self {
            id,
            tag,
            cancel,
            shared,
        }
    }

    /// Queue-wide identifier of the request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Tag the request was submitted under.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Requests cooperative cancellation.
    ///
    /// A request still sitting in the queue finishes as cancelled without
    /// running. A running one stops at the next collapse step and its
    /// handle yields [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Takes the result without blocking.
    ///
    /// Returns `None` while the request is queued or running, and again
    /// after the result has been taken once.
    pub fn poll(&self) -> Option<Result<GeneratedLods>> {
        let mut state = lock(&self.shared.state);
        match &mut *state {
            JobState::Finished(slot) => slot.take(),
            _ => None,
        }
    }

    /// Blocks until the request finishes, then takes the result.
    pub fn wait(&self) -> Result<GeneratedLods> {
        let mut state = lock(&self.shared.state);
        loop {
            if let JobState::Finished(slot) = &mut *state {
                return slot.take().unwrap_or_else(|| {
                    Err(Error::InvariantViolation(
                        "LOD result was already delivered".to_string(),
                    ))
                });
            }
            state = self
                .shared
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Registers a callback that receives the result on the worker thread
    /// that finishes the job, replacing any callback registered earlier.
    ///
    /// When the job has already finished with an untaken result, the
    /// callback runs immediately on the calling thread. If the result was
    /// already taken by [`poll`] or [`wait`], the callback is dropped
    /// without being invoked.
    ///
    /// [`poll`]: LodHandle::poll
    /// [`wait`]: LodHandle::wait
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(Result<GeneratedLods>) + Send + 'static,
    {
        let callback: CompletionCallback = Box::new(callback);
        let mut state = lock(&self.shared.state);
        match &mut *state {
            JobState::Queued { callback: slot } | JobState::Running { callback: slot } => {
                *slot = Some(callback);
            }
            JobState::Finished(slot) => {
                if let Some(result) = slot.take() {
                    drop(state);
                    callback(result);
                }
            }
        }
    }
}
