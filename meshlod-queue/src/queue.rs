//! Worker pool running LOD generation off the caller's thread

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use meshlod_core::{CancelToken, Error, LodConfig, MeshBuffers, Result};
use meshlod_simplification::generate_lods_with_cancel;

use crate::handle::{lock, JobShared, LodHandle};

/// One unit of work for the queue
///
/// Buffers are owned, so the caller's mesh is free to change while the
/// request waits. The tag names the asset: requests sharing a tag run one
/// at a time in submission order.
#[derive(Debug, Clone)]
pub struct LodRequest {
    pub mesh: MeshBuffers,
    pub config: LodConfig,
    pub tag: String,
}

impl LodRequest {
    pub fn new(mesh: MeshBuffers, config: LodConfig, tag: impl Into<String>) -> Self {
        Self {
            mesh,
            config,
            tag: tag.into(),
        }
    }
}

/// Terminal state of a finished request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Message streamed over [`LodWorkQueue::completions`] when a request
/// reaches a terminal state
#[derive(Debug, Clone)]
pub struct LodCompletion {
    pub id: u64,
    pub tag: String,
    pub status: CompletionStatus,
}

struct Job {
    id: u64,
    tag: String,
    mesh: MeshBuffers,
    config: LodConfig,
    cancel: CancelToken,
    shared: Arc<JobShared>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    active_tags: HashSet<String>,
    shut_down: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    available: Condvar,
    completion_tx: Sender<LodCompletion>,
}

/// Pool of worker threads generating LODs in the background
///
/// The queue is a plain value with an explicit lifecycle: [`start`] spawns
/// the workers, [`shutdown`] (or dropping the queue) joins them. Submitted
/// requests are picked up FIFO, except that a request whose tag is already
/// running waits for its predecessor.
///
/// [`start`]: LodWorkQueue::start
/// [`shutdown`]: LodWorkQueue::shutdown
pub struct LodWorkQueue {
    inner: Arc<QueueInner>,
    workers: Vec<JoinHandle<()>>,
    completion_rx: Receiver<LodCompletion>,
    next_id: AtomicU64,
}

impl LodWorkQueue {
    /// Spawn `worker_count` worker threads (at least one).
    pub fn start(worker_count: usize) -> Result<Self> {
        let worker_count = worker_count.max(1);
        let (completion_tx, completion_rx) = unbounded();
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            completion_tx,
        });
        let mut queue = Self {
            inner,
            workers: Vec::with_capacity(worker_count),
            completion_rx,
            next_id: AtomicU64::new(0),
        };
        for i in 0..worker_count {
            let inner = Arc::clone(&queue.inner);
            let spawned = thread::Builder::new()
                .name(format!("meshlod-worker-{}", i))
                .spawn(move || worker_loop(inner));
            match spawned {
                Ok(worker) => queue.workers.push(worker),
                Err(err) => {
                    queue.shutdown();
                    return Err(Error::InvariantViolation(format!(
                        "failed to spawn LOD worker thread: {}",
                        err
                    )));
                }
            }
        }
        log::debug!("LOD work queue started with {} workers", queue.workers.len());
        Ok(queue)
    }

    /// Enqueue a request and return a handle for its result.
    ///
    /// The configuration is validated here; invalid configs never reach a
    /// worker. Mesh problems surface later through the handle.
    pub fn submit(&self, request: LodRequest) -> Result<LodHandle> {
        request.config.validate()?;
        let LodRequest { mesh, config, tag } = request;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelToken::new();
        let shared = Arc::new(JobShared::new());
        let handle = LodHandle::new(id, tag.clone(), cancel.clone(), Arc::clone(&shared));
        let job = Job {
            id,
            tag,
            mesh,
            config,
            cancel,
            shared,
        };
        {
            let mut state = lock(&self.inner.state);
            if state.shut_down {
                return Err(Error::QueueShutDown);
            }
            state.pending.push_back(job);
        }
        self.inner.available.notify_one();
        log::debug!("queued LOD request {} ('{}')", handle.id(), handle.tag());
        Ok(handle)
    }

    /// Receiver carrying one message per finished request.
    ///
    /// Messages arrive in completion order; requests sharing a tag appear
    /// in submission order.
    pub fn completions(&self) -> &Receiver<LodCompletion> {
        &self.completion_rx
    }

    /// Cancel every still-pending request with the given tag, returning
    /// how many were dropped. A running request keeps its mesh and is not
    /// affected; use [`LodHandle::cancel`] for that.
    pub fn cancel_pending(&self, tag: &str) -> usize {
        self.abort_pending(|job| job.tag == tag)
    }

    /// Cancel every still-pending request, returning how many were
    /// dropped. Running requests finish normally.
    pub fn clear_pending(&self) -> usize {
        self.abort_pending(|_| true)
    }

    fn abort_pending<F>(&self, dropped: F) -> usize
    where
        F: Fn(&Job) -> bool,
    {
        let removed: Vec<Job> = {
            let mut state = lock(&self.inner.state);
            let mut kept = VecDeque::with_capacity(state.pending.len());
            let mut removed = Vec::new();
            while let Some(job) = state.pending.pop_front() {
                if dropped(&job) {
                    removed.push(job);
                } else {
                    kept.push_back(job);
                }
            }
            state.pending = kept;
            removed
        };
        let count = removed.len();
        for job in removed {
            finish_cancelled(&self.inner, job);
        }
        count
    }

    /// Stop intake, cancel still-pending requests, let in-flight tasks
    /// finish and join all workers. Idempotent; also run on drop.
    pub fn shutdown(&mut self) {
        let drained: Vec<Job> = {
            let mut state = lock(&self.inner.state);
            if state.shut_down && self.workers.is_empty() {
                return;
            }
            state.shut_down = true;
            state.pending.drain(..).collect()
        };
        if !drained.is_empty() {
            log::debug!("dropping {} pending LOD requests at shutdown", drained.len());
        }
        self.inner.available.notify_all();
        for job in drained {
            finish_cancelled(&self.inner, job);
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("a LOD worker thread panicked");
            }
        }
    }
}

impl Drop for LodWorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: Arc<QueueInner>) {
    loop {
        let job = {
            let mut state = lock(&inner.state);
            loop {
                let eligible = state
                    .pending
                    .iter()
                    .position(|job| !state.active_tags.contains(&job.tag));
                if let Some(pos) = eligible {
                    if let Some(job) = state.pending.remove(pos) {
                        state.active_tags.insert(job.tag.clone());
                        break job;
                    }
                } else if state.shut_down {
                    return;
                } else {
                    state = inner
                        .available
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        };
        run_job(&inner, job);
    }
}

fn run_job(inner: &QueueInner, job: Job) {
    let Job {
        id,
        tag,
        mesh,
        config,
        cancel,
        shared,
    } = job;
    let result = if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        shared.set_running();
        log::debug!("running LOD request {} ('{}')", id, tag);
        generate_lods_with_cancel(&mesh, &config, &cancel)
    };
    let status = match &result {
        Ok(lods) => {
            log::debug!(
                "LOD request {} ('{}') produced {} levels",
                id,
                tag,
                lods.level_count()
            );
            CompletionStatus::Completed
        }
        Err(Error::Cancelled) => {
            log::debug!("LOD request {} ('{}') was cancelled", id, tag);
            CompletionStatus::Cancelled
        }
        Err(err) => {
            log::warn!("LOD request {} ('{}') failed: {}", id, tag, err);
            CompletionStatus::Failed
        }
    };
    shared.deliver(result);
    // The tag is released only after the completion message is sent, so
    // same-tag completions appear on the channel in submission order.
    let _ = inner.completion_tx.send(LodCompletion {
        id,
        tag: tag.clone(),
        status,
    });
    let mut state = lock(&inner.state);
    state.active_tags.remove(&tag);
    drop(state);
    inner.available.notify_all();
}

fn finish_cancelled(inner: &QueueInner, job: Job) {
    log::debug!("LOD request {} ('{}') cancelled before running", job.id, job.tag);
    job.cancel.cancel();
    job.shared.deliver(Err(Error::Cancelled));
    let _ = inner.completion_tx.send(LodCompletion {
        id: job.id,
        tag: job.tag,
        status: CompletionStatus::Cancelled,
    });
}
