//! Job queue with quiescence tracking
//!
//! Pending reply-page jobs wait in an unbounded FIFO. The outstanding counter
//! covers jobs that are queued and jobs a worker is still handling, so it only
//! drops to zero once every consequence of every job (merge plus any
//! continuation submit) has been applied.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use engine_logging::engine_warn;
use thread_core::Job;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Returned by [`JobQueue::submit`] once the queue stopped accepting work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job queue is shut down; dropped job for {}", .0.parent_id)]
pub struct QueueShutdownError(pub Job);

/// Statistics for the job queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total jobs accepted by `submit`
    pub submitted: AtomicU64,

    /// Total jobs handed out by `take`
    pub taken: AtomicU64,

    /// Total jobs marked complete
    pub completed: AtomicU64,
}

impl QueueStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn taken(&self) -> u64 {
        self.taken.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Mutex<VecDeque<Job>>,

    /// Queued plus currently executing jobs.
    outstanding: AtomicUsize,

    /// Wakes one taker per submitted job.
    available: Notify,

    /// Wakes every `wait_idle` caller when `outstanding` reaches zero.
    idle: Notify,

    shutdown: CancellationToken,

    stats: QueueStats,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job. The outstanding count is raised before this returns.
    pub fn submit(&self, job: Job) -> Result<(), QueueShutdownError> {
        let mut pending = self.pending();
        if self.shutdown.is_cancelled() {
            return Err(QueueShutdownError(job));
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        pending.push_back(job);
        drop(pending);

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        Ok(())
    }

    /// Wait for the next job, or `None` once the queue is shut down.
    pub async fn take(&self) -> Option<Job> {
        loop {
            let mut notified = pin!(self.available.notified());
            notified.as_mut().enable();

            if self.shutdown.is_cancelled() {
                return None;
            }
            {
                let mut pending = self.pending();
                if let Some(job) = pending.pop_front() {
                    let more = !pending.is_empty();
                    drop(pending);
                    // Only one permit is stored per Notify; pass the wake-up along.
                    if more {
                        self.available.notify_one();
                    }
                    self.stats.taken.fetch_add(1, Ordering::Relaxed);
                    return Some(job);
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
    }

    /// Mark one job fully handled, including any continuation it submitted.
    pub fn complete(&self) {
        let previous =
            match self
                .outstanding
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            {
                Ok(previous) => previous,
                Err(_) => {
                    engine_warn!("JobQueue::complete called with no outstanding job");
                    return;
                }
            };
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        if previous == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Guard that calls [`JobQueue::complete`] when dropped, even on unwind.
    pub fn completion(&self) -> Completion<'_> {
        Completion { queue: self }
    }

    /// Resolve once no job is queued and none is being handled.
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so a concurrent notify_waiters is not lost.
            let notified = self.idle.notified();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting jobs and release every waiting taker.
    pub fn shutdown(&self) {
        let _pending = self.pending();
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }

    /// Jobs waiting to be taken.
    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

/// RAII guard for one taken job
pub struct Completion<'a> {
    queue: &'a JobQueue,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.queue.complete();
    }
}
