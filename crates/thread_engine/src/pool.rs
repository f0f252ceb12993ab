//! Fixed-size pool of reply-page workers.
//!
//! Each worker handles one job at a time. A job whose page names a next
//! cursor re-submits the continuation before it is marked complete, which
//! also means at most one job per parent is ever runnable. A panic inside a
//! job abandons that parent's stream; the worker keeps taking jobs.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use engine_logging::{engine_debug, engine_error, engine_trace, engine_warn};
use futures_util::FutureExt;
use thread_core::{Cursor, ItemId, Job, ResultStore};
use tokio::task::{JoinError, JoinSet};

use crate::fetch::{PageFetcher, ProgressSink};
use crate::{FailureKind, FetchError, HarvestEvent, StreamWarning};

#[derive(Debug, Default)]
pub struct PoolStats {
    jobs_executed: AtomicU64,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    warnings: Mutex<Vec<StreamWarning>>,
}

impl PoolStats {
    fn begin_job(&self) -> ActiveJob<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
        ActiveJob { stats: self }
    }

    fn record_warning(&self, warning: StreamWarning) {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }

    pub fn jobs_executed(&self) -> u64 {
        self.jobs_executed.load(Ordering::Relaxed)
    }

    /// Workers currently between `take` and `complete`.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    pub fn warnings(&self) -> Vec<StreamWarning> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct ActiveJob<'a> {
    stats: &'a PoolStats,
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolReport {
    pub jobs_executed: u64,
    pub peak_active: usize,
    pub warnings: Vec<StreamWarning>,
}

/// Cursors already fetched, per reply stream.
#[derive(Debug, Default)]
struct StreamCursors {
    seen: Mutex<HashMap<ItemId, HashSet<Cursor>>>,
}

impl StreamCursors {
    /// Record `current` and `next` for `parent`; false if `next` was used before.
    fn advance(&self, parent: &ItemId, current: &Cursor, next: &Cursor) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let stream = seen.entry(parent.clone()).or_default();
        stream.insert(current.clone());
        stream.insert(next.clone())
    }
}

struct WorkerContext {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<ResultStore>,
    queue: Arc<crate::JobQueue>,
    sink: Arc<dyn ProgressSink>,
    stats: Arc<PoolStats>,
    cursors: StreamCursors,
}

pub struct WorkerPool {
    workers: JoinSet<()>,
    stats: Arc<PoolStats>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) on the current tokio runtime.
    pub fn spawn(
        size: usize,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<ResultStore>,
        queue: Arc<crate::JobQueue>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let size = size.max(1);
        let stats = Arc::new(PoolStats::default());
        let context = Arc::new(WorkerContext {
            fetcher,
            store,
            queue,
            sink,
            stats: Arc::clone(&stats),
            cursors: StreamCursors::default(),
        });

        let mut workers = JoinSet::new();
        for worker in 0..size {
            let context = Arc::clone(&context);
            workers.spawn(async move { run_worker(worker, context).await });
        }

        Self {
            workers,
            stats,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for every worker to exit. Workers exit once the queue is shut down.
    pub async fn join(mut self) -> Result<PoolReport, JoinError> {
        let mut first_failure = None;
        while let Some(joined) = self.workers.join_next().await {
            if let Err(err) = joined {
                engine_error!("Reply worker ended abnormally: {}", err);
                first_failure.get_or_insert(err);
            }
        }
        if let Some(err) = first_failure {
            return Err(err);
        }
        Ok(PoolReport {
            jobs_executed: self.stats.jobs_executed(),
            peak_active: self.stats.peak_active(),
            warnings: self.stats.warnings(),
        })
    }

    /// Cancel all workers at their next suspension point and wait for them.
    pub async fn abort(mut self) {
        self.workers.shutdown().await;
    }
}

async fn run_worker(worker: usize, context: Arc<WorkerContext>) {
    engine_trace!("Reply worker {} started", worker);
    while let Some(job) = context.queue.take().await {
        // Dropped in reverse order: the worker is inactive before the job completes.
        let _done = context.queue.completion();
        let _active = context.stats.begin_job();
        let (parent_id, cursor) = (job.parent_id.clone(), job.cursor.clone());
        let handled = AssertUnwindSafe(handle_job(worker, &context, job))
            .catch_unwind()
            .await;
        if let Err(panic) = handled {
            let error = FetchError::new(FailureKind::Panicked, panic_message(panic.as_ref()));
            engine_error!(
                "Worker {} panicked on replies of {} at cursor {}: {}",
                worker,
                parent_id,
                cursor,
                error.message
            );
            abandon(&context, parent_id, cursor, error);
        }
    }
    engine_trace!("Reply worker {} stopped", worker);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn abandon(context: &WorkerContext, parent_id: ItemId, cursor: Cursor, error: FetchError) {
    context.sink.emit(HarvestEvent::StreamAbandoned {
        parent_id: parent_id.clone(),
    });
    context.stats.record_warning(StreamWarning {
        parent_id,
        cursor,
        error,
    });
}

async fn handle_job(worker: usize, context: &WorkerContext, job: Job) {
    let fetched = context
        .fetcher
        .fetch_child_page(&job.parent_id, &job.cursor)
        .await;
    context.stats.jobs_executed.fetch_add(1, Ordering::Relaxed);

    let page = match fetched {
        Ok(page) => page,
        Err(error) => {
            engine_warn!(
                "Abandoning replies of {} at cursor {}: {}",
                job.parent_id,
                job.cursor,
                error
            );
            abandon(context, job.parent_id, job.cursor, error);
            return;
        }
    };

    let items = page.items.len();
    match context.store.merge_children(&job.parent_id, page.items) {
        Ok(outcome) => {
            engine_debug!(
                "Worker {} merged {} of {} replies under {}",
                worker,
                outcome.inserted,
                items,
                job.parent_id
            );
            if outcome.conflicts > 0 {
                engine_warn!(
                    "{} replies under {} already belong to another item; ignored",
                    outcome.conflicts,
                    job.parent_id
                );
            }
        }
        Err(err) => {
            engine_error!("Dropping reply page: {}", err);
            return;
        }
    }
    context.sink.emit(HarvestEvent::ChildPage {
        parent_id: job.parent_id.clone(),
        items,
    });

    match page.next_cursor {
        Some(next) if !context.cursors.advance(&job.parent_id, &job.cursor, &next) => {
            engine_warn!(
                "Reply stream of {} revisited cursor {}; stopping",
                job.parent_id,
                next
            );
        }
        Some(next) => {
            if let Err(err) = context.queue.submit(job.continuation(next)) {
                engine_warn!("{}", err);
            }
        }
        None => {}
    }
}
