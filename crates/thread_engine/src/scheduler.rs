use std::collections::HashSet;
use std::sync::Arc;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use thread_core::{Cursor, Job, ResultStore, ThreadSnapshot, TopLevelInsert};

use crate::fetch::{NoopProgressSink, PageFetcher, ProgressSink};
use crate::pool::WorkerPool;
use crate::queue::{JobQueue, QueueShutdownError};
use crate::{FetchError, HarvestEvent, RunReport};

pub const DEFAULT_MAX_CONCURRENT_WORKERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_concurrent_workers: usize,
    /// Where the top-level stream starts; `None` fetches from the beginning.
    pub start_cursor: Option<Cursor>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: DEFAULT_MAX_CONCURRENT_WORKERS,
            start_cursor: None,
        }
    }
}

impl SchedulerConfig {
    pub fn worker_count(&self) -> usize {
        self.max_concurrent_workers.max(1)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("top-level page at cursor {} failed: {source}", cursor_label(.cursor))]
    TopLevelFetch {
        cursor: Option<Cursor>,
        #[source]
        source: FetchError,
        /// Everything merged before the failure, for callers that want to keep it.
        partial: Box<ThreadSnapshot>,
    },
    #[error(transparent)]
    Queue(#[from] QueueShutdownError),
    #[error("reply worker panicked: {0}")]
    WorkerPanicked(String),
}

fn cursor_label(cursor: &Option<Cursor>) -> &str {
    cursor.as_ref().map(Cursor::as_str).unwrap_or("<start>")
}

/// A completed run: the store, now exclusively owned by the caller.
#[derive(Debug)]
pub struct Harvest {
    pub store: ResultStore,
    pub report: RunReport,
}

enum DriveError {
    Fetch {
        cursor: Option<Cursor>,
        source: FetchError,
    },
    Queue(QueueShutdownError),
}

impl From<QueueShutdownError> for DriveError {
    fn from(err: QueueShutdownError) -> Self {
        DriveError::Queue(err)
    }
}

/// Drives one harvest: top-level pages in sequence, reply pages in the pool.
pub struct Scheduler {
    fetcher: Arc<dyn PageFetcher>,
    config: SchedulerConfig,
    sink: Arc<dyn ProgressSink>,
}

impl Scheduler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: SchedulerConfig) -> Self {
        Self {
            fetcher,
            config,
            sink: Arc::new(NoopProgressSink),
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<Harvest, SchedulerError> {
        let store = Arc::new(ResultStore::new());
        let queue = Arc::new(JobQueue::new());
        let pool = WorkerPool::spawn(
            self.config.worker_count(),
            Arc::clone(&self.fetcher),
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&self.sink),
        );
        engine_info!(
            "Harvest started with {} reply workers from cursor {}",
            pool.size(),
            cursor_label(&self.config.start_cursor)
        );

        let top_level_pages = match self.drive_top_level(&store, &queue).await {
            Ok(pages) => pages,
            Err(err) => {
                queue.shutdown();
                pool.abort().await;
                return Err(match err {
                    DriveError::Fetch { cursor, source } => {
                        engine_error!(
                            "Top-level page at cursor {} failed: {}",
                            cursor_label(&cursor),
                            source
                        );
                        SchedulerError::TopLevelFetch {
                            cursor,
                            source,
                            partial: Box::new(reclaim(store).into_snapshot()),
                        }
                    }
                    DriveError::Queue(err) => SchedulerError::Queue(err),
                });
            }
        };

        engine_debug!(
            "Top-level stream exhausted; waiting on {} outstanding reply jobs",
            queue.outstanding()
        );
        queue.wait_idle().await;
        self.sink.emit(HarvestEvent::Idle);
        queue.shutdown();

        let pool_report = pool
            .join()
            .await
            .map_err(|err| SchedulerError::WorkerPanicked(err.to_string()))?;
        let store = reclaim(store);

        engine_info!(
            "Harvest finished: {} items, {} replies, {} reply pages, {} abandoned streams",
            store.top_level_count(),
            store.child_count(),
            pool_report.jobs_executed,
            pool_report.warnings.len()
        );

        Ok(Harvest {
            store,
            report: RunReport {
                top_level_pages,
                child_jobs_executed: pool_report.jobs_executed,
                peak_concurrency: pool_report.peak_active,
                warnings: pool_report.warnings,
            },
        })
    }

    async fn drive_top_level(
        &self,
        store: &ResultStore,
        queue: &JobQueue,
    ) -> Result<usize, DriveError> {
        let mut cursor = self.config.start_cursor.clone();
        let mut seen: HashSet<Cursor> = cursor.iter().cloned().collect();
        let mut pages = 0;
        loop {
            let fetched = self.fetcher.fetch_top_level_page(cursor.as_ref()).await;
            let page = match fetched {
                Ok(page) => page,
                Err(source) => return Err(DriveError::Fetch { cursor, source }),
            };
            pages += 1;

            let items = page.items.len();
            let mut streams = 0;
            for data in page.items {
                let (item, child_cursor) = data.into_parts();
                let id = item.id.clone();
                match store.insert_top_level(item) {
                    TopLevelInsert::Inserted => {
                        if let Some(child_cursor) = child_cursor {
                            queue.submit(Job::new(id, child_cursor))?;
                            streams += 1;
                        }
                    }
                    TopLevelInsert::Duplicate => {
                        engine_debug!("Ignoring repeated top-level item {}", id);
                    }
                }
            }
            engine_info!(
                "Top-level page {}: {} items, {} reply streams queued",
                pages,
                items,
                streams
            );
            self.sink.emit(HarvestEvent::TopLevelPage { page: pages, items });

            match page.next_cursor {
                Some(next) if !seen.insert(next.clone()) => {
                    engine_warn!("Top-level stream revisited cursor {}; stopping", next);
                    return Ok(pages);
                }
                Some(next) => cursor = Some(next),
                None => return Ok(pages),
            }
        }
    }
}

/// Take back sole ownership once every worker has exited.
fn reclaim(store: Arc<ResultStore>) -> ResultStore {
    Arc::try_unwrap(store).unwrap_or_else(|shared| {
        engine_warn!("Result store still shared after the pool stopped; copying it");
        ResultStore::from_snapshot(shared.snapshot())
    })
}
