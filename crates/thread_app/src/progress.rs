use std::sync::atomic::{AtomicUsize, Ordering};

use engine_logging::{engine_debug, engine_info};
use thread_core::ThreadId;
use thread_engine::{HarvestEvent, ProgressSink};

/// Logs running item counts while a thread is harvested.
pub struct LoggingProgress {
    thread: ThreadId,
    top_level: AtomicUsize,
    replies: AtomicUsize,
    abandoned: AtomicUsize,
}

impl LoggingProgress {
    pub fn new(thread: ThreadId) -> Self {
        Self {
            thread,
            top_level: AtomicUsize::new(0),
            replies: AtomicUsize::new(0),
            abandoned: AtomicUsize::new(0),
        }
    }

    /// Items fetched so far, replies included. Counts repeats served by the source.
    pub fn fetched(&self) -> usize {
        self.top_level.load(Ordering::Relaxed) + self.replies.load(Ordering::Relaxed)
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::Relaxed)
    }
}

impl ProgressSink for LoggingProgress {
    fn emit(&self, event: HarvestEvent) {
        match event {
            HarvestEvent::TopLevelPage { page, items } => {
                self.top_level.fetch_add(items, Ordering::Relaxed);
                engine_info!(
                    "[{}] page {}: {} comments fetched so far",
                    self.thread,
                    page,
                    self.fetched()
                );
            }
            HarvestEvent::ChildPage { parent_id, items } => {
                self.replies.fetch_add(items, Ordering::Relaxed);
                engine_debug!("[{}] {} replies under {}", self.thread, items, parent_id);
            }
            HarvestEvent::StreamAbandoned { .. } => {
                self.abandoned.fetch_add(1, Ordering::Relaxed);
            }
            HarvestEvent::Idle => {
                engine_info!("[{}] {} comments fetched", self.thread, self.fetched());
            }
        }
    }
}
