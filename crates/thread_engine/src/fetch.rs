use thread_core::{ChildItemData, Cursor, ItemId, Page, TopLevelItemData};

use crate::{FetchError, HarvestEvent};

/// One network round-trip for one page of a thread.
///
/// Implementations own their retry policy and only fail once it is exhausted.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// `None` fetches the first page of the thread.
    async fn fetch_top_level_page(
        &self,
        cursor: Option<&Cursor>,
    ) -> Result<Page<TopLevelItemData>, FetchError>;

    async fn fetch_child_page(
        &self,
        parent_id: &ItemId,
        cursor: &Cursor,
    ) -> Result<Page<ChildItemData>, FetchError>;
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit(&self, _event: HarvestEvent) {}
}
