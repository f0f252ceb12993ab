//! Thread core: data model and the shared result store for one harvest run.
mod snapshot;
mod store;
mod thread_id;
mod types;

pub use snapshot::ThreadSnapshot;
pub use store::{ChildItem, MergeOutcome, ResultStore, StoreError, TopLevelInsert, TopLevelItem};
pub use thread_id::{ThreadId, ThreadIdError, THREAD_ID_LEN};
pub use types::{Author, ChildItemData, Cursor, ItemContent, ItemId, Job, Page, TopLevelItemData};
