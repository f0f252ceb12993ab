#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thread_core::{
    Author, ChildItemData, Cursor, ItemContent, ItemId, Page, TopLevelItemData,
};
use thread_engine::{FetchError, HarvestEvent, PageFetcher, ProgressSink};

pub fn content(text: &str) -> ItemContent {
    ItemContent {
        author: Author {
            id: format!("author-of-{text}"),
            name: format!("Author {text}"),
            avatar_url: "https://img.example/a.jpg".to_string(),
        },
        text: text.to_string(),
        published: "1 week ago".to_string(),
        like_count: 1,
        is_hearted: false,
    }
}

pub fn top(id: &str, child_cursor: Option<&str>) -> TopLevelItemData {
    TopLevelItemData {
        id: ItemId::from(id),
        content: content(id),
        child_cursor: child_cursor.map(Cursor::from),
    }
}

pub fn child(id: &str) -> ChildItemData {
    ChildItemData {
        id: ItemId::from(id),
        content: content(id),
    }
}

type TopKey = Option<String>;
type ChildKey = (String, String);

/// In-memory fetcher serving fixed pages, with injectable delays and failures.
#[derive(Default)]
pub struct StubFetcher {
    top_level: HashMap<TopKey, Result<Page<TopLevelItemData>, FetchError>>,
    children: HashMap<ChildKey, Result<Page<ChildItemData>, FetchError>>,
    delays: HashMap<ChildKey, Duration>,
    panics: HashSet<ChildKey>,
    child_delay: Duration,
    top_calls: Mutex<Vec<TopKey>>,
    child_calls: Mutex<Vec<ChildKey>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top_page(
        mut self,
        cursor: Option<&str>,
        items: Vec<TopLevelItemData>,
        next: Option<&str>,
    ) -> Self {
        self.top_level.insert(
            cursor.map(str::to_string),
            Ok(Page::new(items, next.map(Cursor::from))),
        );
        self
    }

    pub fn top_failure(mut self, cursor: Option<&str>, error: FetchError) -> Self {
        self.top_level.insert(cursor.map(str::to_string), Err(error));
        self
    }

    pub fn child_page(mut self, parent: &str, cursor: &str, ids: &[&str], next: Option<&str>) -> Self {
        let items = ids.iter().map(|id| child(id)).collect();
        self.children.insert(
            (parent.to_string(), cursor.to_string()),
            Ok(Page::new(items, next.map(Cursor::from))),
        );
        self
    }

    pub fn child_failure(mut self, parent: &str, cursor: &str, error: FetchError) -> Self {
        self.children
            .insert((parent.to_string(), cursor.to_string()), Err(error));
        self
    }

    /// The reply fetch for this page panics instead of returning.
    pub fn child_panic(mut self, parent: &str, cursor: &str) -> Self {
        self.panics.insert((parent.to_string(), cursor.to_string()));
        self
    }

    pub fn delay(mut self, parent: &str, cursor: &str, delay: Duration) -> Self {
        self.delays
            .insert((parent.to_string(), cursor.to_string()), delay);
        self
    }

    /// Delay applied to every reply page without its own delay.
    pub fn child_delay(mut self, delay: Duration) -> Self {
        self.child_delay = delay;
        self
    }

    pub fn child_calls(&self) -> Vec<ChildKey> {
        self.child_calls.lock().unwrap().clone()
    }

    pub fn child_calls_for(&self, parent: &str) -> Vec<String> {
        self.child_calls()
            .into_iter()
            .filter(|(p, _)| p == parent)
            .map(|(_, cursor)| cursor)
            .collect()
    }

    pub fn top_calls(&self) -> Vec<TopKey> {
        self.top_calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch_top_level_page(
        &self,
        cursor: Option<&Cursor>,
    ) -> Result<Page<TopLevelItemData>, FetchError> {
        let key = cursor.map(|c| c.as_str().to_string());
        self.top_calls.lock().unwrap().push(key.clone());
        self.top_level
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::parse(format!("no top-level fixture for {key:?}"))))
    }

    async fn fetch_child_page(
        &self,
        parent_id: &ItemId,
        cursor: &Cursor,
    ) -> Result<Page<ChildItemData>, FetchError> {
        let key = (parent_id.as_str().to_string(), cursor.as_str().to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.child_calls.lock().unwrap().push(key.clone());

        if self.panics.contains(&key) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            panic!("reply fetch blew up for {key:?}");
        }

        let delay = self.delays.get(&key).copied().unwrap_or(self.child_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self
            .children
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::parse(format!("no reply fixture for {key:?}"))));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<HarvestEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<HarvestEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: HarvestEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn init_logging() {
    engine_logging::initialize_for_tests();
}
