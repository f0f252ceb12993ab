use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::snapshot::ThreadSnapshot;
use crate::types::{ChildItemData, ItemContent, ItemId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildItem {
    pub id: ItemId,
    #[serde(flatten)]
    pub content: ItemContent,
}

impl From<ChildItemData> for ChildItem {
    fn from(data: ChildItemData) -> Self {
        Self {
            id: data.id,
            content: data.content,
        }
    }
}

/// A stored top-level item together with the children merged so far.
///
/// Children keep page order; ids are unique within the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopLevelItem {
    pub id: ItemId,
    #[serde(flatten)]
    pub content: ItemContent,
    #[serde(rename = "replies", default)]
    children: Vec<ChildItem>,
}

impl TopLevelItem {
    pub fn new(id: ItemId, content: ItemContent) -> Self {
        Self {
            id,
            content,
            children: Vec::new(),
        }
    }

    pub fn children(&self) -> &[ChildItem] {
        &self.children
    }

    pub fn child(&self, id: &ItemId) -> Option<&ChildItem> {
        self.children.iter().find(|child| &child.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevelInsert {
    Inserted,
    /// The id was already present; the first record is kept.
    Duplicate,
}

/// What happened to one batch of children merged under a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub inserted: usize,
    /// Already present under the same parent; ignored.
    pub duplicates: usize,
    /// Already owned by a different parent; rejected.
    pub conflicts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no top-level item with id {0}")]
    UnknownParent(ItemId),
}

#[derive(Debug, Default)]
struct StoreInner {
    items: Vec<TopLevelItem>,
    index: HashMap<ItemId, usize>,
    owners: HashMap<ItemId, ItemId>,
}

/// Shared result structure for one harvest run.
///
/// A single mutex guards the top-level collection and every child
/// collection, so inserts for different parents may interleave freely.
#[derive(Debug, Default)]
pub struct ResultStore {
    inner: Mutex<StoreInner>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panicking writer never leaves a half-applied insert behind.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild a store from a previously exported snapshot.
    ///
    /// The snapshot is merged item by item, so the store invariants hold even
    /// for hand-edited input.
    pub fn from_snapshot(snapshot: ThreadSnapshot) -> Self {
        let store = Self::new();
        for item in snapshot.items {
            let TopLevelItem {
                id,
                content,
                children,
            } = item;
            if store.insert_top_level(TopLevelItem::new(id.clone(), content))
                == TopLevelInsert::Inserted
            {
                let children = children
                    .into_iter()
                    .map(|child| ChildItemData {
                        id: child.id,
                        content: child.content,
                    })
                    .collect();
                // The parent was inserted just above.
                let _ = store.merge_children(&id, children);
            }
        }
        store
    }

    pub fn insert_top_level(&self, item: TopLevelItem) -> TopLevelInsert {
        let mut inner = self.lock();
        if inner.index.contains_key(&item.id) {
            return TopLevelInsert::Duplicate;
        }
        let position = inner.items.len();
        inner.index.insert(item.id.clone(), position);
        inner.items.push(item);
        TopLevelInsert::Inserted
    }

    /// Merge one page of children under `parent`, in page order.
    pub fn merge_children(
        &self,
        parent: &ItemId,
        children: Vec<ChildItemData>,
    ) -> Result<MergeOutcome, StoreError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let position = *inner
            .index
            .get(parent)
            .ok_or_else(|| StoreError::UnknownParent(parent.clone()))?;

        let mut outcome = MergeOutcome::default();
        for child in children {
            match inner.owners.get(&child.id) {
                Some(owner) if owner == parent => outcome.duplicates += 1,
                Some(_) => outcome.conflicts += 1,
                None => {
                    inner.owners.insert(child.id.clone(), parent.clone());
                    inner.items[position].children.push(child.into());
                    outcome.inserted += 1;
                }
            }
        }
        Ok(outcome)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.lock().index.contains_key(id)
    }

    pub fn top_level_count(&self) -> usize {
        self.lock().items.len()
    }

    pub fn child_count(&self) -> usize {
        self.lock().owners.len()
    }

    /// Parent that owns `child`, if it has been merged.
    pub fn parent_of(&self, child: &ItemId) -> Option<ItemId> {
        self.lock().owners.get(child).cloned()
    }

    pub fn children_of(&self, parent: &ItemId) -> Option<Vec<ChildItem>> {
        let inner = self.lock();
        inner
            .index
            .get(parent)
            .map(|&position| inner.items[position].children.clone())
    }

    /// Point-in-time copy for persistence and rendering.
    pub fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot::new(self.lock().items.clone())
    }

    pub fn into_snapshot(self) -> ThreadSnapshot {
        let inner = self
            .inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        ThreadSnapshot::new(inner.items)
    }
}
