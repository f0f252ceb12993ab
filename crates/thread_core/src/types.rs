use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a top-level or child item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque continuation token for one pagination stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
}

/// Metadata shared by top-level and child items.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemContent {
    pub author: Author,
    pub text: String,
    /// Source-provided timestamp text, kept verbatim.
    pub published: String,
    pub like_count: u64,
    pub is_hearted: bool,
}

/// A top-level item as decoded from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelItemData {
    pub id: ItemId,
    pub content: ItemContent,
    /// First cursor of this item's child stream; `None` when it has no children.
    pub child_cursor: Option<Cursor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildItemData {
    pub id: ItemId,
    pub content: ItemContent,
}

/// One decoded page of a paginated stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<Cursor>) -> Self {
        Self { items, next_cursor }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Fetch the page at `cursor` of the child stream owned by `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub parent_id: ItemId,
    pub cursor: Cursor,
}

impl Job {
    pub fn new(parent_id: ItemId, cursor: Cursor) -> Self {
        Self { parent_id, cursor }
    }

    /// Continuation of the same stream at `next`.
    pub fn continuation(&self, next: Cursor) -> Self {
        Self {
            parent_id: self.parent_id.clone(),
            cursor: next,
        }
    }
}

impl TopLevelItemData {
    /// Split into the stored record and the first cursor of its child stream.
    pub fn into_parts(self) -> (crate::TopLevelItem, Option<Cursor>) {
        (
            crate::TopLevelItem::new(self.id, self.content),
            self.child_cursor,
        )
    }
}
