use serde::{Deserialize, Serialize};

use crate::store::TopLevelItem;
use crate::types::ItemId;

/// Read-only export of a [`crate::ResultStore`], in top-level fetch order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    pub items: Vec<TopLevelItem>,
}

impl ThreadSnapshot {
    pub fn new(items: Vec<TopLevelItem>) -> Self {
        Self { items }
    }

    pub fn top_level_count(&self) -> usize {
        self.items.len()
    }

    pub fn child_count(&self) -> usize {
        self.items.iter().map(|item| item.children().len()).sum()
    }

    /// Top-level items plus all of their children.
    pub fn total_count(&self) -> usize {
        self.top_level_count() + self.child_count()
    }

    pub fn get(&self, id: &ItemId) -> Option<&TopLevelItem> {
        self.items.iter().find(|item| &item.id == id)
    }
}
