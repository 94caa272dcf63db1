//! Block list of previously blocked pages

use crate::store::{SettingsStore, BLOCKED_SITES_KEY};
use pageguard_core::{PageLocation, Result};
use pageguard_policy::is_exempt_record_url;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Whole page or individual items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Total,
    Partial,
}

/// One stored block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    /// Host + path, no scheme or query
    pub url: String,

    pub block_type: BlockType,

    pub reason: String,

    /// Milliseconds since the Unix epoch
    pub timestamp: u64,

    /// Set when a parent lifted the block
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unblocked: bool,
}

impl BlockRecord {
    pub fn new(location: &PageLocation, block_type: BlockType, reason: impl Into<String>) -> Self {
        Self {
            url: location.block_key(),
            block_type,
            reason: reason.into(),
            timestamp: now_millis(),
            unblocked: false,
        }
    }

    /// The record covers `href`
    pub fn matches(&self, href: &str) -> bool {
        !self.url.is_empty() && href.contains(&self.url)
    }

    pub fn is_active_total(&self) -> bool {
        self.block_type == BlockType::Total && !self.unblocked
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Ordered list of block records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockList {
    records: Vec<BlockRecord>,
}

impl BlockList {
    pub fn new(records: Vec<BlockRecord>) -> Self {
        Self { records }
    }

    /// Load from the store; unreadable lists are treated as empty
    pub async fn load(store: &dyn SettingsStore) -> Self {
        match store.get(BLOCKED_SITES_KEY).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Stored block list is invalid, ignoring it: {}", e);
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("Block list unreadable: {}", e);
                Self::default()
            }
        }
    }

    pub async fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        store.set(BLOCKED_SITES_KEY, serde_json::to_value(self)?).await
    }

    pub fn records(&self) -> &[BlockRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Active total block covering `href`
    pub fn blocking_record(&self, href: &str) -> Option<&BlockRecord> {
        self.records.iter().find(|r| r.is_active_total() && r.matches(href))
    }

    /// Replace the record covering `href`, or append a new one
    pub fn upsert(&mut self, href: &str, record: BlockRecord) {
        match self.records.iter_mut().find(|r| r.matches(href)) {
            Some(existing) => {
                debug!(url = %existing.url, "Updating block record");
                *existing = record;
            }
            None => self.records.push(record),
        }
    }

    /// Drop records for social/search sites; returns how many went
    pub fn remove_exempt(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !is_exempt_record_url(&r.url));
        before - self.records.len()
    }
}

/// Record a block for `location` in the stored list
pub async fn save_block(
    store: &dyn SettingsStore,
    location: &PageLocation,
    block_type: BlockType,
    reason: &str,
) -> Result<()> {
    let mut list = BlockList::load(store).await;
    list.upsert(location.href(), BlockRecord::new(location, block_type, reason));
    list.save(store).await?;
    info!(url = %location.block_key(), ?block_type, "Block recorded");
    Ok(())
}

/// Remove social/search records from the stored list
pub async fn cleanup_exempt_records(store: &dyn SettingsStore) -> Result<usize> {
    let mut list = BlockList::load(store).await;
    let removed = list.remove_exempt();
    if removed > 0 {
        list.save(store).await?;
    }
    info!(removed, remaining = list.len(), "Block list cleaned");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn location(href: &str) -> PageLocation {
        PageLocation::parse(href).unwrap()
    }

    #[test]
    fn test_blocking_record_lookup() {
        let list = BlockList::new(vec![
            BlockRecord::new(&location("https://bad.example/page"), BlockType::Total, "adult"),
            BlockRecord::new(&location("https://meh.example/"), BlockType::Partial, "2 items"),
        ]);

        assert!(list.blocking_record("https://bad.example/page?x=1").is_some());
        assert!(list.blocking_record("https://bad.example/other").is_none());
        assert!(list.blocking_record("https://meh.example/").is_none());
    }

    #[test]
    fn test_unblocked_records_do_not_block() {
        let mut record = BlockRecord::new(&location("https://bad.example/page"), BlockType::Total, "adult");
        record.unblocked = true;
        let list = BlockList::new(vec![record]);
        assert!(list.blocking_record("https://bad.example/page").is_none());
    }

    #[test]
    fn test_upsert_replaces_covering_record() {
        let loc = location("https://bad.example/page");
        let mut list = BlockList::default();
        list.upsert(loc.href(), BlockRecord::new(&loc, BlockType::Partial, "1 item"));
        list.upsert(loc.href(), BlockRecord::new(&loc, BlockType::Total, "violence"));

        assert_eq!(list.len(), 1);
        assert_eq!(list.records()[0].block_type, BlockType::Total);

        let other = location("https://other.example/");
        list.upsert(other.href(), BlockRecord::new(&other, BlockType::Total, "gore"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_wire_shape() {
        let list: BlockList = serde_json::from_value(json!([
            {"url": "bad.example/page", "blockType": "total", "reason": "adult", "timestamp": 1700000000000u64},
            {"url": "www.youtube.com/watch", "blockType": "partial", "reason": "3 items", "timestamp": 1, "unblocked": true}
        ]))
        .unwrap();

        assert!(list.records()[1].unblocked);
        let value = serde_json::to_value(&list).unwrap();
        assert!(value[0].get("unblocked").is_none());
        assert_eq!(value[0]["blockType"], "total");
    }

    #[tokio::test]
    async fn test_cleanup_removes_exempt_sites() {
        let store = MemoryStore::new();
        for href in [
            "https://www.youtube.com/watch",
            "https://www.google.com/search",
            "https://bad.example/page",
        ] {
            save_block(&store, &location(href), BlockType::Total, "test").await.unwrap();
        }

        assert_eq!(cleanup_exempt_records(&store).await.unwrap(), 2);
        let list = BlockList::load(&store).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list.records()[0].url, "bad.example/page");
    }
}
