//! Lifetime statistics kept in the settings store

use crate::store::{SettingsStore, STATISTICS_KEY};
use pageguard_core::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Counters shown to parents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    pub total_pages_analyzed: u64,
    pub total_content_blocked: u64,
    pub total_pages_blocked: u64,
}

/// Serialized read-modify-write access to [`Statistics`]
#[derive(Clone)]
pub struct StatisticsRecorder {
    store: Arc<dyn SettingsStore>,
    lock: Arc<Mutex<()>>,
}

impl StatisticsRecorder {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current counters; unreadable state reads as zero
    pub async fn snapshot(&self) -> Statistics {
        match self.store.get(STATISTICS_KEY).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Stored statistics are invalid, starting over: {}", e);
                Statistics::default()
            }),
            Ok(None) => Statistics::default(),
            Err(e) => {
                warn!("Statistics unreadable: {}", e);
                Statistics::default()
            }
        }
    }

    pub async fn record_page_analyzed(&self) -> Result<Statistics> {
        self.update(|s| s.total_pages_analyzed += 1).await
    }

    pub async fn record_content_blocked(&self, count: u64) -> Result<Statistics> {
        self.update(|s| s.total_content_blocked += count).await
    }

    pub async fn record_page_blocked(&self) -> Result<Statistics> {
        self.update(|s| s.total_pages_blocked += 1).await
    }

    async fn update(&self, apply: impl FnOnce(&mut Statistics)) -> Result<Statistics> {
        let _guard = self.lock.lock().await;
        let mut stats = self.snapshot().await;
        apply(&mut stats);
        self.store.set(STATISTICS_KEY, serde_json::to_value(stats)?).await?;
        Ok(stats)
    }
}
