//! Settings store
//!
//! An async key-value store holding JSON documents under three keys:
//! `settings`, `blockedSites`, and `statistics`. The file-backed store keeps
//! every key in a single JSON object and rewrites it atomically.

use async_trait::async_trait;
use pageguard_core::{Error, Result};
use pageguard_policy::Settings;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Key holding the user settings
pub const SETTINGS_KEY: &str = "settings";

/// Key holding the block list
pub const BLOCKED_SITES_KEY: &str = "blockedSites";

/// Key holding lifetime statistics
pub const STATISTICS_KEY: &str = "statistics";

/// Async key-value store
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a key; `None` when never written
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a key, replacing any previous value
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Load settings, falling back to defaults when absent or unreadable
pub async fn load_settings(store: &dyn SettingsStore) -> Settings {
    match store.get(SETTINGS_KEY).await {
        Ok(Some(value)) => Settings::from_json(value).unwrap_or_else(|e| {
            warn!("Stored settings are invalid, using defaults: {}", e);
            Settings::default()
        }),
        Ok(None) => Settings::default(),
        Err(e) => {
            warn!("Settings store unreadable, using defaults: {}", e);
            Settings::default()
        }
    }
}

/// Persist settings
pub async fn save_settings(store: &dyn SettingsStore, settings: &Settings) -> Result<()> {
    store.set(SETTINGS_KEY, serde_json::to_value(settings)?).await
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with initial keys
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Store persisted as one JSON object on disk
pub struct JsonFileStore {
    path: PathBuf,

    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Settings store at {:?}", path);
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::store(format!(
                "expected a JSON object in {:?}, found {}",
                self.path,
                json_type(&other)
            ))),
        }
    }

    async fn write_all(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling file, then rename over the original
        let tmp = self
            .path
            .with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        let json = serde_json::to_vec_pretty(map)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = ?self.path, keys = map.len(), "Settings store written");
        Ok(())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_all().await?;
        map.insert(key.to_string(), value);
        self.write_all(&map).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageguard_policy::Sensitivity;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());

        store.set("k", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.json");

        let store = JsonFileStore::new(&path);
        assert!(store.get(STATISTICS_KEY).await.unwrap().is_none());

        store.set(STATISTICS_KEY, json!({"totalPagesAnalyzed": 3})).await.unwrap();
        store.set(BLOCKED_SITES_KEY, json!([])).await.unwrap();

        // A fresh handle sees both keys
        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.get(STATISTICS_KEY).await.unwrap(),
            Some(json!({"totalPagesAnalyzed": 3}))
        );
        assert_eq!(reopened.get(BLOCKED_SITES_KEY).await.unwrap(), Some(json!([])));
    }

    #[tokio::test]
    async fn test_file_store_rejects_non_object() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.get(SETTINGS_KEY).await, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_settings_helpers() {
        let store = MemoryStore::new();
        assert_eq!(load_settings(&store).await, Settings::default());

        let settings = Settings {
            sensitivity: Sensitivity::Medium,
            ..Default::default()
        };
        save_settings(&store, &settings).await.unwrap();
        assert_eq!(load_settings(&store).await.sensitivity, Sensitivity::Medium);

        // Garbage degrades to defaults
        store.set(SETTINGS_KEY, json!("nope")).await.unwrap();
        assert_eq!(load_settings(&store).await, Settings::default());
    }
}
