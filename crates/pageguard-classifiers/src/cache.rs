//! Verdict cache keyed by content fingerprint
//!
//! Entries expire after a TTL (24 hours by default). Indeterminate results
//! are cached as well, so a source the model could not judge is not
//! re-sent within the same window.

use pageguard_core::{Fingerprint, Verdict};
use pageguard_telemetry::metrics::CACHE_HITS_TOTAL;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default entry lifetime
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    verdict: Option<Verdict>,
    stored_at: Instant,
}

/// Fingerprint → verdict map with lazy expiry
#[derive(Debug)]
pub struct ResultCache {
    ttl: Duration,
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached result for `key`.
    ///
    /// The outer `None` is a miss (absent or expired); `Some(None)` is a
    /// cached indeterminate verdict.
    pub fn get(&self, key: &Fingerprint) -> Option<Option<Verdict>> {
        self.get_at(key, Instant::now())
    }

    /// [`get`](Self::get) against an explicit clock reading
    pub fn get_at(&self, key: &Fingerprint, now: Instant) -> Option<Option<Verdict>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if now.saturating_duration_since(entry.stored_at) < self.ttl => {
                metrics::counter!(CACHE_HITS_TOTAL).increment(1);
                Some(entry.verdict.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a result; the last write for a key wins
    pub fn put(&self, key: Fingerprint, verdict: Option<Verdict>) {
        self.put_at(key, verdict, Instant::now());
    }

    /// [`put`](Self::put) with an explicit timestamp
    pub fn put_at(&self, key: Fingerprint, verdict: Option<Verdict>, now: Instant) {
        self.entries.lock().insert(
            key,
            CacheEntry {
                verdict,
                stored_at: now,
            },
        );
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.stored_at) < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
