//! Concurrency-bounded scheduling of classification work

use futures::stream::{self, StreamExt};
use pageguard_core::NodeId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Notify;

/// Run `handler` over `items` with at most `limit` in flight.
///
/// Results come back in input order. Once `halted` returns true, items
/// not yet started resolve to `None` without running; handlers already in
/// flight complete normally.
pub async fn run_bounded<T, R, F, Fut, H>(items: Vec<T>, limit: usize, halted: H, handler: F) -> Vec<Option<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
    H: Fn() -> bool,
{
    let limit = limit.max(1);
    let halted = &halted;
    let handler = &handler;

    stream::iter(items)
        .map(|item| async move {
            if halted() {
                return None;
            }
            Some(handler(item).await)
        })
        .buffered(limit)
        .collect()
        .await
}

/// Identity-keyed set of queued or running items
#[derive(Debug)]
pub struct InFlightSet<K = NodeId> {
    inner: Arc<Mutex<HashSet<K>>>,
    released: Arc<Notify>,
}

impl<K> Default for InFlightSet<K> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashSet::new())),
            released: Arc::new(Notify::new()),
        }
    }
}

impl<K> Clone for InFlightSet<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            released: self.released.clone(),
        }
    }
}

impl<K: Eq + Hash + Clone> InFlightSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`; `None` when it is already queued
    pub fn try_claim(&self, key: K) -> Option<InFlightGuard<K>> {
        if self.inner.lock().insert(key.clone()) {
            Some(InFlightGuard {
                set: self.inner.clone(),
                released: self.released.clone(),
                key,
            })
        } else {
            None
        }
    }

    /// Claim `key`, waiting for the current holder to release it
    pub async fn claim(&self, key: K) -> InFlightGuard<K> {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed
            released.as_mut().enable();

            if let Some(guard) = self.try_claim(key.clone()) {
                return guard;
            }
            released.await;
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Releases the claim on drop
#[derive(Debug)]
pub struct InFlightGuard<K: Eq + Hash = NodeId> {
    set: Arc<Mutex<HashSet<K>>>,
    released: Arc<Notify>,
    key: K,
}

impl<K: Eq + Hash> InFlightGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
        self.released.notify_waiters();
    }
}
