//! Live-document watching
//!
//! Hosts report mutations and scrolls as [`DocumentEvent`]s over a channel;
//! client-side navigation arrives through a [`NavigationSignal`].

use crate::document::PageDocument;
use async_trait::async_trait;
use pageguard_core::{NodeId, PageLocation};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Scroll events closer than this to the last accepted one are dropped
pub const SCROLL_THROTTLE: Duration = Duration::from_millis(500);

/// Delay between an accepted scroll and the rescan it triggers
pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(300);

/// Location polling interval for single-page applications
pub const NAVIGATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Change reported by the document host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// Content-bearing nodes were inserted
    NodesAdded(Vec<NodeId>),

    /// The viewport scrolled
    Scrolled,
}

/// Sending half handed to the document host
#[derive(Debug, Clone)]
pub struct DocumentWatcher {
    sender: mpsc::UnboundedSender<DocumentEvent>,
}

impl DocumentWatcher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DocumentEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Report inserted nodes; returns false once the analyzer has stopped
    pub fn nodes_added(&self, nodes: Vec<NodeId>) -> bool {
        if nodes.is_empty() {
            return true;
        }
        self.sender.send(DocumentEvent::NodesAdded(nodes)).is_ok()
    }

    pub fn scrolled(&self) -> bool {
        self.sender.send(DocumentEvent::Scrolled).is_ok()
    }
}

/// Scroll throttle plus debounce: at most one rescan per 300 ms quiet
/// period, and never more than two per second.
#[derive(Debug, Clone)]
pub struct ScrollGate {
    throttle: Duration,
    debounce: Duration,
    last_accepted: Option<Instant>,
    pending: Option<Instant>,
}

impl ScrollGate {
    pub fn new() -> Self {
        Self::with_timing(SCROLL_THROTTLE, SCROLL_DEBOUNCE)
    }

    pub fn with_timing(throttle: Duration, debounce: Duration) -> Self {
        Self {
            throttle,
            debounce,
            last_accepted: None,
            pending: None,
        }
    }

    /// Register a scroll at `now`; returns true when it (re)armed the rescan
    pub fn on_scroll(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.throttle {
                return false;
            }
        }
        self.last_accepted = Some(now);
        self.pending = Some(now + self.debounce);
        true
    }

    /// When the pending rescan is due
    pub fn deadline(&self) -> Option<Instant> {
        self.pending
    }

    /// Consume the pending rescan if it is due at `now`
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(deadline) if deadline <= now => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.pending = None;
    }
}

impl Default for ScrollGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of client-side navigation changes
///
/// `changed` is polled inside a `select!` next to document events, so it
/// must be cancel-safe: dropping the future before it resolves must not
/// lose or postpone a pending change.
#[async_trait]
pub trait NavigationSignal: Send {
    /// Wait for the next location change; `None` when the signal is closed
    async fn changed(&mut self) -> Option<PageLocation>;
}

/// Polls the document location on a fixed interval
///
/// The poll schedule lives in the signal rather than in each `changed`
/// call, so frequent cancellation does not push the next check back.
pub struct PollingNavigationSignal {
    document: Arc<dyn PageDocument>,
    interval: Duration,
    ticker: Option<Interval>,
    last_href: String,
}

impl PollingNavigationSignal {
    pub fn new(document: Arc<dyn PageDocument>) -> Self {
        Self::with_interval(document, NAVIGATION_POLL_INTERVAL)
    }

    pub fn with_interval(document: Arc<dyn PageDocument>, interval: Duration) -> Self {
        let last_href = document.location().href().to_string();
        Self {
            document,
            interval,
            ticker: None,
            last_href,
        }
    }

    fn ticker(&mut self) -> &mut Interval {
        let period = self.interval;
        self.ticker.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        })
    }
}

#[async_trait]
impl NavigationSignal for PollingNavigationSignal {
    async fn changed(&mut self) -> Option<PageLocation> {
        loop {
            self.ticker().tick().await;
            let location = self.document.location();
            if location.href() != self.last_href {
                debug!(from = %self.last_href, to = %location, "Location change detected");
                self.last_href = location.href().to_string();
                return Some(location);
            }
        }
    }
}

/// Navigation pushed by the host (history events)
pub struct ChannelNavigationSignal {
    receiver: mpsc::UnboundedReceiver<PageLocation>,
}

impl ChannelNavigationSignal {
    pub fn channel() -> (mpsc::UnboundedSender<PageLocation>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }
}

#[async_trait]
impl NavigationSignal for ChannelNavigationSignal {
    async fn changed(&mut self) -> Option<PageLocation> {
        self.receiver.recv().await
    }
}

/// A signal that never fires (static pages)
pub struct NoNavigation;

#[async_trait]
impl NavigationSignal for NoNavigation {
    async fn changed(&mut self) -> Option<PageLocation> {
        std::future::pending().await
    }
}
