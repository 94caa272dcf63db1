//! Block notifications
//!
//! Fire-and-forget: a notifier must never block or fail the pipeline.

use pageguard_core::ItemKind;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Something was blocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockEvent {
    /// One item was mitigated
    ContentBlocked {
        kind: ItemKind,
        reason: String,
        page: String,
    },

    /// The whole page was blocked
    PageBlocked {
        reason: String,
        page: String,
        persisted: bool,
    },
}

impl BlockEvent {
    /// Short user-facing message
    pub fn message(&self) -> String {
        match self {
            Self::ContentBlocked { kind, reason, .. } => {
                format!("Blocked {}: {}", kind.as_str(), reason)
            }
            Self::PageBlocked { reason, .. } => format!("Page blocked: {}", reason),
        }
    }
}

/// Badge text shown after a page block
pub const PAGE_BLOCKED_BADGE: &str = "!";

/// Notification and badge surface
pub trait Notifier: Send + Sync {
    fn notify(&self, event: BlockEvent);

    fn set_badge(&self, text: &str);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: BlockEvent) {
        info!(target: "pageguard::notify", "{}", event.message());
    }

    fn set_badge(&self, text: &str) {
        debug!(target: "pageguard::notify", badge = text, "Badge updated");
    }
}

/// What a [`ChannelNotifier`] forwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Event { event: BlockEvent },
    Badge { text: String },
}

/// Forwards notifications over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, notification: Notification) {
        // A dropped receiver just means nobody is listening
        if self.sender.send(notification).is_err() {
            debug!("Notification receiver dropped");
        }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: BlockEvent) {
        self.send(Notification::Event { event });
    }

    fn set_badge(&self, text: &str) {
        self.send(Notification::Badge {
            text: text.to_string(),
        });
    }
}
