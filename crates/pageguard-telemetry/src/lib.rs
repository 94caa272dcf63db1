//! PageGuard Telemetry
//!
//! State that outlives a page visit, and the signals emitted while one runs.
//!
//! Provides:
//! - The async settings store (in-memory and JSON-file backed)
//! - The block list of previously blocked pages
//! - Lifetime statistics
//! - Block notifications and the badge surface
//! - Metric names for the Prometheus exporter

pub mod blocklist;
pub mod metrics;
pub mod notify;
pub mod statistics;
pub mod store;

pub use blocklist::{cleanup_exempt_records, save_block, BlockList, BlockRecord, BlockType};
pub use notify::{BlockEvent, ChannelNotifier, LogNotifier, Notification, Notifier, PAGE_BLOCKED_BADGE};
pub use statistics::{Statistics, StatisticsRecorder};
pub use store::{load_settings, save_settings, JsonFileStore, MemoryStore, SettingsStore};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::blocklist::{BlockList, BlockType};
    pub use crate::notify::{BlockEvent, Notifier};
    pub use crate::statistics::StatisticsRecorder;
    pub use crate::store::SettingsStore;
}
