//! PageGuard agent
//!
//! Runs page visits end to end: discovers content in a [`PageDocument`],
//! schedules classification under a concurrency bound, applies
//! mitigations, and keeps watching the live document.
//!
//! The `pageguard` binary wraps this crate with a snapshot scanner and the
//! cross-origin fetch broker.

pub mod agent;
pub mod applier;
pub mod config;
pub mod document;
pub mod loader;
pub mod routes;
pub mod scheduler;
pub mod session;
pub mod watcher;

pub use agent::PageAgent;
pub use applier::MitigationApplier;
pub use config::{AgentConfig, ConfigOverrides};
pub use document::{PageDocument, PageSnapshot, SnapshotDocument, SnapshotNode};
pub use loader::{
    fetch_as_data_url, FetchImageRequest, FetchImageResponse, FetchProxy, HttpFetchProxy, HttpResourceFetcher,
    ImageLoader, ResourceFetcher, StaticResources, DEFAULT_FETCH_TIMEOUT,
};
pub use routes::{create_router, BrokerState};
pub use scheduler::{run_bounded, InFlightGuard, InFlightSet};
pub use session::{AgentContext, ClassifierConnector, ClassifierSource, PageAnalysisSession, Progress, SessionState};
pub use watcher::{
    ChannelNavigationSignal, DocumentEvent, DocumentWatcher, NavigationSignal, NoNavigation, PollingNavigationSignal,
    ScrollGate,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::agent::PageAgent;
    pub use crate::document::{PageDocument, SnapshotDocument};
    pub use crate::session::{AgentContext, ClassifierSource, PageAnalysisSession, SessionState};
    pub use crate::watcher::{DocumentEvent, DocumentWatcher};
}
