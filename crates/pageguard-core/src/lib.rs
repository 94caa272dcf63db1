//! PageGuard Core
//!
//! Core types, traits, and utilities shared across PageGuard components.
//!
//! This crate provides:
//! - The `Verdict` produced for every classified content item
//! - Content items discovered in a page and their fingerprints
//! - Page location helpers used for site-mode detection and block records
//! - Error types and result handling
//! - Data URL encoding for image payloads sent to the model

pub mod content;
pub mod data_url;
pub mod error;
pub mod location;
pub mod types;

pub use content::{ContentItem, ContentKind, Fingerprint, ImageInfo, ItemKind, NodeId, Rect, Viewport};
pub use data_url::DataUrl;
pub use error::{Error, Result};
pub use location::PageLocation;
pub use types::{is_inappropriate, Severity, Verdict};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::content::{ContentItem, ContentKind, Fingerprint, ItemKind, NodeId};
    pub use crate::error::{Error, Result};
    pub use crate::location::PageLocation;
    pub use crate::types::{Severity, Verdict};
}
