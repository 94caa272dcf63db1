//! Error types for PageGuard

use crate::content::NodeId;
use std::time::Duration;

/// Result type alias using PageGuard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for PageGuard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The classification backend is absent, still downloading, or disabled
    #[error("classification capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A single classification call exceeded its budget
    #[error("classification timed out after {0:?}")]
    Timeout(Duration),

    /// Model output did not conform to the verdict schema
    #[error("model output is not a valid verdict: {0}")]
    ParseFailure(String),

    /// Image bytes could not be retrieved through any strategy
    #[error("network error: {0}")]
    NetworkFailure(String),

    /// The target node left the document before mitigation was applied
    #[error("node {0} is no longer attached to the document")]
    DomDetached(NodeId),

    /// Settings store read/write errors
    #[error("store error: {0}")]
    Store(String),

    /// Classifier backend errors (HTTP status, malformed envelope)
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a capability-unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::CapabilityUnavailable(msg.into())
    }

    /// Create a parse failure
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseFailure(msg.into())
    }

    /// Create a network failure
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkFailure(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error halts the whole page pipeline.
    ///
    /// Only an unavailable capability is fatal; everything else is contained
    /// at the item boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable(_))
    }

    /// Short stable label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CapabilityUnavailable(_) => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::ParseFailure(_) => "parse",
            Self::NetworkFailure(_) => "network",
            Self::DomDetached(_) => "detached",
            Self::Store(_) => "store",
            Self::Classifier(_) => "classifier",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Url(_) => "url",
            Self::Internal(_) => "internal",
        }
    }
}
