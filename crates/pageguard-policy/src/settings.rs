//! User settings and the per-visit policy derived from them

use pageguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest allowed classification concurrency
pub const MIN_CONCURRENCY: usize = 2;

/// Highest allowed classification concurrency
pub const MAX_CONCURRENCY: usize = 6;

/// How strict page-level blocking is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Medium,
    #[default]
    High,
}

impl Sensitivity {
    /// Weighted count at which a page is blocked
    pub fn block_threshold(&self) -> u32 {
        match self {
            Self::High => 3,
            Self::Medium => 5,
            Self::Low => 7,
        }
    }
}

/// Settings as stored under the `settings` key.
///
/// Missing fields take their defaults, so a partial record from an older
/// version still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Master switch
    pub enabled: bool,

    pub sensitivity: Sensitivity,

    /// Explicit threshold overriding the sensitivity mapping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_threshold: Option<u32>,

    pub analyze_images: bool,

    /// Covers page text and comments
    pub analyze_text: bool,

    pub notify_on_block: bool,

    /// Classification calls in flight (clamped to 2..=6)
    pub concurrency: usize,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity: Sensitivity::High,
            block_threshold: None,
            analyze_images: true,
            analyze_text: true,
            notify_on_block: true,
            concurrency: MIN_CONCURRENCY,
            timeout_ms: 15_000,
        }
    }
}

impl Settings {
    /// Load settings from a JSON value
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::config(format!("invalid settings: {}", e)))
    }

    /// Load settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::config(format!("invalid settings: {}", e)))
    }

    /// Freeze into the policy used for one page visit
    pub fn policy(&self) -> Policy {
        Policy {
            enabled: self.enabled,
            sensitivity: self.sensitivity,
            block_threshold: self
                .block_threshold
                .filter(|t| *t > 0)
                .unwrap_or_else(|| self.sensitivity.block_threshold()),
            analyze_images: self.analyze_images,
            analyze_text: self.analyze_text,
            notify_on_block: self.notify_on_block,
            concurrency: self.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
            timeout: Duration::from_millis(self.timeout_ms.max(1)),
        }
    }
}

/// Immutable policy for one page visit
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub enabled: bool,
    pub sensitivity: Sensitivity,
    pub block_threshold: u32,
    pub analyze_images: bool,
    pub analyze_text: bool,
    pub notify_on_block: bool,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Settings::default().policy()
    }
}
