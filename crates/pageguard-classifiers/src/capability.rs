//! The external generative-model capability
//!
//! PageGuard never runs inference itself. A host provides a [`LanguageModel`]
//! (an on-device model, a local inference server, ...) that can open prompt
//! sessions and, optionally, a summarizer used to compress long page text.

use async_trait::async_trait;
use pageguard_core::{DataUrl, Result};
use std::sync::Arc;
use std::time::Duration;

/// Availability reported by the model host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// No model on this runtime
    Unavailable,
    /// A model exists but must be downloaded first
    Downloadable,
    /// Download in progress
    Downloading,
    /// Ready to create sessions
    Available,
}

impl Availability {
    /// Only a ready model is usable within a page visit; a pending download
    /// is treated as unavailable.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Downloadable => "downloadable",
            Self::Downloading => "downloading",
            Self::Available => "available",
        }
    }
}

/// One part of a multimodal prompt
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Image(DataUrl),
}

/// Per-call prompt options
#[derive(Debug, Clone, Default)]
pub struct PromptOptions {
    /// Budget for the call; the caller enforces it as well
    pub timeout: Option<Duration>,

    /// JSON schema the response must conform to, when the backend supports
    /// schema-constrained output
    pub response_schema: Option<serde_json::Value>,
}

/// Options used when opening a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Standing instructions for every prompt in the session
    pub system_prompt: String,

    /// Session accepts image parts
    pub accepts_images: bool,

    /// Language the model should answer in
    pub output_language: String,
}

/// Generative model host
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Query availability before use
    async fn availability(&self) -> Result<Availability>;

    /// Open a prompt session
    async fn create_session(&self, config: &SessionConfig) -> Result<Arc<dyn ModelSession>>;

    /// Open a summarizer, if the host offers one
    async fn create_summarizer(&self) -> Result<Option<Arc<dyn Summarizer>>> {
        Ok(None)
    }

    /// Host name used in logs
    fn name(&self) -> &str;
}

/// An open prompt session
#[async_trait]
pub trait ModelSession: Send + Sync {
    /// Send one user turn and return the raw model text
    async fn prompt(&self, parts: &[PromptPart], options: &PromptOptions) -> Result<String>;
}

/// Compresses long text before classification
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, context: &str) -> Result<String>;
}
