//! PageGuard Classifiers
//!
//! Everything between a discovered content item and its verdict:
//! - A cheap candidate filter deciding whether an item is worth a model call
//! - A fingerprint-keyed result cache with a 24 hour TTL
//! - The model-backed classifier client with per-call timeouts
//! - The tolerant parser turning raw model text into a [`Verdict`]
//!
//! Inference itself is delegated to a [`LanguageModel`] host. An
//! OpenAI-compatible HTTP backend is provided for local inference servers.
//!
//! [`Verdict`]: pageguard_core::Verdict

pub mod cache;
pub mod capability;
pub mod classifier;
pub mod filter;
pub mod http_backend;
pub mod parser;
pub mod prompts;

pub use cache::{ResultCache, DEFAULT_CACHE_TTL};
pub use capability::{Availability, LanguageModel, ModelSession, PromptOptions, PromptPart, SessionConfig, Summarizer};
pub use classifier::{ClassificationRequest, ContentClassifier, ModelClassifier};
pub use filter::{AcceptReason, CandidateFilter, FilterConfig, FilterDecision, RejectReason};
pub use http_backend::{HttpBackendConfig, HttpLanguageModel};
pub use parser::{parse_verdict, try_parse_verdict};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cache::ResultCache;
    pub use crate::classifier::{ClassificationRequest, ContentClassifier, ModelClassifier};
    pub use crate::filter::{CandidateFilter, FilterDecision};
    pub use crate::parser::parse_verdict;
}
