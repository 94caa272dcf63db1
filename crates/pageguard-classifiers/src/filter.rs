//! Candidate filter
//!
//! Cheap synchronous heuristics deciding whether an item is worth a model
//! call. This is a cost-reduction gate, not a precision gate: anything it
//! lets through is settled by the classifier, so every doubtful case is
//! accepted.

use aho_corasick::AhoCorasick;
use pageguard_core::{ContentItem, ContentKind};
use tracing::warn;

/// Keywords that force analysis when found in a source or its context
pub const DEFAULT_PREFILTER_KEYWORDS: &[&str] = &["porn", "nsfw", "adult", "sex", "gore", "explicit"];

/// Filter thresholds
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Images below this intrinsic area are icons or sprites
    pub min_image_area: u64,

    /// Exempt-mode minimum for images inside post/thumbnail containers
    pub media_min_area: u64,

    /// Exempt-mode minimum for all other images
    pub loose_image_min_area: u64,

    /// Comments shorter than this carry too little signal
    pub min_comment_chars: usize,

    /// Case-insensitive prefilter keywords
    pub keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_image_area: 5_000,
            media_min_area: 10_000,
            loose_image_min_area: 50_000,
            min_comment_chars: 10,
            keywords: DEFAULT_PREFILTER_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Why an item was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No resolvable source or text
    NoSource,
    /// Image below the area floor
    TooSmall { area: u64 },
    /// Comment below the length floor
    TooShort,
    /// Already went through classification
    AlreadyAnalyzed,
}

/// Why an item was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptReason {
    /// Embedded `data:` image
    Inline,
    /// Source or context contains a prefilter keyword
    Keyword,
    /// Nothing special; analyzed by default
    Default,
}

/// Outcome of filtering one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept(AcceptReason),
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept(_))
    }

    /// Rejections that should still mark the item analyzed, so it is not
    /// reconsidered on every rescan
    pub fn is_final_reject(&self) -> bool {
        matches!(self, Self::Reject(RejectReason::TooShort))
    }
}

/// Candidate filter with an Aho-Corasick keyword prefilter
pub struct CandidateFilter {
    config: FilterConfig,
    keywords: Option<AhoCorasick>,
}

impl CandidateFilter {
    pub fn new(config: FilterConfig) -> Self {
        // A matcher that fails to build only loses keyword prioritization;
        // every item is still accepted by default.
        let keywords = match AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&config.keywords)
        {
            Ok(ac) => Some(ac),
            Err(e) => {
                warn!("Keyword prefilter disabled: {}", e);
                None
            }
        };

        Self { config, keywords }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Whether `item` is worth a classification call
    pub fn should_analyze(&self, item: &ContentItem) -> bool {
        self.evaluate(item).is_accept()
    }

    /// Full decision for general (non-exempt) pages
    pub fn evaluate(&self, item: &ContentItem) -> FilterDecision {
        if let Some(reject) = self.common_rejects(item) {
            return FilterDecision::Reject(reject);
        }
        self.accept_reason(item)
    }

    /// Decision for exempt (social/search) pages, where only sizeable post
    /// media and large standalone images are worth the call
    pub fn evaluate_exempt(&self, item: &ContentItem) -> FilterDecision {
        if let Some(reject) = self.common_rejects(item) {
            return FilterDecision::Reject(reject);
        }

        if let ContentKind::Image(info) = &item.kind {
            let area = info.area();
            let floor = if info.in_media_container {
                self.config.media_min_area
            } else {
                self.config.loose_image_min_area
            };
            if area <= floor {
                return FilterDecision::Reject(RejectReason::TooSmall { area });
            }
        }

        self.accept_reason(item)
    }

    fn common_rejects(&self, item: &ContentItem) -> Option<RejectReason> {
        let source = match item.source() {
            Some(source) => source,
            None => return Some(RejectReason::NoSource),
        };

        match &item.kind {
            ContentKind::Image(info) => {
                let area = info.area();
                if area < self.config.min_image_area {
                    return Some(RejectReason::TooSmall { area });
                }
            }
            ContentKind::Comment { .. } => {
                if source.chars().count() < self.config.min_comment_chars {
                    return Some(RejectReason::TooShort);
                }
            }
            ContentKind::TextBlock { .. } => {}
        }

        if item.analyzed {
            return Some(RejectReason::AlreadyAnalyzed);
        }

        None
    }

    fn accept_reason(&self, item: &ContentItem) -> FilterDecision {
        match &item.kind {
            ContentKind::Image(info) => {
                if info.is_inline() {
                    return FilterDecision::Accept(AcceptReason::Inline);
                }
                let source = info.resolved_source().unwrap_or_default();
                if self.has_keyword(source) || self.has_keyword(&info.context()) {
                    return FilterDecision::Accept(AcceptReason::Keyword);
                }
            }
            ContentKind::TextBlock { text } | ContentKind::Comment { text } => {
                if self.has_keyword(text) {
                    return FilterDecision::Accept(AcceptReason::Keyword);
                }
            }
        }

        FilterDecision::Accept(AcceptReason::Default)
    }

    fn has_keyword(&self, haystack: &str) -> bool {
        self.keywords
            .as_ref()
            .map(|ac| ac.is_match(haystack))
            .unwrap_or(false)
    }
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}
