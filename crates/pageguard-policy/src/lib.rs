//! PageGuard Policy
//!
//! Decides what happens to a page once verdicts arrive:
//! - User settings and the immutable per-visit [`Policy`] derived from them
//! - Site-mode selection (social platforms and search engines are exempt
//!   from whole-page blocking)
//! - The page safety evaluator aggregating weighted verdicts
//! - Mitigation actions (obscure, replace, block)

pub mod evaluator;
pub mod mitigation;
pub mod settings;
pub mod site;

pub use evaluator::{verdict_weight, PageSafetyEvaluator, PageState};
pub use mitigation::{BlockNotice, CommentPlaceholder, Mitigation, NoticeAction};
pub use settings::{Policy, Sensitivity, Settings, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use site::{is_exempt_record_url, CommentSelectorSet, Platform, SiteMode};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::evaluator::{PageSafetyEvaluator, PageState};
    pub use crate::mitigation::{BlockNotice, Mitigation};
    pub use crate::settings::{Policy, Settings};
    pub use crate::site::SiteMode;
}
