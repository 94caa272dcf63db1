//! Mitigation actions
//!
//! The data contract between a verdict and its visible effect. Styling is
//! left to the document host; these types carry only what to do and the
//! text to show.

use pageguard_core::{NodeId, Verdict};
use serde::{Deserialize, Serialize};

/// Label shown over obscured images
pub const IMAGE_OVERLAY_LABEL: &str = "Content Blocked";

/// Title of the comment placeholder
pub const COMMENT_PLACEHOLDER_TITLE: &str = "Content removed by PageGuard";

/// Title of the page block notice
pub const PAGE_BLOCK_TITLE: &str = "Page Blocked by PageGuard";

const PAGE_BLOCK_LEAD: &str = "This page contains content that may not be appropriate for children.";
const PAGE_BLOCK_FALLBACK: &str = "Multiple inappropriate elements detected.";

/// Action applied to the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Mitigation {
    /// Blur an image and cover it with a labelled overlay
    ObscureImage {
        node: NodeId,

        /// Shown as the overlay tooltip
        reason: String,

        #[serde(default)]
        categories: Vec<String>,

        /// Also neutralize the enclosing link, if any
        #[serde(default = "default_true")]
        disable_link: bool,
    },

    /// Hide a comment and insert a placeholder in its place
    ReplaceComment {
        node: NodeId,

        placeholder: CommentPlaceholder,
    },

    /// Cover the whole viewport
    BlockPage(BlockNotice),
}

fn default_true() -> bool {
    true
}

impl Mitigation {
    /// Obscure an image the verdict flagged
    pub fn for_image(node: NodeId, verdict: &Verdict) -> Self {
        Self::ObscureImage {
            node,
            reason: verdict.reason.clone(),
            categories: verdict.categories.iter().cloned().collect(),
            disable_link: true,
        }
    }

    /// Replace a comment the verdict flagged
    pub fn for_comment(node: NodeId, verdict: &Verdict) -> Self {
        Self::ReplaceComment {
            node,
            placeholder: CommentPlaceholder::from_verdict(verdict),
        }
    }

    /// Target node, for item-level mitigations
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::ObscureImage { node, .. } | Self::ReplaceComment { node, .. } => Some(*node),
            Self::BlockPage(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ObscureImage { .. } => "obscure_image",
            Self::ReplaceComment { .. } => "replace_comment",
            Self::BlockPage(_) => "block_page",
        }
    }
}

/// Text inserted in place of a removed comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPlaceholder {
    pub title: String,
    pub reason: String,

    /// Omitted when the verdict carried no categories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<String>,
}

impl CommentPlaceholder {
    pub fn from_verdict(verdict: &Verdict) -> Self {
        let label = verdict.categories_label();
        Self {
            title: COMMENT_PLACEHOLDER_TITLE.to_string(),
            reason: format!("Reason: {}", verdict.reason),
            categories: (!label.is_empty()).then(|| format!("Categories: {}", label)),
        }
    }
}

/// Buttons offered on the page block notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeAction {
    /// Navigate back in history
    GoBack,
    /// Close the tab
    Close,
}

impl NoticeAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::GoBack => "Go Back",
            Self::Close => "Close Page",
        }
    }
}

/// Full-viewport block notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockNotice {
    pub title: String,
    pub message: String,

    /// Raw reason, also used for the block record
    pub reason: String,

    pub actions: Vec<NoticeAction>,

    /// Recorded in the block list (false on exempt sites)
    pub persisted: bool,
}

impl BlockNotice {
    /// Build a notice; an empty reason falls back to a generic message
    pub fn new(reason: Option<&str>, persisted: bool) -> Self {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(PAGE_BLOCK_FALLBACK)
            .to_string();

        Self {
            title: PAGE_BLOCK_TITLE.to_string(),
            message: format!("{} {}", PAGE_BLOCK_LEAD, reason),
            reason,
            actions: vec![NoticeAction::GoBack, NoticeAction::Close],
            persisted,
        }
    }
}
