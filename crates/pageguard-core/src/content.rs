//! Content items discovered in a page
//!
//! Items are snapshots of document nodes. The document owns the node; the
//! pipeline only holds its [`NodeId`] and re-resolves it when it needs fresh
//! state, so a removed node is simply not found.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Opaque handle to a node in the host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity key used for caching and in-flight deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint from a source URL; blank sources have no identity
    pub fn from_source(source: &str) -> Option<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Fingerprint from text content.
    ///
    /// Text is normalized (whitespace collapsed, lowercased) and hashed so that
    /// the same comment re-rendered with different spacing maps to one key.
    pub fn from_text(text: &str) -> Option<Self> {
        let normalized = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Some(Self(format!("sha256:{:x}", hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Layout rectangle in viewport coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Whether any part of the rectangle lies inside the viewport
    pub fn intersects(&self, viewport: &Viewport) -> bool {
        let bottom = self.y + self.height;
        let right = self.x + self.width;
        !(bottom < 0.0 || self.y > viewport.height || right < 0.0 || self.x > viewport.width)
    }
}

/// Visible viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

/// Image attributes the filter and loader need
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageInfo {
    /// Direct `src` attribute
    pub src: Option<String>,

    /// Declared lazy-load source (`data-src`)
    pub lazy_src: Option<String>,

    /// Source the browser actually resolved
    pub current_src: Option<String>,

    /// Intrinsic width in pixels (0 when not yet decoded)
    pub natural_width: u32,

    /// Intrinsic height in pixels (0 when not yet decoded)
    pub natural_height: u32,

    pub alt: String,
    pub title: String,

    /// Leading text of the enclosing figure/article/div
    pub context_text: String,

    /// Layout box, if the image has been laid out
    pub bounds: Option<Rect>,

    /// Inside a platform post or video-thumbnail container
    pub in_media_container: bool,
}

impl ImageInfo {
    /// Intrinsic pixel area
    pub fn area(&self) -> u64 {
        u64::from(self.natural_width) * u64::from(self.natural_height)
    }

    /// Most specific available source: direct, then lazy-load, then resolved
    pub fn resolved_source(&self) -> Option<&str> {
        [&self.src, &self.lazy_src, &self.current_src]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// Embedded `data:` image
    pub fn is_inline(&self) -> bool {
        self.resolved_source()
            .and_then(|s| s.get(..5))
            .map(|prefix| prefix.eq_ignore_ascii_case("data:"))
            .unwrap_or(false)
    }

    /// Text surrounding the image that hints at its subject
    pub fn context(&self) -> String {
        format!("{} {} {}", self.alt, self.title, self.context_text)
    }
}

/// The variant-specific payload of a content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentKind {
    Image(ImageInfo),
    TextBlock { text: String },
    Comment { text: String },
}

/// Discriminant of [`ContentKind`], used for labels and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Image,
    #[serde(rename = "text")]
    TextBlock,
    Comment,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::TextBlock => "text",
            Self::Comment => "comment",
        }
    }
}

/// A content item discovered in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Handle of the backing node
    pub node: NodeId,

    /// Variant payload
    pub kind: ContentKind,

    /// Already went through classification (or was skipped for good)
    #[serde(default)]
    pub analyzed: bool,

    /// A mitigation was applied
    #[serde(default)]
    pub blocked: bool,
}

impl ContentItem {
    pub fn image(node: NodeId, info: ImageInfo) -> Self {
        Self::new(node, ContentKind::Image(info))
    }

    pub fn comment(node: NodeId, text: impl Into<String>) -> Self {
        Self::new(node, ContentKind::Comment { text: text.into() })
    }

    pub fn text_block(node: NodeId, text: impl Into<String>) -> Self {
        Self::new(node, ContentKind::TextBlock { text: text.into() })
    }

    fn new(node: NodeId, kind: ContentKind) -> Self {
        Self {
            node,
            kind,
            analyzed: false,
            blocked: false,
        }
    }

    pub fn item_kind(&self) -> ItemKind {
        match self.kind {
            ContentKind::Image(_) => ItemKind::Image,
            ContentKind::TextBlock { .. } => ItemKind::TextBlock,
            ContentKind::Comment { .. } => ItemKind::Comment,
        }
    }

    /// Image attributes, if this is an image
    pub fn as_image(&self) -> Option<&ImageInfo> {
        match &self.kind {
            ContentKind::Image(info) => Some(info),
            _ => None,
        }
    }

    /// Text payload of text blocks and comments
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ContentKind::TextBlock { text } | ContentKind::Comment { text } => Some(text),
            ContentKind::Image(_) => None,
        }
    }

    /// The string the filter treats as this item's source
    pub fn source(&self) -> Option<&str> {
        match &self.kind {
            ContentKind::Image(info) => info.resolved_source(),
            ContentKind::TextBlock { text } | ContentKind::Comment { text } => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
        }
    }

    /// Identity key; `None` means the item is never cached
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        match &self.kind {
            ContentKind::Image(info) => info.resolved_source().and_then(Fingerprint::from_source),
            ContentKind::TextBlock { text } | ContentKind::Comment { text } => {
                Fingerprint::from_text(text)
            }
        }
    }
}
