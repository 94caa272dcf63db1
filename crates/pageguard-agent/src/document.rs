//! The document under analysis
//!
//! [`PageDocument`] is the seam to whatever hosts the page (a browser
//! bridge, a headless renderer, a recorded snapshot). The pipeline only
//! holds node ids; the document owns the content.

use pageguard_core::{ContentItem, ContentKind, DataUrl, Error, ItemKind, NodeId, PageLocation, Result, Viewport};
use pageguard_policy::{BlockNotice, CommentSelectorSet, Mitigation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

/// Document host
pub trait PageDocument: Send + Sync {
    /// Current location; changes on client-side navigation
    fn location(&self) -> PageLocation;

    fn viewport(&self) -> Viewport;

    /// Attached images in document order
    fn images(&self) -> Vec<ContentItem>;

    /// Attached text blocks in document order
    fn text_blocks(&self) -> Vec<ContentItem>;

    /// Attached comments matching any of `selectors`
    fn comments(&self, selectors: &CommentSelectorSet) -> Vec<ContentItem>;

    /// Current state of one node; `None` once detached
    fn item(&self, node: NodeId) -> Option<ContentItem>;

    /// Flag a node so it is never reconsidered
    fn mark_analyzed(&self, node: NodeId);

    /// Apply a mitigation; fails with [`Error::DomDetached`] when the
    /// target node is gone
    fn apply(&self, mitigation: &Mitigation) -> Result<()>;
}

/// One node in a recorded page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotNode {
    #[serde(flatten)]
    pub kind: ContentKind,

    /// Selector that matched a comment; `None` matches any platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl SnapshotNode {
    pub fn new(kind: ContentKind) -> Self {
        Self { kind, selector: None }
    }

    pub fn comment(text: impl Into<String>, selector: Option<&str>) -> Self {
        Self {
            kind: ContentKind::Comment { text: text.into() },
            selector: selector.map(str::to_string),
        }
    }
}

/// A recorded page, as loaded by `pageguard scan`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: PageLocation,

    #[serde(default)]
    pub viewport: Viewport,

    #[serde(default)]
    pub items: Vec<SnapshotNode>,

    /// Image bytes by absolute URL, as `data:` URLs
    #[serde(default)]
    pub resources: HashMap<String, String>,
}

impl PageSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Decoded resources; malformed entries are skipped
    pub fn decoded_resources(&self) -> HashMap<String, DataUrl> {
        self.resources
            .iter()
            .filter_map(|(url, data)| match DataUrl::parse(data) {
                Ok(decoded) => Some((url.clone(), decoded)),
                Err(e) => {
                    warn!(%url, "Skipping malformed snapshot resource: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Node {
    item: ContentItem,
    selector: Option<String>,
}

#[derive(Debug)]
struct SnapshotState {
    location: PageLocation,
    viewport: Viewport,
    nodes: BTreeMap<NodeId, Node>,
    next_id: u64,
    mitigations: Vec<Mitigation>,
}

impl SnapshotState {
    fn insert(&mut self, node: SnapshotNode) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        let item = ContentItem {
            node: id,
            kind: node.kind,
            analyzed: false,
            blocked: false,
        };
        self.nodes.insert(
            id,
            Node {
                item,
                selector: node.selector,
            },
        );
        id
    }

    fn of_kind(&self, kind: ItemKind) -> Vec<ContentItem> {
        self.nodes
            .values()
            .filter(|n| n.item.item_kind() == kind)
            .map(|n| n.item.clone())
            .collect()
    }
}

/// In-memory document built from a [`PageSnapshot`].
///
/// Records every mitigation it receives, and lets callers simulate
/// mutations, detachment, and client-side navigation.
#[derive(Debug)]
pub struct SnapshotDocument {
    state: RwLock<SnapshotState>,
}

impl SnapshotDocument {
    pub fn new(snapshot: PageSnapshot) -> Self {
        let mut state = SnapshotState {
            location: snapshot.url,
            viewport: snapshot.viewport,
            nodes: BTreeMap::new(),
            next_id: 0,
            mitigations: Vec::new(),
        };
        for node in snapshot.items {
            state.insert(node);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Empty page at `href`
    pub fn empty(href: &str) -> Result<Self> {
        Ok(Self::new(PageSnapshot {
            url: PageLocation::parse(href)?,
            viewport: Viewport::default(),
            items: Vec::new(),
            resources: HashMap::new(),
        }))
    }

    /// Insert nodes as a mutation would; returns their ids
    pub fn insert(&self, nodes: impl IntoIterator<Item = SnapshotNode>) -> Vec<NodeId> {
        let mut state = self.state.write();
        nodes.into_iter().map(|node| state.insert(node)).collect()
    }

    /// Remove a node from the document
    pub fn detach(&self, node: NodeId) -> bool {
        self.state.write().nodes.remove(&node).is_some()
    }

    /// Client-side navigation: new location, content replaced
    pub fn navigate(&self, location: PageLocation, nodes: impl IntoIterator<Item = SnapshotNode>) -> Vec<NodeId> {
        let mut state = self.state.write();
        state.location = location;
        state.nodes.clear();
        state.mitigations.clear();
        nodes.into_iter().map(|node| state.insert(node)).collect()
    }

    /// Mitigations applied so far, in order
    pub fn mitigations(&self) -> Vec<Mitigation> {
        self.state.read().mitigations.clone()
    }

    /// The page block notice, if one was shown
    pub fn page_block(&self) -> Option<BlockNotice> {
        self.state.read().mitigations.iter().find_map(|m| match m {
            Mitigation::BlockPage(notice) => Some(notice.clone()),
            _ => None,
        })
    }

    /// Attached nodes currently flagged blocked
    pub fn blocked_nodes(&self) -> Vec<NodeId> {
        self.state
            .read()
            .nodes
            .values()
            .filter(|n| n.item.blocked)
            .map(|n| n.item.node)
            .collect()
    }
}

impl PageDocument for SnapshotDocument {
    fn location(&self) -> PageLocation {
        self.state.read().location.clone()
    }

    fn viewport(&self) -> Viewport {
        self.state.read().viewport
    }

    fn images(&self) -> Vec<ContentItem> {
        self.state.read().of_kind(ItemKind::Image)
    }

    fn text_blocks(&self) -> Vec<ContentItem> {
        self.state.read().of_kind(ItemKind::TextBlock)
    }

    fn comments(&self, selectors: &CommentSelectorSet) -> Vec<ContentItem> {
        self.state
            .read()
            .nodes
            .values()
            .filter(|n| n.item.item_kind() == ItemKind::Comment)
            .filter(|n| match &n.selector {
                Some(selector) => selectors.selectors.iter().any(|s| *s == selector.as_str()),
                None => true,
            })
            .map(|n| n.item.clone())
            .collect()
    }

    fn item(&self, node: NodeId) -> Option<ContentItem> {
        self.state.read().nodes.get(&node).map(|n| n.item.clone())
    }

    fn mark_analyzed(&self, node: NodeId) {
        if let Some(n) = self.state.write().nodes.get_mut(&node) {
            n.item.analyzed = true;
        }
    }

    fn apply(&self, mitigation: &Mitigation) -> Result<()> {
        let mut state = self.state.write();

        if let Some(node) = mitigation.node() {
            match state.nodes.get_mut(&node) {
                Some(n) => n.item.blocked = true,
                None => return Err(Error::DomDetached(node)),
            }
        }

        debug!(kind = mitigation.kind(), "Mitigation applied to snapshot");
        state.mitigations.push(mitigation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageguard_policy::Platform;

    const SNAPSHOT: &str = r##"{
        "url": "https://www.youtube.com/watch?v=1",
        "items": [
            {"type": "image", "src": "https://i.ytimg.com/a.jpg", "naturalWidth": 320, "naturalHeight": 180, "inMediaContainer": true},
            {"type": "text_block", "text": "Video description"},
            {"type": "comment", "text": "great video thanks", "selector": "#content-text"},
            {"type": "comment", "text": "tweet text here", "selector": "div[lang] > span"}
        ],
        "resources": {"https://i.ytimg.com/a.jpg": "data:image/jpeg;base64,AQID"}
    }"##;

    #[test]
    fn test_snapshot_loading() {
        let snapshot = PageSnapshot::from_json(SNAPSHOT).unwrap();
        assert_eq!(snapshot.decoded_resources().len(), 1);

        let doc = SnapshotDocument::new(snapshot);
        let images = doc.images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].as_image().unwrap().area(), 57_600);
        assert!(images[0].as_image().unwrap().in_media_container);
        assert_eq!(doc.text_blocks().len(), 1);
    }

    #[test]
    fn test_comment_selector_matching() {
        let doc = SnapshotDocument::new(PageSnapshot::from_json(SNAPSHOT).unwrap());
        let youtube = Platform::Youtube.comment_selectors().unwrap();
        let comments = doc.comments(&youtube);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text(), Some("great video thanks"));
    }

    #[test]
    fn test_apply_and_detach() {
        let doc = SnapshotDocument::new(PageSnapshot::from_json(SNAPSHOT).unwrap());
        let image = doc.images().remove(0);
        let verdict = pageguard_core::Verdict::flagged("x", pageguard_core::Severity::Low, ["violence"]);

        doc.apply(&Mitigation::for_image(image.node, &verdict)).unwrap();
        assert!(doc.item(image.node).unwrap().blocked);

        assert!(doc.detach(image.node));
        let err = doc.apply(&Mitigation::for_image(image.node, &verdict)).unwrap_err();
        assert!(matches!(err, Error::DomDetached(n) if n == image.node));
        assert_eq!(doc.mitigations().len(), 1);
    }

    #[test]
    fn test_mutation_and_navigation() {
        let doc = SnapshotDocument::empty("https://example.com/").unwrap();
        let ids = doc.insert([SnapshotNode::new(ContentKind::TextBlock { text: "hi".into() })]);
        assert_eq!(ids.len(), 1);
        doc.mark_analyzed(ids[0]);
        assert!(doc.item(ids[0]).unwrap().analyzed);

        doc.navigate(PageLocation::parse("https://example.com/next").unwrap(), []);
        assert!(doc.item(ids[0]).is_none());
        assert_eq!(doc.location().path(), "/next");
    }
}
