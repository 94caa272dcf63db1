//! Per-visit analysis session
//!
//! One [`PageAnalysisSession`] exists per page visit. It owns the page
//! state and drives discovered content through
//! filter → cache → scheduler → classifier → mitigation → evaluator.
//! Navigation replaces the session; nothing in it is reused.

use crate::applier::MitigationApplier;
use crate::document::PageDocument;
use crate::loader::ImageLoader;
use crate::scheduler::{run_bounded, InFlightSet};
use pageguard_classifiers::{
    CandidateFilter, ClassificationRequest, ContentClassifier, FilterDecision, LanguageModel, ModelClassifier,
    ResultCache,
};
use pageguard_core::{ContentItem, ContentKind, Error, Fingerprint, ItemKind, NodeId, PageLocation, Result, Verdict};
use pageguard_policy::{BlockNotice, PageSafetyEvaluator, PageState, Policy, SiteMode};
use pageguard_telemetry::{load_settings, BlockList, Notifier, SettingsStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Off-screen images considered by the initial scan
pub const MAX_OFFSCREEN_IMAGES: usize = 40;

/// Standalone (non-media) images considered on exempt pages
pub const MAX_EXEMPT_STANDALONE_IMAGES: usize = 20;

/// Images taken per scroll rescan
pub const SCROLL_IMAGE_BATCH: usize = 10;

/// Comments taken per scroll rescan
pub const SCROLL_COMMENT_BATCH: usize = 5;

/// Page text beyond this many characters is dropped
pub const PAGE_TEXT_MAX_CHARS: usize = 5000;

/// Page text shorter than this is not worth classifying
pub const PAGE_TEXT_MIN_CHARS: usize = 100;

/// Lifecycle of a visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Initializing,
    Scanning,
    Monitoring,
    /// Terminal: a page-level block was decided
    Blocked,
    /// Terminal no-op: analysis disabled or capability unavailable
    Disabled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Blocked | Self::Disabled)
    }
}

/// Completed versus discovered candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub analyzed: usize,
    pub total: usize,
}

/// Where the classifier comes from
#[derive(Clone)]
pub enum ClassifierSource {
    /// Initialize a session on a model host
    Model(Arc<dyn LanguageModel>),

    /// Already constructed
    Ready(Arc<dyn ContentClassifier>),
}

/// Lazily connects to the classifier and keeps it for later visits
pub struct ClassifierConnector {
    source: ClassifierSource,
    connected: Option<Arc<dyn ContentClassifier>>,
}

impl ClassifierConnector {
    pub fn new(source: ClassifierSource) -> Self {
        let connected = match &source {
            ClassifierSource::Ready(classifier) => Some(classifier.clone()),
            ClassifierSource::Model(_) => None,
        };
        Self { source, connected }
    }

    /// Connected classifier; fails with [`Error::CapabilityUnavailable`]
    pub async fn get(&mut self) -> Result<Arc<dyn ContentClassifier>> {
        if let Some(classifier) = &self.connected {
            return Ok(classifier.clone());
        }

        let classifier: Arc<dyn ContentClassifier> = match &self.source {
            ClassifierSource::Model(model) => Arc::new(ModelClassifier::initialize(model.as_ref()).await?),
            ClassifierSource::Ready(classifier) => classifier.clone(),
        };
        self.connected = Some(classifier.clone());
        Ok(classifier)
    }
}

/// Collaborators shared by every visit
#[derive(Clone)]
pub struct AgentContext {
    pub document: Arc<dyn PageDocument>,
    pub store: Arc<dyn SettingsStore>,
    pub notifier: Arc<dyn Notifier>,
    pub loader: Arc<ImageLoader>,
    pub filter: Arc<CandidateFilter>,

    /// Verdicts outlive a client-side navigation
    pub cache: Arc<ResultCache>,
}

/// Analysis state for one page visit
pub struct PageAnalysisSession {
    location: PageLocation,
    policy: Policy,
    mode: SiteMode,
    document: Arc<dyn PageDocument>,
    loader: Arc<ImageLoader>,
    filter: Arc<CandidateFilter>,
    classifier: Option<Arc<dyn ContentClassifier>>,
    cache: Arc<ResultCache>,
    applier: MitigationApplier,
    evaluator: Mutex<PageSafetyEvaluator>,
    in_flight: InFlightSet,
    queued_keys: InFlightSet<Fingerprint>,
    state: Mutex<SessionState>,
    text_verdict: Mutex<Option<Verdict>>,
    notice: Mutex<Option<BlockNotice>>,
}

impl PageAnalysisSession {
    /// Run the initializing phase for the document's current location.
    ///
    /// The returned session is ready to [`scan`](Self::scan), or already
    /// terminal (`Disabled`, or `Blocked` for a previously blocked page).
    pub async fn start(ctx: &AgentContext, connector: &mut ClassifierConnector) -> Self {
        let settings = load_settings(ctx.store.as_ref()).await;
        let policy = settings.policy();
        let location = ctx.document.location();
        let mode = SiteMode::detect(&location);

        let mut session = Self {
            evaluator: Mutex::new(PageSafetyEvaluator::new(&policy, &mode)),
            applier: MitigationApplier::new(
                ctx.document.clone(),
                ctx.store.clone(),
                ctx.notifier.clone(),
                policy.notify_on_block,
            ),
            location,
            policy,
            mode,
            document: ctx.document.clone(),
            loader: ctx.loader.clone(),
            filter: ctx.filter.clone(),
            classifier: None,
            cache: ctx.cache.clone(),
            in_flight: InFlightSet::new(),
            queued_keys: InFlightSet::new(),
            state: Mutex::new(SessionState::Initializing),
            text_verdict: Mutex::new(None),
            notice: Mutex::new(None),
        };

        if !session.policy.enabled {
            info!(url = %session.location, "Analysis disabled by settings");
            session.set_state(SessionState::Disabled);
            return session;
        }

        if let Err(e) = session.applier.statistics().record_page_analyzed().await {
            warn!("Failed to update statistics: {}", e);
        }

        if !session.mode.is_exempt() {
            let blocked = BlockList::load(ctx.store.as_ref()).await;
            if let Some(record) = blocked.blocking_record(session.location.href()) {
                info!(url = %session.location, "Page was blocked on an earlier visit");
                let notice = session.applier.show_previous_block(&record.reason);
                session.evaluator.lock().mark_blocked();
                *session.notice.lock() = Some(notice);
                session.set_state(SessionState::Blocked);
                return session;
            }
        }

        match connector.get().await {
            Ok(classifier) => session.classifier = Some(classifier),
            Err(e) => {
                warn!("Classification unavailable, page left unanalyzed: {}", e);
                session.set_state(SessionState::Disabled);
                return session;
            }
        }

        info!(
            url = %session.location,
            mode = session.mode.label(),
            threshold = session.policy.block_threshold,
            "Page analysis session ready"
        );
        session.set_state(SessionState::Scanning);
        session
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock();
        // Blocked is never left within a visit
        if *current != SessionState::Blocked {
            *current = state;
        }
    }

    pub fn location(&self) -> &PageLocation {
        &self.location
    }

    pub fn mode(&self) -> &SiteMode {
        &self.mode
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn page_state(&self) -> PageState {
        self.evaluator.lock().state().clone()
    }

    pub fn progress(&self) -> Progress {
        let evaluator = self.evaluator.lock();
        Progress {
            analyzed: evaluator.state().analyzed_count,
            total: evaluator.state().total_candidates,
        }
    }

    /// Notice shown if the page was blocked
    pub fn notice(&self) -> Option<BlockNotice> {
        self.notice.lock().clone()
    }

    pub fn is_blocked(&self) -> bool {
        self.evaluator.lock().is_blocked()
    }

    /// Initial discovery pass
    pub async fn scan(&self) -> SessionState {
        if self.state() != SessionState::Scanning {
            return self.state();
        }

        if self.mode.is_exempt() {
            self.scan_exempt().await;
        } else {
            self.scan_general().await;
        }

        if !self.is_blocked() {
            self.set_state(SessionState::Monitoring);
        }
        let progress = self.progress();
        info!(
            state = ?self.state(),
            analyzed = progress.analyzed,
            total = progress.total,
            count = self.page_state().blocked_content_count,
            "Initial scan finished"
        );
        self.state()
    }

    async fn scan_general(&self) {
        if self.policy.analyze_text {
            self.analyze_page_text().await;
            if self.is_blocked() {
                // Fast path: the text alone decided the page
                return;
            }
        }

        if self.policy.analyze_images {
            let viewport = self.document.viewport();
            let (visible, offscreen): (Vec<_>, Vec<_>) = self
                .select(self.document.images())
                .into_iter()
                .partition(|item| {
                    item.as_image()
                        .and_then(|info| info.bounds)
                        .map(|bounds| bounds.intersects(&viewport))
                        .unwrap_or(false)
                });

            let mut batch = visible;
            batch.extend(offscreen.into_iter().take(MAX_OFFSCREEN_IMAGES));
            debug!(images = batch.len(), "Scanning images");
            self.run_batch(batch).await;
        }
    }

    async fn scan_exempt(&self) {
        let mut batch = Vec::new();

        if self.policy.analyze_images {
            let (media, standalone): (Vec<_>, Vec<_>) = self
                .select(self.document.images())
                .into_iter()
                .partition(|item| item.as_image().map(|i| i.in_media_container).unwrap_or(false));
            batch.extend(media);
            batch.extend(standalone.into_iter().take(MAX_EXEMPT_STANDALONE_IMAGES));
        }

        if self.policy.analyze_text {
            if let Some(selectors) = &self.mode.comment_selectors {
                batch.extend(self.select(self.document.comments(selectors)));
            }
        }

        debug!(items = batch.len(), platform = self.mode.label(), "Scanning exempt page");
        self.run_batch(batch).await;

        if !self.check_volume().await {
            let count = self.page_state().blocked_content_count;
            if count > 0 {
                let reason = format!("{} items filtered on {}", count, self.mode.label());
                self.applier.record_partial_block(&self.location, &reason).await;
            }
        }
    }

    /// Feed newly inserted nodes through the pipeline
    pub async fn process_nodes(&self, nodes: Vec<NodeId>) {
        if self.state() != SessionState::Monitoring {
            return;
        }

        let items: Vec<ContentItem> = nodes
            .into_iter()
            .filter_map(|node| self.document.item(node))
            .filter(|item| self.wants_kind(item))
            .collect();
        if items.is_empty() {
            return;
        }

        let batch = self.select(items);
        debug!(items = batch.len(), "Analyzing inserted content");
        self.run_batch(batch).await;
        self.check_volume().await;
    }

    /// Scroll-triggered pass over content not analyzed yet
    pub async fn rescan(&self) {
        if self.state() != SessionState::Monitoring {
            return;
        }

        let mut batch = Vec::new();
        if self.policy.analyze_images {
            batch.extend(
                self.select(self.document.images())
                    .into_iter()
                    .take(SCROLL_IMAGE_BATCH),
            );
        }
        if let Some(selectors) = self.comment_selectors() {
            batch.extend(
                self.select(self.document.comments(selectors))
                    .into_iter()
                    .take(SCROLL_COMMENT_BATCH),
            );
        }
        if batch.is_empty() {
            return;
        }

        debug!(items = batch.len(), "Analyzing content after scroll");
        self.run_batch(batch).await;
        self.check_volume().await;
    }

    fn comment_selectors(&self) -> Option<&pageguard_policy::CommentSelectorSet> {
        if self.policy.analyze_text && self.mode.is_exempt() {
            self.mode.comment_selectors.as_ref()
        } else {
            None
        }
    }

    fn wants_kind(&self, item: &ContentItem) -> bool {
        match item.item_kind() {
            ItemKind::Image => self.policy.analyze_images,
            ItemKind::Comment => self.comment_selectors().is_some(),
            // Page text is classified once, as a whole
            ItemKind::TextBlock => false,
        }
    }

    /// Apply the mode's filter; final rejects are marked analyzed
    fn select(&self, items: Vec<ContentItem>) -> Vec<ContentItem> {
        items
            .into_iter()
            .filter(|item| {
                let decision = if self.mode.is_exempt() {
                    self.filter.evaluate_exempt(item)
                } else {
                    self.filter.evaluate(item)
                };
                if decision.is_final_reject() {
                    self.document.mark_analyzed(item.node);
                }
                matches!(decision, FilterDecision::Accept(_))
            })
            .filter(|item| !self.in_flight.contains(&item.node))
            .collect()
    }

    async fn run_batch(&self, items: Vec<ContentItem>) {
        if items.is_empty() {
            return;
        }
        run_bounded(items, self.policy.concurrency, || self.is_blocked(), |item| self.process_item(item)).await;
    }

    /// Exempt pages: transient block when the volume is extreme
    async fn check_volume(&self) -> bool {
        let (triggered, count) = {
            let mut evaluator = self.evaluator.lock();
            (evaluator.check_volume(), evaluator.state().blocked_content_count)
        };
        if triggered {
            let reason = format!("Too much inappropriate content detected: {} items", count);
            self.block_page(Some(reason), false).await;
        }
        triggered
    }

    async fn block_page(&self, reason: Option<String>, persist: bool) {
        let notice = self
            .applier
            .apply_page_block(&self.location, reason.as_deref(), persist)
            .await;
        *self.notice.lock() = Some(notice);
        self.set_state(SessionState::Blocked);
    }

    /// Classify one item and act on the verdict
    async fn process_item(&self, item: ContentItem) -> Option<Verdict> {
        let _claim = self.in_flight.try_claim(item.node)?;

        // Re-read: the node may have been analyzed or detached meanwhile
        let item = self.document.item(item.node)?;
        if item.analyzed || self.is_blocked() {
            return None;
        }

        let kind = item.item_kind();
        let key = item.fingerprint();
        self.evaluator.lock().add_candidates(1);

        // Duplicates of an identity wait for the first classification and read its cached verdict
        let _key_claim = match &key {
            Some(key) => Some(self.queued_keys.claim(key.clone()).await),
            None => None,
        };
        if self.is_blocked() {
            return None;
        }

        let verdict = match self.cached(key.as_ref()) {
            Some(verdict) => verdict,
            None => match self.classify_item(&item).await {
                Ok(verdict) => {
                    if let Some(key) = key {
                        self.cache.put(key, verdict.clone());
                    }
                    verdict
                }
                Err(e) => {
                    log_item_failure(item.node, kind, &e);
                    self.document.mark_analyzed(item.node);
                    return None;
                }
            },
        };

        self.document.mark_analyzed(item.node);
        self.evaluator.lock().record_completed();

        if let Some(v) = &verdict {
            let applied = match kind {
                ItemKind::Image => self.applier.apply_to_image(&item, v).await,
                ItemKind::Comment => self.applier.apply_to_comment(&item, v).await,
                ItemKind::TextBlock => Ok(false),
            };
            if let Err(e) = applied {
                warn!(node = %item.node, "Mitigation failed: {}", e);
            }
        }

        let blocked_now = self.evaluator.lock().record_verdict(kind, verdict.as_ref());
        if blocked_now {
            let reason = self.text_verdict.lock().as_ref().map(|v| v.reason.clone());
            self.block_page(reason, true).await;
        }

        verdict
    }

    fn cached(&self, key: Option<&Fingerprint>) -> Option<Option<Verdict>> {
        let key = key?;
        let hit = self.cache.get(key)?;
        debug!(%key, "Verdict served from cache");
        Some(hit)
    }

    async fn classify_item(&self, item: &ContentItem) -> Result<Option<Verdict>> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| Error::unavailable("classifier not initialized"))?;

        let request = match &item.kind {
            ContentKind::Image(info) => ClassificationRequest::Image(self.loader.load(&self.location, info).await?),
            ContentKind::Comment { text } => ClassificationRequest::Comment(text.clone()),
            ContentKind::TextBlock { text } => ClassificationRequest::PageText(text.clone()),
        };

        classifier.classify(&request, self.policy.timeout).await
    }

    /// Classify the page text as a whole; may block the page
    async fn analyze_page_text(&self) {
        let blocks = self.document.text_blocks();
        for block in &blocks {
            self.document.mark_analyzed(block.node);
        }

        let joined = blocks
            .iter()
            .filter_map(|b| b.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let text: String = joined.chars().take(PAGE_TEXT_MAX_CHARS).collect();

        if text.chars().count() < PAGE_TEXT_MIN_CHARS {
            debug!(chars = text.chars().count(), "Page text too short to classify");
            return;
        }

        let Some(classifier) = &self.classifier else {
            return;
        };

        self.evaluator.lock().add_candidates(1);
        let key = Fingerprint::from_text(&text);
        let verdict = match self.cached(key.as_ref()) {
            Some(verdict) => verdict,
            None => match classifier
                .classify(&ClassificationRequest::PageText(text), self.policy.timeout)
                .await
            {
                Ok(verdict) => {
                    if let Some(key) = key {
                        self.cache.put(key, verdict.clone());
                    }
                    verdict
                }
                Err(e) => {
                    warn!("Page text classification failed: {}", e);
                    return;
                }
            },
        };
        self.evaluator.lock().record_completed();

        if let Some(v) = verdict.as_ref().filter(|v| v.inappropriate) {
            info!(severity = %v.severity, categories = %v.categories_label(), "Page text flagged");
            *self.text_verdict.lock() = Some(v.clone());
        }

        let blocked_now = self
            .evaluator
            .lock()
            .record_verdict(ItemKind::TextBlock, verdict.as_ref());
        if blocked_now {
            let reason = verdict.map(|v| v.reason);
            self.block_page(reason, true).await;
        }
    }
}

fn log_item_failure(node: NodeId, kind: ItemKind, error: &Error) {
    match error {
        Error::Timeout(_) | Error::NetworkFailure(_) | Error::DomDetached(_) => {
            debug!(%node, kind = kind.as_str(), "Item skipped: {}", error)
        }
        _ => warn!(%node, kind = kind.as_str(), "Item classification failed: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingModel {
        sessions: AtomicU32,
    }

    struct SafeSession;

    #[async_trait]
    impl pageguard_classifiers::ModelSession for SafeSession {
        async fn prompt(
            &self,
            _parts: &[pageguard_classifiers::PromptPart],
            _options: &pageguard_classifiers::PromptOptions,
        ) -> Result<String> {
            Ok(r#"{"inappropriate": false, "reason": "ok", "severity": "low", "categories": []}"#.to_string())
        }
    }

    #[async_trait]
    impl LanguageModel for CountingModel {
        async fn availability(&self) -> Result<pageguard_classifiers::Availability> {
            Ok(pageguard_classifiers::Availability::Available)
        }

        async fn create_session(
            &self,
            _config: &pageguard_classifiers::SessionConfig,
        ) -> Result<Arc<dyn pageguard_classifiers::ModelSession>> {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(SafeSession))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_connector_opens_one_session() {
        let model = Arc::new(CountingModel {
            sessions: AtomicU32::new(0),
        });
        let mut connector = ClassifierConnector::new(ClassifierSource::Model(model.clone()));

        let first = connector.get().await.unwrap();
        let second = connector.get().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(model.sessions.load(Ordering::SeqCst), 1);

        let verdict = first
            .classify(&ClassificationRequest::Comment("hello there".into()), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!verdict.unwrap().inappropriate);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Blocked.is_terminal());
        assert!(SessionState::Disabled.is_terminal());
        assert!(!SessionState::Monitoring.is_terminal());
    }
}
