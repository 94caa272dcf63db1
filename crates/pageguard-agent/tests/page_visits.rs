//! End-to-end page visits against snapshot documents
//!
//! A scripted classifier stands in for the model: verdicts are chosen by
//! markers in the comment text, page text, or image bytes.

use async_trait::async_trait;
use pageguard_agent::{
    AgentContext, ChannelNavigationSignal, ClassifierSource, DocumentWatcher, ImageLoader, NoNavigation, PageAgent,
    PageSnapshot, PollingNavigationSignal, SessionState, SnapshotDocument, SnapshotNode, StaticResources,
};
use pageguard_classifiers::{
    Availability, CandidateFilter, ClassificationRequest, ContentClassifier, LanguageModel, ModelSession,
    ResultCache, SessionConfig,
};
use pageguard_core::{ContentKind, DataUrl, Error, ImageInfo, PageLocation, Result, Severity, Verdict, Viewport};
use pageguard_policy::{Mitigation, Settings};
use pageguard_telemetry::{
    save_block, save_settings, BlockEvent, BlockList, BlockType, ChannelNotifier, JsonFileStore, LogNotifier,
    MemoryStore, Notification, StatisticsRecorder,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Classifier answering by marker
struct ScriptedClassifier {
    latency: Option<Duration>,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClassifier {
    fn new() -> Self {
        Self {
            latency: None,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(haystack: &str) -> Result<Option<Verdict>> {
        if haystack.contains("VIOLENT_TEXT") {
            Ok(Some(Verdict::flagged("graphic violence described", Severity::High, ["violence"])))
        } else if haystack.contains("UNSAFE") {
            Ok(Some(Verdict::flagged("nudity", Severity::Low, ["sexual"])))
        } else if haystack.contains("MAYBE") {
            Ok(None)
        } else if haystack.contains("SLOW") {
            Err(Error::Timeout(Duration::from_secs(15)))
        } else {
            Ok(Some(Verdict::safe("nothing of concern")))
        }
    }
}

#[async_trait]
impl ContentClassifier for ScriptedClassifier {
    async fn classify(&self, request: &ClassificationRequest, _timeout: Duration) -> Result<Option<Verdict>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let haystack = match request {
            ClassificationRequest::Image(data) => String::from_utf8_lossy(&data.bytes).into_owned(),
            ClassificationRequest::PageText(text) | ClassificationRequest::Comment(text) => text.clone(),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Self::answer(&haystack)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A model host with nothing installed
struct AbsentModel;

#[async_trait]
impl LanguageModel for AbsentModel {
    async fn availability(&self) -> Result<Availability> {
        Ok(Availability::Unavailable)
    }

    async fn create_session(&self, _config: &SessionConfig) -> Result<Arc<dyn ModelSession>> {
        Err(Error::unavailable("no model"))
    }

    fn name(&self) -> &str {
        "absent"
    }
}

struct Harness {
    document: Arc<SnapshotDocument>,
    store: Arc<MemoryStore>,
    classifier: Arc<ScriptedClassifier>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    ctx: AgentContext,
}

impl Harness {
    fn new(href: &str, items: Vec<SnapshotNode>) -> Self {
        Self::with_classifier(href, items, ScriptedClassifier::new())
    }

    fn with_classifier(href: &str, items: Vec<SnapshotNode>, classifier: ScriptedClassifier) -> Self {
        let document = Arc::new(SnapshotDocument::new(PageSnapshot {
            url: PageLocation::parse(href).unwrap(),
            viewport: Viewport::default(),
            items,
            resources: HashMap::new(),
        }));
        let store = Arc::new(MemoryStore::new());
        let (notifier, notifications) = ChannelNotifier::new();

        let ctx = AgentContext {
            document: document.clone(),
            store: store.clone(),
            notifier: Arc::new(notifier),
            loader: Arc::new(ImageLoader::new(Arc::new(StaticResources::new(HashMap::new())))),
            filter: Arc::new(CandidateFilter::default()),
            cache: Arc::new(ResultCache::default()),
        };

        Self {
            document,
            store,
            classifier: Arc::new(classifier),
            notifications,
            ctx,
        }
    }

    fn agent(&self) -> PageAgent {
        PageAgent::new(self.ctx.clone(), ClassifierSource::Ready(self.classifier.clone()))
    }

    async fn settings(&self, settings: Settings) {
        save_settings(self.store.as_ref(), &settings).await.unwrap();
    }

    async fn block_list(&self) -> BlockList {
        BlockList::load(self.store.as_ref()).await
    }

    fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }

    fn obscured_images(&self) -> usize {
        self.document
            .mitigations()
            .iter()
            .filter(|m| matches!(m, Mitigation::ObscureImage { .. }))
            .count()
    }

    fn replaced_comments(&self) -> usize {
        self.document
            .mitigations()
            .iter()
            .filter(|m| matches!(m, Mitigation::ReplaceComment { .. }))
            .count()
    }
}

/// Inline image carrying `marker` as its bytes
fn image(marker: &str, width: u32, height: u32) -> SnapshotNode {
    let data = DataUrl::new("image/png", marker.as_bytes().to_vec());
    SnapshotNode::new(ContentKind::Image(ImageInfo {
        src: Some(data.encode()),
        natural_width: width,
        natural_height: height,
        ..Default::default()
    }))
}

fn media_image(marker: &str) -> SnapshotNode {
    let data = DataUrl::new("image/jpeg", marker.as_bytes().to_vec());
    SnapshotNode::new(ContentKind::Image(ImageInfo {
        src: Some(data.encode()),
        natural_width: 320,
        natural_height: 180,
        in_media_container: true,
        ..Default::default()
    }))
}

fn text(body: &str) -> SnapshotNode {
    SnapshotNode::new(ContentKind::TextBlock { text: body.to_string() })
}

fn comment(body: &str) -> SnapshotNode {
    SnapshotNode::comment(body, None)
}

const ARTICLE_PADDING: &str = "This long article paragraph exists so that the page text clears the minimum length \
                               required before the page text is classified at all.";

#[tokio::test]
async fn test_three_flagged_images_block_general_page() {
    let mut h = Harness::new(
        "https://example.com/gallery",
        vec![image("UNSAFE-1", 100, 100), image("UNSAFE-2", 100, 100), image("UNSAFE-3", 100, 100)],
    );

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Blocked);
    assert_eq!(session.page_state().blocked_content_count, 3);
    assert_eq!(h.obscured_images(), 3);

    let notice = h.document.page_block().expect("block notice shown");
    assert!(notice.persisted);
    assert_eq!(notice.reason, "Multiple inappropriate elements detected.");

    let blocked = h.block_list().await;
    let record = blocked.blocking_record("https://example.com/gallery").expect("total record");
    assert_eq!(record.block_type, BlockType::Total);

    let stats = StatisticsRecorder::new(h.store.clone()).snapshot().await;
    assert_eq!(stats.total_pages_analyzed, 1);
    assert_eq!(stats.total_content_blocked, 3);
    assert_eq!(stats.total_pages_blocked, 1);

    let notifications = h.drain_notifications();
    assert!(notifications
        .iter()
        .any(|n| matches!(n, Notification::Event { event: BlockEvent::PageBlocked { persisted: true, .. } })));
    assert!(notifications.contains(&Notification::Badge { text: "!".into() }));
}

#[tokio::test]
async fn test_small_image_is_never_classified() {
    // 80 x 50 = 4000 px², below the area floor
    let h = Harness::new("https://example.com/", vec![image("UNSAFE", 80, 50)]);

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Monitoring);
    assert_eq!(h.classifier.calls(), 0);
    assert!(h.document.mitigations().is_empty());
}

#[tokio::test]
async fn test_flagged_page_text_blocks_before_images() {
    let h = Harness::new(
        "https://forum.example.org/thread/9",
        vec![
            text(&format!("VIOLENT_TEXT {}", ARTICLE_PADDING)),
            image("UNSAFE", 200, 200),
        ],
    );

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Blocked);
    assert_eq!(h.classifier.calls(), 1, "images are skipped once the text blocks the page");
    assert_eq!(session.page_state().blocked_content_count, 5);
    assert_eq!(h.obscured_images(), 0);

    let notice = session.notice().expect("notice");
    assert_eq!(notice.reason, "graphic violence described");
    assert!(notice.persisted);
}

#[tokio::test]
async fn test_short_page_text_is_not_classified() {
    let h = Harness::new("https://example.com/", vec![text("VIOLENT_TEXT but short")]);

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Monitoring);
    assert_eq!(h.classifier.calls(), 0);
}

#[tokio::test]
async fn test_youtube_comment_flood_blocks_transiently() {
    let comments = (1..=6)
        .map(|i| comment(&format!("UNSAFE comment number {}", i)))
        .collect();
    let h = Harness::new("https://www.youtube.com/watch?v=abc123", comments);

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Blocked);
    assert_eq!(h.replaced_comments(), 6);

    let notice = session.notice().expect("notice");
    assert!(!notice.persisted);
    assert_eq!(notice.reason, "Too much inappropriate content detected: 6 items");

    assert!(h.block_list().await.is_empty(), "exempt sites are never recorded as total blocks");
}

#[tokio::test]
async fn test_exempt_page_below_threshold_records_partial_block() {
    let h = Harness::new(
        "https://www.youtube.com/watch?v=xyz",
        vec![comment("UNSAFE remark under the video"), comment("lovely song, thanks for uploading")],
    );

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Monitoring);
    assert_eq!(h.replaced_comments(), 1);
    assert!(session.notice().is_none());

    let blocked = h.block_list().await;
    assert_eq!(blocked.len(), 1);
    let record = &blocked.records()[0];
    assert_eq!(record.block_type, BlockType::Partial);
    assert_eq!(record.reason, "1 items filtered on youtube");
}

#[tokio::test]
async fn test_exempt_page_skips_small_standalone_images() {
    // Standalone images need more than 50 000 px² on exempt pages
    let h = Harness::new(
        "https://www.instagram.com/p/abc/",
        vec![image("UNSAFE", 200, 200), media_image("UNSAFE-post")],
    );

    let session = h.agent().start_visit().await;

    assert_eq!(h.classifier.calls(), 1);
    assert_eq!(h.obscured_images(), 1);
    assert_eq!(session.state(), SessionState::Monitoring);
}

#[tokio::test]
async fn test_safe_and_indeterminate_verdicts_change_nothing() {
    let h = Harness::new(
        "https://example.com/",
        vec![image("fine", 100, 100), image("MAYBE", 100, 100)],
    );

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Monitoring);
    assert!(h.document.mitigations().is_empty());
    assert_eq!(session.page_state().blocked_content_count, 0);
    let progress = session.progress();
    assert_eq!((progress.analyzed, progress.total), (2, 2));
}

#[tokio::test]
async fn test_failed_classification_is_skipped() {
    let h = Harness::new("https://example.com/", vec![image("SLOW", 100, 100)]);

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Monitoring);
    assert!(h.document.mitigations().is_empty());
    let progress = session.progress();
    assert_eq!((progress.analyzed, progress.total), (0, 1));

    // Marked analyzed, so a rescan does not retry it
    session.rescan().await;
    assert_eq!(h.classifier.calls(), 1);
}

#[tokio::test]
async fn test_previously_blocked_page_is_blocked_without_classification() {
    let h = Harness::new("https://example.com/bad/page?x=1", vec![image("UNSAFE", 100, 100)]);
    let earlier = PageLocation::parse("https://example.com/bad/page").unwrap();
    save_block(h.store.as_ref(), &earlier, BlockType::Total, "violent imagery")
        .await
        .unwrap();

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Blocked);
    assert_eq!(h.classifier.calls(), 0);
    let notice = h.document.page_block().expect("notice");
    assert_eq!(notice.reason, "violent imagery");
    assert_eq!(h.block_list().await.len(), 1);
}

#[tokio::test]
async fn test_disabled_settings_do_nothing() {
    let h = Harness::new("https://example.com/", vec![image("UNSAFE", 100, 100)]);
    h.settings(Settings {
        enabled: false,
        ..Settings::default()
    })
    .await;

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Disabled);
    assert_eq!(h.classifier.calls(), 0);
    let stats = StatisticsRecorder::new(h.store.clone()).snapshot().await;
    assert_eq!(stats.total_pages_analyzed, 0);
}

#[tokio::test]
async fn test_images_off_leaves_images_alone() {
    let h = Harness::new("https://example.com/", vec![image("UNSAFE", 100, 100)]);
    h.settings(Settings {
        analyze_images: false,
        ..Settings::default()
    })
    .await;

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Monitoring);
    assert_eq!(h.classifier.calls(), 0);
}

#[tokio::test]
async fn test_unavailable_model_disables_the_visit() {
    let h = Harness::new("https://example.com/", vec![image("UNSAFE", 100, 100)]);
    let mut agent = PageAgent::new(h.ctx.clone(), ClassifierSource::Model(Arc::new(AbsentModel)));

    assert_eq!(agent.state(), SessionState::Idle);
    let session = agent.start_visit().await;

    assert_eq!(session.state(), SessionState::Disabled);
    assert!(agent.state().is_terminal());
    assert!(h.document.mitigations().is_empty());
}

#[tokio::test]
async fn test_explicit_threshold_overrides_sensitivity() {
    let h = Harness::new(
        "https://example.com/",
        vec![image("UNSAFE-1", 100, 100), image("UNSAFE-2", 100, 100), image("UNSAFE-3", 100, 100)],
    );
    h.settings(Settings {
        block_threshold: Some(10),
        ..Settings::default()
    })
    .await;

    let session = h.agent().start_visit().await;

    assert_eq!(session.state(), SessionState::Monitoring);
    assert_eq!(h.obscured_images(), 3);
}

#[tokio::test]
async fn test_inserted_nodes_are_analyzed_once() {
    let h = Harness::new("https://example.com/feed", vec![]);
    let session = h.agent().start_visit().await;
    assert_eq!(session.state(), SessionState::Monitoring);

    let ids = h.document.insert([image("UNSAFE-late", 100, 100)]);
    session.process_nodes(ids.clone()).await;
    assert_eq!(h.obscured_images(), 1);
    assert_eq!(h.classifier.calls(), 1);

    session.process_nodes(ids).await;
    assert_eq!(h.classifier.calls(), 1);
    assert_eq!(h.obscured_images(), 1);
}

#[tokio::test]
async fn test_repeated_source_is_served_from_cache() {
    let h = Harness::new("https://example.com/feed", vec![image("UNSAFE-dup", 100, 100)]);
    let session = h.agent().start_visit().await;
    assert_eq!(h.classifier.calls(), 1);

    let ids = h.document.insert([image("UNSAFE-dup", 100, 100)]);
    session.process_nodes(ids).await;

    assert_eq!(h.classifier.calls(), 1);
    assert_eq!(h.obscured_images(), 2);
    assert_eq!(session.page_state().blocked_content_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_source_in_one_batch_is_mitigated_twice() {
    let h = Harness::with_classifier(
        "https://example.com/feed",
        vec![image("UNSAFE-same", 100, 100), image("UNSAFE-same", 100, 100)],
        ScriptedClassifier::new().with_latency(Duration::from_millis(50)),
    );

    let session = h.agent().start_visit().await;

    assert_eq!(h.classifier.calls(), 1, "the second copy reads the first verdict");
    assert_eq!(h.obscured_images(), 2);
    assert_eq!(session.page_state().blocked_content_count, 2);
    assert_eq!(session.state(), SessionState::Monitoring);
    let progress = session.progress();
    assert_eq!((progress.analyzed, progress.total), (2, 2));
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_passes_count_each_item_once() {
    let h = Harness::with_classifier(
        "https://example.com/feed",
        vec![],
        ScriptedClassifier::new().with_latency(Duration::from_millis(50)),
    );
    let session = h.agent().start_visit().await;

    let ids = h.document.insert((0..5).map(|i| image(&format!("fine-{}", i), 100, 100)));
    tokio::join!(session.process_nodes(ids.clone()), session.process_nodes(ids));

    assert_eq!(h.classifier.calls(), 5);
    let progress = session.progress();
    assert_eq!((progress.analyzed, progress.total), (5, 5));
}

#[tokio::test(start_paused = true)]
async fn test_classification_respects_concurrency_setting() {
    let items = (0..8).map(|i| image(&format!("fine-{}", i), 100, 100)).collect();
    let h = Harness::with_classifier(
        "https://example.com/",
        items,
        ScriptedClassifier::new().with_latency(Duration::from_millis(50)),
    );
    h.settings(Settings {
        concurrency: 3,
        ..Settings::default()
    })
    .await;

    h.agent().start_visit().await;

    assert_eq!(h.classifier.calls(), 8);
    assert_eq!(h.classifier.max_in_flight(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_scroll_rescans_are_batched_and_throttled() {
    let h = Harness::new("https://example.com/infinite", vec![]);
    let (watcher, events) = DocumentWatcher::channel();
    let document = h.document.clone();
    let classifier = h.classifier.clone();

    let driver = async move {
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Lazy images appear without a mutation event
        document.insert((0..12).map(|i| image(&format!("lazy-{}", i), 100, 100)));

        assert!(watcher.scrolled());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(watcher.scrolled()); // throttled
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(classifier.calls(), 10, "one rescan of at most ten images");

        assert!(watcher.scrolled());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(classifier.calls(), 12);

        drop(watcher);
    };

    let (state, ()) = tokio::join!(h.agent().run(events, NoNavigation), driver);
    assert_eq!(state, SessionState::Monitoring);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_starts_a_fresh_visit() {
    let h = Harness::new(
        "https://example.com/a",
        vec![image("UNSAFE-1", 100, 100), image("UNSAFE-2", 100, 100), image("UNSAFE-3", 100, 100)],
    );
    let (watcher, events) = DocumentWatcher::channel();
    let (navigate, navigation) = ChannelNavigationSignal::channel();
    let document = h.document.clone();

    let driver = async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(document.page_block().is_some());

        let next = PageLocation::parse("https://example.com/b").unwrap();
        document.navigate(next.clone(), [image("fine", 100, 100)]);
        navigate.send(next).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // New nodes after navigation reach the new session
        let ids = document.insert([image("UNSAFE-b", 100, 100)]);
        assert!(watcher.nodes_added(ids));
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(watcher);
    };

    let (state, ()) = tokio::join!(h.agent().run(events, navigation), driver);

    assert_eq!(state, SessionState::Monitoring);
    assert!(h.document.page_block().is_none());
    assert_eq!(h.obscured_images(), 1);

    let stats = StatisticsRecorder::new(h.store.clone()).snapshot().await;
    assert_eq!(stats.total_pages_analyzed, 2);
    assert_eq!(stats.total_pages_blocked, 1);
}

#[tokio::test(start_paused = true)]
async fn test_polled_navigation_is_seen_during_steady_mutations() {
    let h = Harness::new("https://spa.example.com/a", vec![image("fine-a", 100, 100)]);
    let (watcher, events) = DocumentWatcher::channel();
    let navigation = PollingNavigationSignal::new(h.document.clone());
    let document = h.document.clone();

    let driver = async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        document.navigate(
            PageLocation::parse("https://spa.example.com/b").unwrap(),
            [image("UNSAFE-1", 100, 100), image("UNSAFE-2", 100, 100), image("UNSAFE-3", 100, 100)],
        );

        // A feed that keeps inserting nodes faster than the poll interval
        for i in 0..6 {
            let ids = document.insert([image(&format!("fine-{}", i), 100, 100)]);
            assert!(watcher.nodes_added(ids));
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        drop(watcher);
    };

    let (state, ()) = tokio::join!(h.agent().run(events, navigation), driver);

    assert_eq!(state, SessionState::Blocked);
    assert!(h.document.page_block().is_some());

    let stats = StatisticsRecorder::new(h.store.clone()).snapshot().await;
    assert_eq!(stats.total_pages_analyzed, 2);
    assert_eq!(stats.total_pages_blocked, 1);
}

#[tokio::test]
async fn test_block_survives_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let href = "https://example.com/gallery";
    let items = || vec![image("UNSAFE-1", 100, 100), image("UNSAFE-2", 100, 100), image("UNSAFE-3", 100, 100)];

    let visit = |document: Arc<SnapshotDocument>, classifier: Arc<ScriptedClassifier>| {
        let ctx = AgentContext {
            document,
            store: Arc::new(JsonFileStore::new(&path)),
            notifier: Arc::new(LogNotifier),
            loader: Arc::new(ImageLoader::new(Arc::new(StaticResources::new(HashMap::new())))),
            filter: Arc::new(CandidateFilter::default()),
            cache: Arc::new(ResultCache::default()),
        };
        PageAgent::new(ctx, ClassifierSource::Ready(classifier))
    };

    let first = Harness::new(href, items());
    let session = visit(first.document.clone(), first.classifier.clone()).start_visit().await;
    assert_eq!(session.state(), SessionState::Blocked);

    let second = Harness::new(href, items());
    let session = visit(second.document.clone(), second.classifier.clone()).start_visit().await;
    assert_eq!(session.state(), SessionState::Blocked);
    assert_eq!(second.classifier.calls(), 0);

    let store = JsonFileStore::new(&path);
    let stats = StatisticsRecorder::new(Arc::new(store)).snapshot().await;
    assert_eq!(stats.total_pages_analyzed, 2);
    assert_eq!(stats.total_pages_blocked, 1);
}
