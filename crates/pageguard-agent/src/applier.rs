//! Mitigation applier
//!
//! The only component with visible side effects: it mutates the document,
//! writes the block list and statistics, and emits notifications.

use crate::document::PageDocument;
use pageguard_core::{ContentItem, Error, ItemKind, PageLocation, Result, Verdict};
use pageguard_policy::{BlockNotice, Mitigation};
use pageguard_telemetry::metrics as telemetry_metrics;
use pageguard_telemetry::{save_block, BlockEvent, BlockType, Notifier, SettingsStore, StatisticsRecorder, PAGE_BLOCKED_BADGE};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct MitigationApplier {
    document: Arc<dyn PageDocument>,
    store: Arc<dyn SettingsStore>,
    statistics: StatisticsRecorder,
    notifier: Arc<dyn Notifier>,
    notify_on_block: bool,
}

impl MitigationApplier {
    pub fn new(
        document: Arc<dyn PageDocument>,
        store: Arc<dyn SettingsStore>,
        notifier: Arc<dyn Notifier>,
        notify_on_block: bool,
    ) -> Self {
        Self {
            statistics: StatisticsRecorder::new(store.clone()),
            document,
            store,
            notifier,
            notify_on_block,
        }
    }

    /// Obscure a flagged image and disable its link.
    ///
    /// Returns whether a mitigation was applied; appropriate verdicts and
    /// detached nodes are no-ops.
    pub async fn apply_to_image(&self, item: &ContentItem, verdict: &Verdict) -> Result<bool> {
        if !verdict.inappropriate {
            return Ok(false);
        }
        self.apply_item(Mitigation::for_image(item.node, verdict), ItemKind::Image, verdict)
            .await
    }

    /// Replace a flagged comment with a placeholder
    pub async fn apply_to_comment(&self, item: &ContentItem, verdict: &Verdict) -> Result<bool> {
        if !verdict.inappropriate {
            return Ok(false);
        }
        self.apply_item(Mitigation::for_comment(item.node, verdict), ItemKind::Comment, verdict)
            .await
    }

    async fn apply_item(&self, mitigation: Mitigation, kind: ItemKind, verdict: &Verdict) -> Result<bool> {
        match self.document.apply(&mitigation) {
            Ok(()) => {}
            Err(Error::DomDetached(node)) => {
                debug!(%node, "Node detached before mitigation, skipping");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        telemetry_metrics::record_item_blocked(kind);
        if let Err(e) = self.statistics.record_content_blocked(1).await {
            warn!("Failed to update statistics: {}", e);
        }

        if self.notify_on_block {
            self.notifier.notify(BlockEvent::ContentBlocked {
                kind,
                reason: verdict.reason.clone(),
                page: self.document.location().href().to_string(),
            });
        }

        debug!(kind = kind.as_str(), reason = %verdict.reason, "Content mitigated");
        Ok(true)
    }

    /// Block the whole page.
    ///
    /// With `persist`, the page is recorded as a total block so later visits
    /// are blocked immediately; exempt sites pass `false` and the block lasts
    /// only for this visit.
    pub async fn apply_page_block(&self, location: &PageLocation, reason: Option<&str>, persist: bool) -> BlockNotice {
        let notice = BlockNotice::new(reason, persist);
        if let Err(e) = self.document.apply(&Mitigation::BlockPage(notice.clone())) {
            warn!("Failed to show block notice: {}", e);
        }

        if persist {
            if let Err(e) = save_block(self.store.as_ref(), location, BlockType::Total, &notice.reason).await {
                warn!("Failed to record blocked page: {}", e);
            }
        }

        telemetry_metrics::record_page_blocked(persist);
        if let Err(e) = self.statistics.record_page_blocked().await {
            warn!("Failed to update statistics: {}", e);
        }

        if self.notify_on_block {
            self.notifier.notify(BlockEvent::PageBlocked {
                reason: notice.reason.clone(),
                page: location.href().to_string(),
                persisted: persist,
            });
        }
        self.notifier.set_badge(PAGE_BLOCKED_BADGE);

        info!(url = %location, persisted = persist, reason = %notice.reason, "Page blocked");
        notice
    }

    /// Show the notice for a page blocked on an earlier visit
    pub fn show_previous_block(&self, reason: &str) -> BlockNotice {
        let notice = BlockNotice::new(Some(reason), false);
        if let Err(e) = self.document.apply(&Mitigation::BlockPage(notice.clone())) {
            warn!("Failed to show block notice: {}", e);
        }
        self.notifier.set_badge(PAGE_BLOCKED_BADGE);
        notice
    }

    /// Record a per-item (partial) block for an exempt page
    pub async fn record_partial_block(&self, location: &PageLocation, reason: &str) {
        if let Err(e) = save_block(self.store.as_ref(), location, BlockType::Partial, reason).await {
            warn!("Failed to record partial block: {}", e);
        }
    }

    pub fn statistics(&self) -> &StatisticsRecorder {
        &self.statistics
    }
}
