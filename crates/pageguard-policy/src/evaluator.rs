//! Page safety evaluation
//!
//! Aggregates per-item verdicts into a weighted count and decides whether
//! the whole page is blocked. A block decision is never un-made within a
//! visit.

use crate::settings::Policy;
use crate::site::SiteMode;
use pageguard_core::{ItemKind, Verdict};
use serde::Serialize;
use tracing::{debug, info};

/// Running aggregate for one page visit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    /// Severity-weighted count of inappropriate verdicts
    pub blocked_content_count: u32,

    /// Candidates discovered so far
    pub total_candidates: usize,

    /// Candidates whose classification completed
    pub analyzed_count: usize,

    /// A page-level block was decided
    pub blocked: bool,
}

/// Weight a verdict contributes to the count
pub fn verdict_weight(kind: ItemKind, verdict: &Verdict) -> u32 {
    if !verdict.inappropriate {
        return 0;
    }
    match kind {
        ItemKind::TextBlock => verdict.severity.text_weight(),
        ItemKind::Image | ItemKind::Comment => 1,
    }
}

/// Decides page-level blocks from item verdicts
#[derive(Debug, Clone)]
pub struct PageSafetyEvaluator {
    threshold: u32,
    exempt: bool,
    state: PageState,
}

impl PageSafetyEvaluator {
    pub fn new(policy: &Policy, mode: &SiteMode) -> Self {
        Self {
            threshold: policy.block_threshold,
            exempt: mode.is_exempt(),
            state: PageState::default(),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_exempt(&self) -> bool {
        self.exempt
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn is_blocked(&self) -> bool {
        self.state.blocked
    }

    /// Record one verdict.
    ///
    /// Returns `true` only on the transition to blocked. Absent and
    /// appropriate verdicts leave the count unchanged. Exempt pages never
    /// block here; see [`check_volume`](Self::check_volume).
    pub fn record_verdict(&mut self, kind: ItemKind, verdict: Option<&Verdict>) -> bool {
        if self.state.blocked {
            return false;
        }

        let weight = match verdict {
            Some(v) => verdict_weight(kind, v),
            None => 0,
        };
        if weight == 0 {
            return false;
        }

        self.state.blocked_content_count += weight;
        debug!(
            kind = kind.as_str(),
            weight,
            count = self.state.blocked_content_count,
            threshold = self.threshold,
            "Inappropriate content recorded"
        );

        if self.exempt || self.state.blocked_content_count < self.threshold {
            return false;
        }

        self.state.blocked = true;
        info!(
            count = self.state.blocked_content_count,
            threshold = self.threshold,
            "Page block threshold reached"
        );
        true
    }

    /// Exempt pages only: block transiently once the volume of
    /// inappropriate content reaches the threshold. Returns `true` on the
    /// transition.
    pub fn check_volume(&mut self) -> bool {
        if !self.exempt || self.state.blocked || self.state.blocked_content_count < self.threshold {
            return false;
        }

        self.state.blocked = true;
        info!(
            count = self.state.blocked_content_count,
            threshold = self.threshold,
            "Content volume threshold reached on exempt page"
        );
        true
    }

    /// Force the blocked state (previously-blocked page)
    pub fn mark_blocked(&mut self) {
        self.state.blocked = true;
    }

    pub fn add_candidates(&mut self, count: usize) {
        self.state.total_candidates += count;
    }

    /// One classification finished
    pub fn record_completed(&mut self) {
        self.state.analyzed_count += 1;
    }

    /// Start over after navigation
    pub fn reset(&mut self) {
        self.state = PageState::default();
    }
}
