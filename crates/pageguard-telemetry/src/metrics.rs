//! Metric names and descriptions

use pageguard_core::ItemKind;

/// Classification calls by item kind and outcome
pub const CLASSIFICATIONS_TOTAL: &str = "pageguard_classifications_total";

/// Classification latency in milliseconds
pub const CLASSIFICATION_LATENCY_MS: &str = "pageguard_classification_latency_ms";

/// Verdicts served from the result cache
pub const CACHE_HITS_TOTAL: &str = "pageguard_cache_hits_total";

/// Items mitigated, by kind
pub const ITEMS_BLOCKED_TOTAL: &str = "pageguard_items_blocked_total";

/// Whole-page blocks, by whether they were persisted
pub const PAGES_BLOCKED_TOTAL: &str = "pageguard_pages_blocked_total";

/// Register descriptions with the installed recorder
pub fn describe_metrics() {
    metrics::describe_counter!(
        CLASSIFICATIONS_TOTAL,
        "Classification calls by item kind and outcome"
    );
    metrics::describe_histogram!(
        CLASSIFICATION_LATENCY_MS,
        metrics::Unit::Milliseconds,
        "Model classification latency"
    );
    metrics::describe_counter!(CACHE_HITS_TOTAL, "Verdicts served from the result cache");
    metrics::describe_counter!(ITEMS_BLOCKED_TOTAL, "Content items mitigated");
    metrics::describe_counter!(PAGES_BLOCKED_TOTAL, "Whole-page blocks");
}

/// Count one mitigated item
pub fn record_item_blocked(kind: ItemKind) {
    metrics::counter!(ITEMS_BLOCKED_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Count one page block
pub fn record_page_blocked(persisted: bool) {
    let persisted = if persisted { "true" } else { "false" };
    metrics::counter!(PAGES_BLOCKED_TOTAL, "persisted" => persisted).increment(1);
}
