//! Strict parsing of model output into a [`Verdict`]
//!
//! Output that does not conform to the verdict schema is indeterminate. There
//! is no keyword fallback: a malformed answer is never coerced into "safe" or
//! "unsafe".

use pageguard_core::{Error, Result, Verdict};

/// Parse model output, returning `None` for anything non-conformant
pub fn parse_verdict(raw: &str) -> Option<Verdict> {
    match try_parse_verdict(raw) {
        Ok(verdict) => Some(verdict),
        Err(e) => {
            tracing::debug!(error = %e, "Discarding non-conformant model output");
            None
        }
    }
}

/// Parse model output, reporting why it failed
pub fn try_parse_verdict(raw: &str) -> Result<Verdict> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Err(Error::parse("empty response"));
    }

    serde_json::from_str::<Verdict>(body).map_err(|e| Error::parse(e.to_string()))
}

/// Models frequently wrap JSON in a markdown fence even when told not to.
/// Only a fence around the entire answer is removed.
fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}
