//! Verdict types shared by the classifier, evaluator, and mitigation layers

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Severity reported by the model for an inappropriate item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Weight added to the page score by a whole-page text verdict
    pub fn text_weight(&self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 3,
            Self::High => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured classification outcome for one content item.
///
/// The wire shape is exactly the schema requested from the model:
/// `{"inappropriate": bool, "reason": string, "severity": "low"|"medium"|"high", "categories": [string]}`.
/// An absent verdict (`Option::None`) means "could not determine" and is never
/// equivalent to an appropriate one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Verdict {
    /// Whether the content is unsuitable for children
    pub inappropriate: bool,

    /// Human-readable explanation
    pub reason: String,

    /// Severity of the finding
    pub severity: Severity,

    /// Category labels (cyberbullying, violence, adult_content, ...)
    pub categories: BTreeSet<String>,
}

impl Verdict {
    /// An appropriate verdict
    pub fn safe(reason: impl Into<String>) -> Self {
        Self {
            inappropriate: false,
            reason: reason.into(),
            severity: Severity::Low,
            categories: BTreeSet::new(),
        }
    }

    /// An inappropriate verdict with the given categories
    pub fn flagged<I, S>(reason: impl Into<String>, severity: Severity, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inappropriate: true,
            reason: reason.into(),
            severity,
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    /// Categories joined for display in placeholders
    pub fn categories_label(&self) -> String {
        self.categories
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// True when a verdict calls for mitigation.
///
/// `None` (indeterminate) and appropriate verdicts never do.
pub fn is_inappropriate(verdict: Option<&Verdict>) -> bool {
    verdict.map(|v| v.inappropriate).unwrap_or(false)
}
