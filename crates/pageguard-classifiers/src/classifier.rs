//! Classifier trait and the model-backed client

use crate::capability::{LanguageModel, ModelSession, PromptOptions, PromptPart, SessionConfig, Summarizer};
use crate::parser::parse_verdict;
use crate::prompts;
use async_trait::async_trait;
use pageguard_core::{DataUrl, Error, ItemKind, Result, Verdict};
use pageguard_telemetry::metrics::{CLASSIFICATIONS_TOTAL, CLASSIFICATION_LATENCY_MS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What to classify
#[derive(Debug, Clone)]
pub enum ClassificationRequest {
    /// An image payload
    Image(DataUrl),

    /// Aggregated page text
    PageText(String),

    /// One social-media comment
    Comment(String),
}

impl ClassificationRequest {
    pub fn item_kind(&self) -> ItemKind {
        match self {
            Self::Image(_) => ItemKind::Image,
            Self::PageText(_) => ItemKind::TextBlock,
            Self::Comment(_) => ItemKind::Comment,
        }
    }
}

/// Trait for all content classifiers
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Classify one request within `timeout`.
    ///
    /// `Ok(None)` means the model answered but the verdict is indeterminate.
    /// Fails with [`Error::Timeout`] when the budget is exceeded.
    async fn classify(&self, request: &ClassificationRequest, timeout: Duration) -> Result<Option<Verdict>>;

    /// Get the classifier name
    fn name(&self) -> &str;
}

/// Classifier that prompts a generative model for a structured verdict
pub struct ModelClassifier {
    name: String,
    session: Arc<dyn ModelSession>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl ModelClassifier {
    /// Create a classifier over an already-open session
    pub fn new(name: impl Into<String>, session: Arc<dyn ModelSession>) -> Self {
        Self {
            name: name.into(),
            session,
            summarizer: None,
        }
    }

    /// Attach a summarizer used for page text
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Check availability and open a session on `model`.
    ///
    /// Fails with [`Error::CapabilityUnavailable`] when the model is absent,
    /// still needs downloading, or session creation fails. A summarizer that
    /// cannot be opened is skipped.
    pub async fn initialize(model: &dyn LanguageModel) -> Result<Self> {
        let availability = model
            .availability()
            .await
            .map_err(|e| Error::unavailable(format!("availability check failed: {}", e)))?;

        if !availability.is_ready() {
            return Err(Error::unavailable(format!(
                "model '{}' is {}",
                model.name(),
                availability.as_str()
            )));
        }

        let config = SessionConfig {
            system_prompt: prompts::SYSTEM_PROMPT.to_string(),
            accepts_images: true,
            output_language: "en".to_string(),
        };

        let session = model
            .create_session(&config)
            .await
            .map_err(|e| Error::unavailable(format!("session creation failed: {}", e)))?;

        let mut classifier = Self::new(model.name(), session);

        match model.create_summarizer().await {
            Ok(Some(summarizer)) => classifier.summarizer = Some(summarizer),
            Ok(None) => debug!("No summarizer offered by {}", model.name()),
            Err(e) => warn!("Summarizer unavailable, page text will be sent unsummarized: {}", e),
        }

        info!(model = %model.name(), "Classification session ready");
        Ok(classifier)
    }

    async fn build_parts(&self, request: &ClassificationRequest) -> Vec<PromptPart> {
        match request {
            ClassificationRequest::Image(image) => vec![
                PromptPart::Text(prompts::image_prompt()),
                PromptPart::Image(image.clone()),
            ],
            ClassificationRequest::PageText(text) => {
                let content = self.summarize(text).await;
                vec![PromptPart::Text(prompts::page_text_prompt(&content))]
            }
            ClassificationRequest::Comment(text) => {
                vec![PromptPart::Text(prompts::comment_prompt(text))]
            }
        }
    }

    async fn summarize(&self, text: &str) -> String {
        let Some(summarizer) = &self.summarizer else {
            return text.to_string();
        };

        match summarizer.summarize(text, prompts::SUMMARY_CONTEXT).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => text.to_string(),
            Err(e) => {
                warn!("Summarization failed, classifying raw text: {}", e);
                text.to_string()
            }
        }
    }
}

#[async_trait]
impl ContentClassifier for ModelClassifier {
    async fn classify(&self, request: &ClassificationRequest, timeout: Duration) -> Result<Option<Verdict>> {
        let start = Instant::now();
        let kind = request.item_kind().as_str();

        let options = PromptOptions {
            timeout: Some(timeout),
            response_schema: Some(prompts::verdict_schema()),
        };

        // Summarization counts against the same budget as the prompt.
        let call = async {
            let parts = self.build_parts(request).await;
            self.session.prompt(&parts, &options).await
        };

        let raw = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                metrics::counter!(CLASSIFICATIONS_TOTAL, "kind" => kind, "outcome" => "error")
                    .increment(1);
                return Err(e);
            }
            Err(_) => {
                metrics::counter!(CLASSIFICATIONS_TOTAL, "kind" => kind, "outcome" => "timeout")
                    .increment(1);
                return Err(Error::Timeout(timeout));
            }
        };

        let elapsed = start.elapsed();
        metrics::histogram!(CLASSIFICATION_LATENCY_MS, "kind" => kind)
            .record(elapsed.as_secs_f64() * 1000.0);

        let verdict = parse_verdict(&raw);
        let outcome = match &verdict {
            Some(v) if v.inappropriate => "inappropriate",
            Some(_) => "appropriate",
            None => "indeterminate",
        };
        metrics::counter!(CLASSIFICATIONS_TOTAL, "kind" => kind, "outcome" => outcome)
            .increment(1);

        debug!(
            kind,
            outcome,
            latency_ms = elapsed.as_millis() as u64,
            "Model verdict received"
        );

        Ok(verdict)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
