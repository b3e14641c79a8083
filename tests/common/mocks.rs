//! Mock implementations for testing.
//!
//! Hand-written capability and LLM fakes that can be used across the
//! integration test files without duplication. Each fake counts its calls so
//! tests can assert on retries and on stages that never ran.

#![allow(dead_code)]

use async_trait::async_trait;
use sage::capabilities::{
    CapabilityError, CapabilitySet, ContentType, FactChecker, FetchTarget, FetchedDocument,
    SentimentLabel, SentimentScorer, SourceFetcher, Summarizer, Summary, SummaryConstraints,
    TextExtractor, Translator, Verdict,
};
use sage::llm::LLMClient;
use sage::types::{AppError, Result};
use sage::utils::toml_config::{SageConfig, StageConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

type CapResult<T> = std::result::Result<T, CapabilityError>;

// ============= Fetcher =============

/// Serves one document per search rank. Ranks listed in `failing_ranks`
/// always fail with a retryable fetch error.
#[derive(Default)]
pub struct MockFetcher {
    pub failing_ranks: Vec<usize>,
    pub delay: Option<Duration>,
    pub calls: AtomicU32,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(ranks: &[usize]) -> Self {
        Self {
            failing_ranks: ranks.to_vec(),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn fetch(&self, target: &FetchTarget) -> CapResult<FetchedDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match target {
            FetchTarget::Search { query, rank, .. } => {
                if self.failing_ranks.contains(rank) {
                    return Err(CapabilityError::Fetch(format!(
                        "connection reset fetching result {}",
                        rank
                    )));
                }
                Ok(FetchedDocument::text(
                    format!("https://news.example.org/article-{}", rank),
                    Some(format!("Article {} on {}", rank, query)),
                    ContentType::PlainText,
                    format!(
                        "Global temperatures rose in 2024. Source {} reports record heat.",
                        rank
                    ),
                ))
            }
            FetchTarget::Url { url } => Ok(FetchedDocument::text(
                url.clone(),
                None,
                ContentType::PlainText,
                "Sea levels are rising.",
            )),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Returns the body as UTF-8 text.
pub struct PlainExtractor;

#[async_trait]
impl TextExtractor for PlainExtractor {
    async fn extract(&self, document: &FetchedDocument) -> CapResult<String> {
        Ok(String::from_utf8_lossy(&document.body).to_string())
    }
}

// ============= Analysis Capabilities =============

/// Returns fixed bullets, capped at the requested count.
pub struct FixedSummarizer {
    pub bullets: Vec<String>,
}

impl FixedSummarizer {
    pub fn new(bullets: &[&str]) -> Self {
        Self {
            bullets: bullets.iter().map(|b| b.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, _text: &str, constraints: &SummaryConstraints) -> CapResult<Summary> {
        Ok(Summary {
            bullets: self
                .bullets
                .iter()
                .take(constraints.max_bullets)
                .cloned()
                .collect(),
        })
    }
}

/// Fact checker that either answers with a fixed verdict or always fails.
pub struct ScriptedFactChecker {
    pub outcome: CapResult<Verdict>,
    pub calls: Arc<AtomicU32>,
}

impl ScriptedFactChecker {
    pub fn answering(verdict: Verdict) -> Self {
        Self {
            outcome: Ok(verdict),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self {
            outcome: Err(error),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl FactChecker for ScriptedFactChecker {
    async fn verify(&self, _claim: &str) -> CapResult<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Prefixes the text with the target language.
pub struct EchoTranslator;

#[async_trait]
impl Translator for EchoTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> CapResult<String> {
        Ok(format!("[{}] {}", target_lang, text))
    }
}

pub struct FixedSentiment(pub SentimentLabel);

#[async_trait]
impl SentimentScorer for FixedSentiment {
    async fn score(&self, _text: &str) -> CapResult<SentimentLabel> {
        Ok(self.0)
    }
}

// ============= LLM =============

/// Mock LLM client returning a fixed response, or failing every call.
#[derive(Clone)]
pub struct MockLLMClient {
    response: String,
    should_fail: bool,
}

impl MockLLMClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            response: String::new(),
            should_fail: true,
        }
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

// ============= Builders =============

/// Capability set where every call succeeds.
pub fn healthy_capabilities() -> CapabilitySet {
    capabilities_with(
        MockFetcher::new(),
        ScriptedFactChecker::answering(Verdict::Supported),
    )
}

pub fn capabilities_with(fetcher: MockFetcher, fact_checker: ScriptedFactChecker) -> CapabilitySet {
    CapabilitySet::new(
        Arc::new(fetcher),
        Arc::new(PlainExtractor),
        Arc::new(FixedSummarizer::new(&[
            "Global temperatures rose in 2024",
            "Record heat was reported",
        ])),
        Arc::new(fact_checker),
        Arc::new(EchoTranslator),
        Arc::new(FixedSentiment(SentimentLabel::Informative)),
    )
}

/// Defaults with millisecond backoff so retry tests stay fast.
pub fn fast_config() -> SageConfig {
    let mut config = SageConfig::default();
    config.orchestration.retry.initial_backoff_ms = 1;
    config.orchestration.retry.max_backoff_ms = 5;
    config.orchestration.retry.jitter = 0.0;
    config
}

/// `fast_config` with the named stages switched off.
pub fn config_without(stages: &[&str]) -> SageConfig {
    let mut config = fast_config();
    for stage in stages {
        config.pipeline.stages.insert(
            stage.to_string(),
            StageConfig {
                enabled: false,
                depends_on: None,
            },
        );
    }
    config
}
