//! External Capabilities Used by Research Tasks
//!
//! Every task kind is backed by one of a fixed set of capability traits. The
//! dispatcher never discovers capabilities at runtime: a [`CapabilitySet`]
//! holds exactly one implementation of each trait and task kinds are matched
//! onto them explicitly.
//!
//! # Module Structure
//!
//! - [`search`](crate::capabilities::search) - Source retrieval (DuckDuckGo via daedra, SerpAPI)
//! - [`extract`](crate::capabilities::extract) - Document text extraction (HTML, markdown, PDF)
//! - [`summarize`](crate::capabilities::summarize) - LLM map-reduce summarization
//! - [`fact_check`](crate::capabilities::fact_check) - Claim verification (Wolfram Alpha, LLM)
//! - [`translate`](crate::capabilities::translate) - LibreTranslate-compatible translation
//! - [`sentiment`](crate::capabilities::sentiment) - Lexicon and LLM sentiment scoring
//! - [`registry`](crate::capabilities::registry) - Builds a [`CapabilitySet`] from configuration
//!
//! # Errors
//!
//! All capabilities fail with [`CapabilityError`]. Whether a failure is worth
//! retrying is decided by [`CapabilityError::is_retryable`].

/// Document text extraction.
pub mod extract;
/// Claim verification backends.
pub mod fact_check;
/// Capability set construction from configuration.
pub mod registry;
/// Source search and retrieval.
pub mod search;
/// Sentiment scoring backends.
pub mod sentiment;
/// LLM summarization.
pub mod summarize;
/// Translation backends.
pub mod translate;

use crate::research::query::SourceType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

pub use registry::CapabilitySet;

// ============= Errors =============

/// Failure of an external capability call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum CapabilityError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("text extraction failed: {0}")]
    Extract(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("translation failed: {0}")]
    Translation(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CapabilityError {
    /// Unavailable capabilities and bad inputs fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CapabilityError::Unavailable(_) | CapabilityError::InvalidInput(_)
        )
    }
}

// ============= Data Types =============

/// What a scrape task should retrieve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchTarget {
    /// The `rank`-th (1-based) result of a search
    Search {
        query: String,
        rank: usize,
        source_type: SourceType,
    },
    /// A specific URL
    Url { url: String },
}

impl FetchTarget {
    pub fn source_type(&self) -> SourceType {
        match self {
            FetchTarget::Search { source_type, .. } => *source_type,
            FetchTarget::Url { url } if url.to_lowercase().ends_with(".pdf") => SourceType::Pdf,
            FetchTarget::Url { .. } => SourceType::Web,
        }
    }
}

/// Media type of fetched content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Html,
    Markdown,
    PlainText,
    Pdf,
}

impl ContentType {
    /// Map a `Content-Type` header value, defaulting to HTML.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_lowercase();
        if mime.contains("pdf") {
            ContentType::Pdf
        } else if mime.contains("markdown") {
            ContentType::Markdown
        } else if mime.starts_with("text/plain") {
            ContentType::PlainText
        } else {
            ContentType::Html
        }
    }
}

/// Raw content retrieved by a [`SourceFetcher`].
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub url: String,
    pub title: Option<String>,
    pub content_type: ContentType,
    pub body: Vec<u8>,
}

impl FetchedDocument {
    pub fn text(url: impl Into<String>, title: Option<String>, content_type: ContentType, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title,
            content_type,
            body: text.into().into_bytes(),
        }
    }
}

/// Options passed to a [`Summarizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryConstraints {
    /// Maximum number of bullet points in the summary
    pub max_bullets: usize,
}

impl Default for SummaryConstraints {
    fn default() -> Self {
        Self { max_bullets: 5 }
    }
}

/// A condensed account of the sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Summary {
    pub bullets: Vec<String>,
}

impl Summary {
    pub fn text(&self) -> String {
        self.bullets.join(" ")
    }
}

/// Outcome of verifying one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Supported,
    Refuted,
    Unverifiable,
}

impl Verdict {
    pub fn symbol(&self) -> &'static str {
        match self {
            Verdict::Supported => "✅",
            Verdict::Refuted => "❌",
            Verdict::Unverifiable => "❓",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verdict = match self {
            Verdict::Supported => "supported",
            Verdict::Refuted => "refuted",
            Verdict::Unverifiable => "unverifiable",
        };
        write!(f, "{}", verdict)
    }
}

/// Overall tone of the scraped material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    Informative,
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Informative => "informative",
        };
        write!(f, "{}", label)
    }
}

// ============= Capability Traits =============

/// Search/source-retrieval capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, target: &FetchTarget) -> Result<FetchedDocument, CapabilityError>;

    fn name(&self) -> &str;
}

/// Document-text-extraction capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: &FetchedDocument) -> Result<String, CapabilityError>;
}

/// Summarization capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        text: &str,
        constraints: &SummaryConstraints,
    ) -> Result<Summary, CapabilityError>;
}

/// Fact-check capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FactChecker: Send + Sync {
    async fn verify(&self, claim: &str) -> Result<Verdict, CapabilityError>;
}

/// Translation capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, CapabilityError>;
}

/// Sentiment capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<SentimentLabel, CapabilityError>;
}

/// Stand-in for a capability that has not been configured.
///
/// Every call fails with a non-retryable [`CapabilityError::Unavailable`], so
/// tasks depending on it degrade their report section instead of retrying.
pub struct Unconfigured {
    reason: String,
}

impl Unconfigured {
    pub fn new(reason: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reason: reason.into(),
        })
    }

    fn error(&self) -> CapabilityError {
        CapabilityError::Unavailable(self.reason.clone())
    }
}

#[async_trait]
impl Translator for Unconfigured {
    async fn translate(&self, _text: &str, _target_lang: &str) -> Result<String, CapabilityError> {
        Err(self.error())
    }
}

#[async_trait]
impl FactChecker for Unconfigured {
    async fn verify(&self, _claim: &str) -> Result<Verdict, CapabilityError> {
        Err(self.error())
    }
}

#[async_trait]
impl Summarizer for Unconfigured {
    async fn summarize(
        &self,
        _text: &str,
        _constraints: &SummaryConstraints,
    ) -> Result<Summary, CapabilityError> {
        Err(self.error())
    }
}

#[async_trait]
impl SentimentScorer for Unconfigured {
    async fn score(&self, _text: &str) -> Result<SentimentLabel, CapabilityError> {
        Err(self.error())
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into sentence-like claims on `. ` boundaries.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split(". ")
        .map(|s| s.trim().trim_end_matches('.').trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
