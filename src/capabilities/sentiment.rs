//! Sentiment scoring backends
//!
//! [`LexiconSentiment`] is a keyword heuristic that needs no external
//! service. [`LlmSentiment`] asks the configured LLM for a label.

use crate::capabilities::{truncate_chars, CapabilityError, SentimentLabel, SentimentScorer};
use crate::llm::LLMClient;
use async_trait::async_trait;
use std::sync::Arc;

const POSITIVE_TERMS: &[&str] = &["positive", "benefits", "breakthrough"];
const NEGATIVE_TERMS: &[&str] = &["negative", "causes", "impact", "error"];
const INFORMATIVE_TERMS: &[&str] = &["contribution", "research", "understanding"];

/// Keyword-based [`SentimentScorer`].
///
/// Term groups are checked in order: positive, negative, informative. The
/// first group with a match wins; no match is neutral.
#[derive(Debug, Clone, Default)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn label(text: &str) -> SentimentLabel {
        let text = text.to_lowercase();
        let mentions = |terms: &[&str]| terms.iter().any(|term| text.contains(term));

        if mentions(POSITIVE_TERMS) {
            SentimentLabel::Positive
        } else if mentions(NEGATIVE_TERMS) {
            SentimentLabel::Negative
        } else if mentions(INFORMATIVE_TERMS) {
            SentimentLabel::Informative
        } else {
            SentimentLabel::Neutral
        }
    }
}

#[async_trait]
impl SentimentScorer for LexiconSentiment {
    async fn score(&self, text: &str) -> Result<SentimentLabel, CapabilityError> {
        if text.trim().is_empty() {
            return Err(CapabilityError::InvalidInput(
                "no content to analyze".to_string(),
            ));
        }
        Ok(Self::label(text))
    }
}

const SENTIMENT_SYSTEM_PROMPT: &str = "Classify the overall tone of the text. Reply with exactly \
one word: POSITIVE, NEGATIVE, NEUTRAL or INFORMATIVE.";

/// Longest excerpt sent to the model.
const MAX_EXCERPT_CHARS: usize = 8000;

/// [`SentimentScorer`] that asks an [`LLMClient`] for a label.
pub struct LlmSentiment {
    llm: Arc<dyn LLMClient>,
}

impl LlmSentiment {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SentimentScorer for LlmSentiment {
    async fn score(&self, text: &str) -> Result<SentimentLabel, CapabilityError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CapabilityError::InvalidInput(
                "no content to analyze".to_string(),
            ));
        }

        let reply = self
            .llm
            .generate_with_system(SENTIMENT_SYSTEM_PROMPT, truncate_chars(text, MAX_EXCERPT_CHARS))
            .await
            .map_err(|e| CapabilityError::Inference(e.to_string()))?;

        let reply = reply.to_uppercase();
        [
            ("INFORMATIVE", SentimentLabel::Informative),
            ("NEGATIVE", SentimentLabel::Negative),
            ("POSITIVE", SentimentLabel::Positive),
            ("NEUTRAL", SentimentLabel::Neutral),
        ]
        .into_iter()
        .find(|(word, _)| reply.contains(word))
        .map(|(_, label)| label)
        .ok_or_else(|| CapabilityError::Inference(format!("unrecognized label '{}'", reply.trim())))
    }
}
