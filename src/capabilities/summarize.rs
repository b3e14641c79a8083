//! LLM map-reduce summarization
//!
//! Long inputs are split into character-bounded chunks with `text-splitter`.
//! Each chunk is condensed independently (map), then the partial summaries are
//! condensed into the final bullet list (reduce). Inputs that fit in a single
//! chunk skip the map step.

use crate::capabilities::{split_sentences, CapabilityError, Summarizer, Summary, SummaryConstraints};
use crate::llm::LLMClient;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use text_splitter::TextSplitter;

const MAP_SYSTEM_PROMPT: &str = "You condense research material. Keep concrete facts, figures \
and named sources. Reply with a short plain paragraph and nothing else.";

const REDUCE_SYSTEM_PROMPT: &str = "You write research summaries. Reply only with bullet points, \
one per line, each starting with '- '. Every bullet is a single factual sentence.";

/// [`Summarizer`] backed by an [`LLMClient`].
pub struct LlmSummarizer {
    llm: Arc<dyn LLMClient>,
    chunk_chars: usize,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LLMClient>, chunk_chars: usize) -> Self {
        Self {
            llm,
            chunk_chars: chunk_chars.max(1),
        }
    }

    async fn condense_chunk(&self, chunk: &str) -> Result<String, CapabilityError> {
        self.llm
            .generate_with_system(MAP_SYSTEM_PROMPT, chunk)
            .await
            .map_err(|e| CapabilityError::Inference(e.to_string()))
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        text: &str,
        constraints: &SummaryConstraints,
    ) -> Result<Summary, CapabilityError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CapabilityError::InvalidInput(
                "no content to summarize".to_string(),
            ));
        }

        let splitter = TextSplitter::new(self.chunk_chars);
        let chunks: Vec<&str> = splitter.chunks(text).collect();

        let material = if chunks.len() > 1 {
            tracing::debug!(chunks = chunks.len(), "Summarizing in map-reduce mode");
            try_join_all(chunks.iter().map(|chunk| self.condense_chunk(chunk)))
                .await?
                .join("\n\n")
        } else {
            text.to_string()
        };

        let prompt = format!(
            "Summarize the following material in at most {} bullet points.\n\n{}",
            constraints.max_bullets, material
        );
        let response = self
            .llm
            .generate_with_system(REDUCE_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| CapabilityError::Inference(e.to_string()))?;

        let bullets = parse_bullets(&response, constraints.max_bullets);
        if bullets.is_empty() {
            return Err(CapabilityError::Inference(
                "model returned an empty summary".to_string(),
            ));
        }

        Ok(Summary { bullets })
    }
}

/// Extract bullet points from a model reply.
///
/// Accepts `-`, `*`, `•` and numbered (`1.` / `1)`) list markers. A reply
/// without any list markers is split into sentences instead.
pub fn parse_bullets(response: &str, max_bullets: usize) -> Vec<String> {
    let mut bullets = Vec::new();
    let mut saw_marker = false;

    for line in response.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match strip_marker(line) {
            Some(rest) => {
                saw_marker = true;
                if !rest.is_empty() {
                    bullets.push(rest.to_string());
                }
            }
            None if saw_marker => {
                // continuation of the previous bullet
                if let Some(last) = bullets.last_mut() {
                    last.push(' ');
                    last.push_str(line);
                }
            }
            None => {}
        }
    }

    if !saw_marker {
        bullets = split_sentences(&response.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    bullets.truncate(max_bullets);
    bullets
}

fn strip_marker(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::MockLLMClient;
    use crate::types::AppError;

    #[test]
    fn test_parse_dash_bullets() {
        let reply = "Here is the summary:\n- Seas are rising.\n- Ice is melting\n  faster than expected.\n";
        assert_eq!(
            parse_bullets(reply, 5),
            vec!["Seas are rising.", "Ice is melting faster than expected."]
        );
    }

    #[test]
    fn test_parse_numbered_bullets_respects_limit() {
        let reply = "1. One\n2) Two\n3. Three";
        assert_eq!(parse_bullets(reply, 2), vec!["One", "Two"]);
    }

    #[test]
    fn test_parse_plain_paragraph_falls_back_to_sentences() {
        let reply = "Seas are rising. Ice is melting. Heat is up.";
        assert_eq!(
            parse_bullets(reply, 2),
            vec!["Seas are rising", "Ice is melting"]
        );
    }

    #[tokio::test]
    async fn test_single_chunk_skips_map_step() {
        let mut llm = MockLLMClient::new();
        llm.expect_generate_with_system()
            .times(1)
            .returning(|system, prompt| {
                assert_eq!(system, REDUCE_SYSTEM_PROMPT);
                assert!(prompt.contains("at most 3 bullet points"));
                Ok("- A\n- B\n- C\n- D".to_string())
            });

        let summarizer = LlmSummarizer::new(Arc::new(llm), 6000);
        let summary = summarizer
            .summarize("short text", &SummaryConstraints { max_bullets: 3 })
            .await
            .unwrap();
        assert_eq!(summary.bullets, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_long_input_is_mapped_then_reduced() {
        let mut llm = MockLLMClient::new();
        llm.expect_generate_with_system()
            .withf(|system, _| system == MAP_SYSTEM_PROMPT)
            .times(2..)
            .returning(|_, _| Ok("partial".to_string()));
        llm.expect_generate_with_system()
            .withf(|system, _| system == REDUCE_SYSTEM_PROMPT)
            .times(1)
            .returning(|_, prompt| {
                assert!(prompt.contains("partial\n\npartial"));
                Ok("- Combined".to_string())
            });

        let summarizer = LlmSummarizer::new(Arc::new(llm), 40);
        let text = "Sea level rose ten centimetres. ".repeat(6);
        let summary = summarizer
            .summarize(&text, &SummaryConstraints::default())
            .await
            .unwrap();
        assert_eq!(summary.bullets, vec!["Combined"]);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let summarizer = LlmSummarizer::new(Arc::new(MockLLMClient::new()), 100);
        let err = summarizer
            .summarize("   ", &SummaryConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_llm_error_maps_to_inference() {
        let mut llm = MockLLMClient::new();
        llm.expect_generate_with_system()
            .returning(|_, _| Err(AppError::LLM("connection refused".into())));

        let summarizer = LlmSummarizer::new(Arc::new(llm), 6000);
        let err = summarizer
            .summarize("text", &SummaryConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Inference(_)));
        assert!(err.is_retryable());
    }
}
