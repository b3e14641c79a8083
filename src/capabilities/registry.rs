//! Capability set construction
//!
//! A [`CapabilitySet`] is assembled once from `[capabilities]` and shared by
//! every run. Capabilities that cannot be set up (missing LLM backend, no
//! translation endpoint, missing Wolfram app id) are replaced by
//! [`Unconfigured`] so their tasks fail fast and the matching report section
//! is degraded.

use crate::capabilities::extract::DocumentExtractor;
use crate::capabilities::fact_check::{LlmFactChecker, WolframFactChecker};
use crate::capabilities::search::{DuckDuckGoFetcher, SerpApi, SearchFetcher};
use crate::capabilities::sentiment::{LexiconSentiment, LlmSentiment};
use crate::capabilities::summarize::LlmSummarizer;
use crate::capabilities::translate::LibreTranslateClient;
use crate::capabilities::{
    FactChecker, SentimentScorer, SourceFetcher, Summarizer, TextExtractor, Translator,
    Unconfigured,
};
use crate::llm::{LLMClient, Provider};
use crate::types::{AppError, Result};
use crate::utils::toml_config::{
    FactCheckProvider, SageConfig, SearchProvider, SentimentProvider,
};
use std::sync::Arc;
use tracing::{info, warn};

/// One implementation of every capability trait.
#[derive(Clone)]
pub struct CapabilitySet {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub extractor: Arc<dyn TextExtractor>,
    pub summarizer: Arc<dyn Summarizer>,
    pub fact_checker: Arc<dyn FactChecker>,
    pub translator: Arc<dyn Translator>,
    pub sentiment: Arc<dyn SentimentScorer>,
}

impl CapabilitySet {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        extractor: Arc<dyn TextExtractor>,
        summarizer: Arc<dyn Summarizer>,
        fact_checker: Arc<dyn FactChecker>,
        translator: Arc<dyn Translator>,
        sentiment: Arc<dyn SentimentScorer>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            summarizer,
            fact_checker,
            translator,
            sentiment,
        }
    }

    /// Build every capability from configuration.
    ///
    /// # Errors
    ///
    /// Fails only when the search provider cannot be set up, since no run
    /// can produce anything without sources.
    pub async fn from_config(config: &SageConfig) -> Result<Self> {
        let caps = &config.capabilities;

        let fetcher: Arc<dyn SourceFetcher> = match caps.search.provider {
            SearchProvider::DuckDuckGo => {
                Arc::new(DuckDuckGoFetcher::duckduckgo(caps.search.results_per_query))
            }
            SearchProvider::SerpApi => {
                let api_key = config.resolve_env(&caps.search.api_key_env).ok_or_else(|| {
                    AppError::Configuration(format!(
                        "Environment variable '{}' is not set",
                        caps.search.api_key_env
                    ))
                })?;
                Arc::new(SearchFetcher::new(
                    SerpApi::new(caps.search.base_url.clone(), api_key),
                    caps.search.results_per_query,
                ))
            }
        };

        let extractor = Arc::new(DocumentExtractor::new(caps.search.max_document_chars));

        let llm: Option<Arc<dyn LLMClient>> = match Self::llm_client(config).await {
            Ok(client) => {
                info!(model = client.model_name(), "LLM capabilities ready");
                Some(client)
            }
            Err(e) => {
                warn!(error = %e, "LLM unavailable; summarization and LLM-backed checks will be degraded");
                None
            }
        };
        let llm_missing = "no LLM provider is available";

        let summarizer: Arc<dyn Summarizer> = match &llm {
            Some(llm) => Arc::new(LlmSummarizer::new(
                Arc::clone(llm),
                caps.summarizer.chunk_chars,
            )),
            None => Unconfigured::new(llm_missing),
        };

        let fact_checker: Arc<dyn FactChecker> = match caps.fact_check.provider {
            FactCheckProvider::Wolfram => match config.resolve_env(&caps.fact_check.app_id_env) {
                Some(app_id) => Arc::new(WolframFactChecker::new(
                    caps.fact_check.base_url.clone(),
                    app_id,
                )),
                None => {
                    warn!(
                        env = %caps.fact_check.app_id_env,
                        "Wolfram|Alpha app id not set; fact checks will be degraded"
                    );
                    Unconfigured::new(format!("{} is not set", caps.fact_check.app_id_env))
                }
            },
            FactCheckProvider::Llm => match &llm {
                Some(llm) => Arc::new(LlmFactChecker::new(Arc::clone(llm))),
                None => Unconfigured::new(llm_missing),
            },
        };

        let translator: Arc<dyn Translator> = match &caps.translation.base_url {
            Some(base_url) => {
                let api_key = caps
                    .translation
                    .api_key_env
                    .as_deref()
                    .and_then(|env| config.resolve_env(env));
                Arc::new(LibreTranslateClient::new(
                    base_url.clone(),
                    api_key,
                    caps.translation.chunk_chars,
                ))
            }
            None => Unconfigured::new("capabilities.translation.base_url is not set"),
        };

        let sentiment: Arc<dyn SentimentScorer> = match caps.sentiment.provider {
            SentimentProvider::Lexicon => Arc::new(LexiconSentiment),
            SentimentProvider::Llm => match &llm {
                Some(llm) => Arc::new(LlmSentiment::new(Arc::clone(llm))),
                None => Unconfigured::new(llm_missing),
            },
        };

        Ok(Self::new(
            fetcher,
            extractor,
            summarizer,
            fact_checker,
            translator,
            sentiment,
        ))
    }

    async fn llm_client(config: &SageConfig) -> Result<Arc<dyn LLMClient>> {
        let provider = Provider::from_config(&config.capabilities.llm)?;
        let client = provider.create_client().await?;
        Ok(Arc::from(client))
    }
}
