//! TOML-based configuration for S.A.G.E
//!
//! This module provides declarative configuration for the server, the
//! orchestration limits, the research pipeline and the external capabilities
//! via a TOML file (`sage.toml`). Every section is optional; an empty file is
//! a valid configuration that runs entirely against local services.
//!
//! # Hot Reloading
//!
//! Configuration changes are automatically detected and applied at runtime.
//! Use `SageConfigManager` for thread-safe access to the current configuration.
//! Runs already in flight keep the snapshot they were submitted with.

use crate::research::error::ConfigurationError;
use crate::research::planner::resolve_stages;
use crate::research::query::{CitationStyle, SourceType};
use crate::research::task::Stage;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from sage.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SageConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            cors_origins: default_cors_origins(),
        }
    }
}

// ============= Orchestration Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Maximum tasks in flight per run
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Finished runs kept in the store before the oldest are pruned
    #[serde(default = "default_max_retained_runs")]
    pub max_retained_runs: usize,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_retained_runs() -> usize {
    256
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_retained_runs: default_max_retained_runs(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Backoff policy applied to every capability call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per task, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Fraction of the delay added as random jitter (0.0 - 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

/// Per-attempt time limits, in seconds, by task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_scrape_secs")]
    pub scrape_secs: u64,

    #[serde(default = "default_llm_secs")]
    pub summarize_secs: u64,

    #[serde(default = "default_lookup_secs")]
    pub fact_check_secs: u64,

    #[serde(default = "default_lookup_secs")]
    pub translate_secs: u64,

    #[serde(default = "default_lookup_secs")]
    pub sentiment_secs: u64,

    #[serde(default = "default_cite_secs")]
    pub cite_secs: u64,
}

fn default_scrape_secs() -> u64 {
    30
}

fn default_llm_secs() -> u64 {
    120
}

fn default_lookup_secs() -> u64 {
    60
}

fn default_cite_secs() -> u64 {
    10
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            scrape_secs: default_scrape_secs(),
            summarize_secs: default_llm_secs(),
            fact_check_secs: default_lookup_secs(),
            translate_secs: default_lookup_secs(),
            sentiment_secs: default_lookup_secs(),
            cite_secs: default_cite_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn for_stage(&self, stage: Stage) -> Duration {
        let secs = match stage {
            Stage::Scrape => self.scrape_secs,
            Stage::Summarize => self.summarize_secs,
            Stage::FactCheck => self.fact_check_secs,
            Stage::Translate => self.translate_secs,
            Stage::Sentiment => self.sentiment_secs,
            Stage::Cite => self.cite_secs,
        };
        Duration::from_secs(secs)
    }
}

// ============= Pipeline Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Searched sources per requested source type
    #[serde(default = "default_sources_per_type")]
    pub sources_per_type: usize,

    /// Source types used when a query does not name any
    #[serde(default = "default_source_types")]
    pub default_source_types: Vec<SourceType>,

    #[serde(default = "default_summary_bullets")]
    pub summary_bullets: usize,

    #[serde(default)]
    pub citation_style: CitationStyle,

    /// Stage overrides keyed by stage name; missing stages use defaults
    #[serde(default)]
    pub stages: BTreeMap<String, StageConfig>,
}

fn default_sources_per_type() -> usize {
    3
}

fn default_source_types() -> Vec<SourceType> {
    vec![SourceType::Web]
}

fn default_summary_bullets() -> usize {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources_per_type: default_sources_per_type(),
            default_source_types: default_source_types(),
            summary_bullets: default_summary_bullets(),
            citation_style: CitationStyle::default(),
            stages: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Stage names this stage waits for; `None` keeps the default edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    pub fn stage_enabled(&self, stage: Stage) -> bool {
        self.stages
            .get(stage.as_str())
            .map(|s| s.enabled)
            .unwrap_or(true)
    }
}

// ============= Capability Configuration =============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub summarizer: SummarizerConfig,

    #[serde(default)]
    pub fact_check: FactCheckConfig,

    #[serde(default)]
    pub translation: TranslationConfig,

    #[serde(default)]
    pub sentiment: SentimentConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    #[default]
    DuckDuckGo,
    SerpApi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: SearchProvider,

    /// Environment variable holding the SerpAPI key
    #[serde(default = "default_serpapi_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_serpapi_url")]
    pub base_url: String,

    /// Results requested per search
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,

    /// Extracted text beyond this many characters is dropped
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
}

fn default_serpapi_key_env() -> String {
    "SERPAPI_API_KEY".to_string()
}

fn default_serpapi_url() -> String {
    "https://serpapi.com/search".to_string()
}

fn default_results_per_query() -> usize {
    10
}

fn default_max_document_chars() -> usize {
    20_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::default(),
            api_key_env: default_serpapi_key_env(),
            base_url: default_serpapi_url(),
            results_per_query: default_results_per_query(),
            max_document_chars: default_max_document_chars(),
        }
    }
}

/// LLM backend used by the summarizer and the LLM-backed checkers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmProviderConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_model")]
        model: String,
    },
    OpenAI {
        /// Environment variable containing API key
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        model: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        LlmProviderConfig::Ollama {
            base_url: default_ollama_url(),
            model: default_ollama_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(flatten)]
    pub provider: LlmProviderConfig,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderConfig::default(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Size of each map step chunk, in characters
    #[serde(default = "default_summary_chunk_chars")]
    pub chunk_chars: usize,
}

fn default_summary_chunk_chars() -> usize {
    6_000
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_summary_chunk_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactCheckProvider {
    #[default]
    Llm,
    Wolfram,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactCheckConfig {
    #[serde(default)]
    pub provider: FactCheckProvider,

    /// Environment variable holding the Wolfram Alpha app id
    #[serde(default = "default_wolfram_env")]
    pub app_id_env: String,

    #[serde(default = "default_wolfram_url")]
    pub base_url: String,

    /// Claims taken from the summary for verification
    #[serde(default = "default_max_claims")]
    pub max_claims: usize,
}

fn default_wolfram_env() -> String {
    "WOLFRAM_APP_ID".to_string()
}

fn default_wolfram_url() -> String {
    "https://api.wolframalpha.com/v2/query".to_string()
}

fn default_max_claims() -> usize {
    5
}

impl Default for FactCheckConfig {
    fn default() -> Self {
        Self {
            provider: FactCheckProvider::default(),
            app_id_env: default_wolfram_env(),
            base_url: default_wolfram_url(),
            max_claims: default_max_claims(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// LibreTranslate-compatible endpoint, e.g. `http://localhost:5000`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_translation_chunk_chars")]
    pub chunk_chars: usize,
}

fn default_translation_chunk_chars() -> usize {
    5_000
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: None,
            chunk_chars: default_translation_chunk_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentProvider {
    #[default]
    Lexicon,
    Llm,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentimentConfig {
    #[serde(default)]
    pub provider: SentimentProvider,
}

// ============= Configuration Loading & Validation =============

/// Configuration warnings that don't prevent operation but may indicate issues
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub kind: ConfigWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarningKind {
    DisabledStage,
    UnconfiguredCapability,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Invalid pipeline: {0}")]
    Pipeline(#[from] ConfigurationError),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl SageConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration without validating it
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound(path)) => {
                warn!(
                    "Configuration file {:?} not found, using defaults",
                    path
                );
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration for internal consistency and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }

        let orchestration = &self.orchestration;
        if orchestration.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration.max_concurrency must be at least 1".to_string(),
            ));
        }

        let retry = &orchestration.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if retry.multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "orchestration.retry.multiplier must be >= 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(ConfigError::ValidationError(
                "orchestration.retry.jitter must be between 0.0 and 1.0".to_string(),
            ));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(ConfigError::ValidationError(
                "orchestration.retry.initial_backoff_ms exceeds max_backoff_ms".to_string(),
            ));
        }

        // Stage graph: unknown names, disabled dependencies and cycles
        resolve_stages(&self.pipeline)?;

        if self.pipeline.summary_bullets == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.summary_bullets must be at least 1".to_string(),
            ));
        }

        // Provider env vars
        let capabilities = &self.capabilities;
        if let LlmProviderConfig::OpenAI { api_key_env, .. } = &capabilities.llm.provider {
            self.validate_env_var(api_key_env)?;
        }
        if capabilities.search.provider == SearchProvider::SerpApi {
            self.validate_env_var(&capabilities.search.api_key_env)?;
        }
        if capabilities.fact_check.provider == FactCheckProvider::Wolfram {
            self.validate_env_var(&capabilities.fact_check.app_id_env)?;
        }
        if let Some(ref env) = capabilities.translation.api_key_env {
            self.validate_env_var(env)?;
        }

        if capabilities.summarizer.chunk_chars == 0 || capabilities.translation.chunk_chars == 0 {
            return Err(ConfigError::ValidationError(
                "chunk_chars must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate configuration and report settings that will degrade reports
    pub fn validate_with_warnings(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.validate()?;

        let mut warnings: Vec<ConfigWarning> = Stage::ALL
            .into_iter()
            .filter(|stage| !self.pipeline.stage_enabled(*stage))
            .map(|stage| ConfigWarning {
                kind: ConfigWarningKind::DisabledStage,
                message: format!("Stage '{}' is disabled", stage),
            })
            .collect();

        if self.pipeline.stage_enabled(Stage::Translate)
            && self.capabilities.translation.base_url.is_none()
        {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::UnconfiguredCapability,
                message: "Stage 'translate' is enabled but capabilities.translation.base_url is not set; translations will be degraded".to_string(),
            });
        }

        Ok(warnings)
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Get a resolved value from an env var reference
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name).ok()
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct SageConfigManager {
    config: Arc<ArcSwap<SageConfig>>,
    config_path: PathBuf,
    /// Dropping the watcher stops file events
    _watcher: Option<RecommendedWatcher>,
}

impl SageConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Convert to absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = SageConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            _watcher: None,
        })
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<SageConfig> {
        self.config.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Manually reload the configuration from disk
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = SageConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching for configuration file changes
    pub fn start_watching(&mut self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);
        let watched_name = config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == watched_name);
                    if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                        // Send reload signal (debounced in the receiver)
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        // Watch the config file's parent directory
        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        self._watcher = Some(watcher);

        tokio::spawn(async move {
            let mut last_reload: Option<std::time::Instant> = None;
            let debounce_duration = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|t| t.elapsed() < debounce_duration) {
                    continue;
                }

                // Wait a bit for file write to complete
                tokio::time::sleep(Duration::from_millis(100)).await;

                match SageConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = Some(std::time::Instant::now());
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Create a config manager directly from a config (useful for testing)
    /// This won't have file watching capabilities.
    pub fn from_config(config: SageConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("sage.toml"),
            _watcher: None,
        }
    }
}

impl Clone for SageConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            config_path: self.config_path.clone(),
            // clones share the config but not the watcher
            _watcher: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_config() -> String {
        r#"
[server]
host = "0.0.0.0"
port = 8080

[orchestration]
max_concurrency = 2

[orchestration.retry]
max_attempts = 5
initial_backoff_ms = 100

[orchestration.timeouts]
scrape_secs = 5

[pipeline]
sources_per_type = 2
default_source_types = ["web", "academic"]
citation_style = "mla"

[pipeline.stages.sentiment]
enabled = false

[pipeline.stages.cite]
depends_on = ["scrape", "summarize"]

[capabilities.llm]
provider = "ollama"
model = "qwen2.5"

[capabilities.translation]
base_url = "http://localhost:5000"
"#
        .to_string()
    }

    #[test]
    fn test_parse_config() {
        let config = SageConfig::parse(&create_test_config()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.orchestration.max_concurrency, 2);
        assert_eq!(config.orchestration.retry.max_attempts, 5);
        assert_eq!(config.orchestration.retry.initial_backoff_ms, 100);
        assert_eq!(config.orchestration.retry.max_backoff_ms, 10_000);
        assert_eq!(config.orchestration.timeouts.scrape_secs, 5);
        assert_eq!(config.pipeline.sources_per_type, 2);
        assert_eq!(config.pipeline.citation_style, CitationStyle::Mla);
        assert!(!config.pipeline.stage_enabled(Stage::Sentiment));
        assert!(config.pipeline.stage_enabled(Stage::Summarize));
        assert!(config.validate().is_ok());

        match &config.capabilities.llm.provider {
            LlmProviderConfig::Ollama { base_url, model } => {
                assert_eq!(base_url, "http://localhost:11434");
                assert_eq!(model, "qwen2.5");
            }
            other => panic!("unexpected provider {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = SageConfig::parse("").unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.cors_origins.len(), 2);
        assert_eq!(config.orchestration.retry, RetryConfig::default());
        assert_eq!(config.orchestration.retry.max_attempts, 3);
        assert_eq!(config.pipeline.sources_per_type, 3);
        assert_eq!(config.pipeline.default_source_types, vec![SourceType::Web]);
        assert_eq!(config.capabilities.search.provider, SearchProvider::DuckDuckGo);
        assert_eq!(config.capabilities.fact_check.provider, FactCheckProvider::Llm);
        assert_eq!(config.capabilities.translation.chunk_chars, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_for_stage() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.for_stage(Stage::Scrape), Duration::from_secs(30));
        assert_eq!(timeouts.for_stage(Stage::Summarize), Duration::from_secs(120));
        assert_eq!(timeouts.for_stage(Stage::Cite), Duration::from_secs(10));
    }

    #[test]
    fn test_validation_rejects_cyclic_pipeline() {
        let config = SageConfig::parse(
            r#"
[pipeline.stages.scrape]
depends_on = ["summarize"]
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Pipeline(ConfigurationError::Cycle(_)))
        ));
    }

    #[test]
    fn test_validation_rejects_unknown_stage() {
        let config = SageConfig::parse("[pipeline.stages.crawl]\nenabled = true\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Pipeline(ConfigurationError::UnknownStage(_)))
        ));
    }

    #[test]
    fn test_validation_zero_attempts() {
        let config = SageConfig::parse("[orchestration.retry]\nmax_attempts = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_missing_env_var() {
        let config = SageConfig::parse(
            r#"
[capabilities.llm]
provider = "openai"
api_key_env = "SAGE_TEST_UNSET_OPENAI_KEY"
model = "gpt-4o-mini"
"#,
        )
        .unwrap();
        match config.validate() {
            Err(ConfigError::MissingEnvVar(name)) => {
                assert_eq!(name, "SAGE_TEST_UNSET_OPENAI_KEY")
            }
            other => panic!("expected missing env var, got {:?}", other),
        }
    }

    #[test]
    fn test_warnings_for_disabled_and_unconfigured() {
        let config = SageConfig::parse("[pipeline.stages.sentiment]\nenabled = false\n").unwrap();
        let warnings = config.validate_with_warnings().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w.kind == ConfigWarningKind::DisabledStage));
        assert!(warnings
            .iter()
            .any(|w| w.kind == ConfigWarningKind::UnconfiguredCapability));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = SageConfig::parse(&create_test_config()).unwrap();
        let rendered = config.to_toml().unwrap();
        let reparsed = SageConfig::parse(&rendered).unwrap();
        assert_eq!(reparsed.pipeline.stages, config.pipeline.stages);
        assert_eq!(reparsed.server.port, 8080);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SageConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));

        let config = SageConfig::load_or_default(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_config_manager_reload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestration]\nmax_concurrency = 2").unwrap();

        let manager = SageConfigManager::new(file.path()).unwrap();
        assert_eq!(manager.config().orchestration.max_concurrency, 2);

        std::fs::write(file.path(), "[orchestration]\nmax_concurrency = 6\n").unwrap();
        manager.reload().unwrap();
        assert_eq!(manager.config().orchestration.max_concurrency, 6);

        std::fs::write(file.path(), "[orchestration]\nmax_concurrency = 0\n").unwrap();
        assert!(manager.reload().is_err());
        assert_eq!(manager.config().orchestration.max_concurrency, 6);
    }

    #[tokio::test]
    async fn test_watcher_reload_reaches_clones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sage.toml");
        std::fs::write(&path, "[orchestration]\nmax_concurrency = 2\n").unwrap();

        let mut manager = SageConfigManager::new(&path).unwrap();
        manager.start_watching().unwrap();
        let clone = manager.clone();

        std::fs::write(&path, "[orchestration]\nmax_concurrency = 7\n").unwrap();
        for _ in 0..100 {
            if clone.config().orchestration.max_concurrency == 7 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(clone.config().orchestration.max_concurrency, 7);
        assert_eq!(manager.config().orchestration.max_concurrency, 7);
    }

    #[test]
    fn test_config_manager_from_config() {
        let manager = SageConfigManager::from_config(SageConfig::default());
        let clone = manager.clone();
        assert_eq!(clone.config().server.port, manager.config().server.port);
    }
}
