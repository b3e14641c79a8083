//! Init command implementation
//!
//! Scaffolds a new S.A.G.E project with a commented `sage.toml`.

use super::output::Output;
use std::fs;
use std::path::Path;

/// Result of the init operation
pub enum InitResult {
    /// Initialization completed successfully
    Success,
    /// Project already exists (sage.toml found)
    AlreadyExists,
    /// An error occurred during initialization
    Error(String),
}

/// Configuration for the init command
pub struct InitConfig {
    /// Directory to initialize
    pub path: std::path::PathBuf,
    /// Overwrite existing files
    pub force: bool,
    /// LLM provider to configure (ollama or openai)
    pub provider: String,
    /// Host address for the server
    pub host: String,
    /// Port for the server
    pub port: u16,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing S.A.G.E Project");

    let base_path = &config.path;
    if !base_path.exists() {
        if let Err(e) = fs::create_dir_all(base_path) {
            output.error(&format!("Failed to create {}: {}", base_path.display(), e));
            return InitResult::Error(e.to_string());
        }
        output.created_dir(&base_path.display().to_string());
    }

    let config_path = base_path.join("sage.toml");
    if config_path.exists() && !config.force {
        output.warning("sage.toml already exists!");
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    output.subheader("Creating configuration files");

    let toml_content = generate_sage_toml(&config);
    if let Err(e) = write_file(&config_path, &toml_content, config.force) {
        output.error(&format!("Failed to create sage.toml: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("config", "sage.toml");

    let env_example_path = base_path.join(".env.example");
    if let Err(e) = write_file(&env_example_path, &generate_env_example(), config.force) {
        output.error(&format!("Failed to create .env.example: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("env", ".env.example");

    output.complete("S.A.G.E project initialized successfully!");

    output.header("Next Steps");
    output.newline();
    if config.provider == "openai" {
        output.info("1. Set OPENAI_API_KEY in .env:");
        output.command("cp .env.example .env");
    } else {
        output.info("1. Start Ollama (if not running):");
        output.command("ollama serve");
        output.command("ollama pull llama3.2");
    }
    output.newline();

    output.info("2. Run a query or start the server:");
    output.command("sage-server research \"climate change 2024 impacts\" --lang fr");
    output.command("sage-server serve");
    output.newline();

    output.hint(&format!(
        "Server will be available at http://{}:{}",
        config.host, config.port
    ));
    output.hint("API docs available at /swagger-ui/ (requires 'swagger-ui' feature)");

    InitResult::Success
}

fn write_file(path: &Path, content: &str, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Ok(());
    }
    fs::write(path, content)
}

fn generate_sage_toml(config: &InitConfig) -> String {
    let llm_section = if config.provider == "openai" {
        r#"[capabilities.llm]
provider = "openai"
api_key_env = "OPENAI_API_KEY"
api_base = "https://api.openai.com/v1"
model = "gpt-4o-mini"
temperature = 0.3
max_tokens = 1024"#
    } else {
        r#"[capabilities.llm]
provider = "ollama"
base_url = "http://localhost:11434"
model = "llama3.2"
temperature = 0.3
max_tokens = 1024"#
    };

    format!(
        r#"# S.A.G.E Configuration
# =====================
# Every section is optional. Values shown are the defaults.

[server]
host = "{host}"
port = {port}
log_level = "info"
cors_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]

[orchestration]
# Tasks running at once within a single research run
max_concurrency = 4
# Finished runs kept in memory for status and report queries
max_retained_runs = 256

[orchestration.retry]
max_attempts = 3
initial_backoff_ms = 500
max_backoff_ms = 10000
multiplier = 2.0
jitter = 0.1

[orchestration.timeouts]
scrape_secs = 30
summarize_secs = 120
fact_check_secs = 60
translate_secs = 120
sentiment_secs = 120
cite_secs = 10

[pipeline]
sources_per_type = 3
default_source_types = ["web"]
summary_bullets = 5
citation_style = "apa"

# Stages run in dependency order. Disable one with `enabled = false`
# or rewire it with `depends_on = ["scrape"]`.
[pipeline.stages.translate]
enabled = true

[pipeline.stages.sentiment]
enabled = true

[capabilities.search]
# "duckduckgo" needs no key; "serpapi" reads its key from api_key_env
provider = "duckduckgo"
api_key_env = "SERPAPI_API_KEY"
results_per_query = 10
max_document_chars = 20000

{llm_section}

[capabilities.summarizer]
chunk_chars = 6000

[capabilities.fact_check]
# "llm" or "wolfram" (reads the app id from app_id_env)
provider = "llm"
app_id_env = "WOLFRAM_APP_ID"
max_claims = 5

[capabilities.translation]
# LibreTranslate-compatible endpoint; translations are degraded without one
# base_url = "http://localhost:5000"
chunk_chars = 5000

[capabilities.sentiment]
# "lexicon" works offline; "llm" uses the configured LLM
provider = "lexicon"
"#,
        host = config.host,
        port = config.port,
        llm_section = llm_section,
    )
}

fn generate_env_example() -> String {
    r#"# S.A.G.E Environment Variables
# =============================
# Copy this file to .env and fill in the values.

# Optional: Logging level (trace, debug, info, warn, error)
RUST_LOG=info,sage=debug

# Optional: OpenAI API key (if using the OpenAI provider)
# OPENAI_API_KEY=sk-...

# Optional: SerpAPI key (if capabilities.search.provider = "serpapi")
# SERPAPI_API_KEY=...

# Optional: Wolfram Alpha app id (if capabilities.fact_check.provider = "wolfram")
# WOLFRAM_APP_ID=...
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::toml_config::{LlmProviderConfig, SageConfig};
    use tempfile::TempDir;

    fn create_test_config(temp_dir: &TempDir, provider: &str) -> InitConfig {
        InitConfig {
            path: temp_dir.path().to_path_buf(),
            force: false,
            provider: provider.to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }

    #[test]
    fn test_generated_toml_is_valid_config() {
        let temp_dir = TempDir::new().unwrap();
        let content = generate_sage_toml(&create_test_config(&temp_dir, "ollama"));

        let config: SageConfig = toml::from_str(&content).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(matches!(
            config.capabilities.llm.provider,
            LlmProviderConfig::Ollama { .. }
        ));
    }

    #[test]
    fn test_generated_toml_openai() {
        let temp_dir = TempDir::new().unwrap();
        let content = generate_sage_toml(&create_test_config(&temp_dir, "openai"));

        let config: SageConfig = toml::from_str(&content).unwrap();
        match config.capabilities.llm.provider {
            LlmProviderConfig::OpenAI { api_key_env, .. } => {
                assert_eq!(api_key_env, "OPENAI_API_KEY")
            }
            other => panic!("Expected OpenAI provider, got {:?}", other),
        }
    }

    #[test]
    fn test_write_file_skips_existing_without_force() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sage.toml");
        fs::write(&path, "original").unwrap();

        write_file(&path, "replacement", false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");

        write_file(&path, "replacement", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "replacement");
    }

    #[test]
    fn test_run_creates_files() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(create_test_config(&temp_dir, "ollama"), &Output::no_color());

        assert!(matches!(result, InitResult::Success));
        assert!(temp_dir.path().join("sage.toml").exists());
        assert!(temp_dir.path().join(".env.example").exists());
    }

    #[test]
    fn test_run_already_exists_without_force() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("sage.toml"), "# existing").unwrap();

        let result = run(create_test_config(&temp_dir, "ollama"), &Output::no_color());
        assert!(matches!(result, InitResult::AlreadyExists));
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("sage.toml")).unwrap(),
            "# existing"
        );
    }
}
