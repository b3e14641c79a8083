//! # S.A.G.E - Specialized Agent Graph Engine
//!
//! A research coordinator that turns a single query into a dependency graph
//! of scrape, summarize, fact-check, translate, sentiment and citation tasks,
//! runs that graph against pluggable capabilities with bounded concurrency,
//! retries and cancellation, and assembles the results into a structured
//! report whose sections degrade gracefully when individual tasks fail.
//!
//! ## Overview
//!
//! S.A.G.E can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `sage-server` binary
//! 2. **As a library** - Import the coordinator into your own Rust project
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use sage::{build_state, SageConfigManager};
//! use sage::research::query::Query;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = Arc::new(SageConfigManager::new("sage.toml")?);
//!     let state = build_state(config_manager).await?;
//!
//!     let (_, summary, report) = state
//!         .coordinator
//!         .research(Query::new("climate change 2024 impacts").with_language("fr"))
//!         .await?;
//!
//!     println!("run finished as {}", summary.phase);
//!     if let Some(report) = report {
//!         println!("{}", report.to_markdown());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference (default) |
//! | `openai` | OpenAI-compatible API support |
//! | `pdf` | PDF text extraction for scraped documents |
//! | `swagger-ui` | Interactive API docs at `/swagger-ui` |
//!
//! ## Modules
//!
//! - [`research`] - Planning, dispatch, aggregation and run coordination
//! - [`capabilities`] - Capability traits and their HTTP/LLM/offline implementations
//! - [`llm`] - LLM client implementations
//! - [`api`] - REST API handlers and routes
//! - [`cli`] - Command-line interface
//! - [`types`] - Common types and error handling
//! - [`utils`] - TOML configuration with hot reload

#![cfg_attr(docsrs, feature(doc_cfg))]

/// HTTP API handlers and routes.
pub mod api;
/// Capability traits (scrape, summarize, fact-check, translate, sentiment).
pub mod capabilities;
/// Command-line interface.
pub mod cli;
/// LLM provider clients and abstractions.
pub mod llm;
/// Research run planning, execution and reporting.
pub mod research;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use capabilities::CapabilitySet;
pub use llm::{LLMClient, Provider};
pub use research::coordinator::ResearchCoordinator;
pub use types::{AppError, Result};
pub use utils::toml_config::{SageConfig, SageConfigManager};

use crate::research::store::RunStore;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// TOML-based configuration with hot-reload support
    pub config_manager: Arc<SageConfigManager>,
    /// Owner of every research run
    pub coordinator: Arc<ResearchCoordinator>,
}

/// Build the capability set and coordinator from the current configuration.
///
/// # Errors
///
/// Fails when a required capability (the search provider) cannot be set up.
pub async fn build_state(config_manager: Arc<SageConfigManager>) -> Result<AppState> {
    let config = config_manager.config();
    let capabilities = CapabilitySet::from_config(&config).await?;
    Ok(state_with_capabilities(config_manager, capabilities))
}

/// Assemble the application state around an existing capability set.
pub fn state_with_capabilities(
    config_manager: Arc<SageConfigManager>,
    capabilities: CapabilitySet,
) -> AppState {
    let config = config_manager.config();
    let store = Arc::new(RunStore::new(config.orchestration.max_retained_runs));
    let coordinator = ResearchCoordinator::new(store, capabilities, (*config_manager).clone());

    AppState {
        config_manager,
        coordinator: Arc::new(coordinator),
    }
}
