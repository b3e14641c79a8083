//! LLM Provider Clients and Abstractions
//!
//! This module provides a unified interface for interacting with the Large
//! Language Model providers used by the summarization, fact-check and sentiment
//! capabilities. Provider-specific implementations sit behind [`LLMClient`].
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `ollama` - Local Ollama server (default)
//! - `openai` - OpenAI API and compatible endpoints
//!
//! # Example
//!
//! ```ignore
//! use sage::llm::Provider;
//!
//! let provider = Provider::from_config(&config.capabilities.llm)?;
//! let client = provider.create_client().await?;
//!
//! let response = client
//!     .generate_with_system("Answer in one word.", "What is 2+2?")
//!     .await?;
//! ```

/// Core LLM client trait and provider selection.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{LLMClient, Provider};
