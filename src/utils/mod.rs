//! Utility modules.

/// TOML configuration loading, validation and hot reload.
pub mod toml_config;
