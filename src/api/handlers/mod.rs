//! API request handlers.
//!
//! This module contains all HTTP request handlers organized by functionality.

/// Liveness endpoint.
pub mod health;
/// Research run submission, status, reports and cancellation.
pub mod research;
