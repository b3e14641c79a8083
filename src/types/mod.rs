use crate::research::error::OrchestrationError;
use crate::research::run::RunPhase;
use crate::research::query::{CitationStyle, Query, QueryConstraints, SourceType};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ============= API Request/Response Types =============

/// Body of `POST /api/research`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResearchRequest {
    /// The research question or topic
    pub query: String,
    /// Target languages for translated variants of the summary
    #[serde(default)]
    pub languages: Vec<String>,
    /// Source channels to search (defaults to web)
    #[serde(default)]
    pub source_types: Vec<SourceType>,
    /// Explicit source URLs to include
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_style: Option<CitationStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_bullets: Option<usize>,
}

impl ResearchRequest {
    pub fn into_query(self) -> Query {
        Query::new(self.query).with_constraints(QueryConstraints {
            languages: self.languages,
            source_types: self.source_types,
            sources: self.sources,
            citation_style: self.citation_style,
            summary_bullets: self.summary_bullets,
        })
    }
}

/// Body returned when a research run is accepted
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    pub run_id: Uuid,
    pub phase: RunPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_runs: usize,
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<OrchestrationError> for AppError {
    fn from(err: OrchestrationError) -> Self {
        match err {
            OrchestrationError::NotFound(_) => AppError::NotFound(err.to_string()),
            OrchestrationError::NotReady { .. } | OrchestrationError::AlreadyTerminal { .. } => {
                AppError::Conflict(err.to_string())
            }
            OrchestrationError::Configuration(e) => AppError::InvalidInput(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Configuration(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::LLM(msg) => (axum::http::StatusCode::BAD_GATEWAY, msg),
            AppError::NotFound(msg) => (axum::http::StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (axum::http::StatusCode::CONFLICT, msg),
            AppError::InvalidInput(msg) => (axum::http::StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
