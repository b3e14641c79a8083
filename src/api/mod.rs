//! HTTP API Handlers and Routes
//!
//! This module provides the REST API layer for S.A.G.E, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! ## Research (`/api/research`)
//! - `POST /api/research` - Submit a query, returns `202` with the run id
//! - `GET /api/research` - List stored runs
//! - `GET /api/research/{run_id}` - Run status and per-task progress
//! - `GET /api/research/{run_id}/report` - Finished report (`409` until done)
//! - `DELETE /api/research/{run_id}` - Cancel a run
//!
//! ## Health (`/health`)
//! - `GET /health` - Health check endpoint
//!
//! # OpenAPI Documentation
//!
//! When the `swagger-ui` feature is enabled, interactive API documentation
//! is available at `/swagger-ui/`.

use utoipa::OpenApi;

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

/// OpenAPI document for the research API.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::research::submit_research,
        handlers::research::list_research,
        handlers::research::get_research,
        handlers::research::get_report,
        handlers::research::cancel_research,
    ),
    components(schemas(
        crate::types::ResearchRequest,
        crate::types::SubmitResponse,
        crate::types::HealthResponse,
        crate::research::run::RunSummary,
        crate::research::report::Report,
    )),
    tags(
        (name = "research", description = "Research run lifecycle"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;
