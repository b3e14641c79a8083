use crate::{
    AppState,
    research::{report::Report, run::RunSummary},
    types::{ResearchRequest, Result, SubmitResponse},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

/// Submit a research query
///
/// The run is accepted immediately and executed in the background. Invalid
/// queries are accepted too and end in the `rejected` phase with a reason.
#[utoipa::path(
    post,
    path = "/api/research",
    request_body = ResearchRequest,
    responses(
        (status = 202, description = "Research run accepted", body = SubmitResponse),
        (status = 400, description = "Malformed request body")
    ),
    tag = "research"
)]
pub async fn submit_research(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let run_id = state.coordinator.submit(payload.into_query());
    let summary = state.coordinator.status(run_id)?;
    info!(run_id = %run_id, "Research submitted over HTTP");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            run_id,
            phase: summary.phase,
        }),
    ))
}

/// List stored research runs, newest first
#[utoipa::path(
    get,
    path = "/api/research",
    responses(
        (status = 200, description = "Stored runs", body = Vec<RunSummary>)
    ),
    tag = "research"
)]
pub async fn list_research(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    Json(state.coordinator.store().summaries())
}

/// Get the status of a research run
#[utoipa::path(
    get,
    path = "/api/research/{run_id}",
    params(("run_id" = Uuid, Path, description = "Research run id")),
    responses(
        (status = 200, description = "Run status", body = RunSummary),
        (status = 404, description = "Unknown run")
    ),
    tag = "research"
)]
pub async fn get_research(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunSummary>> {
    Ok(Json(state.coordinator.status(run_id)?))
}

/// Get the report of a finished research run
#[utoipa::path(
    get,
    path = "/api/research/{run_id}/report",
    params(("run_id" = Uuid, Path, description = "Research run id")),
    responses(
        (status = 200, description = "Research report", body = Report),
        (status = 404, description = "Unknown run"),
        (status = 409, description = "Run has not finished successfully")
    ),
    tag = "research"
)]
pub async fn get_report(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Report>> {
    let report = state.coordinator.report(run_id)?;
    Ok(Json(report.as_ref().clone()))
}

/// Cancel a research run
///
/// Resolves once every in-flight task has stopped.
#[utoipa::path(
    delete,
    path = "/api/research/{run_id}",
    params(("run_id" = Uuid, Path, description = "Research run id")),
    responses(
        (status = 200, description = "Run cancelled", body = RunSummary),
        (status = 404, description = "Unknown run"),
        (status = 409, description = "Run already finished")
    ),
    tag = "research"
)]
pub async fn cancel_research(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunSummary>> {
    Ok(Json(state.coordinator.cancel(run_id).await?))
}
