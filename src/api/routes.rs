use crate::AppState;
use crate::api::handlers::{health, research};
use crate::utils::toml_config::ServerConfig;
use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::get,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::warn;

/// Research requests are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Routes mounted under `/api`.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/research",
            get(research::list_research).post(research::submit_research),
        )
        .route(
            "/research/{run_id}",
            get(research::get_research).delete(research::cancel_research),
        )
        .route("/research/{run_id}/report", get(research::get_report))
}

/// CORS for the configured origins; unparsable origins are skipped.
pub fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

/// The complete application with health, `/api` and swagger routes behind
/// CORS, a body size limit and request tracing.
pub fn build_app(state: AppState) -> Router {
    let server = state.config_manager.config().server.clone();

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/api", create_router());

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", crate::api::ApiDoc::openapi()),
        )
    };

    router
        .layer(cors_layer(&server))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
