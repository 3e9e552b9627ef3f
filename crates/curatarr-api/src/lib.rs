// SPDX-License-Identifier: GPL-3.0-or-later
pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use curatarr_application::AppState;
use handlers::custom_formats::{
    create_custom_format, delete_custom_format, import_custom_formats, list_custom_formats,
    test_custom_formats, update_custom_format,
};
use handlers::qualities::{list_qualities, update_quality_size};
use handlers::quality_profiles::{
    apply_recommended_scores, create_quality_profile, delete_quality_profile,
    get_profile_scores, get_quality_profile, list_quality_profiles, set_profile_scores,
    update_quality_profile,
};
use handlers::releases::{best_release, evaluate_release, score_release};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize, utoipa::ToSchema)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
#[allow(dead_code)]
async fn health() -> Json<HealthResponse> {
    health_handler().await
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        handlers::qualities::list_qualities,
        handlers::qualities::update_quality_size,
        handlers::custom_formats::list_custom_formats,
        handlers::custom_formats::create_custom_format,
        handlers::custom_formats::update_custom_format,
        handlers::custom_formats::delete_custom_format,
        handlers::custom_formats::test_custom_formats,
        handlers::custom_formats::import_custom_formats,
        handlers::quality_profiles::list_quality_profiles,
        handlers::quality_profiles::get_quality_profile,
        handlers::quality_profiles::create_quality_profile,
        handlers::quality_profiles::update_quality_profile,
        handlers::quality_profiles::delete_quality_profile,
        handlers::quality_profiles::get_profile_scores,
        handlers::quality_profiles::set_profile_scores,
        handlers::quality_profiles::apply_recommended_scores,
        handlers::releases::evaluate_release,
        handlers::releases::best_release,
        handlers::releases::score_release,
    ),
    components(
        schemas(
            HealthResponse,
            error::ErrorResponse,
            error::FieldError,
        )
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "qualities", description = "Quality tier catalog"),
        (name = "custom-formats", description = "Custom format rules, testing and catalog import"),
        (name = "quality-profiles", description = "Quality profiles and their custom format scores"),
        (name = "releases", description = "Release evaluation and scoring")
    ),
    info(
        title = "Curatarr API",
        version = "0.1.0",
        description = "Release evaluation and quality decision engine",
    )
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    info!(target: "api", "building router");

    let api_v1 = Router::new()
        .route("/qualities", get(list_qualities))
        .route("/qualities/:id", put(update_quality_size))
        .route(
            "/custom-formats",
            get(list_custom_formats).post(create_custom_format),
        )
        .route(
            "/custom-formats/:id",
            put(update_custom_format).delete(delete_custom_format),
        )
        .route("/custom-formats/test", post(test_custom_formats))
        .route(
            "/custom-formats/import/:media_type",
            post(import_custom_formats),
        )
        .route(
            "/quality-profiles",
            get(list_quality_profiles).post(create_quality_profile),
        )
        .route(
            "/quality-profiles/:id",
            get(get_quality_profile)
                .put(update_quality_profile)
                .delete(delete_quality_profile),
        )
        .route(
            "/quality-profiles/:id/scores",
            get(get_profile_scores).put(set_profile_scores),
        )
        .route(
            "/quality-profiles/:id/scores/recommended",
            post(apply_recommended_scores),
        )
        .route("/releases/evaluate", post(evaluate_release))
        .route("/releases/best", post(best_release))
        .route("/releases/score", post(score_release));

    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", api_v1)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", openapi))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
