// SPDX-License-Identifier: GPL-3.0-or-later
use crate::error::{ApiError, ApiResult, ErrorResponse};
use axum::extract::{Path, State};
use axum::Json;
use curatarr_application::AppState;
use curatarr_domain::{QualityDefinition, QualityId, Validate};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QualityDefinitionResponse {
    pub id: u32,
    pub name: String,
    pub source: String,
    pub resolution: String,
    /// Megabytes per minute.
    pub min_size: f64,
    pub max_size: f64,
    pub preferred_size: Option<f64>,
    pub weight: u32,
}

impl From<QualityDefinition> for QualityDefinitionResponse {
    fn from(value: QualityDefinition) -> Self {
        Self {
            id: value.id.0,
            name: value.name,
            source: value.source.as_str().to_string(),
            resolution: value.resolution.as_str().to_string(),
            min_size: value.min_size,
            max_size: value.max_size,
            preferred_size: value.preferred_size,
            weight: value.weight,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQualitySizeRequest {
    pub min_size: f64,
    pub max_size: f64,
    pub preferred_size: Option<f64>,
}

/// List quality tiers from worst to best.
#[utoipa::path(
    get,
    path = "/api/v1/qualities",
    responses(
        (status = 200, description = "Quality tiers ordered by weight", body = [QualityDefinitionResponse])
    ),
    tag = "qualities"
)]
pub async fn list_qualities(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<QualityDefinitionResponse>>> {
    let definitions = state.quality_definitions.list().await?;
    Ok(Json(definitions.into_iter().map(Into::into).collect()))
}

/// Change the size bounds of a quality tier. Name, source, resolution and weight are fixed.
#[utoipa::path(
    put,
    path = "/api/v1/qualities/{id}",
    params(("id" = u32, Path, description = "Quality id")),
    request_body = UpdateQualitySizeRequest,
    responses(
        (status = 200, description = "Bounds updated", body = QualityDefinitionResponse),
        (status = 400, description = "Invalid bounds", body = ErrorResponse),
        (status = 404, description = "Unknown quality", body = ErrorResponse)
    ),
    tag = "qualities"
)]
pub async fn update_quality_size(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<UpdateQualitySizeRequest>,
) -> ApiResult<Json<QualityDefinitionResponse>> {
    let mut definition = state
        .quality_definitions
        .get(QualityId(id))
        .await?
        .ok_or_else(|| ApiError::not_found("quality", id))?;

    definition.min_size = request.min_size;
    definition.max_size = request.max_size;
    definition.preferred_size = request.preferred_size;
    definition.validate()?;

    if !state.quality_definitions.update_size_bounds(&definition).await? {
        return Err(ApiError::not_found("quality", id));
    }
    info!(target: "api", quality = %definition.name, "updated quality size bounds");
    Ok(Json(definition.into()))
}
