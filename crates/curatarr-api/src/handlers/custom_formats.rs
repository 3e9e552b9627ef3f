// SPDX-License-Identifier: GPL-3.0-or-later
use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::handlers::releases::ReleaseCandidateRequest;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use curatarr_application::{AppState, FormatMatch, ImportSummary};
use curatarr_domain::{
    Condition, ConditionType, CustomFormat, CustomFormatId, MediaType, ReleaseCandidate, Validate,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConditionDto {
    /// `releaseName`, `releaseGroup`, `source`, `resolution`, `codec`, `audioCodec`,
    /// `audioChannels`, `language`, `edition`, `size` or `indexerFlag`.
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub condition_type: ConditionType,
    /// Case-insensitive regex, or a size range such as `>=5` or `2-10`.
    pub pattern: String,
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub required: bool,
}

impl From<ConditionDto> for Condition {
    fn from(value: ConditionDto) -> Self {
        Self {
            condition_type: value.condition_type,
            pattern: value.pattern,
            negate: value.negate,
            required: value.required,
        }
    }
}

impl From<Condition> for ConditionDto {
    fn from(value: Condition) -> Self {
        Self {
            condition_type: value.condition_type,
            pattern: value.pattern,
            negate: value.negate,
            required: value.required,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomFormatRequest {
    pub name: String,
    #[serde(default)]
    pub include_when_renaming: bool,
    pub conditions: Vec<ConditionDto>,
    /// `tv`, `anime`, `movie` or `music`; unscoped when absent.
    pub media_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomFormatResponse {
    pub id: Uuid,
    pub name: String,
    pub include_when_renaming: bool,
    pub conditions: Vec<ConditionDto>,
    pub media_type: Option<String>,
    pub external_id: Option<String>,
    pub category: Option<String>,
    pub recommended_score: Option<i32>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CustomFormat> for CustomFormatResponse {
    fn from(value: CustomFormat) -> Self {
        Self {
            id: value.id.0,
            name: value.name,
            include_when_renaming: value.include_when_renaming,
            conditions: value.conditions.into_iter().map(Into::into).collect(),
            media_type: value.media_type.map(|m| m.as_str().to_string()),
            external_id: value.external_id,
            category: value.category.map(|c| c.as_str().to_string()),
            recommended_score: value.recommended_score,
            last_synced_at: value.last_synced_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CustomFormatQuery {
    /// Only formats scoped to this media type.
    pub media_type: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TestFormatsRequest {
    pub candidate: ReleaseCandidateRequest,
    /// Restrict the test to these formats.
    pub format_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConditionResultResponse {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub pattern: String,
    pub negate: bool,
    pub required: bool,
    /// Release value the pattern was tested against.
    pub value: Option<String>,
    pub matched: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FormatMatchResponse {
    pub format_id: Uuid,
    pub name: String,
    pub trace: Vec<ConditionResultResponse>,
}

impl From<FormatMatch> for FormatMatchResponse {
    fn from(value: FormatMatch) -> Self {
        Self {
            format_id: value.format_id.0,
            name: value.name,
            trace: value
                .trace
                .into_iter()
                .map(|result| ConditionResultResponse {
                    condition_type: result.condition_type.as_str().to_string(),
                    pattern: result.pattern,
                    negate: result.negate,
                    required: result.required,
                    value: result.value,
                    matched: result.matched,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImportErrorResponse {
    pub media_type: String,
    /// Failing record; absent when the whole batch failed.
    pub record: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImportSummaryResponse {
    pub imported_count: usize,
    pub errors: Vec<ImportErrorResponse>,
    pub synced_at: DateTime<Utc>,
}

impl From<ImportSummary> for ImportSummaryResponse {
    fn from(value: ImportSummary) -> Self {
        Self {
            imported_count: value.imported_count,
            errors: value
                .errors
                .into_iter()
                .map(|error| ImportErrorResponse {
                    media_type: error.media_type.as_str().to_string(),
                    record: error.record,
                    message: error.message,
                })
                .collect(),
            synced_at: value.synced_at,
        }
    }
}

fn parse_media_type(value: &str) -> ApiResult<MediaType> {
    value.parse().map_err(ApiError::BadRequest)
}

fn parse_optional_media_type(value: Option<&str>) -> ApiResult<Option<MediaType>> {
    value.map(parse_media_type).transpose()
}

/// List custom formats ordered by name.
#[utoipa::path(
    get,
    path = "/api/v1/custom-formats",
    params(CustomFormatQuery),
    responses(
        (status = 200, description = "Custom formats", body = [CustomFormatResponse]),
        (status = 400, description = "Unknown media type", body = ErrorResponse)
    ),
    tag = "custom-formats"
)]
pub async fn list_custom_formats(
    State(state): State<AppState>,
    Query(query): Query<CustomFormatQuery>,
) -> ApiResult<Json<Vec<CustomFormatResponse>>> {
    let media_type = parse_optional_media_type(query.media_type.as_deref())?;
    let formats = state.custom_formats.list(media_type).await?;
    Ok(Json(formats.into_iter().map(Into::into).collect()))
}

/// Create a custom format.
#[utoipa::path(
    post,
    path = "/api/v1/custom-formats",
    request_body = CustomFormatRequest,
    responses(
        (status = 201, description = "Custom format created", body = CustomFormatResponse),
        (status = 400, description = "Invalid conditions", body = ErrorResponse),
        (status = 409, description = "Name already used", body = ErrorResponse)
    ),
    tag = "custom-formats"
)]
pub async fn create_custom_format(
    State(state): State<AppState>,
    Json(request): Json<CustomFormatRequest>,
) -> ApiResult<(StatusCode, Json<CustomFormatResponse>)> {
    let mut format = CustomFormat::new(
        request.name,
        request.conditions.into_iter().map(Into::into).collect(),
    );
    format.include_when_renaming = request.include_when_renaming;
    format.media_type = parse_optional_media_type(request.media_type.as_deref())?;
    format.validate()?;

    let created = state.custom_formats.create(format).await?;
    info!(target: "api", format = %created.name, "created custom format");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Replace the definition of a custom format.
#[utoipa::path(
    put,
    path = "/api/v1/custom-formats/{id}",
    params(("id" = Uuid, Path, description = "Custom format id")),
    request_body = CustomFormatRequest,
    responses(
        (status = 200, description = "Custom format updated", body = CustomFormatResponse),
        (status = 400, description = "Invalid conditions", body = ErrorResponse),
        (status = 404, description = "Unknown custom format", body = ErrorResponse),
        (status = 409, description = "Name already used", body = ErrorResponse)
    ),
    tag = "custom-formats"
)]
pub async fn update_custom_format(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CustomFormatRequest>,
) -> ApiResult<Json<CustomFormatResponse>> {
    let mut format = state
        .custom_formats
        .get_by_id(CustomFormatId(id))
        .await?
        .ok_or_else(|| ApiError::not_found("custom format", id))?;

    format.name = request.name;
    format.include_when_renaming = request.include_when_renaming;
    format.conditions = request.conditions.into_iter().map(Into::into).collect();
    format.media_type = parse_optional_media_type(request.media_type.as_deref())?;
    format.validate()?;

    let updated = state
        .custom_formats
        .update(format)
        .await?
        .ok_or_else(|| ApiError::not_found("custom format", id))?;
    Ok(Json(updated.into()))
}

/// Delete a custom format along with every profile score that references it.
#[utoipa::path(
    delete,
    path = "/api/v1/custom-formats/{id}",
    params(("id" = Uuid, Path, description = "Custom format id")),
    responses(
        (status = 204, description = "Custom format deleted"),
        (status = 404, description = "Unknown custom format", body = ErrorResponse)
    ),
    tag = "custom-formats"
)]
pub async fn delete_custom_format(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.custom_formats.delete(CustomFormatId(id)).await? {
        info!(target: "api", %id, "deleted custom format");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("custom format", id))
    }
}

/// Formats a release matches, with the per-condition trace.
#[utoipa::path(
    post,
    path = "/api/v1/custom-formats/test",
    request_body = TestFormatsRequest,
    responses(
        (status = 200, description = "Matched formats", body = [FormatMatchResponse])
    ),
    tag = "custom-formats"
)]
pub async fn test_custom_formats(
    State(state): State<AppState>,
    Json(request): Json<TestFormatsRequest>,
) -> ApiResult<Json<Vec<FormatMatchResponse>>> {
    let candidate = ReleaseCandidate::from(request.candidate);
    let format_ids: Option<Vec<CustomFormatId>> = request
        .format_ids
        .map(|ids| ids.into_iter().map(CustomFormatId).collect());
    let matches = state
        .evaluation
        .test_formats(&candidate, format_ids.as_deref())
        .await?;
    Ok(Json(matches.into_iter().map(Into::into).collect()))
}

/// Import the external rule catalog for one media type.
///
/// Failures are reported inside the summary; records imported before a failure stay stored.
#[utoipa::path(
    post,
    path = "/api/v1/custom-formats/import/{media_type}",
    params(("media_type" = String, Path, description = "tv, anime, movie or music")),
    responses(
        (status = 200, description = "Import finished", body = ImportSummaryResponse),
        (status = 400, description = "Unknown media type", body = ErrorResponse)
    ),
    tag = "custom-formats"
)]
pub async fn import_custom_formats(
    State(state): State<AppState>,
    Path(media_type): Path<String>,
) -> ApiResult<Json<ImportSummaryResponse>> {
    let media_type = parse_media_type(&media_type)?;
    let summary = state.importer.import(media_type).await;
    Ok(Json(summary.into()))
}
