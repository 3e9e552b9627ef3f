// SPDX-License-Identifier: GPL-3.0-or-later
use crate::error::{ApiError, ApiResult, ErrorResponse};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use curatarr_application::AppState;
use curatarr_domain::{
    CustomFormatId, MediaType, ProfileId, QualityId, QualityProfile, QualityProfileItem,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct ProfileItemDto {
    pub quality_id: u32,
    pub enabled: bool,
}

/// Items are listed from least to most preferred.
#[derive(Debug, Deserialize, ToSchema)]
pub struct QualityProfileRequest {
    pub name: String,
    #[serde(default)]
    pub upgrade_allowed: bool,
    pub cutoff_quality_id: Option<u32>,
    pub items: Vec<ProfileItemDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QualityProfileResponse {
    pub id: Uuid,
    pub name: String,
    pub upgrade_allowed: bool,
    pub cutoff_quality_id: Option<u32>,
    pub items: Vec<ProfileItemDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<QualityProfile> for QualityProfileResponse {
    fn from(value: QualityProfile) -> Self {
        Self {
            id: value.id.0,
            name: value.name,
            upgrade_allowed: value.upgrade_allowed,
            cutoff_quality_id: value.cutoff_quality_id.map(|id| id.0),
            items: value
                .items
                .into_iter()
                .map(|item| ProfileItemDto {
                    quality_id: item.quality_id.0,
                    enabled: item.enabled,
                })
                .collect(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct FormatScoreDto {
    pub format_id: Uuid,
    pub score: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetScoresRequest {
    /// Replaces every score of the profile. Formats left out score 0.
    pub scores: Vec<FormatScoreDto>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecommendedScoresQuery {
    /// Only use formats imported for this media type.
    pub media_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppliedScoresResponse {
    pub applied: usize,
}

fn apply_request(profile: &mut QualityProfile, request: QualityProfileRequest) {
    profile.name = request.name;
    profile.upgrade_allowed = request.upgrade_allowed;
    profile.cutoff_quality_id = request.cutoff_quality_id.map(QualityId);
    profile.items = request
        .items
        .into_iter()
        .map(|item| QualityProfileItem {
            quality_id: QualityId(item.quality_id),
            enabled: item.enabled,
        })
        .collect();
}

async fn validate_profile(state: &AppState, profile: &QualityProfile) -> ApiResult<()> {
    let catalog = state.quality_definitions.list().await?;
    profile.validate_with_catalog(&catalog)?;
    Ok(())
}

/// List quality profiles.
#[utoipa::path(
    get,
    path = "/api/v1/quality-profiles",
    responses(
        (status = 200, description = "Quality profiles", body = [QualityProfileResponse])
    ),
    tag = "quality-profiles"
)]
pub async fn list_quality_profiles(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<QualityProfileResponse>>> {
    let profiles = state.quality_profiles.list().await?;
    Ok(Json(profiles.into_iter().map(Into::into).collect()))
}

/// Get a quality profile.
#[utoipa::path(
    get,
    path = "/api/v1/quality-profiles/{id}",
    params(("id" = Uuid, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Quality profile", body = QualityProfileResponse),
        (status = 404, description = "Unknown profile", body = ErrorResponse)
    ),
    tag = "quality-profiles"
)]
pub async fn get_quality_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QualityProfileResponse>> {
    let profile = state
        .quality_profiles
        .get_by_id(ProfileId(id))
        .await?
        .ok_or_else(|| ApiError::not_found("quality profile", id))?;
    Ok(Json(profile.into()))
}

/// Create a quality profile.
#[utoipa::path(
    post,
    path = "/api/v1/quality-profiles",
    request_body = QualityProfileRequest,
    responses(
        (status = 201, description = "Profile created", body = QualityProfileResponse),
        (status = 400, description = "Invalid profile", body = ErrorResponse),
        (status = 409, description = "Name already used", body = ErrorResponse)
    ),
    tag = "quality-profiles"
)]
pub async fn create_quality_profile(
    State(state): State<AppState>,
    Json(request): Json<QualityProfileRequest>,
) -> ApiResult<(StatusCode, Json<QualityProfileResponse>)> {
    let mut profile = QualityProfile::new("", Vec::new());
    apply_request(&mut profile, request);
    validate_profile(&state, &profile).await?;

    let created = state.quality_profiles.create(profile).await?;
    info!(target: "api", profile = %created.name, "created quality profile");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Replace a quality profile's settings and item order.
#[utoipa::path(
    put,
    path = "/api/v1/quality-profiles/{id}",
    params(("id" = Uuid, Path, description = "Profile id")),
    request_body = QualityProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = QualityProfileResponse),
        (status = 400, description = "Invalid profile", body = ErrorResponse),
        (status = 404, description = "Unknown profile", body = ErrorResponse),
        (status = 409, description = "Name already used", body = ErrorResponse)
    ),
    tag = "quality-profiles"
)]
pub async fn update_quality_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<QualityProfileRequest>,
) -> ApiResult<Json<QualityProfileResponse>> {
    let mut profile = state
        .quality_profiles
        .get_by_id(ProfileId(id))
        .await?
        .ok_or_else(|| ApiError::not_found("quality profile", id))?;
    apply_request(&mut profile, request);
    validate_profile(&state, &profile).await?;

    let updated = state
        .quality_profiles
        .update(profile)
        .await?
        .ok_or_else(|| ApiError::not_found("quality profile", id))?;
    Ok(Json(updated.into()))
}

/// Delete a quality profile and its scores.
#[utoipa::path(
    delete,
    path = "/api/v1/quality-profiles/{id}",
    params(("id" = Uuid, Path, description = "Profile id")),
    responses(
        (status = 204, description = "Profile deleted"),
        (status = 404, description = "Unknown profile", body = ErrorResponse)
    ),
    tag = "quality-profiles"
)]
pub async fn delete_quality_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.quality_profiles.delete(ProfileId(id)).await? {
        info!(target: "api", %id, "deleted quality profile");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("quality profile", id))
    }
}

/// Custom format scores of a profile.
#[utoipa::path(
    get,
    path = "/api/v1/quality-profiles/{id}/scores",
    params(("id" = Uuid, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Scores by format", body = [FormatScoreDto]),
        (status = 404, description = "Unknown profile", body = ErrorResponse)
    ),
    tag = "quality-profiles"
)]
pub async fn get_profile_scores(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<FormatScoreDto>>> {
    let profile_id = ProfileId(id);
    if state.quality_profiles.get_by_id(profile_id).await?.is_none() {
        return Err(ApiError::not_found("quality profile", id));
    }
    let mut scores: Vec<FormatScoreDto> = state
        .format_scores
        .scores_for_profile(profile_id)
        .await?
        .into_iter()
        .map(|(format_id, score)| FormatScoreDto {
            format_id: format_id.0,
            score,
        })
        .collect();
    scores.sort_by_key(|score| score.format_id);
    Ok(Json(scores))
}

/// Replace every custom format score of a profile in one step.
#[utoipa::path(
    put,
    path = "/api/v1/quality-profiles/{id}/scores",
    params(("id" = Uuid, Path, description = "Profile id")),
    request_body = SetScoresRequest,
    responses(
        (status = 204, description = "Scores replaced"),
        (status = 400, description = "Unknown or repeated format", body = ErrorResponse),
        (status = 404, description = "Unknown profile", body = ErrorResponse)
    ),
    tag = "quality-profiles"
)]
pub async fn set_profile_scores(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetScoresRequest>,
) -> ApiResult<StatusCode> {
    let profile_id = ProfileId(id);
    if state.quality_profiles.get_by_id(profile_id).await?.is_none() {
        return Err(ApiError::not_found("quality profile", id));
    }

    let known: HashSet<CustomFormatId> = state
        .custom_formats
        .list(None)
        .await?
        .into_iter()
        .map(|format| format.id)
        .collect();
    let mut seen = HashSet::new();
    let mut errors = Vec::new();
    for entry in &request.scores {
        let format_id = CustomFormatId(entry.format_id);
        if !known.contains(&format_id) {
            errors.push(ValidationError {
                field: "scores",
                message: format!("unknown custom format {format_id}"),
            });
        } else if !seen.insert(format_id) {
            errors.push(ValidationError {
                field: "scores",
                message: format!("custom format {format_id} is listed more than once"),
            });
        }
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let scores: Vec<(CustomFormatId, i32)> = request
        .scores
        .iter()
        .map(|entry| (CustomFormatId(entry.format_id), entry.score))
        .collect();
    state.format_scores.replace_scores(profile_id, &scores).await?;
    info!(target: "api", %profile_id, count = scores.len(), "replaced profile scores");
    Ok(StatusCode::NO_CONTENT)
}

/// Copy the recommended scores of imported formats onto a profile.
#[utoipa::path(
    post,
    path = "/api/v1/quality-profiles/{id}/scores/recommended",
    params(
        ("id" = Uuid, Path, description = "Profile id"),
        RecommendedScoresQuery
    ),
    responses(
        (status = 200, description = "Scores applied", body = AppliedScoresResponse),
        (status = 400, description = "Unknown media type", body = ErrorResponse),
        (status = 404, description = "Unknown profile", body = ErrorResponse)
    ),
    tag = "quality-profiles"
)]
pub async fn apply_recommended_scores(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RecommendedScoresQuery>,
) -> ApiResult<Json<AppliedScoresResponse>> {
    let media_type = query
        .media_type
        .as_deref()
        .map(str::parse::<MediaType>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let applied = state
        .importer
        .apply_recommended_scores(ProfileId(id), media_type)
        .await?
        .ok_or_else(|| ApiError::not_found("quality profile", id))?;
    Ok(Json(AppliedScoresResponse { applied }))
}
