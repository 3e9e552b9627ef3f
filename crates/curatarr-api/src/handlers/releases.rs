// SPDX-License-Identifier: GPL-3.0-or-later
use crate::error::{ApiResult, ErrorResponse};
use crate::handlers::qualities::QualityDefinitionResponse;
use axum::extract::State;
use axum::Json;
use curatarr_application::{AppState, Decision, DecisionAction, ScoreBreakdown};
use curatarr_domain::{
    CustomFormatId, ExistingFile, ProfileId, QualityId, QualityRank, ReleaseCandidate, Resolution,
    Source,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Parsed attributes of a release. Unrecognised source, resolution or media type names count as
/// absent.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReleaseCandidateRequest {
    pub raw_title: String,
    pub release_group: Option<String>,
    pub source: Option<String>,
    pub resolution: Option<String>,
    pub codec: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_channels: Option<String>,
    pub language: Option<String>,
    pub edition: Option<String>,
    /// Megabytes per minute of content.
    pub size: Option<f64>,
    #[serde(default)]
    pub indexer_flags: Vec<String>,
    /// `tv`, `anime`, `movie` or `music`. Formats scoped to another media type are ignored.
    pub media_type: Option<String>,
}

impl From<ReleaseCandidateRequest> for ReleaseCandidate {
    fn from(value: ReleaseCandidateRequest) -> Self {
        Self {
            raw_title: value.raw_title,
            release_group: value.release_group,
            source: value
                .source
                .as_deref()
                .map(Source::parse)
                .filter(|source| *source != Source::Unknown),
            resolution: value
                .resolution
                .as_deref()
                .map(Resolution::parse)
                .filter(|resolution| *resolution != Resolution::Unknown),
            codec: value.codec,
            audio_codec: value.audio_codec,
            audio_channels: value.audio_channels,
            language: value.language,
            edition: value.edition,
            size: value.size,
            indexer_flags: value.indexer_flags,
            media_type: value
                .media_type
                .as_deref()
                .and_then(|media_type| media_type.parse().ok()),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
pub struct ExistingFileRequest {
    pub quality_id: u32,
    pub score: i32,
}

impl From<ExistingFileRequest> for ExistingFile {
    fn from(value: ExistingFileRequest) -> Self {
        Self {
            quality_id: QualityId(value.quality_id),
            score: value.score,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EvaluateReleaseRequest {
    pub candidate: ReleaseCandidateRequest,
    pub profile_id: Uuid,
    pub existing: Option<ExistingFileRequest>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BestReleaseRequest {
    pub candidates: Vec<ReleaseCandidateRequest>,
    pub profile_id: Uuid,
    pub existing: Option<ExistingFileRequest>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScoreReleaseRequest {
    pub candidate: ReleaseCandidateRequest,
    pub profile_id: Uuid,
    /// Restrict scoring to these formats.
    pub format_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MatchedFormatResponse {
    pub format_id: Uuid,
    pub name: String,
    pub score: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreResponse {
    pub matched_formats: Vec<MatchedFormatResponse>,
    pub total: i32,
}

impl From<ScoreBreakdown> for ScoreResponse {
    fn from(value: ScoreBreakdown) -> Self {
        Self {
            matched_formats: value
                .matched_formats
                .into_iter()
                .map(|matched| MatchedFormatResponse {
                    format_id: matched.format_id.0,
                    name: matched.name,
                    score: matched.score,
                })
                .collect(),
            total: value.total,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SizeCheckResponse {
    pub ok: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DecisionResponse {
    /// `grab`, `upgrade`, `reject` or `skip`.
    pub action: String,
    pub reason: Option<String>,
    pub quality: QualityDefinitionResponse,
    /// Position in the profile; absent when the quality is not wanted.
    pub rank: Option<usize>,
    pub score: ScoreResponse,
    pub size_check: Option<SizeCheckResponse>,
}

impl From<Decision> for DecisionResponse {
    fn from(value: Decision) -> Self {
        let action = match value.action {
            DecisionAction::Grab => "grab",
            DecisionAction::Upgrade => "upgrade",
            DecisionAction::Reject => "reject",
            DecisionAction::Skip => "skip",
        };
        Self {
            action: action.to_string(),
            reason: value.reason.map(|reason| reason.to_string()),
            quality: value.quality.into(),
            rank: match value.rank {
                QualityRank::Ranked(rank) => Some(rank),
                QualityRank::Disabled => None,
            },
            score: value.score.into(),
            size_check: value.size_check.map(|check| SizeCheckResponse {
                ok: check.ok,
                reason: check.reason,
            }),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BestReleaseResponse {
    /// Index into the submitted candidates; absent when none is acceptable.
    pub index: Option<usize>,
    pub decision: Option<DecisionResponse>,
}

/// Decide whether to grab, upgrade to, reject or skip a release.
#[utoipa::path(
    post,
    path = "/api/v1/releases/evaluate",
    request_body = EvaluateReleaseRequest,
    responses(
        (status = 200, description = "Decision for the release", body = DecisionResponse),
        (status = 500, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "releases"
)]
pub async fn evaluate_release(
    State(state): State<AppState>,
    Json(request): Json<EvaluateReleaseRequest>,
) -> ApiResult<Json<DecisionResponse>> {
    let candidate = ReleaseCandidate::from(request.candidate);
    let existing = request.existing.map(ExistingFile::from);
    let decision = state
        .evaluation
        .evaluate(&candidate, ProfileId(request.profile_id), existing.as_ref())
        .await?;
    Ok(Json(decision.into()))
}

/// Pick the best acceptable release out of several.
#[utoipa::path(
    post,
    path = "/api/v1/releases/best",
    request_body = BestReleaseRequest,
    responses(
        (status = 200, description = "Chosen release, if any", body = BestReleaseResponse)
    ),
    tag = "releases"
)]
pub async fn best_release(
    State(state): State<AppState>,
    Json(request): Json<BestReleaseRequest>,
) -> ApiResult<Json<BestReleaseResponse>> {
    let candidates: Vec<ReleaseCandidate> = request
        .candidates
        .into_iter()
        .map(ReleaseCandidate::from)
        .collect();
    let existing = request.existing.map(ExistingFile::from);
    let best = state
        .evaluation
        .best_candidate(&candidates, ProfileId(request.profile_id), existing.as_ref())
        .await?;

    let response = match best {
        Some((index, decision)) => BestReleaseResponse {
            index: Some(index),
            decision: Some(decision.into()),
        },
        None => BestReleaseResponse {
            index: None,
            decision: None,
        },
    };
    Ok(Json(response))
}

/// Custom format score of a release under a profile.
#[utoipa::path(
    post,
    path = "/api/v1/releases/score",
    request_body = ScoreReleaseRequest,
    responses(
        (status = 200, description = "Matched formats and total", body = ScoreResponse)
    ),
    tag = "releases"
)]
pub async fn score_release(
    State(state): State<AppState>,
    Json(request): Json<ScoreReleaseRequest>,
) -> ApiResult<Json<ScoreResponse>> {
    let candidate = ReleaseCandidate::from(request.candidate);
    let format_ids: Option<Vec<CustomFormatId>> = request
        .format_ids
        .map(|ids| ids.into_iter().map(CustomFormatId).collect());
    let breakdown = state
        .evaluation
        .compute_score(&candidate, ProfileId(request.profile_id), format_ids.as_deref())
        .await?;
    Ok(Json(breakdown.into()))
}
