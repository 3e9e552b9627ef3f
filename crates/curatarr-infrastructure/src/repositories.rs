// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use curatarr_domain::{
    CustomFormat, CustomFormatId, MediaType, ProfileId, QualityDefinition,
    QualityId, QualityProfile,
};
use std::collections::HashMap;
use thiserror::Error;

/// Store-level failures callers are expected to branch on.
///
/// Returned inside `anyhow::Error`; use `downcast_ref::<RepositoryError>()` to recover it.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} named '{name}' already exists")]
    NameConflict { entity: &'static str, name: String },
}

/// Result of an upsert keyed on a custom format's external id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Definition identical to the stored one; only the sync timestamp moved.
    Unchanged,
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Quality tiers. Rows are seeded once and never deleted.
#[async_trait::async_trait]
pub trait QualityDefinitionRepository: Send + Sync {
    /// All tiers, ascending by weight.
    async fn list(&self) -> Result<Vec<QualityDefinition>>;
    async fn get(&self, id: QualityId) -> Result<Option<QualityDefinition>>;
    /// Persist the size bounds of `definition`; identity and weight are left alone.
    /// Returns `false` when no tier with that id exists.
    async fn update_size_bounds(&self, definition: &QualityDefinition) -> Result<bool>;
    /// Insert any tier not already present. Returns the number of rows inserted.
    async fn seed_defaults(&self, definitions: &[QualityDefinition]) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait QualityProfileRepository: Send + Sync {
    async fn create(&self, profile: QualityProfile) -> Result<QualityProfile>;
    async fn get_by_id(&self, id: ProfileId) -> Result<Option<QualityProfile>>;
    async fn get_by_name(&self, name: &str) -> Result<Option<QualityProfile>>;
    async fn list(&self) -> Result<Vec<QualityProfile>>;
    /// Replace the stored profile atomically. Returns `None` when it does not exist.
    async fn update(&self, profile: QualityProfile) -> Result<Option<QualityProfile>>;
    async fn delete(&self, id: ProfileId) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait CustomFormatRepository: Send + Sync {
    async fn create(&self, format: CustomFormat) -> Result<CustomFormat>;
    async fn update(&self, format: CustomFormat) -> Result<Option<CustomFormat>>;
    async fn get_by_id(&self, id: CustomFormatId) -> Result<Option<CustomFormat>>;
    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<CustomFormat>>;
    /// All formats ordered by name, optionally restricted to one media type scope.
    async fn list(&self, media_type: Option<MediaType>) -> Result<Vec<CustomFormat>>;
    async fn delete(&self, id: CustomFormatId) -> Result<bool>;
    /// Insert or refresh the format sharing `format.external_id`, keeping the stored id.
    async fn upsert_by_external_id(
        &self,
        format: CustomFormat,
    ) -> Result<(CustomFormat, UpsertOutcome)>;
}

#[async_trait::async_trait]
pub trait CustomFormatScoreRepository: Send + Sync {
    /// Scores configured on a profile. Formats without an entry score 0.
    async fn scores_for_profile(&self, profile_id: ProfileId)
        -> Result<HashMap<CustomFormatId, i32>>;
    /// Replace every score of a profile in one transaction.
    async fn replace_scores(
        &self,
        profile_id: ProfileId,
        scores: &[(CustomFormatId, i32)],
    ) -> Result<()>;
    /// Insert or overwrite the given scores, leaving the profile's other entries alone.
    async fn upsert_scores(
        &self,
        profile_id: ProfileId,
        scores: &[(CustomFormatId, i32)],
    ) -> Result<()>;
    async fn remove(&self, profile_id: ProfileId, format_id: CustomFormatId) -> Result<bool>;
}

/// Everything one evaluation reads, taken from a single read transaction.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    /// Ascending by weight.
    pub definitions: Vec<QualityDefinition>,
    pub profile: Option<QualityProfile>,
    /// Ordered by name.
    pub formats: Vec<CustomFormat>,
    pub scores: HashMap<CustomFormatId, i32>,
}

#[async_trait::async_trait]
pub trait EvaluationSnapshotRepository: Send + Sync {
    /// Catalog, profile, formats and the profile's scores as of one point in time. Concurrent
    /// writers are either fully visible or not at all.
    async fn read_snapshot(&self, profile_id: ProfileId) -> Result<StoredSnapshot>;
}
