// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use curatarr_domain::{
    CustomFormat, CustomFormatId, FormatCategory, MediaType, ProfileId, QualityDefinition,
    QualityId, QualityProfile, Resolution, Source,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::repositories::{
    CustomFormatRepository, CustomFormatScoreRepository, EvaluationSnapshotRepository,
    QualityDefinitionRepository, QualityProfileRepository, RepositoryError, StoredSnapshot,
    UpsertOutcome,
};

// ============================================================================

/// SQLx-backed quality tier repository
pub struct SqliteQualityDefinitionRepository {
    pool: SqlitePool,
}

impl SqliteQualityDefinitionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QualityDefinitionRepository for SqliteQualityDefinitionRepository {
    async fn list(&self) -> Result<Vec<QualityDefinition>> {
        debug!(target: "repository", "listing quality definitions");
        let rows = sqlx::query("SELECT * FROM quality_definitions ORDER BY weight")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_quality_definition).collect()
    }

    async fn get(&self, id: QualityId) -> Result<Option<QualityDefinition>> {
        debug!(target: "repository", %id, "fetching quality definition");
        let row = sqlx::query("SELECT * FROM quality_definitions WHERE id = ? LIMIT 1")
            .bind(i64::from(id.0))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_quality_definition).transpose()
    }

    async fn update_size_bounds(&self, definition: &QualityDefinition) -> Result<bool> {
        debug!(target: "repository", id = %definition.id, "updating quality size bounds");
        let result = sqlx::query(
            "UPDATE quality_definitions SET min_size = ?, max_size = ?, preferred_size = ? WHERE id = ?",
        )
        .bind(definition.min_size)
        .bind(definition.max_size)
        .bind(definition.preferred_size)
        .bind(i64::from(definition.id.0))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn seed_defaults(&self, definitions: &[QualityDefinition]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for definition in definitions {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO quality_definitions (
                    id, name, source, resolution, min_size, max_size, preferred_size, weight
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(i64::from(definition.id.0))
            .bind(&definition.name)
            .bind(definition.source.as_str())
            .bind(definition.resolution.as_str())
            .bind(definition.min_size)
            .bind(definition.max_size)
            .bind(definition.preferred_size)
            .bind(i64::from(definition.weight))
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        debug!(target: "repository", inserted, "seeded quality definitions");
        Ok(inserted)
    }
}

fn row_to_quality_definition(row: &SqliteRow) -> Result<QualityDefinition> {
    let id: i64 = row.try_get("id")?;
    let source: String = row.try_get("source")?;
    let resolution: String = row.try_get("resolution")?;
    let weight: i64 = row.try_get("weight")?;

    Ok(QualityDefinition {
        id: QualityId(u32::try_from(id)?),
        name: row.try_get("name")?,
        source: Source::parse(&source),
        resolution: Resolution::parse(&resolution),
        min_size: row.try_get("min_size")?,
        max_size: row.try_get("max_size")?,
        preferred_size: row.try_get("preferred_size")?,
        weight: u32::try_from(weight)?,
    })
}

// ============================================================================

/// SQLx-backed Quality Profile repository
pub struct SqliteQualityProfileRepository {
    pool: SqlitePool,
}

impl SqliteQualityProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QualityProfileRepository for SqliteQualityProfileRepository {
    async fn create(&self, profile: QualityProfile) -> Result<QualityProfile> {
        debug!(target: "repository", profile_id = %profile.id, "creating quality profile");
        let q = r#"
            INSERT INTO quality_profiles (
                id, name, upgrade_allowed, cutoff_quality_id, items, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;
        sqlx::query(q)
            .bind(profile.id.to_string())
            .bind(&profile.name)
            .bind(profile.upgrade_allowed)
            .bind(profile.cutoff_quality_id.map(|id| i64::from(id.0)))
            .bind(serde_json::to_string(&profile.items)?)
            .bind(profile.created_at.to_rfc3339())
            .bind(profile.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, "quality profile", &profile.name))?;
        Ok(profile)
    }

    async fn get_by_id(&self, id: ProfileId) -> Result<Option<QualityProfile>> {
        debug!(target: "repository", %id, "fetching quality profile by id");
        let row = sqlx::query("SELECT * FROM quality_profiles WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_quality_profile).transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<QualityProfile>> {
        debug!(target: "repository", name, "fetching quality profile by name");
        let row = sqlx::query("SELECT * FROM quality_profiles WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_quality_profile).transpose()
    }

    async fn list(&self) -> Result<Vec<QualityProfile>> {
        debug!(target: "repository", "listing quality profiles");
        let rows = sqlx::query("SELECT * FROM quality_profiles ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_quality_profile).collect()
    }

    async fn update(&self, mut profile: QualityProfile) -> Result<Option<QualityProfile>> {
        debug!(target: "repository", profile_id = %profile.id, "updating quality profile");
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT created_at FROM quality_profiles WHERE id = ?")
            .bind(profile.id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(existing) = existing else {
            return Ok(None);
        };

        profile.created_at = parse_dt(existing.try_get("created_at")?)?;
        profile.updated_at = Utc::now();

        let q = r#"
            UPDATE quality_profiles SET
                name = ?,
                upgrade_allowed = ?,
                cutoff_quality_id = ?,
                items = ?,
                updated_at = ?
            WHERE id = ?
        "#;
        sqlx::query(q)
            .bind(&profile.name)
            .bind(profile.upgrade_allowed)
            .bind(profile.cutoff_quality_id.map(|id| i64::from(id.0)))
            .bind(serde_json::to_string(&profile.items)?)
            .bind(profile.updated_at.to_rfc3339())
            .bind(profile.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_or(e, "quality profile", &profile.name))?;

        tx.commit().await?;
        Ok(Some(profile))
    }

    async fn delete(&self, id: ProfileId) -> Result<bool> {
        debug!(target: "repository", %id, "deleting quality profile");
        let result = sqlx::query("DELETE FROM quality_profiles WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_quality_profile(row: &SqliteRow) -> Result<QualityProfile> {
    let id_str: String = row.try_get("id")?;
    let cutoff: Option<i64> = row.try_get("cutoff_quality_id")?;
    let items: String = row.try_get("items")?;

    Ok(QualityProfile {
        id: ProfileId::from_uuid(Uuid::parse_str(&id_str)?),
        name: row.try_get("name")?,
        upgrade_allowed: row.try_get("upgrade_allowed")?,
        cutoff_quality_id: cutoff.map(u32::try_from).transpose()?.map(QualityId),
        items: serde_json::from_str(&items)?,
        created_at: parse_dt(row.try_get("created_at")?)?,
        updated_at: parse_dt(row.try_get("updated_at")?)?,
    })
}

// ============================================================================

/// SQLx-backed custom format repository
pub struct SqliteCustomFormatRepository {
    pool: SqlitePool,
}

impl SqliteCustomFormatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CustomFormatRepository for SqliteCustomFormatRepository {
    async fn create(&self, format: CustomFormat) -> Result<CustomFormat> {
        debug!(target: "repository", format_id = %format.id, name = %format.name, "creating custom format");
        let mut conn = self.pool.acquire().await?;
        insert_custom_format(&mut conn, &format).await?;
        Ok(format)
    }

    async fn update(&self, mut format: CustomFormat) -> Result<Option<CustomFormat>> {
        debug!(target: "repository", format_id = %format.id, "updating custom format");
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT created_at FROM custom_formats WHERE id = ?")
            .bind(format.id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(existing) = existing else {
            return Ok(None);
        };

        format.created_at = parse_dt(existing.try_get("created_at")?)?;
        format.updated_at = Utc::now();
        update_custom_format(&mut tx, &format).await?;

        tx.commit().await?;
        Ok(Some(format))
    }

    async fn get_by_id(&self, id: CustomFormatId) -> Result<Option<CustomFormat>> {
        debug!(target: "repository", %id, "fetching custom format by id");
        let row = sqlx::query("SELECT * FROM custom_formats WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_custom_format).transpose()
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<CustomFormat>> {
        debug!(target: "repository", external_id, "fetching custom format by external id");
        let row = sqlx::query("SELECT * FROM custom_formats WHERE external_id = ? LIMIT 1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_custom_format).transpose()
    }

    async fn list(&self, media_type: Option<MediaType>) -> Result<Vec<CustomFormat>> {
        debug!(target: "repository", ?media_type, "listing custom formats");
        let rows = match media_type {
            Some(media_type) => {
                sqlx::query("SELECT * FROM custom_formats WHERE media_type = ? ORDER BY name")
                    .bind(media_type.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM custom_formats ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_custom_format).collect()
    }

    async fn delete(&self, id: CustomFormatId) -> Result<bool> {
        debug!(target: "repository", %id, "deleting custom format");
        let result = sqlx::query("DELETE FROM custom_formats WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_by_external_id(
        &self,
        mut format: CustomFormat,
    ) -> Result<(CustomFormat, UpsertOutcome)> {
        let external_id = format
            .external_id
            .clone()
            .ok_or_else(|| anyhow!("custom format '{}' has no external id", format.name))?;

        let mut tx = self.pool.begin().await?;
        let stored = sqlx::query("SELECT * FROM custom_formats WHERE external_id = ? LIMIT 1")
            .bind(&external_id)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(row_to_custom_format)
            .transpose()?;

        let now = Utc::now();
        format.last_synced_at = Some(now);

        let outcome = match stored {
            None => {
                format.created_at = now;
                format.updated_at = now;
                insert_custom_format(&mut tx, &format).await?;
                UpsertOutcome::Inserted
            }
            Some(stored) => {
                format.id = stored.id;
                format.created_at = stored.created_at;
                let outcome = if stored.same_definition(&format) {
                    format.updated_at = stored.updated_at;
                    UpsertOutcome::Unchanged
                } else {
                    format.updated_at = now;
                    UpsertOutcome::Updated
                };
                update_custom_format(&mut tx, &format).await?;
                outcome
            }
        };

        tx.commit().await?;
        debug!(target: "repository", external_id, ?outcome, "upserted custom format");
        Ok((format, outcome))
    }
}

async fn insert_custom_format(conn: &mut SqliteConnection, format: &CustomFormat) -> Result<()> {
    let q = r#"
        INSERT INTO custom_formats (
            id, name, include_when_renaming, conditions, media_type, external_id,
            category, recommended_score, last_synced_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#;
    sqlx::query(q)
        .bind(format.id.to_string())
        .bind(&format.name)
        .bind(format.include_when_renaming)
        .bind(serde_json::to_string(&format.conditions)?)
        .bind(format.media_type.map(|m| m.as_str()))
        .bind(format.external_id.as_deref())
        .bind(format.category.map(|c| c.as_str()))
        .bind(format.recommended_score)
        .bind(format.last_synced_at.map(|t| t.to_rfc3339()))
        .bind(format.created_at.to_rfc3339())
        .bind(format.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(|e| conflict_or(e, "custom format", &format.name))?;
    Ok(())
}

async fn update_custom_format(conn: &mut SqliteConnection, format: &CustomFormat) -> Result<()> {
    let q = r#"
        UPDATE custom_formats SET
            name = ?,
            include_when_renaming = ?,
            conditions = ?,
            media_type = ?,
            external_id = ?,
            category = ?,
            recommended_score = ?,
            last_synced_at = ?,
            updated_at = ?
        WHERE id = ?
    "#;
    sqlx::query(q)
        .bind(&format.name)
        .bind(format.include_when_renaming)
        .bind(serde_json::to_string(&format.conditions)?)
        .bind(format.media_type.map(|m| m.as_str()))
        .bind(format.external_id.as_deref())
        .bind(format.category.map(|c| c.as_str()))
        .bind(format.recommended_score)
        .bind(format.last_synced_at.map(|t| t.to_rfc3339()))
        .bind(format.updated_at.to_rfc3339())
        .bind(format.id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| conflict_or(e, "custom format", &format.name))?;
    Ok(())
}

fn row_to_custom_format(row: &SqliteRow) -> Result<CustomFormat> {
    let id_str: String = row.try_get("id")?;
    let conditions: String = row.try_get("conditions")?;
    let media_type: Option<String> = row.try_get("media_type")?;
    let category: Option<String> = row.try_get("category")?;
    let last_synced_at: Option<String> = row.try_get("last_synced_at")?;

    let media_type = media_type
        .map(|value| value.parse::<MediaType>().map_err(|e| anyhow!(e)))
        .transpose()?;
    let category = category
        .map(|value| {
            FormatCategory::parse(&value).ok_or_else(|| anyhow!("unknown format category: {}", value))
        })
        .transpose()?;

    Ok(CustomFormat {
        id: CustomFormatId::from_uuid(Uuid::parse_str(&id_str)?),
        name: row.try_get("name")?,
        include_when_renaming: row.try_get("include_when_renaming")?,
        conditions: serde_json::from_str(&conditions)?,
        media_type,
        external_id: row.try_get("external_id")?,
        category,
        recommended_score: row.try_get("recommended_score")?,
        last_synced_at: last_synced_at.map(parse_dt).transpose()?,
        created_at: parse_dt(row.try_get("created_at")?)?,
        updated_at: parse_dt(row.try_get("updated_at")?)?,
    })
}

// ============================================================================

/// SQLx-backed per-profile custom format scores
pub struct SqliteCustomFormatScoreRepository {
    pool: SqlitePool,
}

impl SqliteCustomFormatScoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CustomFormatScoreRepository for SqliteCustomFormatScoreRepository {
    async fn scores_for_profile(
        &self,
        profile_id: ProfileId,
    ) -> Result<HashMap<CustomFormatId, i32>> {
        debug!(target: "repository", %profile_id, "fetching profile scores");
        let rows = sqlx::query(SCORES_FOR_PROFILE)
            .bind(profile_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows_to_scores(&rows)
    }

    async fn replace_scores(
        &self,
        profile_id: ProfileId,
        scores: &[(CustomFormatId, i32)],
    ) -> Result<()> {
        debug!(target: "repository", %profile_id, count = scores.len(), "replacing profile scores");
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM custom_format_scores WHERE profile_id = ?")
            .bind(profile_id.to_string())
            .execute(&mut *tx)
            .await?;
        for (format_id, score) in scores {
            upsert_score(&mut tx, profile_id, *format_id, *score).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_scores(
        &self,
        profile_id: ProfileId,
        scores: &[(CustomFormatId, i32)],
    ) -> Result<()> {
        debug!(target: "repository", %profile_id, count = scores.len(), "upserting profile scores");
        let mut tx = self.pool.begin().await?;
        for (format_id, score) in scores {
            upsert_score(&mut tx, profile_id, *format_id, *score).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, profile_id: ProfileId, format_id: CustomFormatId) -> Result<bool> {
        debug!(target: "repository", %profile_id, %format_id, "removing profile score");
        let result =
            sqlx::query("DELETE FROM custom_format_scores WHERE profile_id = ? AND format_id = ?")
                .bind(profile_id.to_string())
                .bind(format_id.to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn upsert_score(
    conn: &mut SqliteConnection,
    profile_id: ProfileId,
    format_id: CustomFormatId,
    score: i32,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO custom_format_scores (profile_id, format_id, score) VALUES (?, ?, ?)
        ON CONFLICT (profile_id, format_id) DO UPDATE SET score = excluded.score
        "#,
    )
    .bind(profile_id.to_string())
    .bind(format_id.to_string())
    .bind(score)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

const SCORES_FOR_PROFILE: &str =
    "SELECT format_id, score FROM custom_format_scores WHERE profile_id = ?";

fn rows_to_scores(rows: &[SqliteRow]) -> Result<HashMap<CustomFormatId, i32>> {
    let mut scores = HashMap::with_capacity(rows.len());
    for row in rows {
        let format_id: String = row.try_get("format_id")?;
        let score: i32 = row.try_get("score")?;
        scores.insert(CustomFormatId::from_uuid(Uuid::parse_str(&format_id)?), score);
    }
    Ok(scores)
}

// ============================================================================

/// Reads evaluation snapshots inside one SQLite transaction.
pub struct SqliteEvaluationSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteEvaluationSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EvaluationSnapshotRepository for SqliteEvaluationSnapshotRepository {
    async fn read_snapshot(&self, profile_id: ProfileId) -> Result<StoredSnapshot> {
        debug!(target: "repository", %profile_id, "reading evaluation snapshot");
        let mut tx = self.pool.begin().await?;

        let definitions = sqlx::query("SELECT * FROM quality_definitions ORDER BY weight")
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(row_to_quality_definition)
            .collect::<Result<Vec<_>>>()?;
        let profile = sqlx::query("SELECT * FROM quality_profiles WHERE id = ? LIMIT 1")
            .bind(profile_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(row_to_quality_profile)
            .transpose()?;
        let formats = sqlx::query("SELECT * FROM custom_formats ORDER BY name")
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(row_to_custom_format)
            .collect::<Result<Vec<_>>>()?;
        let score_rows = sqlx::query(SCORES_FOR_PROFILE)
            .bind(profile_id.to_string())
            .fetch_all(&mut *tx)
            .await?;
        let scores = rows_to_scores(&score_rows)?;

        tx.commit().await?;
        Ok(StoredSnapshot {
            definitions,
            profile,
            formats,
            scores,
        })
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn conflict_or(err: sqlx::Error, entity: &'static str, name: &str) -> anyhow::Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::NameConflict {
            entity,
            name: name.to_string(),
        }
        .into(),
        _ => err.into(),
    }
}

fn parse_dt(s: String) -> Result<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Fallback to SQLite default CURRENT_TIMESTAMP format: "YYYY-MM-DD HH:MM:SS"
    let ndt = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use curatarr_domain::{
        default_quality_definitions, Condition, ConditionType, QualityProfileItem,
    };
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");

        sqlx::migrate!("../../migrations").run(&pool).await.expect("migrate");
        pool
    }

    fn hd_profile(name: &str) -> QualityProfile {
        let mut profile = QualityProfile::new(
            name,
            vec![
                QualityProfileItem::enabled(QualityId(11)),
                QualityProfileItem::enabled(QualityId(17)),
                QualityProfileItem::enabled(QualityId(18)),
            ],
        );
        profile.cutoff_quality_id = Some(QualityId(17));
        profile.upgrade_allowed = true;
        profile
    }

    fn x265_format() -> CustomFormat {
        CustomFormat::new(
            "x265",
            vec![Condition::new(ConditionType::ReleaseName, r"[xh]\.?265").required()],
        )
    }

    #[tokio::test]
    async fn seeding_is_insert_if_missing() {
        let pool = setup_pool().await;
        let repo = SqliteQualityDefinitionRepository::new(pool);
        let defaults = default_quality_definitions();

        assert_eq!(repo.seed_defaults(&defaults).await.unwrap(), 24);

        let mut edited = repo.get(QualityId(17)).await.unwrap().expect("seeded tier");
        edited.max_size = 42.0;
        edited.preferred_size = None;
        assert!(repo.update_size_bounds(&edited).await.unwrap());

        assert_eq!(repo.seed_defaults(&defaults).await.unwrap(), 0);
        let kept = repo.get(QualityId(17)).await.unwrap().unwrap();
        assert_eq!(kept.max_size, 42.0);
        assert_eq!(kept.source, Source::WebDl);
        assert_eq!(kept.resolution, Resolution::R1080p);

        let listed = repo.list().await.unwrap();
        assert_eq!(listed.len(), 24);
        assert!(listed.windows(2).all(|pair| pair[0].weight < pair[1].weight));
    }

    #[tokio::test]
    async fn size_update_of_unknown_tier_reports_missing() {
        let pool = setup_pool().await;
        let repo = SqliteQualityDefinitionRepository::new(pool);
        assert!(!repo
            .update_size_bounds(&QualityDefinition::unknown())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn profile_round_trip_and_update() {
        let pool = setup_pool().await;
        let repo = SqliteQualityProfileRepository::new(pool);

        let profile = repo.create(hd_profile("HD")).await.expect("create profile");
        let fetched = repo
            .get_by_id(profile.id)
            .await
            .unwrap()
            .expect("profile exists");
        assert_eq!(fetched.items, profile.items);
        assert_eq!(fetched.cutoff_quality_id, Some(QualityId(17)));
        assert!(fetched.upgrade_allowed);

        let mut changed = fetched.clone();
        changed.items.reverse();
        changed.cutoff_quality_id = None;
        let updated = repo.update(changed).await.unwrap().expect("updated");
        assert_eq!(updated.created_at, fetched.created_at);

        let by_name = repo.get_by_name("HD").await.unwrap().unwrap();
        assert_eq!(by_name.items[0].quality_id, QualityId(18));
        assert_eq!(by_name.cutoff_quality_id, None);

        let missing = repo.update(hd_profile("Ghost")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn duplicate_profile_name_is_a_conflict() {
        let pool = setup_pool().await;
        let repo = SqliteQualityProfileRepository::new(pool);
        repo.create(hd_profile("HD")).await.unwrap();

        let err = repo.create(hd_profile("HD")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RepositoryError>(),
            Some(RepositoryError::NameConflict { .. })
        ));
    }

    #[tokio::test]
    async fn format_names_are_unique_per_media_type() {
        let pool = setup_pool().await;
        let repo = SqliteCustomFormatRepository::new(pool);

        repo.create(x265_format()).await.unwrap();
        let mut tv = x265_format();
        tv.media_type = Some(MediaType::Tv);
        repo.create(tv).await.expect("scoped name may repeat");

        let err = repo.create(x265_format()).await.unwrap_err();
        assert!(err.downcast_ref::<RepositoryError>().is_some());

        let mut tv_again = x265_format();
        tv_again.media_type = Some(MediaType::Tv);
        assert!(repo.create(tv_again).await.is_err());

        assert_eq!(repo.list(None).await.unwrap().len(), 2);
        assert_eq!(repo.list(Some(MediaType::Tv)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn format_round_trip_keeps_conditions() {
        let pool = setup_pool().await;
        let repo = SqliteCustomFormatRepository::new(pool);
        let mut format = x265_format();
        format.conditions.push(Condition::new(ConditionType::Size, "<=30").negated());
        format.category = Some(FormatCategory::Other);

        let created = repo.create(format).await.unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert!(fetched.same_definition(&created));
        assert_eq!(fetched.conditions[1].condition_type, ConditionType::Size);
        assert!(fetched.conditions[1].negate);

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_by_external_id_is_idempotent() {
        let pool = setup_pool().await;
        let repo = SqliteCustomFormatRepository::new(pool);
        let mut format = x265_format();
        format.media_type = Some(MediaType::Tv);
        format.external_id = Some("tv:abc".to_string());

        let (first, outcome) = repo.upsert_by_external_id(format.clone()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut again = format.clone();
        again.id = CustomFormatId::new();
        let (second, outcome) = repo.upsert_by_external_id(again).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(second.id, first.id);
        assert!(second.last_synced_at > first.last_synced_at);

        let mut changed = format;
        changed.recommended_score = Some(100);
        let (_, outcome) = repo.upsert_by_external_id(changed).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        assert_eq!(repo.list(None).await.unwrap().len(), 1);
        let stored = repo.get_by_external_id("tv:abc").await.unwrap().unwrap();
        assert_eq!(stored.recommended_score, Some(100));
    }

    #[tokio::test]
    async fn scores_replace_upsert_and_cascade() {
        let pool = setup_pool().await;
        let profiles = SqliteQualityProfileRepository::new(pool.clone());
        let formats = SqliteCustomFormatRepository::new(pool.clone());
        let scores = SqliteCustomFormatScoreRepository::new(pool);

        let profile = profiles.create(hd_profile("HD")).await.unwrap();
        let a = formats.create(x265_format()).await.unwrap();
        let b = formats
            .create(CustomFormat::new(
                "HDR",
                vec![Condition::new(ConditionType::ReleaseName, r"\bHDR\b")],
            ))
            .await
            .unwrap();

        scores
            .replace_scores(profile.id, &[(a.id, 50), (b.id, 10)])
            .await
            .unwrap();
        scores.replace_scores(profile.id, &[(a.id, 75)]).await.unwrap();
        let current = scores.scores_for_profile(profile.id).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[&a.id], 75);

        scores.upsert_scores(profile.id, &[(b.id, -5)]).await.unwrap();
        let current = scores.scores_for_profile(profile.id).await.unwrap();
        assert_eq!(current.len(), 2);
        assert_eq!(current[&b.id], -5);

        formats.delete(a.id).await.unwrap();
        let current = scores.scores_for_profile(profile.id).await.unwrap();
        assert!(!current.contains_key(&a.id));

        assert!(scores.remove(profile.id, b.id).await.unwrap());
        assert!(scores.scores_for_profile(profile.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_reads_every_table_for_the_profile() {
        let pool = setup_pool().await;
        let definitions = SqliteQualityDefinitionRepository::new(pool.clone());
        let profiles = SqliteQualityProfileRepository::new(pool.clone());
        let formats = SqliteCustomFormatRepository::new(pool.clone());
        let scores = SqliteCustomFormatScoreRepository::new(pool.clone());
        let snapshots = SqliteEvaluationSnapshotRepository::new(pool);

        definitions
            .seed_defaults(&default_quality_definitions())
            .await
            .unwrap();
        let profile = profiles.create(hd_profile("HD")).await.unwrap();
        let other = profiles.create(hd_profile("Other")).await.unwrap();
        let format = formats.create(x265_format()).await.unwrap();
        scores.replace_scores(profile.id, &[(format.id, 50)]).await.unwrap();
        scores.replace_scores(other.id, &[(format.id, -5)]).await.unwrap();

        let snapshot = snapshots.read_snapshot(profile.id).await.unwrap();
        assert_eq!(snapshot.definitions.len(), default_quality_definitions().len());
        assert!(snapshot
            .definitions
            .windows(2)
            .all(|pair| pair[0].weight <= pair[1].weight));
        assert_eq!(snapshot.profile.map(|p| p.id), Some(profile.id));
        assert_eq!(snapshot.formats.len(), 1);
        assert_eq!(snapshot.scores, HashMap::from([(format.id, 50)]));

        scores.replace_scores(profile.id, &[]).await.unwrap();
        let after = snapshots.read_snapshot(profile.id).await.unwrap();
        assert!(after.scores.is_empty());

        let missing = snapshots.read_snapshot(ProfileId::new()).await.unwrap();
        assert!(missing.profile.is_none());
        assert!(missing.scores.is_empty());
        assert_eq!(missing.formats.len(), 1);
    }
}
