// SPDX-License-Identifier: GPL-3.0-or-later

//! Store-backed entry points for release evaluation.
//!
//! Each call reads an [`EvaluationSnapshot`] in one store transaction and hands it to the pure
//! [`DecisionEngine`]. A profile id that no longer resolves evaluates against an empty profile,
//! so every quality is unwanted rather than the call failing.

use crate::custom_formats::{CustomFormatMatcher, FormatMatch};
use crate::decision::{Decision, DecisionEngine, EvaluationSnapshot};
use crate::quality_catalog::QualityCatalog;
use crate::scoring::ScoreBreakdown;
use anyhow::Result;
use curatarr_domain::{
    CustomFormat, CustomFormatId, ExistingFile, ProfileId, QualityProfile, ReleaseCandidate,
};
use curatarr_infrastructure::repositories::{
    CustomFormatRepository, EvaluationSnapshotRepository, StoredSnapshot,
};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ReleaseEvaluationService {
    snapshots: Arc<dyn EvaluationSnapshotRepository>,
    formats: Arc<dyn CustomFormatRepository>,
    engine: DecisionEngine,
}

impl ReleaseEvaluationService {
    pub fn new(
        snapshots: Arc<dyn EvaluationSnapshotRepository>,
        formats: Arc<dyn CustomFormatRepository>,
        engine: DecisionEngine,
    ) -> Self {
        Self {
            snapshots,
            formats,
            engine,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    fn matcher(&self) -> &CustomFormatMatcher {
        self.engine.calculator().matcher()
    }

    pub async fn evaluate(
        &self,
        candidate: &ReleaseCandidate,
        profile_id: ProfileId,
        existing: Option<&ExistingFile>,
    ) -> Result<Decision> {
        let snapshot = self.load_snapshot(profile_id, None).await?;
        Ok(self.engine.evaluate(&snapshot, candidate, existing))
    }

    /// Pick the release to download out of `candidates`, if any is acceptable.
    pub async fn best_candidate(
        &self,
        candidates: &[ReleaseCandidate],
        profile_id: ProfileId,
        existing: Option<&ExistingFile>,
    ) -> Result<Option<(usize, Decision)>> {
        let snapshot = self.load_snapshot(profile_id, None).await?;
        Ok(self
            .engine
            .best_candidate(&snapshot, candidates, existing)
            .and_then(|(chosen, decision)| {
                candidates
                    .iter()
                    .position(|candidate| std::ptr::eq(candidate, chosen))
                    .map(|index| (index, decision))
            }))
    }

    /// Matched formats with their condition traces. `format_ids` narrows the stored set.
    pub async fn test_formats(
        &self,
        candidate: &ReleaseCandidate,
        format_ids: Option<&[CustomFormatId]>,
    ) -> Result<Vec<FormatMatch>> {
        let formats = self.load_formats(format_ids).await?;
        Ok(self.matcher().test_formats(candidate, &formats))
    }

    pub async fn compute_score(
        &self,
        candidate: &ReleaseCandidate,
        profile_id: ProfileId,
        format_ids: Option<&[CustomFormatId]>,
    ) -> Result<ScoreBreakdown> {
        let snapshot = self.load_snapshot(profile_id, format_ids).await?;
        Ok(self
            .engine
            .calculator()
            .score(candidate, &snapshot.formats, &snapshot.scores))
    }

    /// Resolve everything one evaluation needs against `profile_id`.
    pub async fn load_snapshot(
        &self,
        profile_id: ProfileId,
        format_ids: Option<&[CustomFormatId]>,
    ) -> Result<EvaluationSnapshot> {
        let StoredSnapshot {
            definitions,
            profile,
            mut formats,
            scores,
        } = self.snapshots.read_snapshot(profile_id).await?;

        let profile = profile.unwrap_or_else(|| {
            warn!(target: "decision", %profile_id, "unknown quality profile, nothing is wanted");
            QualityProfile::empty(profile_id)
        });
        if let Some(ids) = format_ids {
            formats.retain(|format| ids.contains(&format.id));
        }

        debug!(
            target: "decision",
            %profile_id,
            formats = formats.len(),
            scored = scores.len(),
            "loaded evaluation snapshot"
        );
        Ok(EvaluationSnapshot {
            catalog: QualityCatalog::new(definitions),
            profile,
            formats,
            scores,
        })
    }

    async fn load_formats(
        &self,
        format_ids: Option<&[CustomFormatId]>,
    ) -> Result<Vec<CustomFormat>> {
        let mut formats = self.formats.list(None).await?;
        if let Some(ids) = format_ids {
            formats.retain(|format| ids.contains(&format.id));
        }
        Ok(formats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{DecisionAction, DecisionReason};
    use curatarr_domain::{
        default_quality_definitions, Condition, ConditionType, QualityId, QualityProfileItem,
        Resolution, Source,
    };
    use curatarr_infrastructure::repositories::{
        CustomFormatScoreRepository, QualityDefinitionRepository, QualityProfileRepository,
    };
    use curatarr_infrastructure::sqlite_adapters::{
        SqliteCustomFormatRepository, SqliteCustomFormatScoreRepository,
        SqliteEvaluationSnapshotRepository, SqliteQualityDefinitionRepository,
        SqliteQualityProfileRepository,
    };
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");
        sqlx::migrate!("../../migrations").run(&pool).await.expect("migrate");
        pool
    }

    struct Fixture {
        service: ReleaseEvaluationService,
        profile_id: ProfileId,
        x265: CustomFormatId,
        br_disk: CustomFormatId,
    }

    async fn fixture() -> Fixture {
        let pool = setup_pool().await;
        let definitions = Arc::new(SqliteQualityDefinitionRepository::new(pool.clone()));
        let profiles = Arc::new(SqliteQualityProfileRepository::new(pool.clone()));
        let formats = Arc::new(SqliteCustomFormatRepository::new(pool.clone()));
        let scores = Arc::new(SqliteCustomFormatScoreRepository::new(pool.clone()));

        definitions
            .seed_defaults(&default_quality_definitions())
            .await
            .unwrap();

        let mut profile = QualityProfile::new(
            "HD",
            vec![
                QualityProfileItem::enabled(QualityId(11)),
                QualityProfileItem::enabled(QualityId(17)),
                QualityProfileItem::enabled(QualityId(18)),
            ],
        );
        profile.upgrade_allowed = true;
        profile.cutoff_quality_id = Some(QualityId(17));
        let profile = profiles.create(profile).await.unwrap();

        let x265 = formats
            .create(CustomFormat::new(
                "x265",
                vec![Condition::new(ConditionType::ReleaseName, r"[xh]\.?265").required()],
            ))
            .await
            .unwrap();
        let br_disk = formats
            .create(CustomFormat::new(
                "BR-DISK",
                vec![Condition::new(ConditionType::ReleaseName, r"\bBR-?DISK\b").required()],
            ))
            .await
            .unwrap();
        scores
            .replace_scores(profile.id, &[(x265.id, 50), (br_disk.id, -10000)])
            .await
            .unwrap();

        Fixture {
            service: ReleaseEvaluationService::new(
                Arc::new(SqliteEvaluationSnapshotRepository::new(pool)),
                formats,
                DecisionEngine::default(),
            ),
            profile_id: profile.id,
            x265: x265.id,
            br_disk: br_disk.id,
        }
    }

    fn webdl(title: &str) -> ReleaseCandidate {
        ReleaseCandidate {
            source: Some(Source::WebDl),
            resolution: Some(Resolution::R1080p),
            ..ReleaseCandidate::new(title)
        }
    }

    #[tokio::test]
    async fn evaluates_against_stored_profile_and_scores() {
        let f = fixture().await;
        let decision = f
            .service
            .evaluate(&webdl("Show.S01E01.1080p.WEB-DL.x265-GRP"), f.profile_id, None)
            .await
            .unwrap();

        assert_eq!(decision.action, DecisionAction::Grab);
        assert_eq!(decision.score.total, 50);
        assert_eq!(decision.quality.id, QualityId(17));
    }

    #[tokio::test]
    async fn unknown_profile_wants_nothing() {
        let f = fixture().await;
        let decision = f
            .service
            .evaluate(&webdl("Show.S01E01.1080p.WEB-DL-GRP"), ProfileId::new(), None)
            .await
            .unwrap();

        assert_eq!(decision.action, DecisionAction::Reject);
        assert_eq!(decision.reason, Some(DecisionReason::QualityNotWanted));
    }

    #[tokio::test]
    async fn score_can_be_narrowed_to_selected_formats() {
        let f = fixture().await;
        let candidate = webdl("Movie.2020.1080p.BR-DISK.x265-GRP");

        let all = f
            .service
            .compute_score(&candidate, f.profile_id, None)
            .await
            .unwrap();
        assert_eq!(all.total, 50 - 10000);

        let only_x265 = f
            .service
            .compute_score(&candidate, f.profile_id, Some(&[f.x265]))
            .await
            .unwrap();
        assert_eq!(only_x265.total, 50);
        assert_eq!(only_x265.matched_formats.len(), 1);
    }

    #[tokio::test]
    async fn test_formats_returns_matches_with_traces() {
        let f = fixture().await;
        let matches = f
            .service
            .test_formats(&webdl("Movie.2020.BR-DISK-GRP"), None)
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].format_id, f.br_disk);
        assert_eq!(matches[0].trace.len(), 1);
        assert!(matches[0].trace[0].matched);
    }

    #[tokio::test]
    async fn best_candidate_reports_position() {
        let f = fixture().await;
        let candidates = vec![
            ReleaseCandidate::new("Show.S01E01.CAM-GRP"),
            webdl("Show.S01E01.1080p.WEB-DL.x264-GRP"),
            webdl("Show.S01E01.1080p.WEB-DL.x265-GRP"),
        ];

        let (index, decision) = f
            .service
            .best_candidate(&candidates, f.profile_id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index, 2);
        assert_eq!(decision.score.total, 50);
    }

    #[tokio::test]
    async fn concurrent_evaluations_agree() {
        let f = fixture().await;
        let snapshot = Arc::new(f.service.load_snapshot(f.profile_id, None).await.unwrap());
        let engine = f.service.engine().clone();
        let existing = ExistingFile {
            quality_id: QualityId(11),
            score: 0,
        };

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let snapshot = Arc::clone(&snapshot);
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine.evaluate(
                        &snapshot,
                        &webdl("Show.S01E01.1080p.WEB-DL.x265-GRP"),
                        Some(&existing),
                    )
                })
            })
            .collect();

        let mut decisions = Vec::new();
        for handle in handles {
            decisions.push(handle.await.unwrap());
        }
        assert!(decisions.iter().all(|d| d == &decisions[0]));
        assert_eq!(decisions[0].action, DecisionAction::Upgrade);
    }
}
