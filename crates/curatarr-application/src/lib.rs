// SPDX-License-Identifier: GPL-3.0-or-later
use curatarr_config::AppConfig;
use curatarr_domain::MediaType;
use curatarr_infrastructure::repositories::{
    CustomFormatRepository, CustomFormatScoreRepository, QualityDefinitionRepository,
    QualityProfileRepository,
};
use curatarr_infrastructure::sqlite_adapters::{
    SqliteCustomFormatRepository, SqliteCustomFormatScoreRepository,
    SqliteEvaluationSnapshotRepository, SqliteQualityDefinitionRepository,
    SqliteQualityProfileRepository,
};
use curatarr_trash::TrashClient;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

pub mod custom_formats;
pub mod decision;
pub mod evaluation;
pub mod pattern_cache;
pub mod quality_catalog;
pub mod rule_import;
pub mod scoring;

pub use custom_formats::{
    formats_in_scope, release_group_from_title, ConditionResult, CustomFormatMatcher, FormatMatch,
};
pub use decision::{
    Decision, DecisionAction, DecisionEngine, DecisionPolicy, DecisionReason, EvaluationSnapshot,
};
pub use evaluation::ReleaseEvaluationService;
pub use pattern_cache::PatternCache;
pub use quality_catalog::{QualityCatalog, SizeCheck};
pub use rule_import::{
    ImportError, ImportSummary, RuleCatalogError, RuleCatalogSource, RuleImportService,
};
pub use scoring::{MatchedFormat, ScoreBreakdown, ScoreCalculator};

use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub quality_definitions: Arc<dyn QualityDefinitionRepository>,
    pub quality_profiles: Arc<dyn QualityProfileRepository>,
    pub custom_formats: Arc<dyn CustomFormatRepository>,
    pub format_scores: Arc<dyn CustomFormatScoreRepository>,
    pub evaluation: ReleaseEvaluationService,
    pub importer: Arc<RuleImportService>,
}

impl AppState {
    /// Wire the SQLite repositories and services around `pool`.
    pub fn new(config: AppConfig, pool: SqlitePool, catalog: Arc<dyn RuleCatalogSource>) -> Self {
        let quality_definitions: Arc<dyn QualityDefinitionRepository> =
            Arc::new(SqliteQualityDefinitionRepository::new(pool.clone()));
        let quality_profiles: Arc<dyn QualityProfileRepository> =
            Arc::new(SqliteQualityProfileRepository::new(pool.clone()));
        let custom_formats: Arc<dyn CustomFormatRepository> =
            Arc::new(SqliteCustomFormatRepository::new(pool.clone()));
        let format_scores: Arc<dyn CustomFormatScoreRepository> =
            Arc::new(SqliteCustomFormatScoreRepository::new(pool.clone()));

        let patterns = Arc::new(PatternCache::new(config.decision.pattern_cache_capacity));
        let engine = DecisionEngine::new(
            ScoreCalculator::new(CustomFormatMatcher::new(patterns)),
            DecisionPolicy::from(&config.decision),
        );

        let evaluation = ReleaseEvaluationService::new(
            Arc::new(SqliteEvaluationSnapshotRepository::new(pool)),
            custom_formats.clone(),
            engine,
        );
        let importer = Arc::new(RuleImportService::new(
            catalog,
            custom_formats.clone(),
            format_scores.clone(),
            quality_profiles.clone(),
        ));

        Self {
            config,
            quality_definitions,
            quality_profiles,
            custom_formats,
            format_scores,
            evaluation,
            importer,
        }
    }

    /// Like [`AppState::new`], importing from the configured rule catalog.
    pub fn with_rule_catalog(config: AppConfig, pool: SqlitePool) -> anyhow::Result<Self> {
        let catalog = TrashClient::builder()
            .base_url(config.rule_catalog.base_url.clone())
            .timeout(Duration::from_secs(config.rule_catalog.timeout_secs))
            .rate_limit_interval(Duration::from_millis(config.rule_catalog.rate_limit_ms))
            .build()?;
        Ok(Self::new(config, pool, Arc::new(catalog)))
    }

    /// Media types named in `rule_catalog.media_types`. Unrecognised names are skipped.
    pub fn catalog_media_types(&self) -> Vec<MediaType> {
        self.config
            .rule_catalog
            .media_types
            .iter()
            .filter_map(|name| match name.parse::<MediaType>() {
                Ok(media_type) => Some(media_type),
                Err(error) => {
                    warn!(target: "application", %name, %error, "ignoring configured media type");
                    None
                }
            })
            .collect()
    }

    pub fn on_start(&self) {
        info!(
            target: "application",
            enforce_size_limits = self.config.decision.enforce_size_limits,
            "application state initialized"
        );
    }
}
