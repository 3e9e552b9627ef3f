// SPDX-License-Identifier: GPL-3.0-or-later

//! Import of third-party custom format catalogs.
//!
//! Each upstream definition becomes a local [`CustomFormat`] keyed by
//! `"{media_type}:{upstream id}"`, so re-running an import refreshes records in place.
//! Conversion maps the upstream implementation name onto a [`ConditionType`], turns numeric
//! field values into patterns, then buckets the format by name and assigns a recommended score:
//! the catalog's own suggestion when it carries one, otherwise a per-bucket default.
//!
//! Failures never escape: a failed listing is reported once for its media type and a failed
//! record is reported on its own while the rest of the batch carries on.

use curatarr_domain::{
    Condition, ConditionType, CustomFormat, FormatCategory, MediaType, ProfileId, Resolution,
    Source, Validate,
};
use curatarr_infrastructure::repositories::{
    CustomFormatRepository, CustomFormatScoreRepository, QualityProfileRepository,
};
use curatarr_trash::{CatalogEntry, CustomFormatDefinition, Specification, TrashClient, TrashError};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RuleCatalogError {
    #[error("no rule catalog is published for {0}")]
    Unsupported(MediaType),

    #[error("catalog request failed: {0}")]
    Fetch(#[from] TrashError),
}

/// Where upstream definitions come from.
#[async_trait::async_trait]
pub trait RuleCatalogSource: Send + Sync {
    async fn list_rules(&self, media_type: MediaType) -> Result<Vec<CatalogEntry>, RuleCatalogError>;
    async fn fetch_rule(&self, entry: &CatalogEntry)
        -> Result<CustomFormatDefinition, RuleCatalogError>;
}

#[async_trait::async_trait]
impl RuleCatalogSource for TrashClient {
    async fn list_rules(&self, media_type: MediaType) -> Result<Vec<CatalogEntry>, RuleCatalogError> {
        let app = catalog_app(media_type).ok_or(RuleCatalogError::Unsupported(media_type))?;
        Ok(self.list_custom_formats(app).await?)
    }

    async fn fetch_rule(
        &self,
        entry: &CatalogEntry,
    ) -> Result<CustomFormatDefinition, RuleCatalogError> {
        Ok(self.fetch_custom_format(entry).await?)
    }
}

/// Catalog directory holding the definitions for a media type.
pub fn catalog_app(media_type: MediaType) -> Option<&'static str> {
    match media_type {
        MediaType::Tv | MediaType::Anime => Some("sonarr"),
        MediaType::Movie => Some("radarr"),
        MediaType::Music => None,
    }
}

/// One failure during an import. `record` is `None` when the whole batch failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportError {
    pub media_type: MediaType,
    pub record: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Records written, whether inserted, changed or already current.
    pub imported_count: usize,
    pub errors: Vec<ImportError>,
    pub synced_at: DateTime<Utc>,
}

impl ImportSummary {
    fn started() -> Self {
        Self {
            imported_count: 0,
            errors: Vec::new(),
            synced_at: Utc::now(),
        }
    }

    fn merge(&mut self, other: ImportSummary) {
        self.imported_count += other.imported_count;
        self.errors.extend(other.errors);
    }
}

pub struct RuleImportService {
    source: Arc<dyn RuleCatalogSource>,
    formats: Arc<dyn CustomFormatRepository>,
    scores: Arc<dyn CustomFormatScoreRepository>,
    profiles: Arc<dyn QualityProfileRepository>,
}

impl RuleImportService {
    pub fn new(
        source: Arc<dyn RuleCatalogSource>,
        formats: Arc<dyn CustomFormatRepository>,
        scores: Arc<dyn CustomFormatScoreRepository>,
        profiles: Arc<dyn QualityProfileRepository>,
    ) -> Self {
        Self {
            source,
            formats,
            scores,
            profiles,
        }
    }

    /// Import every media type in turn. A failing batch does not stop the others.
    pub async fn sync(&self, media_types: &[MediaType]) -> ImportSummary {
        let mut summary = ImportSummary::started();
        for media_type in media_types {
            summary.merge(self.import(*media_type).await);
        }
        info!(
            target: "importer",
            imported = summary.imported_count,
            errors = summary.errors.len(),
            "rule catalog sync finished"
        );
        summary
    }

    /// Import the catalog of one media type.
    pub async fn import(&self, media_type: MediaType) -> ImportSummary {
        let mut summary = ImportSummary::started();
        let batch_error = |message: String| ImportError {
            media_type,
            record: None,
            message,
        };

        if catalog_app(media_type).is_none() {
            let error = RuleCatalogError::Unsupported(media_type);
            warn!(target: "importer", %media_type, %error, "skipping import");
            summary.errors.push(batch_error(error.to_string()));
            return summary;
        }

        let entries = match self.source.list_rules(media_type).await {
            Ok(entries) => entries,
            Err(error) => {
                warn!(target: "importer", %media_type, %error, "listing rule catalog failed");
                summary.errors.push(batch_error(error.to_string()));
                return summary;
            }
        };
        debug!(target: "importer", %media_type, count = entries.len(), "importing rule catalog");

        for entry in &entries {
            match self.import_entry(media_type, entry).await {
                Ok(()) => summary.imported_count += 1,
                Err(message) => {
                    warn!(target: "importer", %media_type, record = %entry.name, %message, "rule import failed");
                    summary.errors.push(ImportError {
                        media_type,
                        record: Some(entry.name.clone()),
                        message,
                    });
                }
            }
        }

        info!(
            target: "importer",
            %media_type,
            imported = summary.imported_count,
            errors = summary.errors.len(),
            "rule catalog imported"
        );
        summary
    }

    async fn import_entry(&self, media_type: MediaType, entry: &CatalogEntry) -> Result<(), String> {
        let definition = self
            .source
            .fetch_rule(entry)
            .await
            .map_err(|e| e.to_string())?;
        let format = convert_definition(media_type, &definition)?;
        format.validate().map_err(|errors| {
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        })?;

        let (_, outcome) = self
            .formats
            .upsert_by_external_id(format)
            .await
            .map_err(|e| e.to_string())?;
        debug!(target: "importer", record = %entry.name, ?outcome, "rule stored");
        Ok(())
    }

    /// Copy the recommended score of every imported format onto a profile.
    ///
    /// Returns the number of scores written, or `None` when the profile does not exist.
    pub async fn apply_recommended_scores(
        &self,
        profile_id: ProfileId,
        media_type: Option<MediaType>,
    ) -> anyhow::Result<Option<usize>> {
        if self.profiles.get_by_id(profile_id).await?.is_none() {
            return Ok(None);
        }

        let recommended: Vec<_> = self
            .formats
            .list(media_type)
            .await?
            .into_iter()
            .filter(|format| format.external_id.is_some())
            .filter_map(|format| format.recommended_score.map(|score| (format.id, score)))
            .collect();

        self.scores.upsert_scores(profile_id, &recommended).await?;
        info!(target: "importer", %profile_id, count = recommended.len(), "applied recommended scores");
        Ok(Some(recommended.len()))
    }
}

// ============================================================================
// Conversion
// ============================================================================

/// How an upstream field value turns into a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    SourceId,
    ResolutionId,
    LanguageId,
    IndexerFlagId,
    QualityModifierId,
    SizeRange,
}

fn map_implementation(implementation: &str) -> (ConditionType, ValueKind) {
    use ConditionType as C;
    use ValueKind as V;

    match implementation {
        "ReleaseTitleSpecification" => (C::ReleaseName, V::Text),
        "ReleaseGroupSpecification" => (C::ReleaseGroup, V::Text),
        "EditionSpecification" => (C::Edition, V::Text),
        "SourceSpecification" => (C::Source, V::SourceId),
        "ResolutionSpecification" => (C::Resolution, V::ResolutionId),
        "LanguageSpecification" => (C::Language, V::LanguageId),
        "IndexerFlagSpecification" => (C::IndexerFlag, V::IndexerFlagId),
        "SizeSpecification" => (C::Size, V::SizeRange),
        "QualityModifierSpecification" => (C::ReleaseName, V::QualityModifierId),
        "VideoCodecSpecification" | "CodecSpecification" => (C::Codec, V::Text),
        "AudioCodecSpecification" => (C::AudioCodec, V::Text),
        "AudioChannelsSpecification" => (C::AudioChannels, V::Text),
        _ => (C::ReleaseName, V::Text),
    }
}

/// Build the local format for an upstream definition. Validation is left to the caller.
pub fn convert_definition(
    media_type: MediaType,
    definition: &CustomFormatDefinition,
) -> Result<CustomFormat, String> {
    let conditions = definition
        .specifications
        .iter()
        .map(|spec| convert_specification(media_type, spec))
        .collect::<Result<Vec<_>, _>>()?;

    let category = categorize(&definition.name);
    let mut format = CustomFormat::new(definition.name.clone(), conditions);
    format.include_when_renaming = definition.include_custom_format_when_renaming;
    format.media_type = Some(media_type);
    format.external_id = Some(format!("{}:{}", media_type, definition.trash_id));
    format.category = Some(category);
    format.recommended_score = Some(
        catalog_score(media_type, definition)
            .unwrap_or_else(|| recommended_score(category, &definition.name)),
    );
    Ok(format)
}

/// Score the catalog suggests for `media_type`: the anime scoring set for anime, then `default`.
fn catalog_score(media_type: MediaType, definition: &CustomFormatDefinition) -> Option<i32> {
    let scoring_set = match media_type {
        MediaType::Anime => Some("anime-sonarr"),
        _ => None,
    };
    scoring_set
        .and_then(|set| definition.trash_scores.get(set))
        .or_else(|| definition.trash_scores.get("default"))
        .copied()
}

fn convert_specification(media_type: MediaType, spec: &Specification) -> Result<Condition, String> {
    let (condition_type, kind) = map_implementation(&spec.implementation);
    let pattern = match kind {
        ValueKind::SizeRange => size_pattern(spec)?,
        _ => {
            let value = spec
                .value()
                .ok_or_else(|| format!("specification '{}' has no value", spec.name))?;
            value_pattern(media_type, kind, value)
                .map_err(|message| format!("specification '{}': {message}", spec.name))?
        }
    };

    Ok(Condition {
        condition_type,
        pattern,
        negate: spec.negate,
        required: spec.required,
    })
}

fn value_pattern(media_type: MediaType, kind: ValueKind, value: &Value) -> Result<String, String> {
    if let Value::String(text) = value {
        return Ok(text.clone());
    }
    let id = value
        .as_i64()
        .ok_or_else(|| format!("unsupported value {value}"))?;

    let pattern = match kind {
        ValueKind::Text | ValueKind::SizeRange => return Ok(id.to_string()),
        ValueKind::SourceId => source_from_id(media_type, id).map(source_pattern),
        ValueKind::ResolutionId => match Resolution::parse(&id.to_string()) {
            Resolution::Unknown => None,
            resolution => Some(format!(r"\b{}\b", resolution.as_str())),
        },
        ValueKind::LanguageId if id == ORIGINAL_LANGUAGE_ID => Some(r"\boriginal\b".to_string()),
        ValueKind::LanguageId => language_name(id).map(|name| format!(r"\b{name}\b")),
        ValueKind::IndexerFlagId => indexer_flag_name(id).map(|name| format!(r"\b{name}\b")),
        ValueKind::QualityModifierId => quality_modifier_pattern(id).map(str::to_string),
    };
    pattern.ok_or_else(|| format!("unknown id {id}"))
}

fn size_pattern(spec: &Specification) -> Result<String, String> {
    let min = spec.field("min").and_then(Value::as_f64);
    let max = spec.field("max").and_then(Value::as_f64);
    match (min, max) {
        (Some(min), Some(max)) => Ok(format!("{min}-{max}")),
        (Some(min), None) => Ok(format!(">={min}")),
        (None, Some(max)) => Ok(format!("<={max}")),
        (None, None) => Err(format!("specification '{}' has no size bounds", spec.name)),
    }
}

/// Source ids differ between the series and movie catalogs.
fn source_from_id(media_type: MediaType, id: i64) -> Option<Source> {
    let source = match (media_type, id) {
        (MediaType::Movie, 1) => Source::Cam,
        (MediaType::Movie, 2) => Source::Telesync,
        (MediaType::Movie, 3) => Source::Telecine,
        (MediaType::Movie, 4) => Source::Workprint,
        (MediaType::Movie, 5) => Source::Dvd,
        (MediaType::Movie, 6) => Source::Tv,
        (MediaType::Movie, 7) => Source::WebDl,
        (MediaType::Movie, 8) => Source::WebRip,
        (MediaType::Movie, 9) => Source::Bluray,
        (MediaType::Movie, _) => return None,
        (_, 1) | (_, 2) => Source::Tv,
        (_, 3) => Source::WebDl,
        (_, 4) => Source::WebRip,
        (_, 5) => Source::Dvd,
        (_, 6) => Source::Bluray,
        (_, 7) => Source::Remux,
        _ => return None,
    };
    Some(source)
}

/// Matches both the normalized source name and its usual spellings in release titles.
fn source_pattern(source: Source) -> String {
    let pattern = match source {
        Source::Unknown => r"^unknown$",
        Source::Cam => r"\b(?:cam|hdcam)\b",
        Source::Telesync => r"\b(?:telesync|ts|hdts)\b",
        Source::Telecine => r"\b(?:telecine|tc)\b",
        Source::Workprint => r"\b(?:workprint|wp)\b",
        Source::Dvd => r"\b(?:dvd|dvdrip)\b",
        Source::Tv => r"\b(?:tv|hdtv|sdtv|pdtv)\b",
        Source::WebDl => r"\b(?:webdl|web[-_. ]dl|web)\b",
        Source::WebRip => r"\b(?:webrip|web[-_. ]rip)\b",
        Source::Bluray => r"\b(?:bluray|blu[-_. ]ray|bdrip|brrip)\b",
        Source::Remux => r"\bremux\b",
    };
    pattern.to_string()
}

/// Catalog id for "the item's original language". Such releases carry the language `original`.
const ORIGINAL_LANGUAGE_ID: i64 = -2;

fn language_name(id: i64) -> Option<&'static str> {
    const LANGUAGES: [&str; 25] = [
        "english", "french", "spanish", "german", "italian", "danish", "dutch", "japanese",
        "icelandic", "chinese", "russian", "polish", "vietnamese", "swedish", "norwegian",
        "finnish", "turkish", "portuguese", "flemish", "greek", "korean", "hungarian", "hebrew",
        "lithuanian", "czech",
    ];
    usize::try_from(id)
        .ok()
        .and_then(|id| id.checked_sub(1))
        .and_then(|index| LANGUAGES.get(index).copied())
}

fn indexer_flag_name(id: i64) -> Option<&'static str> {
    let name = match id {
        1 => "freeleech",
        2 => "halfleech",
        4 => "doubleupload",
        8 => "golden",
        16 => "approved",
        32 | 64 => "internal",
        128 => "scene",
        256 => "freeleech75",
        512 => "freeleech25",
        1024 => "nuked",
        _ => return None,
    };
    Some(name)
}

fn quality_modifier_pattern(id: i64) -> Option<&'static str> {
    let pattern = match id {
        1 => r"\bregional\b",
        2 => r"\bscr(?:eener)?\b",
        3 => r"\braw[-_. ]?hd\b",
        4 => r"\bbr[-_. ]?disk\b",
        5 => r"\bremux\b",
        _ => return None,
    };
    Some(pattern)
}

// ============================================================================
// Categories & recommended scores
// ============================================================================

lazy_static! {
    static ref CATEGORY_RULES: Vec<(FormatCategory, Regex)> = [
        (
            FormatCategory::Unwanted,
            r"(?i)\b(?:br-?disk|lq|3d|extras|obfuscated|retags|upscaled|no-rlsgroup|bad dual groups|sing-along)\b|^x265 \(hd\)$|^av1$|^scene$|\(webdl\)$|^evo \(no webdl\)$",
        ),
        (
            FormatCategory::HdrFormats,
            r"(?i)\b(?:hdr|hdr10\+?|dv|dolby ?vision|hlg|pq)\b",
        ),
        (
            FormatCategory::Audio,
            r"(?i)\b(?:truehd|atmos|dts(?:-hd|-x|-es)?(?: ma| hra)?|dts x|dd\+?|ddplus|flac|pcm|aac|opus|mp3|[1-7]\.[01](?: surround)?|mono|stereo)\b",
        ),
        (FormatCategory::RemuxTiers, r"(?i)^remux tier\s*\d+"),
        (FormatCategory::UhdBlurayTiers, r"(?i)^uhd bluray tier\s*\d+"),
        (FormatCategory::HdBlurayTiers, r"(?i)^hd bluray tier\s*\d+"),
        (FormatCategory::WebTiers, r"(?i)^web tier\s*\d+"),
        (FormatCategory::AnimeTiers, r"(?i)^anime (?:bd|web) tier\s*\d+"),
        (
            FormatCategory::StreamingServices,
            r"(?i)^(?:amzn|atvp|dsnp|hmax|max|hulu|nf|pcok|pmtp|it|ma|crav|stan|roku|sho|bcore|crit|cr|funi|vrv|hidive|abema|adn|b-global|all4|my5|now|ip|red|play|hbo|aubc|cbc|dscp|vdl|wkn)$",
        ),
        (FormatCategory::ReleaseGroups, r"(?i)\bgroups?\b"),
    ]
    .into_iter()
    .map(|(category, pattern)| (category, Regex::new(pattern).expect("valid category regex")))
    .collect();
    static ref TIER_NUMBER: Regex =
        Regex::new(r"(?i)\btier\s*0*(?P<n>\d+)").expect("valid tier regex");
}

/// Bucket a format by its name. The first matching bucket wins; anything else is `Other`.
pub fn categorize(name: &str) -> FormatCategory {
    let name = name.trim();
    CATEGORY_RULES
        .iter()
        .find(|(_, rule)| rule.is_match(name))
        .map(|(category, _)| *category)
        .unwrap_or(FormatCategory::Other)
}

/// Suggested profile score for a format of the given bucket and name.
pub fn recommended_score(category: FormatCategory, name: &str) -> i32 {
    let lower = name.to_lowercase();
    match category {
        FormatCategory::Unwanted => -10000,
        FormatCategory::RemuxTiers => tier_score(1950, &lower),
        FormatCategory::UhdBlurayTiers | FormatCategory::HdBlurayTiers => tier_score(1800, &lower),
        FormatCategory::WebTiers => tier_score(1700, &lower),
        FormatCategory::AnimeTiers => tier_score(1400, &lower),
        FormatCategory::HdrFormats => {
            if lower.contains("dolby vision") || lower.split_whitespace().any(|w| w == "dv") {
                1500
            } else if lower.contains("hdr10+") {
                600
            } else {
                500
            }
        }
        FormatCategory::Audio => audio_score(&lower),
        FormatCategory::StreamingServices => 75,
        FormatCategory::ReleaseGroups => 50,
        FormatCategory::Other => 0,
    }
}

/// Tier 1 scores `base`; every further tier is 50 lower.
fn tier_score(base: i32, name: &str) -> i32 {
    let tier = TIER_NUMBER
        .captures(name)
        .and_then(|captures| captures.name("n"))
        .and_then(|n| n.as_str().parse::<i32>().ok())
        .unwrap_or(1)
        .max(1);
    base - 50 * (tier - 1)
}

fn audio_score(name: &str) -> i32 {
    const AUDIO_SCORES: [(&str, i32); 17] = [
        ("truehd atmos", 250),
        ("dts x", 245),
        ("dts-x", 245),
        ("dd+ atmos", 180),
        ("atmos", 240),
        ("truehd", 230),
        ("dts-hd ma", 220),
        ("flac", 210),
        ("pcm", 200),
        ("dts-hd hra", 190),
        ("dd+", 170),
        ("dts-es", 160),
        ("dts", 150),
        ("opus", 110),
        ("aac", 100),
        ("dd", 90),
        ("mp3", 50),
    ];
    AUDIO_SCORES
        .iter()
        .find(|(needle, _)| name.contains(needle))
        .map(|(_, score)| *score)
        .unwrap_or(25)
}

#[cfg(test)]
mod tests {
    use super::*;
    use curatarr_infrastructure::sqlite_adapters::{
        SqliteCustomFormatRepository, SqliteCustomFormatScoreRepository,
        SqliteEvaluationSnapshotRepository, SqliteQualityProfileRepository,
    };
    use crate::custom_formats::CustomFormatMatcher;
    use crate::decision::DecisionEngine;
    use crate::evaluation::ReleaseEvaluationService;
    use curatarr_domain::{QualityId, QualityProfile, QualityProfileItem, ReleaseCandidate};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory catalog keyed by media type. A missing media type fails its listing.
    #[derive(Default)]
    struct FakeCatalog {
        batches: Mutex<HashMap<MediaType, Vec<CustomFormatDefinition>>>,
    }

    impl FakeCatalog {
        fn with(media_type: MediaType, definitions: Vec<CustomFormatDefinition>) -> Self {
            let catalog = Self::default();
            catalog.set(media_type, definitions);
            catalog
        }

        fn set(&self, media_type: MediaType, definitions: Vec<CustomFormatDefinition>) {
            self.batches.lock().unwrap().insert(media_type, definitions);
        }
    }

    #[async_trait::async_trait]
    impl RuleCatalogSource for FakeCatalog {
        async fn list_rules(
            &self,
            media_type: MediaType,
        ) -> Result<Vec<CatalogEntry>, RuleCatalogError> {
            let batches = self.batches.lock().unwrap();
            let definitions = batches.get(&media_type).ok_or_else(|| {
                RuleCatalogError::Fetch(TrashError::ApiError {
                    status: 502,
                    message: "bad gateway".into(),
                })
            })?;
            Ok(definitions
                .iter()
                .map(|definition| CatalogEntry {
                    name: format!("{}.json", definition.trash_id),
                    path: format!("{media_type}/{}", definition.trash_id),
                    download_url: Some(format!("{media_type}/{}", definition.trash_id)),
                    entry_type: "file".into(),
                })
                .collect())
        }

        async fn fetch_rule(
            &self,
            entry: &CatalogEntry,
        ) -> Result<CustomFormatDefinition, RuleCatalogError> {
            let batches = self.batches.lock().unwrap();
            let (media, id) = entry.path.split_once('/').unwrap();
            let media_type: MediaType = media.parse().unwrap();
            batches[&media_type]
                .iter()
                .find(|definition| definition.trash_id == id)
                .cloned()
                .ok_or_else(|| RuleCatalogError::Fetch(TrashError::NotFound(entry.path.clone())))
        }
    }

    fn definition(trash_id: &str, name: &str, specifications: serde_json::Value) -> CustomFormatDefinition {
        serde_json::from_value(json!({
            "trash_id": trash_id,
            "name": name,
            "specifications": specifications,
        }))
        .unwrap()
    }

    fn feed() -> Vec<CustomFormatDefinition> {
        vec![
            definition(
                "br-disk",
                "BR-DISK",
                json!([{
                    "name": "BR-DISK",
                    "implementation": "ReleaseTitleSpecification",
                    "required": true,
                    "fields": { "value": r"\bBR-?DISK\b" }
                }]),
            ),
            definition(
                "web-tier-02",
                "WEB Tier 02",
                json!([
                    { "name": "FLUX", "implementation": "ReleaseGroupSpecification", "fields": { "value": "^FLUX$" } },
                    { "name": "NTb", "implementation": "ReleaseGroupSpecification", "fields": { "value": "^NTb$" } },
                    { "name": "WEBDL", "implementation": "SourceSpecification", "required": true, "fields": { "value": 3 } }
                ]),
            ),
            definition(
                "small",
                "Small Files",
                json!([{
                    "name": "Size",
                    "implementation": "SizeSpecification",
                    "required": true,
                    "fields": [{ "name": "min", "value": 1 }, { "name": "max", "value": 9 }]
                }]),
            ),
        ]
    }

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");
        sqlx::migrate!("../../migrations").run(&pool).await.expect("migrate");
        pool
    }

    fn service(pool: &SqlitePool, catalog: Arc<FakeCatalog>) -> RuleImportService {
        RuleImportService::new(
            catalog,
            Arc::new(SqliteCustomFormatRepository::new(pool.clone())),
            Arc::new(SqliteCustomFormatScoreRepository::new(pool.clone())),
            Arc::new(SqliteQualityProfileRepository::new(pool.clone())),
        )
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let pool = setup_pool().await;
        let importer = service(&pool, Arc::new(FakeCatalog::with(MediaType::Tv, feed())));
        let formats = SqliteCustomFormatRepository::new(pool.clone());

        let first = importer.import(MediaType::Tv).await;
        assert_eq!(first.imported_count, 3, "errors: {:?}", first.errors);
        assert!(first.errors.is_empty());
        let before = formats.get_by_external_id("tv:br-disk").await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = importer.import(MediaType::Tv).await;
        assert_eq!(second.imported_count, 3);

        let stored = formats.list(None).await.unwrap();
        assert_eq!(stored.len(), 3);
        let after = formats.get_by_external_id("tv:br-disk").await.unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert!(after.same_definition(&before));
        assert!(after.last_synced_at > before.last_synced_at);
    }

    #[tokio::test]
    async fn imported_records_carry_category_score_and_patterns() {
        let pool = setup_pool().await;
        let importer = service(&pool, Arc::new(FakeCatalog::with(MediaType::Tv, feed())));
        importer.import(MediaType::Tv).await;
        let formats = SqliteCustomFormatRepository::new(pool);

        let br_disk = formats.get_by_external_id("tv:br-disk").await.unwrap().unwrap();
        assert_eq!(br_disk.category, Some(FormatCategory::Unwanted));
        assert_eq!(br_disk.recommended_score, Some(-10000));
        assert_eq!(br_disk.media_type, Some(MediaType::Tv));

        let web = formats.get_by_external_id("tv:web-tier-02").await.unwrap().unwrap();
        assert_eq!(web.category, Some(FormatCategory::WebTiers));
        assert_eq!(web.recommended_score, Some(1650));
        assert_eq!(web.conditions[2].condition_type, ConditionType::Source);
        assert!(web.conditions[2].required);

        let small = formats.get_by_external_id("tv:small").await.unwrap().unwrap();
        assert_eq!(small.conditions[0].pattern, "1-9");
    }

    #[tokio::test]
    async fn bad_records_are_reported_and_skipped() {
        let pool = setup_pool().await;
        let mut definitions = feed();
        definitions.push(definition(
            "broken",
            "Broken",
            json!([{ "name": "bad", "implementation": "ReleaseTitleSpecification", "fields": { "value": "(unclosed" } }]),
        ));
        definitions.push(definition("empty", "Empty", json!([])));
        let importer = service(&pool, Arc::new(FakeCatalog::with(MediaType::Tv, definitions)));

        let summary = importer.import(MediaType::Tv).await;

        assert_eq!(summary.imported_count, 3);
        assert_eq!(summary.errors.len(), 2);
        assert_eq!(summary.errors[0].record.as_deref(), Some("broken.json"));
        assert!(summary.errors.iter().all(|e| e.media_type == MediaType::Tv));
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_siblings() {
        let pool = setup_pool().await;
        let catalog = Arc::new(FakeCatalog::with(MediaType::Tv, feed()));
        let importer = service(&pool, catalog);

        let summary = importer
            .sync(&[MediaType::Movie, MediaType::Music, MediaType::Tv])
            .await;

        assert_eq!(summary.imported_count, 3);
        assert_eq!(summary.errors.len(), 2);
        assert!(summary.errors.iter().all(|e| e.record.is_none()));
        assert_eq!(summary.errors[0].media_type, MediaType::Movie);
        assert_eq!(summary.errors[1].media_type, MediaType::Music);
    }

    #[tokio::test]
    async fn same_rule_in_two_scopes_is_two_records() {
        let pool = setup_pool().await;
        let catalog = Arc::new(FakeCatalog::with(MediaType::Tv, feed()));
        catalog.set(MediaType::Anime, feed());
        let importer = service(&pool, catalog);

        let summary = importer.sync(&[MediaType::Tv, MediaType::Anime]).await;
        assert_eq!(summary.imported_count, 6);
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn recommended_scores_are_applied_to_profile() {
        let pool = setup_pool().await;
        let importer = service(&pool, Arc::new(FakeCatalog::with(MediaType::Tv, feed())));
        importer.import(MediaType::Tv).await;

        let profiles = SqliteQualityProfileRepository::new(pool.clone());
        let profile = profiles
            .create(QualityProfile::new(
                "HD",
                vec![QualityProfileItem::enabled(QualityId(17))],
            ))
            .await
            .unwrap();

        let applied = importer
            .apply_recommended_scores(profile.id, Some(MediaType::Tv))
            .await
            .unwrap();
        assert_eq!(applied, Some(3));

        let scores = SqliteCustomFormatScoreRepository::new(pool.clone())
            .scores_for_profile(profile.id)
            .await
            .unwrap();
        assert!(scores.values().any(|score| *score == -10000));

        let missing = importer
            .apply_recommended_scores(ProfileId::new(), None)
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn rule_in_two_scopes_is_scored_once() {
        let pool = setup_pool().await;
        let catalog = Arc::new(FakeCatalog::with(MediaType::Tv, feed()));
        catalog.set(MediaType::Anime, feed());
        let importer = service(&pool, catalog);
        importer.sync(&[MediaType::Tv, MediaType::Anime]).await;

        let profile = SqliteQualityProfileRepository::new(pool.clone())
            .create(QualityProfile::new(
                "Any",
                vec![QualityProfileItem::enabled(QualityId(17))],
            ))
            .await
            .unwrap();
        let applied = importer
            .apply_recommended_scores(profile.id, None)
            .await
            .unwrap();
        assert_eq!(applied, Some(6));

        let evaluation = ReleaseEvaluationService::new(
            Arc::new(SqliteEvaluationSnapshotRepository::new(pool.clone())),
            Arc::new(SqliteCustomFormatRepository::new(pool)),
            DecisionEngine::default(),
        );
        let unscoped = ReleaseCandidate::new("Movie.2020.BR-DISK-GRP");
        let breakdown = evaluation
            .compute_score(&unscoped, profile.id, None)
            .await
            .unwrap();
        assert_eq!(breakdown.total, -10000);
        assert_eq!(breakdown.matched_formats.len(), 1);

        let anime = ReleaseCandidate {
            media_type: Some(MediaType::Anime),
            ..unscoped
        };
        let matches = evaluation.test_formats(&anime, None).await.unwrap();
        assert_eq!(matches.len(), 1);
        let breakdown = evaluation
            .compute_score(&anime, profile.id, None)
            .await
            .unwrap();
        assert_eq!(breakdown.total, -10000);
    }

    #[tokio::test]
    async fn not_original_language_rule_imports() {
        let pool = setup_pool().await;
        let rule = definition(
            "not-original",
            "Language: Not Original",
            json!([{
                "name": "Not Original",
                "implementation": "LanguageSpecification",
                "negate": true,
                "required": false,
                "fields": { "value": -2 }
            }]),
        );
        let importer = service(&pool, Arc::new(FakeCatalog::with(MediaType::Movie, vec![rule])));

        let summary = importer.import(MediaType::Movie).await;
        assert_eq!(summary.imported_count, 1, "errors: {:?}", summary.errors);

        let format = SqliteCustomFormatRepository::new(pool)
            .get_by_external_id("movie:not-original")
            .await
            .unwrap()
            .unwrap();
        assert!(format.conditions[0].negate);

        let matcher = CustomFormatMatcher::default();
        let mut release = ReleaseCandidate::new("Movie.2020.1080p.BluRay.x264-GRP");
        release.language = Some("original".into());
        assert!(!matcher.matches(&release, &format).matched);
        release.language = Some("french".into());
        assert!(matcher.matches(&release, &format).matched);
    }

    #[test]
    fn catalog_scores_take_precedence_over_bucket_defaults() {
        let mut rule = definition("hdr", "HDR", json!([]));
        assert_eq!(catalog_score(MediaType::Tv, &rule), None);

        rule.trash_scores = HashMap::from([
            ("default".to_string(), 450),
            ("anime-sonarr".to_string(), 100),
        ]);
        assert_eq!(catalog_score(MediaType::Tv, &rule), Some(450));
        assert_eq!(catalog_score(MediaType::Anime, &rule), Some(100));

        rule.specifications = serde_json::from_value(json!([{
            "name": "HDR",
            "implementation": "ReleaseTitleSpecification",
            "fields": { "value": r"\bHDR\b" }
        }]))
        .unwrap();
        let format = convert_definition(MediaType::Movie, &rule).unwrap();
        assert_eq!(format.category, Some(FormatCategory::HdrFormats));
        assert_eq!(format.recommended_score, Some(450));
    }

    #[test]
    fn categorization_follows_rule_order() {
        assert_eq!(categorize("BR-DISK"), FormatCategory::Unwanted);
        assert_eq!(categorize("DV (WEBDL)"), FormatCategory::Unwanted);
        assert_eq!(categorize("DV HDR10+"), FormatCategory::HdrFormats);
        assert_eq!(categorize("TrueHD ATMOS"), FormatCategory::Audio);
        assert_eq!(categorize("DTS-HD MA"), FormatCategory::Audio);
        assert_eq!(categorize("Remux Tier 01"), FormatCategory::RemuxTiers);
        assert_eq!(categorize("UHD Bluray Tier 02"), FormatCategory::UhdBlurayTiers);
        assert_eq!(categorize("HD Bluray Tier 03"), FormatCategory::HdBlurayTiers);
        assert_eq!(categorize("WEB Tier 01"), FormatCategory::WebTiers);
        assert_eq!(categorize("Anime BD Tier 04 (SeaDex Muxers)"), FormatCategory::AnimeTiers);
        assert_eq!(categorize("AMZN"), FormatCategory::StreamingServices);
        assert_eq!(categorize("HQ Source Groups"), FormatCategory::ReleaseGroups);
        assert_eq!(categorize("Repack/Proper"), FormatCategory::Other);
    }

    #[test]
    fn recommended_scores_by_bucket() {
        let score = |name: &str| recommended_score(categorize(name), name);
        assert_eq!(score("LQ"), -10000);
        assert_eq!(score("Remux Tier 01"), 1950);
        assert_eq!(score("Remux Tier 03"), 1850);
        assert_eq!(score("WEB Tier 01"), 1700);
        assert!(score("WEB Tier 01") > score("WEB Tier 02"));
        assert_eq!(score("DV HDR10+"), 1500);
        assert_eq!(score("HDR10+ Boost"), 600);
        assert_eq!(score("HDR"), 500);
        assert_eq!(score("TrueHD ATMOS"), 250);
        assert_eq!(score("DD+ ATMOS"), 180);
        assert_eq!(score("NF"), 75);
        assert_eq!(score("10bit"), 0);
    }

    #[test]
    fn numeric_values_use_lookup_tables() {
        let spec = |implementation: &str, value: serde_json::Value| -> Specification {
            serde_json::from_value(json!({
                "name": "spec",
                "implementation": implementation,
                "fields": { "value": value }
            }))
            .unwrap()
        };

        let convert = |media_type, implementation: &str, value| {
            convert_specification(media_type, &spec(implementation, value))
        };

        let tv_web = convert(MediaType::Tv, "SourceSpecification", json!(3)).unwrap();
        let movie_web = convert(MediaType::Movie, "SourceSpecification", json!(7)).unwrap();
        assert_eq!(tv_web.pattern, movie_web.pattern);

        let resolution = convert(MediaType::Movie, "ResolutionSpecification", json!(2160)).unwrap();
        assert_eq!(resolution.pattern, r"\b2160p\b");

        let language = convert(MediaType::Tv, "LanguageSpecification", json!(2)).unwrap();
        assert_eq!(language.condition_type, ConditionType::Language);
        assert_eq!(language.pattern, r"\bfrench\b");

        let flag = convert(MediaType::Tv, "IndexerFlagSpecification", json!(1)).unwrap();
        assert_eq!(flag.pattern, r"\bfreeleech\b");

        let unknown = convert(MediaType::Tv, "SomethingNewSpecification", json!("x")).unwrap();
        assert_eq!(unknown.condition_type, ConditionType::ReleaseName);

        let original = convert(MediaType::Movie, "LanguageSpecification", json!(-2)).unwrap();
        assert_eq!(original.pattern, r"\boriginal\b");
        assert!(convert(MediaType::Tv, "LanguageSpecification", json!(99)).is_err());
    }

    #[test]
    fn size_fields_become_range_patterns() {
        let spec: Specification = serde_json::from_value(json!({
            "name": "Size",
            "implementation": "SizeSpecification",
            "fields": { "min": 2.5, "max": 40 }
        }))
        .unwrap();
        assert_eq!(convert_specification(MediaType::Movie, &spec).unwrap().pattern, "2.5-40");

        let open: Specification = serde_json::from_value(json!({
            "name": "Size",
            "implementation": "SizeSpecification",
            "fields": { "min": 10 }
        }))
        .unwrap();
        assert_eq!(convert_specification(MediaType::Movie, &open).unwrap().pattern, ">=10");
    }

    #[test]
    fn converted_source_pattern_matches_candidate_and_title() {
        let pattern = source_pattern(Source::WebDl);
        let regex = regex::RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .unwrap();
        assert!(regex.is_match("webdl"));
        assert!(regex.is_match("Show.S01E01.1080p.WEB-DL-GRP"));
        assert!(!regex.is_match("Show.S01E01.1080p.WEBRip-GRP"));
    }
}
