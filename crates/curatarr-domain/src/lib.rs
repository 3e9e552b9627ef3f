// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Value Objects & IDs
// ============================================================================

/// Identifier of a seeded quality tier. Stable across installations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualityId(pub u32);

impl QualityId {
    /// Id reserved for the synthetic "Unknown" tier.
    pub const UNKNOWN: QualityId = QualityId(0);
}

impl std::fmt::Display for QualityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomFormatId(pub Uuid);

impl CustomFormatId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for CustomFormatId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CustomFormatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Unknown,
    Cam,
    Telesync,
    Telecine,
    Workprint,
    Dvd,
    Tv,
    WebDl,
    WebRip,
    Bluray,
    Remux,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Cam => "cam",
            Self::Telesync => "telesync",
            Self::Telecine => "telecine",
            Self::Workprint => "workprint",
            Self::Dvd => "dvd",
            Self::Tv => "tv",
            Self::WebDl => "webdl",
            Self::WebRip => "webrip",
            Self::Bluray => "bluray",
            Self::Remux => "remux",
        }
    }

    /// Lenient parse accepting the common release-name spellings. Unrecognized values map to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "cam" | "hdcam" => Self::Cam,
            "telesync" | "ts" | "hdts" => Self::Telesync,
            "telecine" | "tc" => Self::Telecine,
            "workprint" | "wp" => Self::Workprint,
            "dvd" | "dvdrip" => Self::Dvd,
            "tv" | "hdtv" | "sdtv" | "pdtv" => Self::Tv,
            "webdl" | "web-dl" | "web" => Self::WebDl,
            "webrip" | "web-rip" => Self::WebRip,
            "bluray" | "blu-ray" | "bd" | "bdrip" => Self::Bluray,
            "remux" | "bdremux" => Self::Remux,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "480p")]
    R480p,
    #[serde(rename = "576p")]
    R576p,
    #[serde(rename = "720p")]
    R720p,
    #[serde(rename = "1080p")]
    R1080p,
    #[serde(rename = "2160p")]
    R2160p,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::R480p => "480p",
            Self::R576p => "576p",
            Self::R720p => "720p",
            Self::R1080p => "1080p",
            Self::R2160p => "2160p",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().trim_end_matches('p') {
            "480" => Self::R480p,
            "576" => Self::R576p,
            "720" => Self::R720p,
            "1080" => Self::R1080p,
            "2160" | "4k" => Self::R2160p,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of library item a custom format applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Tv,
    Anime,
    Movie,
    Music,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tv => "tv",
            Self::Anime => "anime",
            Self::Movie => "movie",
            Self::Music => "music",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "tv" | "series" => Ok(Self::Tv),
            "anime" => Ok(Self::Anime),
            "movie" | "movies" => Ok(Self::Movie),
            "music" => Ok(Self::Music),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

/// The release attribute a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionType {
    ReleaseName,
    ReleaseGroup,
    Source,
    Resolution,
    Codec,
    AudioCodec,
    AudioChannels,
    Language,
    Edition,
    Size,
    IndexerFlag,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReleaseName => "releaseName",
            Self::ReleaseGroup => "releaseGroup",
            Self::Source => "source",
            Self::Resolution => "resolution",
            Self::Codec => "codec",
            Self::AudioCodec => "audioCodec",
            Self::AudioChannels => "audioChannels",
            Self::Language => "language",
            Self::Edition => "edition",
            Self::Size => "size",
            Self::IndexerFlag => "indexerFlag",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bucket an imported custom format is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatCategory {
    Unwanted,
    HdrFormats,
    Audio,
    RemuxTiers,
    UhdBlurayTiers,
    HdBlurayTiers,
    WebTiers,
    AnimeTiers,
    StreamingServices,
    ReleaseGroups,
    Other,
}

impl FormatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unwanted => "unwanted",
            Self::HdrFormats => "hdr_formats",
            Self::Audio => "audio",
            Self::RemuxTiers => "remux_tiers",
            Self::UhdBlurayTiers => "uhd_bluray_tiers",
            Self::HdBlurayTiers => "hd_bluray_tiers",
            Self::WebTiers => "web_tiers",
            Self::AnimeTiers => "anime_tiers",
            Self::StreamingServices => "streaming_services",
            Self::ReleaseGroups => "release_groups",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let category = match value {
            "unwanted" => Self::Unwanted,
            "hdr_formats" => Self::HdrFormats,
            "audio" => Self::Audio,
            "remux_tiers" => Self::RemuxTiers,
            "uhd_bluray_tiers" => Self::UhdBlurayTiers,
            "hd_bluray_tiers" => Self::HdBlurayTiers,
            "web_tiers" => Self::WebTiers,
            "anime_tiers" => Self::AnimeTiers,
            "streaming_services" => Self::StreamingServices,
            "release_groups" => Self::ReleaseGroups,
            "other" => Self::Other,
            _ => return None,
        };
        Some(category)
    }
}

impl std::fmt::Display for FormatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Unwanted => "Unwanted",
            Self::HdrFormats => "HDR Formats",
            Self::Audio => "Audio",
            Self::RemuxTiers => "Remux Tiers",
            Self::UhdBlurayTiers => "UHD Bluray Tiers",
            Self::HdBlurayTiers => "HD Bluray Tiers",
            Self::WebTiers => "WEB Tiers",
            Self::AnimeTiers => "Anime Tiers",
            Self::StreamingServices => "Streaming Services",
            Self::ReleaseGroups => "Release Groups",
            Self::Other => "Other",
        };
        write!(f, "{label}")
    }
}

// ============================================================================
// Quality Catalog
// ============================================================================

/// A quality tier. Sizes are megabytes per minute of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDefinition {
    pub id: QualityId,
    pub name: String,
    pub source: Source,
    pub resolution: Resolution,
    pub min_size: f64,
    pub max_size: f64,
    pub preferred_size: Option<f64>,
    pub weight: u32,
}

impl QualityDefinition {
    /// Synthetic tier used whenever a release cannot be resolved to a seeded definition.
    pub fn unknown() -> Self {
        Self {
            id: QualityId::UNKNOWN,
            name: "Unknown".to_string(),
            source: Source::Unknown,
            resolution: Resolution::Unknown,
            min_size: 0.0,
            max_size: f64::MAX,
            preferred_size: None,
            weight: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.id == QualityId::UNKNOWN
    }
}

/// The fixed table the quality catalog is seeded from, ordered worst to best.
pub fn default_quality_definitions() -> Vec<QualityDefinition> {
    use Resolution as R;
    use Source as S;

    let table: [(&str, Source, Resolution, f64, f64, f64); 24] = [
        ("WORKPRINT", S::Workprint, R::Unknown, 0.0, 95.0, 100.0),
        ("CAM", S::Cam, R::Unknown, 0.0, 95.0, 100.0),
        ("TELESYNC", S::Telesync, R::Unknown, 0.0, 95.0, 100.0),
        ("TELECINE", S::Telecine, R::Unknown, 0.0, 95.0, 100.0),
        ("SDTV", S::Tv, R::R480p, 2.0, 95.0, 100.0),
        ("DVD", S::Dvd, R::R480p, 2.0, 95.0, 100.0),
        ("WEBRip-480p", S::WebRip, R::R480p, 2.0, 95.0, 100.0),
        ("WEBDL-480p", S::WebDl, R::R480p, 2.0, 95.0, 100.0),
        ("Bluray-480p", S::Bluray, R::R480p, 2.0, 95.0, 100.0),
        ("Bluray-576p", S::Bluray, R::R576p, 2.0, 95.0, 100.0),
        ("HDTV-720p", S::Tv, R::R720p, 3.0, 95.0, 100.0),
        ("WEBRip-720p", S::WebRip, R::R720p, 3.0, 95.0, 100.0),
        ("WEBDL-720p", S::WebDl, R::R720p, 3.0, 95.0, 100.0),
        ("Bluray-720p", S::Bluray, R::R720p, 4.0, 95.0, 130.0),
        ("HDTV-1080p", S::Tv, R::R1080p, 4.0, 95.0, 125.0),
        ("WEBRip-1080p", S::WebRip, R::R1080p, 4.0, 95.0, 130.0),
        ("WEBDL-1080p", S::WebDl, R::R1080p, 4.0, 95.0, 130.0),
        ("Bluray-1080p", S::Bluray, R::R1080p, 4.0, 95.0, 155.0),
        ("Remux-1080p", S::Remux, R::R1080p, 35.0, 95.0, 400.0),
        ("HDTV-2160p", S::Tv, R::R2160p, 35.0, 95.0, 350.0),
        ("WEBRip-2160p", S::WebRip, R::R2160p, 35.0, 95.0, 350.0),
        ("WEBDL-2160p", S::WebDl, R::R2160p, 35.0, 95.0, 350.0),
        ("Bluray-2160p", S::Bluray, R::R2160p, 35.0, 95.0, 400.0),
        ("Remux-2160p", S::Remux, R::R2160p, 35.0, 95.0, 400.0),
    ];

    table
        .iter()
        .enumerate()
        .map(|(index, (name, source, resolution, min, preferred, max))| {
            let position = index as u32 + 1;
            QualityDefinition {
                id: QualityId(position),
                name: (*name).to_string(),
                source: *source,
                resolution: *resolution,
                min_size: *min,
                max_size: *max,
                preferred_size: Some(*preferred),
                weight: position,
            }
        })
        .collect()
}

// ============================================================================
// Quality Profiles
// ============================================================================

/// Position of a quality inside a profile. `Disabled` orders below every enabled rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityRank {
    Disabled,
    Ranked(usize),
}

impl QualityRank {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfileItem {
    pub quality_id: QualityId,
    pub enabled: bool,
}

impl QualityProfileItem {
    pub fn enabled(quality_id: QualityId) -> Self {
        Self {
            quality_id,
            enabled: true,
        }
    }

    pub fn disabled(quality_id: QualityId) -> Self {
        Self {
            quality_id,
            enabled: false,
        }
    }
}

/// User-defined ordering of quality tiers. Later items are preferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityProfile {
    pub id: ProfileId,
    pub name: String,
    pub upgrade_allowed: bool,
    pub cutoff_quality_id: Option<QualityId>,
    pub items: Vec<QualityProfileItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QualityProfile {
    pub fn new(name: impl Into<String>, items: Vec<QualityProfileItem>) -> Self {
        let now = Utc::now();
        Self {
            id: ProfileId::new(),
            name: name.into(),
            upgrade_allowed: false,
            cutoff_quality_id: None,
            items,
            created_at: now,
            updated_at: now,
        }
    }

    /// Placeholder used when a referenced profile no longer exists. Every quality is disabled.
    pub fn empty(id: ProfileId) -> Self {
        let mut profile = Self::new("", Vec::new());
        profile.id = id;
        profile
    }

    pub fn rank(&self, quality_id: QualityId) -> QualityRank {
        self.items
            .iter()
            .position(|item| item.quality_id == quality_id && item.enabled)
            .map(QualityRank::Ranked)
            .unwrap_or(QualityRank::Disabled)
    }

    /// Rank at or above which upgrading stops. Without a usable cutoff the rank is one past the
    /// last item, so it can never be reached.
    pub fn cutoff_rank(&self) -> QualityRank {
        match self.cutoff_quality_id.map(|id| self.rank(id)) {
            Some(QualityRank::Ranked(rank)) => QualityRank::Ranked(rank),
            _ => QualityRank::Ranked(self.items.len()),
        }
    }

    pub fn cutoff_met(&self, quality_id: QualityId) -> bool {
        let rank = self.rank(quality_id);
        !rank.is_disabled() && rank >= self.cutoff_rank()
    }

    /// Structural validation plus the check that every referenced quality exists in `catalog`.
    pub fn validate_with_catalog(
        &self,
        catalog: &[QualityDefinition],
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = self.validate().err().unwrap_or_default();
        let known = |id: QualityId| catalog.iter().any(|definition| definition.id == id);

        for item in &self.items {
            if !known(item.quality_id) {
                errors.push(ValidationError {
                    field: "items",
                    message: format!("unknown quality id {}", item.quality_id),
                });
            }
        }
        if let Some(cutoff) = self.cutoff_quality_id {
            if !known(cutoff) {
                errors.push(ValidationError {
                    field: "cutoff_quality_id",
                    message: format!("unknown quality id {cutoff}"),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// ============================================================================
// Custom Formats
// ============================================================================

/// Numeric test used by `size` conditions.
///
/// Grammar: `>N`, `>=N`, `<N`, `<=N` and the inclusive range `A-B`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeRange {
    Above(f64),
    AtLeast(f64),
    Below(f64),
    AtMost(f64),
    Between(f64, f64),
}

impl SizeRange {
    pub fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();

        if let Some(rest) = pattern.strip_prefix(">=") {
            return parse_size_number(rest).map(Self::AtLeast);
        }
        if let Some(rest) = pattern.strip_prefix('>') {
            return parse_size_number(rest).map(Self::Above);
        }
        if let Some(rest) = pattern.strip_prefix("<=") {
            return parse_size_number(rest).map(Self::AtMost);
        }
        if let Some(rest) = pattern.strip_prefix('<') {
            return parse_size_number(rest).map(Self::Below);
        }

        let (low, high) = pattern.split_once('-')?;
        let low = parse_size_number(low)?;
        let high = parse_size_number(high)?;
        (low <= high).then_some(Self::Between(low, high))
    }

    pub fn contains(&self, size: f64) -> bool {
        match *self {
            Self::Above(limit) => size > limit,
            Self::AtLeast(limit) => size >= limit,
            Self::Below(limit) => size < limit,
            Self::AtMost(limit) => size <= limit,
            Self::Between(low, high) => size >= low && size <= high,
        }
    }
}

fn parse_size_number(value: &str) -> Option<f64> {
    let parsed: f64 = value.trim().parse().ok()?;
    (parsed.is_finite() && parsed >= 0.0).then_some(parsed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub pattern: String,
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub required: bool,
}

impl Condition {
    pub fn new(condition_type: ConditionType, pattern: impl Into<String>) -> Self {
        Self {
            condition_type,
            pattern: pattern.into(),
            negate: false,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    fn pattern_error(&self) -> Option<String> {
        match self.condition_type {
            ConditionType::Size => SizeRange::parse(&self.pattern)
                .is_none()
                .then(|| format!("'{}' is not a valid size range", self.pattern)),
            _ if self.pattern.trim().is_empty() => Some("pattern cannot be empty".to_string()),
            _ => RegexBuilder::new(&self.pattern)
                .case_insensitive(true)
                .build()
                .err()
                .map(|error| format!("invalid pattern '{}': {error}", self.pattern)),
        }
    }
}

/// Named rule set describing a release characteristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFormat {
    pub id: CustomFormatId,
    pub name: String,
    pub include_when_renaming: bool,
    pub conditions: Vec<Condition>,
    pub media_type: Option<MediaType>,
    pub external_id: Option<String>,
    pub category: Option<FormatCategory>,
    pub recommended_score: Option<i32>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomFormat {
    pub fn new(name: impl Into<String>, conditions: Vec<Condition>) -> Self {
        let now = Utc::now();
        Self {
            id: CustomFormatId::new(),
            name: name.into(),
            include_when_renaming: false,
            conditions,
            media_type: None,
            external_id: None,
            category: None,
            recommended_score: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when both formats describe the same rule set, ignoring ids and timestamps.
    pub fn same_definition(&self, other: &CustomFormat) -> bool {
        self.name == other.name
            && self.include_when_renaming == other.include_when_renaming
            && self.conditions == other.conditions
            && self.media_type == other.media_type
            && self.category == other.category
            && self.recommended_score == other.recommended_score
    }

    /// Upstream rule id of an imported format: `external_id` without its media type prefix.
    pub fn upstream_id(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .map(|id| id.split_once(':').map_or(id, |(_, rule)| rule))
    }

    /// Unscoped formats apply to every media type.
    pub fn applies_to(&self, media_type: MediaType) -> bool {
        self.media_type.map_or(true, |scope| scope == media_type)
    }
}

/// Score a matched custom format contributes to a profile's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFormatScore {
    pub profile_id: ProfileId,
    pub format_id: CustomFormatId,
    pub score: i32,
}

// ============================================================================
// Release candidates
// ============================================================================

/// Structured attributes of a release offered for download, as produced by the release parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseCandidate {
    pub raw_title: String,
    pub release_group: Option<String>,
    pub source: Option<Source>,
    pub resolution: Option<Resolution>,
    pub codec: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_channels: Option<String>,
    /// `original` when the release is in the item's original language.
    pub language: Option<String>,
    pub edition: Option<String>,
    /// Megabytes per minute of content.
    pub size: Option<f64>,
    #[serde(default)]
    pub indexer_flags: Vec<String>,
    /// Library the release is searched for. Formats scoped to other media types are ignored.
    #[serde(default)]
    pub media_type: Option<MediaType>,
}

impl ReleaseCandidate {
    pub fn new(raw_title: impl Into<String>) -> Self {
        Self {
            raw_title: raw_title.into(),
            ..Self::default()
        }
    }
}

/// The file already on disk that a candidate competes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingFile {
    pub quality_id: QualityId,
    pub score: i32,
}

// ============================================================================
// Domain Validation
// ============================================================================

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub trait Validate {
    fn validate(&self) -> Result<(), Vec<ValidationError>>;
}

impl Validate for QualityDefinition {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.min_size < 0.0 {
            errors.push(ValidationError {
                field: "min_size",
                message: "min size cannot be negative".into(),
            });
        }
        if self.min_size > self.max_size {
            errors.push(ValidationError {
                field: "max_size",
                message: "max size must be >= min size".into(),
            });
        }
        if let Some(preferred) = self.preferred_size {
            if preferred < self.min_size || preferred > self.max_size {
                errors.push(ValidationError {
                    field: "preferred_size",
                    message: "preferred size must lie between min and max size".into(),
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Validate for QualityProfile {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(ValidationError {
                field: "name",
                message: "name cannot be empty".into(),
            });
        }
        if self.items.is_empty() {
            errors.push(ValidationError {
                field: "items",
                message: "at least one quality must be listed".into(),
            });
        }
        for (index, item) in self.items.iter().enumerate() {
            if self.items[..index]
                .iter()
                .any(|earlier| earlier.quality_id == item.quality_id)
            {
                errors.push(ValidationError {
                    field: "items",
                    message: format!("quality {} is listed more than once", item.quality_id),
                });
            }
        }
        if let Some(cutoff) = self.cutoff_quality_id {
            if self.rank(cutoff).is_disabled() {
                errors.push(ValidationError {
                    field: "cutoff_quality_id",
                    message: "cutoff must be one of the enabled items".into(),
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Validate for CustomFormat {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(ValidationError {
                field: "name",
                message: "name cannot be empty".into(),
            });
        }
        if self.conditions.is_empty() {
            errors.push(ValidationError {
                field: "conditions",
                message: "at least one condition is required".into(),
            });
        }
        for (index, condition) in self.conditions.iter().enumerate() {
            if let Some(message) = condition.pattern_error() {
                errors.push(ValidationError {
                    field: "conditions",
                    message: format!("condition {} ({}): {message}", index + 1, condition.condition_type),
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(items: Vec<QualityProfileItem>, cutoff: Option<QualityId>) -> QualityProfile {
        let mut profile = QualityProfile::new("HD", items);
        profile.cutoff_quality_id = cutoff;
        profile.upgrade_allowed = true;
        profile
    }

    #[test]
    fn default_table_is_ordered_and_valid() {
        let table = default_quality_definitions();
        assert_eq!(table.len(), 24);
        assert!(table.windows(2).all(|pair| pair[0].weight < pair[1].weight));
        assert!(table.iter().all(|definition| definition.validate().is_ok()));
        assert!(table.iter().all(|definition| !definition.is_unknown()));
    }

    #[test]
    fn rank_ignores_disabled_items() {
        let p = profile(
            vec![
                QualityProfileItem::enabled(QualityId(11)),
                QualityProfileItem::disabled(QualityId(13)),
                QualityProfileItem::enabled(QualityId(17)),
            ],
            None,
        );
        assert_eq!(p.rank(QualityId(11)), QualityRank::Ranked(0));
        assert_eq!(p.rank(QualityId(13)), QualityRank::Disabled);
        assert_eq!(p.rank(QualityId(17)), QualityRank::Ranked(2));
        assert_eq!(p.rank(QualityId(99)), QualityRank::Disabled);
        assert!(QualityRank::Disabled < QualityRank::Ranked(0));
    }

    #[test]
    fn cutoff_rank_defaults_to_unreachable() {
        let items = vec![
            QualityProfileItem::enabled(QualityId(11)),
            QualityProfileItem::enabled(QualityId(17)),
        ];
        let without_cutoff = profile(items.clone(), None);
        assert_eq!(without_cutoff.cutoff_rank(), QualityRank::Ranked(2));
        assert!(!without_cutoff.cutoff_met(QualityId(17)));

        let with_cutoff = profile(items, Some(QualityId(11)));
        assert_eq!(with_cutoff.cutoff_rank(), QualityRank::Ranked(0));
        assert!(with_cutoff.cutoff_met(QualityId(17)));
        assert!(!with_cutoff.cutoff_met(QualityId(3)));
    }

    #[test]
    fn profile_validation_catches_bad_cutoff_and_duplicates() {
        let p = profile(
            vec![
                QualityProfileItem::enabled(QualityId(11)),
                QualityProfileItem::enabled(QualityId(11)),
                QualityProfileItem::disabled(QualityId(17)),
            ],
            Some(QualityId(17)),
        );
        let errors = p.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.field == "items"));
        assert!(errors.iter().any(|e| e.field == "cutoff_quality_id"));
    }

    #[test]
    fn profile_validation_checks_catalog_references() {
        let catalog = default_quality_definitions();
        let p = profile(vec![QualityProfileItem::enabled(QualityId(500))], None);
        let errors = p.validate_with_catalog(&catalog).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("500")));

        let ok = profile(vec![QualityProfileItem::enabled(QualityId(17))], Some(QualityId(17)));
        assert!(ok.validate_with_catalog(&catalog).is_ok());
    }

    #[test]
    fn size_range_grammar() {
        assert_eq!(SizeRange::parse(">=500"), Some(SizeRange::AtLeast(500.0)));
        assert_eq!(SizeRange::parse(">500"), Some(SizeRange::Above(500.0)));
        assert_eq!(SizeRange::parse("<= 10"), Some(SizeRange::AtMost(10.0)));
        assert_eq!(SizeRange::parse("<1.5"), Some(SizeRange::Below(1.5)));
        assert_eq!(
            SizeRange::parse("500-1000"),
            Some(SizeRange::Between(500.0, 1000.0))
        );
        assert_eq!(SizeRange::parse("1000-500"), None);
        assert_eq!(SizeRange::parse("=500"), None);
        assert_eq!(SizeRange::parse("about 500"), None);
        assert_eq!(SizeRange::parse(">inf"), None);
        assert_eq!(SizeRange::parse(""), None);
    }

    #[test]
    fn size_range_boundaries() {
        assert!(SizeRange::parse(">=500").unwrap().contains(500.0));
        assert!(!SizeRange::parse(">500").unwrap().contains(500.0));
        let range = SizeRange::parse("500-1000").unwrap();
        assert!(range.contains(500.0));
        assert!(range.contains(1000.0));
        assert!(!range.contains(1001.0));
        assert!(!range.contains(499.9));
    }

    #[test]
    fn custom_format_validation_rejects_bad_patterns() {
        let format = CustomFormat::new(
            "Broken",
            vec![
                Condition::new(ConditionType::ReleaseName, "(unclosed"),
                Condition::new(ConditionType::Size, "big"),
                Condition::new(ConditionType::Codec, "  "),
            ],
        );
        let errors = format.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].message.starts_with("condition 1 (releaseName)"));

        let empty = CustomFormat::new("Empty", vec![]);
        assert!(empty
            .validate()
            .unwrap_err()
            .iter()
            .any(|e| e.field == "conditions"));

        let good = CustomFormat::new(
            "x265",
            vec![Condition::new(ConditionType::Codec, r"\b(x265|hevc)\b").required()],
        );
        assert!(good.validate().is_ok());
    }

    #[test]
    fn condition_serializes_with_type_tag() {
        let condition = Condition::new(ConditionType::AudioCodec, "truehd").negated();
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["type"], "audioCodec");
        assert_eq!(json["negate"], true);
        assert_eq!(json["required"], false);
    }

    #[test]
    fn source_and_resolution_parse_common_spellings() {
        assert_eq!(Source::parse("WEB-DL"), Source::WebDl);
        assert_eq!(Source::parse("HDTV"), Source::Tv);
        assert_eq!(Source::parse("Blu-Ray"), Source::Bluray);
        assert_eq!(Source::parse("laserdisc"), Source::Unknown);
        assert_eq!(Resolution::parse("1080p"), Resolution::R1080p);
        assert_eq!(Resolution::parse("2160"), Resolution::R2160p);
        assert_eq!(Resolution::parse("8k"), Resolution::Unknown);
        assert_eq!("Series".parse::<MediaType>(), Ok(MediaType::Tv));
        assert!("podcast".parse::<MediaType>().is_err());
    }

    #[test]
    fn same_definition_ignores_identity() {
        let a = CustomFormat::new("HDR", vec![Condition::new(ConditionType::ReleaseName, "hdr")]);
        let mut b = a.clone();
        b.id = CustomFormatId::new();
        b.last_synced_at = Some(Utc::now());
        assert!(a.same_definition(&b));
        b.recommended_score = Some(500);
        assert!(!a.same_definition(&b));
    }

    #[test]
    fn scope_and_upstream_id() {
        let mut format = CustomFormat::new("BR-DISK", vec![]);
        assert!(format.applies_to(MediaType::Movie));
        assert_eq!(format.upstream_id(), None);

        format.media_type = Some(MediaType::Tv);
        format.external_id = Some("tv:85a4f2d1".to_string());
        assert!(format.applies_to(MediaType::Tv));
        assert!(!format.applies_to(MediaType::Anime));
        assert_eq!(format.upstream_id(), Some("85a4f2d1"));
    }
}
