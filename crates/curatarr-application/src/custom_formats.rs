// SPDX-License-Identifier: GPL-3.0-or-later

//! Custom format matching.
//!
//! Each condition selects one attribute of the release and tests it against the condition's
//! pattern:
//! - text conditions run a case-insensitive regex search; attributes the parser did not supply
//!   fall back to the raw title, except the release group which is derived from the title's
//!   trailing `-GROUP` token
//! - size conditions parse the pattern as a numeric range and compare the release size
//!
//! A format matches when every required condition holds and, if it has optional conditions,
//! at least one of them holds.

use crate::pattern_cache::PatternCache;
use curatarr_domain::{
    Condition, ConditionType, CustomFormat, CustomFormatId, ReleaseCandidate, SizeRange,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// Evaluation of a single condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionResult {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub pattern: String,
    pub negate: bool,
    pub required: bool,
    /// The release value the pattern was tested against, if there was one.
    pub value: Option<String>,
    /// Result after negation.
    pub matched: bool,
}

/// Verdict for one format plus the per-condition trace that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatMatch {
    pub format_id: CustomFormatId,
    pub name: String,
    pub matched: bool,
    pub trace: Vec<ConditionResult>,
}

/// Stateless matcher; the only shared state is the compiled pattern cache.
#[derive(Debug, Clone, Default)]
pub struct CustomFormatMatcher {
    patterns: Arc<PatternCache>,
}

impl CustomFormatMatcher {
    pub fn new(patterns: Arc<PatternCache>) -> Self {
        Self { patterns }
    }

    pub fn matches(&self, candidate: &ReleaseCandidate, format: &CustomFormat) -> FormatMatch {
        let trace: Vec<ConditionResult> = format
            .conditions
            .iter()
            .map(|condition| self.evaluate_condition(candidate, condition))
            .collect();

        let required_hold = trace.iter().filter(|r| r.required).all(|r| r.matched);
        let mut optional = trace.iter().filter(|r| !r.required).peekable();
        let optional_hold = optional.peek().is_none() || optional.any(|r| r.matched);
        let matched = !trace.is_empty() && required_hold && optional_hold;

        trace!(target: "matcher", format = %format.name, matched, "evaluated custom format");

        FormatMatch {
            format_id: format.id,
            name: format.name.clone(),
            matched,
            trace,
        }
    }

    /// Every format in scope for `candidate` that matches it, in input order.
    pub fn test_formats(
        &self,
        candidate: &ReleaseCandidate,
        formats: &[CustomFormat],
    ) -> Vec<FormatMatch> {
        formats_in_scope(candidate, formats)
            .into_iter()
            .map(|format| self.matches(candidate, format))
            .filter(|result| result.matched)
            .collect()
    }

    fn evaluate_condition(
        &self,
        candidate: &ReleaseCandidate,
        condition: &Condition,
    ) -> ConditionResult {
        let (value, matched) = match condition.condition_type {
            ConditionType::Size => {
                let value = candidate.size.map(|size| size.to_string());
                (value, self.size_matches(candidate.size, condition))
            }
            ConditionType::IndexerFlag if !candidate.indexer_flags.is_empty() => {
                let hit = candidate
                    .indexer_flags
                    .iter()
                    .any(|flag| self.pattern_matches(&condition.pattern, flag) == Some(true));
                let value = Some(candidate.indexer_flags.join(","));
                (value, hit != condition.negate)
            }
            _ => {
                let value = select_value(candidate, condition.condition_type);
                let matched = match value.as_deref() {
                    Some(text) => match self.pattern_matches(&condition.pattern, text) {
                        Some(hit) => hit != condition.negate,
                        None => false,
                    },
                    None => condition.negate,
                };
                (value.map(Cow::into_owned), matched)
            }
        };

        ConditionResult {
            condition_type: condition.condition_type,
            pattern: condition.pattern.clone(),
            negate: condition.negate,
            required: condition.required,
            value,
            matched,
        }
    }

    /// Missing sizes and unparseable ranges never match, whatever `negate` says.
    fn size_matches(&self, size: Option<f64>, condition: &Condition) -> bool {
        let (Some(size), Some(range)) = (size, SizeRange::parse(&condition.pattern)) else {
            return false;
        };
        range.contains(size) != condition.negate
    }

    /// `None` when the pattern does not compile.
    fn pattern_matches(&self, pattern: &str, text: &str) -> Option<bool> {
        match self.patterns.get(pattern, true) {
            Ok(regex) => Some(regex.is_match(text)),
            Err(error) => {
                warn!(target: "matcher", pattern, %error, "skipping condition with invalid pattern");
                None
            }
        }
    }
}

/// Formats that take part in evaluating `candidate`.
///
/// A candidate with a media type sees unscoped formats and its own scope only. Without one, the
/// copies of an upstream rule imported for several scopes count once: the copy with the lowest
/// external id is kept.
pub fn formats_in_scope<'a>(
    candidate: &ReleaseCandidate,
    formats: &'a [CustomFormat],
) -> Vec<&'a CustomFormat> {
    if let Some(media_type) = candidate.media_type {
        return formats
            .iter()
            .filter(|format| format.applies_to(media_type))
            .collect();
    }

    let mut kept: HashMap<&str, &CustomFormat> = HashMap::new();
    for format in formats {
        if let Some(rule) = format.upstream_id() {
            kept.entry(rule)
                .and_modify(|current| {
                    if format.external_id < current.external_id {
                        *current = format;
                    }
                })
                .or_insert(format);
        }
    }

    formats
        .iter()
        .filter(|format| match format.upstream_id() {
            Some(rule) => kept
                .get(rule)
                .is_some_and(|chosen| std::ptr::eq(*chosen, *format)),
            None => true,
        })
        .collect()
}

fn select_value(candidate: &ReleaseCandidate, condition_type: ConditionType) -> Option<Cow<'_, str>> {
    let raw = candidate.raw_title.as_str();
    let text = match condition_type {
        ConditionType::ReleaseGroup => {
            return candidate
                .release_group
                .as_deref()
                .map(Cow::Borrowed)
                .or_else(|| release_group_from_title(raw).map(Cow::Owned));
        }
        ConditionType::ReleaseName | ConditionType::IndexerFlag | ConditionType::Size => raw,
        ConditionType::Source => candidate.source.map_or(raw, |source| source.as_str()),
        ConditionType::Resolution => candidate
            .resolution
            .map_or(raw, |resolution| resolution.as_str()),
        ConditionType::Codec => candidate.codec.as_deref().unwrap_or(raw),
        ConditionType::AudioCodec => candidate.audio_codec.as_deref().unwrap_or(raw),
        ConditionType::AudioChannels => candidate.audio_channels.as_deref().unwrap_or(raw),
        ConditionType::Language => candidate.language.as_deref().unwrap_or(raw),
        ConditionType::Edition => candidate.edition.as_deref().unwrap_or(raw),
    };
    Some(Cow::Borrowed(text))
}

/// Hyphenated tails of source names, e.g. `WEB-DL` or `Blu-Ray`.
const SOURCE_SUFFIXES: &[&str] = &["dl", "rip", "ray", "disk"];

/// Trailing `-GROUP` token of a release title, ignoring a video container extension.
pub fn release_group_from_title(title: &str) -> Option<String> {
    lazy_static! {
        static ref GROUP_REGEX: Regex = Regex::new(
            r"-(?P<group>[A-Za-z0-9_]{2,32})(?:\.(?i:mkv|mp4|avi|m4v|ts|wmv))?$"
        )
        .expect("valid group regex");
    }

    let group = GROUP_REGEX.captures(title.trim())?.name("group")?.as_str();
    if SOURCE_SUFFIXES.contains(&group.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(group.to_string())
}
