// SPDX-License-Identifier: GPL-3.0-or-later
use crate::custom_formats::{formats_in_scope, CustomFormatMatcher};
use curatarr_domain::{CustomFormat, CustomFormatId, ReleaseCandidate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A format that matched, with the score the profile assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedFormat {
    pub format_id: CustomFormatId,
    pub name: String,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub matched_formats: Vec<MatchedFormat>,
    /// Sum of `matched_formats[..].score`.
    pub total: i32,
}

/// Adds up the profile scores of every format a release matches.
#[derive(Debug, Clone, Default)]
pub struct ScoreCalculator {
    matcher: CustomFormatMatcher,
}

impl ScoreCalculator {
    pub fn new(matcher: CustomFormatMatcher) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &CustomFormatMatcher {
        &self.matcher
    }

    /// Formats absent from `scores` contribute 0. The total saturates instead of overflowing.
    /// Only formats in scope for the candidate are considered, see [`formats_in_scope`].
    pub fn score(
        &self,
        candidate: &ReleaseCandidate,
        formats: &[CustomFormat],
        scores: &HashMap<CustomFormatId, i32>,
    ) -> ScoreBreakdown {
        let matched_formats: Vec<MatchedFormat> = formats_in_scope(candidate, formats)
            .into_iter()
            .filter(|format| self.matcher.matches(candidate, format).matched)
            .map(|format| MatchedFormat {
                format_id: format.id,
                name: format.name.clone(),
                score: scores.get(&format.id).copied().unwrap_or(0),
            })
            .collect();

        let total = matched_formats
            .iter()
            .fold(0i32, |total, matched| total.saturating_add(matched.score));

        ScoreBreakdown {
            matched_formats,
            total,
        }
    }
}
