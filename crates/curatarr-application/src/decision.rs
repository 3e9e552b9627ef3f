// SPDX-License-Identifier: GPL-3.0-or-later

//! Grab / upgrade / reject / skip decisions for a single release.
//!
//! The engine works on an [`EvaluationSnapshot`] that the caller has already loaded, so it
//! never touches the store and can be shared freely between tasks.

use crate::quality_catalog::{QualityCatalog, SizeCheck};
use crate::scoring::{ScoreBreakdown, ScoreCalculator};
use curatarr_config::DecisionConfig;
use curatarr_domain::{
    CustomFormat, CustomFormatId, ExistingFile, QualityDefinition, QualityProfile, QualityRank,
    ReleaseCandidate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Grab,
    Upgrade,
    Reject,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    QualityNotWanted,
    UpgradesDisabled,
    CutoffMet,
    NotBetterThanExisting,
    SizeOutsideLimits,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::QualityNotWanted => "quality not wanted by profile",
            Self::UpgradesDisabled => "upgrades disabled",
            Self::CutoffMet => "cutoff already met",
            Self::NotBetterThanExisting => "not better than existing",
            Self::SizeOutsideLimits => "size outside quality limits",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub reason: Option<DecisionReason>,
    /// Tier the release resolved to.
    pub quality: QualityDefinition,
    pub rank: QualityRank,
    pub score: ScoreBreakdown,
    /// Present whenever the release carried a size.
    pub size_check: Option<SizeCheck>,
}

impl Decision {
    /// Whether the release should be downloaded.
    pub fn is_accepted(&self) -> bool {
        matches!(self.action, DecisionAction::Grab | DecisionAction::Upgrade)
    }
}

/// Caller-supplied knobs. There is no process-wide settings record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionPolicy {
    pub enforce_size_limits: bool,
}

impl From<&DecisionConfig> for DecisionPolicy {
    fn from(config: &DecisionConfig) -> Self {
        Self {
            enforce_size_limits: config.enforce_size_limits,
        }
    }
}

/// Everything one evaluation reads, resolved up front.
#[derive(Debug, Clone)]
pub struct EvaluationSnapshot {
    pub catalog: QualityCatalog,
    pub profile: QualityProfile,
    pub formats: Vec<CustomFormat>,
    /// Profile scores by format. Missing entries score 0.
    pub scores: HashMap<CustomFormatId, i32>,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    calculator: ScoreCalculator,
    policy: DecisionPolicy,
}

impl DecisionEngine {
    pub fn new(calculator: ScoreCalculator, policy: DecisionPolicy) -> Self {
        Self { calculator, policy }
    }

    pub fn policy(&self) -> DecisionPolicy {
        self.policy
    }

    pub fn calculator(&self) -> &ScoreCalculator {
        &self.calculator
    }

    pub fn evaluate(
        &self,
        snapshot: &EvaluationSnapshot,
        candidate: &ReleaseCandidate,
        existing: Option<&ExistingFile>,
    ) -> Decision {
        let profile = &snapshot.profile;
        let quality = snapshot
            .catalog
            .resolve(candidate.source, candidate.resolution)
            .clone();
        let rank = profile.rank(quality.id);
        let size_check = candidate
            .size
            .map(|size| QualityCatalog::validate_size(&quality, size));

        let decision = |action, reason, score| Decision {
            action,
            reason,
            quality: quality.clone(),
            rank,
            score,
            size_check: size_check.clone(),
        };

        if rank.is_disabled() {
            return self.log(
                decision(
                    DecisionAction::Reject,
                    Some(DecisionReason::QualityNotWanted),
                    ScoreBreakdown::default(),
                ),
                candidate,
            );
        }

        let score = self
            .calculator
            .score(candidate, &snapshot.formats, &snapshot.scores);

        let outside_limits = size_check.as_ref().is_some_and(|check| !check.ok);
        if self.policy.enforce_size_limits && outside_limits {
            return self.log(
                decision(
                    DecisionAction::Skip,
                    Some(DecisionReason::SizeOutsideLimits),
                    score,
                ),
                candidate,
            );
        }

        let Some(existing) = existing else {
            return self.log(decision(DecisionAction::Grab, None, score), candidate);
        };

        if !profile.upgrade_allowed {
            return self.log(
                decision(
                    DecisionAction::Reject,
                    Some(DecisionReason::UpgradesDisabled),
                    score,
                ),
                candidate,
            );
        }

        let existing_rank = profile.rank(existing.quality_id);
        if existing_rank >= profile.cutoff_rank() {
            return self.log(
                decision(DecisionAction::Reject, Some(DecisionReason::CutoffMet), score),
                candidate,
            );
        }

        if (rank, score.total) > (existing_rank, existing.score) {
            self.log(decision(DecisionAction::Upgrade, None, score), candidate)
        } else {
            self.log(
                decision(
                    DecisionAction::Reject,
                    Some(DecisionReason::NotBetterThanExisting),
                    score,
                ),
                candidate,
            )
        }
    }

    /// Highest `(rank, score)` among accepted candidates; the earliest wins a tie.
    pub fn best_candidate<'a>(
        &self,
        snapshot: &EvaluationSnapshot,
        candidates: &'a [ReleaseCandidate],
        existing: Option<&ExistingFile>,
    ) -> Option<(&'a ReleaseCandidate, Decision)> {
        let mut best: Option<(&'a ReleaseCandidate, Decision)> = None;
        for candidate in candidates {
            let decision = self.evaluate(snapshot, candidate, existing);
            if !decision.is_accepted() {
                continue;
            }
            let better = best.as_ref().map_or(true, |(_, current)| {
                (decision.rank, decision.score.total) > (current.rank, current.score.total)
            });
            if better {
                best = Some((candidate, decision));
            }
        }
        best
    }

    fn log(&self, decision: Decision, candidate: &ReleaseCandidate) -> Decision {
        debug!(
            target: "decision",
            title = %candidate.raw_title,
            quality = %decision.quality.name,
            action = ?decision.action,
            reason = ?decision.reason,
            score = decision.score.total,
            "evaluated release"
        );
        decision
    }
}
