// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory view of the quality tiers used during evaluation.

use curatarr_domain::{
    default_quality_definitions, QualityDefinition, QualityId, Resolution, Source,
};
use serde::{Deserialize, Serialize};

/// Outcome of checking a release size against a tier's bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeCheck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SizeCheck {
    fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    fn out_of_bounds(reason: String) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }
}

/// Ordered set of quality tiers, worst first.
#[derive(Debug, Clone)]
pub struct QualityCatalog {
    definitions: Vec<QualityDefinition>,
    unknown: QualityDefinition,
}

impl QualityCatalog {
    pub fn new(mut definitions: Vec<QualityDefinition>) -> Self {
        definitions.sort_by_key(|definition| definition.weight);
        Self {
            definitions,
            unknown: QualityDefinition::unknown(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_quality_definitions())
    }

    /// All tiers ascending by weight.
    pub fn list(&self) -> &[QualityDefinition] {
        &self.definitions
    }

    pub fn get(&self, id: QualityId) -> Option<&QualityDefinition> {
        self.definitions.iter().find(|definition| definition.id == id)
    }

    /// Resolve a release's source and resolution to a tier.
    ///
    /// Tries the exact pair first, then the source-only tier for that source. Anything else
    /// lands on the synthetic unknown tier.
    pub fn resolve(
        &self,
        source: Option<Source>,
        resolution: Option<Resolution>,
    ) -> &QualityDefinition {
        let source = source.unwrap_or(Source::Unknown);
        if source == Source::Unknown {
            return &self.unknown;
        }
        let resolution = resolution.unwrap_or(Resolution::Unknown);

        let exact = self
            .definitions
            .iter()
            .find(|d| d.source == source && d.resolution == resolution);
        let source_only = || {
            self.definitions
                .iter()
                .find(|d| d.source == source && d.resolution == Resolution::Unknown)
        };

        exact.or_else(source_only).unwrap_or(&self.unknown)
    }

    /// Check `size` against the tier's bounds. Bounds are inclusive.
    pub fn validate_size(definition: &QualityDefinition, size: f64) -> SizeCheck {
        if size < definition.min_size {
            SizeCheck::out_of_bounds(format!(
                "size {size} is below the {} minimum of {}",
                definition.name, definition.min_size
            ))
        } else if size > definition.max_size {
            SizeCheck::out_of_bounds(format!(
                "size {size} is above the {} maximum of {}",
                definition.name, definition.max_size
            ))
        } else {
            SizeCheck::ok()
        }
    }
}

impl Default for QualityCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}
