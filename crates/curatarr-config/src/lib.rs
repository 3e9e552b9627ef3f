// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://curatarr.db".to_string(),
            pool_max_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5160,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Knobs for the release decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Skip candidates whose size falls outside the resolved quality's bounds.
    pub enforce_size_limits: bool,
    /// Maximum number of compiled condition patterns kept in memory.
    pub pattern_cache_capacity: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            enforce_size_limits: false,
            pattern_cache_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCatalogConfig {
    /// Base URL of the contents listing, `{base_url}/{app}/cf` is requested per media type.
    pub base_url: String,
    pub timeout_secs: u64,
    pub rate_limit_ms: u64,
    /// Media types synchronized by a full catalog sync.
    pub media_types: Vec<String>,
}

impl Default for RuleCatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com/repos/TRaSH-Guides/Guides/contents/docs/json"
                .to_string(),
            timeout_secs: 30,
            rate_limit_ms: 250,
            media_types: vec!["tv".to_string(), "movie".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub telemetry: TelemetryConfig,
    pub decision: DecisionConfig,
    pub rule_catalog: RuleCatalogConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: CURATARR_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("CURATARR_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(
        target: "config",
        enforce_size_limits = config.decision.enforce_size_limits,
        "configuration loaded"
    );
    Ok(config)
}
