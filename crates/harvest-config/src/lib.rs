// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("merged_df_with_ids.csv"),
        }
    }
}

/// Settings for the iTunes Search API client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItunesConfig {
    pub base_url: String,
    pub country: String,
    pub entity: String,
    pub limit: u32,
    pub timeout_secs: u64,
}

impl Default for ItunesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://itunes.apple.com".to_string(),
            country: "US".to_string(),
            entity: "song".to_string(),
            limit: 5,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub max_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            max_backoff_secs: 300,
        }
    }
}

/// Delay applied after every request that reached the search service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    pub min_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1300,
            jitter_ms: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub database_url: String,
    pub preview_index_path: PathBuf,
    pub flush_every: usize,
    /// Look up rows recorded as `rejected` or `abandoned` again on the next run.
    pub retry_failed: bool,
    /// Seeds an empty database from an `apple_music_matches.csv` export.
    #[serde(default)]
    pub legacy_csv_path: Option<PathBuf>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://apple_music_matches.db".to_string(),
            preview_index_path: PathBuf::from("apple_previews.txt"),
            flush_every: 100,
            retry_failed: false,
            legacy_csv_path: None,
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

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub itunes: ItunesConfig,
    pub retry: RetryConfig,
    pub pacing: PacingConfig,
    pub checkpoint: CheckpointConfig,
    pub telemetry: TelemetryConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: HARVEST_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("HARVEST_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(
        target: "config",
        catalog = %config.catalog.path.display(),
        checkpoint = %config.checkpoint.database_url,
        "configuration loaded"
    );
    Ok(config)
}
