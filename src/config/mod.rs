mod file_config;

pub use file_config::{FileConfig, ResourceConfig, RetryConfig};

use crate::resource::Resource;
use crate::warehouse::LoadStrategy;
use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_PIPELINE_NAME: &str = "spotify";
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
/// Largest page the playlist items endpoint serves.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Snapshot of the process environment taken once at start-up.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub database_url: Option<String>,
    pub logging_database_url: Option<String>,
    pub playlist_id: Option<String>,
    pub pipeline_config: Option<PathBuf>,
    pub log_folder_path: Option<PathBuf>,
}

impl EnvVars {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            client_id: get("CLIENT_ID"),
            client_secret: get("CLIENT_SECRET"),
            database_url: get("DATABASE_URL"),
            logging_database_url: get("LOGGING_DATABASE_URL"),
            playlist_id: get("PLAYLIST_ID"),
            pipeline_config: get("PIPELINE_CONFIG").map(PathBuf::from),
            log_folder_path: get("LOG_FOLDER_PATH").map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub playlist_id: String,
    pub api_base_url: String,
    pub token_url: String,
    pub page_limit: u32,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl std::fmt::Debug for SpotifySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifySettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("playlist_id", &self.playlist_id)
            .field("api_base_url", &self.api_base_url)
            .field("token_url", &self.token_url)
            .field("page_limit", &self.page_limit)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

/// A resource to run and how to load it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourcePlan {
    pub resource: Resource,
    pub strategy: LoadStrategy,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline_name: String,
    pub spotify: SpotifySettings,
    pub warehouse_db_path: PathBuf,
    pub run_log_db_path: PathBuf,
    /// When set, each run's log lines are also written to a file here.
    pub log_folder_path: Option<PathBuf>,
    /// Declared resources, in declaration order.
    pub resources: Vec<ResourcePlan>,
}

impl AppConfig {
    /// Resolve configuration from the environment and the optional TOML file.
    /// TOML values override environment values where both exist.
    pub fn resolve(env: &EnvVars, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let client_id = env
            .client_id
            .clone()
            .ok_or_else(|| anyhow!("CLIENT_ID must be set"))?;
        let client_secret = env
            .client_secret
            .clone()
            .ok_or_else(|| anyhow!("CLIENT_SECRET must be set"))?;

        let playlist_id = file
            .playlist_id
            .or_else(|| env.playlist_id.clone())
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("playlist_id must be specified via PLAYLIST_ID or in config file")
            })?;

        let database_url = env
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;
        let warehouse_db_path = parse_database_url(database_url)?;
        let run_log_db_path = match &env.logging_database_url {
            Some(url) => parse_database_url(url)?,
            None => default_run_log_path(&warehouse_db_path),
        };
        if run_log_db_path == warehouse_db_path {
            bail!("LOGGING_DATABASE_URL must point to a different database than DATABASE_URL");
        }

        let page_limit = file.page_limit.unwrap_or(MAX_PAGE_LIMIT);
        if page_limit == 0 || page_limit > MAX_PAGE_LIMIT {
            bail!("page_limit must be between 1 and {}, got {}", MAX_PAGE_LIMIT, page_limit);
        }
        let request_timeout_secs = file.request_timeout_secs.unwrap_or(30);
        if request_timeout_secs == 0 {
            bail!("request_timeout_secs must be positive");
        }

        let retry_file = file.retry.unwrap_or_default();
        let retry_defaults = RetrySettings::default();
        let retry = RetrySettings {
            max_attempts: retry_file.max_attempts.unwrap_or(retry_defaults.max_attempts),
            initial_backoff_ms: retry_file
                .initial_backoff_ms
                .unwrap_or(retry_defaults.initial_backoff_ms),
            max_backoff_ms: retry_file
                .max_backoff_ms
                .unwrap_or(retry_defaults.max_backoff_ms),
            backoff_multiplier: retry_file
                .backoff_multiplier
                .unwrap_or(retry_defaults.backoff_multiplier),
        };
        if retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if retry.backoff_multiplier < 1.0 {
            bail!(
                "retry.backoff_multiplier must be at least 1.0, got {}",
                retry.backoff_multiplier
            );
        }

        let resources = match file.resources {
            Some(entries) => parse_resources(&entries)?,
            None => default_resources(),
        };

        Ok(Self {
            pipeline_name: file
                .name
                .unwrap_or_else(|| DEFAULT_PIPELINE_NAME.to_string()),
            spotify: SpotifySettings {
                client_id,
                client_secret,
                playlist_id,
                api_base_url: file
                    .api_base_url
                    .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
                token_url: file
                    .token_url
                    .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
                page_limit,
                request_timeout_secs,
                retry,
            },
            warehouse_db_path,
            run_log_db_path,
            log_folder_path: file
                .log_folder_path
                .or_else(|| env.log_folder_path.clone()),
            resources,
        })
    }
}

/// Every resource, upserted.
pub fn default_resources() -> Vec<ResourcePlan> {
    Resource::LOAD_ORDER
        .iter()
        .map(|&resource| ResourcePlan {
            resource,
            strategy: LoadStrategy::Upsert,
        })
        .collect()
}

fn parse_resources(entries: &[ResourceConfig]) -> Result<Vec<ResourcePlan>> {
    if entries.is_empty() {
        bail!("at least one [[resources]] entry is required");
    }
    let mut seen = HashSet::new();
    let mut plans = Vec::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.name) {
            bail!("resource '{}' is declared more than once", entry.name);
        }
        plans.push(ResourcePlan {
            resource: entry.name,
            strategy: entry.strategy.unwrap_or_default(),
        });
    }
    Ok(plans)
}

/// Accepts `sqlite://<path>`, `sqlite:<path>` or a bare path.
pub fn parse_database_url(url: &str) -> Result<PathBuf> {
    let path = if let Some(rest) = url.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = url.strip_prefix("sqlite:") {
        rest
    } else if url.contains("://") {
        bail!("Unsupported database URL '{}': only sqlite is supported", url);
    } else {
        url
    };
    if path.is_empty() {
        bail!("Database URL '{}' has no path", url);
    }
    Ok(PathBuf::from(path))
}

/// `warehouse.db` -> `warehouse.runs.db`, next to the warehouse.
fn default_run_log_path(warehouse_db_path: &Path) -> PathBuf {
    warehouse_db_path.with_extension("runs.db")
}
