use crate::resource::Resource;
use crate::warehouse::LoadStrategy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Static pipeline declaration read from TOML. Every field is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub name: Option<String>,
    pub playlist_id: Option<String>,
    pub page_limit: Option<u32>,
    pub api_base_url: Option<String>,
    pub token_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    /// Directory that receives one log file per run.
    pub log_folder_path: Option<PathBuf>,

    pub retry: Option<RetryConfig>,
    pub resources: Option<Vec<ResourceConfig>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

/// One `[[resources]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct ResourceConfig {
    pub name: Resource,
    /// Defaults to upsert.
    #[serde(default)]
    pub strategy: Option<LoadStrategy>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_declaration() {
        let config = FileConfig::parse(
            r#"
            name = "spotify"
            playlist_id = "31FWVQBp3WQydWLNhO0ACi"
            page_limit = 50
            log_folder_path = "logs"

            [retry]
            max_attempts = 3
            backoff_multiplier = 1.5

            [[resources]]
            name = "tracks"
            strategy = "overwrite"

            [[resources]]
            name = "artists"
            "#,
        )
        .unwrap();

        assert_eq!(config.name.as_deref(), Some("spotify"));
        assert_eq!(config.page_limit, Some(50));
        assert_eq!(config.log_folder_path, Some(PathBuf::from("logs")));
        let retry = config.retry.unwrap();
        assert_eq!(retry.max_attempts, Some(3));
        assert_eq!(retry.initial_backoff_ms, None);
        let resources = config.resources.unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].name, Resource::Tracks);
        assert_eq!(resources[0].strategy, Some(LoadStrategy::Overwrite));
        assert_eq!(resources[1].name, Resource::Artists);
        assert_eq!(resources[1].strategy, None);
    }

    #[test]
    fn test_unknown_resource_or_strategy_is_rejected() {
        let err = FileConfig::parse("[[resources]]\nname = \"playlists\"\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("playlists"));

        let err = FileConfig::parse(
            r#"
            [[resources]]
            name = "albums"
            strategy = "merge"
            "#,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("merge"));
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = FileConfig::parse("").unwrap();
        assert!(config.name.is_none());
        assert!(config.resources.is_none());
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "page_limit = \"many\"").unwrap();

        let err = format!("{:#}", FileConfig::load(&path).unwrap_err());
        assert!(err.contains("pipeline.toml"));
    }
}
