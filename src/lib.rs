//! Playlist ETL library
//!
//! Extracts a playlist and its albums and artists from the Spotify Web API,
//! normalizes them into flat rows and loads them into SQLite, recording every
//! run in a metadata log.

pub mod config;
pub mod normalize;
pub mod pipeline;
pub mod resource;
pub mod run_log;
pub mod spotify;
pub mod sqlite_persistence;
pub mod warehouse;

// Re-export commonly used types for convenience
pub use config::{AppConfig, EnvVars, FileConfig, ResourcePlan};
pub use pipeline::{OutcomeStatus, Pipeline, PipelineError, PipelineState, RunSummary};
pub use resource::Resource;
pub use run_log::SqliteRunLog;
pub use spotify::{Extractor, SpotifyClient};
pub use warehouse::{LoadStrategy, SqliteWarehouse};
