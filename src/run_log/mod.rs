mod capture;
mod models;
mod schema;
mod store;

pub use capture::LogCapture;
pub use models::{RunHandle, RunMetadata, RunStatus};
pub use schema::{PIPELINE_RUNS_TABLE, RUN_LOG_SCHEMA};
pub use store::{RunGuard, RunLogError, SqliteRunLog};
