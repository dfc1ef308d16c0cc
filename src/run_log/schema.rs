use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

pub const PIPELINE_RUNS_TABLE: Table = Table {
    name: "pipeline_runs",
    columns: &[
        sqlite_column!("run_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("pipeline_name", &SqlType::Text, non_null = true),
        sqlite_column!("resource", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Integer, non_null = true),
        sqlite_column!("ended_at", &SqlType::Integer),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("rows_extracted", &SqlType::Integer, non_null = true),
        sqlite_column!("rows_loaded", &SqlType::Integer, non_null = true),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("config", &SqlType::Text, non_null = true),
        sqlite_column!("logs", &SqlType::Text),
    ],
    indices: &[
        ("idx_pipeline_runs_resource", "resource"),
        ("idx_pipeline_runs_status", "status"),
    ],
};

pub const RUN_LOG_SCHEMA: VersionedSchema = VersionedSchema {
    version: 0,
    tables: &[PIPELINE_RUNS_TABLE],
};
