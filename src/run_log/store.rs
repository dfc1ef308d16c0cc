//! Durable record of pipeline runs.
//!
//! Every run gets a `running` row before extraction starts and exactly one
//! terminal update at the end. A process that dies mid-run leaves its row in
//! `running`, which is how crashed runs are found.
//!
//! With a [`LogCapture`] attached, the log lines emitted while a guarded run
//! is open are stored in its `logs` column and, when a log folder is set,
//! written to one file per run.

use super::capture::LogCapture;
use super::models::{RunHandle, RunMetadata, RunStatus};
use super::schema::RUN_LOG_SCHEMA;
use crate::resource::Resource;
use crate::sqlite_persistence::create_or_validate;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("run {0} is not running")]
    NotRunning(i64),

    #[error("cannot end a run with non-terminal status '{0}'")]
    NonTerminalStatus(RunStatus),

    #[error("failed to encode run config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("run log sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

const RUN_COLUMNS: &str = "run_id, pipeline_name, resource, started_at, ended_at, status, \
     rows_extracted, rows_loaded, error_message, config, logs";

pub struct SqliteRunLog {
    conn: Mutex<Connection>,
    capture: Option<LogCapture>,
    log_folder: Option<PathBuf>,
}

impl SqliteRunLog {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let mut conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open run log database {:?}", db_path))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        create_or_validate(&mut conn, &RUN_LOG_SCHEMA, "run log")
            .context("Failed to prepare run log schema")?;

        let running: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pipeline_runs WHERE status = 'running'",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        if running > 0 {
            info!(
                "Run log {:?} has {} run(s) still marked running from earlier invocations",
                db_path, running
            );
        }

        Ok(Self {
            conn: Mutex::new(conn),
            capture: None,
            log_folder: None,
        })
    }

    /// Store the log lines of each guarded run with the run.
    pub fn with_log_capture(mut self, capture: LogCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Also write the captured lines of each run to a file in `folder`.
    pub fn with_log_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.log_folder = Some(folder.into());
        self
    }

    /// Durably record a new `running` run.
    pub fn start_run(
        &self,
        pipeline_name: &str,
        resource: Resource,
        config: &serde_json::Value,
    ) -> Result<RunHandle, RunLogError> {
        let config = serde_json::to_string(config)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pipeline_runs (pipeline_name, resource, started_at, status, \
             rows_extracted, rows_loaded, config) VALUES (?1, ?2, ?3, ?4, 0, 0, ?5)",
            params![
                pipeline_name,
                resource.as_str(),
                chrono::Utc::now().timestamp(),
                RunStatus::Running.as_str(),
                config,
            ],
        )?;
        let run_id = conn.last_insert_rowid();
        info!(run_id, resource = %resource, "Started run");
        Ok(RunHandle { run_id, resource })
    }

    /// Record the final outcome of a run. Consumes the handle.
    pub fn end_run(
        &self,
        handle: RunHandle,
        status: RunStatus,
        rows_extracted: u64,
        rows_loaded: u64,
        error_message: Option<&str>,
        logs: Option<&str>,
    ) -> Result<(), RunLogError> {
        if !status.is_terminal() {
            return Err(RunLogError::NonTerminalStatus(status));
        }
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE pipeline_runs SET ended_at = ?1, status = ?2, rows_extracted = ?3, \
             rows_loaded = ?4, error_message = ?5, logs = ?6 \
             WHERE run_id = ?7 AND status = 'running'",
            params![
                chrono::Utc::now().timestamp(),
                status.as_str(),
                rows_extracted as i64,
                rows_loaded as i64,
                error_message,
                logs,
                handle.run_id,
            ],
        )?;
        if updated == 0 {
            return Err(RunLogError::NotRunning(handle.run_id));
        }
        info!(
            run_id = handle.run_id,
            resource = %handle.resource,
            status = %status,
            rows_extracted,
            rows_loaded,
            "Ended run"
        );
        Ok(())
    }

    /// Start a run wrapped in a guard that records `failure` if dropped unfinished.
    pub fn guard(
        &self,
        pipeline_name: &str,
        resource: Resource,
        config: &serde_json::Value,
    ) -> Result<RunGuard<'_>, RunLogError> {
        if let Some(capture) = &self.capture {
            capture.begin();
        }
        let handle = match self.start_run(pipeline_name, resource, config) {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(capture) = &self.capture {
                    capture.take();
                }
                return Err(e);
            }
        };
        Ok(RunGuard {
            log: self,
            pipeline_name: pipeline_name.to_string(),
            handle: Some(handle),
            rows_extracted: 0,
            rows_loaded: 0,
        })
    }

    fn take_captured_logs(&self) -> Option<String> {
        self.capture.as_ref().and_then(LogCapture::take)
    }

    fn write_log_file(&self, pipeline_name: &str, handle: &RunHandle, logs: &str) {
        let Some(folder) = &self.log_folder else {
            return;
        };
        let file_name = format!(
            "{}_{}_{}.log",
            file_safe(pipeline_name),
            handle.resource,
            handle.run_id
        );
        let path = folder.join(file_name);
        let written = std::fs::create_dir_all(folder).and_then(|_| std::fs::write(&path, logs));
        if let Err(e) = written {
            warn!("Failed to write run log file {:?}: {}", path, e);
        }
    }

    pub fn get_run(&self, run_id: i64) -> Result<Option<RunMetadata>, RunLogError> {
        let conn = self.conn.lock().unwrap();
        let run = conn
            .query_row(
                &format!("SELECT {} FROM pipeline_runs WHERE run_id = ?1", RUN_COLUMNS),
                params![run_id],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Runs oldest first, optionally restricted to one resource.
    pub fn list_runs(&self, resource: Option<Resource>) -> Result<Vec<RunMetadata>, RunLogError> {
        let conn = self.conn.lock().unwrap();
        let runs = match resource {
            Some(resource) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM pipeline_runs WHERE resource = ?1 ORDER BY run_id",
                    RUN_COLUMNS
                ))?;
                let runs = stmt
                    .query_map(params![resource.as_str()], row_to_run)?
                    .collect::<Result<Vec<_>, _>>()?;
                runs
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM pipeline_runs ORDER BY run_id",
                    RUN_COLUMNS
                ))?;
                let runs = stmt
                    .query_map([], row_to_run)?
                    .collect::<Result<Vec<_>, _>>()?;
                runs
            }
        };
        Ok(runs)
    }

    pub fn latest_run(&self, resource: Resource) -> Result<Option<RunMetadata>, RunLogError> {
        let conn = self.conn.lock().unwrap();
        let run = conn
            .query_row(
                &format!(
                    "SELECT {} FROM pipeline_runs WHERE resource = ?1 ORDER BY run_id DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                params![resource.as_str()],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn row_to_run(row: &Row) -> rusqlite::Result<RunMetadata> {
    let resource: String = row.get(2)?;
    let status: String = row.get(5)?;
    let config: String = row.get(9)?;
    Ok(RunMetadata {
        run_id: row.get(0)?,
        pipeline_name: row.get(1)?,
        resource: Resource::from_str(&resource).map_err(|e| conversion_error(2, e))?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        status: RunStatus::from_str(&status)
            .ok_or_else(|| conversion_error(5, format!("unknown run status '{}'", status)))?,
        rows_extracted: row.get::<_, i64>(6)? as u64,
        rows_loaded: row.get::<_, i64>(7)? as u64,
        error_message: row.get(8)?,
        config: serde_json::from_str(&config).map_err(|e| conversion_error(9, e.to_string()))?,
        logs: row.get(10)?,
    })
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Scoped ownership of a running run.
///
/// `succeed` and `fail` record the real outcome. Dropping the guard without
/// either, including during a panic unwind, records `failure` with the
/// counts seen so far.
pub struct RunGuard<'a> {
    log: &'a SqliteRunLog,
    pipeline_name: String,
    handle: Option<RunHandle>,
    rows_extracted: u64,
    rows_loaded: u64,
}

impl RunGuard<'_> {
    pub fn run_id(&self) -> Option<i64> {
        self.handle.as_ref().map(RunHandle::run_id)
    }

    pub fn rows_extracted(&self) -> u64 {
        self.rows_extracted
    }

    pub fn rows_loaded(&self) -> u64 {
        self.rows_loaded
    }

    pub fn set_rows_extracted(&mut self, rows: u64) {
        self.rows_extracted = rows;
    }

    pub fn set_rows_loaded(&mut self, rows: u64) {
        self.rows_loaded = rows;
    }

    pub fn succeed(mut self) -> Result<(), RunLogError> {
        self.finish(RunStatus::Success, None)
    }

    pub fn fail(mut self, error_message: &str) -> Result<(), RunLogError> {
        self.finish(RunStatus::Failure, Some(error_message))
    }

    fn finish(
        &mut self,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<(), RunLogError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let logs = self.log.take_captured_logs();
        if let Some(logs) = &logs {
            self.log.write_log_file(&self.pipeline_name, &handle, logs);
        }
        self.log.end_run(
            handle,
            status,
            self.rows_extracted,
            self.rows_loaded,
            error_message,
            logs.as_deref(),
        )
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        let message = if std::thread::panicking() {
            "run aborted by a panic"
        } else {
            "run ended without recording an outcome"
        };
        if let Err(e) = self.finish(RunStatus::Failure, Some(message)) {
            error!("Failed to record abandoned run as failed: {}", e);
        }
    }
}
