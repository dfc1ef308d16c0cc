//! SQLite-backed warehouse holding the normalized playlist tables.

use super::load_strategy::LoadStrategy;
use super::schema::{
    references_to, ALBUMS_TABLE, ARTISTS_TABLE, TRACKS_TABLE, WAREHOUSE_SCHEMA,
};
use crate::normalize::{NormalizedRow, Scalar};
use crate::sqlite_persistence::{create_or_validate, Table};
use anyhow::{Context, Result};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

static NULL: Scalar = Scalar::Null;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("constraint violation on {table}: {message}")]
    ConstraintViolation { table: &'static str, message: String },

    #[error("row {index} does not match the columns of {table}: {message}")]
    ColumnMismatch {
        table: &'static str,
        index: usize,
        message: String,
    },

    #[error("refusing to overwrite {table} with an empty batch")]
    EmptyOverwrite { table: &'static str },

    #[error("sqlite error on {table}: {source}")]
    Sqlite {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl LoadError {
    fn from_sqlite(table: &'static str, err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                LoadError::ConstraintViolation {
                    table,
                    message: message.clone().unwrap_or_else(|| failure.to_string()),
                }
            }
            _ => LoadError::Sqlite { table, source: err },
        }
    }
}

pub struct SqliteWarehouse {
    conn: Mutex<Connection>,
}

impl SqliteWarehouse {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let mut conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open warehouse database {:?}", db_path))?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        create_or_validate(&mut conn, &WAREHOUSE_SCHEMA, "warehouse")
            .context("Failed to prepare warehouse schema")?;

        let warehouse = Self {
            conn: Mutex::new(conn),
        };
        info!(
            "Opened warehouse {:?}: {} artists, {} albums, {} tracks",
            db_path,
            warehouse.count(&ARTISTS_TABLE).unwrap_or(0),
            warehouse.count(&ALBUMS_TABLE).unwrap_or(0),
            warehouse.count(&TRACKS_TABLE).unwrap_or(0),
        );
        Ok(warehouse)
    }

    /// Load `rows` into `table` in a single transaction.
    ///
    /// Returns the number of rows written. On any error the table is left as
    /// it was before the call.
    ///
    /// An overwrite also deletes rows of other tables whose foreign key no
    /// longer resolves against the new contents.
    pub fn load(
        &self,
        table: &'static Table,
        rows: &[NormalizedRow],
        strategy: LoadStrategy,
    ) -> Result<usize, LoadError> {
        if strategy == LoadStrategy::Overwrite && rows.is_empty() {
            return Err(LoadError::EmptyOverwrite { table: table.name });
        }
        for (index, row) in rows.iter().enumerate() {
            check_columns(table, index, row)?;
        }

        let sql = statement_for(table, strategy);
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| LoadError::from_sqlite(table.name, e))?;

        if strategy == LoadStrategy::Overwrite {
            let deleted = tx
                .execute(&format!("DELETE FROM {}", table.name), [])
                .map_err(|e| LoadError::from_sqlite(table.name, e))?;
            debug!("Cleared {} rows from {}", deleted, table.name);
        }

        let mut written = 0;
        {
            let mut stmt = tx
                .prepare(&sql)
                .map_err(|e| LoadError::from_sqlite(table.name, e))?;
            for row in rows {
                let values = table
                    .column_names()
                    .map(|column| row.get(column).unwrap_or(&NULL));
                written += stmt
                    .execute(params_from_iter(values))
                    .map_err(|e| LoadError::from_sqlite(table.name, e))?;
            }
        }

        if strategy == LoadStrategy::Overwrite {
            for reference in references_to(table) {
                let pruned = tx
                    .execute(
                        &format!(
                            "DELETE FROM {dependent} WHERE {column} IS NOT NULL \
                             AND {column} NOT IN (SELECT {referenced} FROM {parent})",
                            dependent = reference.table.name,
                            column = reference.column,
                            referenced = reference.referenced_column,
                            parent = table.name,
                        ),
                        [],
                    )
                    .map_err(|e| LoadError::from_sqlite(reference.table.name, e))?;
                if pruned > 0 {
                    info!(
                        "Pruned {} {} rows whose {} is no longer in {}",
                        pruned, reference.table.name, reference.column, table.name
                    );
                }
            }
        }

        tx.commit().map_err(|e| LoadError::from_sqlite(table.name, e))?;
        debug!("Loaded {} rows into {} with {}", written, table.name, strategy);
        Ok(written)
    }

    /// All rows of `table`, ordered by primary key.
    pub fn select_all(&self, table: &'static Table) -> Result<Vec<NormalizedRow>, LoadError> {
        let columns: Vec<&'static str> = table.column_names().collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            table.name,
            table.primary_key()
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LoadError::from_sqlite(table.name, e))?;
        let rows = stmt
            .query_map([], |r| {
                let mut row = NormalizedRow::new();
                for (i, column) in columns.iter().enumerate() {
                    row.set(*column, r.get::<_, Scalar>(i)?);
                }
                Ok(row)
            })
            .map_err(|e| LoadError::from_sqlite(table.name, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LoadError::from_sqlite(table.name, e))?;
        Ok(rows)
    }

    pub fn count(&self, table: &'static Table) -> Result<usize, LoadError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.name), [], |r| {
                r.get(0)
            })
            .map_err(|e| LoadError::from_sqlite(table.name, e))?;
        Ok(count as usize)
    }
}

fn check_columns(
    table: &'static Table,
    index: usize,
    row: &NormalizedRow,
) -> Result<(), LoadError> {
    if let Some(unknown) = row.columns().find(|c| !table.has_column(c)) {
        return Err(LoadError::ColumnMismatch {
            table: table.name,
            index,
            message: format!("unknown column '{}'", unknown),
        });
    }
    if let Some(missing) = table.column_names().find(|c| row.get(c).is_none()) {
        return Err(LoadError::ColumnMismatch {
            table: table.name,
            index,
            message: format!("missing column '{}'", missing),
        });
    }
    let primary_key = table.primary_key();
    if row.get(primary_key).map_or(true, Scalar::is_null) {
        return Err(LoadError::ColumnMismatch {
            table: table.name,
            index,
            message: format!("null primary key '{}'", primary_key),
        });
    }
    Ok(())
}

fn statement_for(table: &Table, strategy: LoadStrategy) -> String {
    let columns: Vec<&str> = table.column_names().collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        columns.join(", "),
        placeholders.join(", ")
    );

    if strategy == LoadStrategy::Upsert {
        let primary_key = table.primary_key();
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| **c != primary_key)
            .map(|c| format!("{0} = excluded.{0}", c))
            .collect();
        sql.push_str(&format!(
            " ON CONFLICT({}) DO UPDATE SET {}",
            primary_key,
            updates.join(", ")
        ));
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_warehouse() -> (TempDir, SqliteWarehouse) {
        let dir = TempDir::new().unwrap();
        let warehouse = SqliteWarehouse::open(dir.path().join("warehouse.db")).unwrap();
        (dir, warehouse)
    }

    fn album(id: &str, name: &str) -> NormalizedRow {
        NormalizedRow::new()
            .with("album_id", id)
            .with("album_name", name)
            .with("album_release_date", Some("2023-01-01".to_string()))
            .with("album_total_tracks", Some(10i64))
    }

    fn track(id: &str, album_id: &str) -> NormalizedRow {
        NormalizedRow::new()
            .with("track_id", id)
            .with("track_name", Some(format!("Track {}", id)))
            .with("track_popularity", Some(50i64))
            .with("track_duration_ms", Some(221_000i64))
            .with("track_duration", "3:41")
            .with("track_added_at", None::<String>)
            .with("album_id", album_id)
            .with("artist_id", "artist1, artist2")
            .with("playlist_id", "playlist123")
            .with("playlist_name", "Test Playlist")
            .with("snapshot_id", "snapshot123")
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let (_dir, warehouse) = open_warehouse();
        let batch = vec![album("a1", "One"), album("a2", "Two")];

        assert_eq!(
            warehouse
                .load(&ALBUMS_TABLE, &batch, LoadStrategy::Upsert)
                .unwrap(),
            2
        );
        let first = warehouse.select_all(&ALBUMS_TABLE).unwrap();
        warehouse
            .load(&ALBUMS_TABLE, &batch, LoadStrategy::Upsert)
            .unwrap();

        assert_eq!(warehouse.count(&ALBUMS_TABLE).unwrap(), 2);
        assert_eq!(warehouse.select_all(&ALBUMS_TABLE).unwrap(), first);
    }

    #[test]
    fn test_upsert_replaces_non_key_columns() {
        let (_dir, warehouse) = open_warehouse();
        warehouse
            .load(&ALBUMS_TABLE, &[album("a1", "Old")], LoadStrategy::Upsert)
            .unwrap();
        warehouse
            .load(&ALBUMS_TABLE, &[album("a1", "New")], LoadStrategy::Upsert)
            .unwrap();

        let rows = warehouse.select_all(&ALBUMS_TABLE).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("album_name").and_then(Scalar::as_str), Some("New"));
    }

    #[test]
    fn test_insert_collision_rolls_back_whole_batch() {
        let (_dir, warehouse) = open_warehouse();
        warehouse
            .load(&ALBUMS_TABLE, &[album("a1", "One")], LoadStrategy::Insert)
            .unwrap();

        let result = warehouse.load(
            &ALBUMS_TABLE,
            &[album("a2", "Two"), album("a1", "Again")],
            LoadStrategy::Insert,
        );

        assert!(matches!(
            result,
            Err(LoadError::ConstraintViolation { table: "albums", .. })
        ));
        assert_eq!(warehouse.count(&ALBUMS_TABLE).unwrap(), 1);
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let (_dir, warehouse) = open_warehouse();
        warehouse
            .load(
                &ALBUMS_TABLE,
                &[album("a1", "One"), album("a2", "Two")],
                LoadStrategy::Upsert,
            )
            .unwrap();

        warehouse
            .load(&ALBUMS_TABLE, &[album("a3", "Three")], LoadStrategy::Overwrite)
            .unwrap();

        let rows = warehouse.select_all(&ALBUMS_TABLE).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("album_id").and_then(Scalar::as_str), Some("a3"));
    }

    #[test]
    fn test_empty_overwrite_keeps_prior_contents() {
        let (_dir, warehouse) = open_warehouse();
        warehouse
            .load(&ALBUMS_TABLE, &[album("a1", "One")], LoadStrategy::Upsert)
            .unwrap();

        let result = warehouse.load(&ALBUMS_TABLE, &[], LoadStrategy::Overwrite);

        assert!(matches!(result, Err(LoadError::EmptyOverwrite { .. })));
        assert_eq!(warehouse.count(&ALBUMS_TABLE).unwrap(), 1);
    }

    #[test]
    fn test_album_overwrite_keeps_tracks_of_reloaded_albums() {
        let (_dir, warehouse) = open_warehouse();
        warehouse
            .load(&ALBUMS_TABLE, &[album("a1", "One")], LoadStrategy::Upsert)
            .unwrap();
        warehouse
            .load(&TRACKS_TABLE, &[track("t1", "a1")], LoadStrategy::Upsert)
            .unwrap();

        // The referenced album is deleted and re-inserted in one transaction.
        warehouse
            .load(
                &ALBUMS_TABLE,
                &[album("a1", "One again"), album("a2", "Two")],
                LoadStrategy::Overwrite,
            )
            .unwrap();

        assert_eq!(warehouse.count(&ALBUMS_TABLE).unwrap(), 2);
        assert_eq!(warehouse.count(&TRACKS_TABLE).unwrap(), 1);
    }

    #[test]
    fn test_album_overwrite_prunes_tracks_of_dropped_albums() {
        let (_dir, warehouse) = open_warehouse();
        warehouse
            .load(
                &ALBUMS_TABLE,
                &[album("a1", "One"), album("a2", "Two")],
                LoadStrategy::Upsert,
            )
            .unwrap();
        warehouse
            .load(
                &TRACKS_TABLE,
                &[track("t1", "a1"), track("t2", "a2"), track("t3", "a1")],
                LoadStrategy::Upsert,
            )
            .unwrap();

        let written = warehouse
            .load(&ALBUMS_TABLE, &[album("a2", "Two")], LoadStrategy::Overwrite)
            .unwrap();

        assert_eq!(written, 1);
        let albums = warehouse.select_all(&ALBUMS_TABLE).unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].get("album_id").and_then(Scalar::as_str), Some("a2"));
        let tracks = warehouse.select_all(&TRACKS_TABLE).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].get("track_id").and_then(Scalar::as_str), Some("t2"));
    }

    #[test]
    fn test_failed_upsert_rolls_back_whole_batch() {
        let (_dir, warehouse) = open_warehouse();
        warehouse
            .load(&ALBUMS_TABLE, &[album("a1", "One")], LoadStrategy::Upsert)
            .unwrap();
        let existing = track("t1", "a1").with("track_name", "First take");
        warehouse
            .load(&TRACKS_TABLE, &[existing], LoadStrategy::Upsert)
            .unwrap();

        // t1 and t2 are valid; t3 points at an album that does not exist.
        let batch = vec![
            track("t1", "a1").with("track_name", "Renamed"),
            track("t2", "a1"),
            track("t3", "missing"),
        ];
        let result = warehouse.load(&TRACKS_TABLE, &batch, LoadStrategy::Upsert);

        assert!(matches!(
            result,
            Err(LoadError::ConstraintViolation { table: "tracks", .. })
        ));
        let tracks = warehouse.select_all(&TRACKS_TABLE).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].get("track_id").and_then(Scalar::as_str), Some("t1"));
        assert_eq!(
            tracks[0].get("track_name").and_then(Scalar::as_str),
            Some("First take")
        );
    }

    #[test]
    fn test_track_with_unknown_album_is_rejected() {
        let (_dir, warehouse) = open_warehouse();
        let result = warehouse.load(&TRACKS_TABLE, &[track("t1", "nope")], LoadStrategy::Insert);

        assert!(matches!(result, Err(LoadError::ConstraintViolation { .. })));
        assert_eq!(warehouse.count(&TRACKS_TABLE).unwrap(), 0);
    }

    #[test]
    fn test_column_mismatch_is_rejected_before_writing() {
        let (_dir, warehouse) = open_warehouse();
        let bad = album("a2", "Two").with("album_label", "x");

        let result = warehouse.load(
            &ALBUMS_TABLE,
            &[album("a1", "One"), bad],
            LoadStrategy::Upsert,
        );

        assert!(matches!(
            result,
            Err(LoadError::ColumnMismatch { index: 1, .. })
        ));
        assert_eq!(warehouse.count(&ALBUMS_TABLE).unwrap(), 0);

        let missing = NormalizedRow::new().with("album_id", "a3");
        assert!(matches!(
            warehouse.load(&ALBUMS_TABLE, &[missing], LoadStrategy::Upsert),
            Err(LoadError::ColumnMismatch { .. })
        ));
    }
}
