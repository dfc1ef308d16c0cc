//! Warehouse table definitions.

use crate::resource::Resource;
use crate::sqlite_column;
use crate::sqlite_persistence::{ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema};

/// Checked at commit so `albums` can be overwritten inside one transaction.
/// Tracks left without their album by an overwrite are pruned in that same
/// transaction.
const ALBUM_FOREIGN_KEY: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "album_id",
    on_delete: ForeignKeyOnChange::NoAction,
    deferred: true,
};

pub const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("artist_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("artist_name", &SqlType::Text),
        sqlite_column!("artist_genres", &SqlType::Text),
        sqlite_column!("artist_popularity", &SqlType::Integer),
    ],
    indices: &[],
};

pub const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("album_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("album_name", &SqlType::Text),
        sqlite_column!("album_release_date", &SqlType::Text),
        sqlite_column!("album_total_tracks", &SqlType::Integer),
    ],
    indices: &[],
};

pub const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("track_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("track_name", &SqlType::Text),
        sqlite_column!("track_popularity", &SqlType::Integer),
        sqlite_column!("track_duration_ms", &SqlType::Integer),
        sqlite_column!("track_duration", &SqlType::Text),
        sqlite_column!("track_added_at", &SqlType::Text),
        sqlite_column!(
            "album_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ALBUM_FOREIGN_KEY)
        ),
        sqlite_column!("artist_id", &SqlType::Text),
        sqlite_column!("playlist_id", &SqlType::Text),
        sqlite_column!("playlist_name", &SqlType::Text),
        sqlite_column!("snapshot_id", &SqlType::Text),
    ],
    indices: &[
        ("idx_tracks_album", "album_id"),
        ("idx_tracks_playlist", "playlist_id"),
    ],
};

pub const WAREHOUSE_SCHEMA: VersionedSchema = VersionedSchema {
    version: 0,
    tables: &[ARTISTS_TABLE, ALBUMS_TABLE, TRACKS_TABLE],
};

/// A warehouse column whose foreign key points at another table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub table: &'static Table,
    pub column: &'static str,
    pub referenced_column: &'static str,
}

/// Columns of warehouse tables whose foreign key points at `table`.
pub fn references_to(table: &Table) -> Vec<Reference> {
    WAREHOUSE_SCHEMA
        .tables
        .iter()
        .flat_map(|dependent| {
            dependent.columns.iter().filter_map(move |column| {
                let foreign_key = column.foreign_key?;
                (foreign_key.foreign_table == table.name).then_some(Reference {
                    table: dependent,
                    column: column.name,
                    referenced_column: foreign_key.foreign_column,
                })
            })
        })
        .collect()
}

/// The table a resource loads into.
pub fn table_for(resource: Resource) -> &'static Table {
    match resource {
        Resource::Artists => &ARTISTS_TABLE,
        Resource::Albums => &ALBUMS_TABLE,
        Resource::Tracks => &TRACKS_TABLE,
    }
}
