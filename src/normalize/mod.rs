//! JSON-to-tabular normalization.
//!
//! Pure functions: raw records in, flat rows out. Every row carries every
//! column of its table, with absent optional fields as explicit nulls, and the
//! primary keys of a batch are unique.

mod format;
mod row;
mod shapes;

pub use format::{
    encode_multi_valued, format_duration, parse_duration, split_multi_valued,
    MULTI_VALUE_DELIMITER,
};
pub use row::{NormalizedRow, Scalar};

use crate::resource::Resource;
use crate::spotify::{RawRecord, RecordShape};
use serde::de::DeserializeOwned;
use shapes::{AlbumShape, ArtistShape, PlaylistItemShape};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("record {index} has shape '{actual}', expected '{expected}'")]
    ShapeMismatch {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid {shape} record {index}: {message}")]
    InvalidRecord {
        shape: &'static str,
        index: usize,
        message: String,
    },

    #[error("{shape} record {index} has an empty '{field}'")]
    MissingField {
        shape: &'static str,
        index: usize,
        field: &'static str,
    },

    #[error("track {track_id} has negative duration {duration_ms} ms")]
    NegativeDuration { track_id: String, duration_ms: i64 },
}

/// Normalize a batch of raw records for `resource`.
pub fn normalize(
    resource: Resource,
    records: &[RawRecord],
) -> Result<Vec<NormalizedRow>, NormalizeError> {
    let expected = RecordShape::for_resource(resource);
    let mut rows = Vec::with_capacity(records.len());
    let mut seen_keys = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        if record.shape != expected {
            return Err(NormalizeError::ShapeMismatch {
                index,
                expected: expected.as_str(),
                actual: record.shape.as_str(),
            });
        }
        let (key, row) = match resource {
            Resource::Tracks => normalize_track(index, record)?,
            Resource::Albums => normalize_album(index, record)?,
            Resource::Artists => normalize_artist(index, record)?,
        };
        if seen_keys.insert(key.clone()) {
            rows.push(row);
        } else {
            debug!("Dropping repeated {} key {} at record {}", resource, key, index);
        }
    }

    Ok(rows)
}

fn decode<T: DeserializeOwned>(index: usize, record: &RawRecord) -> Result<T, NormalizeError> {
    T::deserialize(&record.body).map_err(|e| NormalizeError::InvalidRecord {
        shape: record.shape.as_str(),
        index,
        message: e.to_string(),
    })
}

fn require_key(
    shape: RecordShape,
    index: usize,
    field: &'static str,
    value: &str,
) -> Result<(), NormalizeError> {
    if value.trim().is_empty() {
        return Err(NormalizeError::MissingField {
            shape: shape.as_str(),
            index,
            field,
        });
    }
    Ok(())
}

fn normalize_track(
    index: usize,
    record: &RawRecord,
) -> Result<(String, NormalizedRow), NormalizeError> {
    let item: PlaylistItemShape = decode(index, record)?;
    let track = item.track;
    require_key(RecordShape::Track, index, "track.id", &track.id)?;
    require_key(RecordShape::Track, index, "track.album.id", &track.album.id)?;

    let duration_ms = match track.duration_ms {
        Some(ms) if ms < 0 => {
            return Err(NormalizeError::NegativeDuration {
                track_id: track.id,
                duration_ms: ms,
            })
        }
        other => other,
    };
    let artist_ids = track.artists.as_deref().and_then(|artists| {
        let ids: Vec<&str> = artists
            .iter()
            .filter_map(|a| a.as_ref()?.id.as_deref())
            .filter(|id| !id.trim().is_empty())
            .collect();
        if ids.len() < artists.len() {
            warn!(
                "Track {} lists {} artist(s) without an id, leaving them out of artist_id",
                track.id,
                artists.len() - ids.len()
            );
        }
        encode_multi_valued(ids)
    });

    let row = NormalizedRow::new()
        .with("track_id", track.id.clone())
        .with("track_name", track.name)
        .with("track_popularity", track.popularity)
        .with("track_duration_ms", duration_ms)
        .with(
            "track_duration",
            duration_ms.map(|ms| format_duration(ms as u64)),
        )
        .with("track_added_at", item.added_at)
        .with("album_id", track.album.id)
        .with("artist_id", artist_ids)
        .with("playlist_id", item.playlist.id)
        .with("playlist_name", item.playlist.name)
        .with("snapshot_id", item.playlist.snapshot_id);
    Ok((track.id, row))
}

fn normalize_album(
    index: usize,
    record: &RawRecord,
) -> Result<(String, NormalizedRow), NormalizeError> {
    let album: AlbumShape = decode(index, record)?;
    require_key(RecordShape::Album, index, "id", &album.id)?;

    let row = NormalizedRow::new()
        .with("album_id", album.id.clone())
        .with("album_name", album.name)
        .with("album_release_date", album.release_date)
        .with("album_total_tracks", album.total_tracks);
    Ok((album.id, row))
}

fn normalize_artist(
    index: usize,
    record: &RawRecord,
) -> Result<(String, NormalizedRow), NormalizeError> {
    let artist: ArtistShape = decode(index, record)?;
    require_key(RecordShape::Artist, index, "id", &artist.id)?;

    // An empty genre list is known-empty, not missing.
    let genres = artist.genres.map(|g| g.join(MULTI_VALUE_DELIMITER));

    let row = NormalizedRow::new()
        .with("artist_id", artist.id.clone())
        .with("artist_name", artist.name)
        .with("artist_genres", genres)
        .with("artist_popularity", artist.popularity);
    Ok((artist.id, row))
}
