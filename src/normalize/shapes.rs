//! Typed views of the raw record shapes.
//!
//! Required fields are plain types so deserialization fails loudly when they
//! are absent. Optional fields become explicit nulls downstream.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct PlaylistItemShape {
    pub added_at: Option<String>,
    pub track: TrackShape,
    pub playlist: PlaylistShape,
}

#[derive(Debug, Deserialize)]
pub(super) struct PlaylistShape {
    pub id: String,
    pub name: Option<String>,
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TrackShape {
    pub id: String,
    pub name: Option<String>,
    pub popularity: Option<i64>,
    pub duration_ms: Option<i64>,
    pub album: AlbumRefShape,
    /// Absent, null, or a list that may itself hold null entries.
    pub artists: Option<Vec<Option<ArtistRefShape>>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AlbumRefShape {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ArtistRefShape {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AlbumShape {
    pub id: String,
    pub name: Option<String>,
    pub release_date: Option<String>,
    pub total_tracks: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ArtistShape {
    pub id: String,
    pub name: Option<String>,
    pub genres: Option<Vec<String>>,
    pub popularity: Option<i64>,
}
