use crate::resource::Resource;
use serde_json::Value;

/// Which resource shape a raw record claims to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    /// A playlist item (`added_at` + nested `track`) tagged with its playlist.
    Track,
    /// A simplified album object nested in a track.
    Album,
    /// A full artist object.
    Artist,
}

impl RecordShape {
    pub fn for_resource(resource: Resource) -> Self {
        match resource {
            Resource::Artists => RecordShape::Artist,
            Resource::Albums => RecordShape::Album,
            Resource::Tracks => RecordShape::Track,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordShape::Track => "track",
            RecordShape::Album => "album",
            RecordShape::Artist => "artist",
        }
    }
}

/// A nested API record, as returned by the upstream service.
///
/// The body is kept as JSON; it is validated against `shape` when normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub shape: RecordShape,
    pub body: Value,
}

impl RawRecord {
    pub fn new(shape: RecordShape, body: Value) -> Self {
        Self { shape, body }
    }
}
