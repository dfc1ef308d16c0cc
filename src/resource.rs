use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A unit of extraction and load. Each resource maps to one data table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    // Declaration order is load order: tracks reference albums.
    Artists,
    Albums,
    Tracks,
}

impl Resource {
    pub const LOAD_ORDER: [Resource; 3] = [Resource::Artists, Resource::Albums, Resource::Tracks];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Artists => "artists",
            Resource::Albums => "albums",
            Resource::Tracks => "tracks",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "artists" => Ok(Resource::Artists),
            "albums" => Ok(Resource::Albums),
            "tracks" => Ok(Resource::Tracks),
            other => Err(format!(
                "unknown resource '{}', expected one of: artists, albums, tracks",
                other
            )),
        }
    }
}
