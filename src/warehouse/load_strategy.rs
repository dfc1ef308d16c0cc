use serde::{Deserialize, Serialize};
use std::fmt;

/// How a batch is merged into its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    /// Append; any primary key collision fails the batch.
    Insert,
    /// Insert new keys, replace non-key columns of existing ones.
    Upsert,
    /// Replace the whole table with the batch.
    Overwrite,
}

impl LoadStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStrategy::Insert => "insert",
            LoadStrategy::Upsert => "upsert",
            LoadStrategy::Overwrite => "overwrite",
        }
    }
}

impl Default for LoadStrategy {
    fn default() -> Self {
        LoadStrategy::Upsert
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
