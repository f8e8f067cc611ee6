use serde::{Deserialize, Serialize};
use std::fmt;

/// Provenance of a statistic. `All` is a query-only sentinel — nothing is
/// ever stored with that source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Registry,
    Community,
    All,
}

impl Source {
    /// The literal column value used when this source is persisted. `All`
    /// never reaches a store write, so it has no storage representation.
    pub fn storage_str(self) -> &'static str {
        match self {
            Source::Registry => "REGISTRY",
            Source::Community => "COMMUNITY",
            Source::All => "ALL",
        }
    }

    pub fn from_storage_str(s: &str) -> Option<Self> {
        match s {
            "REGISTRY" => Some(Source::Registry),
            "COMMUNITY" => Some(Source::Community),
            "ALL" => Some(Source::All),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_str())
    }
}

impl Default for Source {
    fn default() -> Self {
        Source::Registry
    }
}
