use serde::{Deserialize, Serialize};

/// Kind of title as known to both the catalog site and the metadata provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Series,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
        }
    }

    /// Parse from the loose strings used in addon URLs ("movie", "series",
    /// "anime"). Unrecognized values default to series, which is what the
    /// catalog site mostly carries.
    pub fn from_request(s: &str) -> Self {
        match s {
            "movie" => Self::Movie,
            _ => Self::Series,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
