//! Upstream forecast sources

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One of the three upstream forecast providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// NOAA model soundings (GFS forecast profiles)
    Noaa,
    /// Israel Meteorological Service station forecasts
    Ims,
    /// University of Wyoming radiosonde archive
    Uwyo,
}

impl SourceKind {
    /// All sources, in the order a full run processes them
    pub const ALL: [Self; 3] = [Self::Noaa, Self::Ims, Self::Uwyo];

    /// Name used in artifact file names and the digest
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Noaa => "noaa",
            Self::Ims => "ims",
            Self::Uwyo => "uwyo",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which sources a run processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceSelection {
    /// Full refresh: every source in fixed order
    #[default]
    All,
    Only(SourceKind),
}

impl SourceSelection {
    /// Selected sources in processing order
    #[must_use]
    pub fn sources(self) -> Vec<SourceKind> {
        match self {
            Self::All => SourceKind::ALL.to_vec(),
            Self::Only(source) => vec![source],
        }
    }
}

impl From<Option<SourceKind>> for SourceSelection {
    fn from(value: Option<SourceKind>) -> Self {
        value.map_or(Self::All, Self::Only)
    }
}
