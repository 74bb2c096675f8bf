use std::fmt;

use serde::{Deserialize, Serialize};

/// Which step of the priority chain produced a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Local,
    DirectRemote,
    Catalog,
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceTier::Local => "local",
            SourceTier::DirectRemote => "direct",
            SourceTier::Catalog => "catalog",
        };
        f.write_str(name)
    }
}

/// A raster location that passed its open probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterHandle {
    pub location: String,
    pub tier: SourceTier,
    /// Cell count read during the probe.
    pub cell_count: u64,
}
