//! Table tiers: how a table's data originates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a table by how its rows come into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Rows entered by hand.
    Manual,
    /// Static reference data.
    Lookup,
    /// Rows ingested from external acquisition systems.
    Imported,
    /// Rows derived from upstream tables by a registered computation.
    Computed,
}

impl Tier {
    /// Tiers whose rows are produced by the population engine.
    ///
    /// `Manual` and `Lookup` tables are entry points; the engine never
    /// writes to them.
    pub fn is_auto_populated(self) -> bool {
        matches!(self, Tier::Imported | Tier::Computed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Manual => "manual",
            Tier::Lookup => "lookup",
            Tier::Imported => "imported",
            Tier::Computed => "computed",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
