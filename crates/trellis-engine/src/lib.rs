//! trellis-engine - Population engine for Trellis
//!
//! Orchestrates when and in what order derived tables are computed:
//! resolves eligible keys from upstream state, invokes registered
//! computations, commits results with per-key atomicity, tracks
//! provenance, and cascades deletions. All coordination between
//! cooperating workers happens through the store's constraints; the
//! engine holds no cross-process state.

pub mod cascade;
pub mod compute;
pub mod error;
pub mod key_source;
pub mod lineage;
pub mod populate;
pub mod reserve;

pub use cascade::{delete, DeleteReport};
pub use compute::{Compute, ComputeError, ComputeRegistry, ParentData};
pub use error::{EngineError, EngineResult};
pub use key_source::KeySource;
pub use lineage::{AttemptStatus, PopulationRecord};
pub use populate::{
    population_status, KeyPredicate, PopulateOptions, PopulateSummary, PopulationEngine,
    TableProgress,
};
