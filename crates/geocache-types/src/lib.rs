//! Shared domain types for the geospatial cache engine.
//!
//! These types carry no behavior beyond validating their own invariants;
//! the components that operate on them live in sibling crates.

mod bbox;
mod cell;
mod diagnostics;
mod error;
mod filter;
mod geojson;
mod hotness;
mod invalidated_at;
mod scenario;
mod shard;

pub use bbox::BoundingBox;
pub use cell::{clamp_resolution, Cell, Resolution, MAX_RESOLUTION, MIN_RESOLUTION};
pub use diagnostics::{Diagnostics, HitClass};
pub use error::EngineError;
pub use filter::{Filter, FilterFingerprint};
pub use geojson::{Feature, FeatureCollection, FeatureId, FeatureKind, Geometry};
pub use hotness::HotnessEntry;
pub use invalidated_at::LayerInvalidatedAt;
pub use scenario::Scenario;
pub use shard::{Shard, ShardKey, ShardMeta};

/// `EPSG:4326`, the only SRID the engine accepts.
pub const SRID_4326: &str = "EPSG:4326";
