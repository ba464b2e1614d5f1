use geocache_types::{BoundingBox, Cell};

/// `{layer, h3Cells[], resolutions[]?, version, ts, op}` (spec.md §4.G).
#[derive(Debug, Clone)]
pub struct WireEvent {
    pub layer: String,
    pub h3_cells: Vec<Cell>,
    pub resolutions: Option<Vec<u8>>,
    pub version: u64,
    pub ts: i64,
    pub op: String,
}

#[derive(Debug, Clone)]
pub enum Footprint {
    BoundingBox(BoundingBox),
    Polygon(geo_types::MultiPolygon<f64>),
}

/// `{layer, op, ts, bbox | geometry}` (spec.md §4.G).
#[derive(Debug, Clone)]
pub struct SpatialEvent {
    pub layer: String,
    pub op: String,
    pub ts: i64,
    pub footprint: Footprint,
}

#[derive(Debug, Clone)]
pub enum InvalidationEvent {
    Wire(WireEvent),
    Spatial(SpatialEvent),
}
