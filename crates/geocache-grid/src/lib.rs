//! Footprint -> cell decomposition over a hierarchical hex grid (spec.md §4.A).
//!
//! Built on `h3o`; coverage is computed with `PolyfillConfig` using
//! `ContainmentMode::Covers` so a polygon's coverage is always a subset of
//! the coverage of its bounding box at the same resolution.

use geocache_types::{clamp_resolution, BoundingBox, Cell};
use h3o::geom::{ContainmentMode, PolyfillConfig, ToCells};
use h3o::Resolution;

pub use geocache_types::EngineError;

/// Enumerate hex cells covering a bbox at `res`, sorted and deduplicated.
pub fn cells_for_bbox(bbox: &BoundingBox, res: u8) -> Result<Vec<Cell>, EngineError> {
    cells_for_geo_polygon(&bbox.to_geo_polygon(), res)
}

/// Enumerate hex cells covering a polygon at `res`, sorted and deduplicated.
/// Always a subset of `cells_for_bbox` at the same resolution, since the
/// polygon's bbox covers at least as much area.
pub fn cells_for_polygon(
    poly: &geo_types::MultiPolygon<f64>,
    res: u8,
) -> Result<Vec<Cell>, EngineError> {
    clamp_resolution(res)?;
    let mut out = Vec::new();
    for polygon in &poly.0 {
        out.extend(cells_for_geo_polygon(polygon, res)?);
    }
    out.sort();
    out.dedup();
    Ok(out)
}

fn cells_for_geo_polygon(poly: &geo_types::Polygon<f64>, res: u8) -> Result<Vec<Cell>, EngineError> {
    let resolution: Resolution = clamp_resolution(res)?;
    if poly.exterior().0.len() < 4 {
        return Ok(Vec::new());
    }

    let config = PolyfillConfig::new(resolution).containment_mode(ContainmentMode::Covers);

    let geom = match h3o::geom::Polygon::from_degrees(poly.clone()) {
        Ok(geom) => geom,
        // A degenerate / below-cell-size polygon yields an empty coverage,
        // not an error (spec.md §4.A).
        Err(_) => return Ok(Vec::new()),
    };

    let mut cells: Vec<Cell> = geom
        .to_cells(config)
        .map(Cell::from_index)
        .collect();
    cells.sort();
    cells.dedup();
    Ok(cells)
}

/// `r' <= cell.resolution()`, else an error.
pub fn parent(cell: Cell, target_res: u8) -> Result<Cell, EngineError> {
    cell.parent(target_res)
}

/// `r' >= cell.resolution()`, else an error.
pub fn children(cell: Cell, target_res: u8) -> Result<Vec<Cell>, EngineError> {
    cell.children(target_res)
}

/// Closed lon/lat ring used to build per-cell upstream queries.
pub fn boundary(cell: Cell) -> Vec<(f64, f64)> {
    cell.boundary()
}
