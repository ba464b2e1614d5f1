use geocache_types::Geometry;
use sha2::{Digest, Sha256};

fn round(v: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (v * factor).round() / factor
}

fn round_coord(c: [f64; 2], precision: u32) -> [f64; 2] {
    [round(c[0], precision), round(c[1], precision)]
}

/// Signed area via the shoelace formula; positive means counterclockwise
/// under a standard (x right, y up) axis convention.
fn signed_area(ring: &[[f64; 2]]) -> f64 {
    let mut sum = 0.0;
    for window in ring.windows(2) {
        let [x1, y1] = window[0];
        let [x2, y2] = window[1];
        sum += x1 * y2 - x2 * y1;
    }
    sum / 2.0
}

fn ensure_orientation(mut ring: Vec<[f64; 2]>, ccw: bool) -> Vec<[f64; 2]> {
    let is_ccw = signed_area(&ring) > 0.0;
    if is_ccw != ccw {
        ring.reverse();
    }
    ring
}

fn ring_key(ring: &[[f64; 2]]) -> String {
    serde_json::to_string(ring).unwrap_or_default()
}

fn canonicalize_polygon_rings(rings: Vec<Vec<[f64; 2]>>, precision: u32) -> Vec<Vec<[f64; 2]>> {
    let mut out = Vec::with_capacity(rings.len());
    for (idx, ring) in rings.into_iter().enumerate() {
        let rounded: Vec<[f64; 2]> = ring.into_iter().map(|c| round_coord(c, precision)).collect();
        // outer ring (index 0) is CCW, holes are CW.
        out.push(ensure_orientation(rounded, idx == 0));
    }
    out
}

fn canonicalize(geometry: &Geometry, precision: u32) -> Geometry {
    match geometry {
        Geometry::Point { coordinates } => Geometry::Point {
            coordinates: round_coord(*coordinates, precision),
        },
        Geometry::LineString { coordinates } => Geometry::LineString {
            coordinates: coordinates.iter().map(|c| round_coord(*c, precision)).collect(),
        },
        Geometry::Polygon { coordinates } => Geometry::Polygon {
            coordinates: canonicalize_polygon_rings(coordinates.clone(), precision),
        },
        Geometry::MultiPolygon { coordinates } => {
            let mut parts: Vec<Vec<Vec<[f64; 2]>>> = coordinates
                .iter()
                .map(|poly| canonicalize_polygon_rings(poly.clone(), precision))
                .collect();
            parts.sort_by(|a, b| {
                let ka: Vec<String> = a.iter().map(|r| ring_key(r)).collect();
                let kb: Vec<String> = b.iter().map(|r| ring_key(r)).collect();
                ka.cmp(&kb)
            });
            Geometry::MultiPolygon { coordinates: parts }
        }
        Geometry::GeometryCollection { geometries } => {
            let mut parts: Vec<Geometry> =
                geometries.iter().map(|g| canonicalize(g, precision)).collect();
            parts.sort_by(|a, b| {
                let ka = serde_json::to_string(a).unwrap_or_default();
                let kb = serde_json::to_string(b).unwrap_or_default();
                ka.cmp(&kb)
            });
            Geometry::GeometryCollection { geometries: parts }
        }
    }
}

/// Rounds to `precision` decimals, canonically reorders rings/parts, hashes
/// with SHA-256 and returns `"gh:"+hex`. A missing geometry hashes to the
/// fixed constant `"gh:null"`.
pub fn geometry_hash(geometry: Option<&Geometry>, precision: u32) -> String {
    let Some(geometry) = geometry else {
        return "gh:null".to_string();
    };
    let canonical = canonicalize(geometry, precision);
    let serialized = serde_json::to_string(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    format!("gh:{:x}", hasher.finalize())
}
