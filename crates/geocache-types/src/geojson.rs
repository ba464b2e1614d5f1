use serde::{Deserialize, Serialize};

/// Coordinates are stored as `[lon, lat]` pairs, matching GeoJSON's axis
/// order and `geo-types`' `Coord { x, y }` convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: [f64; 2],
    },
    LineString {
        coordinates: Vec<[f64; 2]>,
    },
    Polygon {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<[f64; 2]>>>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

/// Caller-supplied feature `id`, canonicalized for dedup purposes per
/// spec.md §4.D: `"A"` -> `"s:A"`, `2` -> `"n:2"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    String(String),
    Number(serde_json::Number),
}

impl FeatureId {
    pub fn canonical_key(&self) -> String {
        match self {
            FeatureId::String(s) => format!("s:{s}"),
            FeatureId::Number(n) => format!("n:{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: FeatureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FeatureId>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FeatureKind {
    Feature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn empty() -> Self {
        FeatureCollection { features: vec![] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_id_distinguishes_string_and_number() {
        let s = FeatureId::String("2".to_string());
        let n = FeatureId::Number(serde_json::Number::from(2));
        assert_eq!(s.canonical_key(), "s:2");
        assert_eq!(n.canonical_key(), "n:2");
        assert_ne!(s.canonical_key(), n.canonical_key());
    }

    #[test]
    fn serde_round_trip() {
        let fc = FeatureCollection {
            features: vec![Feature {
                kind: FeatureKind::Feature,
                id: Some(FeatureId::String("a".into())),
                geometry: Some(Geometry::Point {
                    coordinates: [18.0, 59.3],
                }),
                properties: Default::default(),
            }],
        };
        let json = serde_json::to_string(&fc).unwrap();
        let back: FeatureCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(fc, back);
    }
}
