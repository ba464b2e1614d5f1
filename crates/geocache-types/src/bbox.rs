use crate::{EngineError, SRID_4326};

/// A geographic bounding box in `EPSG:4326` degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, EngineError> {
        if !(-180.0..180.0).contains(&x1) || !(x1 < x2 && x2 <= 180.0) {
            return Err(EngineError::InvalidBoundingBox);
        }
        if !(-90.0..90.0).contains(&y1) || !(y1 < y2 && y2 <= 90.0) {
            return Err(EngineError::InvalidBoundingBox);
        }
        Ok(BoundingBox { x1, y1, x2, y2 })
    }

    pub fn srid(&self) -> &'static str {
        SRID_4326
    }

    pub fn to_geo_polygon(&self) -> geo_types::Polygon<f64> {
        let ring = geo_types::LineString::from(vec![
            (self.x1, self.y1),
            (self.x2, self.y1),
            (self.x2, self.y2),
            (self.x1, self.y2),
            (self.x1, self.y1),
        ]);
        geo_types::Polygon::new(ring, vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_box() {
        assert!(BoundingBox::new(1.0, 1.0, 1.0, 2.0).is_err());
        assert!(BoundingBox::new(1.0, 1.0, 2.0, 1.0).is_err());
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(BoundingBox::new(-181.0, 0.0, 1.0, 1.0).is_err());
        assert!(BoundingBox::new(0.0, -91.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn accepts_valid_box() {
        let b = BoundingBox::new(18.00, 59.32, 18.02, 59.34).unwrap();
        assert_eq!(b.srid(), "EPSG:4326");
    }
}
