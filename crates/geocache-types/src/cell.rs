use crate::EngineError;
use std::fmt;
use std::str::FromStr;

pub use h3o::Resolution;

pub const MIN_RESOLUTION: u8 = 0;
pub const MAX_RESOLUTION: u8 = 15;

/// An opaque hex cell identifier at a specific resolution, backed by `h3o`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cell(h3o::CellIndex);

impl Cell {
    pub fn from_index(index: h3o::CellIndex) -> Self {
        Cell(index)
    }

    pub fn index(&self) -> h3o::CellIndex {
        self.0
    }

    pub fn resolution(&self) -> u8 {
        u8::from(self.0.resolution())
    }

    /// Fails if `target > self.resolution()`: a cell cannot have a parent at
    /// a finer resolution than itself.
    pub fn parent(&self, target: u8) -> Result<Cell, EngineError> {
        if target > self.resolution() {
            return Err(EngineError::Internal(format!(
                "parent resolution {target} is finer than cell resolution {}",
                self.resolution()
            )));
        }
        let res = clamp_resolution(target)?;
        self.0
            .parent(res)
            .map(Cell)
            .ok_or_else(|| EngineError::Internal("parent lookup failed".into()))
    }

    /// Fails if `target < self.resolution()`.
    pub fn children(&self, target: u8) -> Result<Vec<Cell>, EngineError> {
        if target < self.resolution() {
            return Err(EngineError::Internal(format!(
                "children resolution {target} is coarser than cell resolution {}",
                self.resolution()
            )));
        }
        let res = clamp_resolution(target)?;
        let mut out: Vec<Cell> = self.0.children(res).map(Cell).collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Closed lon/lat ring (degrees) describing the cell's boundary.
    pub fn boundary(&self) -> Vec<(f64, f64)> {
        let mut ring: Vec<(f64, f64)> = self
            .0
            .boundary()
            .iter()
            .map(|ll| (ll.lng(), ll.lat()))
            .collect();
        if let Some(first) = ring.first().copied() {
            if ring.last() != Some(&first) {
                ring.push(first);
            }
        }
        ring
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cell {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        h3o::CellIndex::from_str(s)
            .map(Cell)
            .map_err(|_| EngineError::Internal(format!("invalid cell id: {s}")))
    }
}

/// Clamp a caller-supplied resolution request into `[MIN_RESOLUTION, MAX_RESOLUTION]`.
/// Used by `CellMapper` entry points; out-of-range values there are a caller
/// error rather than silently clamped (see spec.md §4.A).
pub fn clamp_resolution(r: u8) -> Result<Resolution, EngineError> {
    if r > MAX_RESOLUTION {
        return Err(EngineError::InvalidResolution(r as i16));
    }
    Resolution::try_from(r).map_err(|_| EngineError::InvalidResolution(r as i16))
}
