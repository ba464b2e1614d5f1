//! Per-cell, time-decayed popularity score, sharded for concurrency
//! (spec.md §4.B). No concurrent map: a fixed array of 64 mutex-protected
//! `HashMap`s, shard chosen by hashing the cell id, per the arena-free
//! design note in spec.md §9.

use geocache_types::{Cell, HotnessEntry};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use xxhash_rust::xxh3::xxh3_64;

const SHARD_COUNT: usize = 64;
const DEFAULT_HALF_LIFE: Duration = Duration::from_secs(300);

pub struct HotnessTracker {
    shards: Vec<Mutex<HashMap<Cell, HotnessEntry>>>,
    half_life: Duration,
}

impl HotnessTracker {
    pub fn new(half_life: Duration) -> Self {
        let half_life = if half_life.is_zero() {
            DEFAULT_HALF_LIFE
        } else {
            half_life
        };
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Mutex::new(HashMap::new()));
        }
        HotnessTracker { shards, half_life }
    }

    fn shard_for(&self, cell: Cell) -> &Mutex<HashMap<Cell, HotnessEntry>> {
        let idx = (xxh3_64(cell.to_string().as_bytes()) % SHARD_COUNT as u64) as usize;
        &self.shards[idx]
    }

    /// Decays the existing score, then adds 1 and stamps `last_update = now`.
    pub fn inc(&self, cell: Cell, now: time::OffsetDateTime) {
        let mut shard = self.shard_for(cell).lock().unwrap();
        let decayed = shard
            .get(&cell)
            .map(|e| e.decayed_score(now, self.half_life))
            .unwrap_or(0.0);
        shard.insert(cell, HotnessEntry::new(decayed + 1.0, now));
    }

    /// Convenience for incrementing a whole footprint at once.
    pub fn inc_many(&self, cells: &[Cell], now: time::OffsetDateTime) {
        for &cell in cells {
            self.inc(cell, now);
        }
    }

    /// Returns the decayed score without mutating the store.
    pub fn score(&self, cell: Cell, now: time::OffsetDateTime) -> f64 {
        let shard = self.shard_for(cell).lock().unwrap();
        shard
            .get(&cell)
            .map(|e| e.decayed_score(now, self.half_life))
            .unwrap_or(0.0)
    }

    /// Removes the given cells, or every tracked cell if `cells` is empty.
    pub fn reset(&self, cells: &[Cell]) {
        if cells.is_empty() {
            for shard in &self.shards {
                shard.lock().unwrap().clear();
            }
            return;
        }
        for &cell in cells {
            self.shard_for(cell).lock().unwrap().remove(&cell);
        }
    }

    /// Approximate total distinct cells tracked.
    pub fn size(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> Cell {
        let ll = h3o::LatLng::new(59.33, 18.01).unwrap();
        Cell::from_index(ll.to_cell(h3o::Resolution::Eight))
    }

    fn t(offset_secs: i64) -> time::OffsetDateTime {
        time::OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(offset_secs)
    }

    #[test]
    fn inc_then_score_is_one() {
        let tracker = HotnessTracker::new(Duration::from_secs(2));
        let c = cell();
        tracker.inc(c, t(0));
        assert!((tracker.score(c, t(0)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_decays_by_half_per_half_life() {
        let tracker = HotnessTracker::new(Duration::from_secs(2));
        let c = cell();
        tracker.inc(c, t(0));
        assert!((tracker.score(c, t(2)) - 0.5).abs() < 1e-6);
        assert!((tracker.score(c, t(4)) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn reset_zeros_the_score() {
        let tracker = HotnessTracker::new(Duration::from_secs(2));
        let c = cell();
        tracker.inc(c, t(0));
        tracker.reset(&[c]);
        assert_eq!(tracker.score(c, t(0)), 0.0);
    }

    #[test]
    fn never_incremented_scores_zero() {
        let tracker = HotnessTracker::new(Duration::from_secs(2));
        assert_eq!(tracker.score(cell(), t(0)), 0.0);
    }

    #[test]
    fn nonpositive_half_life_is_forced_to_sentinel_default() {
        let tracker = HotnessTracker::new(Duration::from_secs(0));
        assert_eq!(tracker.half_life, DEFAULT_HALF_LIFE);
    }
}
