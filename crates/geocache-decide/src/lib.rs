//! Stateless bypass-vs-fill decision over a request's footprint
//! (spec.md §4.F). `ServeOnlyIfFresh` is a coordinator-level gate, not a
//! decision this function returns — it only ever chooses between bypassing
//! upstream and filling the cache at some resolution.

use geocache_hotness::HotnessTracker;
use geocache_types::Cell;
use std::collections::HashSet;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    ColdAllCells,
    CoarserParentHot,
    FinerChildrenHot,
    DefaultFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlBand {
    Hot,
    Warm,
    Cold,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Bypass { reason: Reason },
    Fill {
        effective_resolution: u8,
        ttl_band: TtlBand,
        reason: Reason,
    },
}

pub struct DecideInput<'a> {
    pub footprint: &'a [Cell],
    pub r_base: u8,
    pub r_min: u8,
    pub r_max: u8,
    pub threshold: f64,
    pub now: OffsetDateTime,
}

fn ttl_band(max_score: f64, threshold: f64) -> TtlBand {
    if max_score >= 4.0 * threshold {
        TtlBand::Hot
    } else if max_score >= threshold {
        TtlBand::Warm
    } else {
        TtlBand::Cold
    }
}

pub fn decide(input: DecideInput, hotness: &HotnessTracker) -> Decision {
    if input.footprint.is_empty() {
        return Decision::Bypass { reason: Reason::ColdAllCells };
    }

    let max_score = input
        .footprint
        .iter()
        .map(|&c| hotness.score(c, input.now))
        .fold(0.0_f64, f64::max);

    if max_score < input.threshold {
        return Decision::Bypass { reason: Reason::ColdAllCells };
    }

    let band = ttl_band(max_score, input.threshold);

    if input.r_base > 0 && input.r_base - 1 >= input.r_min {
        let mut parents: HashSet<Cell> = HashSet::new();
        let mut ok = true;
        for &c in input.footprint {
            match c.parent(input.r_base - 1) {
                Ok(p) => {
                    parents.insert(p);
                }
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            let sum: f64 = parents.iter().map(|&p| hotness.score(p, input.now)).sum();
            if sum >= 2.0 * input.threshold {
                return Decision::Fill {
                    effective_resolution: input.r_base - 1,
                    ttl_band: band,
                    reason: Reason::CoarserParentHot,
                };
            }
        }
    }

    if input.r_base + 1 <= input.r_max {
        let mut children: HashSet<Cell> = HashSet::new();
        let mut ok = true;
        for &c in input.footprint {
            match c.children(input.r_base + 1) {
                Ok(kids) => children.extend(kids),
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if ok && !children.is_empty() {
            let hot = children
                .iter()
                .filter(|&&c| hotness.score(c, input.now) >= input.threshold)
                .count();
            if hot * 2 > children.len() {
                return Decision::Fill {
                    effective_resolution: input.r_base + 1,
                    ttl_band: band,
                    reason: Reason::FinerChildrenHot,
                };
            }
        }
    }

    Decision::Fill {
        effective_resolution: input.r_base,
        ttl_band: band,
        reason: Reason::DefaultFill,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cell_at(lat: f64, lng: f64, res: u8) -> Cell {
        let ll = h3o::LatLng::new(lat, lng).unwrap();
        Cell::from_index(ll.to_cell(h3o::Resolution::try_from(res).unwrap()))
    }

    fn t(secs: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(secs)
    }

    #[test]
    fn cold_footprint_bypasses() {
        let tracker = HotnessTracker::new(Duration::from_secs(300));
        let footprint = vec![cell_at(59.33, 18.01, 8)];
        let decision = decide(
            DecideInput { footprint: &footprint, r_base: 8, r_min: 0, r_max: 15, threshold: 5.0, now: t(0) },
            &tracker,
        );
        assert_eq!(decision, Decision::Bypass { reason: Reason::ColdAllCells });
    }

    #[test]
    fn hot_footprint_defaults_to_fill_at_base_resolution() {
        let tracker = HotnessTracker::new(Duration::from_secs(300));
        let cell = cell_at(59.33, 18.01, 8);
        for _ in 0..3 {
            tracker.inc(cell, t(0));
        }
        let footprint = vec![cell];
        let decision = decide(
            DecideInput { footprint: &footprint, r_base: 8, r_min: 0, r_max: 15, threshold: 2.0, now: t(0) },
            &tracker,
        );
        assert_eq!(
            decision,
            Decision::Fill { effective_resolution: 8, ttl_band: TtlBand::Warm, reason: Reason::DefaultFill }
        );
    }

    #[test]
    fn very_hot_parent_prefers_coarser_resolution() {
        let tracker = HotnessTracker::new(Duration::from_secs(300));
        let cell = cell_at(59.33, 18.01, 8);
        let parent = cell.parent(7).unwrap();
        for _ in 0..20 {
            tracker.inc(parent, t(0));
        }
        tracker.inc(cell, t(0));
        let footprint = vec![cell];
        let decision = decide(
            DecideInput { footprint: &footprint, r_base: 8, r_min: 0, r_max: 15, threshold: 1.0, now: t(0) },
            &tracker,
        );
        match decision {
            Decision::Fill { effective_resolution, reason, .. } => {
                assert_eq!(effective_resolution, 7);
                assert_eq!(reason, Reason::CoarserParentHot);
            }
            other => panic!("expected coarser fill, got {other:?}"),
        }
    }

    #[test]
    fn ttl_band_thresholds() {
        assert_eq!(ttl_band(10.0, 2.0), TtlBand::Hot);
        assert_eq!(ttl_band(3.0, 2.0), TtlBand::Warm);
        assert_eq!(ttl_band(1.0, 2.0), TtlBand::Cold);
    }
}
