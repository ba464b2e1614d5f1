/// How many shards backing a response came from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitClass {
    FullHit,
    PartialHit,
    Miss,
}

impl HitClass {
    pub fn classify(total_shards: usize, hits: usize) -> HitClass {
        if total_shards == 0 || hits == 0 {
            HitClass::Miss
        } else if hits == total_shards {
            HitClass::FullHit
        } else {
            HitClass::PartialHit
        }
    }
}

/// Emitted alongside a composed response (spec.md §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Diagnostics {
    pub hit_class: Option<HitClass>,
    pub total_in: usize,
    pub total_out: usize,
    pub dedup_by_id: usize,
    pub dedup_by_geom: usize,
}
