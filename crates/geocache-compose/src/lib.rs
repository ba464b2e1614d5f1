//! Merges shard `FeatureCollection`s into a single response, with stable
//! sort, limit/offset, and dedup (spec.md §4.D).

mod geomhash;
pub mod sort;

pub use geomhash::geometry_hash;
pub use sort::{Direction, Nulls, SortKey, TypeHint};

use geocache_types::{Diagnostics, Feature, FeatureCollection, HitClass};
use std::collections::HashSet;

/// One shard's decoded features plus whether it was served from cache, used
/// only to compute `hitClass`; emission order within a shard is preserved.
pub struct ShardInput {
    pub features: Vec<Feature>,
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
pub struct AdvancedParams {
    pub sort: Vec<SortKey>,
    pub limit: usize,
    pub offset: usize,
    pub enable_dedup: bool,
    pub geom_precision: u32,
}

impl Default for AdvancedParams {
    fn default() -> Self {
        AdvancedParams {
            sort: vec![],
            limit: 0,
            offset: 0,
            enable_dedup: false,
            geom_precision: 6,
        }
    }
}

/// `full_hit` when every shard came from cache, `partial_hit` when some did,
/// `miss` when none did or there were no shards at all (spec.md §4.D).
fn hit_class(shards: &[ShardInput]) -> HitClass {
    let total = shards.len();
    let hits = shards.iter().filter(|s| s.from_cache).count();
    HitClass::classify(total, hits)
}

/// Concatenates features in shard order with an optional dedup-by-id pass.
/// No reordering across or within shards.
pub fn merge_simple(shards: Vec<ShardInput>, enable_dedup: bool) -> (FeatureCollection, Diagnostics) {
    let hc = hit_class(&shards);
    let total_in: usize = shards.iter().map(|s| s.features.len()).sum();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut dedup_by_id = 0usize;
    let mut out = Vec::with_capacity(total_in);

    for shard in shards {
        for feature in shard.features {
            if enable_dedup {
                if let Some(id) = &feature.id {
                    let key = id.canonical_key();
                    if !seen_ids.insert(key) {
                        dedup_by_id += 1;
                        continue;
                    }
                }
            }
            out.push(feature);
        }
    }

    let diagnostics = Diagnostics {
        hit_class: Some(hc),
        total_in,
        total_out: out.len(),
        dedup_by_id,
        dedup_by_geom: 0,
    };
    (FeatureCollection { features: out }, diagnostics)
}

/// Each shard's features are locally stable-sorted by the comparator first
/// (a shard produced by a single fill/read is not otherwise guaranteed to
/// arrive in sort order), then merged via a min-heap over per-shard cursors,
/// popping in `(sortTuple, shardIdx, shard-local index)` order for
/// stability (spec.md §4.D).
pub fn merge_advanced(shards: Vec<ShardInput>, params: AdvancedParams) -> (FeatureCollection, Diagnostics) {
    let hc = hit_class(&shards);
    let total_in: usize = shards.iter().map(|s| s.features.len()).sum();

    let sorted_shards: Vec<Vec<Feature>> = shards
        .into_iter()
        .map(|mut s| {
            s.features
                .sort_by(|a, b| sort::compare_features(a, b, &params.sort));
            s.features
        })
        .collect();

    let merged = k_way_merge(&sorted_shards, &params.sort);

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_geoms: HashSet<String> = HashSet::new();
    let mut dedup_by_id = 0usize;
    let mut dedup_by_geom = 0usize;
    let mut survivors = Vec::with_capacity(merged.len());

    for feature in merged {
        if params.enable_dedup {
            if let Some(id) = &feature.id {
                let key = id.canonical_key();
                if !seen_ids.insert(key) {
                    dedup_by_id += 1;
                    continue;
                }
            } else {
                let hash = geometry_hash(feature.geometry.as_ref(), params.geom_precision);
                if !seen_geoms.insert(hash) {
                    dedup_by_geom += 1;
                    continue;
                }
            }
        }
        survivors.push(feature);
    }

    let windowed: Vec<Feature> = survivors
        .into_iter()
        .skip(params.offset)
        .take(if params.limit == 0 { usize::MAX } else { params.limit })
        .collect();

    let diagnostics = Diagnostics {
        hit_class: Some(hc),
        total_in,
        total_out: windowed.len(),
        dedup_by_id,
        dedup_by_geom,
    };
    (FeatureCollection { features: windowed }, diagnostics)
}

/// Min-heap merge over per-shard cursors into already (locally) sorted
/// sequences. Tie-break by `(shard index, shard-local index)`.
fn k_way_merge(shards: &[Vec<Feature>], sort: &[SortKey]) -> Vec<Feature> {
    use std::cmp::Ordering;
    use std::collections::BinaryHeap;

    struct Head {
        shard_idx: usize,
        local_idx: usize,
    }

    struct HeapEntry<'a> {
        head: Head,
        feature: &'a Feature,
        sort: &'a [SortKey],
    }

    impl PartialEq for HeapEntry<'_> {
        fn eq(&self, other: &Self) -> bool {
            self.cmp(other) == Ordering::Equal
        }
    }
    impl Eq for HeapEntry<'_> {}
    impl PartialOrd for HeapEntry<'_> {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for HeapEntry<'_> {
        fn cmp(&self, other: &Self) -> Ordering {
            // BinaryHeap is a max-heap; reverse so the "smallest" head pops first.
            sort::compare_features(self.feature, other.feature, self.sort)
                .then(self.head.shard_idx.cmp(&other.head.shard_idx))
                .then(self.head.local_idx.cmp(&other.head.local_idx))
                .reverse()
        }
    }

    let mut cursors = vec![0usize; shards.len()];
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
    for (shard_idx, shard) in shards.iter().enumerate() {
        if let Some(feature) = shard.first() {
            heap.push(HeapEntry {
                head: Head { shard_idx, local_idx: 0 },
                feature,
                sort,
            });
        }
    }

    let mut out = Vec::new();
    while let Some(entry) = heap.pop() {
        let shard_idx = entry.head.shard_idx;
        let local_idx = entry.head.local_idx;
        out.push(entry.feature.clone());
        cursors[shard_idx] = local_idx + 1;
        if let Some(next) = shards[shard_idx].get(cursors[shard_idx]) {
            heap.push(HeapEntry {
                head: Head { shard_idx, local_idx: cursors[shard_idx] },
                feature: next,
                sort,
            });
        }
    }
    out
}
