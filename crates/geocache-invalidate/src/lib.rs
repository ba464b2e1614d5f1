//! Applies invalidation events against the store, hotness tracker, and
//! per-layer watermark (spec.md §4.G).

mod event;

pub use event::{Footprint, InvalidationEvent, SpatialEvent, WireEvent};

use async_trait::async_trait;
use geocache_hotness::HotnessTracker;
use geocache_metrics::EngineMetrics;
use geocache_store::FeatureShardStore;
use geocache_types::{Cell, EngineError, Filter, LayerInvalidatedAt, ShardKey};
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const MIN_DEDUP_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
pub struct InvalidationStats {
    pub applied: AtomicU64,
    pub rejected_duplicate: AtomicU64,
    pub malformed: AtomicU64,
}

impl InvalidationStats {
    fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }
    fn record_duplicate(&self) {
        self.rejected_duplicate.fetch_add(1, Ordering::Relaxed);
    }
    fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct InvalidationEngine {
    store: Arc<FeatureShardStore>,
    hotness: Arc<HotnessTracker>,
    watermarks: Arc<LayerInvalidatedAt>,
    version_dedup: Mutex<LruCache<String, u64>>,
    default_resolutions: Vec<u8>,
    metrics: Arc<EngineMetrics>,
    pub stats: InvalidationStats,
}

impl InvalidationEngine {
    pub fn new(
        store: Arc<FeatureShardStore>,
        hotness: Arc<HotnessTracker>,
        watermarks: Arc<LayerInvalidatedAt>,
        default_resolutions: Vec<u8>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let capacity = NonZeroUsize::new(MIN_DEDUP_CAPACITY).unwrap();
        InvalidationEngine {
            store,
            hotness,
            watermarks,
            version_dedup: Mutex::new(LruCache::new(capacity)),
            default_resolutions,
            metrics,
            stats: InvalidationStats::default(),
        }
    }

    /// Applies a wire event. A duplicate event (every key rejected by the
    /// version gate) is a no-op: hotness and the layer watermark are left
    /// untouched.
    pub async fn apply_wire_event(&self, event: WireEvent) -> Result<(), EngineError> {
        if event.layer.is_empty() || event.h3_cells.is_empty() {
            self.stats.record_malformed();
            self.metrics.record_invalidation("malformed");
            return Err(EngineError::InvalidationMalformed(
                "wire event missing layer or cells".into(),
            ));
        }
        let resolutions = event
            .resolutions
            .clone()
            .unwrap_or_else(|| self.default_resolutions.clone());

        let mut keys = Vec::new();
        let mut touched: HashSet<Cell> = HashSet::new();
        {
            let mut dedup = self.version_dedup.lock().unwrap();
            for &cell in &event.h3_cells {
                for &r in &resolutions {
                    let dedup_key = format!("{}:{r}:{cell}", event.layer);
                    let stale = matches!(dedup.peek(&dedup_key), Some(&last) if event.version <= last);
                    if stale {
                        continue;
                    }
                    dedup.put(dedup_key, event.version);
                    keys.push((ShardKey::new(&event.layer, r, cell, &Filter::new("")), Filter::new("")));
                    touched.insert(cell);
                }
            }
        }

        if keys.is_empty() {
            self.stats.record_duplicate();
            self.metrics.record_invalidation("duplicate");
            return Ok(());
        }

        self.store.del(&keys).await?;
        self.hotness.reset(&touched.into_iter().collect::<Vec<_>>());
        self.watermarks.advance(&event.layer, event.ts);
        self.stats.record_applied();
        self.metrics.record_invalidation("applied");
        Ok(())
    }

    /// Applies a spatial event: for each configured resolution, the
    /// footprint is independently mapped to cells at that resolution (so
    /// every cached tiling resolution is actually covered, not just the
    /// finest one) and those shards are dropped.
    pub async fn apply_spatial_event(&self, event: SpatialEvent) -> Result<(), EngineError> {
        if event.layer.is_empty() {
            self.stats.record_malformed();
            self.metrics.record_invalidation("malformed");
            return Err(EngineError::InvalidationMalformed("spatial event missing layer".into()));
        }

        let mut keys = Vec::new();
        let mut touched: HashSet<Cell> = HashSet::new();
        for &r in &self.default_resolutions {
            let cells = match &event.footprint {
                Footprint::BoundingBox(bbox) => geocache_grid::cells_for_bbox(bbox, r)?,
                Footprint::Polygon(poly) => geocache_grid::cells_for_polygon(poly, r)?,
            };
            for cell in cells {
                keys.push((ShardKey::new(&event.layer, r, cell, &Filter::new("")), Filter::new("")));
                touched.insert(cell);
            }
        }

        self.store.del(&keys).await?;
        self.hotness.reset(&touched.into_iter().collect::<Vec<_>>());
        self.watermarks.advance(&event.layer, event.ts);
        self.stats.record_applied();
        self.metrics.record_invalidation("applied");
        Ok(())
    }

    pub async fn apply(&self, event: InvalidationEvent) -> Result<(), EngineError> {
        match event {
            InvalidationEvent::Wire(w) => self.apply_wire_event(w).await,
            InvalidationEvent::Spatial(s) => self.apply_spatial_event(s).await,
        }
    }
}

/// The external pub/sub transport this crate does not own; consumers just
/// hand the engine parsed events (spec.md §1, §4.G).
#[async_trait]
pub trait EventConsumer: Send {
    async fn next_event(&mut self) -> Option<InvalidationEvent>;
}

pub struct ChannelEventConsumer {
    rx: tokio::sync::mpsc::Receiver<InvalidationEvent>,
}

impl ChannelEventConsumer {
    pub fn new(rx: tokio::sync::mpsc::Receiver<InvalidationEvent>) -> Self {
        ChannelEventConsumer { rx }
    }
}

#[async_trait]
impl EventConsumer for ChannelEventConsumer {
    async fn next_event(&mut self) -> Option<InvalidationEvent> {
        self.rx.recv().await
    }
}

/// Drains a consumer until it closes, applying each event. Failures are
/// logged and counted, never propagated: the process keeps running
/// (spec.md §4.G, §7).
pub async fn run<C: EventConsumer>(engine: Arc<InvalidationEngine>, mut consumer: C) {
    while let Some(event) = consumer.next_event().await {
        if let Err(err) = engine.apply(event).await {
            tracing::warn!(error = %err, "invalidation event rejected");
        }
    }
}
