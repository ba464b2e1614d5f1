//! The top-level `Parse -> MapFootprint -> Decide -> (Bypass | CacheRead ->
//! Fill? -> Compose)` state machine (spec.md §4.H).

mod clip;
mod clock;
pub mod config;
mod filter_guard;

pub use clock::{Clock, SystemClock};
pub use config::{AdaptiveArgs, EngineConfig, InvalidationArgs};

use geocache_compose::{merge_advanced, merge_simple, AdvancedParams, ShardInput};
use geocache_decide::{decide, Decision, DecideInput};
use geocache_fill::{FillJob, FillWorkerPool, UpstreamClient};
use geocache_hotness::HotnessTracker;
use geocache_metrics::EngineMetrics;
use geocache_store::{is_fresh, FeatureShardStore};
use geocache_types::{
    BoundingBox, Diagnostics, EngineError, Feature, FeatureCollection, Filter, LayerInvalidatedAt,
    Scenario, ShardKey,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// A request's footprint, exactly one of which the caller supplies
/// (spec.md §4.A): a polygon takes precedence when both are present.
pub enum RequestFootprint {
    BoundingBox(BoundingBox),
    Polygon(geo_types::MultiPolygon<f64>),
}

pub enum ComposeMode {
    Simple { enable_dedup: bool },
    Advanced(AdvancedParams),
}

pub struct QueryRequest {
    pub layer: String,
    pub footprint: RequestFootprint,
    pub filter: String,
    pub compose: ComposeMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Bypassed {
        features: FeatureCollection,
    },
    Composed {
        features: FeatureCollection,
        diagnostics: Diagnostics,
    },
    FreshnessRejected {
        reason: &'static str,
    },
}

pub struct CoordinatorConfig {
    pub r_base: u8,
    pub r_min: u8,
    pub r_max: u8,
    pub hot_threshold: f64,
    pub ttl_cold: Duration,
    pub ttl_warm: Duration,
    pub ttl_hot: Duration,
    pub serve_only_if_fresh: bool,
}

pub struct QueryCoordinator {
    config: CoordinatorConfig,
    hotness: Arc<HotnessTracker>,
    store: Arc<FeatureShardStore>,
    fill_pool: FillWorkerPool,
    upstream: Arc<dyn UpstreamClient>,
    watermarks: Arc<LayerInvalidatedAt>,
    metrics: Arc<EngineMetrics>,
    clock: Arc<dyn Clock>,
    scenario: Arc<Scenario>,
}

impl QueryCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CoordinatorConfig,
        hotness: Arc<HotnessTracker>,
        store: Arc<FeatureShardStore>,
        fill_pool: FillWorkerPool,
        upstream: Arc<dyn UpstreamClient>,
        watermarks: Arc<LayerInvalidatedAt>,
        metrics: Arc<EngineMetrics>,
        clock: Arc<dyn Clock>,
        scenario: Arc<Scenario>,
    ) -> Self {
        QueryCoordinator {
            config,
            hotness,
            store,
            fill_pool,
            upstream,
            watermarks,
            metrics,
            clock,
            scenario,
        }
    }

    pub async fn handle_query(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<QueryOutcome, EngineError> {
        // 1. Parse.
        if request.layer.trim().is_empty() {
            return Err(EngineError::MissingLayer);
        }
        filter_guard::validate_filter(&request.filter)?;
        let filter = Filter::new(request.filter.clone());
        let now = self.clock.now();
        let now_unix = now.unix_timestamp();
        tracing::debug!(layer = %request.layer, scenario = %self.scenario.get(), "handling query");

        // 2. MapFootprint, at the base resolution.
        let base_cells = self.cells_for(&request.footprint, self.config.r_base)?;
        self.hotness.inc_many(&base_cells, now);

        // 3. Decide.
        let decision = decide(
            DecideInput {
                footprint: &base_cells,
                r_base: self.config.r_base,
                r_min: self.config.r_min,
                r_max: self.config.r_max,
                threshold: self.config.hot_threshold,
                now,
            },
            &self.hotness,
        );

        let (effective_res, ttl) = match decision {
            Decision::Bypass { .. } => {
                self.metrics.record_upstream_call();
                let features = self.upstream.forward_stream(&filter).await.map_err(|e| {
                    self.metrics.record_upstream_failure();
                    e
                })?;
                return Ok(QueryOutcome::Bypassed { features });
            }
            Decision::Fill { effective_resolution, ttl_band, .. } => {
                (effective_resolution, self.ttl_for_band(ttl_band))
            }
        };

        let eff_cells = if effective_res == self.config.r_base {
            base_cells.clone()
        } else {
            self.cells_for(&request.footprint, effective_res)?
        };

        // 4. CacheRead + freshness classification.
        let keys: Vec<(ShardKey, Filter)> = eff_cells
            .iter()
            .map(|&cell| (ShardKey::new(&request.layer, effective_res, cell, &filter), filter.clone()))
            .collect();
        let reads = self.mget_or_miss(&keys, &request.layer).await;
        let watermark = self.watermarks.get(&request.layer);

        let mut fresh_hits: HashMap<ShardKey, Vec<u8>> = HashMap::new();
        let mut missing: Vec<ShardKey> = Vec::new();
        let mut saw_stale = false;
        for (key, _) in &keys {
            match reads.get(key) {
                Some(read) if is_fresh(read.shard.write_time_unix, watermark) => {
                    fresh_hits.insert(key.clone(), read.shard.payload.clone());
                }
                Some(_) => {
                    saw_stale = true;
                    missing.push(key.clone());
                }
                None => missing.push(key.clone()),
            }
        }

        if self.config.serve_only_if_fresh && !missing.is_empty() {
            let reason = if saw_stale { "stale" } else { "miss" };
            self.metrics.record_freshness_rejection(reason);
            return Ok(QueryOutcome::FreshnessRejected { reason });
        }

        // 5. Fill, for every missing/stale key.
        if !missing.is_empty() {
            let jobs = self.build_fill_jobs(&request, &missing, &filter, ttl, now_unix)?;
            if !jobs.is_empty() {
                self.fill_pool
                    .run(jobs, self.upstream.clone(), self.store.clone(), cancel)
                    .await?;
                let refilled = self.mget_or_miss(&keys, &request.layer).await;
                for key in &missing {
                    if let Some(read) = refilled.get(key) {
                        fresh_hits.insert(key.clone(), read.shard.payload.clone());
                    }
                }
            }
        }

        // 6. Compose.
        let mut shard_inputs = Vec::with_capacity(eff_cells.len());
        for (key, _) in &keys {
            let from_cache = fresh_hits.contains_key(key) && !missing.contains(key);
            if let Some(bytes) = fresh_hits.get(key) {
                let fc: FeatureCollection =
                    serde_json::from_slice(bytes).map_err(|e| EngineError::Internal(e.to_string()))?;
                shard_inputs.push(ShardInput { features: fc.features, from_cache });
            }
        }

        let (features, diagnostics) = match request.compose {
            ComposeMode::Simple { enable_dedup } => merge_simple(shard_inputs, enable_dedup),
            ComposeMode::Advanced(params) => merge_advanced(shard_inputs, params),
        };
        self.metrics.record_spatial_response(
            diagnostics.hit_class.unwrap_or(geocache_types::HitClass::Miss),
        );
        Ok(QueryOutcome::Composed { features, diagnostics })
    }

    fn cells_for(
        &self,
        footprint: &RequestFootprint,
        res: u8,
    ) -> Result<Vec<geocache_types::Cell>, EngineError> {
        match footprint {
            RequestFootprint::Polygon(poly) => geocache_grid::cells_for_polygon(poly, res),
            RequestFootprint::BoundingBox(bbox) => geocache_grid::cells_for_bbox(bbox, res),
        }
    }

    /// A KV read failure is downgraded to a miss, never a request failure
    /// (spec.md §7): the affected keys fall through to the fill path.
    async fn mget_or_miss(
        &self,
        keys: &[(ShardKey, Filter)],
        layer: &str,
    ) -> HashMap<ShardKey, geocache_store::ShardRead> {
        match self.store.mget(keys).await {
            Ok(reads) => reads,
            Err(err) => {
                tracing::warn!(error = %err, layer = %layer, "cache read failed, treating as miss");
                HashMap::new()
            }
        }
    }

    fn ttl_for_band(&self, band: geocache_decide::TtlBand) -> Duration {
        match band {
            geocache_decide::TtlBand::Hot => self.config.ttl_hot,
            geocache_decide::TtlBand::Warm => self.config.ttl_warm,
            geocache_decide::TtlBand::Cold => self.config.ttl_cold,
        }
    }

    /// Clips each missing cell's boundary against the caller's footprint
    /// (spec.md §4.H step 4) and skips any cell whose clipped intersection
    /// is empty, rather than asking upstream to search the whole hex.
    fn build_fill_jobs(
        &self,
        request: &QueryRequest,
        missing: &[ShardKey],
        filter: &Filter,
        ttl: Duration,
        now_unix: i64,
    ) -> Result<Vec<FillJob>, EngineError> {
        let footprint_ring = match &request.footprint {
            RequestFootprint::BoundingBox(bbox) => bbox.to_geo_polygon().exterior().0.iter().map(|c| (c.x, c.y)).collect::<Vec<_>>(),
            RequestFootprint::Polygon(poly) => poly
                .0
                .first()
                .map(|p| p.exterior().0.iter().map(|c| (c.x, c.y)).collect::<Vec<_>>())
                .unwrap_or_default(),
        };

        let mut jobs = Vec::with_capacity(missing.len());
        for key in missing {
            let cell: geocache_types::Cell = key.cell.parse()?;
            let boundary = cell.boundary();
            let clipped = clip::clip_convex(&boundary, &footprint_ring);
            if clipped.len() < 4 {
                continue;
            }
            let ring = geo_types::LineString::from(clipped);
            let cell_polygon =
                geo_types::MultiPolygon(vec![geo_types::Polygon::new(ring, vec![])]);
            jobs.push(FillJob {
                shard_key: key.clone(),
                filter: filter.clone(),
                cell_polygon,
                ttl,
                now_unix,
            });
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geocache_store::{KVStore, KvError, MemoryKvStore, TtlPolicy};
    use geocache_types::{FeatureId, FeatureKind};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FakeClock {
        unix: AtomicI64,
    }

    impl FakeClock {
        fn new(unix: i64) -> Self {
            FakeClock { unix: AtomicI64::new(unix) }
        }
        fn advance(&self, secs: i64) {
            self.unix.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> OffsetDateTime {
            OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(self.unix.load(Ordering::SeqCst))
        }
    }

    struct MockUpstream {
        feature_id: &'static str,
    }

    #[async_trait]
    impl UpstreamClient for MockUpstream {
        async fn fetch_cell_features(
            &self,
            _polygon: &geo_types::MultiPolygon<f64>,
            _filter: &Filter,
        ) -> Result<FeatureCollection, EngineError> {
            Ok(FeatureCollection {
                features: vec![Feature {
                    kind: FeatureKind::Feature,
                    id: Some(FeatureId::String(self.feature_id.to_string())),
                    geometry: None,
                    properties: Default::default(),
                }],
            })
        }

        async fn forward_stream(&self, _filter: &Filter) -> Result<FeatureCollection, EngineError> {
            Ok(FeatureCollection {
                features: vec![Feature {
                    kind: FeatureKind::Feature,
                    id: Some(FeatureId::String("bypassed".to_string())),
                    geometry: None,
                    properties: Default::default(),
                }],
            })
        }
    }

    struct FailingKvStore;

    #[async_trait]
    impl KVStore for FailingKvStore {
        async fn mget(&self, _keys: &[String]) -> Result<HashMap<String, Vec<u8>>, KvError> {
            Err(KvError::Op("connection reset".into()))
        }
        async fn set(&self, _key: String, _value: Vec<u8>, _ttl: Duration) -> Result<(), KvError> {
            Ok(())
        }
        async fn mset(&self, _entries: Vec<(String, Vec<u8>, Duration)>) -> Result<(), KvError> {
            Ok(())
        }
        async fn del(&self, _keys: &[String]) -> Result<(), KvError> {
            Ok(())
        }
    }

    /// Wraps `MemoryKvStore` and records the TTL passed to every `set` call,
    /// so tests can observe which band the decider actually selected.
    struct RecordingKvStore {
        inner: MemoryKvStore,
        ttls: StdMutex<Vec<Duration>>,
    }

    impl RecordingKvStore {
        fn new() -> Self {
            RecordingKvStore { inner: MemoryKvStore::new(), ttls: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl KVStore for RecordingKvStore {
        async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, KvError> {
            self.inner.mget(keys).await
        }
        async fn set(&self, key: String, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
            self.ttls.lock().unwrap().push(ttl);
            self.inner.set(key, value, ttl).await
        }
        async fn mset(&self, entries: Vec<(String, Vec<u8>, Duration)>) -> Result<(), KvError> {
            for (_, _, ttl) in &entries {
                self.ttls.lock().unwrap().push(*ttl);
            }
            self.inner.mset(entries).await
        }
        async fn del(&self, keys: &[String]) -> Result<(), KvError> {
            self.inner.del(keys).await
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(18.00, 59.32, 18.02, 59.34).unwrap()
    }

    fn coordinator(clock: Arc<dyn Clock>, serve_only_if_fresh: bool) -> QueryCoordinator {
        coordinator_with_kv(clock, serve_only_if_fresh, Arc::new(MemoryKvStore::new()))
    }

    fn coordinator_with_kv(
        clock: Arc<dyn Clock>,
        serve_only_if_fresh: bool,
        kv: Arc<dyn KVStore>,
    ) -> QueryCoordinator {
        coordinator_with_config(
            clock,
            kv,
            CoordinatorConfig {
                r_base: 8,
                r_min: 0,
                r_max: 15,
                hot_threshold: 2.0,
                ttl_cold: Duration::from_secs(30),
                ttl_warm: Duration::from_secs(300),
                ttl_hot: Duration::from_secs(1800),
                serve_only_if_fresh,
            },
        )
    }

    fn coordinator_with_config(
        clock: Arc<dyn Clock>,
        kv: Arc<dyn KVStore>,
        config: CoordinatorConfig,
    ) -> QueryCoordinator {
        let hotness = Arc::new(HotnessTracker::new(Duration::from_secs(300)));
        let store = Arc::new(FeatureShardStore::new(
            kv,
            TtlPolicy::new(Duration::from_secs(600), HashMap::new()),
        ));
        let fill_pool = FillWorkerPool::new(4, 16, Duration::from_secs(5));
        let upstream = Arc::new(MockUpstream { feature_id: "filled" });
        let watermarks = Arc::new(LayerInvalidatedAt::new());
        let metrics = Arc::new(EngineMetrics::new(&prometheus::Registry::new()).unwrap());
        let scenario = Arc::new(Scenario::default());
        QueryCoordinator::new(
            config,
            hotness,
            store,
            fill_pool,
            upstream,
            watermarks,
            metrics,
            clock,
            scenario,
        )
    }

    fn request() -> QueryRequest {
        QueryRequest {
            layer: "parcels".to_string(),
            footprint: RequestFootprint::BoundingBox(bbox()),
            filter: String::new(),
            compose: ComposeMode::Simple { enable_dedup: false },
        }
    }

    #[tokio::test]
    async fn cold_footprint_bypasses_cache_entirely() {
        let clock = Arc::new(FakeClock::new(0));
        let coordinator = coordinator(clock, false);
        let outcome = coordinator
            .handle_query(request(), CancellationToken::new())
            .await
            .unwrap();
        match outcome {
            QueryOutcome::Bypassed { features } => {
                assert_eq!(features.features.len(), 1);
            }
            other => panic!("expected bypass, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hot_footprint_fills_and_composes() {
        let clock = Arc::new(FakeClock::new(0));
        let coordinator = coordinator(clock.clone(), false);
        // Warm the footprint past the threshold before issuing the query.
        for _ in 0..4 {
            coordinator
                .handle_query(request(), CancellationToken::new())
                .await
                .ok();
        }
        let outcome = coordinator
            .handle_query(request(), CancellationToken::new())
            .await
            .unwrap();
        match outcome {
            QueryOutcome::Composed { features, .. } => {
                assert!(!features.features.is_empty());
            }
            other => panic!("expected composed response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn serve_only_if_fresh_rejects_first_cold_fill() {
        let clock = Arc::new(FakeClock::new(0));
        let coordinator = coordinator(clock.clone(), true);
        for _ in 0..4 {
            coordinator
                .handle_query(request(), CancellationToken::new())
                .await
                .ok();
        }
        // The footprint is now hot, but nothing has been filled under the
        // freshness-gated coordinator yet, so the first request must reject.
        let outcome = coordinator
            .handle_query(request(), CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, QueryOutcome::FreshnessRejected { reason: "miss" }));
    }

    #[tokio::test]
    async fn disallowed_filter_is_rejected_before_any_lookup() {
        let clock = Arc::new(FakeClock::new(0));
        let coordinator = coordinator(clock, false);
        let mut req = request();
        req.filter = "1=1; DROP TABLE parcels;".to_string();
        let result = coordinator.handle_query(req, CancellationToken::new()).await;
        assert!(matches!(result, Err(EngineError::DisallowedFilter)));
    }

    #[tokio::test]
    async fn missing_layer_is_rejected() {
        let clock = Arc::new(FakeClock::new(0));
        let coordinator = coordinator(clock, false);
        let mut req = request();
        req.layer = String::new();
        let result = coordinator.handle_query(req, CancellationToken::new()).await;
        assert!(matches!(result, Err(EngineError::MissingLayer)));
    }

    #[test]
    fn fake_clock_advances_monotonically() {
        let clock = FakeClock::new(100);
        clock.advance(10);
        assert_eq!(clock.now().unix_timestamp(), 110);
    }

    #[tokio::test]
    async fn cache_read_failure_is_downgraded_to_miss() {
        let clock = Arc::new(FakeClock::new(0));
        let coordinator = coordinator_with_kv(clock.clone(), false, Arc::new(FailingKvStore));
        for _ in 0..4 {
            coordinator
                .handle_query(request(), CancellationToken::new())
                .await
                .ok();
        }
        // Every read against this layer errors; handle_query must still
        // respond (by treating the failed read as a miss and filling) rather
        // than surfacing the KV error as a request failure.
        let outcome = coordinator
            .handle_query(request(), CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, QueryOutcome::Composed { .. }));
    }

    #[tokio::test]
    async fn hot_fill_uses_decided_ttl_band() {
        let clock = Arc::new(FakeClock::new(0));
        let recording = Arc::new(RecordingKvStore::new());
        let kv: Arc<dyn KVStore> = recording.clone();
        // A tiny threshold means even this call's own hotness increment
        // (applied before the decision) already clears the Hot band
        // (max_score >= 4 * threshold), so a single request exercises it.
        let coordinator = coordinator_with_config(
            clock.clone(),
            kv,
            CoordinatorConfig {
                r_base: 8,
                r_min: 0,
                r_max: 15,
                hot_threshold: 0.1,
                ttl_cold: Duration::from_secs(30),
                ttl_warm: Duration::from_secs(300),
                ttl_hot: Duration::from_secs(1800),
                serve_only_if_fresh: false,
            },
        );
        coordinator
            .handle_query(request(), CancellationToken::new())
            .await
            .unwrap();

        let ttls = recording.ttls.lock().unwrap();
        assert!(
            ttls.iter().any(|&ttl| ttl == Duration::from_secs(1800)),
            "expected a shard written with the hot-band TTL, got {ttls:?}"
        );
        assert!(
            !ttls.iter().any(|&ttl| ttl == Duration::from_secs(600)),
            "shard must not fall back to the TTL policy's default, got {ttls:?}"
        );
    }
}
