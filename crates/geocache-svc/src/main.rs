//! Process wiring for the engine: parses `EngineConfig`, assembles the
//! collaborators (`HotnessTracker`, `FeatureShardStore`, `FillWorkerPool`,
//! `InvalidationEngine`, `QueryCoordinator`), and waits for shutdown.
//!
//! The actual KV driver and upstream transport are out of scope (spec.md
//! §6's "Non-goals"); this binary wires an in-memory store and a no-op
//! upstream client so the engine can be exercised end-to-end without an
//! external deployment.

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use geocache_coordinator::{CoordinatorConfig, EngineConfig, QueryCoordinator, SystemClock};
use geocache_fill::{FillWorkerPool, UpstreamClient};
use geocache_hotness::HotnessTracker;
use geocache_invalidate::InvalidationEngine;
use geocache_metrics::EngineMetrics;
use geocache_store::{FeatureShardStore, MemoryKvStore, TtlPolicy};
use geocache_types::{EngineError, FeatureCollection, Filter, LayerInvalidatedAt, Scenario};
use std::sync::Arc;

struct NullUpstream;

#[async_trait]
impl UpstreamClient for NullUpstream {
    async fn fetch_cell_features(
        &self,
        _polygon: &geo_types::MultiPolygon<f64>,
        _filter: &Filter,
    ) -> Result<FeatureCollection, EngineError> {
        Ok(FeatureCollection::empty())
    }

    async fn forward_stream(&self, _filter: &Filter) -> Result<FeatureCollection, EngineError> {
        Ok(FeatureCollection::empty())
    }
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::parse();
    init_logging(&config.log_level);
    tracing::info!(config = ?config, "starting geocache engine");

    let hotness = Arc::new(HotnessTracker::new(config.hot_half_life));
    let store = Arc::new(FeatureShardStore::new(
        Arc::new(MemoryKvStore::new()),
        TtlPolicy::new(config.cache_ttl_default, config.ttl_overrides()),
    ));
    let watermarks = Arc::new(LayerInvalidatedAt::new());
    let registry = prometheus::Registry::new();
    let metrics = Arc::new(EngineMetrics::new(&registry)?);
    let fill_pool = FillWorkerPool::new(
        config.cache_fill_max_workers,
        config.cache_fill_queue,
        config.cache_op_timeout,
    );
    let upstream: Arc<dyn UpstreamClient> = Arc::new(NullUpstream);

    let _invalidation = Arc::new(InvalidationEngine::new(
        store.clone(),
        hotness.clone(),
        watermarks.clone(),
        default_invalidation_resolutions(config.h3_res),
        metrics.clone(),
    ));

    let _coordinator = QueryCoordinator::new(
        CoordinatorConfig {
            r_base: config.h3_res,
            r_min: config.h3_res_min,
            r_max: config.h3_res_max,
            hot_threshold: config.hot_threshold,
            ttl_cold: config.adaptive.ttl_cold,
            ttl_warm: config.adaptive.ttl_warm,
            ttl_hot: config.adaptive.ttl_hot,
            serve_only_if_fresh: config.adaptive.serve_only_if_fresh,
        },
        hotness,
        store,
        fill_pool,
        upstream,
        watermarks,
        metrics.clone(),
        Arc::new(SystemClock),
        Arc::new(Scenario::default()),
    );

    tracing::info!(addr = %config.addr, "engine ready; request transport is wired by the embedding service");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}

fn default_invalidation_resolutions(base: u8) -> Vec<u8> {
    vec![base]
}
