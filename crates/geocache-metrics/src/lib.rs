//! Local metric registration for the coordinator's observations (spec.md
//! §4.H's `spatial_response` and `reason=stale`/`reason=miss` counters).
//! Exposition (an HTTP `/metrics` route, à la `dekaf/src/metrics.rs`) is the
//! front-end's concern; this crate only registers and increments.

use geocache_types::HitClass;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

pub struct EngineMetrics {
    spatial_responses: IntCounterVec,
    freshness_rejections: IntCounterVec,
    invalidation_events: IntCounterVec,
    upstream_calls: IntCounter,
    upstream_failures: IntCounter,
}

impl EngineMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let spatial_responses = IntCounterVec::new(
            Opts::new(
                "geocache_spatial_responses_total",
                "Composed spatial query responses by cache hit class",
            ),
            &["hit_class"],
        )?;
        registry.register(Box::new(spatial_responses.clone()))?;

        let freshness_rejections = IntCounterVec::new(
            Opts::new(
                "geocache_freshness_rejections_total",
                "ServeOnlyIfFresh rejections by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(freshness_rejections.clone()))?;

        let invalidation_events = IntCounterVec::new(
            Opts::new(
                "geocache_invalidation_events_total",
                "Invalidation events by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(invalidation_events.clone()))?;

        let upstream_calls = IntCounter::new(
            "geocache_upstream_calls_total",
            "Per-cell upstream fetch calls issued by the fill pool",
        )?;
        registry.register(Box::new(upstream_calls.clone()))?;

        let upstream_failures = IntCounter::new(
            "geocache_upstream_failures_total",
            "Per-cell upstream fetch failures",
        )?;
        registry.register(Box::new(upstream_failures.clone()))?;

        Ok(EngineMetrics {
            spatial_responses,
            freshness_rejections,
            invalidation_events,
            upstream_calls,
            upstream_failures,
        })
    }

    pub fn record_spatial_response(&self, hit_class: HitClass) {
        self.spatial_responses.with_label_values(&[hit_class_label(hit_class)]).inc();
    }

    /// `reason` is `"stale"` or `"miss"`, per spec.md §4.H — never collapsed.
    pub fn record_freshness_rejection(&self, reason: &str) {
        self.freshness_rejections.with_label_values(&[reason]).inc();
    }

    pub fn record_invalidation(&self, outcome: &str) {
        self.invalidation_events.with_label_values(&[outcome]).inc();
    }

    pub fn record_upstream_call(&self) {
        self.upstream_calls.inc();
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.inc();
    }
}

fn hit_class_label(hit_class: HitClass) -> &'static str {
    match hit_class {
        HitClass::FullHit => "full_hit",
        HitClass::PartialHit => "partial_hit",
        HitClass::Miss => "miss",
    }
}
