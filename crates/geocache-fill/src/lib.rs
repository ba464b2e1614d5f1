//! Bounded-concurrency fetch-and-populate pool for cache misses
//! (spec.md §4.E).

use async_trait::async_trait;
use geocache_store::FeatureShardStore;
use geocache_types::{EngineError, Filter, FeatureCollection, ShardKey};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// The upstream collaborator this pool fetches from; the transport and wire
/// protocol are the (out-of-scope) upstream client's concern (spec.md §6).
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch_cell_features(
        &self,
        polygon: &geo_types::MultiPolygon<f64>,
        filter: &Filter,
    ) -> Result<FeatureCollection, EngineError>;

    /// Used by the bypass path, not by this pool.
    async fn forward_stream(&self, filter: &Filter) -> Result<FeatureCollection, EngineError>;
}

pub struct FillJob {
    pub shard_key: ShardKey,
    pub filter: Filter,
    pub cell_polygon: geo_types::MultiPolygon<f64>,
    pub ttl: Duration,
    pub now_unix: i64,
}

pub struct FillWorkerPool {
    max_workers: usize,
    queue_size: usize,
    op_timeout: Duration,
}

impl FillWorkerPool {
    pub fn new(max_workers: usize, queue_size: usize, op_timeout: Duration) -> Self {
        FillWorkerPool {
            max_workers: max_workers.max(1),
            queue_size: queue_size.max(1),
            op_timeout,
        }
    }

    /// Launches at most `max_workers` concurrent fetches. Every job runs to
    /// completion (or times out / is canceled) before this returns; a
    /// per-cell failure is recorded but does not abort sibling jobs. If any
    /// job failed, returns the first such error — the caller discards all
    /// fills for this request even though individual shards may now sit in
    /// the store for future requests.
    pub async fn run(
        &self,
        jobs: Vec<FillJob>,
        upstream: Arc<dyn UpstreamClient>,
        store: Arc<FeatureShardStore>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        if jobs.is_empty() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel::<FillJob>(self.queue_size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let failure: Arc<Mutex<Option<EngineError>>> = Arc::new(Mutex::new(None));

        let feeder_cancel = cancel.clone();
        let feeder = tokio::spawn(async move {
            for job in jobs {
                tokio::select! {
                    _ = feeder_cancel.cancelled() => break,
                    sent = tx.send(job) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut workers = Vec::with_capacity(self.max_workers);
        for _ in 0..self.max_workers {
            let rx = rx.clone();
            let semaphore = semaphore.clone();
            let upstream = upstream.clone();
            let store = store.clone();
            let cancel = cancel.clone();
            let failure = failure.clone();
            let op_timeout = self.op_timeout;

            workers.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(job) = job else { break };

                    let Ok(_permit) = semaphore.acquire().await else {
                        break;
                    };

                    if let Err(err) = run_job(upstream.as_ref(), store.as_ref(), &job, op_timeout, &cancel).await {
                        let mut guard = failure.lock().unwrap();
                        if guard.is_none() {
                            *guard = Some(err);
                        }
                    }
                }
            }));
        }

        let _ = feeder.await;
        for worker in workers {
            let _ = worker.await;
        }

        let result = failure.lock().unwrap().take();
        match result {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn run_job(
    upstream: &dyn UpstreamClient,
    store: &FeatureShardStore,
    job: &FillJob,
    op_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let fetch = upstream.fetch_cell_features(&job.cell_polygon, &job.filter);
    let fc = tokio::select! {
        _ = cancel.cancelled() => return Err(EngineError::TimeoutOrCanceled),
        res = timeout(op_timeout, fetch) => match res {
            Ok(Ok(fc)) => fc,
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(EngineError::TimeoutOrCanceled),
        },
    };

    let payload = serde_json::to_vec(&fc).map_err(|e| EngineError::Internal(e.to_string()))?;
    store.put(&job.shard_key, &job.filter, payload, job.now_unix, job.ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocache_store::MemoryKvStore;
    use geocache_store::TtlPolicy;
    use geocache_types::Cell;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingUpstream {
        inflight: AtomicUsize,
        peak: AtomicUsize,
        fail_all: bool,
    }

    #[async_trait]
    impl UpstreamClient for CountingUpstream {
        async fn fetch_cell_features(
            &self,
            _polygon: &geo_types::MultiPolygon<f64>,
            _filter: &Filter,
        ) -> Result<FeatureCollection, EngineError> {
            let current = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_all {
                Err(EngineError::UpstreamUnavailable("boom".into()))
            } else {
                Ok(FeatureCollection::empty())
            }
        }

        async fn forward_stream(&self, _filter: &Filter) -> Result<FeatureCollection, EngineError> {
            Ok(FeatureCollection::empty())
        }
    }

    fn job(cell_id: &str, now: i64) -> FillJob {
        let cell: Cell = cell_id.parse().unwrap();
        FillJob {
            shard_key: ShardKey::new("layer", 8, cell, &Filter::new("")),
            filter: Filter::new(""),
            cell_polygon: geo_types::MultiPolygon(vec![]),
            ttl: Duration::from_secs(60),
            now_unix: now,
        }
    }

    fn store() -> Arc<FeatureShardStore> {
        Arc::new(FeatureShardStore::new(
            Arc::new(MemoryKvStore::new()),
            TtlPolicy::new(Duration::from_secs(60), HashMap::new()),
        ))
    }

    #[tokio::test]
    async fn peak_concurrency_never_exceeds_max_workers() {
        let upstream = Arc::new(CountingUpstream {
            inflight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            fail_all: false,
        });
        let cell = h3o::LatLng::new(59.33, 18.06).unwrap().to_cell(h3o::Resolution::Eight);
        let jobs: Vec<FillJob> = (0..6).map(|_| job(&cell.to_string(), 1_000)).collect();

        let pool = FillWorkerPool::new(2, 8, Duration::from_secs(5));
        let result = pool.run(jobs, upstream.clone(), store(), CancellationToken::new()).await;
        assert!(result.is_ok());
        assert!(upstream.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn any_job_failure_surfaces_as_request_level_error() {
        let upstream = Arc::new(CountingUpstream {
            inflight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            fail_all: true,
        });
        let cell = h3o::LatLng::new(1.0, 1.0).unwrap().to_cell(h3o::Resolution::Eight);
        let jobs = vec![job(&cell.to_string(), 1_000)];
        let pool = FillWorkerPool::new(2, 8, Duration::from_secs(5));
        let result = pool.run(jobs, upstream, store(), CancellationToken::new()).await;
        assert!(matches!(result, Err(EngineError::UpstreamUnavailable(_))));
    }
}
