//! Typed wrapper over an external `KVStore`: `(layer, cell, res, filter)` ->
//! shard bytes, with TTL/override policy and freshness metadata
//! (spec.md §4.C).

mod memory;

pub use memory::MemoryKvStore;

use async_trait::async_trait;
use geocache_types::{EngineError, Filter, Shard, ShardKey, ShardMeta};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv store operation failed: {0}")]
    Op(String),
}

/// The external KV store driver this crate is layered over (spec.md §1, §6).
/// Transport and on-wire encoding of `bytes` are the driver's concern; this
/// crate only ever hands it the encoded shard bytes from `Shard::encode`.
#[async_trait]
pub trait KVStore: Send + Sync {
    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, KvError>;
    async fn set(&self, key: String, value: Vec<u8>, ttl: Duration) -> Result<(), KvError>;
    async fn mset(&self, entries: Vec<(String, Vec<u8>, Duration)>) -> Result<(), KvError>;
    async fn del(&self, keys: &[String]) -> Result<(), KvError>;
}

/// A shard read result: fresh classification is left to the caller, since it
/// requires `LayerInvalidatedAt`, which this store does not own.
#[derive(Debug, Clone)]
pub struct ShardRead {
    pub shard: Shard,
    pub meta: ShardMeta,
}

/// `explicit per-layer override -> "namespace:" prefix override -> default`.
pub struct TtlPolicy {
    default_ttl: Duration,
    overrides: RwLock<HashMap<String, Duration>>,
}

impl TtlPolicy {
    pub fn new(default_ttl: Duration, overrides: HashMap<String, Duration>) -> Self {
        TtlPolicy {
            default_ttl,
            overrides: RwLock::new(overrides),
        }
    }

    pub fn ttl_for(&self, layer: &str) -> Duration {
        let overrides = self.overrides.read().unwrap();
        if let Some(ttl) = overrides.get(layer) {
            return *ttl;
        }
        let mut best: Option<(&str, Duration)> = None;
        for (key, ttl) in overrides.iter() {
            if let Some(prefix) = key.strip_suffix(':') {
                if layer.starts_with(prefix) {
                    if best.map(|(p, _)| prefix.len() > p.len()).unwrap_or(true) {
                        best = Some((key, *ttl));
                    }
                }
            }
        }
        best.map(|(_, ttl)| ttl).unwrap_or(self.default_ttl)
    }
}

pub struct FeatureShardStore {
    kv: std::sync::Arc<dyn KVStore>,
    ttl_policy: TtlPolicy,
}

impl FeatureShardStore {
    pub fn new(kv: std::sync::Arc<dyn KVStore>, ttl_policy: TtlPolicy) -> Self {
        FeatureShardStore { kv, ttl_policy }
    }

    /// The store's own default/override resolution (spec.md §4.C), for
    /// callers that have no per-request band decision to hand `put` instead.
    pub fn ttl_for(&self, layer: &str) -> Duration {
        self.ttl_policy.ttl_for(layer)
    }

    /// Missing keys are simply absent from the returned map (cache misses),
    /// matching spec.md §4.C.
    pub async fn mget(
        &self,
        keys: &[(ShardKey, Filter)],
    ) -> Result<HashMap<ShardKey, ShardRead>, EngineError> {
        let storage_keys: Vec<String> = keys
            .iter()
            .map(|(k, f)| k.to_storage_key(f))
            .collect();
        let raw = self
            .kv
            .mget(&storage_keys)
            .await
            .map_err(|e| EngineError::CacheOpFailed(e.to_string()))?;

        let mut out = HashMap::new();
        for ((key, _filter), storage_key) in keys.iter().zip(storage_keys.iter()) {
            if let Some(bytes) = raw.get(storage_key) {
                let shard = Shard::decode(bytes);
                let meta = ShardMeta {
                    from_cache: true,
                    write_time_unix: shard.write_time_unix,
                    shard_id: storage_key.clone(),
                };
                out.insert(key.clone(), ShardRead { shard, meta });
            }
        }
        Ok(out)
    }

    /// `ttl` is the caller's effective TTL for this shard (e.g. the
    /// AdaptiveDecider's hotness-band selection); this store never
    /// second-guesses it against `TtlPolicy` itself.
    pub async fn put(
        &self,
        key: &ShardKey,
        filter: &Filter,
        payload: Vec<u8>,
        write_time_unix: i64,
        ttl: Duration,
    ) -> Result<(), EngineError> {
        let storage_key = key.to_storage_key(filter);
        let shard = Shard::new(payload, write_time_unix);
        self.kv
            .set(storage_key, shard.encode(), ttl)
            .await
            .map_err(|e| EngineError::CacheOpFailed(e.to_string()))
    }

    pub async fn del(&self, keys: &[(ShardKey, Filter)]) -> Result<(), EngineError> {
        let storage_keys: Vec<String> = keys
            .iter()
            .map(|(k, f)| k.to_storage_key(f))
            .collect();
        self.kv
            .del(&storage_keys)
            .await
            .map_err(|e| EngineError::CacheOpFailed(e.to_string()))
    }
}

/// A shard is fresh iff `writeTimeUnix >= LayerInvalidatedAt[layer]`
/// (spec.md §3).
pub fn is_fresh(write_time_unix: i64, layer_invalidated_at: i64) -> bool {
    write_time_unix >= layer_invalidated_at
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_prefers_exact_override_over_namespace() {
        let mut overrides = HashMap::new();
        overrides.insert("layer.a".to_string(), Duration::from_secs(10));
        overrides.insert("layer.:".to_string(), Duration::from_secs(20));
        let policy = TtlPolicy::new(Duration::from_secs(30), overrides);
        assert_eq!(policy.ttl_for("layer.a"), Duration::from_secs(10));
        assert_eq!(policy.ttl_for("layer.b"), Duration::from_secs(20));
        assert_eq!(policy.ttl_for("other"), Duration::from_secs(30));
    }

    #[test]
    fn freshness_boundary() {
        assert!(is_fresh(100, 100));
        assert!(is_fresh(101, 100));
        assert!(!is_fresh(99, 100));
    }
}
