use crate::{KVStore, KvError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// An in-memory stand-in for the external KV driver, used by tests and by
/// the demo binary. The real driver is an external collaborator
/// (spec.md §1) this crate never owns in production.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        MemoryKvStore {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl KVStore for MemoryKvStore {
    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, KvError> {
        let now = Instant::now();
        let guard = self.entries.lock().await;
        let mut out = HashMap::new();
        for key in keys {
            if let Some(entry) = guard.get(key) {
                if entry.expires_at > now {
                    out.insert(key.clone(), entry.value.clone());
                }
            }
        }
        Ok(out)
    }

    async fn set(&self, key: String, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
        let mut guard = self.entries.lock().await;
        guard.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn mset(&self, entries: Vec<(String, Vec<u8>, Duration)>) -> Result<(), KvError> {
        let mut guard = self.entries.lock().await;
        let now = Instant::now();
        for (key, value, ttl) in entries {
            guard.insert(
                key,
                Entry {
                    value,
                    expires_at: now + ttl,
                },
            );
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), KvError> {
        let mut guard = self.entries.lock().await;
        for key in keys {
            guard.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_mget_hits() {
        let store = MemoryKvStore::new();
        store
            .set("a".to_string(), b"x".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let got = store.mget(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(got.get("a").unwrap(), b"x");
        assert!(!got.contains_key("b"));
    }

    #[tokio::test]
    async fn del_removes_entry() {
        let store = MemoryKvStore::new();
        store
            .set("a".to_string(), b"x".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        store.del(&["a".to_string()]).await.unwrap();
        let got = store.mget(&["a".to_string()]).await.unwrap();
        assert!(got.is_empty());
    }
}
