use std::collections::HashMap;
use std::sync::RwLock;

/// Per-layer invalidation watermark. Readers take a read lock (cheap,
/// concurrent); writers take a write lock and only ever move a layer's
/// entry forward (spec.md §5: "writers use a monotone CAS ensuring
/// non-decreasing updates").
#[derive(Default)]
pub struct LayerInvalidatedAt {
    watermarks: RwLock<HashMap<String, i64>>,
}

impl LayerInvalidatedAt {
    pub fn new() -> Self {
        LayerInvalidatedAt { watermarks: RwLock::new(HashMap::new()) }
    }

    pub fn get(&self, layer: &str) -> i64 {
        *self.watermarks.read().unwrap().get(layer).unwrap_or(&0)
    }

    /// Sets `watermarks[layer] = max(existing, ts)`, returning the resulting
    /// value.
    pub fn advance(&self, layer: &str, ts: i64) -> i64 {
        let mut guard = self.watermarks.write().unwrap();
        let entry = guard.entry(layer.to_string()).or_insert(0);
        if ts > *entry {
            *entry = ts;
        }
        *entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_monotone() {
        let w = LayerInvalidatedAt::new();
        assert_eq!(w.advance("L", 100), 100);
        assert_eq!(w.advance("L", 50), 100);
        assert_eq!(w.get("L"), 100);
    }

    #[test]
    fn unknown_layer_defaults_to_zero() {
        let w = LayerInvalidatedAt::new();
        assert_eq!(w.get("missing"), 0);
    }
}
