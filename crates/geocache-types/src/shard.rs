use crate::cell::Cell;
use crate::filter::{sanitize, Filter, FilterFingerprint};

/// `(layer, resolution, cellId, filterFingerprint)`. Two keys are equal iff
/// all four components compare equal byte-for-byte after canonicalization.
/// Keys for different resolutions of the same cell are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardKey {
    pub layer: String,
    pub resolution: u8,
    pub cell: String,
    pub filter_fingerprint: String,
}

impl ShardKey {
    pub fn new(layer: &str, resolution: u8, cell: Cell, filter: &Filter) -> Self {
        let fp = filter.fingerprint();
        ShardKey {
            layer: layer.to_string(),
            resolution,
            cell: cell.to_string(),
            filter_fingerprint: format!("{}{}", fp.prefix, fp.hash_hex),
        }
    }

    fn fingerprint(&self, filter: &Filter) -> FilterFingerprint {
        filter.fingerprint()
    }

    /// `{sanitizedLayer}:{res}:{cellId}:filters={sanitizedFilter}:f={16 hex chars}`.
    pub fn to_storage_key(&self, raw_filter: &Filter) -> String {
        let fp = self.fingerprint(raw_filter);
        format!(
            "{}:{}:{}:filters={}:f={}",
            sanitize(&self.layer),
            self.resolution,
            self.cell,
            fp.prefix,
            fp.hash_hex
        )
    }
}

/// Opaque byte payload representing a serialized `FeatureCollection` for one
/// cell, with the small fixed header described in spec.md §4.C.
#[derive(Debug, Clone)]
pub struct Shard {
    pub payload: Vec<u8>,
    pub write_time_unix: i64,
}

const HEADER_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 8;

impl Shard {
    pub fn new(payload: Vec<u8>, write_time_unix: i64) -> Self {
        Shard {
            payload,
            write_time_unix,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(HEADER_VERSION);
        out.extend_from_slice(&self.write_time_unix.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decodes a shard value, tolerating legacy headerless payloads (treated
    /// as `write_time_unix = 0`).
    pub fn decode(bytes: &[u8]) -> Shard {
        if bytes.len() >= HEADER_LEN && bytes[0] == HEADER_VERSION {
            let mut ts_bytes = [0u8; 8];
            ts_bytes.copy_from_slice(&bytes[1..HEADER_LEN]);
            let write_time_unix = i64::from_be_bytes(ts_bytes);
            Shard {
                payload: bytes[HEADER_LEN..].to_vec(),
                write_time_unix,
            }
        } else {
            Shard {
                payload: bytes.to_vec(),
                write_time_unix: 0,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardMeta {
    pub from_cache: bool,
    pub write_time_unix: i64,
    pub shard_id: String,
}
