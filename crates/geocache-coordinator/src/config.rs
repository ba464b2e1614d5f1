use clap::{Args, Parser};
use std::collections::HashMap;
use std::time::Duration;

/// The engine's full configuration surface (spec.md §6), mirroring the
/// `dekaf`-style `Cli` struct: a `clap::Parser` that also derives
/// `serde::Serialize` so the resolved config can be logged at startup.
#[derive(Debug, Parser, serde::Serialize)]
#[command(about, version)]
pub struct EngineConfig {
    /// Listen address of the (out-of-scope) HTTP front-end.
    #[arg(long, env = "ADDR", default_value = "0.0.0.0:8080")]
    pub addr: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "UPSTREAM_URL")]
    pub upstream_url: String,

    /// Base H3 resolution a request is mapped to before adaptive adjustment.
    #[arg(long, env = "H3_RES", default_value = "8")]
    pub h3_res: u8,
    #[arg(long, env = "H3_RES_MIN", default_value = "0")]
    pub h3_res_min: u8,
    #[arg(long, env = "H3_RES_MAX", default_value = "15")]
    pub h3_res_max: u8,

    #[arg(long, env = "HOT_THRESHOLD", default_value = "5.0")]
    pub hot_threshold: f64,
    #[arg(long, env = "HOT_HALF_LIFE", value_parser = humantime::parse_duration, default_value = "5m")]
    pub hot_half_life: Duration,

    #[arg(long, env = "CACHE_TTL_DEFAULT", value_parser = humantime::parse_duration, default_value = "10m")]
    pub cache_ttl_default: Duration,
    /// `key=duration,...` where key is a full layer name or a `namespace:`
    /// prefix.
    #[arg(long, env = "CACHE_TTL_OVERRIDES", value_delimiter = ',')]
    pub cache_ttl_overrides: Vec<String>,

    #[arg(long, env = "CACHE_FILL_MAX_WORKERS", default_value = "8")]
    pub cache_fill_max_workers: usize,
    #[arg(long, env = "CACHE_FILL_QUEUE", default_value = "64")]
    pub cache_fill_queue: usize,
    #[arg(long, env = "CACHE_OP_TIMEOUT", value_parser = humantime::parse_duration, default_value = "2s")]
    pub cache_op_timeout: Duration,

    #[command(flatten)]
    pub invalidation: InvalidationArgs,

    #[command(flatten)]
    pub adaptive: AdaptiveArgs,
}

impl EngineConfig {
    /// Parses `CACHE_TTL_OVERRIDES` entries into a `layer -> ttl` map,
    /// skipping (and logging) malformed entries rather than failing startup.
    pub fn ttl_overrides(&self) -> HashMap<String, Duration> {
        let mut out = HashMap::new();
        for entry in &self.cache_ttl_overrides {
            match entry.split_once('=') {
                Some((key, raw_duration)) => match humantime::parse_duration(raw_duration) {
                    Ok(ttl) => {
                        out.insert(key.to_string(), ttl);
                    }
                    Err(err) => {
                        tracing::warn!(entry, %err, "skipping malformed CACHE_TTL_OVERRIDES entry");
                    }
                },
                None => tracing::warn!(entry, "skipping malformed CACHE_TTL_OVERRIDES entry"),
            }
        }
        out
    }
}

#[derive(Args, Debug, serde::Serialize)]
pub struct InvalidationArgs {
    #[arg(id = "invalidation_enabled", long = "invalidation-enabled", env = "INVALIDATION_ENABLED", default_value = "false")]
    pub enabled: bool,
    #[arg(long = "invalidation-driver", env = "INVALIDATION_DRIVER", default_value = "none")]
    pub driver: String,
    #[arg(long = "invalidation-brokers", env = "INVALIDATION_BROKERS", value_delimiter = ',')]
    pub brokers: Vec<String>,
    #[arg(long = "invalidation-topic", env = "INVALIDATION_TOPIC", default_value = "")]
    pub topic: String,
    #[arg(long = "invalidation-group-id", env = "INVALIDATION_GROUP_ID", default_value = "")]
    pub group_id: String,
    #[arg(long = "invalidation-session-timeout", env = "INVALIDATION_SESSION_TIMEOUT", value_parser = humantime::parse_duration, default_value = "30s")]
    pub session_timeout: Duration,
    #[arg(long = "invalidation-heartbeat", env = "INVALIDATION_HEARTBEAT", value_parser = humantime::parse_duration, default_value = "3s")]
    pub heartbeat: Duration,
    #[arg(long = "invalidation-rebalance-timeout", env = "INVALIDATION_REBALANCE_TIMEOUT", value_parser = humantime::parse_duration, default_value = "60s")]
    pub rebalance_timeout: Duration,
    #[arg(long = "invalidation-initial-oldest", env = "INVALIDATION_INITIAL_OLDEST", default_value = "false")]
    pub initial_oldest: bool,
}

#[derive(Args, Debug, serde::Serialize)]
pub struct AdaptiveArgs {
    #[arg(id = "adaptive_enabled", long = "adaptive-enabled", env = "ADAPTIVE_ENABLED", default_value = "true")]
    pub enabled: bool,
    #[arg(long = "adaptive-dry-run", env = "ADAPTIVE_DRY_RUN", default_value = "false")]
    pub dry_run: bool,
    #[arg(long = "adaptive-seed", env = "ADAPTIVE_SEED", default_value = "0")]
    pub seed: u64,
    #[arg(long = "adaptive-serve-only-if-fresh", env = "ADAPTIVE_SERVE_ONLY_IF_FRESH", default_value = "false")]
    pub serve_only_if_fresh: bool,
    #[arg(long = "adaptive-ttl-cold", env = "ADAPTIVE_TTL_COLD", value_parser = humantime::parse_duration, default_value = "30s")]
    pub ttl_cold: Duration,
    #[arg(long = "adaptive-ttl-warm", env = "ADAPTIVE_TTL_WARM", value_parser = humantime::parse_duration, default_value = "5m")]
    pub ttl_warm: Duration,
    #[arg(long = "adaptive-ttl-hot", env = "ADAPTIVE_TTL_HOT", value_parser = humantime::parse_duration, default_value = "30m")]
    pub ttl_hot: Duration,
}
