use thiserror::Error;

/// Error taxonomy for the engine. Each variant maps to a stable `status_hint`
/// that the (out-of-scope) HTTP front-end can use without this crate
/// depending on an HTTP status type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid bbox")]
    InvalidBoundingBox,
    #[error("invalid polygon")]
    InvalidPolygon,
    #[error("disallowed filter")]
    DisallowedFilter,
    #[error("missing layer")]
    MissingLayer,
    #[error("invalid resolution: {0}")]
    InvalidResolution(i16),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("cache operation failed: {0}")]
    CacheOpFailed(String),

    #[error("operation timed out or was canceled")]
    TimeoutOrCanceled,

    #[error("fresh content required")]
    FreshnessGate,

    #[error("invalidation event malformed: {0}")]
    InvalidationMalformed(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EngineError {
    /// Numeric status the spec assigns to this error kind (see spec.md §6-7).
    pub fn status_hint(&self) -> u16 {
        match self {
            EngineError::InvalidBoundingBox
            | EngineError::InvalidPolygon
            | EngineError::DisallowedFilter
            | EngineError::MissingLayer
            | EngineError::InvalidResolution(_) => 400,
            EngineError::UpstreamUnavailable(_) => 502,
            EngineError::CacheOpFailed(_) => 502,
            EngineError::TimeoutOrCanceled => 408,
            EngineError::FreshnessGate => 412,
            EngineError::InvalidationMalformed(_) => 200,
            EngineError::Internal(_) => 500,
        }
    }
}
