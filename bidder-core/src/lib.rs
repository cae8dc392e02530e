pub mod campaign;
pub mod repository;
pub mod snapshot;
pub mod cache;

pub use campaign::{Campaign, PositionRule, Targets};
pub use repository::{live_campaigns, load_snapshot, CampaignSource};
pub use snapshot::Snapshot;
pub use cache::{CacheConfig, CacheState, Refresh, Refresher, SnapshotCache};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Campaign store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("No campaign records found: {0}")]
    DatasetEmpty(String),
    #[error("Campaign record not found: {0}")]
    NotFound(String),
    #[error("Malformed campaign record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },
    #[error("Unsupported candidate type: {0}")]
    UnsupportedCandidateType(String),
    #[error("Snapshot cache is closed")]
    CacheClosed,
}

pub type CoreResult<T> = Result<T, CoreError>;
