use chrono::{DateTime, Utc};

use crate::campaign::Campaign;

/// Immutable, timestamped materialization of every campaign in the store.
///
/// Shared behind an `Arc` by every request that reads it; a refresh builds a
/// new value instead of touching this one.
#[derive(Debug, Clone)]
pub struct Snapshot {
    campaigns: Vec<Campaign>,
    captured_at: DateTime<Utc>,
    version: u64,
}

impl Snapshot {
    pub fn new(campaigns: Vec<Campaign>, version: u64) -> Self {
        Self {
            campaigns,
            captured_at: Utc::now(),
            version,
        }
    }

    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// 1 for the warmup load, incremented on every successful refresh.
    pub fn version(&self) -> u64 {
        self.version
    }
}
