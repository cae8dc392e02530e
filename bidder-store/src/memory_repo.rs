use async_trait::async_trait;
use bidder_core::{CampaignSource, CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

/// In-process campaign store with the same contract as the Redis one.
///
/// Outages can be simulated with [`MemoryCampaignStore::set_available`].
pub struct MemoryCampaignStore {
    records: RwLock<HashMap<String, String>>,
    available: AtomicBool,
    bulk_loads: AtomicUsize,
}

impl MemoryCampaignStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            bulk_loads: AtomicUsize::new(0),
        }
    }

    pub fn with_records<K, V>(records: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (key, raw) in records {
            store.insert(key, raw);
        }
        store
    }

    pub fn insert(&self, key: impl Into<String>, raw: impl Into<String>) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(key.into(), raw.into());
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `load_all` calls served so far, failed ones included.
    pub fn bulk_loads(&self) -> usize {
        self.bulk_loads.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> CoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::StoreUnavailable("memory store switched off".to_string()))
        }
    }
}

impl Default for MemoryCampaignStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CampaignSource for MemoryCampaignStore {
    async fn load_all(&self) -> CoreResult<HashMap<String, String>> {
        self.bulk_loads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        if records.is_empty() {
            return Err(CoreError::DatasetEmpty("memory store holds no campaigns".to_string()));
        }
        Ok(records.clone())
    }

    async fn load_one(&self, key: &str) -> CoreResult<String> {
        self.check_available()?;
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(key.to_string()))
    }

    async fn count(&self) -> CoreResult<usize> {
        self.check_available()?;
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryCampaignStore::with_records([("1", "{}"), ("2", "{}")]);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.load_one("1").await.unwrap(), "{}");
        assert!(matches!(store.load_one("3").await, Err(CoreError::NotFound(_))));
        assert_eq!(store.load_all().await.unwrap().len(), 2);
        assert_eq!(store.bulk_loads(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_outage() {
        let store = MemoryCampaignStore::with_records([("1", "{}")]);
        store.set_available(false);
        assert!(matches!(store.load_all().await, Err(CoreError::StoreUnavailable(_))));
        assert!(matches!(store.count().await, Err(CoreError::StoreUnavailable(_))));
        assert_eq!(store.bulk_loads(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_empty() {
        let store = MemoryCampaignStore::new();
        assert!(matches!(store.load_all().await, Err(CoreError::DatasetEmpty(_))));
    }
}
