use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;

use crate::campaign::Campaign;
use crate::snapshot::Snapshot;
use crate::{CoreError, CoreResult};

/// Key-value store holding raw campaign records.
#[async_trait]
pub trait CampaignSource: Send + Sync {
    /// Every record, keyed by the field it is stored under.
    async fn load_all(&self) -> CoreResult<HashMap<String, String>>;

    /// A single record by ordinal key (see [`ordinal_key`]).
    async fn load_one(&self, key: &str) -> CoreResult<String>;

    /// Number of records currently stored.
    async fn count(&self) -> CoreResult<usize>;
}

/// Ordinal keys run from `"1"` to `"<count>"`.
pub fn ordinal_key(ordinal: usize) -> String {
    ordinal.to_string()
}

/// Bulk load and decode every campaign.
///
/// The first malformed record aborts the load; its key is in the error.
pub async fn load_snapshot<S>(source: &S, version: u64) -> CoreResult<Snapshot>
where
    S: CampaignSource + ?Sized,
{
    let raw = source.load_all().await?;
    if raw.is_empty() {
        return Err(CoreError::DatasetEmpty("store returned no campaign records".to_string()));
    }

    let campaigns = raw
        .iter()
        .map(|(key, record)| Campaign::decode(key, record))
        .collect::<CoreResult<Vec<_>>>()?;

    Ok(Snapshot::new(campaigns, version))
}

/// Lazily enumerate campaigns straight from the store.
///
/// Up to `prefetch` records are in flight at once, so items arrive in no
/// particular order. Per-item failures are yielded, not swallowed; a failing
/// `count` yields a single error and ends the stream.
pub fn live_campaigns<S>(
    source: Arc<S>,
    prefetch: usize,
) -> impl Stream<Item = CoreResult<Campaign>> + Send + 'static
where
    S: CampaignSource + ?Sized + 'static,
{
    let prefetch = prefetch.max(1);

    stream::once(async move {
        match source.count().await {
            Ok(count) => stream::iter(1..=count)
                .map(move |ordinal| {
                    let source = source.clone();
                    async move {
                        let key = ordinal_key(ordinal);
                        let raw = source.load_one(&key).await?;
                        Campaign::decode(&key, &raw)
                    }
                })
                .buffer_unordered(prefetch)
                .left_stream(),
            Err(e) => stream::iter(std::iter::once(Err(e))).right_stream(),
        }
    })
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        records: HashMap<String, String>,
        count_fails: bool,
    }

    #[async_trait]
    impl CampaignSource for FixedSource {
        async fn load_all(&self) -> CoreResult<HashMap<String, String>> {
            Ok(self.records.clone())
        }

        async fn load_one(&self, key: &str) -> CoreResult<String> {
            self.records
                .get(key)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(key.to_string()))
        }

        async fn count(&self) -> CoreResult<usize> {
            if self.count_fails {
                return Err(CoreError::StoreUnavailable("connection refused".to_string()));
            }
            Ok(self.records.len())
        }
    }

    fn source(records: &[(&str, &str)]) -> FixedSource {
        FixedSource {
            records: records.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            count_fails: false,
        }
    }

    const FIRST: &str = r#"{"id": 1, "name": "test1", "positions": [{"position": 10, "distance": 2}], "publishers": [1, 2, 3], "cpm": 3.33}"#;
    const SECOND: &str = r#"{"id": 2, "name": "test2", "positions": [{"position": 20, "distance": 2}], "publishers": [1, 7, 8], "cpm": 4.21}"#;

    #[tokio::test]
    async fn test_load_snapshot() {
        let snapshot = load_snapshot(&source(&[("1", FIRST), ("2", SECOND)]), 1).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.version(), 1);
    }

    #[tokio::test]
    async fn test_load_snapshot_empty_dataset() {
        let err = load_snapshot(&source(&[]), 1).await.unwrap_err();
        assert!(matches!(err, CoreError::DatasetEmpty(_)));
    }

    #[tokio::test]
    async fn test_load_snapshot_aborts_on_malformed_record() {
        let err = load_snapshot(&source(&[("1", FIRST), ("broken", "{")]), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MalformedRecord { ref key, .. } if key == "broken"));
    }

    #[tokio::test]
    async fn test_live_campaigns_yields_per_item_errors() {
        let src = Arc::new(source(&[("1", FIRST), ("2", "not json"), ("3", SECOND)]));
        let items: Vec<_> = live_campaigns(src, 2).collect().await;

        assert_eq!(items.len(), 3);
        assert_eq!(items.iter().filter(|i| i.is_ok()).count(), 2);
        assert!(items
            .iter()
            .any(|i| matches!(i, Err(CoreError::MalformedRecord { key, .. }) if key == "2")));
    }

    #[tokio::test]
    async fn test_live_campaigns_count_failure() {
        let src = Arc::new(FixedSource {
            records: HashMap::new(),
            count_fails: true,
        });
        let items: Vec<_> = live_campaigns(src, 4).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(CoreError::StoreUnavailable(_))));
    }
}
