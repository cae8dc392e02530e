use bidder_core::{live_campaigns, CampaignSource, Snapshot, SnapshotCache};
use futures_util::Stream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bidder::Bidder;
use crate::matcher::Matcher;

/// Entry point used by the HTTP layer.
///
/// Every call runs under its own child of the service token, so shutting the
/// service down cancels in-flight searches.
pub struct BidService {
    cache: SnapshotCache,
    source: Arc<dyn CampaignSource>,
    bidder: Bidder<Matcher>,
    stream_prefetch: usize,
    shutdown: CancellationToken,
}

impl BidService {
    pub fn new(
        cache: SnapshotCache,
        source: Arc<dyn CampaignSource>,
        matcher: Matcher,
        stream_prefetch: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cache,
            source,
            bidder: Bidder::new(matcher),
            stream_prefetch,
            shutdown,
        }
    }

    /// Best price over the cached snapshot. Waits for the warmup load if it
    /// is still running.
    pub async fn best_bid(&self, position: i64, publisher_id: i64) -> f64 {
        let snapshot = match self.cache.ready().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "No campaign snapshot available");
                return 0.0;
            }
        };

        let cancel = self.shutdown.child_token();
        self.bidder
            .best_bid(&cancel, position, publisher_id, snapshot.campaigns())
            .await
    }

    /// Best price computed against the store directly, one campaign at a time.
    pub async fn best_bid_streaming(&self, position: i64, publisher_id: i64) -> f64 {
        let cancel = self.shutdown.child_token();
        let campaigns = live_campaigns(self.source.clone(), self.stream_prefetch);
        self.bidder
            .best_bid_streaming(&cancel, position, publisher_id, campaigns)
            .await
    }

    pub fn snapshots(&self) -> impl Stream<Item = Arc<Snapshot>> + Send + 'static {
        self.cache.subscribe()
    }

    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.cache.current()
    }
}
