use bidder_core::{Campaign, CoreResult};
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::matcher::{Eligibility, MatchError, Matcher};

/// Finds the highest CPM among the campaigns a request is eligible for.
///
/// `0.0` means "no eligible bid". It is also what a cancelled search returns,
/// so a partially scanned maximum never escapes.
pub struct Bidder<E = Matcher> {
    eligibility: E,
}

impl<E: Eligibility> Bidder<E> {
    pub fn new(eligibility: E) -> Self {
        Self { eligibility }
    }

    /// Scan a materialized campaign list.
    pub async fn best_bid(
        &self,
        cancel: &CancellationToken,
        position: i64,
        publisher_id: i64,
        campaigns: &[Campaign],
    ) -> f64 {
        let mut max_price = 0.0;

        for campaign in campaigns {
            match self.evaluate(cancel, position, publisher_id, campaign, max_price).await {
                Ok(Some(cpm)) => max_price = cpm,
                Ok(None) => {}
                Err(MatchError::Cancelled) => {
                    debug!(position, publisher_id, "Best bid search cancelled");
                    return 0.0;
                }
                Err(e) => {
                    warn!(campaign_id = campaign.id, error = %e, "Skipping campaign");
                }
            }
        }

        max_price
    }

    /// Scan campaigns as they arrive from a live source.
    ///
    /// Items that failed to load or decode are logged and skipped.
    pub async fn best_bid_streaming<S>(
        &self,
        cancel: &CancellationToken,
        position: i64,
        publisher_id: i64,
        campaigns: S,
    ) -> f64
    where
        S: Stream<Item = CoreResult<Campaign>> + Send,
    {
        let mut campaigns = std::pin::pin!(campaigns);
        let mut max_price = 0.0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(position, publisher_id, "Streaming best bid search cancelled");
                    return 0.0;
                }
                next = campaigns.next() => next,
            };

            let campaign = match next {
                Some(Ok(campaign)) => campaign,
                Some(Err(e)) => {
                    warn!(error = %e, "Skipping unreadable campaign");
                    continue;
                }
                None => break,
            };

            match self.evaluate(cancel, position, publisher_id, &campaign, max_price).await {
                Ok(Some(cpm)) => max_price = cpm,
                Ok(None) => {}
                Err(MatchError::Cancelled) => {
                    debug!(position, publisher_id, "Streaming best bid search cancelled");
                    return 0.0;
                }
                Err(e) => {
                    warn!(campaign_id = campaign.id, error = %e, "Skipping campaign");
                }
            }
        }

        max_price
    }

    /// `Some(cpm)` when the campaign is eligible and would raise the maximum.
    async fn evaluate(
        &self,
        cancel: &CancellationToken,
        position: i64,
        publisher_id: i64,
        campaign: &Campaign,
        max_price: f64,
    ) -> Result<Option<f64>, MatchError> {
        // Cannot beat the running maximum, eligibility is irrelevant.
        if campaign.cpm <= max_price {
            return Ok(None);
        }

        // Publisher lists are usually the smaller of the two.
        if !self
            .eligibility
            .matches(cancel, publisher_id, &campaign.publisher_targets())
            .await?
        {
            return Ok(None);
        }

        if !self
            .eligibility
            .matches(cancel, position, &campaign.position_targets())
            .await?
        {
            return Ok(None);
        }

        Ok(Some(campaign.cpm))
    }
}
