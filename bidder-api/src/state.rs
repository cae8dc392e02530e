use bidder_search::BidService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub bids: Arc<BidService>,
}

impl AppState {
    pub fn new(bids: BidService) -> Self {
        Self { bids: Arc::new(bids) }
    }
}
