pub mod executor;
pub mod matcher;
pub mod bidder;
pub mod service;

pub use executor::{Executor, Merged};
pub use matcher::{Eligibility, MatchError, Matcher};
pub use bidder::Bidder;
pub use service::BidService;
