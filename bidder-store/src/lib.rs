pub mod app_config;
pub mod redis_repo;
pub mod memory_repo;

pub use redis_repo::RedisCampaignStore;
pub use memory_repo::MemoryCampaignStore;
