use async_trait::async_trait;
use bidder_core::{CampaignSource, CoreError, CoreResult};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

/// Campaign records stored as JSON strings in a single Redis hash.
#[derive(Clone)]
pub struct RedisCampaignStore {
    conn: MultiplexedConnection,
    hash: String,
}

impl RedisCampaignStore {
    /// Connect and check the server answers `PING` within `timeout`.
    pub async fn connect(connection_string: &str, hash: &str, timeout: Duration) -> CoreResult<Self> {
        let client = redis::Client::open(connection_string).map_err(unavailable)?;

        let conn = tokio::time::timeout(timeout, async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>((conn, pong))
        })
        .await
        .map_err(|_| CoreError::StoreUnavailable(format!("no answer from redis within {:?}", timeout)))?
        .map_err(unavailable)
        .map(|(conn, pong)| {
            info!("Connected to redis: {}", pong);
            conn
        })?;

        Ok(Self {
            conn,
            hash: hash.to_string(),
        })
    }
}

fn unavailable(e: redis::RedisError) -> CoreError {
    CoreError::StoreUnavailable(e.to_string())
}

#[async_trait]
impl CampaignSource for RedisCampaignStore {
    async fn load_all(&self) -> CoreResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(&self.hash).await.map_err(unavailable)?;
        if raw.is_empty() {
            return Err(CoreError::DatasetEmpty(format!("hash '{}' is missing or empty", self.hash)));
        }
        Ok(raw)
    }

    async fn load_one(&self, key: &str) -> CoreResult<String> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(&self.hash, key).await.map_err(unavailable)?;
        raw.ok_or_else(|| CoreError::NotFound(format!("{}:{}", self.hash, key)))
    }

    async fn count(&self) -> CoreResult<usize> {
        let mut conn = self.conn.clone();
        conn.hlen(&self.hash).await.map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        let result = RedisCampaignStore::connect("redis://127.0.0.1:1/", "campaigns", Duration::from_secs(3)).await;
        assert!(matches!(result, Err(CoreError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let result = RedisCampaignStore::connect("not a url", "campaigns", Duration::from_secs(3)).await;
        assert!(matches!(result, Err(CoreError::StoreUnavailable(_))));
    }
}
