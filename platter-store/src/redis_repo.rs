use async_trait::async_trait;
use platter_core::{CoreError, CoreResult, KeyedLock};
use std::time::Duration;
use tracing::debug;

const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

/// [`KeyedLock`] shared across API replicas through Redis leases
#[derive(Clone)]
pub struct RedisLock {
    client: redis::Client,
}

impl RedisLock {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> CoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CoreError::StorageError(format!("redis: {}", e)))
    }
}

#[async_trait]
impl KeyedLock for RedisLock {
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> CoreResult<bool> {
        let mut conn = self.connection().await?;

        // SET NX: only set if no other holder
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| CoreError::StorageError(format!("redis: {}", e)))?;

        debug!("Lock {} acquire -> {}", key, result.is_some());
        Ok(result.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> CoreResult<()> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CoreError::StorageError(format!("redis: {}", e)))?;
        Ok(())
    }
}
