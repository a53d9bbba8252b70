//! Redis access for the HairyMada services
//!
//! Keys are namespaced with a configurable prefix and every write carries an
//! expiry, so Redis drops abandoned entries on its own.

use anyhow::{Context, Result};
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{debug, info};

/// Configuration for the Redis connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Prefix put in front of every key
    pub key_prefix: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// Returns `None` when `REDIS_URL` is not set, in which case callers fall
    /// back to process-local storage.
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL
    /// - `REDIS_KEY_PREFIX`: Key namespace (default: "hairymada:")
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("REDIS_URL").ok()?;
        let key_prefix =
            std::env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "hairymada:".to_string());

        Some(RedisConfig { url, key_prefix })
    }
}

/// Shared Redis client handing out multiplexed connections
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
    key_prefix: String,
}

impl RedisPool {
    /// Open the client; no connection is made until the first command
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .with_context(|| format!("Invalid Redis URL: {}", config.url))?;
        info!("Redis client ready, keys prefixed with '{}'", config.key_prefix);

        Ok(RedisPool {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")
    }

    /// Store `value` under `key` for `ttl_seconds`
    pub async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        // SETEX rejects a zero expiry
        let ttl = ttl_seconds.max(1);
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(self.key(key), value, ttl)
            .await
            .with_context(|| format!("Failed to write key {}", key))?;
        Ok(())
    }

    /// Value stored under `key`, if it has not expired
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(self.key(key))
            .await
            .with_context(|| format!("Failed to read key {}", key))?;
        Ok(value)
    }

    /// Remove `key`; `false` when it did not exist
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn
            .del(self.key(key))
            .await
            .with_context(|| format!("Failed to delete key {}", key))?;
        debug!("Deleted {} Redis key(s) for {}", removed, key);
        Ok(removed > 0)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_redis_config_absent_without_url() {
        unsafe {
            std::env::remove_var("REDIS_URL");
        }

        assert!(RedisConfig::from_env().is_none());
    }

    #[test]
    #[serial]
    fn test_redis_config_from_env() {
        unsafe {
            std::env::set_var("REDIS_URL", "redis://cache:6379");
            std::env::remove_var("REDIS_KEY_PREFIX");
        }

        let config = RedisConfig::from_env().unwrap();
        assert_eq!(config.url, "redis://cache:6379");
        assert_eq!(config.key_prefix, "hairymada:");

        unsafe {
            std::env::set_var("REDIS_KEY_PREFIX", "staging:");
        }
        assert_eq!(RedisConfig::from_env().unwrap().key_prefix, "staging:");

        unsafe {
            std::env::remove_var("REDIS_URL");
            std::env::remove_var("REDIS_KEY_PREFIX");
        }
    }

    #[tokio::test]
    async fn test_keys_are_prefixed() -> Result<()> {
        let config = RedisConfig {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "hairymada:".to_string(),
        };

        // Client::open only parses the URL, no server is contacted here.
        let pool = RedisPool::new(&config).await?;
        assert_eq!(pool.key("session:abc"), "hairymada:session:abc");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            key_prefix: String::new(),
        };

        let error = RedisPool::new(&config).await.err().unwrap();
        assert!(error.to_string().contains("Invalid Redis URL"));
    }
}
