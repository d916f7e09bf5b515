//! Redis-backed store for multi-instance deployments.
//!
//! Requires the `redis` feature. Set-if-absent and compare-and-delete map to
//! `SET NX PX` and a small Lua script, which is what the cross-instance
//! refresh lease relies on.

use super::backend::CacheBackend;
use super::key::CacheKey;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, Script};
use std::time::Duration;

const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

impl RedisConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("FIELD_CACHE_REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        }
    }
}

pub struct RedisCache {
    conn: ConnectionManager,
}

fn redis_err(op: &str, e: ::redis::RedisError) -> Error {
    Error::backend(
        format!("redis {} failed: {}", op, e),
        ErrorContext::new().with_source("redis_backend"),
    )
}

fn ttl_ms(ttl: Duration) -> u64 {
    // PX 0 is rejected by redis.
    (ttl.as_millis() as u64).max(1)
}

impl RedisCache {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| redis_err("open", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| redis_err("connect", e))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key.as_str()).await.map_err(|e| redis_err("GET", e))
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        ::redis::cmd("SET")
            .arg(key.as_str())
            .arg(value)
            .arg("PX")
            .arg(ttl_ms(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_err("SET", e))
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key.as_str()).await.map_err(|e| redis_err("DEL", e))?;
        Ok(deleted > 0)
    }

    async fn set_if_absent(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key.as_str())
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("SET NX", e))?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &CacheKey, expected: &[u8]) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(COMPARE_AND_DELETE)
            .key(key.as_str())
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_err("compare-and-delete", e))?;
        Ok(deleted > 0)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
