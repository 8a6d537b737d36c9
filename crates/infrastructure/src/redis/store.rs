//! Redis 实现的在线状态存储
//!
//! 写入和 TTL 刷新用管道合并为一次往返；统计聚合的计数
//! 同样走单条管道。所有错误映射为 `StoreError::Unavailable`，
//! 降级策略由服务层决定。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use application::{PresenceStore, StoreError};
use async_trait::async_trait;

pub struct RedisPresenceStore {
    client: Arc<redis::Client>,
}

impl RedisPresenceStore {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client }
    }

    async fn get_connection(
        &self,
    ) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::unavailable(format!("Redis connection failed: {e}")))
    }

    fn map_err(e: redis::RedisError) -> StoreError {
        StoreError::unavailable(format!("Redis operation failed: {e}"))
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: () = redis::pipe()
            .hset(key, field, value)
            .expire(key, ttl.as_secs() as i64)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn hash_remove(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: () = redis::cmd("HDEL")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.get_connection().await?;
        let entries: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(entries.into_iter().collect())
    }

    async fn hash_len(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.get_connection().await?;
        redis::cmd("HLEN")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: () = redis::pipe()
            .sadd(key, member)
            .expire(key, ttl.as_secs() as i64)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: () = redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_connection().await?;
        redis::cmd("SISMEMBER")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.get_connection().await?;
        redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn increment_with_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<i64, StoreError> {
        let mut conn = self.get_connection().await?;
        let count: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        // 创建计数器的自增设置滑动窗口过期
        if count == 1 {
            let _: () = redis::cmd("PEXPIRE")
                .arg(key)
                .arg(window.as_millis() as i64)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_err)?;
        }
        Ok(count)
    }

    async fn scan_keys(&self, pattern: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut conn = self.get_connection().await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_err)?;
            keys.extend(batch);
            if keys.len() >= limit {
                keys.truncate(limit);
                break;
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }

    async fn batched_counts(
        &self,
        hash_keys: &[String],
        set_keys: &[String],
    ) -> Result<(Vec<u64>, Vec<u64>), StoreError> {
        if hash_keys.is_empty() && set_keys.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let mut conn = self.get_connection().await?;
        let mut pipe = redis::pipe();
        for key in hash_keys {
            pipe.cmd("HLEN").arg(key);
        }
        for key in set_keys {
            pipe.cmd("SCARD").arg(key);
        }
        let counts: Vec<u64> = pipe
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        let hash_counts = counts[..hash_keys.len()].to_vec();
        let set_counts = counts[hash_keys.len()..].to_vec();
        Ok((hash_counts, set_counts))
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.get_connection().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 需要本地 Redis 才能运行
    #[tokio::test]
    #[ignore]
    async fn hash_round_trip_against_live_redis() {
        let client = Arc::new(redis::Client::open("redis://127.0.0.1:6379").unwrap());
        let store = RedisPresenceStore::new(client);
        let key = format!("test:{}:users", uuid::Uuid::new_v4());

        store
            .hash_set(&key, "alice", "{}", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.hash_len(&key).await.unwrap(), 1);

        store.hash_remove(&key, "alice").await.unwrap();
        assert_eq!(store.hash_len(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore]
    async fn rate_limit_counter_against_live_redis() {
        let client = Arc::new(redis::Client::open("redis://127.0.0.1:6379").unwrap());
        let store = RedisPresenceStore::new(client);
        let key = format!("test:rate_limit:{}", uuid::Uuid::new_v4());

        assert_eq!(
            store
                .increment_with_window(&key, Duration::from_millis(500))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .increment_with_window(&key, Duration::from_millis(500))
                .await
                .unwrap(),
            2
        );
    }
}
