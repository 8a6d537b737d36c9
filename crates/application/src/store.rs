//! 在线状态存储抽象
//!
//! 对进程外共享 KV/集合存储（缓存语义）的最小接口。
//! 键的构建完全由 `RoomPresenceService` 负责，这里只接受
//! 已经构建好的键，不做任何命名空间假设。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// 存储错误类型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// 存储不可达或操作失败
    #[error("presence store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// 在线状态存储接口
///
/// 所有写操作都附带 TTL，写入的同时刷新整个键的过期时间，
/// 防止断连遗漏导致的内存泄漏。
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// 写入哈希字段并刷新键 TTL
    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// 删除哈希字段；字段不存在不是错误
    async fn hash_remove(&self, key: &str, field: &str) -> Result<(), StoreError>;

    /// 读取哈希的所有 (字段, 值) 对
    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, String)>, StoreError>;

    /// 哈希字段数
    async fn hash_len(&self, key: &str) -> Result<u64, StoreError>;

    /// 向集合添加成员并刷新键 TTL
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError>;

    /// 从集合移除成员；成员不存在不是错误
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// 计数器自增；创建计数器的那次自增设置滑动窗口过期
    async fn increment_with_window(&self, key: &str, window: Duration)
        -> Result<i64, StoreError>;

    /// 按模式扫描键，最多返回 `limit` 个
    async fn scan_keys(&self, pattern: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    /// 单次批量往返：哈希键取字段数，集合键取基数
    async fn batched_counts(
        &self,
        hash_keys: &[String],
        set_keys: &[String],
    ) -> Result<(Vec<u64>, Vec<u64>), StoreError>;

    /// 读取字符串值（不存在返回 None）
    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 写入字符串值并设置 TTL
    async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// 内存实现的在线状态存储（用于测试）
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use tokio::sync::Mutex;

    enum Stored {
        Hash(HashMap<String, String>),
        Set(std::collections::HashSet<String>),
        Counter(i64),
        Value(String),
    }

    struct Entry {
        stored: Stored,
        expires_at: Option<Instant>,
    }

    impl Entry {
        fn is_expired(&self, now: Instant) -> bool {
            self.expires_at.is_some_and(|at| at <= now)
        }
    }

    /// 带真实过期语义的内存存储
    ///
    /// `fail_mode` 打开后所有操作返回 `Unavailable`，
    /// 用于验证各操作的降级策略。
    #[derive(Default)]
    pub struct MemoryPresenceStore {
        entries: Mutex<HashMap<String, Entry>>,
        fail_mode: AtomicBool,
    }

    impl MemoryPresenceStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_mode(&self, fail: bool) {
            self.fail_mode.store(fail, Ordering::SeqCst);
        }

        fn check_available(&self) -> Result<(), StoreError> {
            if self.fail_mode.load(Ordering::SeqCst) {
                Err(StoreError::unavailable("simulated outage"))
            } else {
                Ok(())
            }
        }

        /// 直接写入一条原始哈希字段，绕过服务层（测试损坏数据用）
        pub async fn inject_hash_entry(&self, key: &str, field: &str, value: &str) {
            let mut entries = self.entries.lock().await;
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                stored: Stored::Hash(HashMap::new()),
                expires_at: None,
            });
            if let Stored::Hash(map) = &mut entry.stored {
                map.insert(field.to_string(), value.to_string());
            }
        }

        async fn purge_expired(entries: &mut HashMap<String, Entry>) {
            let now = Instant::now();
            entries.retain(|_, entry| !entry.is_expired(now));
        }
    }

    #[async_trait]
    impl PresenceStore for MemoryPresenceStore {
        async fn hash_set(
            &self,
            key: &str,
            field: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<(), StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                stored: Stored::Hash(HashMap::new()),
                expires_at: None,
            });
            match &mut entry.stored {
                Stored::Hash(map) => {
                    map.insert(field.to_string(), value.to_string());
                }
                _ => {
                    entry.stored = Stored::Hash(HashMap::from([(
                        field.to_string(),
                        value.to_string(),
                    )]));
                }
            }
            entry.expires_at = Some(Instant::now() + ttl);
            Ok(())
        }

        async fn hash_remove(&self, key: &str, field: &str) -> Result<(), StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            let now_empty = match entries.get_mut(key) {
                Some(Entry {
                    stored: Stored::Hash(map),
                    ..
                }) => {
                    map.remove(field);
                    map.is_empty()
                }
                _ => false,
            };
            if now_empty {
                entries.remove(key);
            }
            Ok(())
        }

        async fn hash_entries(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            Ok(match entries.get(key) {
                Some(Entry {
                    stored: Stored::Hash(map),
                    ..
                }) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                _ => Vec::new(),
            })
        }

        async fn hash_len(&self, key: &str) -> Result<u64, StoreError> {
            Ok(self.hash_entries(key).await?.len() as u64)
        }

        async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                stored: Stored::Set(std::collections::HashSet::new()),
                expires_at: None,
            });
            match &mut entry.stored {
                Stored::Set(set) => {
                    set.insert(member.to_string());
                }
                _ => {
                    entry.stored =
                        Stored::Set(std::collections::HashSet::from([member.to_string()]));
                }
            }
            entry.expires_at = Some(Instant::now() + ttl);
            Ok(())
        }

        async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            let now_empty = match entries.get_mut(key) {
                Some(Entry {
                    stored: Stored::Set(set),
                    ..
                }) => {
                    set.remove(member);
                    set.is_empty()
                }
                _ => false,
            };
            if now_empty {
                entries.remove(key);
            }
            Ok(())
        }

        async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            Ok(match entries.get(key) {
                Some(Entry {
                    stored: Stored::Set(set),
                    ..
                }) => set.contains(member),
                _ => false,
            })
        }

        async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            Ok(match entries.get(key) {
                Some(Entry {
                    stored: Stored::Set(set),
                    ..
                }) => set.iter().cloned().collect(),
                _ => Vec::new(),
            })
        }

        async fn increment_with_window(
            &self,
            key: &str,
            window: Duration,
        ) -> Result<i64, StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            match entries.get_mut(key) {
                Some(Entry {
                    stored: Stored::Counter(count),
                    ..
                }) => {
                    *count += 1;
                    Ok(*count)
                }
                _ => {
                    // 创建计数器的自增设置窗口过期
                    entries.insert(
                        key.to_string(),
                        Entry {
                            stored: Stored::Counter(1),
                            expires_at: Some(Instant::now() + window),
                        },
                    );
                    Ok(1)
                }
            }
        }

        async fn scan_keys(&self, pattern: &str, limit: usize) -> Result<Vec<String>, StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            // 只支持前缀*后缀形式的模式，与服务层的用法一致
            let (prefix, suffix) = match pattern.split_once('*') {
                Some((p, s)) => (p, s),
                None => (pattern, ""),
            };
            Ok(entries
                .keys()
                .filter(|key| key.starts_with(prefix) && key.ends_with(suffix))
                .take(limit)
                .cloned()
                .collect())
        }

        async fn batched_counts(
            &self,
            hash_keys: &[String],
            set_keys: &[String],
        ) -> Result<(Vec<u64>, Vec<u64>), StoreError> {
            self.check_available()?;
            let mut hash_counts = Vec::with_capacity(hash_keys.len());
            for key in hash_keys {
                hash_counts.push(self.hash_len(key).await?);
            }
            let mut set_counts = Vec::with_capacity(set_keys.len());
            for key in set_keys {
                set_counts.push(self.set_members(key).await?.len() as u64);
            }
            Ok((hash_counts, set_counts))
        }

        async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            Ok(match entries.get(key) {
                Some(Entry {
                    stored: Stored::Value(value),
                    ..
                }) => Some(value.clone()),
                _ => None,
            })
        }

        async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
            self.check_available()?;
            let mut entries = self.entries.lock().await;
            Self::purge_expired(&mut entries).await;
            entries.insert(
                key.to_string(),
                Entry {
                    stored: Stored::Value(value.to_string()),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            Ok(())
        }
    }
}
