//! 房间在线状态服务
//!
//! PresenceStore 的唯一读写方：校验并清洗标识符、应用各结构的
//! TTL 策略、聚合全系统统计、周期性清理过期的输入状态，并提供
//! 通用的限流原语。
//!
//! 失败策略（见各方法注释）：喂给热路径的读取全部降级为安全
//! 默认值（空列表/零计数/false）而不是向调用方抛错，因为在线
//! 状态是提示性的，丢一个输入指示可以接受；限流检查则失败关闭，
//! 检查不了就拒绝，绝不放行。

use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::{
    sanitize_key_part, validate_identifier, validate_username, PresenceRecord, ServerLoad,
    SystemStats, TypingRecord,
};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::store::PresenceStore;

/// 在线状态服务配置
///
/// TTL 数值是策略选择而非推导出的不变量，允许按部署调整；
/// 默认值即生产值。
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// 本进程实例标识，写入每条在线记录
    pub server_id: String,
    /// 房间已连接用户映射的 TTL（每次写入刷新）
    pub room_users_ttl: Duration,
    /// 活跃查看者集合的 TTL（每次 start_viewing 刷新）
    pub active_viewer_ttl: Duration,
    /// 输入中映射的 TTL（每次按键级调用刷新）
    pub typing_ttl: Duration,
    /// 系统统计快照的缓存时长
    pub stats_cache_ttl: Duration,
    /// 清理扫描认定输入记录过期的年龄
    pub typing_stale_after: chrono::Duration,
    /// 单次清理扫描的键数上限，限制扫描成本
    pub cleanup_scan_limit: usize,
    /// 统计聚合扫描的键数上限
    pub stats_scan_limit: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            server_id: format!("server-{}", Uuid::new_v4()),
            room_users_ttl: Duration::from_secs(86400),
            active_viewer_ttl: Duration::from_secs(3600),
            typing_ttl: Duration::from_secs(10),
            stats_cache_ttl: Duration::from_secs(30),
            typing_stale_after: chrono::Duration::minutes(5),
            cleanup_scan_limit: 100,
            stats_scan_limit: 10_000,
        }
    }
}

/// 房间在线状态服务
///
/// 存储键布局（`{room}`/`{user}`/`{actor}` 为清洗后的值）：
/// - `room:{room}:users`   哈希：userId → JSON 在线记录
/// - `room:{room}:viewers` 集合：userId
/// - `room:{room}:typing`  哈希：userId → JSON 输入记录
/// - `rate_limit:{actor}:{action}` 计数器
/// - `system:stats`        JSON 统计快照
///
/// 其他组件一律不得自行构建存储键。
pub struct RoomPresenceService {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    config: PresenceConfig,
    started_at: Instant,
}

const STATS_KEY: &str = "system:stats";

impl RoomPresenceService {
    pub fn new(store: Arc<dyn PresenceStore>, clock: Arc<dyn Clock>, config: PresenceConfig) -> Self {
        Self {
            store,
            clock,
            config,
            started_at: Instant::now(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.config.server_id
    }

    fn room_users_key(room: &str) -> String {
        format!("room:{}:users", room)
    }

    fn room_viewers_key(room: &str) -> String {
        format!("room:{}:viewers", room)
    }

    fn room_typing_key(room: &str) -> String {
        format!("room:{}:typing", room)
    }

    fn rate_limit_key(actor: &str, action: &str) -> String {
        format!("rate_limit:{}:{}", actor, action)
    }

    fn server_load(&self) -> ServerLoad {
        ServerLoad {
            server_id: self.config.server_id.clone(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// 用户连接到房间频道时写入/覆盖其在线记录，并刷新房间 TTL。
    ///
    /// 写入必须完成或抛错，调用方才能继续。
    pub async fn add_user_to_room(
        &self,
        room_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<(), ApplicationError> {
        validate_identifier("room_id", room_id)?;
        validate_identifier("user_id", user_id)?;
        validate_username(username)?;

        let room = sanitize_key_part(room_id);
        let user = sanitize_key_part(user_id);
        let record = PresenceRecord {
            user_id: user.clone(),
            username: username.to_string(),
            connected_at: self.clock.now(),
            server_id: self.config.server_id.clone(),
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| crate::store::StoreError::unavailable(e.to_string()))?;

        self.store
            .hash_set(
                &Self::room_users_key(&room),
                &user,
                &payload,
                self.config.room_users_ttl,
            )
            .await?;

        tracing::info!(room_id = %room, user_id = %user, "user connected to room");
        Ok(())
    }

    /// 移除用户在线记录；移除不存在的记录不是错误
    pub async fn remove_user_from_room(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), ApplicationError> {
        validate_identifier("room_id", room_id)?;
        validate_identifier("user_id", user_id)?;

        let room = sanitize_key_part(room_id);
        let user = sanitize_key_part(user_id);
        self.store
            .hash_remove(&Self::room_users_key(&room), &user)
            .await?;

        tracing::info!(room_id = %room, user_id = %user, "user disconnected from room");
        Ok(())
    }

    /// 返回房间当前在线用户。
    ///
    /// 逐条防御式解析，无法反序列化的记录静默丢弃（记日志），
    /// 绝不让单条损坏记录导致整个读取失败。
    /// 非法 roomId 直接返回空列表，不触达存储；存储故障同样
    /// 返回空列表。
    pub async fn get_room_users(&self, room_id: &str) -> Vec<PresenceRecord> {
        if validate_identifier("room_id", room_id).is_err() {
            return Vec::new();
        }
        let room = sanitize_key_part(room_id);

        let entries = match self.store.hash_entries(&Self::room_users_key(&room)).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(room_id = %room, error = %err, "presence read failed, returning empty");
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|(field, value)| match serde_json::from_str(&value) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!(
                        room_id = %room,
                        user_id = %field,
                        error = %err,
                        "dropping corrupt presence record"
                    );
                    None
                }
            })
            .collect()
    }

    /// 房间在线用户数；非法输入或存储故障返回 0，不抛错
    pub async fn get_user_room_count(&self, room_id: &str) -> u64 {
        if validate_identifier("room_id", room_id).is_err() {
            return 0;
        }
        let room = sanitize_key_part(room_id);
        match self.store.hash_len(&Self::room_users_key(&room)).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(room_id = %room, error = %err, "presence count failed, returning 0");
                0
            }
        }
    }

    /// 标记用户正在查看房间消息列表；重复添加是幂等的
    pub async fn add_active_viewer(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), ApplicationError> {
        validate_identifier("room_id", room_id)?;
        validate_identifier("user_id", user_id)?;

        let room = sanitize_key_part(room_id);
        let user = sanitize_key_part(user_id);
        self.store
            .set_add(
                &Self::room_viewers_key(&room),
                &user,
                self.config.active_viewer_ttl,
            )
            .await?;
        Ok(())
    }

    pub async fn remove_active_viewer(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), ApplicationError> {
        validate_identifier("room_id", room_id)?;
        validate_identifier("user_id", user_id)?;

        let room = sanitize_key_part(room_id);
        let user = sanitize_key_part(user_id);
        self.store
            .set_remove(&Self::room_viewers_key(&room), &user)
            .await?;
        Ok(())
    }

    /// 用户是否正在查看房间。
    ///
    /// 失败返回 false：漏掉一次抑制只是多一条未读角标，
    /// 不是正确性问题。
    pub async fn is_user_active_viewer(&self, room_id: &str, user_id: &str) -> bool {
        if validate_identifier("room_id", room_id).is_err()
            || validate_identifier("user_id", user_id).is_err()
        {
            return false;
        }
        let room = sanitize_key_part(room_id);
        let user = sanitize_key_part(user_id);
        match self
            .store
            .set_contains(&Self::room_viewers_key(&room), &user)
            .await
        {
            Ok(contains) => contains,
            Err(err) => {
                tracing::warn!(room_id = %room, error = %err, "viewer check failed, assuming not viewing");
                false
            }
        }
    }

    pub async fn get_active_viewers(&self, room_id: &str) -> Vec<String> {
        if validate_identifier("room_id", room_id).is_err() {
            return Vec::new();
        }
        let room = sanitize_key_part(room_id);
        match self.store.set_members(&Self::room_viewers_key(&room)).await {
            Ok(members) => members,
            Err(err) => {
                tracing::warn!(room_id = %room, error = %err, "viewer read failed, returning empty");
                Vec::new()
            }
        }
    }

    /// 记录用户正在输入；每次按键级调用都刷新 TTL
    pub async fn set_user_typing(
        &self,
        room_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<(), ApplicationError> {
        validate_identifier("room_id", room_id)?;
        validate_identifier("user_id", user_id)?;
        validate_username(username)?;

        let room = sanitize_key_part(room_id);
        let user = sanitize_key_part(user_id);
        let record = TypingRecord {
            user_id: user.clone(),
            username: username.to_string(),
            started_at: self.clock.now(),
            server_id: self.config.server_id.clone(),
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| crate::store::StoreError::unavailable(e.to_string()))?;

        self.store
            .hash_set(
                &Self::room_typing_key(&room),
                &user,
                &payload,
                self.config.typing_ttl,
            )
            .await?;
        Ok(())
    }

    pub async fn remove_user_typing(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), ApplicationError> {
        validate_identifier("room_id", room_id)?;
        validate_identifier("user_id", user_id)?;

        let room = sanitize_key_part(room_id);
        let user = sanitize_key_part(user_id);
        self.store
            .hash_remove(&Self::room_typing_key(&room), &user)
            .await?;
        Ok(())
    }

    pub async fn get_typing_users(&self, room_id: &str) -> Vec<TypingRecord> {
        if validate_identifier("room_id", room_id).is_err() {
            return Vec::new();
        }
        let room = sanitize_key_part(room_id);
        let entries = match self.store.hash_entries(&Self::room_typing_key(&room)).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(room_id = %room, error = %err, "typing read failed, returning empty");
                return Vec::new();
            }
        };
        entries
            .into_iter()
            .filter_map(|(field, value)| match serde_json::from_str(&value) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!(
                        room_id = %room,
                        user_id = %field,
                        error = %err,
                        "dropping corrupt typing record"
                    );
                    None
                }
            })
            .collect()
    }

    /// 周期清理：扫描有限数量的输入键命名空间，移除超过
    /// 过期窗口的输入记录。
    ///
    /// TTL 是主要的过期机制，这里只是针对丢失 stop 事件的
    /// 正确性兜底。返回移除的条目数。
    pub async fn cleanup_expired_data(&self) -> Result<u64, ApplicationError> {
        let keys = self
            .store
            .scan_keys("room:*:typing", self.config.cleanup_scan_limit)
            .await?;

        let now = self.clock.now();
        let mut removed = 0u64;
        for key in keys {
            let entries = match self.store.hash_entries(&key).await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "cleanup scan skipped key");
                    continue;
                }
            };
            for (field, value) in entries {
                let stale = match serde_json::from_str::<TypingRecord>(&value) {
                    Ok(record) => now - record.started_at > self.config.typing_stale_after,
                    // 解析不了的记录一律当作过期清掉
                    Err(_) => true,
                };
                if stale {
                    if let Err(err) = self.store.hash_remove(&key, &field).await {
                        tracing::warn!(key = %key, user_id = %field, error = %err, "cleanup remove failed");
                        continue;
                    }
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "cleaned up stale typing entries");
        }
        Ok(removed)
    }

    /// 全系统统计：单次批量往返聚合所有房间的计数。
    ///
    /// 结果缓存 30 秒以限制高频轮询的负载；任何底层失败都
    /// 返回全零统计（带上本进程负载信息）而不是抛错。
    pub async fn get_system_stats(&self) -> SystemStats {
        // 缓存命中直接返回
        match self.store.get_value(STATS_KEY).await {
            Ok(Some(cached)) => {
                if let Ok(stats) = serde_json::from_str::<SystemStats>(&cached) {
                    return stats;
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "stats cache read failed, returning zeroed stats");
                return SystemStats::zeroed(self.server_load());
            }
        }

        match self.compute_system_stats().await {
            Ok(stats) => {
                if let Ok(payload) = serde_json::to_string(&stats) {
                    if let Err(err) = self
                        .store
                        .set_value(STATS_KEY, &payload, self.config.stats_cache_ttl)
                        .await
                    {
                        tracing::warn!(error = %err, "stats cache write failed");
                    }
                }
                stats
            }
            Err(err) => {
                tracing::warn!(error = %err, "stats aggregation failed, returning zeroed stats");
                SystemStats::zeroed(self.server_load())
            }
        }
    }

    async fn compute_system_stats(&self) -> Result<SystemStats, ApplicationError> {
        let limit = self.config.stats_scan_limit;
        let user_keys = self.store.scan_keys("room:*:users", limit).await?;
        let typing_keys = self.store.scan_keys("room:*:typing", limit).await?;
        let viewer_keys = self.store.scan_keys("room:*:viewers", limit).await?;

        let mut hash_keys = user_keys.clone();
        hash_keys.extend(typing_keys.iter().cloned());
        let (hash_counts, set_counts) = self
            .store
            .batched_counts(&hash_keys, &viewer_keys)
            .await?;

        let total_users: u64 = hash_counts[..user_keys.len()].iter().sum();
        let total_typing_users: u64 = hash_counts[user_keys.len()..].iter().sum();
        let total_active_viewers: u64 = set_counts.iter().sum();

        Ok(SystemStats {
            total_rooms: user_keys.len() as u64,
            total_users,
            total_active_viewers,
            total_typing_users,
            server_load: self.server_load(),
        })
    }

    /// 通用限流检查：按 (actor, action) 自增计数器，创建计数器
    /// 的那次自增设置 `window` 过期；返回计数是否仍在 `limit` 内。
    ///
    /// 失败关闭：参数非法或存储故障一律返回 false（拒绝），
    /// 调用方必须把检查失败当作拒绝处理，绝不能当作放行。
    pub async fn check_rate_limit(
        &self,
        actor_id: &str,
        action: &str,
        limit: u64,
        window: Duration,
    ) -> bool {
        if validate_identifier("actor_id", actor_id).is_err()
            || validate_identifier("action", action).is_err()
            || limit == 0
        {
            return false;
        }
        let actor = sanitize_key_part(actor_id);
        let action = sanitize_key_part(action);
        match self
            .store
            .increment_with_window(&Self::rate_limit_key(&actor, &action), window)
            .await
        {
            Ok(count) => count as u64 <= limit,
            Err(err) => {
                tracing::warn!(actor = %actor, action = %action, error = %err, "rate limit check failed, denying");
                false
            }
        }
    }
}
