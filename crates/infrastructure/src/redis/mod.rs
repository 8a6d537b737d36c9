//! Redis 适配器
//!
//! 在线状态存储和跨实例事件复制都运行在同一个 Redis 实例上。

pub mod publisher;
pub mod store;
pub mod subscriber;

pub use publisher::RedisEventDispatcher;
pub use store::RedisPresenceStore;
pub use subscriber::RedisEventSubscriber;

/// Redis 连接配置
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// 房间频道前缀
    pub room_channel_prefix: String,
    /// 用户私有频道前缀
    pub user_channel_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            room_channel_prefix: "fanout:room:".to_string(),
            user_channel_prefix: "fanout:user:".to_string(),
        }
    }
}
