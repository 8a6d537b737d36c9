//! 基础设施适配器
//!
//! 应用层端口的具体实现：Redis 在线状态存储与跨实例事件复制、
//! 进程内事件分发、PostgreSQL 仓库、本地文件存储。

pub mod broadcast;
pub mod db;
pub mod files;
pub mod redis;

pub use broadcast::LocalEventDispatcher;
pub use db::{
    create_pg_pool, PgMessageRepository, PgRoomMemberRepository, PgUnreadMarkerRepository,
};
pub use files::LocalFileStorage;
pub use self::redis::{RedisConfig, RedisEventDispatcher, RedisEventSubscriber, RedisPresenceStore};
