//! 在线状态记录类型
//!
//! 这些记录以 JSON 形式存放在共享的在线状态存储里，
//! 每条记录带 `server_id` 标记其归属的服务进程实例，
//! 便于水平扩展下的全局聚合与排障。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 房间内一个已连接用户的在线记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: String,
    pub username: String,
    pub connected_at: DateTime<Utc>,
    pub server_id: String,
}

/// 正在输入的用户记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRecord {
    pub user_id: String,
    pub username: String,
    pub started_at: DateTime<Utc>,
    pub server_id: String,
}

/// 房间成员（由持久层维护的成员关系）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub user_id: String,
    pub username: String,
}

/// 当前进程自报的负载信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLoad {
    pub server_id: String,
    pub uptime_seconds: u64,
}

/// 全系统在线状态统计快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub total_rooms: u64,
    pub total_users: u64,
    pub total_active_viewers: u64,
    pub total_typing_users: u64,
    pub server_load: ServerLoad,
}

impl SystemStats {
    /// 聚合失败时的安全默认值：全零计数，仅携带本进程的负载信息
    pub fn zeroed(server_load: ServerLoad) -> Self {
        Self {
            server_load,
            ..Default::default()
        }
    }
}
