//! 未读标记
//!
//! 每个 (消息, 接收者, 房间) 一条，消息创建时为除作者和
//! 正在查看该房间的用户之外的所有成员写入；用户读取房间时
//! 按 (用户, 房间) 批量删除。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadMarker {
    pub message_id: Uuid,
    pub user_id: String,
    pub room_id: String,
    pub created_at: DateTime<Utc>,
}

impl UnreadMarker {
    pub fn new(
        message_id: Uuid,
        user_id: impl Into<String>,
        room_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id,
            user_id: user_id.into(),
            room_id: room_id.into(),
            created_at: now,
        }
    }
}
