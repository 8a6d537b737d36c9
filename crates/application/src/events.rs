//! 实时事件定义
//!
//! 系统对外的实时事件面。协调器只负责产出带寻址的事件列表，
//! 实际的传输发送由独立的分发器完成，核心逻辑因此可以脱离
//! 真实 socket 测试。

use domain::{Message, PresenceRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 聊天实时事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ChatEvent {
    /// 新消息（房间级，无条件广播给所有订阅者，包括活跃查看者）
    ReceiveMessage { room_id: String, message: Message },

    /// 消息被编辑（房间级）
    MessageUpdated {
        message_id: Uuid,
        content: String,
        message: Message,
    },

    /// 消息被删除（房间级）
    MessageDeleted { message_id: Uuid, message: Message },

    /// 未读通知（用户私有频道）
    UnreadMessage {
        room_id: String,
        last_message: Message,
        count: u64,
    },

    /// 用户已读房间（用户私有频道，同一用户的其他设备清除角标）
    MessagesRead { room_id: String },

    /// 用户加入房间（房间级）
    UserJoinedRoom { room_id: String, user: PresenceRecord },

    /// 用户离开房间（房间级）
    UserLeftRoom { room_id: String, user_id: String },

    /// 房间在线用户列表变化（房间级）
    RoomUsersUpdated {
        room_id: String,
        users: Vec<PresenceRecord>,
        count: u64,
    },

    /// 用户开始输入（房间级）
    UserStartTyping {
        room_id: String,
        user_id: String,
        username: String,
    },

    /// 用户停止输入（房间级）
    UserStopTyping { room_id: String, user_id: String },
}

impl ChatEvent {
    /// 事件类型名称（用于日志和监控）
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::ReceiveMessage { .. } => "receive_message",
            ChatEvent::MessageUpdated { .. } => "message_updated",
            ChatEvent::MessageDeleted { .. } => "message_deleted",
            ChatEvent::UnreadMessage { .. } => "unread_message",
            ChatEvent::MessagesRead { .. } => "messages_read",
            ChatEvent::UserJoinedRoom { .. } => "user_joined_room",
            ChatEvent::UserLeftRoom { .. } => "user_left_room",
            ChatEvent::RoomUsersUpdated { .. } => "room_users_updated",
            ChatEvent::UserStartTyping { .. } => "user_start_typing",
            ChatEvent::UserStopTyping { .. } => "user_stop_typing",
        }
    }
}

/// 事件投递地址：房间频道或用户私有频道
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Address {
    Room(String),
    User(String),
}

/// 带寻址的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressedEvent {
    pub address: Address,
    pub event: ChatEvent,
}

impl AddressedEvent {
    pub fn room(room_id: impl Into<String>, event: ChatEvent) -> Self {
        Self {
            address: Address::Room(room_id.into()),
            event,
        }
    }

    pub fn user(user_id: impl Into<String>, event: ChatEvent) -> Self {
        Self {
            address: Address::User(user_id.into()),
            event,
        }
    }
}
