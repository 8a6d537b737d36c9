//! 聊天中继系统核心领域模型
//!
//! 包含消息实体、在线状态记录、未读标记等核心类型，
//! 以及标识符校验和清洗规则。

pub mod errors;
pub mod identity;
pub mod message;
pub mod presence;
pub mod unread;

// 重新导出常用类型
pub use errors::{DomainError, RepositoryError};
pub use identity::{
    sanitize_key_part, validate_identifier, validate_username, MAX_IDENTIFIER_LEN,
};
pub use message::{
    Attachment, Message, MessageStatus, DELETED_MESSAGE_PLACEHOLDER, MAX_ATTACHMENT_BYTES,
};
pub use presence::{PresenceRecord, RoomMember, ServerLoad, SystemStats, TypingRecord};
pub use unread::UnreadMarker;
